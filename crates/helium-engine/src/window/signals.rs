use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Flags the window thread raises for the render thread.
///
/// Plain atomics: the window thread only writes, the render thread reads
/// them once per frame.
#[derive(Debug, Default)]
pub struct RenderSignals {
    exit: AtomicBool,
    resize: AtomicBool,
    /// Latest requested size, width in the high half.
    size: AtomicU64,
}

impl RenderSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::Release);
    }

    pub fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    /// Records the new surface size. Later requests overwrite earlier ones.
    pub fn request_resize(&self, width: u32, height: u32) {
        self.size
            .store(((width as u64) << 32) | height as u64, Ordering::Release);
        self.resize.store(true, Ordering::Release);
    }

    /// Clears a pending resize and returns its size.
    pub fn take_resize(&self) -> Option<(u32, u32)> {
        if !self.resize.swap(false, Ordering::AcqRel) {
            return None;
        }
        let size = self.size.load(Ordering::Acquire);
        Some(((size >> 32) as u32, size as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_is_taken_once_with_latest_size() {
        let signals = RenderSignals::new();
        assert_eq!(signals.take_resize(), None);

        signals.request_resize(800, 600);
        signals.request_resize(1920, 1080);
        assert_eq!(signals.take_resize(), Some((1920, 1080)));
        assert_eq!(signals.take_resize(), None);
    }

    #[test]
    fn zero_size_survives_packing() {
        let signals = RenderSignals::new();
        signals.request_resize(0, 0);
        assert_eq!(signals.take_resize(), Some((0, 0)));
    }

    #[test]
    fn exit_is_sticky() {
        let signals = RenderSignals::new();
        assert!(!signals.exit_requested());
        signals.request_exit();
        assert!(signals.exit_requested());
        assert!(signals.exit_requested());
    }
}
