use glam::Mat4;

use crate::device::Extent2d;
use crate::render::MeshData;
use crate::time::FrameTime;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Per-frame context passed to [`App::on_frame`].
pub struct FrameCtx<'a> {
    pub time: FrameTime,
    /// Size of the surface the frame is rendered to.
    pub extent: Extent2d,
    /// View matrix used for this frame. Keeps its value between frames.
    pub view: &'a mut Mat4,
}

/// Application driven by the render thread.
///
/// Both callbacks run on the render thread, never on the window thread.
pub trait App: Send + 'static {
    /// Produces the mesh uploaded once before the first frame.
    fn load_mesh(&mut self) -> anyhow::Result<MeshData>;

    /// Called once per rendered frame before commands are recorded.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_>) -> AppControl;
}
