use crate::device::{Device, Fence, GpuResult, Queue};

/// A device fence paired with the last value the CPU asked the queue to signal.
///
/// `value` only ever grows, and the GPU-side completed value never exceeds
/// it. Every ticket handed out by [`bump`](Self::bump) is unique.
pub struct GpuFence {
    value: u64,
    fence: Fence,
}

impl GpuFence {
    pub fn new(device: &dyn Device) -> GpuResult<Self> {
        Ok(Self {
            value: 0,
            fence: device.create_fence(0)?,
        })
    }

    pub fn handle(&self) -> Fence {
        self.fence
    }

    /// The most recently issued ticket.
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn completed_value(&self, device: &dyn Device) -> u64 {
        device.fence_completed_value(self.fence)
    }

    /// Issues a new ticket: the queue signals it once everything submitted
    /// before this call has finished.
    pub fn bump(&mut self, device: &dyn Device, queue: Queue) -> GpuResult<u64> {
        self.value += 1;
        device.signal(queue, self.fence, self.value)?;
        Ok(self.value)
    }

    /// Blocks until at most `lag` tickets remain outstanding.
    ///
    /// `block(device, 0)` drains the queue up to the latest ticket. Returns
    /// immediately when the target is already reached.
    pub fn block(&self, device: &dyn Device, lag: u64) -> GpuResult<()> {
        self.wait_for(device, self.value.saturating_sub(lag))
    }

    /// Blocks until `ticket` has completed.
    pub fn wait_for(&self, device: &dyn Device, ticket: u64) -> GpuResult<()> {
        debug_assert!(ticket <= self.value, "waiting on a ticket that was never issued");
        if device.fence_completed_value(self.fence) >= ticket {
            return Ok(());
        }
        log::trace!("waiting for fence ticket {ticket} (issued {})", self.value);
        device.wait_for_fence(self.fence, ticket)
    }

    pub fn destroy(&self, device: &dyn Device) {
        device.destroy_fence(self.fence);
    }
}
