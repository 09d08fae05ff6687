//! Per-swap-image command recording resources.

use crate::device::{
    CommandAllocator, CommandList, Device, GpuResult, Pipeline, Queue, RenderTargetView, Texture,
};

/// Lifecycle of one slot. A slot may only begin recording again once its
/// last ticket has completed on the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Recording,
    Closed,
    /// Executed, ticket not yet attached.
    Submitted,
    InFlight { ticket: u64 },
}

/// Command allocator, command list and render target for one swap-chain image.
pub struct FrameResources {
    index: u32,
    allocator: CommandAllocator,
    list: CommandList,
    target: Texture,
    view: Option<RenderTargetView>,
    state: SlotState,
}

impl FrameResources {
    fn new(device: &dyn Device, index: u32) -> GpuResult<Self> {
        let target = device.swap_chain_buffer(index)?;
        Ok(Self {
            index,
            allocator: device.create_command_allocator()?,
            list: device.create_command_list()?,
            target,
            view: Some(device.create_render_target_view(target)?),
            state: SlotState::Idle,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn list(&self) -> CommandList {
        self.list
    }

    pub fn target(&self) -> Texture {
        self.target
    }

    /// Panics if the view was released for a swap-chain resize and not recreated.
    pub fn view(&self) -> RenderTargetView {
        self.view.expect("render target view used while released for resize")
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    /// The ticket this slot is waiting on, if it is still possibly in flight.
    pub fn pending_ticket(&self) -> Option<u64> {
        match self.state {
            SlotState::InFlight { ticket } => Some(ticket),
            _ => None,
        }
    }

    pub fn is_retired(&self, completed: u64) -> bool {
        match self.state {
            SlotState::Idle => true,
            SlotState::InFlight { ticket } => completed >= ticket,
            SlotState::Recording | SlotState::Closed | SlotState::Submitted => false,
        }
    }

    /// Resets the allocator and opens the list with `pipeline` bound.
    ///
    /// `completed` is the fence's completed value; the slot must be retired
    /// against it. Resetting an allocator whose commands may still execute is
    /// undefined behaviour on the device, so this is checked unconditionally.
    pub fn begin(&mut self, device: &dyn Device, completed: u64, pipeline: Pipeline) -> GpuResult<()> {
        assert!(
            self.is_retired(completed),
            "frame slot {} reused while {:?} (fence completed {completed})",
            self.index,
            self.state
        );
        device.reset_command_allocator(self.allocator)?;
        device.reset_command_list(self.list, self.allocator, Some(pipeline))?;
        self.state = SlotState::Recording;
        Ok(())
    }

    pub fn close(&mut self, device: &dyn Device) -> GpuResult<()> {
        debug_assert_eq!(self.state, SlotState::Recording);
        device.close_command_list(self.list)?;
        self.state = SlotState::Closed;
        Ok(())
    }

    pub fn submit(&mut self, device: &dyn Device, queue: Queue) -> GpuResult<()> {
        debug_assert_eq!(self.state, SlotState::Closed);
        device.execute_command_lists(queue, &[self.list])?;
        self.state = SlotState::Submitted;
        Ok(())
    }

    /// Attaches the ticket signaled after this slot's submission.
    pub fn retire_after(&mut self, ticket: u64) {
        debug_assert_eq!(self.state, SlotState::Submitted);
        self.state = SlotState::InFlight { ticket };
    }

    fn release_view(&mut self, device: &dyn Device) {
        if let Some(view) = self.view.take() {
            device.destroy_render_target_view(view);
        }
    }

    fn recreate_view(&mut self, device: &dyn Device) -> GpuResult<()> {
        debug_assert!(self.view.is_none());
        self.target = device.swap_chain_buffer(self.index)?;
        self.view = Some(device.create_render_target_view(self.target)?);
        Ok(())
    }

    fn destroy(mut self, device: &dyn Device) {
        self.release_view(device);
        device.destroy_command_list(self.list);
        device.destroy_command_allocator(self.allocator);
    }
}

/// One [`FrameResources`] per swap-chain image, indexed by back-buffer index.
pub struct FrameResourceTable {
    frames: Vec<FrameResources>,
}

impl FrameResourceTable {
    pub fn new(device: &dyn Device) -> GpuResult<Self> {
        let count = device.swap_chain_image_count();
        let frames = (0..count)
            .map(|index| FrameResources::new(device, index))
            .collect::<GpuResult<Vec<_>>>()?;
        Ok(Self { frames })
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn get(&self, index: u32) -> &FrameResources {
        &self.frames[index as usize]
    }

    pub fn get_mut(&mut self, index: u32) -> &mut FrameResources {
        &mut self.frames[index as usize]
    }

    /// Destroys every swap-chain render-target view. The queue must be idle.
    pub fn release_views(&mut self, device: &dyn Device) {
        for frame in &mut self.frames {
            frame.release_view(device);
        }
    }

    pub fn recreate_views(&mut self, device: &dyn Device) -> GpuResult<()> {
        for frame in &mut self.frames {
            frame.recreate_view(device)?;
        }
        Ok(())
    }

    pub fn destroy(&mut self, device: &dyn Device) {
        for frame in self.frames.drain(..) {
            frame.destroy(device);
        }
    }
}
