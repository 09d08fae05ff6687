//! The explicit GPU API seam.
//!
//! Everything above this module talks to the GPU through [`Device`]: objects
//! are opaque `Copy` handles, command lists are recorded and closed by hand,
//! submission is asynchronous, and completion is observed only through
//! fences. Nothing here tracks hazards for the caller.

pub mod barrier;
mod error;
pub mod backend;

#[cfg(test)]
pub(crate) mod testing;

pub use barrier::{ResourceBarrier, ResourceRef, Transition, TransitionScope, reverse, transition};
pub use error::{GpuError, GpuResult};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            pub(crate) const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }
        }
    };
}

handle!(Buffer);
handle!(Texture);
handle!(
    /// Backing memory for recorded commands. Must not be reset while any
    /// command list recorded against it is still executing.
    CommandAllocator
);
handle!(CommandList);
handle!(Queue);
handle!(Fence);
handle!(RootSignature);
handle!(Pipeline);
handle!(RenderTargetView);
handle!(DepthStencilView);

/// The state a resource is in as far as the GPU is concerned.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ResourceState {
    /// Presentable, and the state every swap-chain image must be in outside a frame.
    Common,
    RenderTarget,
    CopyDest,
    GenericRead,
    VertexAndConstantBuffer,
    IndexBuffer,
    DepthWrite,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemoryLocation {
    /// GPU-only memory. Never mappable.
    DeviceLocal,
    /// CPU-writable memory the GPU can copy from.
    Upload,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TextureFormat {
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba8UnormSrgb,
    Bgra8UnormSrgb,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

#[derive(Clone, Debug)]
pub struct BufferDesc {
    pub label: &'static str,
    pub size: u64,
    pub location: MemoryLocation,
    pub initial_state: ResourceState,
}

#[derive(Clone, Debug)]
pub struct TextureDesc {
    pub label: &'static str,
    pub extent: Extent2d,
    pub format: TextureFormat,
    pub initial_state: ResourceState,
}

#[derive(Clone, Copy, Debug)]
pub struct RootSignatureDesc {
    /// Number of 32-bit root constants visible to the vertex stage.
    pub constant_count: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CullMode {
    None,
    Back,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Topology {
    TriangleList,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IndexFormat {
    Uint32,
}

pub struct PipelineDesc<'a> {
    pub label: &'static str,
    pub root_signature: RootSignature,
    pub vertex_shader: &'a [u8],
    pub pixel_shader: &'a [u8],
    /// Stride of the single vertex stream; attribute 0 is a float3 position at offset 0.
    pub vertex_stride: u32,
    pub color_format: TextureFormat,
    pub depth_format: Option<TextureFormat>,
    pub topology: Topology,
    pub cull_mode: CullMode,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct VertexBufferView {
    pub buffer: Buffer,
    pub size: u64,
    pub stride: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct IndexBufferView {
    pub buffer: Buffer,
    pub size: u64,
    pub format: IndexFormat,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn full(extent: Extent2d) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Scissor {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Scissor {
    pub fn full(extent: Extent2d) -> Self {
        Self {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        }
    }
}

/// Explicit GPU device.
///
/// Creation calls return handles; the matching `destroy_*` call must only be
/// made once no submitted work references the object. Recording calls
/// (`cmd_*`) require the list to be open, i.e. reset and not yet closed.
/// Recording errors surface from [`close_command_list`](Device::close_command_list).
pub trait Device {
    fn create_command_queue(&self) -> GpuResult<Queue>;
    fn create_command_allocator(&self) -> GpuResult<CommandAllocator>;
    /// Creates a command list in the closed state.
    fn create_command_list(&self) -> GpuResult<CommandList>;
    fn create_fence(&self, initial_value: u64) -> GpuResult<Fence>;
    fn create_buffer(&self, desc: &BufferDesc) -> GpuResult<Buffer>;
    fn create_texture(&self, desc: &TextureDesc) -> GpuResult<Texture>;
    fn create_root_signature(&self, desc: &RootSignatureDesc) -> GpuResult<RootSignature>;
    fn create_pipeline(&self, desc: &PipelineDesc) -> GpuResult<Pipeline>;
    fn create_render_target_view(&self, texture: Texture) -> GpuResult<RenderTargetView>;
    fn create_depth_stencil_view(&self, texture: Texture) -> GpuResult<DepthStencilView>;

    fn destroy_command_allocator(&self, allocator: CommandAllocator);
    fn destroy_command_list(&self, list: CommandList);
    fn destroy_fence(&self, fence: Fence);
    fn destroy_buffer(&self, buffer: Buffer);
    fn destroy_texture(&self, texture: Texture);
    fn destroy_root_signature(&self, root_signature: RootSignature);
    fn destroy_pipeline(&self, pipeline: Pipeline);
    fn destroy_render_target_view(&self, view: RenderTargetView);
    fn destroy_depth_stencil_view(&self, view: DepthStencilView);

    /// Maps an upload buffer for CPU writes. Device-local buffers cannot be mapped.
    fn map_buffer(&self, buffer: Buffer) -> GpuResult<()>;
    fn write_mapped(&self, buffer: Buffer, offset: u64, bytes: &[u8]) -> GpuResult<()>;
    fn unmap_buffer(&self, buffer: Buffer);

    /// Reclaims the allocator's memory. Every list recorded against it must
    /// have finished executing.
    fn reset_command_allocator(&self, allocator: CommandAllocator) -> GpuResult<()>;
    /// Opens a closed list for recording against `allocator`.
    fn reset_command_list(
        &self,
        list: CommandList,
        allocator: CommandAllocator,
        initial_pipeline: Option<Pipeline>,
    ) -> GpuResult<()>;
    fn close_command_list(&self, list: CommandList) -> GpuResult<()>;

    fn cmd_set_root_signature(&self, list: CommandList, root_signature: RootSignature);
    fn cmd_set_root_constants(&self, list: CommandList, values: &[u32]);
    fn cmd_set_vertex_buffer(&self, list: CommandList, view: &VertexBufferView);
    fn cmd_set_index_buffer(&self, list: CommandList, view: &IndexBufferView);
    fn cmd_set_topology(&self, list: CommandList, topology: Topology);
    fn cmd_set_viewport(&self, list: CommandList, viewport: &Viewport);
    fn cmd_set_scissor(&self, list: CommandList, scissor: &Scissor);
    fn cmd_set_render_targets(
        &self,
        list: CommandList,
        color: RenderTargetView,
        depth: Option<DepthStencilView>,
    );
    fn cmd_clear_render_target(&self, list: CommandList, view: RenderTargetView, color: [f32; 4]);
    fn cmd_clear_depth(&self, list: CommandList, view: DepthStencilView, depth: f32);
    fn cmd_draw_indexed(&self, list: CommandList, index_count: u32, instance_count: u32);
    fn cmd_copy_buffer_region(
        &self,
        list: CommandList,
        dst: Buffer,
        dst_offset: u64,
        src: Buffer,
        src_offset: u64,
        size: u64,
    );
    fn cmd_resource_barriers(&self, list: CommandList, barriers: &[ResourceBarrier]);

    /// Hands closed lists to the queue. Returns before the GPU executes them.
    fn execute_command_lists(&self, queue: Queue, lists: &[CommandList]) -> GpuResult<()>;
    /// Enqueues a write of `value` to `fence`, performed once all previously
    /// submitted work on `queue` has completed.
    fn signal(&self, queue: Queue, fence: Fence, value: u64) -> GpuResult<()>;
    fn fence_completed_value(&self, fence: Fence) -> u64;
    /// Blocks the calling thread until the fence's completed value reaches `value`.
    fn wait_for_fence(&self, fence: Fence, value: u64) -> GpuResult<()>;

    fn swap_chain_format(&self) -> TextureFormat;
    fn swap_chain_extent(&self) -> Extent2d;
    fn swap_chain_image_count(&self) -> u32;
    /// The image the next frame must render into.
    fn current_back_buffer_index(&self) -> u32;
    /// Swap-chain image `index`. Owned by the swap chain; never destroyed by the caller.
    fn swap_chain_buffer(&self, index: u32) -> GpuResult<Texture>;
    fn present(&self) -> GpuResult<()>;
    /// Resizes every swap-chain image. No render-target view of a swap-chain
    /// image may exist and no work referencing one may be in flight.
    fn resize_swap_chain(&self, width: u32, height: u32) -> GpuResult<()>;
}
