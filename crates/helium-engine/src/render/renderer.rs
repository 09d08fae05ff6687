use glam::Mat4;

use crate::device::{
    CullMode, DepthStencilView, Device, Extent2d, GpuResult, Pipeline, PipelineDesc, Queue,
    ResourceState, RootSignature, RootSignatureDesc, Scissor, Texture, TextureDesc, TextureFormat,
    Topology, TransitionScope, Viewport, transition,
};
use crate::render::config::RendererConfig;
use crate::render::constants::{ROOT_CONSTANT_COUNT, RootConstants};
use crate::render::fence::GpuFence;
use crate::render::frame::{FrameResourceTable, FrameResources};
use crate::render::mesh::MeshData;
use crate::render::shader::ShaderSet;
use crate::render::upload::{GeometryBuffers, upload_geometry};

/// Tickets allowed to remain outstanding when a frame starts: one frame may
/// still be in flight while the next is recorded.
pub const FRAME_LAG: u64 = 1;

pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

#[derive(Debug, Clone, Copy)]
struct DepthTarget {
    texture: Texture,
    view: DepthStencilView,
}

impl DepthTarget {
    fn new(device: &dyn Device, extent: Extent2d) -> GpuResult<Self> {
        let texture = device.create_texture(&TextureDesc {
            label: "depth buffer",
            extent,
            format: DEPTH_FORMAT,
            initial_state: ResourceState::DepthWrite,
        })?;
        Ok(Self {
            texture,
            view: device.create_depth_stencil_view(texture)?,
        })
    }

    fn destroy(self, device: &dyn Device) {
        device.destroy_depth_stencil_view(self.view);
        device.destroy_texture(self.texture);
    }
}

/// Owns every GPU object needed to draw one static mesh each frame.
///
/// Dropping the renderer drains the queue before releasing anything.
pub struct Renderer<D: Device> {
    device: D,
    config: RendererConfig,
    queue: Queue,
    fence: GpuFence,
    root_signature: RootSignature,
    pipeline: Pipeline,
    frames: FrameResourceTable,
    depth: Option<DepthTarget>,
    geometry: Option<GeometryBuffers>,
    constants: RootConstants,
    extent: Extent2d,
}

impl<D: Device> Renderer<D> {
    pub fn new(device: D, config: RendererConfig, shaders: &ShaderSet) -> GpuResult<Self> {
        let queue = device.create_command_queue()?;
        let fence = GpuFence::new(&device)?;
        let root_signature = device.create_root_signature(&RootSignatureDesc {
            constant_count: ROOT_CONSTANT_COUNT,
        })?;
        let pipeline = device.create_pipeline(&PipelineDesc {
            label: "mesh pipeline",
            root_signature,
            vertex_shader: &shaders.vertex,
            pixel_shader: &shaders.pixel,
            vertex_stride: MeshData::VERTEX_STRIDE,
            color_format: device.swap_chain_format(),
            depth_format: Some(DEPTH_FORMAT),
            topology: Topology::TriangleList,
            cull_mode: CullMode::Back,
        })?;
        let frames = FrameResourceTable::new(&device)?;
        let extent = device.swap_chain_extent();
        let depth = if extent.is_empty() {
            None
        } else {
            Some(DepthTarget::new(&device, extent)?)
        };
        let constants = RootConstants::new(Mat4::IDENTITY, config.projection(extent));

        log::info!(
            "renderer ready: {}x{}, {} frame slots",
            extent.width,
            extent.height,
            frames.len()
        );

        Ok(Self {
            device,
            config,
            queue,
            fence,
            root_signature,
            pipeline,
            frames,
            depth,
            geometry: None,
            constants,
            extent,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn extent(&self) -> Extent2d {
        self.extent
    }

    /// Whether frames are currently skipped because the surface has no area.
    pub fn is_minimized(&self) -> bool {
        self.depth.is_none()
    }

    /// Uploads the mesh drawn every frame. May be called once.
    pub fn upload_geometry(&mut self, mesh: &MeshData) -> GpuResult<()> {
        assert!(self.geometry.is_none(), "geometry is uploaded once per renderer");
        let geometry = upload_geometry(&self.device, self.queue, &mut self.fence, mesh)?;
        self.geometry = Some(geometry);
        Ok(())
    }

    /// Records, submits and presents one frame viewed through `view`.
    pub fn render_frame(&mut self, view: Mat4) -> GpuResult<()> {
        let geometry = self.geometry.expect("render_frame called before upload_geometry");
        let Some(depth) = self.depth else {
            return Ok(());
        };
        let device: &dyn Device = &self.device;

        self.fence.block(device, FRAME_LAG)?;
        let index = device.current_back_buffer_index();

        let frame = self.frames.get_mut(index);
        if let Some(ticket) = frame.pending_ticket() {
            // The swap chain may hand back an image out of rotation order.
            log::debug!("swap image {index} still in flight, waiting for ticket {ticket}");
            self.fence.wait_for(device, ticket)?;
        }
        frame.begin(device, self.fence.completed_value(device), self.pipeline)?;

        self.constants.set_view(view);
        self.record(self.frames.get(index), &geometry, &depth);

        let frame = self.frames.get_mut(index);
        frame.close(device)?;
        frame.submit(device, self.queue)?;
        device.present()?;
        let ticket = self.fence.bump(device, self.queue)?;
        frame.retire_after(ticket);
        Ok(())
    }

    fn record(&self, frame: &FrameResources, geometry: &GeometryBuffers, depth: &DepthTarget) {
        let device: &dyn Device = &self.device;
        let list = frame.list();

        device.cmd_set_root_signature(list, self.root_signature);
        device.cmd_set_root_constants(list, self.constants.as_words());
        device.cmd_set_topology(list, Topology::TriangleList);
        device.cmd_set_vertex_buffer(list, &geometry.vertex);
        device.cmd_set_index_buffer(list, &geometry.index);
        device.cmd_set_viewport(list, &Viewport::full(self.extent));
        device.cmd_set_scissor(list, &Scissor::full(self.extent));
        device.cmd_set_render_targets(list, frame.view(), Some(depth.view));

        let scope = TransitionScope::enter(
            device,
            list,
            vec![transition(
                frame.target(),
                ResourceState::Common,
                ResourceState::RenderTarget,
            )],
        );
        device.cmd_clear_depth(list, depth.view, self.config.clear_depth);
        device.cmd_clear_render_target(list, frame.view(), self.config.clear_color);
        device.cmd_draw_indexed(list, geometry.index_count, 1);
        scope.exit(device);
    }

    /// Resizes the swap chain and everything sized to it.
    ///
    /// A zero-sized request suspends rendering until a non-zero size arrives.
    pub fn resize(&mut self, width: u32, height: u32) -> GpuResult<()> {
        let extent = Extent2d::new(width, height);
        if extent == self.extent && self.depth.is_some() {
            return Ok(());
        }
        let device: &dyn Device = &self.device;

        self.fence.block(device, 0)?;
        if let Some(depth) = self.depth.take() {
            depth.destroy(device);
        }
        if extent.is_empty() {
            log::debug!("surface has no area; suspending rendering");
            return Ok(());
        }

        self.frames.release_views(device);
        device.resize_swap_chain(width, height)?;
        self.extent = device.swap_chain_extent();
        self.frames.recreate_views(device)?;
        self.depth = Some(DepthTarget::new(device, self.extent)?);
        self.constants.set_projection(self.config.projection(self.extent));

        log::info!("resized to {}x{}", self.extent.width, self.extent.height);
        Ok(())
    }

    /// Blocks until every submitted frame has finished executing.
    pub fn drain(&self) -> GpuResult<()> {
        self.fence.block(&self.device, 0)
    }
}

impl<D: Device> Drop for Renderer<D> {
    fn drop(&mut self) {
        let device: &dyn Device = &self.device;
        if let Err(e) = self.fence.block(device, 0) {
            log::error!("failed to drain the GPU queue, leaking device objects: {e}");
            return;
        }
        if let Some(geometry) = self.geometry.take() {
            geometry.destroy(device);
        }
        if let Some(depth) = self.depth.take() {
            depth.destroy(device);
        }
        self.frames.destroy(device);
        device.destroy_pipeline(self.pipeline);
        device.destroy_root_signature(self.root_signature);
        self.fence.destroy(device);
    }
}
