//! [`Device`] implementation on wgpu.
//!
//! wgpu tracks hazards and resource states itself, so this backend mostly
//! emulates the explicit model on top of it: allocators are bookkeeping,
//! lists wrap command encoders, barriers are validated against a state table
//! and otherwise dropped, and fences are built from submission indices.

mod init;
mod list;
mod surface;

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, mpsc};

use winit::dpi::PhysicalSize;
use winit::window::Window;

pub use init::GpuInit;

use list::{ListSlot, Recording};
use surface::{SwapChain, choose_alpha_mode, choose_surface_format};

use super::*;

/// Largest root-constant block a root signature may declare, in bytes.
const MAX_ROOT_CONSTANT_BYTES: u32 = 128;

/// Instance and surface created on the thread that owns the window.
///
/// Moved to the render thread and turned into a [`WgpuDevice`] there.
pub struct PresentTarget {
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    size: PhysicalSize<u32>,
}

impl PresentTarget {
    pub fn new(window: Arc<Window>) -> GpuResult<Self> {
        let size = window.inner_size();

        // Use all backends to allow wgpu to select the optimal platform backend.
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|e| GpuError::DeviceCreation(format!("failed to create surface: {e}")))?;

        Ok(Self {
            instance,
            surface,
            size,
        })
    }
}

struct BufferSlot {
    buffer: wgpu::Buffer,
    location: MemoryLocation,
    mapped: bool,
}

struct TextureSlot {
    texture: wgpu::Texture,
    format: TextureFormat,
}

struct RootSignatureSlot {
    layout: wgpu::PipelineLayout,
}

pub(crate) struct PipelineSlot {
    pipeline: wgpu::RenderPipeline,
    root_signature: RootSignature,
}

struct RenderTargetSlot {
    texture: Texture,
    /// `None` for swap-chain images, whose view exists only while acquired.
    view: Option<wgpu::TextureView>,
}

struct FenceSlot {
    completed: Arc<AtomicU64>,
    /// Signaled values not yet observed complete, with the submission that carries them.
    pending: VecDeque<(u64, wgpu::SubmissionIndex)>,
}

impl FenceSlot {
    fn prune(&mut self) {
        let completed = self.completed.load(Ordering::Acquire);
        self.pending.retain(|(value, _)| *value > completed);
    }
}

#[derive(Default)]
pub(crate) struct Objects {
    buffers: HashMap<Buffer, BufferSlot>,
    textures: HashMap<Texture, TextureSlot>,
    allocators: HashSet<CommandAllocator>,
    fences: HashMap<Fence, FenceSlot>,
    root_signatures: HashMap<RootSignature, RootSignatureSlot>,
    pipelines: HashMap<Pipeline, PipelineSlot>,
    render_targets: HashMap<RenderTargetView, RenderTargetSlot>,
    depth_views: HashMap<DepthStencilView, wgpu::TextureView>,
    states: HashMap<ResourceRef, ResourceState>,
}

impl Objects {
    fn buffer(&self, buffer: Buffer) -> GpuResult<&wgpu::Buffer> {
        self.buffers
            .get(&buffer)
            .map(|slot| &slot.buffer)
            .ok_or_else(|| GpuError::Submission(format!("{buffer:?} does not exist")))
    }

    fn pipeline(&self, pipeline: Pipeline) -> GpuResult<&PipelineSlot> {
        self.pipelines
            .get(&pipeline)
            .ok_or_else(|| GpuError::Submission(format!("{pipeline:?} does not exist")))
    }

    fn render_target<'a>(
        &'a self,
        view: RenderTargetView,
        swap: &'a SwapChain,
    ) -> GpuResult<&'a wgpu::TextureView> {
        let slot = self
            .render_targets
            .get(&view)
            .ok_or_else(|| GpuError::Submission(format!("{view:?} does not exist")))?;
        match &slot.view {
            Some(view) => Ok(view),
            None => swap.view(),
        }
    }

    fn depth_view(&self, view: DepthStencilView) -> GpuResult<&wgpu::TextureView> {
        self.depth_views
            .get(&view)
            .ok_or_else(|| GpuError::Submission(format!("{view:?} does not exist")))
    }

    fn track_barriers(&mut self, barriers: &[ResourceBarrier]) -> GpuResult<()> {
        for t in barriers.iter().filter_map(ResourceBarrier::as_transition) {
            let current = self.states.get(&t.resource).copied();
            if current != Some(t.before) {
                return Err(GpuError::Submission(format!(
                    "barrier expects {:?} in {:?} but it is in {current:?}",
                    t.resource, t.before
                )));
            }
            log::trace!("{:?}: {:?} -> {:?}", t.resource, t.before, t.after);
            self.states.insert(t.resource, t.after);
        }
        Ok(())
    }
}

/// Explicit device over a wgpu adapter, device, queue and window surface.
///
/// Not `Sync`: all calls come from the render thread.
pub struct WgpuDevice {
    _instance: wgpu::Instance,
    device: wgpu::Device,
    queue: wgpu::Queue,
    swap_format: TextureFormat,
    objects: RefCell<Objects>,
    lists: RefCell<HashMap<CommandList, ListSlot>>,
    swap: RefCell<SwapChain>,
    next_id: Cell<u32>,
}

impl WgpuDevice {
    /// Creates the adapter, device and two-image swap chain for `target`.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu; this blocks on it.
    pub fn new(target: PresentTarget, init: &GpuInit) -> GpuResult<Self> {
        let PresentTarget {
            instance,
            surface,
            size,
        } = target;
        if size.width == 0 || size.height == 0 {
            return Err(GpuError::DeviceCreation("window has zero size".into()));
        }

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: init.power_preference,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| GpuError::DeviceCreation(format!("no suitable GPU adapter: {e}")))?;

        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        if !adapter.features().contains(wgpu::Features::IMMEDIATES) {
            return Err(GpuError::DeviceCreation(
                "adapter does not support immediate data for root constants".into(),
            ));
        }

        let required_limits = wgpu::Limits {
            max_immediate_size: init
                .required_limits
                .max_immediate_size
                .max(MAX_ROOT_CONSTANT_BYTES),
            ..init.required_limits.clone()
        };

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("helium device"),
            required_features: init.required_features | wgpu::Features::IMMEDIATES,
            required_limits,
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| GpuError::DeviceCreation(format!("failed to create device: {e}")))?;

        let caps = surface.get_capabilities(&adapter);
        let (format, view_format) = choose_surface_format(&caps, init.prefer_srgb).ok_or_else(|| {
            GpuError::DeviceCreation("surface offers no 8-bit color format".into())
        })?;
        let swap_format = from_wgpu_format(view_format).ok_or_else(|| {
            GpuError::DeviceCreation(format!("unsupported render target format {view_format:?}"))
        })?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: init.present_mode,
            alpha_mode: choose_alpha_mode(&caps, init.alpha_mode),
            view_formats: if view_format == format {
                vec![]
            } else {
                vec![view_format]
            },
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);
        log::info!(
            "swap chain: {format:?} viewed as {view_format:?}, {}x{}",
            size.width,
            size.height
        );

        let images = [Texture::from_raw(1), Texture::from_raw(2)];
        let mut objects = Objects::default();
        for image in images {
            objects.states.insert(image.into(), ResourceState::Common);
        }

        Ok(Self {
            _instance: instance,
            device,
            queue,
            swap_format,
            objects: RefCell::new(objects),
            lists: RefCell::new(HashMap::new()),
            swap: RefCell::new(SwapChain::new(surface, config, view_format, size, images)),
            next_id: Cell::new(2),
        })
    }

    fn next_id(&self) -> u32 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    /// Runs `f` against the open recording of `list`. Misuse and recording
    /// errors are held back and reported by close or execute.
    fn record(
        &self,
        list: CommandList,
        f: impl FnOnce(&mut Recording, &Objects, &SwapChain) -> GpuResult<()>,
    ) {
        let mut lists = self.lists.borrow_mut();
        let Some(slot) = lists.get_mut(&list) else {
            log::error!("recording into unknown command list {list:?}");
            return;
        };
        let Some(recording) = slot.recording.as_mut() else {
            slot.misuse
                .get_or_insert(GpuError::Submission(format!("recording into closed {list:?}")));
            return;
        };
        let objects = self.objects.borrow();
        let swap = self.swap.borrow();
        if let Err(e) = f(recording, &objects, &swap) {
            recording.fail(e);
        }
    }

    fn shader_module(&self, label: &'static str, bytes: &[u8]) -> GpuResult<wgpu::ShaderModule> {
        let source = std::str::from_utf8(bytes)
            .map_err(|e| GpuError::resource("shader module", format!("{label}: {e}")))?;
        Ok(self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        }))
    }

    /// Acquires the back buffer if `view` is a swap-chain render target.
    fn acquire_for(&self, view: RenderTargetView) -> GpuResult<()> {
        let texture = {
            let objects = self.objects.borrow();
            match objects.render_targets.get(&view) {
                Some(slot) if slot.view.is_none() => slot.texture,
                _ => return Ok(()),
            }
        };
        let mut swap = self.swap.borrow_mut();
        let index = swap
            .image_index(texture)
            .ok_or_else(|| GpuError::Present(format!("{texture:?} is not a swap-chain image")))?;
        swap.acquire(&self.device, index)
    }
}

pub(crate) fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn from_wgpu_format(format: wgpu::TextureFormat) -> Option<TextureFormat> {
    Some(match format {
        wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
        wgpu::TextureFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
        wgpu::TextureFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
        wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
        wgpu::TextureFormat::Depth32Float => TextureFormat::Depth32Float,
        _ => return None,
    })
}

/// Logs a failed non-blocking poll. Returns whether the poll succeeded.
fn warn_on_poll_error<T, E: std::fmt::Display>(result: Result<T, E>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            log::warn!("device poll failed: {e}");
            false
        }
    }
}

pub(crate) fn index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
    }
}

impl Device for WgpuDevice {
    fn create_command_queue(&self) -> GpuResult<Queue> {
        // wgpu exposes a single queue per device; every handle refers to it.
        Ok(Queue::from_raw(self.next_id()))
    }

    fn create_command_allocator(&self) -> GpuResult<CommandAllocator> {
        let allocator = CommandAllocator::from_raw(self.next_id());
        self.objects.borrow_mut().allocators.insert(allocator);
        Ok(allocator)
    }

    fn create_command_list(&self) -> GpuResult<CommandList> {
        let list = CommandList::from_raw(self.next_id());
        self.lists.borrow_mut().insert(list, ListSlot::default());
        Ok(list)
    }

    fn create_fence(&self, initial_value: u64) -> GpuResult<Fence> {
        let fence = Fence::from_raw(self.next_id());
        self.objects.borrow_mut().fences.insert(
            fence,
            FenceSlot {
                completed: Arc::new(AtomicU64::new(initial_value)),
                pending: VecDeque::new(),
            },
        );
        Ok(fence)
    }

    fn create_buffer(&self, desc: &BufferDesc) -> GpuResult<Buffer> {
        let (usage, mapped_at_creation) = match desc.location {
            MemoryLocation::Upload => (
                wgpu::BufferUsages::MAP_WRITE | wgpu::BufferUsages::COPY_SRC,
                true,
            ),
            MemoryLocation::DeviceLocal => (
                wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::INDEX,
                false,
            ),
        };
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
            usage,
            mapped_at_creation,
        });

        let handle = Buffer::from_raw(self.next_id());
        let mut objects = self.objects.borrow_mut();
        objects.buffers.insert(
            handle,
            BufferSlot {
                buffer,
                location: desc.location,
                mapped: mapped_at_creation,
            },
        );
        objects.states.insert(handle.into(), desc.initial_state);
        Ok(handle)
    }

    fn create_texture(&self, desc: &TextureDesc) -> GpuResult<Texture> {
        if desc.extent.is_empty() {
            return Err(GpuError::resource(desc.label, "zero-sized texture"));
        }
        let usage = if desc.format.is_depth() {
            wgpu::TextureUsages::RENDER_ATTACHMENT
        } else {
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.extent.width,
                height: desc.extent.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage,
            view_formats: &[],
        });

        let handle = Texture::from_raw(self.next_id());
        let mut objects = self.objects.borrow_mut();
        objects.textures.insert(
            handle,
            TextureSlot {
                texture,
                format: desc.format,
            },
        );
        objects.states.insert(handle.into(), desc.initial_state);
        Ok(handle)
    }

    fn create_root_signature(&self, desc: &RootSignatureDesc) -> GpuResult<RootSignature> {
        let immediate_size = desc.constant_count * 4;
        if immediate_size > MAX_ROOT_CONSTANT_BYTES {
            return Err(GpuError::resource(
                "root signature",
                format!("{} root constants exceed {MAX_ROOT_CONSTANT_BYTES} bytes", desc.constant_count),
            ));
        }
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("helium root signature"),
            bind_group_layouts: &[],
            immediate_size,
        });
        let handle = RootSignature::from_raw(self.next_id());
        self.objects
            .borrow_mut()
            .root_signatures
            .insert(handle, RootSignatureSlot { layout });
        Ok(handle)
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> GpuResult<Pipeline> {
        let vertex_module = self.shader_module("helium vertex shader", desc.vertex_shader)?;
        let pixel_module = self.shader_module("helium pixel shader", desc.pixel_shader)?;

        let objects = self.objects.borrow();
        let root_signature = objects.root_signatures.get(&desc.root_signature).ok_or_else(|| {
            GpuError::resource("pipeline", format!("{:?} does not exist", desc.root_signature))
        })?;

        let topology = match desc.topology {
            Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        };
        let cull_mode = match desc.cull_mode {
            CullMode::None => None,
            CullMode::Back => Some(wgpu::Face::Back),
        };

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&root_signature.layout),

            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: desc.vertex_stride as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: 0,
                    }],
                }],
            },

            fragment: Some(wgpu::FragmentState {
                module: &pixel_module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format(desc.color_format),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            // Clockwise front faces, matching the left-handed projection.
            primitive: wgpu::PrimitiveState {
                topology,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Cw,
                cull_mode,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: desc.depth_format.map(|format| wgpu::DepthStencilState {
                format: texture_format(format),
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        drop(objects);

        let handle = Pipeline::from_raw(self.next_id());
        self.objects.borrow_mut().pipelines.insert(
            handle,
            PipelineSlot {
                pipeline,
                root_signature: desc.root_signature,
            },
        );
        Ok(handle)
    }

    fn create_render_target_view(&self, texture: Texture) -> GpuResult<RenderTargetView> {
        let is_swap_image = self.swap.borrow().image_index(texture).is_some();
        let view = if is_swap_image {
            None
        } else {
            let objects = self.objects.borrow();
            let slot = objects
                .textures
                .get(&texture)
                .ok_or_else(|| GpuError::resource("render target view", format!("{texture:?} does not exist")))?;
            if slot.format.is_depth() {
                return Err(GpuError::resource("render target view", "depth texture"));
            }
            Some(slot.texture.create_view(&wgpu::TextureViewDescriptor::default()))
        };
        let handle = RenderTargetView::from_raw(self.next_id());
        self.objects
            .borrow_mut()
            .render_targets
            .insert(handle, RenderTargetSlot { texture, view });
        Ok(handle)
    }

    fn create_depth_stencil_view(&self, texture: Texture) -> GpuResult<DepthStencilView> {
        let view = {
            let objects = self.objects.borrow();
            let slot = objects
                .textures
                .get(&texture)
                .ok_or_else(|| GpuError::resource("depth stencil view", format!("{texture:?} does not exist")))?;
            if !slot.format.is_depth() {
                return Err(GpuError::resource("depth stencil view", "color texture"));
            }
            slot.texture.create_view(&wgpu::TextureViewDescriptor::default())
        };
        let handle = DepthStencilView::from_raw(self.next_id());
        self.objects.borrow_mut().depth_views.insert(handle, view);
        Ok(handle)
    }

    fn destroy_command_allocator(&self, allocator: CommandAllocator) {
        self.objects.borrow_mut().allocators.remove(&allocator);
    }

    fn destroy_command_list(&self, list: CommandList) {
        self.lists.borrow_mut().remove(&list);
    }

    fn destroy_fence(&self, fence: Fence) {
        self.objects.borrow_mut().fences.remove(&fence);
    }

    fn destroy_buffer(&self, buffer: Buffer) {
        let mut objects = self.objects.borrow_mut();
        objects.buffers.remove(&buffer);
        objects.states.remove(&ResourceRef::Buffer(buffer));
    }

    fn destroy_texture(&self, texture: Texture) {
        let mut objects = self.objects.borrow_mut();
        objects.textures.remove(&texture);
        objects.states.remove(&ResourceRef::Texture(texture));
    }

    fn destroy_root_signature(&self, root_signature: RootSignature) {
        self.objects.borrow_mut().root_signatures.remove(&root_signature);
    }

    fn destroy_pipeline(&self, pipeline: Pipeline) {
        self.objects.borrow_mut().pipelines.remove(&pipeline);
    }

    fn destroy_render_target_view(&self, view: RenderTargetView) {
        self.objects.borrow_mut().render_targets.remove(&view);
    }

    fn destroy_depth_stencil_view(&self, view: DepthStencilView) {
        self.objects.borrow_mut().depth_views.remove(&view);
    }

    fn map_buffer(&self, buffer: Buffer) -> GpuResult<()> {
        let mut objects = self.objects.borrow_mut();
        let slot = objects
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| GpuError::resource("buffer mapping", format!("{buffer:?} does not exist")))?;
        if slot.location != MemoryLocation::Upload {
            return Err(GpuError::resource("buffer mapping", "device-local memory is not mappable"));
        }
        if slot.mapped {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();
        slot.buffer.slice(..).map_async(wgpu::MapMode::Write, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| GpuError::SynchronizationTimeout(e.to_string()))?;
        match rx.recv() {
            Ok(Ok(())) => {
                slot.mapped = true;
                Ok(())
            }
            Ok(Err(e)) => Err(GpuError::resource("buffer mapping", e.to_string())),
            Err(_) => Err(GpuError::resource("buffer mapping", "map callback never ran")),
        }
    }

    fn write_mapped(&self, buffer: Buffer, offset: u64, bytes: &[u8]) -> GpuResult<()> {
        let objects = self.objects.borrow();
        let slot = objects
            .buffers
            .get(&buffer)
            .ok_or_else(|| GpuError::resource("buffer mapping", format!("{buffer:?} does not exist")))?;
        if !slot.mapped {
            return Err(GpuError::resource("buffer mapping", "buffer is not mapped"));
        }
        let start = offset as usize;
        let mut mapped = slot.buffer.slice(..).get_mapped_range_mut();
        let dst = mapped
            .get_mut(start..start + bytes.len())
            .ok_or_else(|| GpuError::resource("buffer mapping", "write past the end of the buffer"))?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    fn unmap_buffer(&self, buffer: Buffer) {
        if let Some(slot) = self.objects.borrow_mut().buffers.get_mut(&buffer) {
            slot.buffer.unmap();
            slot.mapped = false;
        }
    }

    fn reset_command_allocator(&self, allocator: CommandAllocator) -> GpuResult<()> {
        if !self.objects.borrow().allocators.contains(&allocator) {
            return Err(GpuError::Submission(format!("{allocator:?} does not exist")));
        }
        let recording = self
            .lists
            .borrow()
            .values()
            .any(|slot| slot.allocator == Some(allocator) && slot.recording.is_some());
        if recording {
            return Err(GpuError::Submission(format!(
                "{allocator:?} reset while a list is recording into it"
            )));
        }
        Ok(())
    }

    fn reset_command_list(
        &self,
        list: CommandList,
        allocator: CommandAllocator,
        initial_pipeline: Option<Pipeline>,
    ) -> GpuResult<()> {
        let mut lists = self.lists.borrow_mut();
        let slot = lists
            .get_mut(&list)
            .ok_or_else(|| GpuError::Submission(format!("{list:?} does not exist")))?;
        if slot.recording.is_some() {
            return Err(GpuError::Submission(format!("{list:?} reset while open")));
        }
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("helium command list"),
            });
        slot.allocator = Some(allocator);
        slot.recording = Some(Recording::new(encoder, initial_pipeline));
        slot.finished = None;
        slot.misuse = None;
        Ok(())
    }

    fn close_command_list(&self, list: CommandList) -> GpuResult<()> {
        let mut lists = self.lists.borrow_mut();
        let slot = lists
            .get_mut(&list)
            .ok_or_else(|| GpuError::Submission(format!("{list:?} does not exist")))?;
        if let Some(error) = slot.misuse.take() {
            slot.recording = None;
            return Err(error);
        }
        let recording = slot
            .recording
            .take()
            .ok_or_else(|| GpuError::Submission(format!("{list:?} is not open")))?;
        let objects = self.objects.borrow();
        let swap = self.swap.borrow();
        slot.finished = Some(recording.finish(&objects, &swap)?);
        Ok(())
    }

    fn cmd_set_root_signature(&self, list: CommandList, root_signature: RootSignature) {
        self.record(list, |rec, _, _| {
            rec.state.root_signature = Some(root_signature);
            Ok(())
        });
    }

    fn cmd_set_root_constants(&self, list: CommandList, values: &[u32]) {
        self.record(list, |rec, _, _| {
            rec.state.constants.clear();
            rec.state.constants.extend_from_slice(values);
            Ok(())
        });
    }

    fn cmd_set_vertex_buffer(&self, list: CommandList, view: &VertexBufferView) {
        self.record(list, |rec, _, _| {
            rec.state.vertex = Some(*view);
            Ok(())
        });
    }

    fn cmd_set_index_buffer(&self, list: CommandList, view: &IndexBufferView) {
        self.record(list, |rec, _, _| {
            rec.state.index = Some(*view);
            Ok(())
        });
    }

    fn cmd_set_topology(&self, list: CommandList, topology: Topology) {
        // Topology is baked into the pipeline; only list topology exists.
        self.record(list, |_, _, _| match topology {
            Topology::TriangleList => Ok(()),
        });
    }

    fn cmd_set_viewport(&self, list: CommandList, viewport: &Viewport) {
        self.record(list, |rec, _, _| {
            rec.state.viewport = Some(*viewport);
            Ok(())
        });
    }

    fn cmd_set_scissor(&self, list: CommandList, scissor: &Scissor) {
        self.record(list, |rec, _, _| {
            rec.state.scissor = Some(*scissor);
            Ok(())
        });
    }

    fn cmd_set_render_targets(
        &self,
        list: CommandList,
        color: RenderTargetView,
        depth: Option<DepthStencilView>,
    ) {
        let acquired = self.acquire_for(color);
        self.record(list, |rec, objects, swap| {
            acquired?;
            if rec.has_pending_clears() {
                rec.flush_clears(objects, swap)?;
            }
            rec.state.color = Some(color);
            rec.state.depth = depth;
            Ok(())
        });
    }

    fn cmd_clear_render_target(&self, list: CommandList, view: RenderTargetView, color: [f32; 4]) {
        self.record(list, |rec, _, _| {
            if rec.state.color != Some(view) {
                return Err(GpuError::Submission(format!("clearing unbound {view:?}")));
            }
            rec.state.clear_color = Some(color);
            Ok(())
        });
    }

    fn cmd_clear_depth(&self, list: CommandList, view: DepthStencilView, depth: f32) {
        self.record(list, |rec, _, _| {
            if rec.state.depth != Some(view) {
                return Err(GpuError::Submission(format!("clearing unbound {view:?}")));
            }
            rec.state.clear_depth = Some(depth);
            Ok(())
        });
    }

    fn cmd_draw_indexed(&self, list: CommandList, index_count: u32, instance_count: u32) {
        self.record(list, |rec, objects, swap| {
            rec.draw_indexed(objects, swap, index_count, instance_count)
        });
    }

    fn cmd_copy_buffer_region(
        &self,
        list: CommandList,
        dst: Buffer,
        dst_offset: u64,
        src: Buffer,
        src_offset: u64,
        size: u64,
    ) {
        self.record(list, |rec, objects, _| {
            let src = objects.buffer(src)?;
            let dst = objects.buffer(dst)?;
            rec.encoder
                .copy_buffer_to_buffer(src, src_offset, dst, dst_offset, size);
            Ok(())
        });
    }

    fn cmd_resource_barriers(&self, list: CommandList, barriers: &[ResourceBarrier]) {
        let tracked = self.objects.borrow_mut().track_barriers(barriers);
        self.record(list, |_, _, _| tracked);
    }

    fn execute_command_lists(&self, _queue: Queue, lists: &[CommandList]) -> GpuResult<()> {
        let mut buffers = Vec::with_capacity(lists.len());
        {
            let mut slots = self.lists.borrow_mut();
            for list in lists {
                let slot = slots
                    .get_mut(list)
                    .ok_or_else(|| GpuError::Submission(format!("{list:?} does not exist")))?;
                if let Some(error) = slot.misuse.take() {
                    return Err(error);
                }
                if slot.recording.is_some() {
                    return Err(GpuError::Submission(format!("{list:?} was not closed")));
                }
                let buffer = slot.finished.take().ok_or_else(|| {
                    GpuError::Submission(format!("{list:?} has no recorded commands"))
                })?;
                buffers.push(buffer);
            }
        }
        self.queue.submit(buffers);
        Ok(())
    }

    fn signal(&self, _queue: Queue, fence: Fence, value: u64) -> GpuResult<()> {
        let mut objects = self.objects.borrow_mut();
        let slot = objects
            .fences
            .get_mut(&fence)
            .ok_or_else(|| GpuError::Submission(format!("{fence:?} does not exist")))?;

        // An empty submission marks the point after all prior work.
        let index = self.queue.submit(std::iter::empty());
        let completed = Arc::clone(&slot.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(value, Ordering::AcqRel);
        });
        slot.prune();
        slot.pending.push_back((value, index));
        Ok(())
    }

    fn fence_completed_value(&self, fence: Fence) -> u64 {
        warn_on_poll_error(self.device.poll(wgpu::PollType::Poll));
        self.objects
            .borrow()
            .fences
            .get(&fence)
            .map_or(0, |slot| slot.completed.load(Ordering::Acquire))
    }

    fn wait_for_fence(&self, fence: Fence, value: u64) -> GpuResult<()> {
        let (completed, index) = {
            let objects = self.objects.borrow();
            let slot = objects
                .fences
                .get(&fence)
                .ok_or_else(|| GpuError::SynchronizationTimeout(format!("{fence:?} does not exist")))?;
            if slot.completed.load(Ordering::Acquire) >= value {
                return Ok(());
            }
            let index = slot
                .pending
                .iter()
                .find(|(signaled, _)| *signaled >= value)
                .map(|(_, index)| index.clone())
                .ok_or_else(|| {
                    GpuError::SynchronizationTimeout(format!("{fence:?} value {value} was never signaled"))
                })?;
            (Arc::clone(&slot.completed), index)
        };

        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(index),
                timeout: None,
            })
            .map_err(|e| GpuError::SynchronizationTimeout(e.to_string()))?;

        if completed.load(Ordering::Acquire) < value {
            return Err(GpuError::SynchronizationTimeout(format!(
                "{fence:?} did not reach {value} after its submission completed"
            )));
        }
        if let Some(slot) = self.objects.borrow_mut().fences.get_mut(&fence) {
            slot.prune();
        }
        Ok(())
    }

    fn swap_chain_format(&self) -> TextureFormat {
        self.swap_format
    }

    fn swap_chain_extent(&self) -> Extent2d {
        let size = self.swap.borrow().size();
        Extent2d::new(size.width, size.height)
    }

    fn swap_chain_image_count(&self) -> u32 {
        self.swap.borrow().images().len() as u32
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.swap.borrow().current()
    }

    fn swap_chain_buffer(&self, index: u32) -> GpuResult<Texture> {
        self.swap
            .borrow()
            .images()
            .get(index as usize)
            .copied()
            .ok_or_else(|| GpuError::resource("swap-chain buffer", format!("no image {index}")))
    }

    fn present(&self) -> GpuResult<()> {
        self.swap.borrow_mut().present();
        Ok(())
    }

    fn resize_swap_chain(&self, width: u32, height: u32) -> GpuResult<()> {
        let views_alive = self
            .objects
            .borrow()
            .render_targets
            .values()
            .any(|slot| slot.view.is_none());
        if views_alive {
            return Err(GpuError::Present(
                "swap-chain images still have render-target views".into(),
            ));
        }
        self.swap.borrow_mut().resize(&self.device, width, height)?;
        log::info!("swap chain resized to {width}x{height}");
        Ok(())
    }
}
