//! In-memory [`Device`] that records every call and executes submitted work
//! only when someone waits on it.
//!
//! The queue is strictly in order. Work sits in the queue until a
//! `wait_for_fence` needs it (or a test drives it explicitly), so CPU/GPU
//! races the real device would hide become deterministic. Hazards the real
//! API leaves undefined panic here.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use super::*;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cmd {
    SetRootSignature(RootSignature),
    SetPipeline(Pipeline),
    SetRootConstants(Vec<u32>),
    SetVertexBuffer(VertexBufferView),
    SetIndexBuffer(IndexBufferView),
    SetTopology(Topology),
    SetViewport(Viewport),
    SetScissor(Scissor),
    SetRenderTargets(RenderTargetView, Option<DepthStencilView>),
    ClearRenderTarget(RenderTargetView, [f32; 4]),
    ClearDepth(DepthStencilView, f32),
    DrawIndexed { index_count: u32, instance_count: u32 },
    Copy { dst: Buffer, dst_offset: u64, src: Buffer, src_offset: u64, size: u64 },
    Barriers(Vec<ResourceBarrier>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    CreateBuffer { buffer: Buffer, location: MemoryLocation, size: u64 },
    DestroyBuffer(Buffer),
    Map(Buffer),
    Write { buffer: Buffer, offset: u64, len: usize },
    /// Snapshot of the buffer contents at the moment it was unmapped.
    Unmap { buffer: Buffer, contents: Vec<u8> },
    CreateTexture(Texture),
    DestroyTexture(Texture),
    CreateRenderTargetView { view: RenderTargetView, texture: Texture },
    DestroyRenderTargetView(RenderTargetView),
    ResetAllocator(CommandAllocator),
    ResetList { list: CommandList, allocator: CommandAllocator },
    Record { list: CommandList, cmd: Cmd },
    Close(CommandList),
    Execute(Vec<CommandList>),
    Signal { fence: Fence, value: u64 },
    /// A CPU wait that had to block.
    Wait { fence: Fence, value: u64 },
    GpuExecuted(CommandList),
    GpuSignaled { fence: Fence, value: u64 },
    Present { image: u32 },
    ResizeSwapChain(Extent2d),
}

struct BufferRecord {
    location: MemoryLocation,
    contents: Vec<u8>,
    mapped: bool,
}

struct ListRecord {
    open: bool,
    allocator: Option<CommandAllocator>,
    commands: Vec<Cmd>,
}

enum Work {
    Execute {
        list: CommandList,
        allocator: Option<CommandAllocator>,
        commands: Vec<Cmd>,
    },
    Signal {
        fence: Fence,
        value: u64,
    },
}

struct State {
    next_id: u32,
    events: Vec<Event>,
    buffers: HashMap<Buffer, BufferRecord>,
    textures: HashSet<Texture>,
    allocators: HashSet<CommandAllocator>,
    lists: HashMap<CommandList, ListRecord>,
    fences: HashMap<Fence, u64>,
    root_signatures: HashSet<RootSignature>,
    pipelines: HashSet<Pipeline>,
    rtvs: HashMap<RenderTargetView, Texture>,
    dsvs: HashMap<DepthStencilView, Texture>,
    states: HashMap<ResourceRef, ResourceState>,
    queue: VecDeque<Work>,
    swap_images: Vec<Texture>,
    swap_sequence: Vec<u32>,
    swap_cursor: usize,
    swap_extent: Extent2d,
}

impl State {
    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn pending(&self, f: impl Fn(&Cmd) -> bool) -> bool {
        self.queue.iter().any(|w| match w {
            Work::Execute { commands, .. } => commands.iter().any(&f),
            Work::Signal { .. } => false,
        })
    }

    fn list_mut(&mut self, list: CommandList) -> &mut ListRecord {
        self.lists
            .get_mut(&list)
            .unwrap_or_else(|| panic!("unknown command list {list:?}"))
    }

    fn step(&mut self) -> bool {
        let Some(work) = self.queue.pop_front() else {
            return false;
        };
        match work {
            Work::Execute { list, commands, .. } => {
                self.execute(&commands);
                self.events.push(Event::GpuExecuted(list));
            }
            Work::Signal { fence, value } => {
                let completed = self
                    .fences
                    .get_mut(&fence)
                    .unwrap_or_else(|| panic!("fence {fence:?} destroyed with a signal pending"));
                *completed = (*completed).max(value);
                self.events.push(Event::GpuSignaled { fence, value });
            }
        }
        true
    }

    fn execute(&mut self, commands: &[Cmd]) {
        let mut vertex = None;
        let mut index = None;
        let mut target = None;
        for cmd in commands {
            match cmd {
                Cmd::Copy { dst, dst_offset, src, src_offset, size } => {
                    let (so, doff, n) = (*src_offset as usize, *dst_offset as usize, *size as usize);
                    let bytes = self.buffers.get(src).expect("copy source destroyed while in flight").contents
                        [so..so + n]
                        .to_vec();
                    let dst = self.buffers.get_mut(dst).expect("copy destination destroyed while in flight");
                    dst.contents[doff..doff + n].copy_from_slice(&bytes);
                }
                Cmd::Barriers(barriers) => {
                    for t in barriers.iter().filter_map(ResourceBarrier::as_transition) {
                        let current = self.states.get(&t.resource).copied();
                        assert_eq!(
                            current,
                            Some(t.before),
                            "barrier before-state mismatch for {:?}",
                            t.resource
                        );
                        self.states.insert(t.resource, t.after);
                    }
                }
                Cmd::SetVertexBuffer(v) => vertex = Some(v.buffer),
                Cmd::SetIndexBuffer(v) => index = Some(v.buffer),
                Cmd::SetRenderTargets(rtv, _) => {
                    let texture = self.rtvs.get(rtv).expect("render target view destroyed while in flight");
                    target = Some(*texture);
                }
                Cmd::DrawIndexed { .. } => {
                    let state = |r: Option<ResourceRef>| r.and_then(|r| self.states.get(&r).copied());
                    assert_eq!(
                        state(vertex.map(ResourceRef::Buffer)),
                        Some(ResourceState::VertexAndConstantBuffer),
                        "draw with vertex buffer not in vertex state"
                    );
                    assert_eq!(
                        state(index.map(ResourceRef::Buffer)),
                        Some(ResourceState::IndexBuffer),
                        "draw with index buffer not in index state"
                    );
                    assert_eq!(
                        state(target.map(ResourceRef::Texture)),
                        Some(ResourceState::RenderTarget),
                        "draw into a target not in render-target state"
                    );
                }
                _ => {}
            }
        }
    }
}

/// Shared handle to one recording device; clones observe the same state.
#[derive(Clone)]
pub(crate) struct RecordingDevice {
    state: Rc<RefCell<State>>,
}

impl RecordingDevice {
    pub(crate) fn new(extent: Extent2d) -> Self {
        Self::with_swap_sequence(extent, vec![0, 1])
    }

    /// The swap chain hands out back-buffer indices from `sequence`, cycling.
    pub(crate) fn with_swap_sequence(extent: Extent2d, sequence: Vec<u32>) -> Self {
        assert!(!sequence.is_empty());
        let mut state = State {
            next_id: 0,
            events: Vec::new(),
            buffers: HashMap::new(),
            textures: HashSet::new(),
            allocators: HashSet::new(),
            lists: HashMap::new(),
            fences: HashMap::new(),
            root_signatures: HashSet::new(),
            pipelines: HashSet::new(),
            rtvs: HashMap::new(),
            dsvs: HashMap::new(),
            states: HashMap::new(),
            queue: VecDeque::new(),
            swap_images: Vec::new(),
            swap_sequence: sequence,
            swap_cursor: 0,
            swap_extent: extent,
        };
        for _ in 0..2 {
            let image = Texture::from_raw(state.next());
            state.states.insert(image.into(), ResourceState::Common);
            state.swap_images.push(image);
        }
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub(crate) fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    pub(crate) fn buffer_contents(&self, buffer: Buffer) -> Vec<u8> {
        self.state.borrow().buffers[&buffer].contents.clone()
    }

    pub(crate) fn list_commands(&self, list: CommandList) -> Vec<Cmd> {
        self.state.borrow().lists[&list].commands.clone()
    }

    pub(crate) fn resource_state(&self, resource: impl Into<ResourceRef>) -> Option<ResourceState> {
        self.state.borrow().states.get(&resource.into()).copied()
    }

    pub(crate) fn swap_images(&self) -> Vec<Texture> {
        self.state.borrow().swap_images.clone()
    }

    pub(crate) fn pending_work(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Objects created through the device and not yet destroyed, excluding
    /// the queue and the swap-chain images.
    pub(crate) fn live_objects(&self) -> usize {
        let s = self.state.borrow();
        s.buffers.len()
            + s.textures.len()
            + s.allocators.len()
            + s.lists.len()
            + s.fences.len()
            + s.root_signatures.len()
            + s.pipelines.len()
            + s.rtvs.len()
            + s.dsvs.len()
    }

    /// Runs everything submitted so far.
    pub(crate) fn complete_all(&self) {
        let mut s = self.state.borrow_mut();
        while s.step() {}
    }

    /// Makes the GPU write `value` to `fence` ahead of the work queued before it.
    pub(crate) fn complete_signal_out_of_order(&self, fence: Fence, value: u64) {
        let mut s = self.state.borrow_mut();
        let position = s
            .queue
            .iter()
            .position(|w| matches!(w, Work::Signal { fence: f, value: v } if *f == fence && *v == value))
            .unwrap_or_else(|| panic!("no pending signal of {value} on {fence:?}"));
        s.queue.remove(position);
        let completed = s.fences.get_mut(&fence).expect("signal on destroyed fence");
        *completed = (*completed).max(value);
        s.events.push(Event::GpuSignaled { fence, value });
    }

    fn record(&self, list: CommandList, cmd: Cmd) {
        let mut s = self.state.borrow_mut();
        let record = s.list_mut(list);
        assert!(record.open, "recording into a closed command list {list:?}");
        record.commands.push(cmd.clone());
        s.events.push(Event::Record { list, cmd });
    }
}

impl Device for RecordingDevice {
    fn create_command_queue(&self) -> GpuResult<Queue> {
        Ok(Queue::from_raw(self.state.borrow_mut().next()))
    }

    fn create_command_allocator(&self) -> GpuResult<CommandAllocator> {
        let mut s = self.state.borrow_mut();
        let allocator = CommandAllocator::from_raw(s.next());
        s.allocators.insert(allocator);
        Ok(allocator)
    }

    fn create_command_list(&self) -> GpuResult<CommandList> {
        let mut s = self.state.borrow_mut();
        let list = CommandList::from_raw(s.next());
        s.lists.insert(
            list,
            ListRecord {
                open: false,
                allocator: None,
                commands: Vec::new(),
            },
        );
        Ok(list)
    }

    fn create_fence(&self, initial_value: u64) -> GpuResult<Fence> {
        let mut s = self.state.borrow_mut();
        let fence = Fence::from_raw(s.next());
        s.fences.insert(fence, initial_value);
        Ok(fence)
    }

    fn create_buffer(&self, desc: &BufferDesc) -> GpuResult<Buffer> {
        let mut s = self.state.borrow_mut();
        let buffer = Buffer::from_raw(s.next());
        s.buffers.insert(
            buffer,
            BufferRecord {
                location: desc.location,
                contents: vec![0; desc.size as usize],
                mapped: false,
            },
        );
        s.states.insert(buffer.into(), desc.initial_state);
        s.events.push(Event::CreateBuffer {
            buffer,
            location: desc.location,
            size: desc.size,
        });
        Ok(buffer)
    }

    fn create_texture(&self, desc: &TextureDesc) -> GpuResult<Texture> {
        if desc.extent.is_empty() {
            return Err(GpuError::resource(desc.label, "zero-sized texture"));
        }
        let mut s = self.state.borrow_mut();
        let texture = Texture::from_raw(s.next());
        s.textures.insert(texture);
        s.states.insert(texture.into(), desc.initial_state);
        s.events.push(Event::CreateTexture(texture));
        Ok(texture)
    }

    fn create_root_signature(&self, _desc: &RootSignatureDesc) -> GpuResult<RootSignature> {
        let mut s = self.state.borrow_mut();
        let rs = RootSignature::from_raw(s.next());
        s.root_signatures.insert(rs);
        Ok(rs)
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> GpuResult<Pipeline> {
        if desc.vertex_shader.is_empty() || desc.pixel_shader.is_empty() {
            return Err(GpuError::resource(desc.label, "empty shader bytecode"));
        }
        let mut s = self.state.borrow_mut();
        assert!(s.root_signatures.contains(&desc.root_signature));
        let pipeline = Pipeline::from_raw(s.next());
        s.pipelines.insert(pipeline);
        Ok(pipeline)
    }

    fn create_render_target_view(&self, texture: Texture) -> GpuResult<RenderTargetView> {
        let mut s = self.state.borrow_mut();
        let view = RenderTargetView::from_raw(s.next());
        s.rtvs.insert(view, texture);
        s.events.push(Event::CreateRenderTargetView { view, texture });
        Ok(view)
    }

    fn create_depth_stencil_view(&self, texture: Texture) -> GpuResult<DepthStencilView> {
        let mut s = self.state.borrow_mut();
        let view = DepthStencilView::from_raw(s.next());
        s.dsvs.insert(view, texture);
        Ok(view)
    }

    fn destroy_command_allocator(&self, allocator: CommandAllocator) {
        let mut s = self.state.borrow_mut();
        let in_flight = s.queue.iter().any(|w| matches!(w, Work::Execute { allocator: Some(a), .. } if *a == allocator));
        assert!(!in_flight, "destroying {allocator:?} while its commands are in flight");
        s.allocators.remove(&allocator);
    }

    fn destroy_command_list(&self, list: CommandList) {
        self.state.borrow_mut().lists.remove(&list);
    }

    fn destroy_fence(&self, fence: Fence) {
        self.state.borrow_mut().fences.remove(&fence);
    }

    fn destroy_buffer(&self, buffer: Buffer) {
        let mut s = self.state.borrow_mut();
        let referenced = s.pending(|c| match c {
            Cmd::Copy { dst, src, .. } => *dst == buffer || *src == buffer,
            Cmd::SetVertexBuffer(v) => v.buffer == buffer,
            Cmd::SetIndexBuffer(v) => v.buffer == buffer,
            _ => false,
        });
        assert!(!referenced, "destroying {buffer:?} while submitted work references it");
        s.buffers.remove(&buffer);
        s.states.remove(&ResourceRef::Buffer(buffer));
        s.events.push(Event::DestroyBuffer(buffer));
    }

    fn destroy_texture(&self, texture: Texture) {
        let mut s = self.state.borrow_mut();
        assert!(!s.swap_images.contains(&texture), "swap-chain images are owned by the swap chain");
        s.textures.remove(&texture);
        s.states.remove(&ResourceRef::Texture(texture));
        s.events.push(Event::DestroyTexture(texture));
    }

    fn destroy_root_signature(&self, root_signature: RootSignature) {
        self.state.borrow_mut().root_signatures.remove(&root_signature);
    }

    fn destroy_pipeline(&self, pipeline: Pipeline) {
        self.state.borrow_mut().pipelines.remove(&pipeline);
    }

    fn destroy_render_target_view(&self, view: RenderTargetView) {
        let mut s = self.state.borrow_mut();
        let referenced = s.pending(|c| matches!(c, Cmd::SetRenderTargets(v, _) if *v == view));
        assert!(!referenced, "destroying {view:?} while submitted work references it");
        s.rtvs.remove(&view);
        s.events.push(Event::DestroyRenderTargetView(view));
    }

    fn destroy_depth_stencil_view(&self, view: DepthStencilView) {
        let mut s = self.state.borrow_mut();
        let referenced = s.pending(|c| matches!(c, Cmd::SetRenderTargets(_, Some(v)) if *v == view));
        assert!(!referenced, "destroying {view:?} while submitted work references it");
        s.dsvs.remove(&view);
    }

    fn map_buffer(&self, buffer: Buffer) -> GpuResult<()> {
        let mut s = self.state.borrow_mut();
        let record = s.buffers.get_mut(&buffer).expect("map of unknown buffer");
        if record.location != MemoryLocation::Upload {
            return Err(GpuError::resource("buffer mapping", "device-local memory is not mappable"));
        }
        record.mapped = true;
        s.events.push(Event::Map(buffer));
        Ok(())
    }

    fn write_mapped(&self, buffer: Buffer, offset: u64, bytes: &[u8]) -> GpuResult<()> {
        let mut s = self.state.borrow_mut();
        let record = s.buffers.get_mut(&buffer).expect("write to unknown buffer");
        if !record.mapped {
            return Err(GpuError::resource("buffer mapping", "buffer is not mapped"));
        }
        let start = offset as usize;
        let Some(dst) = record.contents.get_mut(start..start + bytes.len()) else {
            return Err(GpuError::resource("buffer mapping", "write past the end of the buffer"));
        };
        dst.copy_from_slice(bytes);
        s.events.push(Event::Write {
            buffer,
            offset,
            len: bytes.len(),
        });
        Ok(())
    }

    fn unmap_buffer(&self, buffer: Buffer) {
        let mut s = self.state.borrow_mut();
        let record = s.buffers.get_mut(&buffer).expect("unmap of unknown buffer");
        record.mapped = false;
        let contents = record.contents.clone();
        s.events.push(Event::Unmap { buffer, contents });
    }

    fn reset_command_allocator(&self, allocator: CommandAllocator) -> GpuResult<()> {
        let mut s = self.state.borrow_mut();
        assert!(s.allocators.contains(&allocator), "reset of unknown {allocator:?}");
        let in_flight = s.queue.iter().any(|w| matches!(w, Work::Execute { allocator: Some(a), .. } if *a == allocator));
        assert!(!in_flight, "resetting {allocator:?} while its commands are in flight");
        let recording = s.lists.values().any(|l| l.open && l.allocator == Some(allocator));
        assert!(!recording, "resetting {allocator:?} while a list is recording into it");
        s.events.push(Event::ResetAllocator(allocator));
        Ok(())
    }

    fn reset_command_list(
        &self,
        list: CommandList,
        allocator: CommandAllocator,
        initial_pipeline: Option<Pipeline>,
    ) -> GpuResult<()> {
        let mut s = self.state.borrow_mut();
        let record = s.list_mut(list);
        assert!(!record.open, "resetting {list:?} while it is open");
        record.open = true;
        record.allocator = Some(allocator);
        record.commands.clear();
        if let Some(pipeline) = initial_pipeline {
            record.commands.push(Cmd::SetPipeline(pipeline));
        }
        s.events.push(Event::ResetList { list, allocator });
        Ok(())
    }

    fn close_command_list(&self, list: CommandList) -> GpuResult<()> {
        let mut s = self.state.borrow_mut();
        let record = s.list_mut(list);
        if !record.open {
            return Err(GpuError::Submission(format!("{list:?} is already closed")));
        }
        record.open = false;
        s.events.push(Event::Close(list));
        Ok(())
    }

    fn cmd_set_root_signature(&self, list: CommandList, root_signature: RootSignature) {
        self.record(list, Cmd::SetRootSignature(root_signature));
    }

    fn cmd_set_root_constants(&self, list: CommandList, values: &[u32]) {
        self.record(list, Cmd::SetRootConstants(values.to_vec()));
    }

    fn cmd_set_vertex_buffer(&self, list: CommandList, view: &VertexBufferView) {
        self.record(list, Cmd::SetVertexBuffer(*view));
    }

    fn cmd_set_index_buffer(&self, list: CommandList, view: &IndexBufferView) {
        self.record(list, Cmd::SetIndexBuffer(*view));
    }

    fn cmd_set_topology(&self, list: CommandList, topology: Topology) {
        self.record(list, Cmd::SetTopology(topology));
    }

    fn cmd_set_viewport(&self, list: CommandList, viewport: &Viewport) {
        self.record(list, Cmd::SetViewport(*viewport));
    }

    fn cmd_set_scissor(&self, list: CommandList, scissor: &Scissor) {
        self.record(list, Cmd::SetScissor(*scissor));
    }

    fn cmd_set_render_targets(
        &self,
        list: CommandList,
        color: RenderTargetView,
        depth: Option<DepthStencilView>,
    ) {
        self.record(list, Cmd::SetRenderTargets(color, depth));
    }

    fn cmd_clear_render_target(&self, list: CommandList, view: RenderTargetView, color: [f32; 4]) {
        self.record(list, Cmd::ClearRenderTarget(view, color));
    }

    fn cmd_clear_depth(&self, list: CommandList, view: DepthStencilView, depth: f32) {
        self.record(list, Cmd::ClearDepth(view, depth));
    }

    fn cmd_draw_indexed(&self, list: CommandList, index_count: u32, instance_count: u32) {
        self.record(
            list,
            Cmd::DrawIndexed {
                index_count,
                instance_count,
            },
        );
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
        self.record(
            list,
            Cmd::Copy {
                dst,
                dst_offset,
                src,
                src_offset,
                size,
            },
        );
    }

    fn cmd_resource_barriers(&self, list: CommandList, barriers: &[ResourceBarrier]) {
        self.record(list, Cmd::Barriers(barriers.to_vec()));
    }

    fn execute_command_lists(&self, _queue: Queue, lists: &[CommandList]) -> GpuResult<()> {
        let mut s = self.state.borrow_mut();
        for &list in lists {
            let record = s.list_mut(list);
            if record.open {
                return Err(GpuError::Submission(format!("{list:?} was not closed")));
            }
            let work = Work::Execute {
                list,
                allocator: record.allocator,
                commands: record.commands.clone(),
            };
            s.queue.push_back(work);
        }
        s.events.push(Event::Execute(lists.to_vec()));
        Ok(())
    }

    fn signal(&self, _queue: Queue, fence: Fence, value: u64) -> GpuResult<()> {
        let mut s = self.state.borrow_mut();
        s.queue.push_back(Work::Signal { fence, value });
        s.events.push(Event::Signal { fence, value });
        Ok(())
    }

    fn fence_completed_value(&self, fence: Fence) -> u64 {
        self.state.borrow().fences[&fence]
    }

    fn wait_for_fence(&self, fence: Fence, value: u64) -> GpuResult<()> {
        let mut s = self.state.borrow_mut();
        s.events.push(Event::Wait { fence, value });
        while s.fences[&fence] < value {
            if !s.step() {
                return Err(GpuError::SynchronizationTimeout(format!(
                    "{fence:?} will never reach {value}"
                )));
            }
        }
        Ok(())
    }

    fn swap_chain_format(&self) -> TextureFormat {
        TextureFormat::Rgba8UnormSrgb
    }

    fn swap_chain_extent(&self) -> Extent2d {
        self.state.borrow().swap_extent
    }

    fn swap_chain_image_count(&self) -> u32 {
        self.state.borrow().swap_images.len() as u32
    }

    fn current_back_buffer_index(&self) -> u32 {
        let s = self.state.borrow();
        s.swap_sequence[s.swap_cursor % s.swap_sequence.len()]
    }

    fn swap_chain_buffer(&self, index: u32) -> GpuResult<Texture> {
        self.state
            .borrow()
            .swap_images
            .get(index as usize)
            .copied()
            .ok_or_else(|| GpuError::resource("swap-chain buffer", format!("no image {index}")))
    }

    fn present(&self) -> GpuResult<()> {
        let image = self.current_back_buffer_index();
        let mut s = self.state.borrow_mut();
        s.swap_cursor += 1;
        s.events.push(Event::Present { image });
        Ok(())
    }

    fn resize_swap_chain(&self, width: u32, height: u32) -> GpuResult<()> {
        let mut s = self.state.borrow_mut();
        let images = s.swap_images.clone();
        if s.rtvs.values().any(|t| images.contains(t)) {
            return Err(GpuError::Present(
                "swap-chain images still have render-target views".into(),
            ));
        }
        let extent = Extent2d::new(width, height);
        s.swap_extent = extent;
        s.events.push(Event::ResizeSwapChain(extent));
        Ok(())
    }
}
