//! Command list emulation.
//!
//! A list owns a `wgpu::CommandEncoder` while open. Pipeline state set on the
//! list is buffered and flushed into a render pass at each draw; pending
//! clears become the load operations of that pass.

use crate::device::{
    CommandAllocator, DepthStencilView, GpuError, GpuResult, IndexBufferView, Pipeline,
    RenderTargetView, RootSignature, Scissor, VertexBufferView, Viewport,
};

use super::{Objects, SwapChain};

#[derive(Default)]
pub(super) struct PassState {
    pub root_signature: Option<RootSignature>,
    pub pipeline: Option<Pipeline>,
    pub constants: Vec<u32>,
    pub vertex: Option<VertexBufferView>,
    pub index: Option<IndexBufferView>,
    pub viewport: Option<Viewport>,
    pub scissor: Option<Scissor>,
    pub color: Option<RenderTargetView>,
    pub depth: Option<DepthStencilView>,
    pub clear_color: Option<[f32; 4]>,
    pub clear_depth: Option<f32>,
}

pub(super) struct Recording {
    pub encoder: wgpu::CommandEncoder,
    pub state: PassState,
    error: Option<GpuError>,
}

impl Recording {
    pub fn new(encoder: wgpu::CommandEncoder, pipeline: Option<Pipeline>) -> Self {
        Self {
            encoder,
            state: PassState {
                pipeline,
                ..Default::default()
            },
            error: None,
        }
    }

    /// Keeps the first recording error; it is reported when the list closes.
    pub fn fail(&mut self, error: GpuError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn has_pending_clears(&self) -> bool {
        self.state.clear_color.is_some() || self.state.clear_depth.is_some()
    }

    /// Ends recording, yielding the finished command buffer or the first error.
    pub fn finish(mut self, objects: &Objects, swap: &SwapChain) -> GpuResult<wgpu::CommandBuffer> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        if self.has_pending_clears() {
            self.flush_clears(objects, swap)?;
        }
        Ok(self.encoder.finish())
    }

    /// Runs a pass that only performs the pending clears.
    pub fn flush_clears(&mut self, objects: &Objects, swap: &SwapChain) -> GpuResult<()> {
        let color = self
            .state
            .color
            .ok_or_else(|| GpuError::Submission("clear recorded without a render target".into()))?;
        let color_view = objects.render_target(color, swap)?;
        let depth_view = self.state.depth.map(|d| objects.depth_view(d)).transpose()?;
        let clear_color = self.state.clear_color.take();
        let clear_depth = self.state.clear_depth.take();

        begin_pass(
            &mut self.encoder,
            "helium clear pass",
            color_view,
            depth_view,
            clear_color,
            clear_depth,
        );
        Ok(())
    }

    pub fn draw_indexed(
        &mut self,
        objects: &Objects,
        swap: &SwapChain,
        index_count: u32,
        instance_count: u32,
    ) -> GpuResult<()> {
        let missing = |what: &str| GpuError::Submission(format!("draw recorded without {what}"));

        let pipeline_id = self.state.pipeline.ok_or_else(|| missing("a pipeline"))?;
        let pipeline = objects.pipeline(pipeline_id)?;
        if self.state.root_signature != Some(pipeline.root_signature) {
            return Err(GpuError::Submission(
                "bound root signature does not match the pipeline".into(),
            ));
        }
        let vertex = self.state.vertex.ok_or_else(|| missing("a vertex buffer"))?;
        let index = self.state.index.ok_or_else(|| missing("an index buffer"))?;
        let vertex_buffer = objects.buffer(vertex.buffer)?;
        let index_buffer = objects.buffer(index.buffer)?;
        let color = self.state.color.ok_or_else(|| missing("a render target"))?;
        let color_view = objects.render_target(color, swap)?;
        let depth_view = self.state.depth.map(|d| objects.depth_view(d)).transpose()?;
        let clear_color = self.state.clear_color.take();
        let clear_depth = self.state.clear_depth.take();

        let mut pass = begin_pass(
            &mut self.encoder,
            "helium draw pass",
            color_view,
            depth_view,
            clear_color,
            clear_depth,
        );
        pass.set_pipeline(&pipeline.pipeline);
        if !self.state.constants.is_empty() {
            pass.set_immediates(0, bytemuck::cast_slice(&self.state.constants));
        }
        pass.set_vertex_buffer(0, vertex_buffer.slice(..vertex.size));
        pass.set_index_buffer(index_buffer.slice(..index.size), super::index_format(index.format));
        if let Some(v) = self.state.viewport {
            pass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
        }
        if let Some(s) = self.state.scissor {
            pass.set_scissor_rect(s.x, s.y, s.width, s.height);
        }
        pass.draw_indexed(0..index_count, 0, 0..instance_count);
        Ok(())
    }
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &'static str,
    color_view: &wgpu::TextureView,
    depth_view: Option<&wgpu::TextureView>,
    clear_color: Option<[f32; 4]>,
    clear_depth: Option<f32>,
) -> wgpu::RenderPass<'e> {
    let color_load = match clear_color {
        Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        }),
        None => wgpu::LoadOp::Load,
    };
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: color_load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load: clear_depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    })
}

/// A command list slot. `recording` is present between reset and close;
/// `finished` holds the closed list until it is executed.
#[derive(Default)]
pub(super) struct ListSlot {
    pub allocator: Option<CommandAllocator>,
    pub recording: Option<Recording>,
    pub finished: Option<wgpu::CommandBuffer>,
    /// Commands recorded while the list was closed.
    pub misuse: Option<GpuError>,
}
