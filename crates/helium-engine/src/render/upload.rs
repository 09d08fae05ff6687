//! One-shot staged upload of static geometry into device-local buffers.

use crate::device::{
    Buffer, BufferDesc, CommandAllocator, CommandList, Device, GpuResult, IndexBufferView,
    IndexFormat, MemoryLocation, Queue, ResourceState, VertexBufferView, transition,
};
use crate::render::fence::GpuFence;
use crate::render::mesh::MeshData;

/// Device-local geometry, resident and readable by the input assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryBuffers {
    pub vertex: VertexBufferView,
    pub index: IndexBufferView,
    pub index_count: u32,
}

impl GeometryBuffers {
    pub fn destroy(self, device: &dyn Device) {
        device.destroy_buffer(self.vertex.buffer);
        device.destroy_buffer(self.index.buffer);
    }
}

/// Upload-heap buffer holding the vertex bytes followed by the index bytes.
///
/// Only [`release`](Self::release) frees it, and callers release it only
/// after the fence confirms the copy finished. Dropping it unreleased leaks
/// the buffer rather than freeing memory the GPU may still be reading.
struct StagingBuffer<'d> {
    device: &'d dyn Device,
    buffer: Buffer,
    released: bool,
}

impl<'d> StagingBuffer<'d> {
    fn new(device: &'d dyn Device, size: u64) -> GpuResult<Self> {
        let buffer = device.create_buffer(&BufferDesc {
            label: "geometry staging",
            size,
            location: MemoryLocation::Upload,
            initial_state: ResourceState::GenericRead,
        })?;
        Ok(Self {
            device,
            buffer,
            released: false,
        })
    }

    fn fill(&self, parts: &[&[u8]]) -> GpuResult<()> {
        self.device.map_buffer(self.buffer)?;
        let mut offset = 0;
        for part in parts {
            if let Err(e) = self.device.write_mapped(self.buffer, offset, part) {
                self.device.unmap_buffer(self.buffer);
                return Err(e);
            }
            offset += part.len() as u64;
        }
        self.device.unmap_buffer(self.buffer);
        Ok(())
    }

    fn release(mut self) {
        self.device.destroy_buffer(self.buffer);
        self.released = true;
    }
}

impl Drop for StagingBuffer<'_> {
    fn drop(&mut self) {
        if !self.released {
            log::warn!("leaking staging buffer {:?}: copy completion was never confirmed", self.buffer);
        }
    }
}

/// Copies `mesh` into fresh device-local vertex and index buffers.
///
/// Blocks until the GPU has finished the copy, so the returned buffers are
/// immediately usable and the staging memory is already gone.
pub fn upload_geometry(
    device: &dyn Device,
    queue: Queue,
    fence: &mut GpuFence,
    mesh: &MeshData,
) -> GpuResult<GeometryBuffers> {
    let vertex_bytes = mesh.vertex_bytes();
    let index_bytes = mesh.index_bytes();
    let vertex_size = vertex_bytes.len() as u64;
    let index_size = index_bytes.len() as u64;

    let vertex_buffer = device.create_buffer(&BufferDesc {
        label: "vertex buffer",
        size: vertex_size,
        location: MemoryLocation::DeviceLocal,
        initial_state: ResourceState::CopyDest,
    })?;
    let index_buffer = device.create_buffer(&BufferDesc {
        label: "index buffer",
        size: index_size,
        location: MemoryLocation::DeviceLocal,
        initial_state: ResourceState::CopyDest,
    })?;

    let staging = StagingBuffer::new(device, vertex_size + index_size)?;
    staging.fill(&[vertex_bytes, index_bytes])?;

    let allocator = device.create_command_allocator()?;
    let list = device.create_command_list()?;
    record_copy(device, allocator, list, &staging, vertex_buffer, index_buffer, vertex_size, index_size)?;
    device.execute_command_lists(queue, &[list])?;
    let ticket = fence.bump(device, queue)?;
    fence.wait_for(device, ticket)?;

    staging.release();
    device.destroy_command_list(list);
    device.destroy_command_allocator(allocator);

    log::debug!(
        "uploaded {} vertices and {} indices ({} bytes)",
        mesh.positions().len(),
        mesh.index_count(),
        vertex_size + index_size
    );

    Ok(GeometryBuffers {
        vertex: VertexBufferView {
            buffer: vertex_buffer,
            size: vertex_size,
            stride: MeshData::VERTEX_STRIDE,
        },
        index: IndexBufferView {
            buffer: index_buffer,
            size: index_size,
            format: IndexFormat::Uint32,
        },
        index_count: mesh.index_count(),
    })
}

#[allow(clippy::too_many_arguments)]
fn record_copy(
    device: &dyn Device,
    allocator: CommandAllocator,
    list: CommandList,
    staging: &StagingBuffer<'_>,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    vertex_size: u64,
    index_size: u64,
) -> GpuResult<()> {
    device.reset_command_allocator(allocator)?;
    device.reset_command_list(list, allocator, None)?;
    device.cmd_copy_buffer_region(list, vertex_buffer, 0, staging.buffer, 0, vertex_size);
    device.cmd_copy_buffer_region(list, index_buffer, 0, staging.buffer, vertex_size, index_size);
    device.cmd_resource_barriers(
        list,
        &[
            transition(
                vertex_buffer,
                ResourceState::CopyDest,
                ResourceState::VertexAndConstantBuffer,
            ),
            transition(index_buffer, ResourceState::CopyDest, ResourceState::IndexBuffer),
        ],
    );
    device.close_command_list(list)
}
