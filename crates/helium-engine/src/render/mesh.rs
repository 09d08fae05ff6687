use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MeshError {
    #[error("mesh has no vertices")]
    NoVertices,
    #[error("mesh has no triangles")]
    NoTriangles,
    #[error("index count {0} is not a multiple of 3")]
    PartialTriangle(usize),
    #[error("index {index} at position {position} is out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        index: u32,
        position: usize,
        vertex_count: usize,
    },
}

/// Indexed triangle geometry ready for upload.
///
/// Positions are tightly packed `[f32; 3]`; indices are 32-bit and 0-based.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    positions: Vec<[f32; 3]>,
    indices: Vec<u32>,
}

impl MeshData {
    pub const VERTEX_STRIDE: u32 = std::mem::size_of::<[f32; 3]>() as u32;

    pub fn new(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Result<Self, MeshError> {
        if positions.is_empty() {
            return Err(MeshError::NoVertices);
        }
        if indices.is_empty() {
            return Err(MeshError::NoTriangles);
        }
        if indices.len() % 3 != 0 {
            return Err(MeshError::PartialTriangle(indices.len()));
        }
        if let Some((position, &index)) = indices
            .iter()
            .enumerate()
            .find(|(_, i)| **i as usize >= positions.len())
        {
            return Err(MeshError::IndexOutOfRange {
                index,
                position,
                vertex_count: positions.len(),
            });
        }
        Ok(Self { positions, indices })
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}
