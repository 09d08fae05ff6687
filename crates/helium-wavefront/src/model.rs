/// A vertex reference inside a face, exactly as written in the source (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceVertex {
    pub position: u32,
    pub uvw: Option<u32>,
    pub normal: Option<u32>,
}

/// A triangular face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    pub vertices: [FaceVertex; 3],
}

/// Parsed geometry. Face indices keep the source's 1-based numbering; use
/// [`Wavefront::triangles`] or [`Wavefront::index_list`] for 0-based indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wavefront {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvws: Vec<[f32; 3]>,
    pub faces: Vec<Face>,
}

impl Wavefront {
    /// Position triangles with 0-based indices.
    ///
    /// Indices are range-checked at parse time, so the subtraction cannot wrap.
    pub fn triangles(&self) -> Vec<[u32; 3]> {
        self.faces
            .iter()
            .map(|f| f.vertices.map(|v| v.position - 1))
            .collect()
    }

    /// Flat triangle-list index buffer (3 indices per face, 0-based).
    pub fn index_list(&self) -> Vec<u32> {
        self.triangles().into_iter().flatten().collect()
    }

    pub fn triangle_count(&self) -> usize {
        self.faces.len()
    }
}
