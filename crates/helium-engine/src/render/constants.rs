use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Number of 32-bit root constants the pipeline exposes to the vertex stage.
pub const ROOT_CONSTANT_COUNT: u32 = 32;

/// Per-draw constants: the view matrix followed by the projection matrix,
/// column-major, 16 floats each.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct RootConstants {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

impl RootConstants {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self {
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
        }
    }

    pub fn set_view(&mut self, view: Mat4) {
        self.view = view.to_cols_array_2d();
    }

    pub fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection.to_cols_array_2d();
    }

    pub fn as_words(&self) -> &[u32; ROOT_CONSTANT_COUNT as usize] {
        bytemuck::cast_ref(self)
    }
}

impl Default for RootConstants {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}
