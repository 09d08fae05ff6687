use std::path::PathBuf;

use glam::Mat4;

use crate::device::Extent2d;

/// Renderer settings fixed at startup.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Directory the compiled shaders are read from.
    pub shader_dir: PathBuf,
    pub vertex_shader: String,
    pub pixel_shader: String,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    /// Vertical field of view.
    pub fov_y_degrees: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            shader_dir: default_shader_dir(),
            vertex_shader: "vertex.wgsl".into(),
            pixel_shader: "pixel.wgsl".into(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            fov_y_degrees: 90.0,
            z_near: 0.01,
            z_far: 100.0,
        }
    }
}

impl RendererConfig {
    /// Left-handed perspective projection for a target of `extent`.
    pub fn projection(&self, extent: Extent2d) -> Mat4 {
        Mat4::perspective_lh(
            self.fov_y_degrees.to_radians(),
            extent.aspect_ratio(),
            self.z_near,
            self.z_far,
        )
    }
}

/// `shaders/` next to the running executable.
fn default_shader_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("shaders")))
        .unwrap_or_else(|| PathBuf::from("shaders"))
}
