use std::path::PathBuf;

use anyhow::Context;
use glam::{EulerRot, Mat4, Vec3};
use helium_engine::core::{App, AppControl, FrameCtx};
use helium_engine::render::MeshData;

/// Radians the cube turns per second of frames at 60 fps.
const SPIN_RATE: f32 = 0.25;

/// Distance from the camera to the cube center.
const CAMERA_DISTANCE: f32 = 3.0;

/// Spinning mesh loaded from a Wavefront file.
pub struct CubeApp {
    geometry: PathBuf,
}

impl CubeApp {
    pub fn new(geometry: impl Into<PathBuf>) -> Self {
        Self {
            geometry: geometry.into(),
        }
    }
}

/// View matrix for frame `frame_index`: the mesh pitched and rolled by the
/// same angle, then pushed away from the camera.
pub fn view_at(frame_index: u64) -> Mat4 {
    let angle = frame_index as f32 / 60.0 * SPIN_RATE;
    Mat4::from_translation(Vec3::new(0.0, 0.0, CAMERA_DISTANCE))
        * Mat4::from_euler(EulerRot::YXZ, 0.0, angle, angle)
}

impl App for CubeApp {
    fn load_mesh(&mut self) -> anyhow::Result<MeshData> {
        let obj = helium_wavefront::load(&self.geometry)
            .with_context(|| format!("failed to load {}", self.geometry.display()))?;
        log::info!(
            "loaded {} vertices, {} triangles",
            obj.positions.len(),
            obj.triangle_count()
        );
        let indices = obj.index_list();
        MeshData::new(obj.positions, indices)
            .with_context(|| format!("unusable geometry in {}", self.geometry.display()))
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_>) -> AppControl {
        *ctx.view = view_at(ctx.time.frame_index);
        AppControl::Continue
    }
}
