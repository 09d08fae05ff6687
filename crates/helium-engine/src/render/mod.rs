//! Frame synchronization and geometry upload on top of [`crate::device`].

pub mod config;
pub mod constants;
pub mod fence;
pub mod frame;
pub mod mesh;
pub(crate) mod render_loop;
pub mod renderer;
pub mod shader;
pub mod upload;

pub use config::RendererConfig;
pub use constants::{ROOT_CONSTANT_COUNT, RootConstants};
pub use fence::GpuFence;
pub use frame::{FrameResourceTable, FrameResources, SlotState};
pub use mesh::{MeshData, MeshError};
pub use renderer::{FRAME_LAG, Renderer};
pub use shader::{ShaderLoader, ShaderSet};
pub use upload::{GeometryBuffers, upload_geometry};
