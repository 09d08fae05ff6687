mod cube;

use std::path::PathBuf;

use helium_engine::device::backend::GpuInit;
use helium_engine::logging::{LoggingConfig, init_logging};
use helium_engine::render::RendererConfig;
use helium_engine::window::{Runtime, RuntimeConfig};

use cube::CubeApp;

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let geometry = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| manifest_dir.join("assets").join("cube.obj"));
    log::info!("geometry: {}", geometry.display());

    let renderer = RendererConfig {
        shader_dir: manifest_dir.join("shaders"),
        ..Default::default()
    };
    let window = RuntimeConfig {
        title: "helium cube".to_string(),
        ..Default::default()
    };

    Runtime::run(window, GpuInit::default(), renderer, CubeApp::new(geometry))
}
