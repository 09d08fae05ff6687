use std::path::PathBuf;

use crate::device::{GpuError, GpuResult};
use crate::render::config::RendererConfig;

/// Reads compiled shader bytecode from a base directory.
#[derive(Debug, Clone)]
pub struct ShaderLoader {
    base_dir: PathBuf,
}

impl ShaderLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn load_compiled_shader(&self, name: &str) -> GpuResult<Vec<u8>> {
        let path = self.base_dir.join(name);
        log::debug!("loading shader {}", path.display());
        std::fs::read(&path).map_err(|source| GpuError::ShaderLoad { path, source })
    }
}

/// Bytecode for both pipeline stages.
#[derive(Debug, Clone)]
pub struct ShaderSet {
    pub vertex: Vec<u8>,
    pub pixel: Vec<u8>,
}

impl ShaderSet {
    pub fn load(config: &RendererConfig) -> GpuResult<Self> {
        let loader = ShaderLoader::new(&config.shader_dir);
        Ok(Self {
            vertex: loader.load_compiled_shader(&config.vertex_shader)?,
            pixel: loader.load_compiled_shader(&config.pixel_shader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("helium-shader-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn loads_bytes_relative_to_base_dir() {
        let dir = scratch_dir("load");
        std::fs::write(dir.join("vertex.wgsl"), b"@vertex fn vs_main() {}").unwrap();
        let bytes = ShaderLoader::new(&dir).load_compiled_shader("vertex.wgsl").unwrap();
        assert_eq!(bytes, b"@vertex fn vs_main() {}");
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_shader_reports_path() {
        let dir = scratch_dir("missing");
        let err = ShaderLoader::new(&dir).load_compiled_shader("pixel.wgsl").unwrap_err();
        match err {
            GpuError::ShaderLoad { path, source } => {
                assert_eq!(path, dir.join("pixel.wgsl"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error {other:?}"),
        }
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn shader_set_uses_configured_names() {
        let dir = scratch_dir("set");
        std::fs::write(dir.join("a.wgsl"), b"a").unwrap();
        std::fs::write(dir.join("b.wgsl"), b"b").unwrap();
        let config = RendererConfig {
            shader_dir: dir.clone(),
            vertex_shader: "a.wgsl".into(),
            pixel_shader: "b.wgsl".into(),
            ..RendererConfig::default()
        };
        let set = ShaderSet::load(&config).unwrap();
        assert_eq!((set.vertex.as_slice(), set.pixel.as_slice()), (&b"a"[..], &b"b"[..]));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
