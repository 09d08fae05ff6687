use winit::dpi::PhysicalSize;

use crate::device::{GpuError, GpuResult, Texture};

/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum SurfaceErrorAction {
    /// Surface was reconfigured; acquisition may be retried.
    Reconfigured,
    /// Transient error; acquisition may be retried.
    Retry,
    /// Fatal error (commonly OOM).
    Fatal,
}

/// Picks an 8-bit-per-channel surface format and the format render-target
/// views of it use.
pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<(wgpu::TextureFormat, wgpu::TextureFormat)> {
    let preferred = [
        wgpu::TextureFormat::Rgba8Unorm,
        wgpu::TextureFormat::Bgra8Unorm,
        wgpu::TextureFormat::Rgba8UnormSrgb,
        wgpu::TextureFormat::Bgra8UnormSrgb,
    ];
    let format = preferred.into_iter().find(|f| caps.formats.contains(f))?;
    let view_format = if prefer_srgb {
        format.add_srgb_suffix()
    } else {
        format.remove_srgb_suffix()
    };
    Some((format, view_format))
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

pub(crate) fn apply_resize(
    surface: &wgpu::Surface,
    device: &wgpu::Device,
    config: &mut wgpu::SurfaceConfiguration,
    size: &mut PhysicalSize<u32>,
    new_size: PhysicalSize<u32>,
) {
    *size = new_size;
    if new_size.width == 0 || new_size.height == 0 {
        return;
    }

    config.width = new_size.width;
    config.height = new_size.height;

    surface.configure(device, config);
}

pub(crate) fn map_surface_error(
    surface: &wgpu::Surface,
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    err: &wgpu::SurfaceError,
) -> SurfaceErrorAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
            if size.width > 0 && size.height > 0 {
                surface.configure(device, config);
            }
            SurfaceErrorAction::Reconfigured
        }
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        wgpu::SurfaceError::Timeout => SurfaceErrorAction::Retry,
        wgpu::SurfaceError::Other => SurfaceErrorAction::Retry,
    }
}

struct Acquired {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

/// Two-image flip swap chain emulated on a wgpu surface.
///
/// wgpu hands out one surface texture at a time. The image is acquired
/// lazily, the first time a frame binds it as a render target, and released
/// by [`present`](Self::present), which also advances the back-buffer index.
pub(crate) struct SwapChain {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    view_format: wgpu::TextureFormat,
    size: PhysicalSize<u32>,
    images: [Texture; 2],
    current: u32,
    acquired: Option<Acquired>,
}

impl SwapChain {
    pub(crate) fn new(
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        view_format: wgpu::TextureFormat,
        size: PhysicalSize<u32>,
        images: [Texture; 2],
    ) -> Self {
        Self {
            surface,
            config,
            view_format,
            size,
            images,
            current: 0,
            acquired: None,
        }
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub(crate) fn current(&self) -> u32 {
        self.current
    }

    pub(crate) fn images(&self) -> &[Texture; 2] {
        &self.images
    }

    pub(crate) fn image_index(&self, texture: Texture) -> Option<u32> {
        self.images.iter().position(|t| *t == texture).map(|i| i as u32)
    }

    /// Acquires the surface texture backing image `index` if not yet held.
    pub(crate) fn acquire(&mut self, device: &wgpu::Device, index: u32) -> GpuResult<()> {
        if index != self.current {
            return Err(GpuError::Present(format!(
                "image {index} bound while image {} is the back buffer",
                self.current
            )));
        }
        if self.acquired.is_some() {
            return Ok(());
        }
        let texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(err) => {
                let action = map_surface_error(&self.surface, device, &self.config, self.size, &err);
                log::debug!("surface acquire failed ({err}); {action:?}");
                if action == SurfaceErrorAction::Fatal {
                    return Err(GpuError::Present(err.to_string()));
                }
                self.surface
                    .get_current_texture()
                    .map_err(|e| GpuError::Present(e.to_string()))?
            }
        };
        let view = texture.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("helium back buffer view"),
            format: Some(self.view_format),
            ..Default::default()
        });
        self.acquired = Some(Acquired { texture, view });
        Ok(())
    }

    /// View of the acquired back buffer.
    pub(crate) fn view(&self) -> GpuResult<&wgpu::TextureView> {
        self.acquired
            .as_ref()
            .map(|a| &a.view)
            .ok_or_else(|| GpuError::Present("back buffer used before acquisition".into()))
    }

    pub(crate) fn present(&mut self) {
        match self.acquired.take() {
            Some(acquired) => acquired.texture.present(),
            None => log::warn!("present without a rendered back buffer"),
        }
        self.current = (self.current + 1) % self.images.len() as u32;
    }

    pub(crate) fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> GpuResult<()> {
        if self.acquired.is_some() {
            return Err(GpuError::Present("resize while a back buffer is held".into()));
        }
        apply_resize(
            &self.surface,
            device,
            &mut self.config,
            &mut self.size,
            PhysicalSize::new(width, height),
        );
        self.current = 0;
        Ok(())
    }
}
