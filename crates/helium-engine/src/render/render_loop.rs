use std::thread;
use std::time::Duration;

use anyhow::Context;
use glam::Mat4;

use crate::core::{App, AppControl, FrameCtx};
use crate::device::backend::{GpuInit, PresentTarget, WgpuDevice};
use crate::device::{Device, GpuResult};
use crate::render::config::RendererConfig;
use crate::render::renderer::Renderer;
use crate::render::shader::ShaderSet;
use crate::time::FrameClock;
use crate::window::RenderSignals;

/// How often a minimized renderer checks for a new size or exit.
const SUSPENDED_POLL: Duration = Duration::from_millis(16);

/// Render-thread entry point: sets up the device, uploads the app's mesh,
/// reports readiness and renders until exit is requested.
pub(crate) fn run<A: App>(
    target: PresentTarget,
    gpu_init: &GpuInit,
    config: RendererConfig,
    signals: &RenderSignals,
    app: &mut A,
    on_ready: impl FnOnce(),
) -> anyhow::Result<()> {
    let device = WgpuDevice::new(target, gpu_init).context("failed to create GPU device")?;
    let shaders = ShaderSet::load(&config).context("failed to load shaders")?;
    let mesh = app.load_mesh().context("failed to load geometry")?;

    let mut renderer =
        Renderer::new(device, config, &shaders).context("failed to create renderer")?;
    renderer
        .upload_geometry(&mesh)
        .context("failed to upload geometry")?;

    on_ready();
    drive(&mut renderer, signals, app).context("frame loop failed")?;
    Ok(())
}

/// Renders frames until `signals` asks for exit or the app returns
/// [`AppControl::Exit`], then drains the queue.
pub(crate) fn drive<D: Device, A: App>(
    renderer: &mut Renderer<D>,
    signals: &RenderSignals,
    app: &mut A,
) -> GpuResult<()> {
    let mut clock = FrameClock::new();
    let mut view = Mat4::IDENTITY;

    while !signals.exit_requested() {
        if let Some((width, height)) = signals.take_resize() {
            let was_minimized = renderer.is_minimized();
            renderer.resize(width, height)?;
            if was_minimized && !renderer.is_minimized() {
                clock.reset();
            }
        }

        if renderer.is_minimized() {
            thread::sleep(SUSPENDED_POLL);
            continue;
        }

        let mut ctx = FrameCtx {
            time: clock.tick(),
            extent: renderer.extent(),
            view: &mut view,
        };
        if app.on_frame(&mut ctx) == AppControl::Exit {
            log::debug!("app requested exit");
            break;
        }
        renderer.render_frame(view)?;
    }

    log::debug!("draining GPU queue before teardown");
    renderer.drain()
}
