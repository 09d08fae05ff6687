use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::window::{Window, WindowId};

use crate::core::App;
use crate::device::backend::{GpuInit, PresentTarget};
use crate::render::RendererConfig;
use crate::render::render_loop;

use super::signals::RenderSignals;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "helium".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
        }
    }
}

/// Messages from the render thread to the window thread.
enum RuntimeEvent {
    /// Setup finished; the window may be shown.
    Ready,
    Finished(Result<()>),
}

/// Entry point for the runtime.
///
/// The calling thread runs the window event loop. Rendering happens on a
/// dedicated thread that owns the device and every GPU object; the two talk
/// through [`RenderSignals`] and event-loop user events only.
pub struct Runtime;

impl Runtime {
    pub fn run<A: App>(
        config: RuntimeConfig,
        gpu_init: GpuInit,
        renderer: RendererConfig,
        app: A,
    ) -> Result<()> {
        let event_loop = EventLoop::<RuntimeEvent>::with_user_event()
            .build()
            .context("failed to create winit EventLoop")?;
        let proxy = event_loop.create_proxy();
        let mut state = RuntimeState::new(config, gpu_init, renderer, app, proxy);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        state.join_render_thread();
        Ok(())
    }
}

/// Render-thread inputs, consumed when the window is created.
struct Pending<A> {
    gpu_init: GpuInit,
    renderer: RendererConfig,
    app: A,
}

struct RuntimeState<A: App> {
    config: RuntimeConfig,
    pending: Option<Pending<A>>,
    proxy: EventLoopProxy<RuntimeEvent>,
    signals: Arc<RenderSignals>,
    window: Option<Arc<Window>>,
    render_thread: Option<JoinHandle<()>>,
}

impl<A: App> RuntimeState<A> {
    fn new(
        config: RuntimeConfig,
        gpu_init: GpuInit,
        renderer: RendererConfig,
        app: A,
        proxy: EventLoopProxy<RuntimeEvent>,
    ) -> Self {
        Self {
            config,
            pending: Some(Pending {
                gpu_init,
                renderer,
                app,
            }),
            proxy,
            signals: Arc::new(RenderSignals::new()),
            window: None,
            render_thread: None,
        }
    }

    /// Creates the hidden window and hands its surface to a new render thread.
    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let Some(Pending {
            gpu_init,
            renderer,
            mut app,
        }) = self.pending.take()
        else {
            return Ok(());
        };

        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size)
            .with_visible(false);
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );
        let target =
            PresentTarget::new(Arc::clone(&window)).context("failed to create window surface")?;

        let signals = Arc::clone(&self.signals);
        let proxy = self.proxy.clone();
        let handle = thread::Builder::new()
            .name("helium-render".into())
            .spawn(move || {
                let ready = proxy.clone();
                let result = contain_panic(|| {
                    render_loop::run(
                        target,
                        &gpu_init,
                        renderer,
                        &signals,
                        &mut app,
                        move || {
                            let _ = ready.send_event(RuntimeEvent::Ready);
                        },
                    )
                });
                let _ = proxy.send_event(RuntimeEvent::Finished(result));
            })
            .context("failed to spawn render thread")?;

        self.window = Some(window);
        self.render_thread = Some(handle);
        Ok(())
    }

    fn join_render_thread(&mut self) {
        self.signals.request_exit();
        if let Some(handle) = self.render_thread.take() {
            if handle.join().is_err() {
                log::error!("render thread panicked");
            }
        }
    }
}

/// Runs the render thread body, turning a panic into an error so the window
/// thread always receives `Finished`.
fn contain_panic(body: impl FnOnce() -> Result<()>) -> Result<()> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!(
            "render thread panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

impl<A: App> ApplicationHandler<RuntimeEvent> for RuntimeState<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            log::error!("{e:#}");
            event_loop.exit();
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: RuntimeEvent) {
        match event {
            RuntimeEvent::Ready => {
                if let Some(window) = &self.window {
                    window.set_visible(true);
                }
            }
            RuntimeEvent::Finished(Ok(())) => {
                log::info!("render thread finished");
                self.join_render_thread();
                event_loop.exit();
            }
            RuntimeEvent::Finished(Err(e)) => {
                // GPU failures are fatal; there is no state to resume from.
                log::error!("{e:#}");
                std::process::exit(1);
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // The render thread paces itself; this thread only waits for events.
        event_loop.set_control_flow(ControlFlow::Wait);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.signals.request_exit();
                if self.render_thread.is_none() {
                    event_loop.exit();
                }
            }

            WindowEvent::Resized(size) => {
                self.signals.request_resize(size.width, size.height);
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    self.signals.request_resize(size.width, size.height);
                }
            }

            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AppControl, FrameCtx};
    use crate::render::MeshData;

    struct Broken;

    impl App for Broken {
        fn load_mesh(&mut self) -> Result<MeshData> {
            panic!("mesh table corrupted at slot {}", 3);
        }

        fn on_frame(&mut self, _ctx: &mut FrameCtx<'_>) -> AppControl {
            AppControl::Exit
        }
    }

    #[test]
    fn panicking_app_becomes_an_error() {
        let mut app = Broken;
        let err = contain_panic(|| app.load_mesh().map(drop)).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("render thread panicked"), "{msg}");
        assert!(msg.contains("mesh table corrupted at slot 3"), "{msg}");
    }

    #[test]
    fn static_panic_message_is_kept() {
        let err = contain_panic(|| panic!("reused slot")).unwrap_err();
        assert!(err.to_string().ends_with("reused slot"));
    }

    #[test]
    fn results_pass_through() {
        assert!(contain_panic(|| Ok(())).is_ok());
        let err = contain_panic(|| Err(anyhow!("device lost"))).unwrap_err();
        assert_eq!(err.to_string(), "device lost");
    }
}
