// =============================================================================
// QUAD RENDERER - minimal Vulkan renderer
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (App)                                         │
// │    └── Renderer (all Vulkan state)                              │
// │          ├── Instance + Surface + Device                        │
// │          ├── Swapchain + Framebuffers + Render pass + Pipeline  │
// │          ├── Vertex / index buffers                             │
// │          └── Per-frame command buffers, semaphores, fences      │
// └─────────────────────────────────────────────────────────────────┘
//
// Any Vulkan failure is fatal: the event loop stops and main returns the
// error, naming the step that failed.
//
// =============================================================================

mod backend;
mod config;
mod frame;
mod geometry;
mod renderer;

use anyhow::{Context, Result};
use config::Config;
use renderer::Renderer;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, config_source) = Config::load();

    init_logging(&config);
    log::info!("Starting quad renderer");
    config_source.log();
    log::debug!("Config: {:?}", config);
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop terminated abnormally")?;

    app.into_result()
}

/// Initialize logging. RUST_LOG overrides the default `info` level.
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info).parse_default_env();

    if config.debug.log_to_file {
        match std::fs::File::create(&config.debug.log_file) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!(
                    "Could not open log file {}: {}, logging to stderr",
                    config.debug.log_file, e
                );
            }
        }
    }

    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// The renderer is declared before the window so the surface is destroyed
/// while the window still exists.
struct App {
    config: Config,
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,
    is_fullscreen: bool,

    /// First fatal error; returned from main after the loop exits
    fatal: Option<anyhow::Error>,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let now = Instant::now();
        Self {
            config,
            renderer: None,
            window: None,
            is_fullscreen,
            fatal: None,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    fn into_result(mut self) -> Result<()> {
        // Tear down Vulkan before reporting
        self.renderer = None;
        match self.fatal.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
        event_loop.exit();
    }

    fn create_window(&self, event_loop: &ActiveEventLoop) -> Result<Arc<Window>> {
        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = event_loop
            .create_window(window_attributes)
            .context("Failed to create window")?;
        Ok(Arc::new(window))
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(window), Some(renderer)) = (&self.window, &mut self.renderer) else {
            return Ok(());
        };

        let size = window.inner_size();
        if renderer.draw_frame(size.width, size.height)? {
            self.update_fps();
        }
        Ok(())
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
        }
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

/// A zero-sized window has nothing to present to
fn is_minimized(size: PhysicalSize<u32>) -> bool {
    size.width == 0 || size.height == 0
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match self.create_window(event_loop) {
            Ok(window) => window,
            Err(e) => return self.fail(event_loop, e),
        };

        match Renderer::new(&self.config, &window) {
            Ok(renderer) => {
                log::info!("Rendering with {} frames in flight", renderer.frames_in_flight());
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => self.fail(event_loop, e.context("Failed to initialize Vulkan")),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref renderer) = self.renderer {
                    if let Err(e) = renderer.wait_idle() {
                        log::error!("{:#}", e);
                    }
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(ref mut renderer) = self.renderer {
                    renderer.request_recreate();
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                event_loop.exit();
                            }
                            KeyCode::F11 => self.toggle_fullscreen(),
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws, and sleep until the next event while
    /// minimized.
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(ref window) = self.window else {
            return;
        };

        if is_minimized(window.inner_size()) {
            event_loop.set_control_flow(ControlFlow::Wait);
        } else {
            event_loop.set_control_flow(ControlFlow::Poll);
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Vulkan objects go before the window they present to
        self.renderer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimized_window_is_not_redrawn() {
        assert!(is_minimized(PhysicalSize::new(0, 0)));
        assert!(is_minimized(PhysicalSize::new(800, 0)));
        assert!(is_minimized(PhysicalSize::new(0, 600)));
        assert!(!is_minimized(PhysicalSize::new(800, 600)));
    }
}
