//! Textured spinning cube.
//!
//! Runs headless for a fixed number of frames by default. With `--windowed`
//! the cube is presented into a winit window:
//!
//! - `V` toggles vsync
//! - `Escape` closes the window
//!
//! ```bash
//! cargo run --bin cube_demo -- --windowed
//! ```

use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use redlilium_demos::{CubeDemo, DemoArgs, DemoConfig, DemoSettings, ResizeDebouncer, StatsOverlay};
use redlilium_rhi::types::WindowHandle;

/// Quiet period before a burst of resize events is applied.
const RESIZE_DEBOUNCE: Duration = Duration::from_millis(100);

/// Fixed timestep of headless runs.
const HEADLESS_DT: f32 = 1.0 / 60.0;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    redlilium_rhi::init();

    let args = DemoArgs::parse();
    let mut config = DemoConfig::load(&args.config_path());
    args.apply(&mut config);

    let result = if args.windowed {
        run_windowed(&config, args.frame_limit())
    } else {
        run_headless(&config, args.frame_limit().unwrap_or_default())
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_headless(config: &DemoConfig, frames: u64) -> Result<(), String> {
    let settings = DemoSettings::from(config);
    let mut demo = CubeDemo::init(&settings, None).map_err(|e| format!("Failed to initialize demo: {e}"))?;
    demo.set_overlay(Box::new(StatsOverlay::new(settings.width, settings.height)));

    let start = Instant::now();
    for _ in 0..frames {
        demo.tick(HEADLESS_DT).map_err(|e| format!("Frame failed: {e}"))?;
    }
    let elapsed = start.elapsed();
    log::info!(
        "Rendered {} frames in {:.2?} ({} fence waits)",
        demo.frame_count(),
        elapsed,
        demo.stats().fence_waits
    );
    demo.shutdown().map_err(|e| format!("Shutdown failed: {e}"))
}

fn run_windowed(config: &DemoConfig, frame_limit: Option<u64>) -> Result<(), String> {
    let event_loop = EventLoop::new().map_err(|e| format!("Failed to create event loop: {e}"))?;
    let mut app = WindowedDemo::new(config, frame_limit);
    event_loop
        .run_app(&mut app)
        .map_err(|e| format!("Event loop error: {e}"))?;
    match app.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Window, demo and resize state of a windowed run.
struct WindowedDemo {
    settings: DemoSettings,
    title: String,
    frame_limit: Option<u64>,
    // Dropped before `window`
    demo: Option<CubeDemo>,
    window: Option<Window>,
    resize: Option<ResizeDebouncer>,
    last_frame: Instant,
    error: Option<String>,
}

impl WindowedDemo {
    fn new(config: &DemoConfig, frame_limit: Option<u64>) -> Self {
        Self {
            settings: DemoSettings::from(config),
            title: config.window.title.clone(),
            frame_limit,
            demo: None,
            window: None,
            resize: None,
            last_frame: Instant::now(),
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), String> {
        let attributes = Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(self.settings.width, self.settings.height));
        let window = event_loop
            .create_window(attributes)
            .map_err(|e| format!("Failed to create window: {e}"))?;
        log::info!("Window created");

        let handle = WindowHandle {
            window: window
                .window_handle()
                .map_err(|e| format!("No window handle: {e}"))?
                .as_raw(),
            display: window
                .display_handle()
                .map_err(|e| format!("No display handle: {e}"))?
                .as_raw(),
        };
        let size = window.inner_size();
        let mut settings = self.settings.clone();
        settings.width = size.width.max(1);
        settings.height = size.height.max(1);

        let mut demo =
            CubeDemo::init(&settings, Some(handle)).map_err(|e| format!("Failed to initialize demo: {e}"))?;
        demo.set_overlay(Box::new(StatsOverlay::new(settings.width, settings.height)));

        self.demo = Some(demo);
        self.resize = Some(ResizeDebouncer::new((settings.width, settings.height), RESIZE_DEBOUNCE));
        self.window = Some(window);
        self.last_frame = Instant::now();
        Ok(())
    }

    fn render_frame(&mut self) -> Result<(), String> {
        let (Some(demo), Some(resize)) = (self.demo.as_mut(), self.resize.as_mut()) else {
            return Ok(());
        };
        // Nothing was rendered yet, so the first size is applied at once
        let released = if demo.frame_count() == 0 {
            resize.flush()
        } else {
            resize.update()
        };
        if let Some(event) = released {
            demo.on_size(event.width, event.height)
                .map_err(|e| format!("Resize failed: {e}"))?;
        }

        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        demo.tick(dt).map_err(|e| format!("Frame failed: {e}"))
    }

    fn limit_reached(&self) -> bool {
        match (self.frame_limit, self.demo.as_ref()) {
            (Some(limit), Some(demo)) => demo.frame_count() >= limit,
            _ => false,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: String) {
        log::error!("{error}");
        self.error = Some(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for WindowedDemo {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                event_loop.exit();
            }

            // Minimized windows report a zero size
            WindowEvent::Resized(size) if size.width > 0 && size.height > 0 => {
                if let Some(resize) = &mut self.resize {
                    resize.on_resize_event(size.width, size.height);
                }
            }

            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                match event.logical_key {
                    Key::Named(NamedKey::Escape) => event_loop.exit(),
                    Key::Character(ref c) if c.eq_ignore_ascii_case("v") => {
                        if let Some(demo) = &mut self.demo {
                            let vsync = !demo.desired_vsync();
                            demo.set_vsync(vsync);
                        }
                    }
                    _ => {}
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render_frame() {
                    self.fail(event_loop, e);
                    return;
                }
                if self.limit_reached() {
                    log::info!("Frame limit reached");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(demo) = self.demo.take() {
            if let Err(e) = demo.shutdown() {
                log::error!("Shutdown failed: {e}");
                self.error.get_or_insert_with(|| format!("Shutdown failed: {e}"));
            }
        }
    }
}
