//! UI overlay hook drawn after the cube.
//!
//! The demo rebinds the swap chain target with `Load` actions and no depth
//! attachment, then hands the command buffer to the installed [`Overlay`].

use std::time::Instant;

use redlilium_rhi::{CmdHandle, RenderTargetHandle, Renderer, RhiResult};

/// Consumer of the overlay pass.
pub trait Overlay {
    /// Record overlay commands into `cmd`. `render_target` is bound.
    fn draw(&mut self, renderer: &Renderer, cmd: CmdHandle, render_target: RenderTargetHandle) -> RhiResult<()>;

    /// Called after the swap chain was recreated at a new size.
    fn on_size(&mut self, _width: u32, _height: u32) {}
}

/// Overlay that tags every frame with its CPU frame time as a debug marker.
#[derive(Debug)]
pub struct StatsOverlay {
    last_frame: Option<Instant>,
    frames: u64,
    size: (u32, u32),
}

impl StatsOverlay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            last_frame: None,
            frames: 0,
            size: (width, height),
        }
    }

    /// Frames drawn.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Target size the overlay lays out for.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl Overlay for StatsOverlay {
    fn draw(&mut self, renderer: &Renderer, cmd: CmdHandle, _render_target: RenderTargetHandle) -> RhiResult<()> {
        let now = Instant::now();
        let frame_ms = self
            .last_frame
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32() * 1000.0);
        self.last_frame = Some(now);
        self.frames += 1;
        renderer.cmd_add_debug_marker(
            cmd,
            [1.0, 1.0, 0.0],
            &format!("frame {} ({frame_ms:.2} ms)", self.frames),
        )
    }

    fn on_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }
}
