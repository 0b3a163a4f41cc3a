//! Cube demo scenarios on the dummy backend.
//!
//! Each test runs the full demo headless: init, a handful of ticks and a
//! shutdown that fails if any RHI object was left alive.

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use rstest::rstest;

use redlilium_demos::{CubeDemo, DemoSettings, Overlay};
use redlilium_rhi::types::{ScissorRect, Viewport};
use redlilium_rhi::{CmdHandle, RenderTargetHandle, Renderer, ResourceDirectories, RhiError, RhiResult};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Headless settings reading shaders from this crate.
fn settings(width: u32, height: u32) -> DemoSettings {
    init_logging();
    DemoSettings::headless(width, height)
        .with_resource_directories(ResourceDirectories::new(env!("CARGO_MANIFEST_DIR")))
}

fn run_ticks(demo: &mut CubeDemo, count: usize) {
    for _ in 0..count {
        demo.tick(1.0 / 60.0).unwrap();
    }
}

// ============================================================================
// Basic frame
// ============================================================================

#[test]
fn test_basic_frame_cycles_images() {
    let mut demo = CubeDemo::init(&settings(800, 600), None).unwrap();
    run_ticks(&mut demo, 5);

    let stats = demo.stats();
    assert_eq!(stats.frame_indices, vec![0, 1, 2, 0, 1]);
    assert_eq!(stats.incomplete_after_wait, 0);
    assert_eq!(stats.queue_idle_waits, 0);
    assert_eq!(stats.last_viewport, Some(Viewport::from_dimensions(800, 600)));
    assert_eq!(demo.frame_count(), 5);

    demo.shutdown().unwrap();
}

#[rstest]
#[case::double_buffered(2)]
#[case::triple_buffered(3)]
#[case::quad_buffered(4)]
fn test_frame_index_follows_image_count(#[case] image_count: u32) {
    let mut demo = CubeDemo::init(&settings(320, 240).with_image_count(image_count), None).unwrap();
    run_ticks(&mut demo, 2 * image_count as usize);

    let expected: Vec<u32> = (0..2 * image_count).map(|i| i % image_count).collect();
    assert_eq!(demo.stats().frame_indices, expected);
    assert_eq!(demo.stats().incomplete_after_wait, 0);

    demo.shutdown().unwrap();
}

#[test]
fn test_missing_shader_fails_init() {
    init_logging();
    let settings = DemoSettings::headless(64, 64)
        .with_resource_directories(ResourceDirectories::new("/nonexistent/redlilium"));
    assert!(CubeDemo::init(&settings, None).is_err());
}

#[test]
fn test_missing_texture_falls_back_to_checkerboard() {
    let mut settings = settings(64, 64);
    settings.texture = Some(PathBuf::from("does_not_exist.png"));
    let mut demo = CubeDemo::init(&settings, None).unwrap();
    run_ticks(&mut demo, 1);
    demo.shutdown().unwrap();
}

// ============================================================================
// Resize
// ============================================================================

#[test]
fn test_resize_recreates_targets() {
    let mut demo = CubeDemo::init(&settings(800, 600), None).unwrap();
    run_ticks(&mut demo, 2);
    let swap_chain = demo.swap_chain().unwrap();
    let depth = demo.depth_target().unwrap();

    demo.on_size(1024, 768).unwrap();

    assert_ne!(demo.swap_chain().unwrap(), swap_chain);
    assert_ne!(demo.depth_target().unwrap(), depth);
    assert_eq!(demo.stats().swap_chain_recreations, 1);
    assert_eq!(demo.stats().queue_idle_waits, 1);

    let renderer = demo.renderer().unwrap();
    assert_eq!(renderer.swap_chain_extent(demo.swap_chain().unwrap()).unwrap(), (1024, 768));
    let depth_desc = renderer.render_target_get_desc(demo.depth_target().unwrap()).unwrap();
    assert_eq!((depth_desc.width, depth_desc.height), (1024, 768));

    run_ticks(&mut demo, 2);
    let stats = demo.stats();
    assert_eq!(stats.last_viewport, Some(Viewport::from_dimensions(1024, 768)));
    assert_eq!(stats.last_scissor, Some(ScissorRect::from_dimensions(1024, 768)));

    demo.shutdown().unwrap();
}

#[rstest]
#[case::same_size(800, 600)]
#[case::minimized(0, 0)]
fn test_resize_ignored(#[case] width: u32, #[case] height: u32) {
    let mut demo = CubeDemo::init(&settings(800, 600), None).unwrap();
    let swap_chain = demo.swap_chain();

    demo.on_size(width, height).unwrap();

    assert_eq!(demo.swap_chain(), swap_chain);
    assert_eq!(demo.stats().swap_chain_recreations, 0);
    assert_eq!(demo.stats().queue_idle_waits, 0);
    assert_eq!(demo.size(), (800, 600));

    demo.shutdown().unwrap();
}

// ============================================================================
// VSync toggle
// ============================================================================

#[test]
fn test_vsync_toggle_idles_once() {
    let mut demo = CubeDemo::init(&settings(800, 600).with_vsync(true), None).unwrap();
    run_ticks(&mut demo, 2);

    demo.set_vsync(false);
    run_ticks(&mut demo, 1);

    let renderer = demo.renderer().unwrap();
    assert!(!renderer.swap_chain_get_vsync(demo.swap_chain().unwrap()).unwrap());
    assert_eq!(demo.stats().queue_idle_waits, 1);
    assert_eq!(demo.stats().vsync_toggles, 1);

    // Converged: later ticks neither idle nor toggle
    run_ticks(&mut demo, 3);
    let stats = demo.stats();
    assert_eq!(stats.queue_idle_waits, 1);
    assert_eq!(stats.vsync_toggles, 1);
    // No frame dropped or repeated across the toggle
    assert_eq!(stats.frame_indices, vec![0, 1, 2, 0, 1, 2]);

    demo.shutdown().unwrap();
}

#[test]
fn test_vsync_survives_resize() {
    let mut demo = CubeDemo::init(&settings(800, 600).with_vsync(false), None).unwrap();
    demo.on_size(640, 480).unwrap();

    let renderer = demo.renderer().unwrap();
    assert!(!renderer.swap_chain_get_vsync(demo.swap_chain().unwrap()).unwrap());
    run_ticks(&mut demo, 1);
    assert_eq!(demo.stats().vsync_toggles, 0);

    demo.shutdown().unwrap();
}

// ============================================================================
// Overlay
// ============================================================================

struct CountingOverlay {
    draws: Rc<Cell<u32>>,
    size: Rc<Cell<(u32, u32)>>,
}

impl Overlay for CountingOverlay {
    fn draw(&mut self, renderer: &Renderer, cmd: CmdHandle, _render_target: RenderTargetHandle) -> RhiResult<()> {
        self.draws.set(self.draws.get() + 1);
        renderer.cmd_add_debug_marker(cmd, [0.0, 1.0, 0.0], "overlay")
    }

    fn on_size(&mut self, width: u32, height: u32) {
        self.size.set((width, height));
    }
}

#[test]
fn test_overlay_drawn_every_frame() {
    let draws = Rc::new(Cell::new(0));
    let size = Rc::new(Cell::new((0, 0)));
    let mut demo = CubeDemo::init(&settings(800, 600), None).unwrap();
    demo.set_overlay(Box::new(CountingOverlay {
        draws: Rc::clone(&draws),
        size: Rc::clone(&size),
    }));

    run_ticks(&mut demo, 3);
    assert_eq!(draws.get(), 3);

    demo.on_size(400, 300).unwrap();
    assert_eq!(size.get(), (400, 300));

    demo.shutdown().unwrap();
}

/// Overlay whose draw fails on the frames listed in `fail_on`.
struct FailingOverlay {
    draws: Rc<Cell<u32>>,
    fail_on: Vec<u32>,
}

impl Overlay for FailingOverlay {
    fn draw(&mut self, _renderer: &Renderer, _cmd: CmdHandle, _render_target: RenderTargetHandle) -> RhiResult<()> {
        let draw = self.draws.get();
        self.draws.set(draw + 1);
        if self.fail_on.contains(&draw) {
            return Err(RhiError::InvalidParameter("overlay failed".into()));
        }
        Ok(())
    }
}

#[rstest]
#[case::first_frame(vec![0])]
#[case::later_frame(vec![2])]
#[case::consecutive_frames(vec![1, 2, 3])]
fn test_failed_frame_keeps_demo_running(#[case] fail_on: Vec<u32>) {
    let draws = Rc::new(Cell::new(0));
    let mut demo = CubeDemo::init(&settings(320, 240), None).unwrap();
    demo.set_overlay(Box::new(FailingOverlay {
        draws: Rc::clone(&draws),
        fail_on: fail_on.clone(),
    }));

    for frame in 0..8 {
        let result = demo.tick(1.0 / 60.0);
        if fail_on.contains(&frame) {
            assert!(matches!(result, Err(RhiError::InvalidParameter(_))), "frame {frame}: {result:?}");
        } else {
            assert_eq!(result, Ok(()), "frame {frame}");
        }
    }
    assert_eq!(draws.get(), 8);
    assert_eq!(demo.stats().frame_indices.len(), 8);

    demo.shutdown().unwrap();
}

// ============================================================================
// Teardown
// ============================================================================

#[test]
fn test_drop_tears_down() {
    let mut demo = CubeDemo::init(&settings(64, 64), None).unwrap();
    run_ticks(&mut demo, 1);
    drop(demo);
}
