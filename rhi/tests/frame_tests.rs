//! Frame pacing integration tests.
//!
//! These tests drive a swap chain through [`FramePacer`] on the dummy
//! backend with a simulated GPU delay, and check that the CPU never runs
//! more than `image_count` frames ahead.

mod common;

use std::time::Duration;

use rstest::rstest;

use common::TestContext;
use redlilium_rhi::backend::dummy::DummyConfig;
use redlilium_rhi::types::{CmdDesc, QueueSubmitDesc, RenderTargetBarrier, ResourceState, SwapChainDesc};
use redlilium_rhi::{CmdHandle, FramePacer, RhiError, SwapChainHandle};

/// Record the minimal frame: transition the back buffer to a render target
/// and back to present.
fn record_frame(ctx: &TestContext, cmd: CmdHandle, swap_chain: SwapChainHandle, index: u32) {
    let renderer = &ctx.renderer;
    let rt = renderer.swap_chain_get_render_target(swap_chain, index).unwrap();
    renderer.begin_cmd(cmd).unwrap();
    renderer
        .cmd_resource_barrier(cmd, &[], &[], &[RenderTargetBarrier::new(rt, ResourceState::RENDER_TARGET)])
        .unwrap();
    renderer
        .cmd_resource_barrier(cmd, &[], &[], &[RenderTargetBarrier::new(rt, ResourceState::PRESENT)])
        .unwrap();
    renderer.end_cmd(cmd).unwrap();
}

#[rstest]
#[case::double_buffered(2)]
#[case::triple_buffered(3)]
#[case::quad_buffered(4)]
fn test_lookahead_bounded_by_image_count(#[case] image_count: u32) {
    let ctx = TestContext::with_submit_delay(Duration::from_millis(5));
    let renderer = &ctx.renderer;
    let swap_chain = renderer
        .add_swap_chain(&SwapChainDesc::new(ctx.queue, 64, 64, image_count))
        .unwrap();
    let cmds = renderer.add_cmd_n(&CmdDesc::new(ctx.pool), image_count).unwrap();
    let mut pacer = FramePacer::new(renderer, image_count).unwrap();

    let frames = image_count * 4;
    let mut indices = Vec::new();
    for _ in 0..frames {
        let index = pacer.acquire(renderer, swap_chain).unwrap();
        // The slot's previous submission has completed, so its cmd can be reset
        record_frame(&ctx, cmds[index as usize], swap_chain, index);
        pacer.submit(renderer, ctx.queue, &[cmds[index as usize]]).unwrap();
        pacer.present(renderer, ctx.queue, swap_chain).unwrap();
        assert!(pacer.in_flight(renderer).unwrap() <= image_count as usize);
        indices.push(index);
    }

    assert_eq!(pacer.frame_count(), u64::from(frames));
    assert!(pacer.max_lookahead() <= image_count as usize);
    // The GPU is slower than the CPU, so consecutive frames overlap
    assert!(pacer.max_lookahead() >= 2);
    let expected: Vec<u32> = (0..frames).map(|i| i % image_count).collect();
    assert_eq!(indices, expected);

    pacer.wait_idle(renderer).unwrap();
    assert_eq!(pacer.in_flight(renderer).unwrap(), 0);
    renderer.wait_queue_idle(ctx.queue).unwrap();
    pacer.destroy(renderer).unwrap();
    renderer.remove_cmd_n(&cmds).unwrap();
    renderer.remove_swap_chain(swap_chain).unwrap();
    ctx.teardown();
}

#[rstest]
#[case::double_buffered(2)]
#[case::triple_buffered(3)]
#[case::quad_buffered(4)]
fn test_slot_fence_throttles_early_released_images(#[case] image_count: u32) {
    // Images come back before their frame has executed, so only the slot
    // fences keep the CPU from reusing a command buffer still on the GPU
    let ctx = TestContext::with_dummy(
        DummyConfig::default()
            .with_submit_delay(Duration::from_millis(50))
            .with_early_image_release(true),
    );
    let renderer = &ctx.renderer;
    let swap_chain = renderer
        .add_swap_chain(&SwapChainDesc::new(ctx.queue, 64, 64, image_count))
        .unwrap();
    let cmds = renderer.add_cmd_n(&CmdDesc::new(ctx.pool), image_count).unwrap();
    let mut pacer = FramePacer::new(renderer, image_count).unwrap();

    let frames = image_count * 3;
    for _ in 0..frames {
        let index = pacer.acquire(renderer, swap_chain).unwrap();
        let cmd = cmds[index as usize];
        assert_eq!(renderer.begin_cmd(cmd), Ok(()));
        renderer.end_cmd(cmd).unwrap();
        record_frame(&ctx, cmd, swap_chain, index);
        pacer.submit(renderer, ctx.queue, &[cmd]).unwrap();
        pacer.present(renderer, ctx.queue, swap_chain).unwrap();
        assert!(pacer.in_flight(renderer).unwrap() <= image_count as usize);
    }

    assert!(pacer.fence_waits() > 0);
    assert_eq!(pacer.max_lookahead(), image_count as usize);

    pacer.wait_idle(renderer).unwrap();
    renderer.wait_queue_idle(ctx.queue).unwrap();
    pacer.destroy(renderer).unwrap();
    renderer.remove_cmd_n(&cmds).unwrap();
    renderer.remove_swap_chain(swap_chain).unwrap();
    ctx.teardown();
}

#[test]
fn test_reset_of_in_flight_cmd_rejected() {
    let ctx = TestContext::with_submit_delay(Duration::from_millis(50));
    let renderer = &ctx.renderer;
    let cmd = ctx.cmd();
    let fence = renderer.add_fence().unwrap();

    renderer.begin_cmd(cmd).unwrap();
    renderer.cmd_add_debug_marker(cmd, [0.0, 1.0, 0.0], "slow").unwrap();
    renderer.end_cmd(cmd).unwrap();
    renderer
        .queue_submit(
            ctx.queue,
            &QueueSubmitDesc {
                cmds: vec![cmd],
                signal_fence: Some(fence),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(renderer.begin_cmd(cmd), Err(RhiError::CmdInFlight));

    renderer.wait_for_fences(&[fence]).unwrap();
    renderer.begin_cmd(cmd).unwrap();
    renderer.end_cmd(cmd).unwrap();

    renderer.remove_fence(fence).unwrap();
    renderer.remove_cmd(cmd).unwrap();
    ctx.teardown();
}

/// Point at which a frame stops before `FramePacer::abandon`.
#[derive(Debug, Clone, Copy)]
enum Interruption {
    BeforeRecording,
    WhileRecording,
    RejectedSubmit,
}

#[rstest]
#[case::before_recording(Interruption::BeforeRecording)]
#[case::while_recording(Interruption::WhileRecording)]
#[case::rejected_submit(Interruption::RejectedSubmit)]
fn test_abandoned_frame_releases_image(#[case] interruption: Interruption) {
    let ctx = TestContext::with_submit_delay(Duration::from_millis(2));
    let renderer = &ctx.renderer;
    let swap_chain = renderer
        .add_swap_chain(&SwapChainDesc::new(ctx.queue, 32, 32, 2))
        .unwrap();
    let cmds = renderer.add_cmd_n(&CmdDesc::new(ctx.pool), 2).unwrap();
    let mut pacer = FramePacer::new(renderer, 2).unwrap();

    let index = pacer.acquire(renderer, swap_chain).unwrap();
    let cmd = cmds[index as usize];
    match interruption {
        Interruption::BeforeRecording => {}
        Interruption::WhileRecording => renderer.begin_cmd(cmd).unwrap(),
        Interruption::RejectedSubmit => {
            renderer.begin_cmd(cmd).unwrap();
            assert!(pacer.submit(renderer, ctx.queue, &[cmd]).is_err());
        }
    }
    // The unfinished frame blocks the loop until it is abandoned
    assert!(pacer.acquire(renderer, swap_chain).is_err());
    pacer.abandon(renderer, ctx.queue, swap_chain, cmd).unwrap();
    assert_eq!(pacer.frame_index(), None);
    // Nothing to give up between frames
    pacer.abandon(renderer, ctx.queue, swap_chain, cmd).unwrap();

    for _ in 0..4 {
        let index = pacer.acquire(renderer, swap_chain).unwrap();
        record_frame(&ctx, cmds[index as usize], swap_chain, index);
        pacer.submit(renderer, ctx.queue, &[cmds[index as usize]]).unwrap();
        pacer.present(renderer, ctx.queue, swap_chain).unwrap();
    }
    assert_eq!(pacer.frame_count(), 5);

    pacer.wait_idle(renderer).unwrap();
    renderer.wait_queue_idle(ctx.queue).unwrap();
    pacer.destroy(renderer).unwrap();
    renderer.remove_cmd_n(&cmds).unwrap();
    renderer.remove_swap_chain(swap_chain).unwrap();
    ctx.teardown();
}

#[test]
fn test_vsync_toggle_between_frames() {
    let ctx = TestContext::new();
    let renderer = &ctx.renderer;
    let swap_chain = renderer
        .add_swap_chain(&SwapChainDesc::new(ctx.queue, 32, 32, 2))
        .unwrap();
    let cmds = renderer.add_cmd_n(&CmdDesc::new(ctx.pool), 2).unwrap();
    let mut pacer = FramePacer::new(renderer, 2).unwrap();

    let vsync = renderer.swap_chain_get_vsync(swap_chain).unwrap();
    for frame in 0..4 {
        let index = pacer.acquire(renderer, swap_chain).unwrap();
        record_frame(&ctx, cmds[index as usize], swap_chain, index);
        pacer.submit(renderer, ctx.queue, &[cmds[index as usize]]).unwrap();
        pacer.present(renderer, ctx.queue, swap_chain).unwrap();
        if frame == 1 {
            renderer.wait_queue_idle(ctx.queue).unwrap();
            renderer.toggle_vsync(swap_chain).unwrap();
        }
    }
    assert_eq!(renderer.swap_chain_get_vsync(swap_chain).unwrap(), !vsync);

    pacer.wait_idle(renderer).unwrap();
    renderer.wait_queue_idle(ctx.queue).unwrap();
    pacer.destroy(renderer).unwrap();
    renderer.remove_cmd_n(&cmds).unwrap();
    renderer.remove_swap_chain(swap_chain).unwrap();
    ctx.teardown();
}
