//! Common utilities for RHI integration tests.
//!
//! Every test builds a [`TestContext`] on the dummy backend: a renderer, a
//! graphics queue and a command pool. Helpers cover the command recording
//! boilerplate shared by the frame, loader and barrier tests.

#![allow(dead_code)]

use std::time::Duration;

use redlilium_rhi::backend::dummy::DummyConfig;
use redlilium_rhi::types::{CmdDesc, CmdPoolDesc, QueueDesc, QueueSubmitDesc, QueueType};
use redlilium_rhi::{
    CmdHandle, CmdPoolHandle, QueueHandle, Renderer, RendererDesc, ResourceLoaderDesc,
};

/// Install the test logger once. Honors `RUST_LOG`.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Bytes `0, 1, ..., 255, 0, 1, ...`.
pub fn generate_test_pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

// ============================================================================
// Test Context
// ============================================================================

/// Renderer with one graphics queue and command pool.
pub struct TestContext {
    pub renderer: Renderer,
    pub queue: QueueHandle,
    pub pool: CmdPoolHandle,
}

impl TestContext {
    /// Context on the default dummy backend with validation on.
    pub fn new() -> Self {
        Self::with_dummy(DummyConfig::default())
    }

    /// Context whose simulated GPU spends `delay` on every submission.
    pub fn with_submit_delay(delay: Duration) -> Self {
        Self::with_dummy(DummyConfig::default().with_submit_delay(delay))
    }

    /// Context on a configured dummy backend.
    pub fn with_dummy(dummy: DummyConfig) -> Self {
        init_logging();
        let desc = RendererDesc::default()
            .with_validation(true)
            .with_dummy_config(dummy);
        Self::with_desc(&desc)
    }

    /// Context on an arbitrary renderer description.
    pub fn with_desc(desc: &RendererDesc) -> Self {
        init_logging();
        let renderer = Renderer::new("rhi-test", desc).expect("Failed to create renderer");
        let queue = renderer
            .add_queue(&QueueDesc::new(QueueType::Graphics))
            .expect("Failed to create queue");
        let pool = renderer
            .add_cmd_pool(&CmdPoolDesc::new(queue))
            .expect("Failed to create command pool");
        Self {
            renderer,
            queue,
            pool,
        }
    }

    /// Start the resource loader.
    pub fn with_loader(self, desc: Option<ResourceLoaderDesc>) -> Self {
        self.renderer
            .init_resource_loader(desc.as_ref())
            .expect("Failed to start resource loader");
        self
    }

    /// Allocate a command buffer from the context's pool.
    pub fn cmd(&self) -> CmdHandle {
        self.renderer
            .add_cmd(&CmdDesc::new(self.pool))
            .expect("Failed to allocate command buffer")
    }

    /// Submit `cmd` on the graphics queue and wait until it has executed.
    pub fn submit_and_wait(&self, cmd: CmdHandle) -> redlilium_rhi::RhiResult<()> {
        let fence = self.renderer.add_fence()?;
        let submitted = self.renderer.queue_submit(
            self.queue,
            &QueueSubmitDesc {
                cmds: vec![cmd],
                signal_fence: Some(fence),
                ..Default::default()
            },
        );
        let waited = submitted.and_then(|()| self.renderer.wait_for_fences(&[fence]));
        self.renderer.remove_fence(fence)?;
        waited
    }

    /// Remove the pool and queue, then shut the renderer down.
    ///
    /// Fails the test if anything else is still alive.
    pub fn teardown(self) {
        self.renderer.exit_resource_loader();
        self.renderer
            .wait_queue_idle(self.queue)
            .expect("Failed to idle queue");
        self.renderer
            .remove_cmd_pool(self.pool)
            .expect("Failed to remove command pool");
        self.renderer
            .remove_queue(self.queue)
            .expect("Failed to remove queue");
        self.renderer.shutdown().expect("Objects leaked at shutdown");
    }
}
