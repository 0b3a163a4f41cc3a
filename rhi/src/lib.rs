//! # RedLilium RHI
//!
//! Rendering hardware interface for RedLilium: one stable object API over a
//! selectable GPU backend.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Renderer`] - root object; queues, command buffers, resources and
//!   pipelines are created through it (see [`Device`])
//! - [`FramePacer`] - per-frame CPU/GPU synchronization over a swap chain
//! - [`loader`] - asynchronous, priority-scheduled resource uploads with
//!   [`SyncToken`] completion tokens
//! - [`barrier`] - explicit resource state transitions, validated at submit
//! - [`backend`] - backend trait plus the headless dummy backend
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_rhi::{FramePacer, Renderer, RendererDesc};
//!
//! let renderer = Renderer::new("demo", &RendererDesc::default())?;
//! renderer.init_resource_loader(None)?;
//! let mut pacer = FramePacer::new(&renderer, image_count)?;
//! let index = pacer.acquire(&renderer, swap_chain)?;
//! // record, then
//! pacer.submit(&renderer, queue, &[cmd])?;
//! pacer.present(&renderer, queue, swap_chain)?;
//! ```

pub mod backend;
pub mod barrier;
pub mod config;
pub mod error;
pub mod frame;
pub mod handle;
pub mod loader;
pub mod renderer;
pub mod sync;
pub mod types;

pub use backend::{BackendCapabilities, BackendStats, BackendType};
pub use config::{ResourceDirectories, ResourceDirectory};
pub use error::{RhiError, RhiResult};
pub use frame::FramePacer;
pub use handle::{
    AccelerationStructureHandle, BufferHandle, CmdHandle, CmdPoolHandle, CommandSignatureHandle,
    DescriptorSetHandle, FenceHandle, Handle, PipelineHandle, QueryPoolHandle, QueueHandle,
    RenderTargetHandle, RootSignatureHandle, SamplerHandle, SemaphoreHandle, ShaderHandle,
    SwapChainHandle, TextureHandle,
};
pub use loader::{
    BufferLoadDesc, BufferUpdateDesc, LoadPriority, RawImageData, ResourceLoaderDesc,
    ShaderLoadDesc, ShaderStageLoadDesc, SyncToken, TextureLoadDesc, TextureUpdateDesc,
};
pub use renderer::{CmdState, Command, Device, MappedRange, Renderer, RendererDesc};

/// RHI library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version.
///
/// Call once at startup, after the logger is installed.
pub fn init() {
    log::info!("RedLilium RHI v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_renderer() {
        let renderer = Renderer::new("lib-test", &RendererDesc::default()).unwrap();
        assert_eq!(renderer.backend_name(), "Dummy Backend");
        renderer.shutdown().unwrap();
    }
}
