//! Renderer and device.
//!
//! The [`Renderer`] is the root object of the RHI. Every other object is
//! created through it, addressed by a typed handle and must be removed
//! before [`Renderer::shutdown`].
//!
//! The object API lives on [`Device`], which the renderer derefs to. The
//! device is shared with the resource loader's worker thread, so all
//! object tables sit behind one lock.
//!
//! # Example
//!
//! ```ignore
//! let renderer = Renderer::new("demo", &RendererDesc::default())?;
//! let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics))?;
//! let pool = renderer.add_cmd_pool(&CmdPoolDesc::new(queue))?;
//! let cmd = renderer.add_cmd(&CmdDesc::new(pool))?;
//! // ...
//! renderer.remove_cmd(cmd)?;
//! renderer.remove_cmd_pool(pool)?;
//! renderer.remove_queue(queue)?;
//! renderer.shutdown()?;
//! ```

mod binding;
mod command;
pub(crate) mod objects;
mod query;
mod queue;
mod resource;
mod swapchain;

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use static_assertions::assert_impl_all;

use crate::backend::dummy::DummyConfig;
use crate::backend::{create_backend, BackendCapabilities, BackendStats, BackendType, GpuBackend};
use crate::config::ResourceDirectories;
use crate::error::{RhiError, RhiResult};
use crate::loader::{ResourceLoader, SyncToken};
use crate::types::{GpuMode, RendererApi, ShaderTarget};

pub use command::Command;
pub use objects::CmdState;
pub use resource::MappedRange;

use objects::Objects;

/// Descriptor for creating a renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererDesc {
    /// Minimum shader model the application needs.
    pub shader_target: ShaderTarget,
    /// GPU selection mode.
    pub gpu_mode: GpuMode,
    /// Backend to create.
    pub backend: BackendType,
    /// Validate barrier states at submission.
    pub validation: bool,
    /// Where shader and texture files are looked up.
    pub resource_directories: ResourceDirectories,
    /// Settings of the dummy backend.
    pub dummy: DummyConfig,
}

impl Default for RendererDesc {
    fn default() -> Self {
        Self {
            shader_target: ShaderTarget::default(),
            gpu_mode: GpuMode::Single,
            backend: BackendType::Auto,
            validation: cfg!(debug_assertions),
            resource_directories: ResourceDirectories::default(),
            dummy: DummyConfig::default(),
        }
    }
}

impl RendererDesc {
    /// Set the backend.
    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    /// Set the minimum shader model.
    pub fn with_shader_target(mut self, shader_target: ShaderTarget) -> Self {
        self.shader_target = shader_target;
        self
    }

    /// Set the GPU selection mode.
    pub fn with_gpu_mode(mut self, gpu_mode: GpuMode) -> Self {
        self.gpu_mode = gpu_mode;
        self
    }

    /// Enable or disable barrier validation.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the resource directories.
    pub fn with_resource_directories(mut self, directories: ResourceDirectories) -> Self {
        self.resource_directories = directories;
        self
    }

    /// Set the dummy backend settings.
    pub fn with_dummy_config(mut self, dummy: DummyConfig) -> Self {
        self.dummy = dummy;
        self
    }
}

/// Object tables and backend of a renderer.
pub struct Device {
    backend: Arc<dyn GpuBackend>,
    desc: RendererDesc,
    name: String,
    pub(crate) objects: RwLock<Objects>,
}

impl Device {
    /// Application name the renderer was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Native API of the backend.
    pub fn api(&self) -> RendererApi {
        self.backend.api()
    }

    /// Name of the backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Device limits and features.
    pub fn capabilities(&self) -> &BackendCapabilities {
        self.backend.capabilities()
    }

    /// Work executed by the backend so far.
    pub fn backend_stats(&self) -> BackendStats {
        self.backend.stats()
    }

    /// Descriptor the renderer was created with.
    pub fn desc(&self) -> &RendererDesc {
        &self.desc
    }

    /// Returns true if barrier states are validated at submission.
    pub fn validation_enabled(&self) -> bool {
        self.desc.validation
    }

    /// Where shader and texture files are looked up.
    pub fn resource_directories(&self) -> &ResourceDirectories {
        &self.desc.resource_directories
    }
}

/// Root object of the RHI.
///
/// `Renderer` is `Send + Sync`; recording into different command buffers
/// from different threads is allowed.
pub struct Renderer {
    device: Arc<Device>,
    pub(crate) loader: Mutex<Option<ResourceLoader>>,
    /// Counters reached by loaders that have exited. A restarted loader
    /// continues from them, so completed tokens stay completed.
    pub(crate) retired_tokens: Mutex<SyncToken>,
    shut_down: bool,
}

assert_impl_all!(Renderer: Send, Sync);
assert_impl_all!(Device: Send, Sync);

impl Renderer {
    /// Create a renderer.
    ///
    /// Fails when the backend cannot provide the requested shader model or
    /// GPU mode.
    pub fn new(app_name: &str, desc: &RendererDesc) -> RhiResult<Self> {
        let backend = create_backend(desc.backend, &desc.dummy)?;
        let caps = backend.capabilities();
        if desc.shader_target > caps.max_shader_target {
            return Err(RhiError::FeatureNotSupported(format!(
                "shader target {:?} requested, backend supports up to {:?}",
                desc.shader_target, caps.max_shader_target
            )));
        }
        if desc.gpu_mode == GpuMode::Linked && caps.gpu_count < 2 {
            return Err(RhiError::FeatureNotSupported(
                "linked GPU mode requires more than one adapter".into(),
            ));
        }

        log::info!(
            "Creating renderer '{}' on {} backend (validation {})",
            app_name,
            backend.name(),
            if desc.validation { "on" } else { "off" }
        );

        Ok(Self {
            device: Arc::new(Device {
                backend,
                desc: desc.clone(),
                name: app_name.to_string(),
                objects: RwLock::new(Objects::default()),
            }),
            loader: Mutex::new(None),
            retired_tokens: Mutex::new(SyncToken::default()),
            shut_down: false,
        })
    }

    pub(crate) fn device_arc(&self) -> &Arc<Device> {
        &self.device
    }

    /// Destroy the renderer.
    ///
    /// Exits the resource loader, then fails with
    /// [`RhiError::LiveObjects`] if any object is still alive.
    pub fn shutdown(mut self) -> RhiResult<()> {
        self.shut_down = true;
        self.exit_resource_loader();
        if let Some((kind, count)) = self.device.objects.read().first_live() {
            log::error!("Renderer '{}' shut down with {count} live {kind} object(s)", self.device.name);
            return Err(RhiError::LiveObjects { kind, count });
        }
        log::info!("Renderer '{}' shut down", self.device.name);
        Ok(())
    }
}

impl Deref for Renderer {
    type Target = Device;

    fn deref(&self) -> &Device {
        &self.device
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if self.shut_down {
            return;
        }
        self.exit_resource_loader();
        if let Some((kind, count)) = self.device.objects.read().first_live() {
            log::warn!(
                "Renderer '{}' dropped without shutdown; {count} live {kind} object(s) leaked",
                self.device.name
            );
        } else {
            log::warn!("Renderer '{}' dropped without shutdown", self.device.name);
        }
    }
}
