//! Demo configuration loaded from `demo.toml`.
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//! title = "RedLilium Cube"
//! vsync = true
//!
//! [renderer]
//! backend = "auto"
//! image_count = 3
//! validation = true
//! submission_delay_ms = 0
//!
//! [paths]
//! root = "."
//! [paths.directories]
//! shader_sources = "shaders"
//!
//! [scene]
//! texture = "crate.png"
//! ```
//!
//! Every section and key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use redlilium_rhi::backend::dummy::DummyConfig;
use redlilium_rhi::{BackendType, RendererDesc, ResourceDirectories};
use serde::Deserialize;

/// Top-level demo configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    /// Where shaders and textures are read from.
    pub paths: ResourceDirectories,
    pub scene: SceneConfig,
}

/// `[window]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "RedLilium Cube".into(),
            vsync: true,
        }
    }
}

/// `[renderer]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// `"auto"`, `"dummy"` or `"headless"`.
    pub backend: String,
    pub image_count: u32,
    /// Barrier validation. Unset follows the build profile.
    pub validation: Option<bool>,
    /// Simulated GPU time per submission on the dummy backend.
    pub submission_delay_ms: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            backend: "auto".into(),
            image_count: 3,
            validation: None,
            submission_delay_ms: 0,
        }
    }
}

/// `[scene]` section.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Cube texture in the textures directory. A checkerboard is generated
    /// when unset.
    pub texture: Option<PathBuf>,
}

impl DemoConfig {
    /// Parse a config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load the config at `path`, falling back to defaults when the file is
    /// missing or malformed.
    ///
    /// A relative `paths.root` is taken relative to the file's directory.
    pub fn load(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(config) => {
                    log::info!("Loaded demo config {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {e}; using defaults", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No demo config at {} ({e}); using defaults", path.display());
                Self::default()
            }
        };
        if config.paths.root.is_relative() {
            if let Some(base) = path.parent() {
                config.paths.root = base.join(&config.paths.root);
            }
        }
        config
    }
}

/// Settings [`CubeDemo::init`](crate::demo::CubeDemo::init) consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoSettings {
    pub width: u32,
    pub height: u32,
    pub image_count: u32,
    pub vsync: bool,
    pub renderer: RendererDesc,
    /// Cube texture file, or `None` for the generated checkerboard.
    pub texture: Option<PathBuf>,
}

impl DemoSettings {
    /// Headless dummy-backend settings at the given size.
    pub fn headless(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            image_count: 3,
            vsync: true,
            renderer: RendererDesc::default().with_backend(BackendType::Dummy),
            texture: None,
        }
    }

    /// Set the swap chain image count.
    pub fn with_image_count(mut self, image_count: u32) -> Self {
        self.image_count = image_count;
        self
    }

    /// Set the initial vsync state.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Set where shaders and textures are read from.
    pub fn with_resource_directories(mut self, directories: ResourceDirectories) -> Self {
        self.renderer.resource_directories = directories;
        self
    }
}

impl From<&DemoConfig> for DemoSettings {
    fn from(config: &DemoConfig) -> Self {
        let backend = BackendType::from_name(&config.renderer.backend).unwrap_or_else(|| {
            log::warn!(
                "Unknown backend '{}' in config, using auto",
                config.renderer.backend
            );
            BackendType::Auto
        });
        let mut renderer = RendererDesc::default()
            .with_backend(backend)
            .with_resource_directories(config.paths.clone())
            .with_dummy_config(DummyConfig {
                submit_delay: Duration::from_millis(config.renderer.submission_delay_ms),
                ..DummyConfig::default()
            });
        if let Some(validation) = config.renderer.validation {
            renderer = renderer.with_validation(validation);
        }
        Self {
            width: config.window.width,
            height: config.window.height,
            image_count: config.renderer.image_count,
            vsync: config.window.vsync,
            renderer,
            texture: config.scene.texture.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redlilium_rhi::ResourceDirectory;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(DemoConfig::from_toml("").unwrap(), DemoConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = DemoConfig::from_toml(
            r#"
            [window]
            width = 800
            vsync = false

            [renderer]
            backend = "dummy"
            submission_delay_ms = 4

            [paths]
            root = "assets"
            [paths.directories]
            shader_sources = "glsl"

            [scene]
            texture = "crate.png"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert!(!config.window.vsync);
        assert_eq!(config.renderer.backend, "dummy");
        assert_eq!(config.renderer.image_count, 3);
        assert_eq!(
            config.paths.resolve(ResourceDirectory::ShaderSources, "demo.vert"),
            PathBuf::from("assets/glsl/demo.vert")
        );
        assert_eq!(config.scene.texture, Some(PathBuf::from("crate.png")));

        let settings = DemoSettings::from(&config);
        assert_eq!(settings.renderer.backend, BackendType::Dummy);
        assert_eq!(settings.renderer.dummy.submit_delay, Duration::from_millis(4));
        assert!(!settings.vsync);
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        assert!(DemoConfig::from_toml("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let path = Path::new("/nonexistent/redlilium/demo.toml");
        let config = DemoConfig::load(path);
        assert_eq!(config.window, WindowConfig::default());
        assert_eq!(config.paths.root, PathBuf::from("/nonexistent/redlilium/."));
    }

    #[test]
    fn test_unknown_backend_falls_back_to_auto() {
        let mut config = DemoConfig::default();
        config.renderer.backend = "metal".into();
        assert_eq!(DemoSettings::from(&config).renderer.backend, BackendType::Auto);
    }

    #[test]
    fn test_validation_override() {
        let mut config = DemoConfig::default();
        assert_eq!(
            DemoSettings::from(&config).renderer.validation,
            cfg!(debug_assertions)
        );
        config.renderer.validation = Some(false);
        assert!(!DemoSettings::from(&config).renderer.validation);
    }
}
