//! Command line arguments of the cube demo.
//!
//! Values given on the command line override the config file.
//!
//! ```bash
//! # Render 300 frames headless and exit
//! cube_demo
//!
//! # Open a window, render until closed
//! cube_demo --windowed
//!
//! # Custom config, no vsync, exit after 100 frames
//! cube_demo --windowed --config my_demo.toml --no-vsync --max-frames 100
//! ```

use std::path::PathBuf;

use clap::Parser;
use redlilium_rhi::BackendType;

use crate::config::DemoConfig;

/// Frames rendered by a headless run without `--max-frames`.
pub const DEFAULT_HEADLESS_FRAMES: u64 = 300;

// ============================================================================
// CLI Backend Selection
// ============================================================================

/// Backend selection for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliBackend {
    /// Best available backend.
    #[default]
    Auto,
    /// Headless backend that executes commands on the CPU timeline only.
    Dummy,
}

impl From<CliBackend> for BackendType {
    fn from(cli: CliBackend) -> Self {
        match cli {
            CliBackend::Auto => BackendType::Auto,
            CliBackend::Dummy => BackendType::Dummy,
        }
    }
}

impl CliBackend {
    /// Config file name of the backend.
    pub fn name(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Dummy => "dummy",
        }
    }
}

// ============================================================================
// Demo Args
// ============================================================================

/// RedLilium cube demo arguments.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(
    name = "cube_demo",
    about = "Textured spinning cube on the RedLilium RHI",
    long_about = "Renders a textured spinning cube through the RedLilium RHI.\n\n\
        Runs headless by default and exits after a fixed number of frames.\n\
        Pass --windowed to present into a window instead.\n\n\
        Settings are read from demo.toml next to the crate unless --config\n\
        names another file. Command line options override the file.",
    version
)]
pub struct DemoArgs {
    /// Graphics backend.
    #[arg(long, value_enum)]
    pub backend: Option<CliBackend>,

    /// Initial width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Initial height in pixels.
    #[arg(long)]
    pub height: Option<u32>,

    /// Exit after this many frames.
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// Disable vertical sync.
    #[arg(long)]
    pub no_vsync: bool,

    /// Swap chain image count.
    #[arg(long)]
    pub image_count: Option<u32>,

    /// Config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Disable barrier validation.
    #[arg(long)]
    pub no_validation: bool,

    /// Present into a window instead of running headless.
    #[arg(long)]
    pub windowed: bool,
}

impl DemoArgs {
    /// Config file to load.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demo.toml"))
    }

    /// Override `config` with the values given on the command line.
    pub fn apply(&self, config: &mut DemoConfig) {
        if let Some(backend) = self.backend {
            config.renderer.backend = backend.name().to_string();
        }
        if let Some(width) = self.width {
            config.window.width = width;
        }
        if let Some(height) = self.height {
            config.window.height = height;
        }
        if let Some(image_count) = self.image_count {
            config.renderer.image_count = image_count;
        }
        if self.no_vsync {
            config.window.vsync = false;
        }
        if self.no_validation {
            config.renderer.validation = Some(false);
        }
    }

    /// Frames to render before exiting. Headless runs always stop.
    pub fn frame_limit(&self) -> Option<u64> {
        if self.windowed {
            self.max_frames
        } else {
            Some(self.max_frames.unwrap_or(DEFAULT_HEADLESS_FRAMES))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> DemoArgs {
        DemoArgs::try_parse_from(std::iter::once("cube_demo").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.backend, None);
        assert!(!args.windowed);
        assert_eq!(args.frame_limit(), Some(DEFAULT_HEADLESS_FRAMES));
        assert!(args.config_path().ends_with("demo.toml"));
    }

    #[test]
    fn test_windowed_runs_until_closed() {
        assert_eq!(parse(&["--windowed"]).frame_limit(), None);
        assert_eq!(parse(&["--windowed", "--max-frames", "10"]).frame_limit(), Some(10));
    }

    #[test]
    fn test_apply_overrides_config() {
        let args = parse(&[
            "--backend",
            "dummy",
            "--width",
            "640",
            "--image-count",
            "2",
            "--no-vsync",
            "--no-validation",
        ]);
        let mut config = DemoConfig::default();
        args.apply(&mut config);

        assert_eq!(config.renderer.backend, "dummy");
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, DemoConfig::default().window.height);
        assert_eq!(config.renderer.image_count, 2);
        assert!(!config.window.vsync);
        assert_eq!(config.renderer.validation, Some(false));
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let mut config = DemoConfig::default();
        config.window.vsync = false;
        parse(&[]).apply(&mut config);
        assert!(!config.window.vsync);
        assert_eq!(config.renderer.validation, None);
    }

    #[test]
    fn test_cli_backend_conversion() {
        assert_eq!(BackendType::from(CliBackend::Auto), BackendType::Auto);
        assert_eq!(BackendType::from(CliBackend::Dummy), BackendType::Dummy);
        assert!(DemoArgs::try_parse_from(["cube_demo", "--backend", "vulkan"]).is_err());
    }
}
