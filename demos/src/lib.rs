//! # RedLilium Demos
//!
//! Demo driver for the RedLilium RHI.
//!
//! ## Available Demos
//!
//! - `cube_demo` - textured spinning cube, headless or in a winit window
//!
//! The library half holds the driver itself so the scenario tests can run
//! it headless:
//!
//! - [`CubeDemo`] - init, per-frame tick, resize, vsync toggle, teardown
//! - [`DemoConfig`] / [`DemoArgs`] - `demo.toml` and command line settings
//! - [`ResizeDebouncer`] - coalesces window resize bursts
//! - [`Overlay`] - hook for UI drawn over the cube

pub mod args;
pub mod config;
pub mod demo;
pub mod geometry;
pub mod overlay;
pub mod resize;

pub use args::{CliBackend, DemoArgs};
pub use config::{DemoConfig, DemoSettings};
pub use demo::{CubeDemo, DemoStats};
pub use overlay::{Overlay, StatsOverlay};
pub use resize::{ResizeDebouncer, ResizeEvent};

/// Demos library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
