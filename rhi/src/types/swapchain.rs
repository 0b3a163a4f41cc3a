//! Swap chain descriptors.

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use super::{ClearValue, ImageFormat};
use crate::handle::QueueHandle;

/// Native window a swap chain presents to.
///
/// Raw handles are not `Send`; they are only handed to the backend while the
/// swap chain is created and never stored by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle {
    /// Window handle.
    pub window: RawWindowHandle,
    /// Display connection.
    pub display: RawDisplayHandle,
}

/// Descriptor for creating a swap chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapChainDesc {
    /// Window to present to. `None` creates an offscreen swap chain.
    pub window_handle: Option<WindowHandle>,
    /// Queues allowed to present.
    pub present_queues: Vec<QueueHandle>,
    /// Number of back buffers.
    pub image_count: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Back buffer format.
    pub color_format: ImageFormat,
    /// Clear value of the back buffers.
    pub color_clear_value: ClearValue,
    /// Present with vsync.
    pub enable_vsync: bool,
}

impl SwapChainDesc {
    /// Offscreen swap chain presented from `queue`.
    pub fn new(queue: QueueHandle, width: u32, height: u32, image_count: u32) -> Self {
        Self {
            window_handle: None,
            present_queues: vec![queue],
            image_count,
            width,
            height,
            color_format: ImageFormat::B8G8R8A8Srgb,
            color_clear_value: ClearValue::default(),
            enable_vsync: true,
        }
    }

    /// Set the window.
    pub fn with_window(mut self, window_handle: WindowHandle) -> Self {
        self.window_handle = Some(window_handle);
        self
    }

    /// Set the color format.
    pub fn with_color_format(mut self, color_format: ImageFormat) -> Self {
        self.color_format = color_format;
        self
    }

    /// Set vsync.
    pub fn with_vsync(mut self, enable_vsync: bool) -> Self {
        self.enable_vsync = enable_vsync;
        self
    }
}
