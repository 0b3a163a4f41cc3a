//! Window resize debouncing.
//!
//! Dragging a window edge produces a burst of resize events. Recreating the
//! swap chain and depth target for each one idles the queue every time, so
//! [`ResizeDebouncer`] buffers the events and releases the final size once
//! the window has been quiet for the debounce period.
//!
//! ```text
//! Events:  R  R  R  R  R  R  ... R [quiet for `debounce`]
//!          └──────────────────────┘      │
//!            (only the last size kept)   ▼
//!                              one CubeDemo::on_size
//! ```
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use redlilium_demos::resize::ResizeDebouncer;
//!
//! let mut debouncer = ResizeDebouncer::new((1280, 720), Duration::from_millis(50));
//! debouncer.on_resize_event(1024, 768);
//! assert!(debouncer.is_pending());
//!
//! // Before the quiet period has elapsed nothing is released
//! assert!(debouncer.update().is_none());
//! ```

use std::time::{Duration, Instant};

/// A resize released by the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeEvent {
    /// New width in pixels.
    pub width: u32,
    /// New height in pixels.
    pub height: u32,
    /// Width before the resize.
    pub previous_width: u32,
    /// Height before the resize.
    pub previous_height: u32,
}

/// Coalesces bursts of window resize events.
#[derive(Debug)]
pub struct ResizeDebouncer {
    pending: Option<(u32, u32)>,
    last_event: Instant,
    debounce: Duration,
    /// Size last released to the renderer.
    current: (u32, u32),
    min_size: (u32, u32),
}

impl ResizeDebouncer {
    /// Debouncer for a window currently at `initial_size`.
    pub fn new(initial_size: (u32, u32), debounce: Duration) -> Self {
        Self {
            pending: None,
            last_event: Instant::now(),
            debounce,
            current: initial_size,
            min_size: (1, 1),
        }
    }

    /// Clamp future sizes to at least `min_width` x `min_height`.
    pub fn set_min_size(&mut self, min_width: u32, min_height: u32) {
        self.min_size = (min_width.max(1), min_height.max(1));
    }

    /// Record a resize reported by the window system.
    pub fn on_resize_event(&mut self, width: u32, height: u32) {
        let size = (width.max(self.min_size.0), height.max(self.min_size.1));
        if Some(size) == self.pending {
            return;
        }
        if size == self.current {
            // Dragged back to the applied size
            self.pending = None;
            return;
        }
        self.pending = Some(size);
        self.last_event = Instant::now();
        log::trace!(
            "Resize to {}x{} pending ({} ms debounce)",
            size.0,
            size.1,
            self.debounce.as_millis()
        );
    }

    /// Release the pending size once the quiet period has elapsed.
    ///
    /// Call once per frame, before rendering.
    pub fn update(&mut self) -> Option<ResizeEvent> {
        if self.last_event.elapsed() < self.debounce {
            return None;
        }
        self.release()
    }

    /// Release the pending size immediately.
    pub fn flush(&mut self) -> Option<ResizeEvent> {
        self.release()
    }

    fn release(&mut self) -> Option<ResizeEvent> {
        let (width, height) = self.pending.take()?;
        let (previous_width, previous_height) = self.current;
        self.current = (width, height);
        log::debug!("Resize released: {previous_width}x{previous_height} -> {width}x{height}");
        Some(ResizeEvent {
            width,
            height,
            previous_width,
            previous_height,
        })
    }

    /// Size last released.
    pub fn current_size(&self) -> (u32, u32) {
        self.current
    }

    /// Size waiting for the quiet period, if any.
    pub fn pending_size(&self) -> Option<(u32, u32)> {
        self.pending
    }

    /// Returns true while a resize is buffered.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Time left before the pending size is released.
    pub fn remaining(&self) -> Duration {
        if self.pending.is_some() {
            self.debounce.saturating_sub(self.last_event.elapsed())
        } else {
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_new() {
        let debouncer = ResizeDebouncer::new((800, 600), Duration::from_millis(50));
        assert_eq!(debouncer.current_size(), (800, 600));
        assert!(!debouncer.is_pending());
        assert_eq!(debouncer.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_event_is_buffered() {
        let mut debouncer = ResizeDebouncer::new((800, 600), Duration::from_millis(100));
        debouncer.on_resize_event(1024, 768);

        assert_eq!(debouncer.pending_size(), Some((1024, 768)));
        assert!(debouncer.update().is_none());
        assert_eq!(debouncer.current_size(), (800, 600));
        assert!(debouncer.remaining() <= Duration::from_millis(100));
    }

    #[test]
    fn test_burst_releases_last_size_once() {
        let mut debouncer = ResizeDebouncer::new((800, 600), Duration::from_millis(10));
        debouncer.on_resize_event(900, 650);
        debouncer.on_resize_event(1000, 700);
        debouncer.on_resize_event(1024, 768);

        thread::sleep(Duration::from_millis(15));
        let event = debouncer.update().unwrap();
        assert_eq!(
            event,
            ResizeEvent {
                width: 1024,
                height: 768,
                previous_width: 800,
                previous_height: 600,
            }
        );
        assert!(debouncer.update().is_none());
        assert_eq!(debouncer.current_size(), (1024, 768));
    }

    #[test]
    fn test_back_to_current_size_cancels() {
        let mut debouncer = ResizeDebouncer::new((800, 600), Duration::from_millis(10));
        debouncer.on_resize_event(1024, 768);
        debouncer.on_resize_event(800, 600);

        assert!(!debouncer.is_pending());
        thread::sleep(Duration::from_millis(15));
        assert!(debouncer.update().is_none());
    }

    #[test]
    fn test_flush_ignores_debounce() {
        let mut debouncer = ResizeDebouncer::new((800, 600), Duration::from_secs(10));
        assert!(debouncer.flush().is_none());

        debouncer.on_resize_event(640, 480);
        let event = debouncer.flush().unwrap();
        assert_eq!((event.width, event.height), (640, 480));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_min_size_clamping() {
        let mut debouncer = ResizeDebouncer::new((800, 600), Duration::ZERO);
        debouncer.on_resize_event(0, 0);
        assert_eq!(debouncer.pending_size(), Some((1, 1)));

        debouncer.set_min_size(64, 64);
        debouncer.on_resize_event(10, 200);
        assert_eq!(debouncer.flush().map(|e| (e.width, e.height)), Some((64, 200)));
    }
}
