//! Window surface description handed to a backend at startup.
//!
//! A [`SurfaceTarget`] either wraps a window (anything exposing raw window and
//! display handles) or describes a headless swapchain of a fixed size. The
//! headless form lets the renderer present into an offscreen image, which is
//! what the test suite uses.

use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// A window that a swapchain can be created for.
pub trait WindowSurface: HasWindowHandle + HasDisplayHandle + Send + Sync {}

impl<T: HasWindowHandle + HasDisplayHandle + Send + Sync> WindowSurface for T {}

/// Window (or headless image) the renderer presents into.
#[derive(Clone)]
pub struct SurfaceTarget {
    pub(crate) window: Option<Arc<dyn WindowSurface>>,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl std::fmt::Debug for SurfaceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceTarget")
            .field("windowed", &self.window.is_some())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl SurfaceTarget {
    /// Present into a window with the given drawable size in pixels.
    pub fn from_window(window: Arc<dyn WindowSurface>, width: u32, height: u32) -> Self {
        Self {
            window: Some(window),
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Present into an offscreen image of the given size.
    pub fn headless(width: u32, height: u32) -> Self {
        Self {
            window: None,
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Whether this target has no window behind it.
    pub fn is_headless(&self) -> bool {
        self.window.is_none()
    }

    /// Drawable size in pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
