//! Optional CPU instrumentation backed by the Tracy profiler.
//!
//! Every macro here expands to nothing unless the `profiling` feature is
//! enabled, so call sites can stay in hot paths such as `draw` and `present`.
//!
//! # Enabling
//!
//! ```bash
//! cargo run --bin triangle --features profiling
//! ```
//!
//! Then attach the Tracy GUI to the running process. [`frame_mark!`] is
//! emitted once per `present`, so Tracy's frame view lines up with swapchain
//! frames.
//!
//! ```ignore
//! use ember_core::{frame_mark, profile_function, profile_scope};
//!
//! fn present(&mut self) {
//!     profile_function!();
//!     {
//!         profile_scope!("submit");
//!         // ...
//!     }
//!     frame_mark!();
//! }
//! ```

#[cfg(feature = "profiling")]
pub use tracy_client::{self, frame_mark as tracy_frame_mark, plot as tracy_plot, span};

/// Marks the end of a presented frame.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        $crate::profiling::tracy_frame_mark()
    };
}

/// Marks the end of a presented frame (disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

/// Opens a named span that closes when the enclosing scope exits.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

/// Opens a named span (disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Opens a span named after the enclosing function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::span!();
    };
}

/// Opens a span named after the enclosing function (disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Plots a numeric value over time, e.g. upload ring usage.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        $crate::profiling::tracy_plot!($name, $value as f64)
    };
}

/// Plots a numeric value (disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        let _ = $value;
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_expand_without_profiling() {
        profile_function!();
        profile_scope!("scope");
        profile_plot!("value", 3u32);
        frame_mark!();
    }
}
