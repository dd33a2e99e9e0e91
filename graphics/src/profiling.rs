//! Profiling support via Tracy.
//!
//! Re-exports the CPU profiling macros of [`ember_core::profiling`]. With the
//! `profiling` feature the renderer marks `draw`, uploads, stalls and every
//! presented frame.
//!
//! ```toml
//! [dependencies]
//! ember-graphics = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! ```ignore
//! use ember_graphics::profiling::{profile_function, profile_scope};
//!
//! fn build_frame() {
//!     profile_function!();
//!     {
//!         profile_scope!("sort draws");
//!     }
//! }
//! ```

pub use ember_core::{frame_mark, profile_function, profile_plot, profile_scope};
