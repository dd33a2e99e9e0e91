//! # Ember Demos
//!
//! Demo programs driving the Ember renderer.
//!
//! ## Available Demos
//!
//! - `triangle` - Spinning textured triangle in a window

pub mod args;

pub use args::{CliBackend, CliGpuApi, DemoArgs};

/// Demos library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
