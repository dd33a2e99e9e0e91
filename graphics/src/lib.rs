//! # Ember Graphics
//!
//! GPU rendering backend for Ember: an immediate-mode renderer that turns
//! draw requests into native GPU work.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Renderer`] - device lifecycle, resources, draws and presentation
//! - [`ResourceRegistry`] - handle-indexed textures, meshes and shaders
//! - [`UploadRing`] - staging plan for texture and buffer uploads
//! - [`PipelineCache`] - render state deduplication with targeted invalidation
//! - [`FramePipeline`] - bounded frames in flight
//! - Backends: wgpu (default feature) and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use ember_graphics::{DrawCommand, Renderer, SurfaceTarget};
//!
//! let mut renderer = Renderer::new();
//! renderer.create_device()?;
//! renderer.startup(&SurfaceTarget::from_window(window, 1280, 720))?;
//!
//! loop {
//!     renderer.clear(None, Color::BLACK, 1.0, 0, ClearMask::ALL)?;
//!     renderer.draw(&DrawCommand::new(&material, mesh, 3))?;
//!     renderer.present()?;
//! }
//! ```

pub mod backend;
pub mod draw;
pub mod error;
pub mod instance;
pub mod pass;
pub mod pipeline;
pub mod profiling;
pub mod renderer;
pub mod resources;
pub mod scheduler;
pub mod swapchain;
pub mod types;

// Re-export main types for convenience
pub use backend::{
    DummyBackend, DummyCall, DummyConfig, DummyObjectCounts, GpuBackend, has_gpu_backend,
};
pub use draw::{DrawCommand, RenderTarget};
pub use error::GraphicsError;
pub use instance::{BackendType, GraphicsDriver, InstanceParameters, PresentMode, WgpuBackendType};
pub use pipeline::{PipelineCache, PipelineCacheStats, PipelineKey};
pub use renderer::{MAX_TEXTURE_DIMENSION, Renderer, choose_present_mode};
pub use resources::{DeviceId, ResourceRegistry, RingStats, StagePlan, UploadRing};
pub use scheduler::{FenceGroup, FramePipeline};
pub use swapchain::{SurfaceTarget, WindowSurface};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy Backend");
        assert_eq!(backend.driver(), GraphicsDriver::Dummy);
    }
}
