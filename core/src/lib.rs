//! # Ember Core
//!
//! Backend-independent value types shared by the Ember renderer and the
//! applications driving it: resource handles, vertex layouts, shader
//! descriptions, materials and fixed-function render state.

pub mod color;
pub mod handle;
pub mod material;
pub mod profiling;
pub mod rect;
pub mod render_state;
pub mod sampler;
pub mod shader;
pub mod texture;
pub mod vertex;

pub use color::Color;
pub use handle::{MeshHandle, ShaderHandle, TextureHandle};
pub use material::{BoundSampler, MAX_SAMPLERS_PER_STAGE, Material};
pub use rect::RectInt;
pub use render_state::{BlendFactor, BlendMask, BlendMode, BlendOp, ClearMask, CullMode, DepthCompare};
pub use sampler::{TextureFilter, TextureSampler, TextureWrap};
pub use shader::{ShaderDescription, ShaderStage, ShaderStageInfo, ShaderUniform, UniformType};
pub use texture::TextureFormat;
pub use vertex::{IndexFormat, VertexElement, VertexFormat, VertexType};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn init() {
    log::info!("Ember Core v{} initialized", VERSION);
}
