//! Sampler state attached to bound textures.

mod types;

pub use types::{TextureFilter, TextureSampler, TextureWrap};
