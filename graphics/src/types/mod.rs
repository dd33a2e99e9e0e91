//! Native types and descriptors passed to the GPU backends.
//!
//! This module contains format enums, usage flags, and descriptor structs
//! the renderer hands to [`crate::backend::GpuBackend`].

mod buffer;
mod common;
mod pass;
mod pipeline;
mod sampler;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use common::{ScissorRect, Viewport};
pub use pass::{ColorAttachment, ColorTarget, DepthStencilAttachment, LoadOp, RenderPassDescriptor};
pub use pipeline::{
    BlendComponent, BlendState, ColorTargetState, ColorWrites, CompareFunction, DepthStencilState,
    Face, GpuBlendFactor, GpuBlendOperation, MAX_COLOR_ATTACHMENTS, RenderPipelineDescriptor,
    VertexAttribute, VertexAttributeFormat, VertexBufferLayout,
};
pub use sampler::{AddressMode, FilterMode, SamplerDescriptor};
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage};
