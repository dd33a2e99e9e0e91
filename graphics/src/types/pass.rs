//! Render pass attachment descriptions.

use arrayvec::ArrayVec;
use ember_core::Color;

use super::MAX_COLOR_ATTACHMENTS;
use crate::backend::GpuTexture;

/// What happens to an attachment's contents when a pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LoadOp<T> {
    #[default]
    Load,
    Clear(T),
}

/// A color attachment: a target texture or the current swapchain image.
#[derive(Debug, Clone, Copy)]
pub enum ColorTarget<'a> {
    Texture(&'a GpuTexture),
    Swapchain,
}

#[derive(Debug, Clone, Copy)]
pub struct ColorAttachment<'a> {
    pub target: ColorTarget<'a>,
    pub load: LoadOp<Color>,
}

#[derive(Debug, Clone, Copy)]
pub struct DepthStencilAttachment<'a> {
    pub texture: &'a GpuTexture,
    pub depth_load: LoadOp<f32>,
    pub stencil_load: LoadOp<u32>,
}

/// Attachments of one render pass. Every attachment is stored at the end of the pass.
#[derive(Debug, Clone, Default)]
pub struct RenderPassDescriptor<'a> {
    pub color_attachments: ArrayVec<ColorAttachment<'a>, MAX_COLOR_ATTACHMENTS>,
    pub depth_stencil: Option<DepthStencilAttachment<'a>>,
}

impl RenderPassDescriptor<'_> {
    pub fn targets_swapchain(&self) -> bool {
        self.color_attachments
            .iter()
            .any(|a| matches!(a.target, ColorTarget::Swapchain))
    }
}
