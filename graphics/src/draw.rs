//! Draw requests.

use arrayvec::ArrayVec;
use ember_core::{BlendMode, CullMode, DepthCompare, Material, MeshHandle, RectInt, TextureHandle};

use crate::error::GraphicsError;
use crate::pipeline::MAX_TARGET_ATTACHMENTS;

/// A set of textures drawn into together.
///
/// Attachments with a depth/stencil format become the pass's depth
/// attachment; the others are color attachments in the order given.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderTarget {
    attachments: ArrayVec<TextureHandle, MAX_TARGET_ATTACHMENTS>,
}

impl RenderTarget {
    /// A target with a single attachment.
    pub fn new(attachment: TextureHandle) -> Self {
        let mut attachments = ArrayVec::new();
        attachments.push(attachment);
        Self { attachments }
    }

    /// A color attachment with a depth/stencil attachment.
    pub fn with_depth(color: TextureHandle, depth: TextureHandle) -> Self {
        let mut attachments = ArrayVec::new();
        attachments.push(color);
        attachments.push(depth);
        Self { attachments }
    }

    pub fn from_attachments(attachments: &[TextureHandle]) -> Result<Self, GraphicsError> {
        if attachments.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "render target without attachments".into(),
            ));
        }
        let attachments = ArrayVec::try_from(attachments).map_err(|_| {
            GraphicsError::InvalidParameter(format!(
                "render target with more than {MAX_TARGET_ATTACHMENTS} attachments"
            ))
        })?;
        Ok(Self { attachments })
    }

    pub fn attachments(&self) -> &[TextureHandle] {
        &self.attachments
    }

    pub(crate) fn attachment_list(&self) -> ArrayVec<TextureHandle, MAX_TARGET_ATTACHMENTS> {
        self.attachments.clone()
    }
}

/// Everything one indexed draw needs.
///
/// Defaults: the swapchain as target, no index offset, the full target as
/// viewport and scissor, no culling, depth testing off and premultiplied
/// alpha blending.
///
/// # Example
///
/// ```ignore
/// let command = DrawCommand::new(&material, mesh, 3)
///     .with_target(&target)
///     .with_blend(BlendMode::NON_PREMULTIPLY);
/// renderer.draw(&command)?;
/// ```
#[derive(Debug, Clone)]
pub struct DrawCommand<'a> {
    pub target: Option<&'a RenderTarget>,
    pub material: &'a Material,
    pub mesh: MeshHandle,
    pub index_start: u32,
    pub index_count: u32,
    pub vertex_offset: i32,
    pub scissor: Option<RectInt>,
    pub viewport: Option<RectInt>,
    pub cull: CullMode,
    pub depth_compare: DepthCompare,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: BlendMode,
}

impl<'a> DrawCommand<'a> {
    pub fn new(material: &'a Material, mesh: MeshHandle, index_count: u32) -> Self {
        Self {
            target: None,
            material,
            mesh,
            index_start: 0,
            index_count,
            vertex_offset: 0,
            scissor: None,
            viewport: None,
            cull: CullMode::default(),
            depth_compare: DepthCompare::default(),
            depth_test: false,
            depth_write: false,
            blend: BlendMode::default(),
        }
    }

    pub fn with_target(mut self, target: &'a RenderTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_index_range(mut self, start: u32, count: u32) -> Self {
        self.index_start = start;
        self.index_count = count;
        self
    }

    pub fn with_vertex_offset(mut self, offset: i32) -> Self {
        self.vertex_offset = offset;
        self
    }

    pub fn with_scissor(mut self, scissor: RectInt) -> Self {
        self.scissor = Some(scissor);
        self
    }

    pub fn with_viewport(mut self, viewport: RectInt) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn with_cull(mut self, cull: CullMode) -> Self {
        self.cull = cull;
        self
    }

    /// Enable depth testing with `compare`, writing depth if `write` is set.
    pub fn with_depth(mut self, compare: DepthCompare, write: bool) -> Self {
        self.depth_test = true;
        self.depth_compare = compare;
        self.depth_write = write;
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }
}
