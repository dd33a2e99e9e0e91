//! Copy-pass and render-pass bookkeeping.
//!
//! Uploads and draws are recorded into two separate command buffers, so a
//! copy pass and a render pass can be open at the same time:
//!
//! ```text
//!            first upload              end of frame / stall
//! copy:   Idle ───────────► Open ─────────────────────────► Idle
//!
//!            draw / clear              target change, clear,
//! render: Idle ───────────► Open ───── end of frame, stall ─► Idle
//!                            │  ▲
//!                            └──┘ same target, no clear
//! ```
//!
//! While a render pass is open, [`PassState`] remembers the last viewport,
//! scissor, pipeline and mesh it issued so repeated draws with the same
//! state skip the native rebind. All of it is forgotten when the pass ends.

use ember_core::{MeshHandle, RectInt};

use crate::draw::RenderTarget;
use crate::pipeline::PipelineId;
use crate::types::{ScissorRect, Viewport};

/// State of the open render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassState {
    /// `None` when rendering to the swapchain.
    pub target: Option<RenderTarget>,
    pub width: u32,
    pub height: u32,
    viewport: Option<RectInt>,
    scissor: Option<RectInt>,
    pipeline: Option<PipelineId>,
    mesh: Option<MeshHandle>,
}

impl RenderPassState {
    fn new(target: Option<RenderTarget>, width: u32, height: u32) -> Self {
        Self {
            target,
            width,
            height,
            viewport: None,
            scissor: None,
            pipeline: None,
            mesh: None,
        }
    }

    /// Native viewport for a requested rectangle; `None` covers the target.
    pub fn viewport_for(&self, rect: Option<RectInt>) -> Viewport {
        match rect {
            Some(r) => Viewport::new(r.x as f32, r.y as f32, r.width as f32, r.height as f32),
            None => Viewport::from_dimensions(self.width, self.height),
        }
    }

    /// Native scissor for a requested rectangle, clamped to the target.
    pub fn scissor_for(&self, rect: Option<RectInt>) -> ScissorRect {
        let bounds = RectInt::from_size(self.width, self.height);
        let clipped = rect.map_or(bounds, |r| r.intersect(&bounds));
        ScissorRect::new(
            clipped.x as u32,
            clipped.y as u32,
            clipped.width as u32,
            clipped.height as u32,
        )
    }
}

/// Open passes of the current frame.
#[derive(Debug, Default)]
pub struct PassState {
    copy_open: bool,
    render: Option<RenderPassState>,
}

impl PassState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copy_open(&self) -> bool {
        self.copy_open
    }

    /// Mark the copy pass open. Returns `false` if it already was.
    pub fn open_copy(&mut self) -> bool {
        !std::mem::replace(&mut self.copy_open, true)
    }

    /// Mark the copy pass closed. Returns whether one was open.
    pub fn close_copy(&mut self) -> bool {
        std::mem::replace(&mut self.copy_open, false)
    }

    pub fn render(&self) -> Option<&RenderPassState> {
        self.render.as_ref()
    }

    pub fn render_open(&self) -> bool {
        self.render.is_some()
    }

    /// Whether drawing to `target` can continue in the open render pass.
    ///
    /// A pass is reused only for the same target and only when nothing is
    /// being cleared.
    pub fn can_continue(&self, target: Option<&RenderTarget>, clearing: bool) -> bool {
        !clearing
            && self
                .render
                .as_ref()
                .is_some_and(|pass| pass.target.as_ref() == target)
    }

    pub fn open_render(&mut self, target: Option<RenderTarget>, width: u32, height: u32) {
        self.render = Some(RenderPassState::new(target, width, height));
    }

    /// Forget the open render pass and everything bound in it.
    pub fn close_render(&mut self) -> bool {
        self.render.take().is_some()
    }

    /// Record the requested viewport. Returns the native viewport to issue if
    /// it differs from the last request in this pass.
    pub fn update_viewport(&mut self, rect: Option<RectInt>) -> Option<Viewport> {
        let pass = self.render.as_mut()?;
        if pass.viewport == rect {
            return None;
        }
        pass.viewport = rect;
        Some(pass.viewport_for(rect))
    }

    /// Record the requested scissor. Returns the native rectangle to issue if
    /// it differs from the last request in this pass.
    pub fn update_scissor(&mut self, rect: Option<RectInt>) -> Option<ScissorRect> {
        let pass = self.render.as_mut()?;
        if pass.scissor == rect {
            return None;
        }
        pass.scissor = rect;
        Some(pass.scissor_for(rect))
    }

    /// Record the bound pipeline. Returns whether it changed.
    pub fn update_pipeline(&mut self, pipeline: PipelineId) -> bool {
        match self.render.as_mut() {
            Some(pass) if pass.pipeline != Some(pipeline) => {
                pass.pipeline = Some(pipeline);
                true
            }
            _ => false,
        }
    }

    /// Record the bound mesh. Returns whether its buffers must be rebound.
    pub fn update_mesh(&mut self, mesh: MeshHandle, dirty: bool) -> bool {
        match self.render.as_mut() {
            Some(pass) if dirty || pass.mesh != Some(mesh) => {
                pass.mesh = Some(mesh);
                true
            }
            _ => false,
        }
    }

    /// Forget the bound mesh, forcing a rebind on the next draw.
    pub fn forget_mesh(&mut self, mesh: MeshHandle) {
        if let Some(pass) = self.render.as_mut()
            && pass.mesh == Some(mesh)
        {
            pass.mesh = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::TextureHandle;
    use slotmap::SlotMap;

    fn target() -> RenderTarget {
        let mut textures: SlotMap<TextureHandle, ()> = SlotMap::with_key();
        RenderTarget::new(textures.insert(()))
    }

    fn mesh() -> MeshHandle {
        let mut meshes: SlotMap<MeshHandle, ()> = SlotMap::with_key();
        meshes.insert(())
    }

    #[test]
    fn test_copy_pass_flags() {
        let mut passes = PassState::new();
        assert!(passes.open_copy());
        assert!(!passes.open_copy());
        assert!(passes.close_copy());
        assert!(!passes.close_copy());
    }

    #[test]
    fn test_continue_requires_same_target_and_no_clear() {
        let mut passes = PassState::new();
        let target = target();
        assert!(!passes.can_continue(None, false));

        passes.open_render(None, 320, 240);
        assert!(passes.can_continue(None, false));
        assert!(!passes.can_continue(None, true));
        assert!(!passes.can_continue(Some(&target), false));

        passes.open_render(Some(target.clone()), 64, 64);
        assert!(passes.can_continue(Some(&target), false));
        assert!(!passes.can_continue(None, false));
    }

    #[test]
    fn test_viewport_and_scissor_dedup() {
        let mut passes = PassState::new();
        passes.open_render(None, 320, 240);

        // The pass starts out covering the whole target.
        assert_eq!(passes.update_scissor(None), None);
        assert_eq!(passes.update_viewport(None), None);

        let rect = RectInt::new(10, 10, 400, 50);
        assert_eq!(
            passes.update_scissor(Some(rect)),
            Some(ScissorRect::new(10, 10, 310, 50))
        );
        assert_eq!(passes.update_scissor(Some(rect)), None);
        assert_eq!(
            passes.update_scissor(None),
            Some(ScissorRect::from_dimensions(320, 240))
        );

        assert_eq!(
            passes.update_viewport(Some(rect)),
            Some(Viewport::new(10.0, 10.0, 400.0, 50.0))
        );
    }

    #[test]
    fn test_close_forgets_bindings() {
        let mut passes = PassState::new();
        let mesh = mesh();
        let mut pipelines: SlotMap<PipelineId, ()> = SlotMap::with_key();
        let pipeline = pipelines.insert(());

        passes.open_render(None, 8, 8);
        assert!(passes.update_pipeline(pipeline));
        assert!(!passes.update_pipeline(pipeline));
        assert!(passes.update_mesh(mesh, false));
        assert!(!passes.update_mesh(mesh, false));
        assert!(passes.update_mesh(mesh, true));

        assert!(passes.close_render());
        passes.open_render(None, 8, 8);
        assert!(passes.update_pipeline(pipeline));
        assert!(passes.update_mesh(mesh, false));
    }

    #[test]
    fn test_updates_without_pass_are_ignored() {
        let mut passes = PassState::new();
        assert_eq!(passes.update_viewport(Some(RectInt::new(0, 0, 1, 1))), None);
        assert!(!passes.update_mesh(mesh(), true));
    }
}
