//! Draw execution.
//!
//! A draw reuses the open render pass when it targets the same attachments,
//! then issues only the state that changed since the previous draw in that
//! pass: viewport, scissor, pipeline and mesh buffers. Samplers and uniforms
//! are bound for every draw.

use arrayvec::ArrayVec;
use ember_core::{ClearMask, Color, MAX_SAMPLERS_PER_STAGE, ShaderStage};

use super::frame::{FrameState, end_render_pass};
use super::{Device, Renderer};
use crate::backend::{GpuBackend, GpuSampler, GpuTexture};
use crate::draw::{DrawCommand, RenderTarget};
use crate::error::GraphicsError;
use crate::pipeline::{MAX_TARGET_ATTACHMENTS, PipelineKey, PipelineTarget};
use crate::resources::{DeviceId, MeshBuffer, ResourceRegistry};
use crate::types::{
    ColorAttachment, ColorTarget, DepthStencilAttachment, LoadOp, RenderPassDescriptor,
};

/// Attachment aspects cleared when a pass begins. `None` aspects load.
#[derive(Debug, Clone, Copy, Default)]
struct ClearValues {
    color: Option<Color>,
    depth: Option<f32>,
    stencil: Option<u32>,
}

impl ClearValues {
    fn any(&self) -> bool {
        self.color.is_some() || self.depth.is_some() || self.stencil.is_some()
    }
}

/// Make sure a render pass for `target` is open.
///
/// Returns `false` if the target is the swapchain and no image is held this
/// frame, in which case nothing is recorded.
fn begin_pass(
    backend: &GpuBackend,
    frame: &mut FrameState,
    registry: &ResourceRegistry,
    device: DeviceId,
    target: Option<&RenderTarget>,
    clear: ClearValues,
) -> Result<bool, GraphicsError> {
    if frame.passes.can_continue(target, clear.any()) {
        return Ok(true);
    }
    end_render_pass(backend, frame)?;

    let mut desc = RenderPassDescriptor::default();
    let color_load = clear.color.map_or(LoadOp::Load, LoadOp::Clear);
    let (width, height) = match target {
        None => {
            let Some(size) = frame.swapchain else {
                return Ok(false);
            };
            desc.color_attachments.push(ColorAttachment {
                target: ColorTarget::Swapchain,
                load: color_load,
            });
            size
        }
        Some(target) => {
            let mut size = None;
            for &handle in target.attachments() {
                let record = registry.texture(handle, device)?;
                if !record.is_target() {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "texture {handle:?} is not a render target"
                    )));
                }
                size.get_or_insert((record.width(), record.height()));
                if record.native_format().is_depth_stencil() {
                    if desc.depth_stencil.is_some() {
                        return Err(GraphicsError::InvalidParameter(
                            "render target with two depth attachments".into(),
                        ));
                    }
                    desc.depth_stencil = Some(DepthStencilAttachment {
                        texture: &record.gpu,
                        depth_load: clear.depth.map_or(LoadOp::Load, LoadOp::Clear),
                        stencil_load: clear.stencil.map_or(LoadOp::Load, LoadOp::Clear),
                    });
                } else {
                    desc.color_attachments
                        .try_push(ColorAttachment {
                            target: ColorTarget::Texture(&record.gpu),
                            load: color_load,
                        })
                        .map_err(|_| {
                            GraphicsError::InvalidParameter(
                                "too many color attachments".into(),
                            )
                        })?;
                }
            }
            size.ok_or_else(|| {
                GraphicsError::InvalidParameter("render target without attachments".into())
            })?
        }
    };

    let opened = backend.begin_render_pass(&mut frame.render_cmd, &desc)?;
    if opened {
        frame.passes.open_render(target.cloned(), width, height);
    }
    Ok(opened)
}

impl Renderer {
    /// Record one indexed draw.
    ///
    /// Draws into the swapchain are skipped while no swapchain image is held.
    pub fn draw(&mut self, command: &DrawCommand<'_>) -> Result<(), GraphicsError> {
        ember_core::profile_function!();
        let Self { device, registry } = self;
        let Device {
            id,
            backend,
            pipelines,
            samplers,
            frame,
            ..
        } = device.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        let frame = frame.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        let backend: &GpuBackend = backend;
        let id = *id;

        let shader_handle = command.material.shader().ok_or_else(|| {
            GraphicsError::InvalidResource("material has no shader".into())
        })?;
        let shader = registry.shader(shader_handle, id)?;
        if let Some(target) = command.target {
            for &handle in target.attachments() {
                registry.texture(handle, id)?;
            }
        }
        let mesh = registry.mesh(command.mesh, id)?;
        let (Some(vertex), Some(index), Some(vertex_format)) = (
            mesh.buffer(MeshBuffer::Vertex),
            mesh.buffer(MeshBuffer::Index),
            mesh.vertex_format(),
        ) else {
            return Err(GraphicsError::InvalidResource(format!(
                "mesh {:?} has no vertex or index data",
                command.mesh
            )));
        };

        if command.index_start.checked_add(command.index_count).is_none() {
            return Err(GraphicsError::InvalidParameter(format!(
                "index range {}+{} overflows",
                command.index_start, command.index_count
            )));
        }

        if !begin_pass(
            backend,
            frame,
            registry,
            id,
            command.target,
            ClearValues::default(),
        )? {
            log::trace!("Skipped draw, no swapchain image");
            return Ok(());
        }

        let recorded = (|| -> Result<(), GraphicsError> {
            let cmd = &mut frame.render_cmd;
            if let Some(viewport) = frame.passes.update_viewport(command.viewport) {
                backend.set_viewport(cmd, &viewport)?;
            }
            if let Some(scissor) = frame.passes.update_scissor(command.scissor) {
                backend.set_scissor(cmd, &scissor)?;
            }

            let key = PipelineKey {
                target: match command.target {
                    None => PipelineTarget::Swapchain(
                        backend
                            .swapchain_format()
                            .ok_or(GraphicsError::DeviceNotReady)?,
                    ),
                    Some(target) => PipelineTarget::Attachments(target.attachment_list()),
                },
                shader: shader_handle,
                vertex_format: vertex_format.clone(),
                cull: command.cull,
                depth_compare: command.depth_compare,
                depth_test: command.depth_test,
                depth_write: command.depth_write,
                blend: command.blend,
            };
            let (pipeline_id, pipeline) = pipelines.get_or_create(&key, |key| {
                let mut color_formats: ArrayVec<_, MAX_TARGET_ATTACHMENTS> = ArrayVec::new();
                let mut depth_format = None;
                match &key.target {
                    PipelineTarget::Swapchain(format) => color_formats.push(*format),
                    PipelineTarget::Attachments(attachments) => {
                        for &handle in attachments {
                            let format = registry.texture(handle, id)?.native_format();
                            if format.is_depth_stencil() {
                                depth_format = Some(format);
                            } else {
                                color_formats.push(format);
                            }
                        }
                    }
                }
                backend.create_pipeline(&key.descriptor(&shader.gpu, &color_formats, depth_format)?)
            })?;
            if frame.passes.update_pipeline(pipeline_id) {
                backend.bind_pipeline(cmd, &pipeline)?;
            }

            if frame.passes.update_mesh(command.mesh, mesh.is_dirty()) {
                backend.bind_vertex_buffer(cmd, 0, &vertex.gpu)?;
                backend.bind_index_buffer(cmd, &index.gpu, mesh.index_format())?;
            }

            for stage in [ShaderStage::Fragment, ShaderStage::Vertex] {
                let count = shader.sampler_count(stage).min(MAX_SAMPLERS_PER_STAGE);
                if count == 0 {
                    continue;
                }
                let mut bound: ArrayVec<(&GpuTexture, GpuSampler), MAX_SAMPLERS_PER_STAGE> =
                    ArrayVec::new();
                for slot in &command.material.samplers(stage)[..count] {
                    let texture = slot
                        .texture
                        .and_then(|handle| registry.texture(handle, id).ok())
                        .map_or(&frame.fallback, |record| &record.gpu);
                    bound.push((texture, samplers.get_or_create(backend, slot.sampler)?));
                }
                let bindings: ArrayVec<(&GpuTexture, &GpuSampler), MAX_SAMPLERS_PER_STAGE> =
                    bound.iter().map(|(t, s)| (*t, s)).collect();
                backend.bind_samplers(cmd, stage, &bindings)?;
            }

            for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
                let size = shader.description().stage(stage).uniform_size_in_bytes();
                if size == 0 {
                    continue;
                }
                let data = command.material.uniform_buffer(stage);
                backend.push_uniforms(cmd, stage, &data[..size.min(data.len())])?;
            }

            backend.draw_indexed(
                cmd,
                command.index_count,
                command.index_start,
                command.vertex_offset,
            )
        })();

        if let Err(e) = recorded {
            // A failed draw closes the pass.
            end_render_pass(backend, frame)?;
            return Err(e);
        }
        if mesh.is_dirty()
            && let Ok(record) = registry.mesh_mut(command.mesh, id)
        {
            record.clear_dirty();
        }
        Ok(())
    }

    /// Clear aspects of `target` (the swapchain if `None`).
    ///
    /// Starts a new render pass that clears the aspects in `mask` and loads
    /// the rest. An empty mask does nothing.
    pub fn clear(
        &mut self,
        target: Option<&RenderTarget>,
        color: Color,
        depth: f32,
        stencil: u32,
        mask: ClearMask,
    ) -> Result<(), GraphicsError> {
        ember_core::profile_function!();
        if mask.is_empty() {
            return Ok(());
        }
        let Self { device, registry } = self;
        let Device { id, backend, frame, .. } =
            device.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        let frame = frame.as_mut().ok_or(GraphicsError::DeviceNotReady)?;

        let clear = ClearValues {
            color: mask.contains(ClearMask::COLOR).then_some(color),
            depth: mask.contains(ClearMask::DEPTH).then_some(depth),
            stencil: mask.contains(ClearMask::STENCIL).then_some(stencil),
        };
        if !begin_pass(backend, frame, registry, *id, target, clear)? {
            log::trace!("Skipped clear, no swapchain image");
        }
        Ok(())
    }
}
