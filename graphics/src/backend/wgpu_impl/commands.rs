//! Command recording for the wgpu backend.
//!
//! A copy pass is a recording mode of the encoder; a render pass is a
//! `wgpu::RenderPass` detached from the encoder's lifetime so it can live in
//! the command buffer between calls.

use std::sync::Arc;

use arrayvec::ArrayVec;
use ember_core::{IndexFormat, ShaderStage};

use super::WgpuBackend;
use super::conversion::{convert_color_load_op, convert_index_format, convert_load_op};
use super::resources::{BIND_GROUP_COUNT, WgpuPipeline, WgpuShader, sampler_group, uniform_group};
use super::transfer::UniformChunk;
use crate::backend::{
    GpuBuffer, GpuCommandBuffer, GpuPipeline, GpuSampler, GpuTexture, GpuTransferBuffer,
};
use crate::error::GraphicsError;
use crate::types::{ColorTarget, MAX_COLOR_ATTACHMENTS, RenderPassDescriptor, ScissorRect, Viewport};

/// Bind group over a uniform chunk, reused for every push into that chunk.
struct UniformGroup {
    chunk: usize,
    shader: Arc<WgpuShader>,
    group: usize,
    bind_group: wgpu::BindGroup,
}

/// A command buffer being recorded by the wgpu backend.
pub struct WgpuCommandBuffer {
    encoder: wgpu::CommandEncoder,
    pass: Option<wgpu::RenderPass<'static>>,
    copy_open: bool,
    pipeline: Option<Arc<WgpuPipeline>>,
    uniform_chunks: Vec<UniformChunk>,
    uniform_groups: Vec<UniformGroup>,
}

impl WgpuCommandBuffer {
    /// Finish recording; returns the encoder and the uniform chunks it used.
    pub(super) fn finish(self) -> Result<(wgpu::CommandEncoder, Vec<UniformChunk>), GraphicsError> {
        if self.pass.is_some() || self.copy_open {
            return Err(GraphicsError::Internal(
                "command buffer submitted with an open pass".into(),
            ));
        }
        Ok((self.encoder, self.uniform_chunks))
    }

    fn render_pass(&mut self) -> Result<&mut wgpu::RenderPass<'static>, GraphicsError> {
        self.pass.as_mut().ok_or_else(|| {
            GraphicsError::Internal("render command recorded outside a render pass".into())
        })
    }

    fn pipeline(&self) -> Result<Arc<WgpuPipeline>, GraphicsError> {
        self.pipeline
            .clone()
            .ok_or_else(|| GraphicsError::Internal("no pipeline bound".into()))
    }
}

fn wgpu_cmd(cmd: &mut GpuCommandBuffer) -> Result<&mut WgpuCommandBuffer, GraphicsError> {
    match cmd {
        GpuCommandBuffer::Wgpu(cmd) => Ok(cmd),
        _ => Err(GraphicsError::Internal(
            "command recorded on a non-Wgpu command buffer".into(),
        )),
    }
}

fn wgpu_buffer(buffer: &GpuBuffer) -> Result<&wgpu::Buffer, GraphicsError> {
    match buffer {
        GpuBuffer::Wgpu(buffer) => Ok(buffer),
        _ => Err(GraphicsError::Internal("non-Wgpu buffer".into())),
    }
}

fn wgpu_texture(texture: &GpuTexture) -> Result<(&wgpu::Texture, &wgpu::TextureView), GraphicsError> {
    match texture {
        GpuTexture::Wgpu { texture, view } => Ok((texture, view)),
        _ => Err(GraphicsError::Internal("non-Wgpu texture".into())),
    }
}

impl WgpuBackend {
    pub fn acquire_command_buffer(&self, label: &str) -> Result<GpuCommandBuffer, GraphicsError> {
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        Ok(GpuCommandBuffer::Wgpu(Box::new(WgpuCommandBuffer {
            encoder,
            pass: None,
            copy_open: false,
            pipeline: None,
            uniform_chunks: Vec::new(),
            uniform_groups: Vec::new(),
        })))
    }

    pub fn begin_copy_pass(&self, cmd: &mut GpuCommandBuffer) -> Result<(), GraphicsError> {
        let cmd = wgpu_cmd(cmd)?;
        if cmd.copy_open || cmd.pass.is_some() {
            return Err(GraphicsError::Internal("a pass is already open".into()));
        }
        cmd.copy_open = true;
        Ok(())
    }

    pub fn end_copy_pass(&self, cmd: &mut GpuCommandBuffer) -> Result<(), GraphicsError> {
        let cmd = wgpu_cmd(cmd)?;
        if !cmd.copy_open {
            return Err(GraphicsError::Internal("no copy pass is open".into()));
        }
        cmd.copy_open = false;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn upload_to_texture(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: &GpuTransferBuffer,
        src_offset: u64,
        bytes_per_row: u32,
        dst: &GpuTexture,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError> {
        let GpuTransferBuffer::Wgpu(src) = src else {
            return Err(GraphicsError::Internal("non-Wgpu transfer buffer".into()));
        };
        let (texture, _) = wgpu_texture(dst)?;
        let cmd = wgpu_cmd(cmd)?;
        if !cmd.copy_open {
            return Err(GraphicsError::Internal("upload outside a copy pass".into()));
        }
        let source = src.active_buffer();
        cmd.encoder.copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer: &source,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: src_offset,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    pub fn upload_to_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        src: &GpuTransferBuffer,
        src_offset: u64,
        dst: &GpuBuffer,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        let GpuTransferBuffer::Wgpu(src) = src else {
            return Err(GraphicsError::Internal("non-Wgpu transfer buffer".into()));
        };
        let dst = wgpu_buffer(dst)?;
        let cmd = wgpu_cmd(cmd)?;
        if !cmd.copy_open {
            return Err(GraphicsError::Internal("upload outside a copy pass".into()));
        }
        let source = src.active_buffer();
        cmd.encoder
            .copy_buffer_to_buffer(&source, src_offset, dst, dst_offset, size);
        Ok(())
    }

    pub fn begin_render_pass(
        &self,
        cmd: &mut GpuCommandBuffer,
        desc: &RenderPassDescriptor<'_>,
    ) -> Result<bool, GraphicsError> {
        let mut views: ArrayVec<wgpu::TextureView, MAX_COLOR_ATTACHMENTS> = ArrayVec::new();
        for attachment in &desc.color_attachments {
            let view = match attachment.target {
                ColorTarget::Texture(texture) => wgpu_texture(texture)?.1.clone(),
                ColorTarget::Swapchain => match self.swapchain_view() {
                    Some(view) => view,
                    None => return Ok(false),
                },
            };
            views.push(view);
        }

        let color_attachments: ArrayVec<Option<wgpu::RenderPassColorAttachment<'_>>, MAX_COLOR_ATTACHMENTS> =
            desc.color_attachments
                .iter()
                .zip(&views)
                .map(|(attachment, view)| {
                    Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: convert_color_load_op(attachment.load),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })
                })
                .collect();

        let depth_stencil_attachment = match &desc.depth_stencil {
            Some(ds) => {
                let (texture, view) = wgpu_texture(ds.texture)?;
                let stencil_ops = texture.format().has_stencil_aspect().then(|| wgpu::Operations {
                    load: convert_load_op(ds.stencil_load),
                    store: wgpu::StoreOp::Store,
                });
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: convert_load_op(ds.depth_load),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops,
                })
            }
            None => None,
        };

        let cmd = wgpu_cmd(cmd)?;
        if cmd.copy_open || cmd.pass.is_some() {
            return Err(GraphicsError::Internal("a pass is already open".into()));
        }
        let pass = cmd
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Ember Render Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            })
            .forget_lifetime();
        cmd.pass = Some(pass);
        cmd.pipeline = None;
        Ok(true)
    }

    pub fn end_render_pass(&self, cmd: &mut GpuCommandBuffer) -> Result<(), GraphicsError> {
        let cmd = wgpu_cmd(cmd)?;
        if cmd.pass.take().is_none() {
            return Err(GraphicsError::Internal("no render pass is open".into()));
        }
        cmd.pipeline = None;
        Ok(())
    }

    pub fn set_viewport(
        &self,
        cmd: &mut GpuCommandBuffer,
        viewport: &Viewport,
    ) -> Result<(), GraphicsError> {
        wgpu_cmd(cmd)?.render_pass()?.set_viewport(
            viewport.x,
            viewport.y,
            viewport.width,
            viewport.height,
            viewport.min_depth,
            viewport.max_depth,
        );
        Ok(())
    }

    pub fn set_scissor(
        &self,
        cmd: &mut GpuCommandBuffer,
        scissor: &ScissorRect,
    ) -> Result<(), GraphicsError> {
        wgpu_cmd(cmd)?
            .render_pass()?
            .set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);
        Ok(())
    }

    pub fn bind_pipeline(
        &self,
        cmd: &mut GpuCommandBuffer,
        pipeline: &GpuPipeline,
    ) -> Result<(), GraphicsError> {
        let GpuPipeline::Wgpu(pipeline) = pipeline else {
            return Err(GraphicsError::Internal("non-Wgpu pipeline".into()));
        };
        let cmd = wgpu_cmd(cmd)?;
        let pass = cmd.render_pass()?;
        pass.set_pipeline(&pipeline.pipeline);
        for (index, layout) in pipeline.shader.groups.iter().enumerate().take(BIND_GROUP_COUNT) {
            if layout.is_none() {
                pass.set_bind_group(index as u32, &self.empty_group, &[]);
            }
        }
        cmd.pipeline = Some(pipeline.clone());
        Ok(())
    }

    pub fn bind_vertex_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        slot: u32,
        buffer: &GpuBuffer,
    ) -> Result<(), GraphicsError> {
        let buffer = wgpu_buffer(buffer)?;
        wgpu_cmd(cmd)?
            .render_pass()?
            .set_vertex_buffer(slot, buffer.slice(..));
        Ok(())
    }

    pub fn bind_index_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        buffer: &GpuBuffer,
        format: IndexFormat,
    ) -> Result<(), GraphicsError> {
        let buffer = wgpu_buffer(buffer)?;
        wgpu_cmd(cmd)?
            .render_pass()?
            .set_index_buffer(buffer.slice(..), convert_index_format(format));
        Ok(())
    }

    pub fn bind_samplers(
        &self,
        cmd: &mut GpuCommandBuffer,
        stage: ShaderStage,
        bindings: &[(&GpuTexture, &GpuSampler)],
    ) -> Result<(), GraphicsError> {
        let cmd = wgpu_cmd(cmd)?;
        let pipeline = cmd.pipeline()?;
        let group = sampler_group(stage);
        let Some(layout) = &pipeline.shader.groups[group] else {
            return Ok(());
        };
        let count = pipeline.shader.sampler_count(stage) as usize;
        if bindings.len() < count {
            return Err(GraphicsError::Internal(format!(
                "{stage:?} stage needs {count} samplers, got {}",
                bindings.len()
            )));
        }

        let mut entries = Vec::with_capacity(count * 2);
        for (i, (texture, _)) in bindings.iter().take(count).enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32,
                resource: wgpu::BindingResource::TextureView(wgpu_texture(texture)?.1),
            });
        }
        for (i, (_, sampler)) in bindings.iter().take(count).enumerate() {
            let GpuSampler::Wgpu(sampler) = sampler else {
                return Err(GraphicsError::Internal("non-Wgpu sampler".into()));
            };
            entries.push(wgpu::BindGroupEntry {
                binding: (count + i) as u32,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("samplers"),
            layout,
            entries: &entries,
        });
        cmd.render_pass()?
            .set_bind_group(group as u32, &bind_group, &[]);
        Ok(())
    }

    pub fn push_uniforms(
        &self,
        cmd: &mut GpuCommandBuffer,
        stage: ShaderStage,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let cmd = wgpu_cmd(cmd)?;
        let pipeline = cmd.pipeline()?;
        let group = uniform_group(stage);
        let Some(layout) = &pipeline.shader.groups[group] else {
            return Ok(());
        };
        let size = pipeline.shader.uniform_size(stage);

        let (chunk, offset) = self.allocate_uniforms(&mut cmd.uniform_chunks, size)?;
        let buffer = cmd.uniform_chunks[chunk].buffer.clone();
        let mut block = vec![0u8; size as usize];
        let len = data.len().min(block.len());
        block[..len].copy_from_slice(&data[..len]);
        self.queue.write_buffer(&buffer, offset, &block);

        let existing = cmd.uniform_groups.iter().position(|g| {
            g.chunk == chunk && g.group == group && Arc::ptr_eq(&g.shader, &pipeline.shader)
        });
        let index = match existing {
            Some(index) => index,
            None => {
                let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("uniforms"),
                    layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &buffer,
                            offset: 0,
                            size: wgpu::BufferSize::new(size),
                        }),
                    }],
                });
                cmd.uniform_groups.push(UniformGroup {
                    chunk,
                    shader: pipeline.shader.clone(),
                    group,
                    bind_group,
                });
                cmd.uniform_groups.len() - 1
            }
        };

        let WgpuCommandBuffer {
            pass,
            uniform_groups,
            ..
        } = cmd;
        let pass = pass.as_mut().ok_or_else(|| {
            GraphicsError::Internal("render command recorded outside a render pass".into())
        })?;
        pass.set_bind_group(
            group as u32,
            &uniform_groups[index].bind_group,
            &[offset as u32],
        );
        Ok(())
    }

    pub fn draw_indexed(
        &self,
        cmd: &mut GpuCommandBuffer,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) -> Result<(), GraphicsError> {
        let end = first_index.checked_add(index_count).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "index range {first_index}+{index_count} overflows"
            ))
        })?;
        wgpu_cmd(cmd)?
            .render_pass()?
            .draw_indexed(first_index..end, vertex_offset, 0..1);
        Ok(())
    }
}
