//! Resource creation for the wgpu backend.

use std::sync::Arc;

use ember_core::{ShaderDescription, ShaderStage, ShaderStageInfo};

use super::WgpuBackend;
use super::conversion::{
    convert_address_mode, convert_blend_state, convert_buffer_usage, convert_color_writes,
    convert_compare_function, convert_face, convert_filter_mode, convert_mipmap_filter_mode,
    convert_texture_format, convert_texture_usage, convert_vertex_format,
};
use crate::backend::{GpuBuffer, GpuPipeline, GpuSampler, GpuShader, GpuTexture};
use crate::error::GraphicsError;
use crate::types::{
    BufferDescriptor, RenderPipelineDescriptor, SamplerDescriptor, TextureDescriptor,
    TextureFormat,
};

/// Number of bind groups every shader layout has.
pub(super) const BIND_GROUP_COUNT: usize = 4;

/// Bind group holding a stage's textures and samplers.
pub(super) fn sampler_group(stage: ShaderStage) -> usize {
    match stage {
        ShaderStage::Vertex => 0,
        ShaderStage::Fragment => 2,
    }
}

/// Bind group holding a stage's uniform block.
pub(super) fn uniform_group(stage: ShaderStage) -> usize {
    sampler_group(stage) + 1
}

struct ShaderModule {
    module: wgpu::ShaderModule,
    entry_point: String,
}

/// A vertex/fragment program pair with its bind group layouts.
pub struct WgpuShader {
    vertex: ShaderModule,
    fragment: ShaderModule,
    /// `None` marks a group the shader does not use; the backend's empty
    /// layout stands in for it.
    pub(super) groups: [Option<wgpu::BindGroupLayout>; BIND_GROUP_COUNT],
    pub(super) sampler_counts: [u32; 2],
    /// Bound size of each stage's uniform block (0 when the stage has none).
    pub(super) uniform_sizes: [u64; 2],
    layout: wgpu::PipelineLayout,
}

impl WgpuShader {
    pub(super) fn uniform_size(&self, stage: ShaderStage) -> u64 {
        self.uniform_sizes[stage_index(stage)]
    }

    pub(super) fn sampler_count(&self, stage: ShaderStage) -> u32 {
        self.sampler_counts[stage_index(stage)]
    }
}

fn stage_index(stage: ShaderStage) -> usize {
    match stage {
        ShaderStage::Vertex => 0,
        ShaderStage::Fragment => 1,
    }
}

/// A render pipeline and the shader whose layout it was built with.
pub struct WgpuPipeline {
    pub(super) pipeline: wgpu::RenderPipeline,
    pub(super) shader: Arc<WgpuShader>,
}

impl WgpuBackend {
    /// Create a texture resource.
    pub fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        let (texture, view) = self.scoped("texture", || {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: descriptor.label.as_deref(),
                size: wgpu::Extent3d {
                    width: descriptor.width,
                    height: descriptor.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: convert_texture_format(descriptor.format),
                usage: convert_texture_usage(descriptor.usage),
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        })?;
        Ok(GpuTexture::Wgpu { texture, view })
    }

    pub fn release_texture(&self, _texture: GpuTexture) {
        // Dropping the last handle frees the texture once queued work is done.
    }

    /// Create a buffer resource.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        let buffer = self.scoped("buffer", || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: descriptor.label.as_deref(),
                size: descriptor.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
                usage: convert_buffer_usage(descriptor.usage),
                mapped_at_creation: false,
            })
        })?;
        Ok(GpuBuffer::Wgpu(buffer))
    }

    pub fn release_buffer(&self, _buffer: GpuBuffer) {}

    /// Create a sampler resource.
    pub fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError> {
        let sampler = self.scoped("sampler", || {
            self.device.create_sampler(&wgpu::SamplerDescriptor {
                label: descriptor.label.as_deref(),
                address_mode_u: convert_address_mode(descriptor.address_mode_u),
                address_mode_v: convert_address_mode(descriptor.address_mode_v),
                address_mode_w: convert_address_mode(descriptor.address_mode_w),
                mag_filter: convert_filter_mode(descriptor.mag_filter),
                min_filter: convert_filter_mode(descriptor.min_filter),
                mipmap_filter: convert_mipmap_filter_mode(descriptor.mipmap_filter),
                lod_min_clamp: 0.0,
                lod_max_clamp: 32.0,
                compare: None,
                anisotropy_clamp: 1,
                border_color: None,
            })
        })?;
        Ok(GpuSampler::Wgpu(sampler))
    }

    pub fn release_sampler(&self, _sampler: GpuSampler) {}

    fn create_shader_module(
        &self,
        stage: ShaderStage,
        info: &ShaderStageInfo,
    ) -> Result<ShaderModule, GraphicsError> {
        let source = std::str::from_utf8(&info.code).map_err(|e| {
            GraphicsError::CreationFailed(format!("Invalid UTF-8 in {stage:?} shader: {e}"))
        })?;
        let module = self.scoped(&format!("{stage:?} shader module"), || {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(info.entry_point.as_str()),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                })
        })?;
        Ok(ShaderModule {
            module,
            entry_point: info.entry_point.clone(),
        })
    }

    fn stage_layouts(
        &self,
        stage: ShaderStage,
        info: &ShaderStageInfo,
    ) -> (Option<wgpu::BindGroupLayout>, Option<wgpu::BindGroupLayout>, u64) {
        let visibility = match stage {
            ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
            ShaderStage::Fragment => wgpu::ShaderStages::FRAGMENT,
        };

        let samplers = (info.sampler_count > 0).then(|| {
            let n = info.sampler_count;
            let textures = (0..n).map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            let samplers = (0..n).map(|i| wgpu::BindGroupLayoutEntry {
                binding: n + i,
                visibility,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
            let entries: Vec<_> = textures.chain(samplers).collect();
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("shader samplers"),
                    entries: &entries,
                })
        });

        let uniform_size = (info.uniform_size_in_bytes() as u64).next_multiple_of(16);
        let uniforms = (uniform_size > 0).then(|| {
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("shader uniforms"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: wgpu::BufferSize::new(uniform_size),
                        },
                        count: None,
                    }],
                })
        });

        (samplers, uniforms, uniform_size)
    }

    pub fn create_shader(&self, desc: &ShaderDescription) -> Result<GpuShader, GraphicsError> {
        let vertex = self.create_shader_module(ShaderStage::Vertex, &desc.vertex)?;
        let fragment = self.create_shader_module(ShaderStage::Fragment, &desc.fragment)?;

        let (groups, layout, vs_size, fs_size) = self.scoped("shader layout", || {
            let (vs_samplers, vs_uniforms, vs_size) =
                self.stage_layouts(ShaderStage::Vertex, &desc.vertex);
            let (fs_samplers, fs_uniforms, fs_size) =
                self.stage_layouts(ShaderStage::Fragment, &desc.fragment);
            let groups = [vs_samplers, vs_uniforms, fs_samplers, fs_uniforms];

            let layout = {
                let layouts: Vec<&wgpu::BindGroupLayout> = groups
                    .iter()
                    .map(|g| g.as_ref().unwrap_or(&self.empty_layout))
                    .collect();
                self.device
                    .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some("shader layout"),
                        bind_group_layouts: &layouts,
                        immediate_size: 0,
                    })
            };
            (groups, layout, vs_size, fs_size)
        })?;

        Ok(GpuShader::Wgpu(Arc::new(WgpuShader {
            vertex,
            fragment,
            groups,
            sampler_counts: [desc.vertex.sampler_count, desc.fragment.sampler_count],
            uniform_sizes: [vs_size, fs_size],
            layout,
        })))
    }

    pub fn release_shader(&self, _shader: GpuShader) {}

    pub fn create_pipeline(
        &self,
        desc: &RenderPipelineDescriptor<'_>,
    ) -> Result<GpuPipeline, GraphicsError> {
        let GpuShader::Wgpu(shader) = desc.shader else {
            return Err(GraphicsError::Internal(
                "create_pipeline called with non-Wgpu shader".into(),
            ));
        };

        let attributes: Vec<wgpu::VertexAttribute> = desc
            .vertex_buffer
            .attributes
            .iter()
            .map(|a| wgpu::VertexAttribute {
                format: convert_vertex_format(a.format),
                offset: a.offset,
                shader_location: a.location,
            })
            .collect();
        let vertex_buffers = [wgpu::VertexBufferLayout {
            array_stride: desc.vertex_buffer.stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];

        let targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .color_targets
            .iter()
            .map(|t| {
                Some(wgpu::ColorTargetState {
                    format: convert_texture_format(t.format),
                    blend: Some(convert_blend_state(t.blend)),
                    write_mask: convert_color_writes(t.write_mask),
                })
            })
            .collect();

        let depth_stencil = desc.depth_stencil.map(|d| wgpu::DepthStencilState {
            format: convert_texture_format(d.format),
            depth_write_enabled: d.depth_write_enabled,
            depth_compare: convert_compare_function(d.depth_compare),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline = self.scoped("render pipeline", || {
            self.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: desc.label.as_deref(),
                    layout: Some(&shader.layout),
                    vertex: wgpu::VertexState {
                        module: &shader.vertex.module,
                        entry_point: Some(shader.vertex.entry_point.as_str()),
                        buffers: &vertex_buffers,
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    },
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        strip_index_format: None,
                        front_face: wgpu::FrontFace::Cw,
                        cull_mode: desc.cull_mode.map(convert_face),
                        unclipped_depth: false,
                        polygon_mode: wgpu::PolygonMode::Fill,
                        conservative: false,
                    },
                    depth_stencil,
                    multisample: wgpu::MultisampleState::default(),
                    fragment: Some(wgpu::FragmentState {
                        module: &shader.fragment.module,
                        entry_point: Some(shader.fragment.entry_point.as_str()),
                        targets: &targets,
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    }),
                    multiview_mask: None,
                    cache: None,
                })
        })?;

        Ok(GpuPipeline::Wgpu(Arc::new(WgpuPipeline {
            pipeline,
            shader: shader.clone(),
        })))
    }

    pub fn release_pipeline(&self, _pipeline: GpuPipeline) {}

    /// Read back a whole texture through a mappable staging buffer.
    pub fn read_texture(
        &self,
        texture: &GpuTexture,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, GraphicsError> {
        let GpuTexture::Wgpu { texture, .. } = texture else {
            return Err(GraphicsError::Internal(
                "read_texture called with non-Wgpu texture".into(),
            ));
        };

        let layout = self.texture_upload_layout(format, width, height);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: layout.size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(layout.bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        let index = self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(index),
                timeout: None,
            })
            .map_err(|e| GraphicsError::Internal(format!("Readback wait failed: {e}")))?;
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(GraphicsError::Internal(format!("Readback map failed: {e}")));
            }
            Err(e) => {
                return Err(GraphicsError::Internal(format!("Readback map failed: {e}")));
            }
        }

        let row = (width * format.block_size()) as usize;
        let pitch = layout.bytes_per_row as usize;
        let data = {
            let mapped = slice.get_mapped_range();
            let mut packed = Vec::with_capacity(row * height as usize);
            for y in 0..height as usize {
                packed.extend_from_slice(&mapped[y * pitch..y * pitch + row]);
            }
            packed
        };
        staging.unmap();
        Ok(data)
    }
}
