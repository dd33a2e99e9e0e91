//! Per-draw shader parameters.
//!
//! A [`Material`] pairs a shader with the values a draw feeds it: one raw
//! uniform block per stage and a fixed array of texture/sampler bindings per
//! stage. The renderer reads the uniform blocks verbatim at draw time, so the
//! byte layout is fixed when values are written here: uniforms are packed back
//! to back in declaration order.

use bytemuck::{Pod, cast_slice};

use crate::color::Color;
use crate::handle::{ShaderHandle, TextureHandle};
use crate::sampler::TextureSampler;
use crate::shader::{ShaderDescription, ShaderStage, ShaderUniform, UniformType};

/// Maximum texture/sampler bindings per shader stage.
pub const MAX_SAMPLERS_PER_STAGE: usize = 16;

/// A texture (or nothing) bound with a sampler configuration.
///
/// Empty slots and slots whose texture was destroyed are drawn with the
/// renderer's fallback texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BoundSampler {
    pub texture: Option<TextureHandle>,
    pub sampler: TextureSampler,
}

impl BoundSampler {
    pub fn new(texture: TextureHandle, sampler: TextureSampler) -> Self {
        Self {
            texture: Some(texture),
            sampler,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StageUniforms {
    layout: Vec<ShaderUniform>,
    buffer: Vec<u8>,
}

impl StageUniforms {
    fn adopt(&mut self, uniforms: &[ShaderUniform]) {
        self.layout = uniforms.to_vec();
        let required: usize = uniforms.iter().map(ShaderUniform::size_in_bytes).sum();
        if self.buffer.len() < required {
            self.buffer.resize(required, 0);
        }
    }

    fn find(&self, name: &str) -> Option<(usize, &ShaderUniform)> {
        let mut offset = 0;
        for uniform in &self.layout {
            if uniform.name == name {
                return Some((offset, uniform));
            }
            offset += uniform.size_in_bytes();
        }
        None
    }

    fn write(&mut self, name: &str, data: &[u8]) -> bool {
        let Some((offset, _)) = self.find(name) else {
            return false;
        };
        if offset < self.buffer.len() {
            let len = data.len().min(self.buffer.len() - offset);
            self.buffer[offset..offset + len].copy_from_slice(&data[..len]);
        }
        true
    }
}

/// Uniform values and sampler bindings for one shader.
#[derive(Debug, Clone)]
pub struct Material {
    shader: Option<ShaderHandle>,
    vertex: StageUniforms,
    fragment: StageUniforms,
    pub vertex_samplers: [BoundSampler; MAX_SAMPLERS_PER_STAGE],
    pub fragment_samplers: [BoundSampler; MAX_SAMPLERS_PER_STAGE],
}

impl Default for Material {
    fn default() -> Self {
        Self::new()
    }
}

impl Material {
    pub fn new() -> Self {
        Self {
            shader: None,
            vertex: StageUniforms::default(),
            fragment: StageUniforms::default(),
            vertex_samplers: [BoundSampler::default(); MAX_SAMPLERS_PER_STAGE],
            fragment_samplers: [BoundSampler::default(); MAX_SAMPLERS_PER_STAGE],
        }
    }

    pub fn with_shader(shader: ShaderHandle, description: &ShaderDescription) -> Self {
        let mut material = Self::new();
        material.set_shader(shader, description);
        material
    }

    pub fn shader(&self) -> Option<ShaderHandle> {
        self.shader
    }

    /// Switches to `shader`, adopting its uniform layout.
    ///
    /// Uniform buffers grow to fit the new layout but never shrink, so bytes
    /// written before the switch keep their positions.
    pub fn set_shader(&mut self, shader: ShaderHandle, description: &ShaderDescription) {
        if self.shader == Some(shader) {
            return;
        }
        self.shader = Some(shader);
        self.vertex.adopt(&description.vertex.uniforms);
        self.fragment.adopt(&description.fragment.uniforms);
    }

    /// Detaches the shader. Uniform bytes are kept.
    pub fn clear_shader(&mut self) {
        self.shader = None;
        self.vertex.layout.clear();
        self.fragment.layout.clear();
    }

    /// Detaches the shader and unbinds every sampler slot.
    pub fn clear(&mut self) {
        self.clear_shader();
        self.vertex_samplers = [BoundSampler::default(); MAX_SAMPLERS_PER_STAGE];
        self.fragment_samplers = [BoundSampler::default(); MAX_SAMPLERS_PER_STAGE];
    }

    /// Copies shader, samplers and as many uniform bytes as fit into `other`.
    pub fn copy_to(&self, other: &mut Material) {
        other.shader = self.shader;
        other.vertex.adopt(&self.vertex.layout);
        other.fragment.adopt(&self.fragment.layout);
        other.vertex_samplers = self.vertex_samplers;
        other.fragment_samplers = self.fragment_samplers;
        for (src, dst) in [
            (&self.vertex.buffer, &mut other.vertex.buffer),
            (&self.fragment.buffer, &mut other.fragment.buffer),
        ] {
            let len = src.len().min(dst.len());
            dst[..len].copy_from_slice(&src[..len]);
        }
    }

    pub fn samplers(&self, stage: ShaderStage) -> &[BoundSampler; MAX_SAMPLERS_PER_STAGE] {
        match stage {
            ShaderStage::Vertex => &self.vertex_samplers,
            ShaderStage::Fragment => &self.fragment_samplers,
        }
    }

    /// Binds `texture` with `sampler` to a slot. Out-of-range slots are ignored.
    pub fn set_sampler(
        &mut self,
        stage: ShaderStage,
        slot: usize,
        texture: Option<TextureHandle>,
        sampler: TextureSampler,
    ) {
        let slots = match stage {
            ShaderStage::Vertex => &mut self.vertex_samplers,
            ShaderStage::Fragment => &mut self.fragment_samplers,
        };
        if let Some(bound) = slots.get_mut(slot) {
            *bound = BoundSampler { texture, sampler };
        } else {
            log::warn!("Material sampler slot {slot} is out of range");
        }
    }

    /// Raw uniform block of a stage.
    pub fn uniform_buffer(&self, stage: ShaderStage) -> &[u8] {
        match stage {
            ShaderStage::Vertex => &self.vertex.buffer,
            ShaderStage::Fragment => &self.fragment.buffer,
        }
    }

    /// Looks up a uniform by name, vertex stage first.
    pub fn has(&self, name: &str) -> Option<(UniformType, usize)> {
        self.vertex
            .find(name)
            .or_else(|| self.fragment.find(name))
            .map(|(_, uniform)| (uniform.ty, uniform.array_elements))
    }

    /// Writes raw bytes to `name` in every stage that declares it.
    ///
    /// Writes past the end of a stage's block are truncated. Returns `false`
    /// when no stage declares the uniform.
    pub fn set(&mut self, name: &str, data: &[u8]) -> bool {
        if self.shader.is_none() {
            return false;
        }
        let in_vertex = self.vertex.write(name, data);
        let in_fragment = self.fragment.write(name, data);
        in_vertex || in_fragment
    }

    pub fn set_values<T: Pod>(&mut self, name: &str, values: &[T]) -> bool {
        self.set(name, cast_slice(values))
    }

    pub fn set_floats(&mut self, name: &str, values: &[f32]) -> bool {
        self.set_values(name, values)
    }

    pub fn set_float(&mut self, name: &str, value: f32) -> bool {
        self.set_floats(name, &[value])
    }

    pub fn set_vec2(&mut self, name: &str, value: [f32; 2]) -> bool {
        self.set_floats(name, &value)
    }

    pub fn set_vec3(&mut self, name: &str, value: [f32; 3]) -> bool {
        self.set_floats(name, &value)
    }

    pub fn set_vec4(&mut self, name: &str, value: [f32; 4]) -> bool {
        self.set_floats(name, &value)
    }

    /// Writes a 2D affine matrix as its three rows of two floats.
    pub fn set_matrix3x2(&mut self, name: &str, value: [[f32; 2]; 3]) -> bool {
        self.set_values(name, &value)
    }

    /// Writes a 4x4 matrix row by row.
    pub fn set_matrix4x4(&mut self, name: &str, value: [[f32; 4]; 4]) -> bool {
        self.set_values(name, &value)
    }

    pub fn set_color(&mut self, name: &str, value: Color) -> bool {
        self.set_floats(name, &value.to_array())
    }
}
