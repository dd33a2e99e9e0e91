//! Shader descriptions handed to the renderer at creation time.

/// Type of a single shader uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Float2,
    Float3,
    Float4,
    Mat3x2,
    Mat4x4,
}

impl UniformType {
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::Float => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
            Self::Mat3x2 => 24,
            Self::Mat4x4 => 64,
        }
    }
}

/// A named uniform, laid out back to back with the stage's other uniforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderUniform {
    pub name: String,
    pub ty: UniformType,
    pub array_elements: usize,
}

impl ShaderUniform {
    pub fn new(name: impl Into<String>, ty: UniformType) -> Self {
        Self {
            name: name.into(),
            ty,
            array_elements: 1,
        }
    }

    pub fn with_array_elements(mut self, array_elements: usize) -> Self {
        self.array_elements = array_elements;
        self
    }

    pub fn size_in_bytes(&self) -> usize {
        self.ty.size_in_bytes() * self.array_elements
    }
}

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Code and resource requirements of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderStageInfo {
    /// Backend-specific program code (WGSL source for the wgpu backend).
    pub code: Vec<u8>,
    pub entry_point: String,
    /// Number of consecutive texture/sampler slots the stage reads.
    pub sampler_count: u32,
    pub uniforms: Vec<ShaderUniform>,
}

impl ShaderStageInfo {
    pub fn new(code: impl Into<Vec<u8>>, entry_point: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            entry_point: entry_point.into(),
            sampler_count: 0,
            uniforms: Vec::new(),
        }
    }

    pub fn with_sampler_count(mut self, sampler_count: u32) -> Self {
        self.sampler_count = sampler_count;
        self
    }

    pub fn with_uniform(mut self, uniform: ShaderUniform) -> Self {
        self.uniforms.push(uniform);
        self
    }

    /// Size of the stage's uniform block.
    pub fn uniform_size_in_bytes(&self) -> usize {
        self.uniforms.iter().map(ShaderUniform::size_in_bytes).sum()
    }
}

/// A vertex + fragment program pair.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderDescription {
    pub vertex: ShaderStageInfo,
    pub fragment: ShaderStageInfo,
}

impl ShaderDescription {
    pub fn new(vertex: ShaderStageInfo, fragment: ShaderStageInfo) -> Self {
        Self { vertex, fragment }
    }

    pub fn stage(&self, stage: ShaderStage) -> &ShaderStageInfo {
        match stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Fragment => &self.fragment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_block_size() {
        let stage = ShaderStageInfo::new(Vec::new(), "main")
            .with_uniform(ShaderUniform::new("matrix", UniformType::Mat4x4))
            .with_uniform(ShaderUniform::new("offsets", UniformType::Float2).with_array_elements(3));
        assert_eq!(stage.uniform_size_in_bytes(), 64 + 24);
    }
}
