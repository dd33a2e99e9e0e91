//! Shader records.

use ember_core::{ShaderDescription, ShaderStage};

use super::{DeviceId, DeviceResource};
use crate::backend::GpuShader;

/// A linked vertex and fragment program pair.
pub struct ShaderRecord {
    device: DeviceId,
    pub(crate) gpu: GpuShader,
    description: ShaderDescription,
}

impl ShaderRecord {
    pub(crate) fn new(device: DeviceId, gpu: GpuShader, description: ShaderDescription) -> Self {
        Self {
            device,
            gpu,
            description,
        }
    }

    /// The description the shader was created from, without its bytecode.
    pub fn description(&self) -> &ShaderDescription {
        &self.description
    }

    pub fn sampler_count(&self, stage: ShaderStage) -> usize {
        self.description.stage(stage).sampler_count as usize
    }

    pub fn has_uniforms(&self, stage: ShaderStage) -> bool {
        !self.description.stage(stage).uniforms.is_empty()
    }
}

impl DeviceResource for ShaderRecord {
    fn device(&self) -> DeviceId {
        self.device
    }
}

impl std::fmt::Debug for ShaderRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderRecord")
            .field("device", &self.device)
            .field("gpu", &self.gpu)
            .finish_non_exhaustive()
    }
}
