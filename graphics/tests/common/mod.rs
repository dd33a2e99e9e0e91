//! Common utilities for renderer integration tests.
//!
//! Every test runs against a headless swapchain so no window is needed. The
//! dummy backend is always available and records each native call for
//! inspection; the wgpu backend is skipped when no adapter can be opened.

#![allow(dead_code)]

use ember_core::{
    IndexFormat, Material, MeshHandle, ShaderDescription, ShaderHandle, ShaderStageInfo,
    ShaderUniform, TextureFormat, TextureHandle, UniformType, VertexElement, VertexFormat,
    VertexType,
};
use ember_graphics::{
    BackendType, DummyBackend, DummyCall, DummyConfig, InstanceParameters, Renderer,
    SurfaceTarget, WgpuBackendType,
};

/// Size of the headless swapchain.
pub const SURFACE_WIDTH: u32 = 64;
pub const SURFACE_HEIGHT: u32 = 48;

/// Position-only shader: a solid color from a fragment uniform, optionally
/// modulated by fragment samplers.
pub const SOLID_WGSL: &str = r#"
struct FragmentUniforms {
    color: vec4<f32>,
}

@group(3) @binding(0) var<uniform> fragment_uniforms: FragmentUniforms;

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return fragment_uniforms.color;
}
"#;

/// Two triangles covering clip space.
pub const FULLSCREEN_QUAD: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Available GPU backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy backend (no actual GPU operations).
    Dummy,
    /// WebGPU backend (via wgpu).
    WebGpu,
}

impl Backend {
    /// Check if this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            Backend::WebGpu => ember_graphics::has_gpu_backend(),
        }
    }

    pub fn to_instance_parameters(self) -> InstanceParameters {
        match self {
            Backend::Dummy => InstanceParameters::new().with_backend(BackendType::Dummy),
            Backend::WebGpu => InstanceParameters::new()
                .with_backend(BackendType::Wgpu)
                .with_wgpu_backend(WgpuBackendType::Auto)
                .with_validation(false),
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// A started renderer on a headless surface.
pub struct TestContext {
    pub backend: Backend,
    pub renderer: Renderer,
}

impl TestContext {
    /// Create a started renderer for `backend` with default parameters.
    ///
    /// Returns `None` if the backend is not available.
    pub fn new(backend: Backend) -> Option<Self> {
        Self::with_parameters(backend, |params| params)
    }

    /// Create a started renderer, letting `configure` adjust the parameters.
    pub fn with_parameters(
        backend: Backend,
        configure: impl FnOnce(InstanceParameters) -> InstanceParameters,
    ) -> Option<Self> {
        if !backend.is_available() {
            return None;
        }
        let _ = env_logger::builder().is_test(true).try_init();

        let mut renderer = Renderer::new();
        if let Err(e) = renderer.create_device_with(configure(backend.to_instance_parameters())) {
            eprintln!("Backend {backend:?} failed to open a device: {e}");
            return None;
        }
        renderer
            .startup(&SurfaceTarget::headless(SURFACE_WIDTH, SURFACE_HEIGHT))
            .expect("Failed to start renderer");
        Some(Self { backend, renderer })
    }

    /// Dummy-backend context with a custom dummy configuration.
    pub fn dummy_with(config: DummyConfig) -> Self {
        Self::with_parameters(Backend::Dummy, |params| params.with_dummy_config(config))
            .expect("Dummy backend is always available")
    }

    /// The dummy backend behind this context.
    pub fn dummy(&self) -> &DummyBackend {
        self.renderer
            .backend()
            .and_then(|b| b.as_dummy())
            .expect("Not a dummy backend")
    }

    pub fn calls(&self) -> Vec<DummyCall> {
        self.dummy().calls()
    }

    /// Count recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&DummyCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    pub fn clear_calls(&self) {
        self.dummy().clear_calls();
    }

    /// Dummy id of the fallback texture created at startup.
    pub fn fallback_texture_id(&self) -> u64 {
        self.calls()
            .iter()
            .find_map(|call| match call {
                DummyCall::CreateTexture { id, label, .. }
                    if label.as_deref() == Some("fallback") =>
                {
                    Some(*id)
                }
                _ => None,
            })
            .expect("Fallback texture was not created")
    }

    pub fn create_texture(&mut self, width: u32, height: u32, format: TextureFormat) -> TextureHandle {
        self.renderer
            .create_texture(width, height, format, false)
            .expect("Failed to create texture")
    }

    pub fn create_target(&mut self, width: u32, height: u32, format: TextureFormat) -> TextureHandle {
        self.renderer
            .create_texture(width, height, format, true)
            .expect("Failed to create render target")
    }

    /// Solid color shader with `samplers` fragment samplers.
    pub fn create_solid_shader(&mut self, samplers: u32) -> (ShaderHandle, ShaderDescription) {
        let description = solid_shader_description(samplers);
        let shader = self
            .renderer
            .create_shader(&description)
            .expect("Failed to create shader");
        (shader, description)
    }

    /// Material for a fresh solid color shader.
    pub fn create_solid_material(&mut self, samplers: u32) -> Material {
        let (shader, description) = self.create_solid_shader(samplers);
        Material::with_shader(shader, &description)
    }

    /// Mesh with a full-screen quad.
    pub fn create_quad(&mut self) -> MeshHandle {
        let mesh = self.renderer.create_mesh().expect("Failed to create mesh");
        self.renderer
            .set_mesh_vertex_data(
                mesh,
                bytemuck::cast_slice(&FULLSCREEN_QUAD),
                0,
                &position_format(),
            )
            .expect("Failed to upload vertices");
        self.renderer
            .set_mesh_index_data(
                mesh,
                bytemuck::cast_slice(&QUAD_INDICES),
                0,
                IndexFormat::Sixteen,
            )
            .expect("Failed to upload indices");
        mesh
    }
}

pub fn position_format() -> VertexFormat {
    VertexFormat::new([VertexElement::new(0, VertexType::Float2)])
}

pub fn solid_shader_description(samplers: u32) -> ShaderDescription {
    ShaderDescription::new(
        ShaderStageInfo::new(SOLID_WGSL.as_bytes().to_vec(), "vs_main"),
        ShaderStageInfo::new(SOLID_WGSL.as_bytes().to_vec(), "fs_main")
            .with_sampler_count(samplers)
            .with_uniform(ShaderUniform::new("color", UniformType::Float4)),
    )
}

/// A `width` x `height` RGBA pattern where every pixel is distinct.
pub fn generate_test_pattern(width: u32, height: u32) -> Vec<u8> {
    (0..width * height)
        .flat_map(|i| {
            let x = (i % width) as u8;
            let y = (i / width) as u8;
            [x.wrapping_mul(16), y.wrapping_mul(16), (i as u8) ^ 0x5a, 255]
        })
        .collect()
}

/// Index of the first call matching `predicate`.
pub fn position_of(calls: &[DummyCall], predicate: impl Fn(&DummyCall) -> bool) -> usize {
    calls
        .iter()
        .position(predicate)
        .expect("Expected call was not recorded")
}
