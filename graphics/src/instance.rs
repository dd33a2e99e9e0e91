//! Device creation parameters.
//!
//! [`InstanceParameters`] selects the backend and sizes the renderer's
//! per-frame resources. Every field has a working default, so
//! `InstanceParameters::new()` is enough for most applications:
//!
//! ```ignore
//! let params = InstanceParameters::new()
//!     .with_backend(BackendType::Wgpu)
//!     .with_wgpu_backend(WgpuBackendType::Vulkan)
//!     .with_validation(true);
//! let mut renderer = Renderer::new();
//! renderer.create_device_with(params)?;
//! ```

use crate::backend::DummyConfig;

/// Which GPU backend the renderer drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Prefer wgpu, fall back to the dummy backend if no adapter is available.
    #[default]
    Auto,
    /// In-memory backend that records calls instead of touching a GPU.
    Dummy,
    /// wgpu backend (requires the `wgpu-backend` feature).
    Wgpu,
}

/// Native API wgpu should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WgpuBackendType {
    #[default]
    Auto,
    Vulkan,
    Metal,
    Dx12,
    Gl,
    BrowserWebGpu,
}

impl WgpuBackendType {
    #[cfg(feature = "wgpu-backend")]
    pub fn to_wgpu_backends(self) -> wgpu::Backends {
        match self {
            Self::Auto => wgpu::Backends::all(),
            Self::Vulkan => wgpu::Backends::VULKAN,
            Self::Metal => wgpu::Backends::METAL,
            Self::Dx12 => wgpu::Backends::DX12,
            Self::Gl => wgpu::Backends::GL,
            Self::BrowserWebGpu => wgpu::Backends::BROWSER_WEBGPU,
        }
    }
}

/// Driver reported by the active device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicsDriver {
    None,
    Dummy,
    Vulkan,
    Metal,
    D3D12,
    OpenGl,
    WebGpu,
}

impl std::fmt::Display for GraphicsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::Dummy => "Dummy",
            Self::Vulkan => "Vulkan",
            Self::Metal => "Metal",
            Self::D3D12 => "D3D12",
            Self::OpenGl => "OpenGL",
            Self::WebGpu => "WebGPU",
        };
        f.write_str(name)
    }
}

/// Swapchain presentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentMode {
    /// Wait for vertical blank, queueing frames.
    Fifo,
    /// Wait for vertical blank, replacing the queued frame.
    Mailbox,
    /// Present immediately, may tear.
    Immediate,
}

/// Parameters for creating a renderer device.
#[derive(Debug, Clone)]
pub struct InstanceParameters {
    pub backend: BackendType,
    pub wgpu_backend: WgpuBackendType,
    /// Enable API validation layers.
    pub validation: bool,
    /// Enable debug labels and markers.
    pub debug: bool,
    /// Number of frames the CPU may run ahead of the GPU.
    pub frames_in_flight: usize,
    /// Capacity of each upload ring in bytes.
    pub upload_buffer_size: u64,
    /// Ring wraps allowed per frame before an upload forces a GPU stall.
    pub max_upload_cycles: u32,
    /// Size of each uniform arena chunk in bytes (wgpu backend).
    pub uniform_chunk_size: u64,
    /// Behavior of the dummy backend.
    pub dummy: DummyConfig,
}

impl Default for InstanceParameters {
    fn default() -> Self {
        Self {
            backend: BackendType::Auto,
            wgpu_backend: WgpuBackendType::Auto,
            validation: cfg!(debug_assertions),
            debug: cfg!(debug_assertions),
            frames_in_flight: Self::DEFAULT_FRAMES_IN_FLIGHT,
            upload_buffer_size: Self::DEFAULT_UPLOAD_BUFFER_SIZE,
            max_upload_cycles: Self::DEFAULT_MAX_UPLOAD_CYCLES,
            uniform_chunk_size: Self::DEFAULT_UNIFORM_CHUNK_SIZE,
            dummy: DummyConfig::default(),
        }
    }
}

impl InstanceParameters {
    pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 3;
    pub const DEFAULT_UPLOAD_BUFFER_SIZE: u64 = 16 * 1024 * 1024;
    pub const DEFAULT_MAX_UPLOAD_CYCLES: u32 = 4;
    pub const DEFAULT_UNIFORM_CHUNK_SIZE: u64 = 1024 * 1024;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_wgpu_backend(mut self, wgpu_backend: WgpuBackendType) -> Self {
        self.wgpu_backend = wgpu_backend;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }

    pub fn with_upload_buffer_size(mut self, size: u64) -> Self {
        self.upload_buffer_size = size;
        self
    }

    pub fn with_max_upload_cycles(mut self, cycles: u32) -> Self {
        self.max_upload_cycles = cycles;
        self
    }

    pub fn with_uniform_chunk_size(mut self, size: u64) -> Self {
        self.uniform_chunk_size = size;
        self
    }

    pub fn with_dummy_config(mut self, dummy: DummyConfig) -> Self {
        self.dummy = dummy;
        self
    }
}
