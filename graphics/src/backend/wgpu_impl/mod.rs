//! wgpu GPU backend implementation.
//!
//! This backend uses wgpu for cross-platform GPU access, supporting
//! Vulkan, Metal, DX12, OpenGL and WebGPU.
//!
//! Shaders are WGSL. Each shader's resources are laid out in four bind
//! groups: vertex textures/samplers (0), vertex uniforms (1), fragment
//! textures/samplers (2) and fragment uniforms (3). Within a texture group
//! the `n` textures occupy bindings `0..n` and their samplers `n..2n`.
//! Uniform blocks are bound at binding 0 of their group with a dynamic
//! offset into the command buffer's uniform arena.

pub(crate) mod conversion;
mod commands;
mod resources;
mod surface;
mod transfer;

pub use commands::WgpuCommandBuffer;
pub use resources::{WgpuPipeline, WgpuShader};
pub use transfer::WgpuTransferBuffer;

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{GpuCommandBuffer, GpuFence, TextureUploadLayout};
use crate::error::GraphicsError;
use crate::instance::{GraphicsDriver, InstanceParameters};
use crate::types::{TextureFormat, TextureUsage};

use conversion::{convert_texture_format, convert_texture_usage};

/// wgpu-based GPU backend.
pub struct WgpuBackend {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    driver: GraphicsDriver,
    surface: Mutex<Option<surface::SurfaceState>>,
    uniforms: Mutex<transfer::UniformArena>,
    /// Incremented on every submit; transfer pools use it to tell which
    /// backings are referenced by unsubmitted copies.
    submit_epoch: AtomicU64,
    empty_layout: wgpu::BindGroupLayout,
    empty_group: wgpu::BindGroup,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter.get_info().name)
            .field("driver", &self.driver)
            .finish()
    }
}

impl WgpuBackend {
    /// Create a new wgpu backend with custom parameters.
    pub fn with_params(params: &InstanceParameters) -> Result<Self, GraphicsError> {
        let backends = params.wgpu_backend.to_wgpu_backends();

        let mut flags = wgpu::InstanceFlags::default();
        if params.validation {
            flags |= wgpu::InstanceFlags::VALIDATION;
        }
        if params.debug {
            flags |= wgpu::InstanceFlags::DEBUG;
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            flags,
            backend_options: wgpu::BackendOptions::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| GraphicsError::CreationFailed(format!("No compatible GPU adapter: {e}")))?;

        let info = adapter.get_info();
        log::info!("wgpu adapter: {} ({:?})", info.name, info.backend);

        // Depth32FloatStencil8 is the fallback when D24S8 is missing; ask for it when available.
        let required_features =
            adapter.features() & wgpu::Features::DEPTH32FLOAT_STENCIL8;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Ember Device"),
            required_features,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| GraphicsError::CreationFailed(format!("Device creation failed: {e}")))?;

        let driver = match info.backend {
            wgpu::Backend::Vulkan => GraphicsDriver::Vulkan,
            wgpu::Backend::Metal => GraphicsDriver::Metal,
            wgpu::Backend::Dx12 => GraphicsDriver::D3D12,
            wgpu::Backend::Gl => GraphicsDriver::OpenGl,
            wgpu::Backend::BrowserWebGpu => GraphicsDriver::WebGpu,
            _ => GraphicsDriver::None,
        };

        let empty_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("empty layout"),
            entries: &[],
        });
        let empty_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("empty group"),
            layout: &empty_layout,
            entries: &[],
        });

        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as u64;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            driver,
            surface: Mutex::new(None),
            uniforms: Mutex::new(transfer::UniformArena::new(
                params.uniform_chunk_size,
                uniform_alignment,
            )),
            submit_epoch: AtomicU64::new(0),
            empty_layout,
            empty_group,
        })
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get the wgpu queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    pub fn driver(&self) -> GraphicsDriver {
        self.driver
    }

    pub fn supports_texture_format(&self, format: TextureFormat, usage: TextureUsage) -> bool {
        let format = convert_texture_format(format);
        if !self.device.features().contains(format.required_features()) {
            return false;
        }
        self.adapter
            .get_texture_format_features(format)
            .allowed_usages
            .contains(convert_texture_usage(usage))
    }

    pub fn texture_upload_layout(
        &self,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> TextureUploadLayout {
        let row = width * format.block_size();
        let bytes_per_row = row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        TextureUploadLayout {
            bytes_per_row,
            size: bytes_per_row as u64 * height as u64,
        }
    }

    pub fn texture_copy_alignment(&self, format: TextureFormat) -> u64 {
        (format.block_size() as u64).max(wgpu::COPY_BUFFER_ALIGNMENT)
    }

    pub fn buffer_copy_alignment(&self) -> u64 {
        wgpu::COPY_BUFFER_ALIGNMENT
    }

    /// Run a native create inside validation and out-of-memory error scopes.
    ///
    /// Errors caught by the scopes come back as [`GraphicsError::CreationFailed`]
    /// carrying wgpu's diagnostic instead of reaching the device's uncaptured
    /// error handler.
    pub(super) fn scoped<T>(
        &self,
        what: &str,
        create: impl FnOnce() -> T,
    ) -> Result<T, GraphicsError> {
        let out_of_memory = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let validation = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create();
        let validation = pollster::block_on(validation.pop());
        let out_of_memory = pollster::block_on(out_of_memory.pop());
        match validation.or(out_of_memory) {
            Some(error) => {
                log::error!("wgpu rejected {what}: {error}");
                Err(GraphicsError::CreationFailed(format!("{what}: {error}")))
            }
            None => Ok(value),
        }
    }

    fn current_epoch(&self) -> u64 {
        self.submit_epoch.load(Ordering::Acquire)
    }

    /// Submit a command buffer; the returned fence signals on completion.
    pub fn submit(&self, cmd: GpuCommandBuffer) -> Result<GpuFence, GraphicsError> {
        let GpuCommandBuffer::Wgpu(cmd) = cmd else {
            return Err(GraphicsError::Internal(
                "submit called with non-Wgpu command buffer".into(),
            ));
        };
        let (encoder, chunks) = (*cmd).finish()?;
        let index = self.queue.submit(std::iter::once(encoder.finish()));
        self.submit_epoch.fetch_add(1, Ordering::AcqRel);
        self.uniforms.lock().recycle(chunks);
        Ok(GpuFence::Wgpu(index))
    }

    /// Block until a fence signals. There is no timeout.
    pub fn wait_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        let GpuFence::Wgpu(index) = fence else {
            return Err(GraphicsError::Internal(
                "wait_fence called with non-Wgpu fence".into(),
            ));
        };
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(index.clone()),
                timeout: None,
            })
            .map(|_| ())
            .map_err(|e| GraphicsError::Internal(format!("Fence wait failed: {e}")))
    }

    pub fn release_fence(&self, _fence: GpuFence) {
        // Submission indices hold no GPU memory.
    }

    pub fn wait_idle(&self) -> Result<(), GraphicsError> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| GraphicsError::Internal(format!("Device idle wait failed: {e}")))
    }
}
