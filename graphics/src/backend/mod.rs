//! GPU backend abstraction layer.
//!
//! The renderer talks to exactly one backend through [`GpuBackend`], an enum
//! that dispatches each call to the concrete implementation.
//!
//! # Available Backends
//!
//! - `dummy` (always available): in-memory backend that simulates resource
//!   contents and records every call, used by tests and headless tools
//! - `wgpu-backend` (default feature): cross-platform backend using wgpu
//!
//! # Handles
//!
//! Backend objects are returned as enums with one variant per backend. A
//! handle created by one backend is never valid on another; passing one
//! across yields [`GraphicsError::Internal`].

pub mod dummy;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_impl;

pub use dummy::{DummyBackend, DummyCall, DummyConfig, DummyObjectCounts};

#[cfg(feature = "wgpu-backend")]
use std::sync::Arc;

use ember_core::{IndexFormat, ShaderDescription, ShaderStage};

use crate::error::GraphicsError;
use crate::instance::{BackendType, GraphicsDriver, InstanceParameters, PresentMode};
use crate::swapchain::SurfaceTarget;
use crate::types::{
    BufferDescriptor, RenderPassDescriptor, RenderPipelineDescriptor, SamplerDescriptor,
    ScissorRect, TextureDescriptor, TextureFormat, TextureUsage, Viewport,
};

#[cfg(feature = "wgpu-backend")]
use wgpu_impl::{WgpuBackend, WgpuCommandBuffer, WgpuPipeline, WgpuShader, WgpuTransferBuffer};

/// Handle to a GPU texture resource.
#[derive(Clone)]
pub enum GpuTexture {
    /// Dummy backend texture
    Dummy { id: u64 },
    /// wgpu backend texture
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
}

impl std::fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id } => write!(f, "GpuTexture::Dummy({id})"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu { texture, .. } => f
                .debug_struct("GpuTexture::Wgpu")
                .field("size", &texture.size())
                .field("format", &texture.format())
                .finish_non_exhaustive(),
        }
    }
}

/// Handle to a GPU buffer resource.
#[derive(Clone)]
pub enum GpuBuffer {
    /// Dummy backend buffer
    Dummy { id: u64 },
    /// wgpu backend buffer
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu::Buffer),
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id } => write!(f, "GpuBuffer::Dummy({id})"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(buffer) => f
                .debug_tuple("GpuBuffer::Wgpu")
                .field(&buffer.size())
                .finish(),
        }
    }
}

/// Host-visible staging memory that copy passes read from.
#[derive(Clone)]
pub enum GpuTransferBuffer {
    /// Dummy backend transfer buffer
    Dummy { id: u64 },
    /// wgpu backend transfer buffer
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<WgpuTransferBuffer>),
}

impl std::fmt::Debug for GpuTransferBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id } => write!(f, "GpuTransferBuffer::Dummy({id})"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(_) => write!(f, "GpuTransferBuffer::Wgpu"),
        }
    }
}

/// Compiled vertex and fragment programs.
#[derive(Clone)]
pub enum GpuShader {
    /// Dummy backend shader
    Dummy { id: u64 },
    /// wgpu backend shader
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<WgpuShader>),
}

impl std::fmt::Debug for GpuShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id } => write!(f, "GpuShader::Dummy({id})"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(_) => write!(f, "GpuShader::Wgpu"),
        }
    }
}

/// Handle to a GPU sampler resource.
#[derive(Clone)]
pub enum GpuSampler {
    /// Dummy backend sampler
    Dummy { id: u64 },
    /// wgpu backend sampler
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu::Sampler),
}

impl std::fmt::Debug for GpuSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id } => write!(f, "GpuSampler::Dummy({id})"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(sampler) => f.debug_tuple("GpuSampler::Wgpu").field(sampler).finish(),
        }
    }
}

/// A compiled graphics pipeline.
#[derive(Clone)]
pub enum GpuPipeline {
    /// Dummy backend pipeline
    Dummy { id: u64 },
    /// wgpu backend pipeline
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<WgpuPipeline>),
}

impl std::fmt::Debug for GpuPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id } => write!(f, "GpuPipeline::Dummy({id})"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(_) => write!(f, "GpuPipeline::Wgpu"),
        }
    }
}

/// Signals when a submitted command buffer has finished executing.
#[derive(Clone)]
pub enum GpuFence {
    /// Dummy backend fence
    Dummy { id: u64 },
    /// wgpu backend fence (the submission index of the command buffer)
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu::SubmissionIndex),
}

impl std::fmt::Debug for GpuFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id } => write!(f, "GpuFence::Dummy({id})"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(index) => f.debug_tuple("GpuFence::Wgpu").field(index).finish(),
        }
    }
}

/// A command buffer being recorded.
pub enum GpuCommandBuffer {
    /// Dummy backend command buffer
    Dummy { id: u64 },
    /// wgpu backend command buffer
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Box<WgpuCommandBuffer>),
}

impl std::fmt::Debug for GpuCommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id } => write!(f, "GpuCommandBuffer::Dummy({id})"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(_) => write!(f, "GpuCommandBuffer::Wgpu"),
        }
    }
}

/// Staging layout of a texture upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUploadLayout {
    /// Bytes between the start of two rows in the transfer buffer.
    pub bytes_per_row: u32,
    /// Total bytes the upload occupies in the transfer buffer.
    pub size: u64,
}

/// The GPU backend in use.
#[derive(Debug)]
pub enum GpuBackend {
    Dummy(DummyBackend),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(WgpuBackend),
}

macro_rules! dispatch {
    ($self:ident, $backend:ident => $body:expr) => {
        match $self {
            GpuBackend::Dummy($backend) => $body,
            #[cfg(feature = "wgpu-backend")]
            GpuBackend::Wgpu($backend) => $body,
        }
    };
}

impl GpuBackend {
    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        dispatch!(self, b => b.name())
    }

    /// The native driver behind this backend.
    pub fn driver(&self) -> GraphicsDriver {
        dispatch!(self, b => b.driver())
    }

    /// The dummy backend, if that is what is running.
    pub fn as_dummy(&self) -> Option<&DummyBackend> {
        match self {
            Self::Dummy(b) => Some(b),
            #[cfg(feature = "wgpu-backend")]
            _ => None,
        }
    }

    /// Whether textures of `format` can be created with `usage`.
    pub fn supports_texture_format(&self, format: TextureFormat, usage: TextureUsage) -> bool {
        dispatch!(self, b => b.supports_texture_format(format, usage))
    }

    // --- surface -----------------------------------------------------------

    /// Create the swapchain for `target`.
    pub fn claim_surface(&self, target: &SurfaceTarget) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.claim_surface(target))
    }

    /// Tear down the swapchain. No-op if none is claimed.
    pub fn release_surface(&self) {
        dispatch!(self, b => b.release_surface())
    }

    /// Format of swapchain images, or `None` without a surface.
    pub fn swapchain_format(&self) -> Option<TextureFormat> {
        dispatch!(self, b => b.swapchain_format())
    }

    pub fn supports_present_mode(&self, mode: PresentMode) -> bool {
        dispatch!(self, b => b.supports_present_mode(mode))
    }

    /// Reconfigure the swapchain with a new present mode.
    pub fn set_present_mode(&self, mode: PresentMode) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.set_present_mode(mode))
    }

    pub fn resize_surface(&self, width: u32, height: u32) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.resize_surface(width, height))
    }

    /// Acquire the next swapchain image.
    ///
    /// Returns its size, or `None` if no image is available this frame
    /// (e.g. the window is minimized or the swapchain is being recreated).
    pub fn acquire_swapchain_texture(&self) -> Result<Option<(u32, u32)>, GraphicsError> {
        dispatch!(self, b => b.acquire_swapchain_texture())
    }

    /// Queue the held swapchain image for presentation. No-op without one.
    pub fn present(&self) {
        dispatch!(self, b => b.present())
    }

    // --- resources ---------------------------------------------------------

    pub fn create_texture(&self, desc: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        dispatch!(self, b => b.create_texture(desc))
    }

    pub fn release_texture(&self, texture: GpuTexture) {
        dispatch!(self, b => b.release_texture(texture))
    }

    pub fn create_buffer(&self, desc: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        dispatch!(self, b => b.create_buffer(desc))
    }

    pub fn release_buffer(&self, buffer: GpuBuffer) {
        dispatch!(self, b => b.release_buffer(buffer))
    }

    pub fn create_transfer_buffer(&self, size: u64) -> Result<GpuTransferBuffer, GraphicsError> {
        dispatch!(self, b => b.create_transfer_buffer(size))
    }

    pub fn release_transfer_buffer(&self, buffer: GpuTransferBuffer) {
        dispatch!(self, b => b.release_transfer_buffer(buffer))
    }

    /// Write `data` into a transfer buffer.
    ///
    /// With `cycle` set, the backend may hand out fresh backing memory if the
    /// current memory is still referenced by recorded copies.
    pub fn write_transfer_buffer(
        &self,
        buffer: &GpuTransferBuffer,
        offset: u64,
        data: &[u8],
        cycle: bool,
    ) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.write_transfer_buffer(buffer, offset, data, cycle))
    }

    pub fn create_shader(&self, desc: &ShaderDescription) -> Result<GpuShader, GraphicsError> {
        dispatch!(self, b => b.create_shader(desc))
    }

    pub fn release_shader(&self, shader: GpuShader) {
        dispatch!(self, b => b.release_shader(shader))
    }

    pub fn create_sampler(&self, desc: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError> {
        dispatch!(self, b => b.create_sampler(desc))
    }

    pub fn release_sampler(&self, sampler: GpuSampler) {
        dispatch!(self, b => b.release_sampler(sampler))
    }

    pub fn create_pipeline(
        &self,
        desc: &RenderPipelineDescriptor<'_>,
    ) -> Result<GpuPipeline, GraphicsError> {
        dispatch!(self, b => b.create_pipeline(desc))
    }

    pub fn release_pipeline(&self, pipeline: GpuPipeline) {
        dispatch!(self, b => b.release_pipeline(pipeline))
    }

    /// How a `width` x `height` upload of `format` is laid out in staging memory.
    pub fn texture_upload_layout(
        &self,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> TextureUploadLayout {
        dispatch!(self, b => b.texture_upload_layout(format, width, height))
    }

    /// Required alignment of a texture upload's source offset.
    pub fn texture_copy_alignment(&self, format: TextureFormat) -> u64 {
        dispatch!(self, b => b.texture_copy_alignment(format))
    }

    /// Required alignment of buffer copy offsets and sizes.
    pub fn buffer_copy_alignment(&self) -> u64 {
        dispatch!(self, b => b.buffer_copy_alignment())
    }

    // --- recording ---------------------------------------------------------

    pub fn acquire_command_buffer(&self, label: &str) -> Result<GpuCommandBuffer, GraphicsError> {
        dispatch!(self, b => b.acquire_command_buffer(label))
    }

    pub fn begin_copy_pass(&self, cmd: &mut GpuCommandBuffer) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.begin_copy_pass(cmd))
    }

    /// Copy a full texture image out of a transfer buffer.
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
        dispatch!(self, b => b.upload_to_texture(cmd, src, src_offset, bytes_per_row, dst, width, height))
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
        dispatch!(self, b => b.upload_to_buffer(cmd, src, src_offset, dst, dst_offset, size))
    }

    pub fn end_copy_pass(&self, cmd: &mut GpuCommandBuffer) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.end_copy_pass(cmd))
    }

    /// Begin a render pass.
    ///
    /// Returns `false` when the pass targets the swapchain and no image is
    /// held this frame; nothing is recorded in that case.
    pub fn begin_render_pass(
        &self,
        cmd: &mut GpuCommandBuffer,
        desc: &RenderPassDescriptor<'_>,
    ) -> Result<bool, GraphicsError> {
        dispatch!(self, b => b.begin_render_pass(cmd, desc))
    }

    pub fn end_render_pass(&self, cmd: &mut GpuCommandBuffer) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.end_render_pass(cmd))
    }

    pub fn set_viewport(
        &self,
        cmd: &mut GpuCommandBuffer,
        viewport: &Viewport,
    ) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.set_viewport(cmd, viewport))
    }

    pub fn set_scissor(
        &self,
        cmd: &mut GpuCommandBuffer,
        scissor: &ScissorRect,
    ) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.set_scissor(cmd, scissor))
    }

    pub fn bind_pipeline(
        &self,
        cmd: &mut GpuCommandBuffer,
        pipeline: &GpuPipeline,
    ) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.bind_pipeline(cmd, pipeline))
    }

    pub fn bind_vertex_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        slot: u32,
        buffer: &GpuBuffer,
    ) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.bind_vertex_buffer(cmd, slot, buffer))
    }

    pub fn bind_index_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        buffer: &GpuBuffer,
        format: IndexFormat,
    ) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.bind_index_buffer(cmd, buffer, format))
    }

    /// Bind texture/sampler pairs to consecutive slots of a shader stage.
    pub fn bind_samplers(
        &self,
        cmd: &mut GpuCommandBuffer,
        stage: ShaderStage,
        bindings: &[(&GpuTexture, &GpuSampler)],
    ) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.bind_samplers(cmd, stage, bindings))
    }

    /// Push a stage's uniform block for the following draws.
    pub fn push_uniforms(
        &self,
        cmd: &mut GpuCommandBuffer,
        stage: ShaderStage,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.push_uniforms(cmd, stage, data))
    }

    pub fn draw_indexed(
        &self,
        cmd: &mut GpuCommandBuffer,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.draw_indexed(cmd, index_count, first_index, vertex_offset))
    }

    // --- submission --------------------------------------------------------

    /// Submit a command buffer; the returned fence signals on completion.
    pub fn submit(&self, cmd: GpuCommandBuffer) -> Result<GpuFence, GraphicsError> {
        dispatch!(self, b => b.submit(cmd))
    }

    /// Block until `fence` signals.
    pub fn wait_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.wait_fence(fence))
    }

    pub fn release_fence(&self, fence: GpuFence) {
        dispatch!(self, b => b.release_fence(fence))
    }

    /// Block until all submitted work has completed.
    pub fn wait_idle(&self) -> Result<(), GraphicsError> {
        dispatch!(self, b => b.wait_idle())
    }

    /// Read back the full contents of a texture, tightly packed.
    ///
    /// All work touching the texture must have been submitted and waited on.
    pub fn read_texture(
        &self,
        texture: &GpuTexture,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, GraphicsError> {
        dispatch!(self, b => b.read_texture(texture, format, width, height))
    }
}

/// Create the backend selected by `params`.
///
/// [`BackendType::Auto`] tries wgpu first and falls back to the dummy backend
/// when no adapter can be opened.
pub fn create_backend(params: &InstanceParameters) -> Result<GpuBackend, GraphicsError> {
    match params.backend {
        BackendType::Dummy => {
            log::info!("Using dummy backend");
            Ok(GpuBackend::Dummy(DummyBackend::with_config(params.dummy.clone())))
        }
        BackendType::Wgpu => {
            #[cfg(feature = "wgpu-backend")]
            {
                let backend = WgpuBackend::with_params(params)?;
                log::info!("Using wgpu backend");
                Ok(GpuBackend::Wgpu(backend))
            }
            #[cfg(not(feature = "wgpu-backend"))]
            {
                Err(GraphicsError::CreationFailed(
                    "wgpu backend not enabled (compile with the `wgpu-backend` feature)".into(),
                ))
            }
        }
        BackendType::Auto => {
            #[cfg(feature = "wgpu-backend")]
            {
                match WgpuBackend::with_params(params) {
                    Ok(backend) => {
                        log::info!("Using wgpu backend");
                        return Ok(GpuBackend::Wgpu(backend));
                    }
                    Err(e) => {
                        log::warn!("Failed to create wgpu backend: {}", e);
                    }
                }
            }

            log::info!("Using dummy backend");
            Ok(GpuBackend::Dummy(DummyBackend::with_config(params.dummy.clone())))
        }
    }
}

/// Check if a real GPU backend is compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "wgpu-backend")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_dummy_backend() {
        let params = InstanceParameters::new().with_backend(BackendType::Dummy);
        let backend = create_backend(&params).unwrap();
        assert_eq!(backend.driver(), GraphicsDriver::Dummy);
        assert!(backend.as_dummy().is_some());
    }

    #[test]
    fn test_handle_debug() {
        let texture = GpuTexture::Dummy { id: 7 };
        assert_eq!(format!("{texture:?}"), "GpuTexture::Dummy(7)");
    }
}
