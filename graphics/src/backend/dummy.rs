//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't touch a GPU. It keeps the contents of textures,
//! buffers and transfer buffers in host memory, executes recorded copies
//! when their command buffer is submitted, and appends every call to a log
//! that tests can inspect through [`DummyBackend::calls`].
//!
//! Transfer buffers follow the same cycling rules as the wgpu backend: a
//! cycled write lands in backing memory not referenced by anything recorded
//! since the last submit, so an upload ring that wraps without cycling shows
//! up as corrupted texture or buffer contents.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use ember_core::{Color, IndexFormat, ShaderDescription, ShaderStage};
use parking_lot::Mutex;

use super::{
    GpuBuffer, GpuCommandBuffer, GpuFence, GpuPipeline, GpuSampler, GpuShader, GpuTexture,
    GpuTransferBuffer, TextureUploadLayout,
};
use crate::error::GraphicsError;
use crate::instance::{GraphicsDriver, PresentMode};
use crate::swapchain::SurfaceTarget;
use crate::types::{
    BufferDescriptor, ColorTarget, LoadOp, RenderPassDescriptor, RenderPipelineDescriptor,
    SamplerDescriptor, ScissorRect, TextureDescriptor, TextureFormat, TextureUsage, Viewport,
};

/// Swapchain format of the dummy surface.
const SWAPCHAIN_FORMAT: TextureFormat = TextureFormat::Bgra8Unorm;

/// Capabilities the dummy backend reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyConfig {
    /// Report support for [`PresentMode::Mailbox`].
    pub supports_mailbox: bool,
    /// Report support for [`PresentMode::Immediate`].
    pub supports_immediate: bool,
    /// Report support for 24-bit depth with stencil.
    pub supports_depth24_stencil8: bool,
    /// Whether swapchain images can be acquired. Can be toggled later with
    /// [`DummyBackend::set_swapchain_available`].
    pub swapchain_available: bool,
    /// Alignment of buffer copy offsets and sizes, 1 for none.
    pub buffer_copy_alignment: u64,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            supports_mailbox: true,
            supports_immediate: true,
            supports_depth24_stencil8: true,
            swapchain_available: true,
            buffer_copy_alignment: 1,
        }
    }
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum DummyCall {
    ClaimSurface {
        width: u32,
        height: u32,
    },
    ReleaseSurface,
    ResizeSurface {
        width: u32,
        height: u32,
    },
    SetPresentMode(PresentMode),
    AcquireSwapchain {
        acquired: bool,
    },
    Present,
    CreateTexture {
        id: u64,
        label: Option<String>,
        width: u32,
        height: u32,
        format: TextureFormat,
    },
    ReleaseTexture {
        id: u64,
    },
    CreateBuffer {
        id: u64,
        size: u64,
    },
    ReleaseBuffer {
        id: u64,
    },
    CreateTransferBuffer {
        id: u64,
        size: u64,
    },
    ReleaseTransferBuffer {
        id: u64,
    },
    WriteTransferBuffer {
        id: u64,
        offset: u64,
        size: u64,
        cycle: bool,
    },
    CreateShader {
        id: u64,
    },
    ReleaseShader {
        id: u64,
    },
    CreateSampler {
        id: u64,
    },
    ReleaseSampler {
        id: u64,
    },
    CreatePipeline {
        id: u64,
        color_formats: Vec<TextureFormat>,
        depth_format: Option<TextureFormat>,
    },
    ReleasePipeline {
        id: u64,
    },
    BeginCopyPass,
    UploadToTexture {
        texture: u64,
        src_offset: u64,
    },
    UploadToBuffer {
        buffer: u64,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    },
    EndCopyPass,
    BeginRenderPass {
        swapchain: bool,
        color_textures: Vec<u64>,
        depth_texture: Option<u64>,
        clear_color: Option<Color>,
        clear_depth: Option<f32>,
        clear_stencil: Option<u32>,
    },
    EndRenderPass,
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    BindPipeline {
        id: u64,
    },
    BindVertexBuffer {
        slot: u32,
        id: u64,
    },
    BindIndexBuffer {
        id: u64,
        format: IndexFormat,
    },
    BindSamplers {
        stage: ShaderStage,
        textures: Vec<u64>,
        samplers: Vec<u64>,
    },
    PushUniforms {
        stage: ShaderStage,
        data: Vec<u8>,
    },
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    },
    Submit {
        command_buffer: u64,
        fence: u64,
    },
    WaitFence {
        id: u64,
    },
    ReleaseFence {
        id: u64,
    },
    WaitIdle,
}

/// Number of live objects of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DummyObjectCounts {
    pub textures: usize,
    pub buffers: usize,
    pub transfer_buffers: usize,
    pub shaders: usize,
    pub samplers: usize,
    pub pipelines: usize,
    pub fences: usize,
}

struct DummyTexture {
    width: u32,
    height: u32,
    format: TextureFormat,
    data: Vec<u8>,
}

struct DummyTransferBuffer {
    size: u64,
    backings: Vec<Backing>,
    active: usize,
}

struct Backing {
    data: Vec<u8>,
    /// Submit epoch of the last write; equal to the current epoch while
    /// recorded copies may still read it.
    written_epoch: u64,
}

enum PendingCopy {
    Texture {
        src: u64,
        backing: usize,
        src_offset: u64,
        bytes_per_row: u32,
        dst: u64,
    },
    Buffer {
        src: u64,
        backing: usize,
        src_offset: u64,
        dst: u64,
        dst_offset: u64,
        size: u64,
    },
}

#[derive(Default)]
struct CommandState {
    copy_open: bool,
    render_open: bool,
    pipeline_bound: bool,
    copies: Vec<PendingCopy>,
}

struct DummySurface {
    width: u32,
    height: u32,
    held: bool,
}

#[derive(Default)]
struct DummyState {
    next_id: u64,
    epoch: u64,
    textures: HashMap<u64, DummyTexture>,
    buffers: HashMap<u64, Vec<u8>>,
    transfer_buffers: HashMap<u64, DummyTransferBuffer>,
    /// Released transfer buffers kept until no recorded copy reads them.
    retired_transfer_buffers: HashMap<u64, DummyTransferBuffer>,
    shaders: HashSet<u64>,
    samplers: HashSet<u64>,
    pipelines: HashSet<u64>,
    fences: HashSet<u64>,
    commands: HashMap<u64, CommandState>,
    surface: Option<DummySurface>,
    present_mode: Option<PresentMode>,
    pending_failure: Option<String>,
    device_lost: bool,
    calls: Vec<DummyCall>,
}

impl DummyState {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn take_failure(&mut self) -> Result<(), GraphicsError> {
        match self.pending_failure.take() {
            Some(message) => Err(GraphicsError::CreationFailed(message)),
            None => Ok(()),
        }
    }

    fn command(&mut self, cmd: &GpuCommandBuffer) -> Result<&mut CommandState, GraphicsError> {
        let id = dummy_id(cmd)?;
        self.commands
            .get_mut(&id)
            .ok_or_else(|| GraphicsError::Internal(format!("unknown command buffer {id}")))
    }

    fn render_command(
        &mut self,
        cmd: &GpuCommandBuffer,
    ) -> Result<&mut CommandState, GraphicsError> {
        let state = self.command(cmd)?;
        if !state.render_open {
            return Err(GraphicsError::Internal(
                "render command recorded outside a render pass".into(),
            ));
        }
        Ok(state)
    }

    fn backing<'a>(
        live: &'a HashMap<u64, DummyTransferBuffer>,
        retired: &'a HashMap<u64, DummyTransferBuffer>,
        id: u64,
        backing: usize,
    ) -> Result<&'a Backing, GraphicsError> {
        live.get(&id)
            .or_else(|| retired.get(&id))
            .and_then(|tb| tb.backings.get(backing))
            .ok_or_else(|| GraphicsError::Internal(format!("unknown transfer buffer {id}")))
    }

    fn execute_copy(&mut self, copy: PendingCopy) -> Result<(), GraphicsError> {
        match copy {
            PendingCopy::Texture {
                src,
                backing,
                src_offset,
                bytes_per_row,
                dst,
            } => {
                let source = Self::backing(
                    &self.transfer_buffers,
                    &self.retired_transfer_buffers,
                    src,
                    backing,
                )?;
                // A destination released after recording has nothing left to observe.
                let Some(texture) = self.textures.get_mut(&dst) else {
                    return Ok(());
                };
                let row = (texture.width * texture.format.block_size()) as usize;
                for y in 0..texture.height as usize {
                    let from = src_offset as usize + y * bytes_per_row as usize;
                    let to = y * row;
                    texture.data[to..to + row].copy_from_slice(&source.data[from..from + row]);
                }
            }
            PendingCopy::Buffer {
                src,
                backing,
                src_offset,
                dst,
                dst_offset,
                size,
            } => {
                let source = Self::backing(
                    &self.transfer_buffers,
                    &self.retired_transfer_buffers,
                    src,
                    backing,
                )?;
                let Some(buffer) = self.buffers.get_mut(&dst) else {
                    return Ok(());
                };
                let (from, to, len) = (src_offset as usize, dst_offset as usize, size as usize);
                buffer[to..to + len].copy_from_slice(&source.data[from..from + len]);
            }
        }
        Ok(())
    }
}

fn dummy_id(cmd: &GpuCommandBuffer) -> Result<u64, GraphicsError> {
    match cmd {
        GpuCommandBuffer::Dummy { id } => Ok(*id),
        #[cfg(feature = "wgpu-backend")]
        _ => Err(foreign_handle()),
    }
}

#[cfg(feature = "wgpu-backend")]
fn foreign_handle() -> GraphicsError {
    GraphicsError::Internal("handle belongs to another backend".into())
}

macro_rules! dummy_handle {
    ($ty:ident, $value:expr) => {
        match $value {
            $ty::Dummy { id } => Ok::<u64, GraphicsError>(*id),
            #[cfg(feature = "wgpu-backend")]
            _ => Err(foreign_handle()),
        }
    };
}

/// Dummy GPU backend.
pub struct DummyBackend {
    config: DummyConfig,
    swapchain_available: AtomicBool,
    state: Mutex<DummyState>,
}

impl std::fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyBackend {
    /// Create a new dummy backend that supports everything.
    pub fn new() -> Self {
        Self::with_config(DummyConfig::default())
    }

    pub fn with_config(config: DummyConfig) -> Self {
        Self {
            swapchain_available: AtomicBool::new(config.swapchain_available),
            config,
            state: Mutex::new(DummyState::default()),
        }
    }

    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    pub fn driver(&self) -> GraphicsDriver {
        GraphicsDriver::Dummy
    }

    // --- inspection --------------------------------------------------------

    /// All calls recorded since creation or the last [`Self::clear_calls`].
    pub fn calls(&self) -> Vec<DummyCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn live_objects(&self) -> DummyObjectCounts {
        let state = self.state.lock();
        DummyObjectCounts {
            textures: state.textures.len(),
            buffers: state.buffers.len(),
            transfer_buffers: state.transfer_buffers.len(),
            shaders: state.shaders.len(),
            samplers: state.samplers.len(),
            pipelines: state.pipelines.len(),
            fences: state.fences.len(),
        }
    }

    /// Present mode the surface was last configured with.
    pub fn present_mode(&self) -> Option<PresentMode> {
        self.state.lock().present_mode
    }

    /// Contents of a buffer.
    pub fn buffer_contents(&self, buffer: &GpuBuffer) -> Option<Vec<u8>> {
        let id = dummy_handle!(GpuBuffer, buffer).ok()?;
        self.state.lock().buffers.get(&id).cloned()
    }

    /// Number of distinct backing allocations a transfer buffer has grown to.
    pub fn transfer_backings(&self, buffer: &GpuTransferBuffer) -> usize {
        dummy_handle!(GpuTransferBuffer, buffer)
            .ok()
            .and_then(|id| {
                self.state
                    .lock()
                    .transfer_buffers
                    .get(&id)
                    .map(|tb| tb.backings.len())
            })
            .unwrap_or(0)
    }

    // --- knobs -------------------------------------------------------------

    /// Make swapchain acquisition fail (e.g. a minimized window) or succeed.
    pub fn set_swapchain_available(&self, available: bool) {
        self.swapchain_available.store(available, Ordering::Release);
    }

    /// Make the next object creation fail with `message`.
    pub fn fail_next_creation(&self, message: impl Into<String>) {
        self.state.lock().pending_failure = Some(message.into());
    }

    /// Make every later fence wait fail as if the device was lost.
    pub fn lose_device(&self) {
        self.state.lock().device_lost = true;
    }

    // --- capabilities ------------------------------------------------------

    pub fn supports_texture_format(&self, format: TextureFormat, _usage: TextureUsage) -> bool {
        match format {
            TextureFormat::Depth24PlusStencil8 => self.config.supports_depth24_stencil8,
            _ => true,
        }
    }

    pub fn supports_present_mode(&self, mode: PresentMode) -> bool {
        match mode {
            PresentMode::Fifo => true,
            PresentMode::Mailbox => self.config.supports_mailbox,
            PresentMode::Immediate => self.config.supports_immediate,
        }
    }

    // --- surface -----------------------------------------------------------

    pub fn claim_surface(&self, target: &SurfaceTarget) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        if state.surface.is_some() {
            return Err(GraphicsError::CreationFailed(
                "surface already claimed".into(),
            ));
        }
        let (width, height) = target.size();
        state.surface = Some(DummySurface {
            width,
            height,
            held: false,
        });
        state.present_mode = Some(PresentMode::Fifo);
        state.calls.push(DummyCall::ClaimSurface { width, height });
        Ok(())
    }

    pub fn release_surface(&self) {
        let mut state = self.state.lock();
        if state.surface.take().is_some() {
            state.present_mode = None;
            state.calls.push(DummyCall::ReleaseSurface);
        }
    }

    pub fn swapchain_format(&self) -> Option<TextureFormat> {
        self.state.lock().surface.as_ref().map(|_| SWAPCHAIN_FORMAT)
    }

    pub fn set_present_mode(&self, mode: PresentMode) -> Result<(), GraphicsError> {
        if !self.supports_present_mode(mode) {
            return Err(GraphicsError::UnsupportedFormat(format!(
                "present mode {mode:?}"
            )));
        }
        let mut state = self.state.lock();
        if state.surface.is_none() {
            return Err(GraphicsError::DeviceNotReady);
        }
        state.present_mode = Some(mode);
        state.calls.push(DummyCall::SetPresentMode(mode));
        Ok(())
    }

    pub fn resize_surface(&self, width: u32, height: u32) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        let surface = state.surface.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        surface.width = width.max(1);
        surface.height = height.max(1);
        state.calls.push(DummyCall::ResizeSurface { width, height });
        Ok(())
    }

    pub fn acquire_swapchain_texture(&self) -> Result<Option<(u32, u32)>, GraphicsError> {
        let available = self.swapchain_available.load(Ordering::Acquire);
        let mut state = self.state.lock();
        let surface = state.surface.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        let size = (surface.width, surface.height);
        let acquired = available || surface.held;
        surface.held = acquired;
        state.calls.push(DummyCall::AcquireSwapchain { acquired });
        Ok(acquired.then_some(size))
    }

    pub fn present(&self) {
        let mut state = self.state.lock();
        if let Some(surface) = state.surface.as_mut()
            && surface.held
        {
            surface.held = false;
            state.calls.push(DummyCall::Present);
        }
    }

    // --- resources ---------------------------------------------------------

    pub fn create_texture(&self, desc: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{} {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        let mut state = self.state.lock();
        state.take_failure()?;
        if !self.supports_texture_format(desc.format, desc.usage) {
            return Err(GraphicsError::UnsupportedFormat(format!("{:?}", desc.format)));
        }
        let id = state.alloc_id();
        state.textures.insert(
            id,
            DummyTexture {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                data: vec![0; desc.footprint() as usize],
            },
        );
        state.calls.push(DummyCall::CreateTexture {
            id,
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
            format: desc.format,
        });
        Ok(GpuTexture::Dummy { id })
    }

    pub fn release_texture(&self, texture: GpuTexture) {
        if let Ok(id) = dummy_handle!(GpuTexture, &texture) {
            let mut state = self.state.lock();
            state.textures.remove(&id);
            state.calls.push(DummyCall::ReleaseTexture { id });
        }
    }

    pub fn create_buffer(&self, desc: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let mut state = self.state.lock();
        state.take_failure()?;
        let id = state.alloc_id();
        state.buffers.insert(id, vec![0; desc.size as usize]);
        state.calls.push(DummyCall::CreateBuffer {
            id,
            size: desc.size,
        });
        Ok(GpuBuffer::Dummy { id })
    }

    pub fn release_buffer(&self, buffer: GpuBuffer) {
        if let Ok(id) = dummy_handle!(GpuBuffer, &buffer) {
            let mut state = self.state.lock();
            state.buffers.remove(&id);
            state.calls.push(DummyCall::ReleaseBuffer { id });
        }
    }

    pub fn create_transfer_buffer(&self, size: u64) -> Result<GpuTransferBuffer, GraphicsError> {
        let mut state = self.state.lock();
        state.take_failure()?;
        let id = state.alloc_id();
        state.transfer_buffers.insert(
            id,
            DummyTransferBuffer {
                size,
                backings: vec![Backing {
                    data: vec![0; size as usize],
                    written_epoch: 0,
                }],
                active: 0,
            },
        );
        state.calls.push(DummyCall::CreateTransferBuffer { id, size });
        Ok(GpuTransferBuffer::Dummy { id })
    }

    pub fn release_transfer_buffer(&self, buffer: GpuTransferBuffer) {
        if let Ok(id) = dummy_handle!(GpuTransferBuffer, &buffer) {
            let mut state = self.state.lock();
            if let Some(tb) = state.transfer_buffers.remove(&id) {
                state.retired_transfer_buffers.insert(id, tb);
            }
            state.calls.push(DummyCall::ReleaseTransferBuffer { id });
        }
    }

    pub fn write_transfer_buffer(
        &self,
        buffer: &GpuTransferBuffer,
        offset: u64,
        data: &[u8],
        cycle: bool,
    ) -> Result<(), GraphicsError> {
        let id = dummy_handle!(GpuTransferBuffer, buffer)?;
        let mut state = self.state.lock();
        let epoch = state.epoch + 1;
        let tb = state
            .transfer_buffers
            .get_mut(&id)
            .ok_or_else(|| GraphicsError::Internal(format!("unknown transfer buffer {id}")))?;
        if offset + data.len() as u64 > tb.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at {offset} overflows transfer buffer of {} bytes",
                data.len(),
                tb.size
            )));
        }
        if cycle && tb.backings[tb.active].written_epoch == epoch {
            tb.active = match tb.backings.iter().position(|b| b.written_epoch < epoch) {
                Some(free) => free,
                None => {
                    tb.backings.push(Backing {
                        data: vec![0; tb.size as usize],
                        written_epoch: 0,
                    });
                    tb.backings.len() - 1
                }
            };
        }
        let backing = &mut tb.backings[tb.active];
        backing.written_epoch = epoch;
        backing.data[offset as usize..offset as usize + data.len()].copy_from_slice(data);
        state.calls.push(DummyCall::WriteTransferBuffer {
            id,
            offset,
            size: data.len() as u64,
            cycle,
        });
        Ok(())
    }

    pub fn create_shader(&self, desc: &ShaderDescription) -> Result<GpuShader, GraphicsError> {
        let mut state = self.state.lock();
        state.take_failure()?;
        if desc.vertex.code.is_empty() || desc.fragment.code.is_empty() {
            return Err(GraphicsError::CreationFailed("empty shader code".into()));
        }
        let id = state.alloc_id();
        state.shaders.insert(id);
        state.calls.push(DummyCall::CreateShader { id });
        Ok(GpuShader::Dummy { id })
    }

    pub fn release_shader(&self, shader: GpuShader) {
        if let Ok(id) = dummy_handle!(GpuShader, &shader) {
            let mut state = self.state.lock();
            state.shaders.remove(&id);
            state.calls.push(DummyCall::ReleaseShader { id });
        }
    }

    pub fn create_sampler(&self, desc: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError> {
        log::trace!("DummyBackend: creating sampler {:?}", desc.label);
        let mut state = self.state.lock();
        state.take_failure()?;
        let id = state.alloc_id();
        state.samplers.insert(id);
        state.calls.push(DummyCall::CreateSampler { id });
        Ok(GpuSampler::Dummy { id })
    }

    pub fn release_sampler(&self, sampler: GpuSampler) {
        if let Ok(id) = dummy_handle!(GpuSampler, &sampler) {
            let mut state = self.state.lock();
            state.samplers.remove(&id);
            state.calls.push(DummyCall::ReleaseSampler { id });
        }
    }

    pub fn create_pipeline(
        &self,
        desc: &RenderPipelineDescriptor<'_>,
    ) -> Result<GpuPipeline, GraphicsError> {
        let shader = dummy_handle!(GpuShader, desc.shader)?;
        let mut state = self.state.lock();
        state.take_failure()?;
        if !state.shaders.contains(&shader) {
            return Err(GraphicsError::Internal(format!("unknown shader {shader}")));
        }
        let id = state.alloc_id();
        state.pipelines.insert(id);
        state.calls.push(DummyCall::CreatePipeline {
            id,
            color_formats: desc.color_targets.iter().map(|t| t.format).collect(),
            depth_format: desc.depth_stencil.map(|d| d.format),
        });
        Ok(GpuPipeline::Dummy { id })
    }

    pub fn release_pipeline(&self, pipeline: GpuPipeline) {
        if let Ok(id) = dummy_handle!(GpuPipeline, &pipeline) {
            let mut state = self.state.lock();
            state.pipelines.remove(&id);
            state.calls.push(DummyCall::ReleasePipeline { id });
        }
    }

    pub fn texture_upload_layout(
        &self,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> TextureUploadLayout {
        let bytes_per_row = width * format.block_size();
        TextureUploadLayout {
            bytes_per_row,
            size: bytes_per_row as u64 * height as u64,
        }
    }

    pub fn texture_copy_alignment(&self, format: TextureFormat) -> u64 {
        format.block_size() as u64
    }

    pub fn buffer_copy_alignment(&self) -> u64 {
        self.config.buffer_copy_alignment.max(1)
    }

    // --- recording ---------------------------------------------------------

    pub fn acquire_command_buffer(&self, label: &str) -> Result<GpuCommandBuffer, GraphicsError> {
        log::trace!("DummyBackend: acquiring command buffer {label}");
        let mut state = self.state.lock();
        let id = state.alloc_id();
        state.commands.insert(id, CommandState::default());
        Ok(GpuCommandBuffer::Dummy { id })
    }

    pub fn begin_copy_pass(&self, cmd: &mut GpuCommandBuffer) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        let command = state.command(cmd)?;
        if command.copy_open || command.render_open {
            return Err(GraphicsError::Internal("a pass is already open".into()));
        }
        command.copy_open = true;
        state.calls.push(DummyCall::BeginCopyPass);
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
        let src = dummy_handle!(GpuTransferBuffer, src)?;
        let dst = dummy_handle!(GpuTexture, dst)?;
        let mut state = self.state.lock();
        let texture = state
            .textures
            .get(&dst)
            .ok_or_else(|| GraphicsError::Internal(format!("unknown texture {dst}")))?;
        if (texture.width, texture.height) != (width, height) {
            return Err(GraphicsError::Internal(
                "partial texture uploads are not supported".into(),
            ));
        }
        let tb = state
            .transfer_buffers
            .get(&src)
            .ok_or_else(|| GraphicsError::Internal(format!("unknown transfer buffer {src}")))?;
        let backing = tb.active;
        let command = state.command(cmd)?;
        if !command.copy_open {
            return Err(GraphicsError::Internal("upload outside a copy pass".into()));
        }
        command.copies.push(PendingCopy::Texture {
            src,
            backing,
            src_offset,
            bytes_per_row,
            dst,
        });
        state.calls.push(DummyCall::UploadToTexture {
            texture: dst,
            src_offset,
        });
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
        let src = dummy_handle!(GpuTransferBuffer, src)?;
        let dst = dummy_handle!(GpuBuffer, dst)?;
        let mut state = self.state.lock();
        let capacity = state
            .buffers
            .get(&dst)
            .map(|b| b.len() as u64)
            .ok_or_else(|| GraphicsError::Internal(format!("unknown buffer {dst}")))?;
        if dst_offset + size > capacity {
            return Err(GraphicsError::Internal(format!(
                "copy of {size} bytes at {dst_offset} overflows buffer of {capacity} bytes"
            )));
        }
        let backing = state
            .transfer_buffers
            .get(&src)
            .map(|tb| tb.active)
            .ok_or_else(|| GraphicsError::Internal(format!("unknown transfer buffer {src}")))?;
        let command = state.command(cmd)?;
        if !command.copy_open {
            return Err(GraphicsError::Internal("upload outside a copy pass".into()));
        }
        command.copies.push(PendingCopy::Buffer {
            src,
            backing,
            src_offset,
            dst,
            dst_offset,
            size,
        });
        state.calls.push(DummyCall::UploadToBuffer {
            buffer: dst,
            src_offset,
            dst_offset,
            size,
        });
        Ok(())
    }

    pub fn end_copy_pass(&self, cmd: &mut GpuCommandBuffer) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        let command = state.command(cmd)?;
        if !command.copy_open {
            return Err(GraphicsError::Internal("no copy pass is open".into()));
        }
        command.copy_open = false;
        state.calls.push(DummyCall::EndCopyPass);
        Ok(())
    }

    pub fn begin_render_pass(
        &self,
        cmd: &mut GpuCommandBuffer,
        desc: &RenderPassDescriptor<'_>,
    ) -> Result<bool, GraphicsError> {
        let mut color_textures = Vec::new();
        for attachment in &desc.color_attachments {
            if let ColorTarget::Texture(texture) = attachment.target {
                color_textures.push(dummy_handle!(GpuTexture, texture)?);
            }
        }
        let depth_texture = match &desc.depth_stencil {
            Some(ds) => Some(dummy_handle!(GpuTexture, ds.texture)?),
            None => None,
        };

        let mut state = self.state.lock();
        let swapchain = desc.targets_swapchain();
        if swapchain && !state.surface.as_ref().is_some_and(|s| s.held) {
            return Ok(false);
        }
        let command = state.command(cmd)?;
        if command.copy_open || command.render_open {
            return Err(GraphicsError::Internal("a pass is already open".into()));
        }
        command.render_open = true;
        command.pipeline_bound = false;

        let clear_color = desc.color_attachments.first().and_then(|a| match a.load {
            LoadOp::Clear(color) => Some(color),
            LoadOp::Load => None,
        });
        let (clear_depth, clear_stencil) = match &desc.depth_stencil {
            Some(ds) => (
                match ds.depth_load {
                    LoadOp::Clear(d) => Some(d),
                    LoadOp::Load => None,
                },
                match ds.stencil_load {
                    LoadOp::Clear(s) => Some(s),
                    LoadOp::Load => None,
                },
            ),
            None => (None, None),
        };
        state.calls.push(DummyCall::BeginRenderPass {
            swapchain,
            color_textures,
            depth_texture,
            clear_color,
            clear_depth,
            clear_stencil,
        });
        Ok(true)
    }

    pub fn end_render_pass(&self, cmd: &mut GpuCommandBuffer) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        let command = state.render_command(cmd)?;
        command.render_open = false;
        state.calls.push(DummyCall::EndRenderPass);
        Ok(())
    }

    pub fn set_viewport(
        &self,
        cmd: &mut GpuCommandBuffer,
        viewport: &Viewport,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.render_command(cmd)?;
        state.calls.push(DummyCall::SetViewport(*viewport));
        Ok(())
    }

    pub fn set_scissor(
        &self,
        cmd: &mut GpuCommandBuffer,
        scissor: &ScissorRect,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.render_command(cmd)?;
        state.calls.push(DummyCall::SetScissor(*scissor));
        Ok(())
    }

    pub fn bind_pipeline(
        &self,
        cmd: &mut GpuCommandBuffer,
        pipeline: &GpuPipeline,
    ) -> Result<(), GraphicsError> {
        let id = dummy_handle!(GpuPipeline, pipeline)?;
        let mut state = self.state.lock();
        if !state.pipelines.contains(&id) {
            return Err(GraphicsError::Internal(format!("unknown pipeline {id}")));
        }
        state.render_command(cmd)?.pipeline_bound = true;
        state.calls.push(DummyCall::BindPipeline { id });
        Ok(())
    }

    pub fn bind_vertex_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        slot: u32,
        buffer: &GpuBuffer,
    ) -> Result<(), GraphicsError> {
        let id = dummy_handle!(GpuBuffer, buffer)?;
        let mut state = self.state.lock();
        state.render_command(cmd)?;
        state.calls.push(DummyCall::BindVertexBuffer { slot, id });
        Ok(())
    }

    pub fn bind_index_buffer(
        &self,
        cmd: &mut GpuCommandBuffer,
        buffer: &GpuBuffer,
        format: IndexFormat,
    ) -> Result<(), GraphicsError> {
        let id = dummy_handle!(GpuBuffer, buffer)?;
        let mut state = self.state.lock();
        state.render_command(cmd)?;
        state.calls.push(DummyCall::BindIndexBuffer { id, format });
        Ok(())
    }

    pub fn bind_samplers(
        &self,
        cmd: &mut GpuCommandBuffer,
        stage: ShaderStage,
        bindings: &[(&GpuTexture, &GpuSampler)],
    ) -> Result<(), GraphicsError> {
        let mut textures = Vec::with_capacity(bindings.len());
        let mut samplers = Vec::with_capacity(bindings.len());
        for (texture, sampler) in bindings {
            textures.push(dummy_handle!(GpuTexture, *texture)?);
            samplers.push(dummy_handle!(GpuSampler, *sampler)?);
        }
        let mut state = self.state.lock();
        state.render_command(cmd)?;
        state.calls.push(DummyCall::BindSamplers {
            stage,
            textures,
            samplers,
        });
        Ok(())
    }

    pub fn push_uniforms(
        &self,
        cmd: &mut GpuCommandBuffer,
        stage: ShaderStage,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.render_command(cmd)?;
        state.calls.push(DummyCall::PushUniforms {
            stage,
            data: data.to_vec(),
        });
        Ok(())
    }

    pub fn draw_indexed(
        &self,
        cmd: &mut GpuCommandBuffer,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        if !state.render_command(cmd)?.pipeline_bound {
            return Err(GraphicsError::Internal("draw without a pipeline".into()));
        }
        state.calls.push(DummyCall::DrawIndexed {
            index_count,
            first_index,
            vertex_offset,
        });
        Ok(())
    }

    // --- submission --------------------------------------------------------

    pub fn submit(&self, cmd: GpuCommandBuffer) -> Result<GpuFence, GraphicsError> {
        let command_buffer = dummy_id(&cmd)?;
        let mut state = self.state.lock();
        let command = state
            .commands
            .remove(&command_buffer)
            .ok_or_else(|| GraphicsError::Internal("unknown command buffer".into()))?;
        if command.copy_open || command.render_open {
            return Err(GraphicsError::Internal(
                "command buffer submitted with an open pass".into(),
            ));
        }
        for copy in command.copies {
            state.execute_copy(copy)?;
        }
        if state.commands.values().all(|c| c.copies.is_empty()) {
            state.retired_transfer_buffers.clear();
        }
        state.epoch += 1;
        let fence = state.alloc_id();
        state.fences.insert(fence);
        state.calls.push(DummyCall::Submit {
            command_buffer,
            fence,
        });
        Ok(GpuFence::Dummy { id: fence })
    }

    pub fn wait_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        let id = dummy_handle!(GpuFence, fence)?;
        let mut state = self.state.lock();
        if state.device_lost {
            return Err(GraphicsError::Internal("fence wait failed: device lost".into()));
        }
        state.calls.push(DummyCall::WaitFence { id });
        Ok(())
    }

    pub fn release_fence(&self, fence: GpuFence) {
        if let Ok(id) = dummy_handle!(GpuFence, &fence) {
            let mut state = self.state.lock();
            state.fences.remove(&id);
            state.calls.push(DummyCall::ReleaseFence { id });
        }
    }

    pub fn wait_idle(&self) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        if state.device_lost {
            return Err(GraphicsError::Internal("idle wait failed: device lost".into()));
        }
        state.calls.push(DummyCall::WaitIdle);
        Ok(())
    }

    pub fn read_texture(
        &self,
        texture: &GpuTexture,
        _format: TextureFormat,
        _width: u32,
        _height: u32,
    ) -> Result<Vec<u8>, GraphicsError> {
        let id = dummy_handle!(GpuTexture, texture)?;
        self.state
            .lock()
            .textures
            .get(&id)
            .map(|t| t.data.clone())
            .ok_or_else(|| GraphicsError::Internal(format!("unknown texture {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload_bytes(backend: &DummyBackend, tb: &GpuTransferBuffer, dst: &GpuBuffer, offset: u64) {
        let mut cmd = backend.acquire_command_buffer("upload").unwrap();
        backend.begin_copy_pass(&mut cmd).unwrap();
        backend
            .upload_to_buffer(&mut cmd, tb, offset, dst, 0, 4)
            .unwrap();
        backend.end_copy_pass(&mut cmd).unwrap();
        let fence = backend.submit(cmd).unwrap();
        backend.wait_fence(&fence).unwrap();
        backend.release_fence(fence);
    }

    #[test]
    fn test_copy_runs_at_submit() {
        let backend = DummyBackend::new();
        let tb = backend.create_transfer_buffer(16).unwrap();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(4, crate::types::BufferUsage::VERTEX))
            .unwrap();

        backend
            .write_transfer_buffer(&tb, 0, &[1, 2, 3, 4], true)
            .unwrap();
        upload_bytes(&backend, &tb, &buffer, 0);

        assert_eq!(backend.buffer_contents(&buffer).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_cycle_protects_recorded_copies() {
        let backend = DummyBackend::new();
        let tb = backend.create_transfer_buffer(4).unwrap();
        let a = backend
            .create_buffer(&BufferDescriptor::new(4, crate::types::BufferUsage::VERTEX))
            .unwrap();
        let b = backend
            .create_buffer(&BufferDescriptor::new(4, crate::types::BufferUsage::VERTEX))
            .unwrap();

        let mut cmd = backend.acquire_command_buffer("upload").unwrap();
        backend.begin_copy_pass(&mut cmd).unwrap();
        backend.write_transfer_buffer(&tb, 0, &[1; 4], true).unwrap();
        backend.upload_to_buffer(&mut cmd, &tb, 0, &a, 0, 4).unwrap();
        backend.write_transfer_buffer(&tb, 0, &[2; 4], true).unwrap();
        backend.upload_to_buffer(&mut cmd, &tb, 0, &b, 0, 4).unwrap();
        backend.end_copy_pass(&mut cmd).unwrap();
        backend.submit(cmd).unwrap();

        assert_eq!(backend.buffer_contents(&a).unwrap(), vec![1; 4]);
        assert_eq!(backend.buffer_contents(&b).unwrap(), vec![2; 4]);
        assert_eq!(backend.transfer_backings(&tb), 2);
    }

    #[test]
    fn test_draw_requires_render_pass() {
        let backend = DummyBackend::new();
        let mut cmd = backend.acquire_command_buffer("render").unwrap();
        assert!(backend.draw_indexed(&mut cmd, 3, 0, 0).is_err());
    }

    #[test]
    fn test_swapchain_pass_skipped_without_image() {
        let backend = DummyBackend::new();
        backend.claim_surface(&SurfaceTarget::headless(64, 64)).unwrap();
        backend.set_swapchain_available(false);
        assert_eq!(backend.acquire_swapchain_texture().unwrap(), None);

        let mut cmd = backend.acquire_command_buffer("render").unwrap();
        let mut desc = RenderPassDescriptor::default();
        desc.color_attachments.push(crate::types::ColorAttachment {
            target: ColorTarget::Swapchain,
            load: LoadOp::Load,
        });
        assert!(!backend.begin_render_pass(&mut cmd, &desc).unwrap());
    }

    #[test]
    fn test_injected_failure() {
        let backend = DummyBackend::new();
        backend.fail_next_creation("out of memory");
        let result = backend.create_transfer_buffer(16);
        assert!(matches!(result, Err(GraphicsError::CreationFailed(_))));
        assert!(backend.create_transfer_buffer(16).is_ok());
    }
}
