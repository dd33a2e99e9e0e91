//! The rendering context.
//!
//! [`Renderer`] owns the GPU device, every resource created through it and
//! the per-frame recording state. Its lifecycle has three layers:
//!
//! ```text
//! Renderer::new()        registry only, every GPU call fails with DeviceNotReady
//!   create_device()      backend opened; textures, meshes and shaders can be created
//!     startup(surface)   swapchain claimed; uploads, draws and presents work
//!     shutdown()
//!   destroy_device()
//! ```
//!
//! Handles stay valid across a device being destroyed, but their native
//! objects do not: using a stale handle fails with
//! [`GraphicsError::InvalidResource`], destroying it only drops the
//! bookkeeping.

mod draw;
mod frame;
mod upload;

pub use frame::choose_present_mode;

use ember_core::{MeshHandle, ShaderDescription, ShaderHandle, ShaderStageInfo, TextureHandle};

use crate::backend::{GpuBackend, create_backend};
use crate::error::GraphicsError;
use crate::instance::{GraphicsDriver, InstanceParameters};
use crate::pipeline::{PipelineCache, PipelineDependency};
use crate::resources::{
    DeviceId, DeviceResource, MeshRecord, ResourceRegistry, RingStats, SamplerCache,
    ShaderRecord, TextureRecord,
};
use crate::types::{self, TextureDescriptor, TextureUsage};

use frame::FrameState;

/// Largest texture edge accepted by [`Renderer::create_texture`].
pub const MAX_TEXTURE_DIMENSION: u32 = 16384;

/// An open GPU device.
struct Device {
    id: DeviceId,
    backend: GpuBackend,
    params: InstanceParameters,
    /// Native format behind [`ember_core::TextureFormat::Depth24Stencil8`].
    depth_format: types::TextureFormat,
    pipelines: PipelineCache,
    samplers: SamplerCache,
    frame: Option<FrameState>,
}

impl Device {
    fn open(params: InstanceParameters) -> Result<Self, GraphicsError> {
        let backend = create_backend(&params)?;
        let depth_format = select_depth_format(&backend);
        let id = DeviceId::next();
        log::info!(
            "Created device {id:?}: {} ({}), depth format {depth_format:?}",
            backend.name(),
            backend.driver()
        );
        Ok(Self {
            id,
            backend,
            params,
            depth_format,
            pipelines: PipelineCache::new(),
            samplers: SamplerCache::new(),
            frame: None,
        })
    }

    fn frame_mut(&mut self) -> Result<&mut FrameState, GraphicsError> {
        self.frame.as_mut().ok_or(GraphicsError::DeviceNotReady)
    }

    /// Release every cached pipeline depending on `dependency`.
    fn invalidate(&self, dependency: PipelineDependency) {
        let pipelines = self.pipelines.invalidate(dependency);
        if !pipelines.is_empty() {
            log::debug!("Released {} pipelines using {dependency:?}", pipelines.len());
        }
        for pipeline in pipelines {
            self.backend.release_pipeline(pipeline);
        }
    }
}

fn select_depth_format(backend: &GpuBackend) -> types::TextureFormat {
    if backend.supports_texture_format(
        types::TextureFormat::Depth24PlusStencil8,
        TextureUsage::DEPTH_STENCIL_TARGET,
    ) {
        types::TextureFormat::Depth24PlusStencil8
    } else {
        log::warn!("Depth24PlusStencil8 unsupported, depth textures use Depth32FloatStencil8");
        types::TextureFormat::Depth32FloatStencil8
    }
}

/// Shader description kept alongside a shader, without its bytecode.
fn without_code(description: &ShaderDescription) -> ShaderDescription {
    let strip = |stage: &ShaderStageInfo| ShaderStageInfo {
        code: Vec::new(),
        entry_point: stage.entry_point.clone(),
        sampler_count: stage.sampler_count,
        uniforms: stage.uniforms.clone(),
    };
    ShaderDescription::new(strip(&description.vertex), strip(&description.fragment))
}

/// Rendering context: device, resources and frame state.
///
/// # Example
///
/// ```ignore
/// let mut renderer = Renderer::new();
/// renderer.create_device()?;
/// renderer.startup(&SurfaceTarget::from_window(window, 1280, 720))?;
///
/// let texture = renderer.create_texture(64, 64, TextureFormat::R8G8B8A8, false)?;
/// renderer.set_texture_data(texture, &pixels)?;
///
/// renderer.clear(None, Color::BLACK, 1.0, 0, ClearMask::ALL)?;
/// renderer.draw(&DrawCommand::new(&material, mesh, 6))?;
/// renderer.present()?;
/// ```
#[derive(Default)]
pub struct Renderer {
    device: Option<Device>,
    registry: ResourceRegistry,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("device", &self.device.as_ref().map(|d| d.id))
            .field("started", &self.is_started())
            .field("resources", &self.registry.counts())
            .finish()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    // --- device ------------------------------------------------------------

    /// Open a device with default parameters.
    pub fn create_device(&mut self) -> Result<(), GraphicsError> {
        self.create_device_with(InstanceParameters::default())
    }

    pub fn create_device_with(&mut self, params: InstanceParameters) -> Result<(), GraphicsError> {
        if self.device.is_some() {
            return Err(GraphicsError::InvalidParameter(
                "a device already exists".into(),
            ));
        }
        if params.frames_in_flight == 0 {
            return Err(GraphicsError::InvalidParameter(
                "frames_in_flight must be at least 1".into(),
            ));
        }
        self.device = Some(Device::open(params)?);
        Ok(())
    }

    /// Shut down and close the device.
    ///
    /// Resources created under it stay in the registry as stale records.
    pub fn destroy_device(&mut self) -> Result<(), GraphicsError> {
        self.shutdown()?;
        if let Some(device) = self.device.take() {
            for pipeline in device.pipelines.drain() {
                device.backend.release_pipeline(pipeline);
            }
            for sampler in device.samplers.drain() {
                device.backend.release_sampler(sampler);
            }
            log::info!("Destroyed device {:?}", device.id);
        }
        Ok(())
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    /// Whether [`startup`](Self::startup) has claimed a surface.
    pub fn is_started(&self) -> bool {
        self.device.as_ref().is_some_and(|d| d.frame.is_some())
    }

    /// Driver of the open device, [`GraphicsDriver::None`] without one.
    pub fn driver(&self) -> GraphicsDriver {
        self.device
            .as_ref()
            .map_or(GraphicsDriver::None, |d| d.backend.driver())
    }

    pub fn device_id(&self) -> Option<DeviceId> {
        self.device.as_ref().map(|d| d.id)
    }

    pub fn backend(&self) -> Option<&GpuBackend> {
        self.device.as_ref().map(|d| &d.backend)
    }

    pub fn parameters(&self) -> Option<&InstanceParameters> {
        self.device.as_ref().map(|d| &d.params)
    }

    /// Native format used for depth/stencil textures.
    pub fn depth_format(&self) -> Option<types::TextureFormat> {
        self.device.as_ref().map(|d| d.depth_format)
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn pipeline_cache(&self) -> Option<&PipelineCache> {
        self.device.as_ref().map(|d| &d.pipelines)
    }

    pub fn sampler_cache(&self) -> Option<&SamplerCache> {
        self.device.as_ref().map(|d| &d.samplers)
    }

    /// Counters of the texture and buffer upload rings.
    pub fn upload_stats(&self) -> Option<(RingStats, RingStats)> {
        let frame = self.device.as_ref()?.frame.as_ref()?;
        Some((frame.texture_ring.ring.stats(), frame.buffer_ring.ring.stats()))
    }

    /// Frames presented and how often presenting waited on the GPU.
    pub fn frame_stats(&self) -> Option<(u64, u64)> {
        let frame = self.device.as_ref()?.frame.as_ref()?;
        Some((frame.frames.frame_count(), frame.frames.stalls()))
    }

    fn device(&self) -> Result<&Device, GraphicsError> {
        self.device.as_ref().ok_or(GraphicsError::DeviceNotReady)
    }

    // --- textures ----------------------------------------------------------

    /// Create a 2D texture.
    ///
    /// `is_target` textures can be rendered into. Depth/stencil textures
    /// must be targets and cannot be uploaded to or read back.
    pub fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: ember_core::TextureFormat,
        is_target: bool,
    ) -> Result<TextureHandle, GraphicsError> {
        let device = self.device()?;
        if width == 0 || height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture size {width}x{height}"
            )));
        }
        if width > MAX_TEXTURE_DIMENSION || height > MAX_TEXTURE_DIMENSION {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture size {width}x{height} exceeds {MAX_TEXTURE_DIMENSION}"
            )));
        }

        let native_format = crate::pipeline::tables::texture_format(format, device.depth_format);
        let usage = if format.is_depth_stencil() {
            if !is_target {
                return Err(GraphicsError::InvalidParameter(
                    "depth/stencil textures must be render targets".into(),
                ));
            }
            TextureUsage::SAMPLER | TextureUsage::DEPTH_STENCIL_TARGET
        } else if is_target {
            TextureUsage::SAMPLER
                | TextureUsage::COPY_DST
                | TextureUsage::COPY_SRC
                | TextureUsage::COLOR_TARGET
        } else {
            TextureUsage::SAMPLER | TextureUsage::COPY_DST | TextureUsage::COPY_SRC
        };

        let gpu = device.backend.create_texture(
            &TextureDescriptor::new_2d(width, height, native_format, usage).with_label("texture"),
        )?;
        let record = TextureRecord::new(
            device.id,
            gpu,
            width,
            height,
            format,
            native_format,
            is_target,
        );
        let handle = self.registry.insert_texture(record);
        log::trace!("Created texture {handle:?} {width}x{height} {format:?}");
        Ok(handle)
    }

    /// Destroy a texture and every pipeline rendering into it.
    ///
    /// Destroying an unknown or already destroyed handle does nothing.
    pub fn destroy_texture(&mut self, handle: TextureHandle) -> Result<(), GraphicsError> {
        let Some(record) = self.registry.remove_texture(handle) else {
            log::trace!("Texture {handle:?} already destroyed");
            return Ok(());
        };
        let Some(device) = self.device.as_mut() else {
            return Ok(());
        };
        if !record.is_live_on(device.id) {
            log::debug!("Dropped stale texture {handle:?}");
            return Ok(());
        }

        device.invalidate(PipelineDependency::Texture(handle));
        if let Some(frame) = device.frame.as_mut() {
            let in_open_pass = frame
                .passes
                .render()
                .and_then(|pass| pass.target.as_ref())
                .is_some_and(|target| target.attachments().contains(&handle));
            if in_open_pass {
                frame::end_render_pass(&device.backend, frame)?;
            }
        }
        device.backend.release_texture(record.gpu);
        Ok(())
    }

    // --- meshes ------------------------------------------------------------

    /// Create an empty mesh. Its buffers are allocated by the first upload.
    pub fn create_mesh(&mut self) -> Result<MeshHandle, GraphicsError> {
        let device = self.device()?;
        let handle = self.registry.insert_mesh(MeshRecord::new(device.id));
        log::trace!("Created mesh {handle:?}");
        Ok(handle)
    }

    pub fn destroy_mesh(&mut self, handle: MeshHandle) -> Result<(), GraphicsError> {
        let Some(mut record) = self.registry.remove_mesh(handle) else {
            log::trace!("Mesh {handle:?} already destroyed");
            return Ok(());
        };
        let Some(device) = self.device.as_mut() else {
            return Ok(());
        };
        if !record.is_live_on(device.id) {
            log::debug!("Dropped stale mesh {handle:?}");
            return Ok(());
        }

        if let Some(frame) = device.frame.as_mut() {
            frame.passes.forget_mesh(handle);
        }
        for buffer in record.take_buffers() {
            device.backend.release_buffer(buffer.gpu);
        }
        Ok(())
    }

    // --- shaders -----------------------------------------------------------

    /// Create a shader from vertex and fragment bytecode.
    pub fn create_shader(
        &mut self,
        description: &ShaderDescription,
    ) -> Result<ShaderHandle, GraphicsError> {
        let device = self.device()?;
        for stage in [&description.vertex, &description.fragment] {
            if stage.sampler_count as usize > ember_core::MAX_SAMPLERS_PER_STAGE {
                return Err(GraphicsError::InvalidParameter(format!(
                    "{} samplers exceed the per-stage limit of {}",
                    stage.sampler_count,
                    ember_core::MAX_SAMPLERS_PER_STAGE
                )));
            }
        }

        let gpu = device.backend.create_shader(description)?;
        let record = ShaderRecord::new(device.id, gpu, without_code(description));
        let handle = self.registry.insert_shader(record);
        log::trace!("Created shader {handle:?}");
        Ok(handle)
    }

    /// Destroy a shader and every pipeline built from it.
    pub fn destroy_shader(&mut self, handle: ShaderHandle) -> Result<(), GraphicsError> {
        let Some(record) = self.registry.remove_shader(handle) else {
            log::trace!("Shader {handle:?} already destroyed");
            return Ok(());
        };
        let Some(device) = self.device.as_mut() else {
            return Ok(());
        };
        if !record.is_live_on(device.id) {
            log::debug!("Dropped stale shader {handle:?}");
            return Ok(());
        }

        device.invalidate(PipelineDependency::Shader(handle));
        device.backend.release_shader(record.gpu);
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.destroy_device() {
            log::error!("Failed to destroy device: {e}");
        }
    }
}

static_assertions::assert_impl_all!(Renderer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyCall;
    use crate::instance::BackendType;
    use ember_core::TextureFormat;

    fn renderer() -> Renderer {
        let mut renderer = Renderer::new();
        renderer
            .create_device_with(InstanceParameters::new().with_backend(BackendType::Dummy))
            .unwrap();
        renderer
    }

    #[test]
    fn test_resources_need_a_device() {
        let mut renderer = Renderer::new();
        assert!(matches!(
            renderer.create_texture(4, 4, TextureFormat::R8, false),
            Err(GraphicsError::DeviceNotReady)
        ));
        assert!(matches!(
            renderer.create_mesh(),
            Err(GraphicsError::DeviceNotReady)
        ));
        assert_eq!(renderer.driver(), GraphicsDriver::None);
    }

    #[test]
    fn test_second_device_rejected() {
        let mut renderer = renderer();
        assert!(matches!(
            renderer.create_device(),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert_eq!(renderer.driver(), GraphicsDriver::Dummy);
    }

    #[test]
    fn test_texture_validation() {
        let mut renderer = renderer();
        assert!(renderer.create_texture(0, 4, TextureFormat::R8, false).is_err());
        assert!(
            renderer
                .create_texture(MAX_TEXTURE_DIMENSION + 1, 1, TextureFormat::R8, false)
                .is_err()
        );
        assert!(
            renderer
                .create_texture(4, 4, TextureFormat::Depth24Stencil8, false)
                .is_err()
        );
        assert!(
            renderer
                .create_texture(4, 4, TextureFormat::Depth24Stencil8, true)
                .is_ok()
        );
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut renderer = renderer();
        let texture = renderer
            .create_texture(4, 4, TextureFormat::R8G8B8A8, false)
            .unwrap();
        renderer.destroy_texture(texture).unwrap();
        renderer.destroy_texture(texture).unwrap();

        let dummy = renderer.backend().unwrap().as_dummy().unwrap();
        let releases = dummy
            .calls()
            .iter()
            .filter(|c| matches!(c, DummyCall::ReleaseTexture { .. }))
            .count();
        assert_eq!(releases, 1);
        assert!(!renderer.registry().contains_texture(texture));
    }

    #[test]
    fn test_stale_handles_after_device_destroyed() {
        let mut renderer = renderer();
        let texture = renderer
            .create_texture(4, 4, TextureFormat::R8G8B8A8, false)
            .unwrap();
        renderer.destroy_device().unwrap();
        renderer
            .create_device_with(InstanceParameters::new().with_backend(BackendType::Dummy))
            .unwrap();

        let device = renderer.device_id().unwrap();
        assert!(matches!(
            renderer.registry().texture(texture, device),
            Err(GraphicsError::InvalidResource(_))
        ));

        // The new device never saw the texture, so nothing is released.
        renderer.destroy_texture(texture).unwrap();
        let dummy = renderer.backend().unwrap().as_dummy().unwrap();
        assert!(
            !dummy
                .calls()
                .iter()
                .any(|c| matches!(c, DummyCall::ReleaseTexture { .. }))
        );
    }

    #[test]
    fn test_shader_description_drops_code() {
        let mut renderer = renderer();
        let description = ShaderDescription::new(
            ShaderStageInfo::new(b"vs".to_vec(), "vs_main"),
            ShaderStageInfo::new(b"fs".to_vec(), "fs_main").with_sampler_count(2),
        );
        let shader = renderer.create_shader(&description).unwrap();
        let device = renderer.device_id().unwrap();
        let record = renderer.registry().shader(shader, device).unwrap();

        assert!(record.description().vertex.code.is_empty());
        assert_eq!(record.sampler_count(ember_core::ShaderStage::Fragment), 2);
    }

    #[test]
    fn test_too_many_samplers_rejected() {
        let mut renderer = renderer();
        let description = ShaderDescription::new(
            ShaderStageInfo::new(b"vs".to_vec(), "vs_main"),
            ShaderStageInfo::new(b"fs".to_vec(), "fs_main").with_sampler_count(17),
        );
        assert!(matches!(
            renderer.create_shader(&description),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }
}
