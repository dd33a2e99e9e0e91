//! Per-frame state: command buffers, upload rings, present and shutdown.

use ember_core::Color;

use super::{Device, Renderer};
use crate::backend::{GpuBackend, GpuCommandBuffer, GpuTexture, GpuTransferBuffer};
use crate::error::GraphicsError;
use crate::instance::PresentMode;
use crate::pass::PassState;
use crate::resources::UploadRing;
use crate::scheduler::{FenceGroup, FramePipeline};
use crate::swapchain::SurfaceTarget;
use crate::types::{TextureDescriptor, TextureFormat, TextureUsage};

/// Color of the texture bound in place of missing sampler inputs.
pub(super) const FALLBACK_COLOR: u32 = 0xe82979;

/// A transfer buffer and the ring planning writes into it.
#[derive(Debug)]
pub(super) struct TransferRing {
    pub buffer: GpuTransferBuffer,
    pub ring: UploadRing,
}

impl TransferRing {
    fn new(backend: &GpuBackend, capacity: u64, max_cycles: u32) -> Result<Self, GraphicsError> {
        Ok(Self {
            buffer: backend.create_transfer_buffer(capacity)?,
            ring: UploadRing::new(capacity, max_cycles),
        })
    }
}

/// Which of the two upload rings a write goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RingKind {
    Texture,
    Buffer,
}

/// Everything that exists between `startup` and `shutdown`.
pub(super) struct FrameState {
    pub supports_mailbox: bool,
    pub supports_immediate: bool,
    pub vsync: bool,
    /// 1x1 texture bound for samplers without a live texture.
    pub fallback: GpuTexture,
    pub texture_ring: TransferRing,
    pub buffer_ring: TransferRing,
    pub upload_cmd: GpuCommandBuffer,
    pub render_cmd: GpuCommandBuffer,
    pub passes: PassState,
    pub frames: FramePipeline,
    /// Size of the swapchain image held this frame, if any.
    pub swapchain: Option<(u32, u32)>,
}

impl FrameState {
    pub fn ring_mut(&mut self, kind: RingKind) -> &mut TransferRing {
        match kind {
            RingKind::Texture => &mut self.texture_ring,
            RingKind::Buffer => &mut self.buffer_ring,
        }
    }

    fn reset_rings(&mut self) {
        ember_core::profile_plot!("texture_ring_bytes", self.texture_ring.ring.offset());
        ember_core::profile_plot!("buffer_ring_bytes", self.buffer_ring.ring.offset());
        self.texture_ring.ring.reset();
        self.buffer_ring.ring.reset();
    }
}

/// Present mode for a vsync setting, given what the surface supports.
///
/// With vsync the renderer prefers mailbox over FIFO; without it, immediate.
/// FIFO is always available and is the fallback either way.
pub fn choose_present_mode(vsync: bool, mailbox: bool, immediate: bool) -> PresentMode {
    match (vsync, mailbox, immediate) {
        (true, true, _) => PresentMode::Mailbox,
        (false, _, true) => PresentMode::Immediate,
        _ => PresentMode::Fifo,
    }
}

/// Close whichever passes are open.
pub(super) fn end_passes(backend: &GpuBackend, frame: &mut FrameState) -> Result<(), GraphicsError> {
    if frame.passes.close_copy() {
        backend.end_copy_pass(&mut frame.upload_cmd)?;
    }
    end_render_pass(backend, frame)
}

pub(super) fn end_render_pass(
    backend: &GpuBackend,
    frame: &mut FrameState,
) -> Result<(), GraphicsError> {
    if frame.passes.close_render() {
        backend.end_render_pass(&mut frame.render_cmd)?;
    }
    Ok(())
}

/// Open the copy pass unless it already is.
pub(super) fn ensure_copy_pass(
    backend: &GpuBackend,
    frame: &mut FrameState,
) -> Result<(), GraphicsError> {
    if !frame.passes.copy_open() {
        backend.begin_copy_pass(&mut frame.upload_cmd)?;
        frame.passes.open_copy();
    }
    Ok(())
}

/// Submit the recorded uploads, then the recorded draws, swapping in fresh
/// command buffers.
fn submit_frame(backend: &GpuBackend, frame: &mut FrameState) -> Result<FenceGroup, GraphicsError> {
    end_passes(backend, frame)?;
    let upload = std::mem::replace(
        &mut frame.upload_cmd,
        backend.acquire_command_buffer("upload")?,
    );
    let render = std::mem::replace(
        &mut frame.render_cmd,
        backend.acquire_command_buffer("render")?,
    );
    let upload = backend.submit(upload)?;
    let render = backend.submit(render)?;
    Ok(FenceGroup::new(upload, render))
}

/// Submit everything recorded so far and block until the GPU finished it.
///
/// Afterwards both upload rings are free again. Any open render pass is
/// closed; drawing continues in a new pass that loads the target.
pub(super) fn flush_and_stall(
    backend: &GpuBackend,
    frame: &mut FrameState,
) -> Result<(), GraphicsError> {
    ember_core::profile_scope!("flush_and_stall");
    let fences = submit_frame(backend, frame)?;
    fences.retire(backend)?;
    frame.reset_rings();
    log::debug!("Stalled on GPU to free upload memory");
    Ok(())
}

impl Renderer {
    /// Claim `surface` and allocate the per-frame resources.
    ///
    /// Vsync starts enabled and the first swapchain image is acquired.
    pub fn startup(&mut self, surface: &SurfaceTarget) -> Result<(), GraphicsError> {
        let Device {
            backend,
            params,
            frame,
            ..
        } = self.device.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        if frame.is_some() {
            return Err(GraphicsError::InvalidParameter(
                "renderer already started".into(),
            ));
        }

        backend.claim_surface(surface)?;
        let state = FrameState {
            supports_mailbox: backend.supports_present_mode(PresentMode::Mailbox),
            supports_immediate: backend.supports_present_mode(PresentMode::Immediate),
            vsync: true,
            fallback: backend.create_texture(
                &TextureDescriptor::new_2d(
                    1,
                    1,
                    TextureFormat::Rgba8Unorm,
                    TextureUsage::SAMPLER | TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
                )
                .with_label("fallback"),
            )?,
            texture_ring: TransferRing::new(
                backend,
                params.upload_buffer_size,
                params.max_upload_cycles,
            )?,
            buffer_ring: TransferRing::new(
                backend,
                params.upload_buffer_size,
                params.max_upload_cycles,
            )?,
            upload_cmd: backend.acquire_command_buffer("upload")?,
            render_cmd: backend.acquire_command_buffer("render")?,
            passes: PassState::new(),
            frames: FramePipeline::new(params.frames_in_flight),
            swapchain: None,
        };
        let state = frame.insert(state);
        log::info!(
            "Renderer started ({:?}, mailbox: {}, immediate: {})",
            surface.size(),
            state.supports_mailbox,
            state.supports_immediate
        );

        let pixel = Color::from_rgb_u32(FALLBACK_COLOR).to_rgba8();
        let fallback = state.fallback.clone();
        super::upload::stage_texture(
            backend,
            state,
            &fallback,
            TextureFormat::Rgba8Unorm,
            1,
            1,
            &pixel,
        )?;
        state.swapchain = backend.acquire_swapchain_texture()?;
        self.set_vsync(true)
    }

    /// Wait for the GPU and release the per-frame resources and the surface.
    ///
    /// Does nothing if the renderer was never started. Cached pipelines and
    /// samplers are released too; textures, meshes and shaders survive.
    pub fn shutdown(&mut self) -> Result<(), GraphicsError> {
        let Some(device) = self.device.as_mut() else {
            return Ok(());
        };
        let Some(mut frame) = device.frame.take() else {
            return Ok(());
        };
        let backend = &device.backend;

        end_passes(backend, &mut frame)?;
        let FrameState {
            fallback,
            texture_ring,
            buffer_ring,
            upload_cmd,
            render_cmd,
            mut frames,
            ..
        } = frame;
        let upload = backend.submit(upload_cmd)?;
        let render = backend.submit(render_cmd)?;
        FenceGroup::new(upload, render).retire(backend)?;
        frames.wait_idle(backend)?;
        backend.wait_idle()?;

        backend.release_texture(fallback);
        backend.release_transfer_buffer(texture_ring.buffer);
        backend.release_transfer_buffer(buffer_ring.buffer);
        for pipeline in device.pipelines.drain() {
            backend.release_pipeline(pipeline);
        }
        for sampler in device.samplers.drain() {
            backend.release_sampler(sampler);
        }
        backend.release_surface();
        log::info!("Renderer shut down after {} frames", frames.frame_count());
        Ok(())
    }

    /// Submit the frame and show it.
    ///
    /// Blocks if the frame presented `frames_in_flight` presents ago is
    /// still on the GPU. Uploads are submitted before draws, so every draw
    /// sees the data uploaded during the same frame.
    pub fn present(&mut self) -> Result<(), GraphicsError> {
        ember_core::profile_function!();
        let Device { backend, frame, .. } =
            self.device.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        let frame = frame.as_mut().ok_or(GraphicsError::DeviceNotReady)?;

        end_passes(backend, frame)?;
        frame.frames.begin_frame(backend)?;
        let fences = submit_frame(backend, frame)?;
        backend.present();
        frame.frames.end_frame(backend, fences)?;
        frame.reset_rings();

        frame.swapchain = backend.acquire_swapchain_texture()?;
        if frame.swapchain.is_none() {
            log::debug!("No swapchain image, draws to the swapchain are skipped");
        }
        ember_core::frame_mark!();
        Ok(())
    }

    /// Block until the GPU finished everything recorded so far.
    pub fn wait_idle(&mut self) -> Result<(), GraphicsError> {
        let Device { backend, frame, .. } =
            self.device.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        if let Some(frame) = frame.as_mut() {
            flush_and_stall(backend, frame)?;
            frame.frames.wait_idle(backend)?;
        }
        backend.wait_idle()
    }

    /// Pick a present mode for `vsync` among those the surface supports.
    pub fn set_vsync(&mut self, vsync: bool) -> Result<(), GraphicsError> {
        let Device { backend, frame, .. } =
            self.device.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        let frame = frame.as_mut().ok_or(GraphicsError::DeviceNotReady)?;

        let mode = choose_present_mode(vsync, frame.supports_mailbox, frame.supports_immediate);
        if !vsync && mode == PresentMode::Fifo {
            log::warn!("Immediate presentation unsupported, vsync stays on");
        }
        backend.set_present_mode(mode)?;
        frame.vsync = vsync;
        log::info!("Vsync {}, present mode {mode:?}", if vsync { "on" } else { "off" });
        Ok(())
    }

    /// The last vsync setting, `false` before startup.
    pub fn vsync(&self) -> bool {
        self.device
            .as_ref()
            .and_then(|d| d.frame.as_ref())
            .is_some_and(|f| f.vsync)
    }

    /// Resize the swapchain. Zero sizes (a minimized window) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), GraphicsError> {
        let device = self.device.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        device.frame_mut()?;
        if width == 0 || height == 0 {
            log::debug!("Ignoring resize to {width}x{height}");
            return Ok(());
        }
        device.backend.resize_surface(width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_mode_choice() {
        assert_eq!(choose_present_mode(true, true, true), PresentMode::Mailbox);
        assert_eq!(choose_present_mode(true, false, true), PresentMode::Fifo);
        assert_eq!(choose_present_mode(false, false, true), PresentMode::Immediate);
        assert_eq!(choose_present_mode(false, true, false), PresentMode::Fifo);
    }
}
