//! wgpu surface handling.
//!
//! A windowed target gets a `wgpu::Surface`; a headless target renders into
//! an offscreen texture that stands in for the swapchain image. Changes to the
//! present mode or size are applied immediately when no image is held and
//! otherwise deferred to the next acquire.

use super::WgpuBackend;
use super::conversion::{convert_present_mode, convert_texture_format, texture_format_from_wgpu};
use crate::error::GraphicsError;
use crate::instance::PresentMode;
use crate::swapchain::SurfaceTarget;
use crate::types::TextureFormat;

const HEADLESS_FORMAT: TextureFormat = TextureFormat::Bgra8Unorm;

enum SurfaceKind {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        present_modes: Vec<wgpu::PresentMode>,
    },
    Headless {
        view: wgpu::TextureView,
    },
}

struct HeldImage {
    /// `None` for headless targets.
    texture: Option<wgpu::SurfaceTexture>,
    view: wgpu::TextureView,
}

pub(super) struct SurfaceState {
    kind: SurfaceKind,
    format: TextureFormat,
    width: u32,
    height: u32,
    held: Option<HeldImage>,
    needs_configure: bool,
}

impl WgpuBackend {
    fn create_headless_image(&self, width: u32, height: u32) -> wgpu::TextureView {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Headless Swapchain"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert_texture_format(HEADLESS_FORMAT),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub fn claim_surface(&self, target: &SurfaceTarget) -> Result<(), GraphicsError> {
        let mut slot = self.surface.lock();
        if slot.is_some() {
            return Err(GraphicsError::CreationFailed("surface already claimed".into()));
        }
        let (width, height) = target.size();

        let (kind, format) = match &target.window {
            Some(window) => {
                let surface = self
                    .instance
                    .create_surface(window.clone())
                    .map_err(|e| GraphicsError::CreationFailed(format!("Surface creation failed: {e}")))?;
                let caps = surface.get_capabilities(&self.adapter);
                let (wgpu_format, format) = [
                    wgpu::TextureFormat::Bgra8Unorm,
                    wgpu::TextureFormat::Rgba8Unorm,
                ]
                .into_iter()
                .chain(caps.formats.iter().copied())
                .filter(|f| caps.formats.contains(f))
                .find_map(|f| texture_format_from_wgpu(f).map(|ours| (f, ours)))
                .ok_or_else(|| {
                    GraphicsError::UnsupportedFormat(format!(
                        "no usable surface format in {:?}",
                        caps.formats
                    ))
                })?;
                let alpha_mode = caps
                    .alpha_modes
                    .first()
                    .copied()
                    .unwrap_or(wgpu::CompositeAlphaMode::Auto);
                let config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format: wgpu_format,
                    width,
                    height,
                    present_mode: wgpu::PresentMode::Fifo,
                    alpha_mode,
                    view_formats: vec![],
                    desired_maximum_frame_latency: 2,
                };
                surface.configure(&self.device, &config);
                log::info!("Configured wgpu surface {width}x{height} {format:?}");
                (
                    SurfaceKind::Window {
                        surface,
                        config,
                        present_modes: caps.present_modes,
                    },
                    format,
                )
            }
            None => {
                let view = self.create_headless_image(width, height);
                log::info!("Created headless swapchain {width}x{height}");
                (SurfaceKind::Headless { view }, HEADLESS_FORMAT)
            }
        };

        *slot = Some(SurfaceState {
            kind,
            format,
            width,
            height,
            held: None,
            needs_configure: false,
        });
        Ok(())
    }

    pub fn release_surface(&self) {
        if self.surface.lock().take().is_some() {
            log::info!("Released wgpu surface");
        }
    }

    pub fn swapchain_format(&self) -> Option<TextureFormat> {
        self.surface.lock().as_ref().map(|s| s.format)
    }

    pub fn supports_present_mode(&self, mode: PresentMode) -> bool {
        match self.surface.lock().as_ref().map(|s| &s.kind) {
            Some(SurfaceKind::Window { present_modes, .. }) => {
                present_modes.contains(&convert_present_mode(mode))
            }
            Some(SurfaceKind::Headless { .. }) => true,
            None => mode == PresentMode::Fifo,
        }
    }

    pub fn set_present_mode(&self, mode: PresentMode) -> Result<(), GraphicsError> {
        if !self.supports_present_mode(mode) {
            return Err(GraphicsError::UnsupportedFormat(format!("present mode {mode:?}")));
        }
        let mut slot = self.surface.lock();
        let state = slot.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        if let SurfaceKind::Window { config, .. } = &mut state.kind {
            config.present_mode = convert_present_mode(mode);
            state.needs_configure = true;
        }
        self.apply_surface_config(state);
        Ok(())
    }

    pub fn resize_surface(&self, width: u32, height: u32) -> Result<(), GraphicsError> {
        let mut slot = self.surface.lock();
        let state = slot.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        state.width = width.max(1);
        state.height = height.max(1);
        match &mut state.kind {
            SurfaceKind::Window { config, .. } => {
                config.width = state.width;
                config.height = state.height;
            }
            SurfaceKind::Headless { view } => {
                *view = self.create_headless_image(state.width, state.height);
            }
        }
        state.needs_configure = true;
        self.apply_surface_config(state);
        Ok(())
    }

    /// Reconfigure the window surface if a change is pending and no image is held.
    fn apply_surface_config(&self, state: &mut SurfaceState) {
        if !state.needs_configure || state.held.is_some() {
            return;
        }
        if let SurfaceKind::Window {
            surface, config, ..
        } = &state.kind
        {
            surface.configure(&self.device, config);
        }
        state.needs_configure = false;
    }

    pub fn acquire_swapchain_texture(&self) -> Result<Option<(u32, u32)>, GraphicsError> {
        let mut slot = self.surface.lock();
        let state = slot.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        if state.held.is_some() {
            return Ok(Some((state.width, state.height)));
        }
        self.apply_surface_config(state);

        let held = match &state.kind {
            SurfaceKind::Headless { view } => HeldImage {
                texture: None,
                view: view.clone(),
            },
            SurfaceKind::Window {
                surface, config, ..
            } => match surface.get_current_texture() {
                Ok(frame) => {
                    let view = frame
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default());
                    HeldImage {
                        texture: Some(frame),
                        view,
                    }
                }
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    log::warn!("Surface lost or outdated, reconfiguring");
                    surface.configure(&self.device, config);
                    return Ok(None);
                }
                Err(wgpu::SurfaceError::Timeout) => return Ok(None),
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    return Err(GraphicsError::CreationFailed(
                        "out of memory acquiring swapchain image".into(),
                    ));
                }
                Err(e) => {
                    log::warn!("Failed to acquire swapchain image: {e}");
                    return Ok(None);
                }
            },
        };
        state.held = Some(held);
        Ok(Some((state.width, state.height)))
    }

    /// View of the held swapchain image, if any.
    pub(super) fn swapchain_view(&self) -> Option<wgpu::TextureView> {
        self.surface
            .lock()
            .as_ref()
            .and_then(|s| s.held.as_ref())
            .map(|held| held.view.clone())
    }

    pub fn present(&self) {
        let mut slot = self.surface.lock();
        let Some(state) = slot.as_mut() else {
            return;
        };
        if let Some(held) = state.held.take()
            && let Some(frame) = held.texture
        {
            frame.present();
        }
        self.apply_surface_config(state);
    }
}
