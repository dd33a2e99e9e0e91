//! Command line arguments shared by the demos.

use clap::Parser;
use ember_graphics::{BackendType, InstanceParameters, WgpuBackendType};

// ============================================================================
// CLI Backend Selection
// ============================================================================

/// Graphics backend selection for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliBackend {
    /// Use wgpu if an adapter is available, the dummy backend otherwise.
    #[default]
    Auto,
    /// Cross-platform backend via wgpu.
    Wgpu,
    /// No-op backend for testing and CI environments.
    Dummy,
}

impl From<CliBackend> for BackendType {
    fn from(cli: CliBackend) -> Self {
        match cli {
            CliBackend::Auto => BackendType::Auto,
            CliBackend::Wgpu => BackendType::Wgpu,
            CliBackend::Dummy => BackendType::Dummy,
        }
    }
}

/// GPU API selection for the wgpu backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliGpuApi {
    /// Platform default (Metal on macOS, Vulkan on Linux, DirectX 12 on Windows).
    #[default]
    Auto,
    Vulkan,
    Metal,
    Dx12,
    /// OpenGL fallback.
    Gl,
}

impl From<CliGpuApi> for WgpuBackendType {
    fn from(cli: CliGpuApi) -> Self {
        match cli {
            CliGpuApi::Auto => WgpuBackendType::Auto,
            CliGpuApi::Vulkan => WgpuBackendType::Vulkan,
            CliGpuApi::Metal => WgpuBackendType::Metal,
            CliGpuApi::Dx12 => WgpuBackendType::Dx12,
            CliGpuApi::Gl => WgpuBackendType::Gl,
        }
    }
}

// ============================================================================
// Demo Args
// ============================================================================

/// Ember demo arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    about = "Ember renderer demo",
    long_about = "A demo program for the Ember renderer.\n\n\
        EXAMPLES:\n\
          # Use wgpu with the platform default API\n\
          ./triangle --backend wgpu\n\
        \n\
          # Run against the dummy backend for a few frames\n\
          ./triangle --backend dummy --max-frames 10",
    version
)]
pub struct DemoArgs {
    /// Graphics backend to use.
    #[arg(long, default_value = "auto", value_enum)]
    pub backend: CliBackend,

    /// GPU API for the wgpu backend.
    #[arg(long, default_value = "auto", value_enum)]
    pub gpu_api: CliGpuApi,

    /// Initial window width in pixels.
    #[arg(long, default_value = "1280")]
    pub width: u32,

    /// Initial window height in pixels.
    #[arg(long, default_value = "720")]
    pub height: u32,

    /// Disable vertical sync (may cause tearing).
    #[arg(long)]
    pub no_vsync: bool,

    /// Exit after rendering N frames.
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// Frames the CPU may run ahead of the GPU.
    #[arg(long, default_value_t = InstanceParameters::DEFAULT_FRAMES_IN_FLIGHT)]
    pub frames_in_flight: usize,

    /// Enable GPU validation (slower but helps catch bugs).
    #[arg(long)]
    pub validation: bool,
}

impl DemoArgs {
    /// Device parameters for these arguments.
    pub fn instance_parameters(&self) -> InstanceParameters {
        if self.gpu_api != CliGpuApi::Auto && self.backend == CliBackend::Dummy {
            log::warn!("--gpu-api has no effect with the dummy backend");
        }
        InstanceParameters::new()
            .with_backend(self.backend.into())
            .with_wgpu_backend(self.gpu_api.into())
            .with_validation(self.validation)
            .with_frames_in_flight(self.frames_in_flight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let args = DemoArgs::parse_from(["triangle"]);
        assert_eq!(args.backend, CliBackend::Auto);
        assert_eq!((args.width, args.height), (1280, 720));
        assert!(!args.no_vsync);
        assert_eq!(args.max_frames, None);
    }

    #[test]
    fn test_instance_parameters() {
        let args = DemoArgs::parse_from([
            "triangle",
            "--backend",
            "dummy",
            "--frames-in-flight",
            "2",
            "--max-frames",
            "5",
        ]);
        let params = args.instance_parameters();
        assert_eq!(params.backend, BackendType::Dummy);
        assert_eq!(params.frames_in_flight, 2);
        assert_eq!(args.max_frames, Some(5));
    }
}
