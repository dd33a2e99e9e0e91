//! Texture records.

use ember_core::TextureFormat;

use super::{DeviceId, DeviceResource};
use crate::backend::GpuTexture;
use crate::types;

/// A GPU texture owned by the registry.
///
/// # Example
///
/// ```ignore
/// let handle = renderer.create_texture(64, 64, TextureFormat::R8G8B8A8, false)?;
/// let record = registry.texture(handle, device)?;
/// assert_eq!((record.width(), record.height()), (64, 64));
/// ```
pub struct TextureRecord {
    device: DeviceId,
    pub(crate) gpu: GpuTexture,
    width: u32,
    height: u32,
    format: TextureFormat,
    native_format: types::TextureFormat,
    is_target: bool,
}

impl TextureRecord {
    pub(crate) fn new(
        device: DeviceId,
        gpu: GpuTexture,
        width: u32,
        height: u32,
        format: TextureFormat,
        native_format: types::TextureFormat,
        is_target: bool,
    ) -> Self {
        Self {
            device,
            gpu,
            width,
            height,
            format,
            native_format,
            is_target,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Format the backend allocated the texture with.
    pub fn native_format(&self) -> types::TextureFormat {
        self.native_format
    }

    /// Whether the texture can be attached to a render target.
    pub fn is_target(&self) -> bool {
        self.is_target
    }

    /// Tightly packed size of the texture contents in bytes.
    pub fn footprint(&self) -> usize {
        self.format.footprint(self.width, self.height)
    }
}

impl DeviceResource for TextureRecord {
    fn device(&self) -> DeviceId {
        self.device
    }
}

impl std::fmt::Debug for TextureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureRecord")
            .field("device", &self.device)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("is_target", &self.is_target)
            .finish()
    }
}

static_assertions::assert_impl_all!(TextureRecord: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    fn record(format: TextureFormat) -> TextureRecord {
        TextureRecord::new(
            DeviceId::next(),
            GpuTexture::Dummy { id: 1 },
            800,
            600,
            format,
            types::TextureFormat::Rgba8Unorm,
            false,
        )
    }

    #[test]
    fn test_texture_debug() {
        let debug = format!("{:?}", record(TextureFormat::R8G8B8A8));
        assert!(debug.contains("TextureRecord"));
        assert!(debug.contains("800"));
    }

    #[test]
    fn test_footprint() {
        assert_eq!(record(TextureFormat::R8G8B8A8).footprint(), 800 * 600 * 4);
        assert_eq!(record(TextureFormat::R8).footprint(), 800 * 600);
    }
}
