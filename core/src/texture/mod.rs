//! Public texture format enum shared by the renderer and its callers.

/// Pixel format of a texture as seen by applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    #[default]
    R8G8B8A8,
    R8,
    Depth24Stencil8,
}

impl TextureFormat {
    /// Bytes per texel in tightly packed upload payloads.
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8G8B8A8 | Self::Depth24Stencil8 => 4,
            Self::R8 => 1,
        }
    }

    pub const fn is_depth_stencil(self) -> bool {
        matches!(self, Self::Depth24Stencil8)
    }

    /// Size of a tightly packed `width x height` payload.
    pub const fn footprint(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::rgba(TextureFormat::R8G8B8A8, 64, 64, 64 * 64 * 4)]
    #[case::single_channel(TextureFormat::R8, 3, 5, 15)]
    #[case::depth(TextureFormat::Depth24Stencil8, 2, 2, 16)]
    fn test_footprint(
        #[case] format: TextureFormat,
        #[case] width: u32,
        #[case] height: u32,
        #[case] expected: usize,
    ) {
        assert_eq!(format.footprint(width, height), expected);
    }

    #[test]
    fn test_depth_stencil_flag() {
        assert!(TextureFormat::Depth24Stencil8.is_depth_stencil());
        assert!(!TextureFormat::R8.is_depth_stencil());
    }
}
