//! Filter and wrap modes for texture sampling.

/// Texture filtering mode, used for minification, magnification and mipmaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    #[default]
    Nearest,
    Linear,
}

/// Wrapping behavior outside the `[0, 1]` coordinate range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureWrap {
    #[default]
    Repeat,
    MirroredRepeat,
    Clamp,
}

/// Sampler configuration. Equal samplers share one native sampler object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureSampler {
    pub filter: TextureFilter,
    pub wrap_x: TextureWrap,
    pub wrap_y: TextureWrap,
}

impl TextureSampler {
    pub const fn new(filter: TextureFilter, wrap_x: TextureWrap, wrap_y: TextureWrap) -> Self {
        Self {
            filter,
            wrap_x,
            wrap_y,
        }
    }

    /// Linear filtering, clamped on both axes.
    pub const fn linear_clamp() -> Self {
        Self::new(TextureFilter::Linear, TextureWrap::Clamp, TextureWrap::Clamp)
    }

    /// Nearest filtering, repeating on both axes.
    pub const fn nearest_repeat() -> Self {
        Self::new(TextureFilter::Nearest, TextureWrap::Repeat, TextureWrap::Repeat)
    }
}
