//! Fixed-function render state carried by draw commands.

use bitflags::bitflags;

/// Source or destination factor of a blend equation.
///
/// The constant-alpha and dual-source factors are part of the public vocabulary
/// but have no native mapping; pipelines using them fail to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
    Src1Color,
    OneMinusSrc1Color,
    Src1Alpha,
    OneMinusSrc1Alpha,
}

/// Blend equation operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    /// Color channels written by a draw.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BlendMask: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const RGB = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits();
        const RGBA = Self::RGB.bits() | Self::ALPHA.bits();
    }
}

impl Default for BlendMask {
    fn default() -> Self {
        Self::RGBA
    }
}

/// Blend equations for color and alpha plus the channel write mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendMode {
    pub color_src: BlendFactor,
    pub color_dst: BlendFactor,
    pub color_op: BlendOp,
    pub alpha_src: BlendFactor,
    pub alpha_dst: BlendFactor,
    pub alpha_op: BlendOp,
    pub mask: BlendMask,
}

impl BlendMode {
    pub const PREMULTIPLY: Self = Self::uniform(BlendOp::Add, BlendFactor::One, BlendFactor::OneMinusSrcAlpha);
    pub const NON_PREMULTIPLY: Self =
        Self::uniform(BlendOp::Add, BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
    pub const ADD: Self = Self::uniform(BlendOp::Add, BlendFactor::One, BlendFactor::DstAlpha);
    pub const SUBTRACT: Self =
        Self::uniform(BlendOp::ReverseSubtract, BlendFactor::One, BlendFactor::One);
    pub const MULTIPLY: Self =
        Self::uniform(BlendOp::Add, BlendFactor::DstColor, BlendFactor::OneMinusSrcAlpha);
    pub const SCREEN: Self =
        Self::uniform(BlendOp::Add, BlendFactor::One, BlendFactor::OneMinusSrcColor);

    /// Same factors and operator for color and alpha, all channels written.
    pub const fn uniform(op: BlendOp, src: BlendFactor, dst: BlendFactor) -> Self {
        Self {
            color_src: src,
            color_dst: dst,
            color_op: op,
            alpha_src: src,
            alpha_dst: dst,
            alpha_op: op,
            mask: BlendMask::RGBA,
        }
    }

    pub const fn with_mask(mut self, mask: BlendMask) -> Self {
        self.mask = mask;
        self
    }
}

impl Default for BlendMode {
    fn default() -> Self {
        Self::PREMULTIPLY
    }
}

/// Which triangle faces are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

/// Depth test comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthCompare {
    #[default]
    Always,
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
}

bitflags! {
    /// Aspects of a render target that a clear resets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClearMask: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
        const ALL = Self::COLOR.bits() | Self::DEPTH.bits() | Self::STENCIL.bits();
    }
}
