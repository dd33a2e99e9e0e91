//! Translation of public render state into native pipeline state.
//!
//! Every table is indexed by the discriminant of the public enum, so the
//! translation stays total: adding a variant without a table entry fails to
//! compile. Entries holding `None` have no native equivalent and surface as
//! [`GraphicsError::UnsupportedFormat`].

use ember_core::{
    BlendFactor, BlendMode, BlendOp, CullMode, DepthCompare, TextureFilter, TextureSampler,
    TextureWrap, VertexFormat, VertexType,
};

use crate::error::GraphicsError;
use crate::types::{
    AddressMode, BlendComponent, BlendState, ColorWrites, CompareFunction, Face, FilterMode,
    GpuBlendFactor, GpuBlendOperation, SamplerDescriptor, TextureFormat, VertexAttribute,
    VertexAttributeFormat, VertexBufferLayout,
};

/// `[element type][normalized]`. Float types ignore the flag.
const VERTEX_FORMATS: [[VertexAttributeFormat; 2]; VertexType::ALL.len()] = {
    use VertexAttributeFormat as F;
    [
        [F::Float32, F::Float32],
        [F::Float32x2, F::Float32x2],
        [F::Float32x3, F::Float32x3],
        [F::Float32x4, F::Float32x4],
        [F::Sint8x4, F::Snorm8x4],
        [F::Uint8x4, F::Unorm8x4],
        [F::Sint16x2, F::Snorm16x2],
        [F::Uint16x2, F::Unorm16x2],
        [F::Sint16x4, F::Snorm16x4],
        [F::Uint16x4, F::Unorm16x4],
    ]
};

const BLEND_FACTORS: [Option<GpuBlendFactor>; 19] = {
    use GpuBlendFactor as F;
    [
        Some(F::Zero),
        Some(F::One),
        Some(F::Src),
        Some(F::OneMinusSrc),
        Some(F::Dst),
        Some(F::OneMinusDst),
        Some(F::SrcAlpha),
        Some(F::OneMinusSrcAlpha),
        Some(F::DstAlpha),
        Some(F::OneMinusDstAlpha),
        Some(F::Constant),
        Some(F::OneMinusConstant),
        // ConstantAlpha, OneMinusConstantAlpha
        None,
        None,
        Some(F::SrcAlphaSaturated),
        // Dual-source factors
        None,
        None,
        None,
        None,
    ]
};

const BLEND_OPS: [GpuBlendOperation; 5] = [
    GpuBlendOperation::Add,
    GpuBlendOperation::Subtract,
    GpuBlendOperation::ReverseSubtract,
    GpuBlendOperation::Min,
    GpuBlendOperation::Max,
];

const COMPARE_FUNCTIONS: [CompareFunction; 8] = [
    CompareFunction::Always,
    CompareFunction::Never,
    CompareFunction::Less,
    CompareFunction::Equal,
    CompareFunction::LessEqual,
    CompareFunction::Greater,
    CompareFunction::NotEqual,
    CompareFunction::GreaterEqual,
];

const CULL_FACES: [Option<Face>; 3] = [None, Some(Face::Front), Some(Face::Back)];

const FILTERS: [FilterMode; 2] = [FilterMode::Nearest, FilterMode::Linear];

const WRAPS: [AddressMode; 3] = [
    AddressMode::Repeat,
    AddressMode::MirrorRepeat,
    AddressMode::ClampToEdge,
];

pub fn vertex_attribute_format(ty: VertexType, normalized: bool) -> VertexAttributeFormat {
    VERTEX_FORMATS[ty as usize][normalized as usize]
}

/// Attributes of `format` with byte offsets accumulated in declaration order.
pub fn vertex_layout(format: &VertexFormat) -> VertexBufferLayout {
    VertexBufferLayout {
        stride: format.stride() as u64,
        attributes: format
            .offsets()
            .map(|(element, offset)| VertexAttribute {
                format: vertex_attribute_format(element.ty, element.normalized),
                offset: offset as u64,
                location: element.index,
            })
            .collect(),
    }
}

pub fn blend_factor(factor: BlendFactor) -> Result<GpuBlendFactor, GraphicsError> {
    BLEND_FACTORS[factor as usize]
        .ok_or_else(|| GraphicsError::UnsupportedFormat(format!("blend factor {factor:?}")))
}

pub fn blend_operation(op: BlendOp) -> GpuBlendOperation {
    BLEND_OPS[op as usize]
}

/// Color and alpha blend equations of `mode`.
pub fn blend_state(mode: BlendMode) -> Result<BlendState, GraphicsError> {
    Ok(BlendState {
        color: BlendComponent {
            src_factor: blend_factor(mode.color_src)?,
            dst_factor: blend_factor(mode.color_dst)?,
            operation: blend_operation(mode.color_op),
        },
        alpha: BlendComponent {
            src_factor: blend_factor(mode.alpha_src)?,
            dst_factor: blend_factor(mode.alpha_dst)?,
            operation: blend_operation(mode.alpha_op),
        },
    })
}

pub fn color_writes(mode: BlendMode) -> ColorWrites {
    ColorWrites::from_bits_truncate(mode.mask.bits() as u32)
}

pub fn compare_function(compare: DepthCompare) -> CompareFunction {
    COMPARE_FUNCTIONS[compare as usize]
}

pub fn cull_face(cull: CullMode) -> Option<Face> {
    CULL_FACES[cull as usize]
}

pub fn filter_mode(filter: TextureFilter) -> FilterMode {
    FILTERS[filter as usize]
}

pub fn address_mode(wrap: TextureWrap) -> AddressMode {
    WRAPS[wrap as usize]
}

/// Native sampler for `sampler`: one filter for min, mag and mips, `w` repeats.
pub fn sampler_descriptor(sampler: TextureSampler) -> SamplerDescriptor {
    SamplerDescriptor::new()
        .with_filter(filter_mode(sampler.filter))
        .with_address_modes(
            address_mode(sampler.wrap_x),
            address_mode(sampler.wrap_y),
            AddressMode::Repeat,
        )
}

/// Native format of a public texture format.
///
/// Depth textures use whichever combined depth/stencil format the device
/// was found to support.
pub fn texture_format(format: ember_core::TextureFormat, depth_format: TextureFormat) -> TextureFormat {
    match format {
        ember_core::TextureFormat::R8G8B8A8 => TextureFormat::Rgba8Unorm,
        ember_core::TextureFormat::R8 => TextureFormat::R8Unorm,
        ember_core::TextureFormat::Depth24Stencil8 => depth_format,
    }
}
