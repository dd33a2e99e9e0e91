//! Type conversions between Ember types and wgpu types.

use ember_core::{Color, IndexFormat};

use crate::instance::PresentMode;
use crate::types::{
    AddressMode, BlendComponent, BlendState, BufferUsage, ColorWrites, CompareFunction, Face,
    FilterMode, GpuBlendFactor, GpuBlendOperation, LoadOp, TextureFormat, TextureUsage,
    VertexAttributeFormat,
};

/// Convert BufferUsage flags to wgpu buffer usages.
pub fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut result = wgpu::BufferUsages::empty();

    if usage.contains(BufferUsage::VERTEX) {
        result |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= wgpu::BufferUsages::COPY_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        result |= wgpu::BufferUsages::COPY_DST;
    }

    result
}

/// Convert TextureFormat to wgpu format.
pub fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        TextureFormat::Depth32FloatStencil8 => wgpu::TextureFormat::Depth32FloatStencil8,
    }
}

/// Map a surface format back to ours. Formats we never render to yield `None`.
pub fn texture_format_from_wgpu(format: wgpu::TextureFormat) -> Option<TextureFormat> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm => Some(TextureFormat::Rgba8Unorm),
        wgpu::TextureFormat::Rgba8UnormSrgb => Some(TextureFormat::Rgba8UnormSrgb),
        wgpu::TextureFormat::Bgra8Unorm => Some(TextureFormat::Bgra8Unorm),
        wgpu::TextureFormat::Bgra8UnormSrgb => Some(TextureFormat::Bgra8UnormSrgb),
        _ => None,
    }
}

/// Convert TextureUsage flags to wgpu texture usages.
pub fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut result = wgpu::TextureUsages::empty();

    if usage.contains(TextureUsage::SAMPLER) {
        result |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        result |= wgpu::TextureUsages::COPY_DST;
    }
    if usage.contains(TextureUsage::COPY_SRC) {
        result |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.intersects(TextureUsage::COLOR_TARGET | TextureUsage::DEPTH_STENCIL_TARGET) {
        result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }

    result
}

pub fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

pub fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

pub fn convert_mipmap_filter_mode(mode: FilterMode) -> wgpu::MipmapFilterMode {
    match mode {
        FilterMode::Nearest => wgpu::MipmapFilterMode::Nearest,
        FilterMode::Linear => wgpu::MipmapFilterMode::Linear,
    }
}

pub fn convert_compare_function(func: CompareFunction) -> wgpu::CompareFunction {
    match func {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

pub fn convert_face(face: Face) -> wgpu::Face {
    match face {
        Face::Front => wgpu::Face::Front,
        Face::Back => wgpu::Face::Back,
    }
}

pub fn convert_vertex_format(format: VertexAttributeFormat) -> wgpu::VertexFormat {
    match format {
        VertexAttributeFormat::Float32 => wgpu::VertexFormat::Float32,
        VertexAttributeFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexAttributeFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        VertexAttributeFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        VertexAttributeFormat::Sint8x4 => wgpu::VertexFormat::Sint8x4,
        VertexAttributeFormat::Snorm8x4 => wgpu::VertexFormat::Snorm8x4,
        VertexAttributeFormat::Uint8x4 => wgpu::VertexFormat::Uint8x4,
        VertexAttributeFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
        VertexAttributeFormat::Sint16x2 => wgpu::VertexFormat::Sint16x2,
        VertexAttributeFormat::Snorm16x2 => wgpu::VertexFormat::Snorm16x2,
        VertexAttributeFormat::Uint16x2 => wgpu::VertexFormat::Uint16x2,
        VertexAttributeFormat::Unorm16x2 => wgpu::VertexFormat::Unorm16x2,
        VertexAttributeFormat::Sint16x4 => wgpu::VertexFormat::Sint16x4,
        VertexAttributeFormat::Snorm16x4 => wgpu::VertexFormat::Snorm16x4,
        VertexAttributeFormat::Uint16x4 => wgpu::VertexFormat::Uint16x4,
        VertexAttributeFormat::Unorm16x4 => wgpu::VertexFormat::Unorm16x4,
    }
}

pub fn convert_index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::Sixteen => wgpu::IndexFormat::Uint16,
        IndexFormat::ThirtyTwo => wgpu::IndexFormat::Uint32,
    }
}

fn convert_blend_factor(factor: GpuBlendFactor) -> wgpu::BlendFactor {
    match factor {
        GpuBlendFactor::Zero => wgpu::BlendFactor::Zero,
        GpuBlendFactor::One => wgpu::BlendFactor::One,
        GpuBlendFactor::Src => wgpu::BlendFactor::Src,
        GpuBlendFactor::OneMinusSrc => wgpu::BlendFactor::OneMinusSrc,
        GpuBlendFactor::Dst => wgpu::BlendFactor::Dst,
        GpuBlendFactor::OneMinusDst => wgpu::BlendFactor::OneMinusDst,
        GpuBlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        GpuBlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        GpuBlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        GpuBlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        GpuBlendFactor::Constant => wgpu::BlendFactor::Constant,
        GpuBlendFactor::OneMinusConstant => wgpu::BlendFactor::OneMinusConstant,
        GpuBlendFactor::SrcAlphaSaturated => wgpu::BlendFactor::SrcAlphaSaturated,
    }
}

fn convert_blend_operation(op: GpuBlendOperation) -> wgpu::BlendOperation {
    match op {
        GpuBlendOperation::Add => wgpu::BlendOperation::Add,
        GpuBlendOperation::Subtract => wgpu::BlendOperation::Subtract,
        GpuBlendOperation::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
        GpuBlendOperation::Min => wgpu::BlendOperation::Min,
        GpuBlendOperation::Max => wgpu::BlendOperation::Max,
    }
}

fn convert_blend_component(component: BlendComponent) -> wgpu::BlendComponent {
    // wgpu requires One/One factors for min and max.
    let (src_factor, dst_factor) = match component.operation {
        GpuBlendOperation::Min | GpuBlendOperation::Max => {
            (wgpu::BlendFactor::One, wgpu::BlendFactor::One)
        }
        _ => (
            convert_blend_factor(component.src_factor),
            convert_blend_factor(component.dst_factor),
        ),
    };
    wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: convert_blend_operation(component.operation),
    }
}

pub fn convert_blend_state(blend: BlendState) -> wgpu::BlendState {
    wgpu::BlendState {
        color: convert_blend_component(blend.color),
        alpha: convert_blend_component(blend.alpha),
    }
}

pub fn convert_color_writes(mask: ColorWrites) -> wgpu::ColorWrites {
    let mut result = wgpu::ColorWrites::empty();
    if mask.contains(ColorWrites::RED) {
        result |= wgpu::ColorWrites::RED;
    }
    if mask.contains(ColorWrites::GREEN) {
        result |= wgpu::ColorWrites::GREEN;
    }
    if mask.contains(ColorWrites::BLUE) {
        result |= wgpu::ColorWrites::BLUE;
    }
    if mask.contains(ColorWrites::ALPHA) {
        result |= wgpu::ColorWrites::ALPHA;
    }
    result
}

pub fn convert_color_load_op(op: LoadOp<Color>) -> wgpu::LoadOp<wgpu::Color> {
    match op {
        LoadOp::Load => wgpu::LoadOp::Load,
        LoadOp::Clear(c) => wgpu::LoadOp::Clear(wgpu::Color {
            r: c.r as f64,
            g: c.g as f64,
            b: c.b as f64,
            a: c.a as f64,
        }),
    }
}

pub fn convert_load_op<T: Copy>(op: LoadOp<T>) -> wgpu::LoadOp<T> {
    match op {
        LoadOp::Load => wgpu::LoadOp::Load,
        LoadOp::Clear(value) => wgpu::LoadOp::Clear(value),
    }
}

pub fn convert_present_mode(mode: PresentMode) -> wgpu::PresentMode {
    match mode {
        PresentMode::Fifo => wgpu::PresentMode::Fifo,
        PresentMode::Mailbox => wgpu::PresentMode::Mailbox,
        PresentMode::Immediate => wgpu::PresentMode::Immediate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_blend_forces_one_factors() {
        let component = BlendComponent {
            src_factor: GpuBlendFactor::SrcAlpha,
            dst_factor: GpuBlendFactor::Zero,
            operation: GpuBlendOperation::Max,
        };
        let converted = convert_blend_component(component);
        assert_eq!(converted.src_factor, wgpu::BlendFactor::One);
        assert_eq!(converted.dst_factor, wgpu::BlendFactor::One);
    }

    #[test]
    fn test_surface_format_round_trip() {
        let format = convert_texture_format(TextureFormat::Bgra8UnormSrgb);
        assert_eq!(
            texture_format_from_wgpu(format),
            Some(TextureFormat::Bgra8UnormSrgb)
        );
        assert_eq!(texture_format_from_wgpu(wgpu::TextureFormat::Rgba16Float), None);
    }
}
