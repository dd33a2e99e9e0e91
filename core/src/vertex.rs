//! Vertex and index layout metadata.
//!
//! A [`VertexFormat`] describes the binary layout of a single vertex. Formats
//! are compared structurally: two formats are equal when their strides and
//! element sequences match, regardless of where they were built.

/// Component type of a single vertex element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexType {
    Float,
    Float2,
    Float3,
    Float4,
    Byte4,
    UByte4,
    Short2,
    UShort2,
    Short4,
    UShort4,
}

impl VertexType {
    /// All element types, in discriminant order.
    pub const ALL: [VertexType; 10] = [
        Self::Float,
        Self::Float2,
        Self::Float3,
        Self::Float4,
        Self::Byte4,
        Self::UByte4,
        Self::Short2,
        Self::UShort2,
        Self::Short4,
        Self::UShort4,
    ];

    pub const fn size_in_bytes(self) -> u32 {
        match self {
            Self::Float => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
            Self::Byte4 | Self::UByte4 => 4,
            Self::Short2 | Self::UShort2 => 4,
            Self::Short4 | Self::UShort4 => 8,
        }
    }
}

/// One attribute of a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    /// Shader input slot the element is bound to.
    pub index: u32,
    pub ty: VertexType,
    /// Integer types are read as normalized floats when set. Ignored for float types.
    pub normalized: bool,
}

impl VertexElement {
    pub const fn new(index: u32, ty: VertexType) -> Self {
        Self {
            index,
            ty,
            normalized: true,
        }
    }

    pub const fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }
}

/// Immutable layout of one vertex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexFormat {
    elements: Vec<VertexElement>,
    stride: u32,
}

impl VertexFormat {
    /// Builds a tightly packed format; the stride is the sum of the element sizes.
    pub fn new(elements: impl Into<Vec<VertexElement>>) -> Self {
        let elements = elements.into();
        let stride = elements.iter().map(|e| e.ty.size_in_bytes()).sum();
        Self { elements, stride }
    }

    /// Builds a format with an explicit stride, for padded or interleaved data.
    pub fn with_stride(elements: impl Into<Vec<VertexElement>>, stride: u32) -> Self {
        Self {
            elements: elements.into(),
            stride,
        }
    }

    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Byte offset of every element, accumulated in declaration order.
    pub fn offsets(&self) -> impl Iterator<Item = (VertexElement, u32)> + '_ {
        self.elements.iter().scan(0u32, |offset, element| {
            let current = *offset;
            *offset += element.ty.size_in_bytes();
            Some((*element, current))
        })
    }
}

/// Width of the elements in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    #[default]
    Sixteen,
    ThirtyTwo,
}

impl IndexFormat {
    pub const fn size_in_bytes(self) -> u32 {
        match self {
            Self::Sixteen => 2,
            Self::ThirtyTwo => 4,
        }
    }
}
