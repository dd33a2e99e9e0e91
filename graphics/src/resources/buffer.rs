//! Mesh buffers.

use std::sync::atomic::{AtomicU64, Ordering};

use ember_core::{IndexFormat, VertexFormat};

use super::{DeviceId, DeviceResource};
use crate::backend::GpuBuffer;

/// Capacity a buffer grows to when `required` bytes no longer fit.
///
/// Starts from `max(current, 8)` and doubles until the payload fits.
pub fn grown_capacity(current: u64, required: u64) -> u64 {
    let mut capacity = current.max(8);
    while capacity < required {
        capacity *= 2;
    }
    capacity
}

/// One GPU buffer of a mesh.
///
/// Buffers are reallocated, never shrunk, when a write no longer fits;
/// reallocation discards the previous contents.
///
/// A CPU copy of the contents is kept so writes whose length is not a
/// multiple of the copy alignment can be padded with the bytes already in
/// the buffer rather than zeros.
pub struct BufferRecord {
    pub(crate) gpu: GpuBuffer,
    capacity: u64,
    shadow: Vec<u8>,
    /// Set by every write; cleared when the draw executor rebinds the mesh.
    pub(crate) dirty: bool,
    serial: u64,
}

impl BufferRecord {
    pub(crate) fn new(gpu: GpuBuffer, capacity: u64) -> Self {
        static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);
        Self {
            gpu,
            capacity,
            shadow: vec![0; capacity as usize],
            dirty: true,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn gpu(&self) -> &GpuBuffer {
        &self.gpu
    }

    /// Size in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Identity of the native allocation; changes when the buffer grows.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn fits(&self, end: u64) -> bool {
        end <= self.capacity
    }

    /// Record `data` at `offset` in the CPU copy of the contents.
    pub(crate) fn record_write(&mut self, offset: u64, data: &[u8]) {
        let start = offset as usize;
        self.shadow[start..start + data.len()].copy_from_slice(data);
    }

    /// The current contents of `len` bytes at `offset`.
    pub(crate) fn contents(&self, offset: u64, len: u64) -> &[u8] {
        &self.shadow[offset as usize..(offset + len) as usize]
    }
}

impl std::fmt::Debug for BufferRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferRecord")
            .field("capacity", &self.capacity)
            .field("dirty", &self.dirty)
            .field("serial", &self.serial)
            .finish()
    }
}

/// Which buffer of a mesh a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshBuffer {
    Vertex,
    Index,
    Instance,
}

impl MeshBuffer {
    pub fn label(self) -> &'static str {
        match self {
            Self::Vertex => "Mesh Vertices",
            Self::Index => "Mesh Indices",
            Self::Instance => "Mesh Instances",
        }
    }
}

/// Drawable geometry: vertex, index and optional instance buffers.
#[derive(Debug)]
pub struct MeshRecord {
    device: DeviceId,
    pub(crate) vertex: Option<BufferRecord>,
    pub(crate) index: Option<BufferRecord>,
    pub(crate) instance: Option<BufferRecord>,
    pub(crate) index_format: IndexFormat,
    pub(crate) vertex_format: Option<VertexFormat>,
    pub(crate) instance_format: Option<VertexFormat>,
}

impl MeshRecord {
    pub(crate) fn new(device: DeviceId) -> Self {
        Self {
            device,
            vertex: None,
            index: None,
            instance: None,
            index_format: IndexFormat::default(),
            vertex_format: None,
            instance_format: None,
        }
    }

    pub fn buffer(&self, which: MeshBuffer) -> Option<&BufferRecord> {
        match which {
            MeshBuffer::Vertex => self.vertex.as_ref(),
            MeshBuffer::Index => self.index.as_ref(),
            MeshBuffer::Instance => self.instance.as_ref(),
        }
    }

    pub(crate) fn buffer_slot(&mut self, which: MeshBuffer) -> &mut Option<BufferRecord> {
        match which {
            MeshBuffer::Vertex => &mut self.vertex,
            MeshBuffer::Index => &mut self.index,
            MeshBuffer::Instance => &mut self.instance,
        }
    }

    pub fn index_format(&self) -> IndexFormat {
        self.index_format
    }

    pub fn vertex_format(&self) -> Option<&VertexFormat> {
        self.vertex_format.as_ref()
    }

    pub fn instance_format(&self) -> Option<&VertexFormat> {
        self.instance_format.as_ref()
    }

    /// Whether the mesh has both the buffers an indexed draw needs.
    pub fn is_drawable(&self) -> bool {
        self.vertex.is_some() && self.index.is_some() && self.vertex_format.is_some()
    }

    /// Whether any buffer was written since the last bind.
    pub fn is_dirty(&self) -> bool {
        [&self.vertex, &self.index, &self.instance]
            .into_iter()
            .flatten()
            .any(BufferRecord::is_dirty)
    }

    pub(crate) fn clear_dirty(&mut self) {
        for buffer in [&mut self.vertex, &mut self.index, &mut self.instance]
            .into_iter()
            .flatten()
        {
            buffer.dirty = false;
        }
    }

    /// Take every allocated buffer out of the mesh.
    pub(crate) fn take_buffers(&mut self) -> Vec<BufferRecord> {
        [self.vertex.take(), self.index.take(), self.instance.take()]
            .into_iter()
            .flatten()
            .collect()
    }
}

impl DeviceResource for MeshRecord {
    fn device(&self) -> DeviceId {
        self.device
    }
}

static_assertions::assert_impl_all!(MeshRecord: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grown_capacity() {
        assert_eq!(grown_capacity(0, 1), 8);
        assert_eq!(grown_capacity(0, 8), 8);
        assert_eq!(grown_capacity(0, 9), 16);
        assert_eq!(grown_capacity(0, 36), 64);
        assert_eq!(grown_capacity(64, 65), 128);
        assert_eq!(grown_capacity(100, 1000), 1600);
    }

    #[test]
    fn test_new_buffers_are_dirty_and_distinct() {
        let a = BufferRecord::new(GpuBuffer::Dummy { id: 1 }, 8);
        let b = BufferRecord::new(GpuBuffer::Dummy { id: 2 }, 8);
        assert!(a.is_dirty());
        assert_ne!(a.serial(), b.serial());
        assert!(a.fits(8));
        assert!(!a.fits(9));
    }

    #[test]
    fn test_padding_carries_current_contents() {
        let mut buffer = BufferRecord::new(GpuBuffer::Dummy { id: 1 }, 16);
        buffer.record_write(4, &[0xaa; 8]);
        buffer.record_write(0, &[0x11; 6]);
        assert_eq!(
            buffer.contents(0, 8),
            &[0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0xaa, 0xaa]
        );
        // Fresh buffers pad with zeros.
        buffer.record_write(12, &[0x22]);
        assert_eq!(buffer.contents(12, 4), &[0x22, 0, 0, 0]);
    }

    #[test]
    fn test_mesh_dirty_tracking() {
        let mut mesh = MeshRecord::new(DeviceId::next());
        assert!(!mesh.is_dirty());
        assert!(!mesh.is_drawable());

        mesh.vertex = Some(BufferRecord::new(GpuBuffer::Dummy { id: 1 }, 8));
        assert!(mesh.is_dirty());

        mesh.clear_dirty();
        assert!(!mesh.is_dirty());
        assert_eq!(mesh.take_buffers().len(), 1);
        assert!(mesh.buffer(MeshBuffer::Vertex).is_none());
    }
}
