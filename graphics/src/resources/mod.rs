//! GPU resources.
//!
//! The [`ResourceRegistry`] owns every native texture, mesh and shader the
//! application created, keyed by generation-checked handles:
//! - [`TextureRecord`] - GPU texture and its public format
//! - [`MeshRecord`] - vertex, index and instance [`BufferRecord`]s
//! - [`ShaderRecord`] - linked vertex + fragment programs
//!
//! Alongside the registry live the [`SamplerCache`] and the [`UploadRing`]
//! planning staging writes.
//!
//! Every record remembers the [`DeviceId`] it was created under. The registry
//! outlives devices, so a record from a destroyed device can still be looked
//! up and removed; its native handles are dead and must not be released.

mod buffer;
mod ring_buffer;
mod sampler;
mod shader;
mod texture;

pub use buffer::{BufferRecord, MeshBuffer, MeshRecord, grown_capacity};
pub use ring_buffer::{RingStats, StagePlan, UploadRing};
pub use sampler::SamplerCache;
pub use shader::ShaderRecord;
pub use texture::TextureRecord;

use std::sync::atomic::{AtomicU64, Ordering};

use ember_core::{MeshHandle, ShaderHandle, TextureHandle};
use slotmap::{Key, SlotMap};

use crate::error::GraphicsError;

/// Identity of one device lifetime.
///
/// Every device created in the process gets a fresh id, so records created
/// under a destroyed device never match a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(u64);

impl DeviceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A record tied to the device that created its native objects.
pub trait DeviceResource {
    fn device(&self) -> DeviceId;

    /// Whether the record's native objects belong to `device`.
    fn is_live_on(&self, device: DeviceId) -> bool {
        self.device() == device
    }
}

fn lookup<'a, K: Key, V: DeviceResource>(
    map: &'a SlotMap<K, V>,
    key: K,
    device: DeviceId,
    kind: &str,
) -> Result<&'a V, GraphicsError> {
    match map.get(key) {
        Some(record) if record.is_live_on(device) => Ok(record),
        Some(_) => Err(GraphicsError::InvalidResource(format!(
            "{kind} {key:?} belongs to a destroyed device"
        ))),
        None => Err(GraphicsError::InvalidResource(format!(
            "{kind} {key:?} was destroyed or never created"
        ))),
    }
}

fn lookup_mut<'a, K: Key, V: DeviceResource>(
    map: &'a mut SlotMap<K, V>,
    key: K,
    device: DeviceId,
    kind: &str,
) -> Result<&'a mut V, GraphicsError> {
    match map.get_mut(key) {
        Some(record) if record.is_live_on(device) => Ok(record),
        Some(_) => Err(GraphicsError::InvalidResource(format!(
            "{kind} {key:?} belongs to a destroyed device"
        ))),
        None => Err(GraphicsError::InvalidResource(format!(
            "{kind} {key:?} was destroyed or never created"
        ))),
    }
}

/// Arena of every resource record, indexed by public handles.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    textures: SlotMap<TextureHandle, TextureRecord>,
    meshes: SlotMap<MeshHandle, MeshRecord>,
    shaders: SlotMap<ShaderHandle, ShaderRecord>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // --- textures ----------------------------------------------------------

    pub(crate) fn insert_texture(&mut self, record: TextureRecord) -> TextureHandle {
        self.textures.insert(record)
    }

    /// The texture behind `handle`, if it is alive on `device`.
    pub fn texture(
        &self,
        handle: TextureHandle,
        device: DeviceId,
    ) -> Result<&TextureRecord, GraphicsError> {
        lookup(&self.textures, handle, device, "texture")
    }

    pub(crate) fn remove_texture(&mut self, handle: TextureHandle) -> Option<TextureRecord> {
        self.textures.remove(handle)
    }

    pub fn contains_texture(&self, handle: TextureHandle) -> bool {
        self.textures.contains_key(handle)
    }

    // --- meshes ------------------------------------------------------------

    pub(crate) fn insert_mesh(&mut self, record: MeshRecord) -> MeshHandle {
        self.meshes.insert(record)
    }

    pub fn mesh(&self, handle: MeshHandle, device: DeviceId) -> Result<&MeshRecord, GraphicsError> {
        lookup(&self.meshes, handle, device, "mesh")
    }

    pub(crate) fn mesh_mut(
        &mut self,
        handle: MeshHandle,
        device: DeviceId,
    ) -> Result<&mut MeshRecord, GraphicsError> {
        lookup_mut(&mut self.meshes, handle, device, "mesh")
    }

    pub(crate) fn remove_mesh(&mut self, handle: MeshHandle) -> Option<MeshRecord> {
        self.meshes.remove(handle)
    }

    pub fn contains_mesh(&self, handle: MeshHandle) -> bool {
        self.meshes.contains_key(handle)
    }

    // --- shaders -----------------------------------------------------------

    pub(crate) fn insert_shader(&mut self, record: ShaderRecord) -> ShaderHandle {
        self.shaders.insert(record)
    }

    pub fn shader(
        &self,
        handle: ShaderHandle,
        device: DeviceId,
    ) -> Result<&ShaderRecord, GraphicsError> {
        lookup(&self.shaders, handle, device, "shader")
    }

    pub(crate) fn remove_shader(&mut self, handle: ShaderHandle) -> Option<ShaderRecord> {
        self.shaders.remove(handle)
    }

    pub fn contains_shader(&self, handle: ShaderHandle) -> bool {
        self.shaders.contains_key(handle)
    }

    /// Number of live records of each kind: (textures, meshes, shaders).
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.textures.len(), self.meshes.len(), self.shaders.len())
    }
}
