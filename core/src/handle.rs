//! Generation-checked resource handles.
//!
//! Handles are [`slotmap`] keys: a slot index plus a generation counter.
//! Destroying a resource frees its slot and bumps the generation, so a
//! handle that outlives its resource never aliases a newer one.

use slotmap::new_key_type;

new_key_type! {
    /// Opaque identifier of a GPU texture.
    pub struct TextureHandle;
    /// Opaque identifier of a GPU mesh (vertex, index and instance buffers).
    pub struct MeshHandle;
    /// Opaque identifier of a linked vertex + fragment shader pair.
    pub struct ShaderHandle;
}
