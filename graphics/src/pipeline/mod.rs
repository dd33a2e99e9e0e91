//! Pipeline cache.
//!
//! Building a native pipeline is expensive, so [`PipelineCache`] memoizes
//! them by the complete render state of a draw, captured in a
//! [`PipelineKey`]:
//!
//! ```text
//! PipelineKey ──► by_key ──► PipelineId ──► entries ──► GpuPipeline
//!                                 ▲
//!   Shader(handle)  ──┐           │
//!   Texture(handle) ──┴► dependents
//! ```
//!
//! The key is stored whole, so a lookup compares every field rather than
//! trusting a hash. Each cached pipeline is registered as a dependent of its
//! shader and of every attachment of its render target. Destroying one of
//! those resources removes exactly the pipelines that referenced it.
//!
//! # Example
//!
//! ```ignore
//! let (id, pipeline) = cache.get_or_create(&key, |key| {
//!     backend.create_pipeline(&key.descriptor(&shader, &color_formats, depth_format)?)
//! })?;
//!
//! // Later, when the shader is destroyed:
//! for pipeline in cache.invalidate(PipelineDependency::Shader(handle)) {
//!     backend.release_pipeline(pipeline);
//! }
//! ```

pub mod tables;

use std::collections::HashMap;

use arrayvec::ArrayVec;
use ember_core::{BlendMode, CullMode, DepthCompare, ShaderHandle, TextureHandle, VertexFormat};
use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::backend::{GpuPipeline, GpuShader};
use crate::error::GraphicsError;
use crate::types::{
    ColorTargetState, DepthStencilState, MAX_COLOR_ATTACHMENTS, RenderPipelineDescriptor,
    TextureFormat,
};

/// Color attachments plus one depth/stencil attachment.
pub const MAX_TARGET_ATTACHMENTS: usize = MAX_COLOR_ATTACHMENTS + 1;

new_key_type! {
    /// Identity of one cached pipeline. Never reused after invalidation.
    pub struct PipelineId;
}

/// What a pipeline renders into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PipelineTarget {
    /// The swapchain image, in its current format.
    Swapchain(TextureFormat),
    /// Attachments of a render target, in attachment order.
    Attachments(ArrayVec<TextureHandle, MAX_TARGET_ATTACHMENTS>),
}

/// Complete render state a pipeline is built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub target: PipelineTarget,
    pub shader: ShaderHandle,
    pub vertex_format: VertexFormat,
    pub cull: CullMode,
    pub depth_compare: DepthCompare,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: BlendMode,
}

/// A resource whose destruction invalidates pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineDependency {
    Shader(ShaderHandle),
    Texture(TextureHandle),
}

impl PipelineKey {
    /// Resources this pipeline must not outlive.
    pub fn dependencies(&self) -> impl Iterator<Item = PipelineDependency> + '_ {
        let textures: &[TextureHandle] = match &self.target {
            PipelineTarget::Swapchain(_) => &[],
            PipelineTarget::Attachments(attachments) => attachments,
        };
        std::iter::once(PipelineDependency::Shader(self.shader))
            .chain(textures.iter().copied().map(PipelineDependency::Texture))
    }

    /// Native description of this pipeline.
    ///
    /// `color_formats` are the formats of the target's color attachments (or
    /// the swapchain format) and `depth_format` that of its depth attachment.
    /// Depth state only applies when the target has a depth attachment; with
    /// depth testing off the compare is `Always` and nothing is written.
    pub fn descriptor<'a>(
        &self,
        shader: &'a GpuShader,
        color_formats: &[TextureFormat],
        depth_format: Option<TextureFormat>,
    ) -> Result<RenderPipelineDescriptor<'a>, GraphicsError> {
        let blend = tables::blend_state(self.blend)?;
        let write_mask = tables::color_writes(self.blend);

        let mut color_targets = ArrayVec::new();
        for &format in color_formats {
            color_targets
                .try_push(ColorTargetState {
                    format,
                    blend,
                    write_mask,
                })
                .map_err(|_| {
                    GraphicsError::InvalidParameter(format!(
                        "more than {MAX_COLOR_ATTACHMENTS} color attachments"
                    ))
                })?;
        }

        let depth_stencil = depth_format.map(|format| DepthStencilState {
            format,
            depth_write_enabled: self.depth_test && self.depth_write,
            depth_compare: if self.depth_test {
                tables::compare_function(self.depth_compare)
            } else {
                tables::compare_function(DepthCompare::Always)
            },
        });

        Ok(RenderPipelineDescriptor {
            label: None,
            shader,
            vertex_buffer: tables::vertex_layout(&self.vertex_format),
            color_targets,
            depth_stencil,
            cull_mode: tables::cull_face(self.cull),
        })
    }
}

/// Lookup counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidated: u64,
}

struct CacheEntry {
    key: PipelineKey,
    pipeline: GpuPipeline,
}

#[derive(Default)]
struct CacheState {
    by_key: HashMap<PipelineKey, PipelineId>,
    entries: SlotMap<PipelineId, CacheEntry>,
    dependents: HashMap<PipelineDependency, Vec<PipelineId>>,
    stats: PipelineCacheStats,
}

impl CacheState {
    fn remove(&mut self, id: PipelineId) -> Option<GpuPipeline> {
        let entry = self.entries.remove(id)?;
        self.by_key.remove(&entry.key);
        for dependency in entry.key.dependencies() {
            if let Some(ids) = self.dependents.get_mut(&dependency) {
                ids.retain(|&other| other != id);
                if ids.is_empty() {
                    self.dependents.remove(&dependency);
                }
            }
        }
        self.stats.invalidated += 1;
        Some(entry.pipeline)
    }
}

/// Cache of native pipelines with reverse dependency tracking.
///
/// The cache never releases native pipelines itself; everything it removes
/// is handed back to the caller.
#[derive(Default)]
pub struct PipelineCache {
    state: Mutex<CacheState>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pipeline for `key`, built with `create` on a miss.
    ///
    /// A failed `create` leaves the cache unchanged.
    pub fn get_or_create<F>(
        &self,
        key: &PipelineKey,
        create: F,
    ) -> Result<(PipelineId, GpuPipeline), GraphicsError>
    where
        F: FnOnce(&PipelineKey) -> Result<GpuPipeline, GraphicsError>,
    {
        let mut state = self.state.lock();
        if let Some(&id) = state.by_key.get(key)
            && let Some(entry) = state.entries.get(id)
        {
            let pipeline = entry.pipeline.clone();
            state.stats.hits += 1;
            return Ok((id, pipeline));
        }

        let pipeline = create(key)?;
        state.stats.misses += 1;
        let id = state.entries.insert(CacheEntry {
            key: key.clone(),
            pipeline: pipeline.clone(),
        });
        state.by_key.insert(key.clone(), id);
        for dependency in key.dependencies() {
            state.dependents.entry(dependency).or_default().push(id);
        }
        log::trace!(
            "Created pipeline {id:?} ({} cached)",
            state.entries.len()
        );
        Ok((id, pipeline))
    }

    /// Remove every pipeline depending on `dependency`.
    pub fn invalidate(&self, dependency: PipelineDependency) -> Vec<GpuPipeline> {
        let mut state = self.state.lock();
        let Some(ids) = state.dependents.remove(&dependency) else {
            return Vec::new();
        };
        let removed: Vec<_> = ids.into_iter().filter_map(|id| state.remove(id)).collect();
        if !removed.is_empty() {
            log::debug!(
                "Invalidated {} pipeline(s) depending on {dependency:?}",
                removed.len()
            );
        }
        removed
    }

    /// Remove every pipeline.
    pub fn drain(&self) -> Vec<GpuPipeline> {
        let mut state = self.state.lock();
        state.by_key.clear();
        state.dependents.clear();
        let drained: Vec<_> = state.entries.drain().map(|(_, e)| e.pipeline).collect();
        state.stats.invalidated += drained.len() as u64;
        drained
    }

    pub fn contains(&self, id: PipelineId) -> bool {
        self.state.lock().entries.contains_key(id)
    }

    pub fn lookup(&self, key: &PipelineKey) -> Option<PipelineId> {
        self.state.lock().by_key.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PipelineCacheStats {
        self.state.lock().stats
    }
}

impl std::fmt::Debug for PipelineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PipelineCache")
            .field("len", &state.entries.len())
            .field("stats", &state.stats)
            .finish()
    }
}

static_assertions::assert_impl_all!(PipelineCache: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::{BlendFactor, VertexElement, VertexType};
    use slotmap::SlotMap;

    struct Handles {
        shaders: SlotMap<ShaderHandle, ()>,
        textures: SlotMap<TextureHandle, ()>,
    }

    impl Handles {
        fn new() -> Self {
            Self {
                shaders: SlotMap::with_key(),
                textures: SlotMap::with_key(),
            }
        }
    }

    fn key(shader: ShaderHandle, target: PipelineTarget) -> PipelineKey {
        PipelineKey {
            target,
            shader,
            vertex_format: VertexFormat::new([VertexElement::new(0, VertexType::Float2)]),
            cull: CullMode::None,
            depth_compare: DepthCompare::Always,
            depth_test: false,
            depth_write: false,
            blend: BlendMode::default(),
        }
    }

    fn attachments(handles: &[TextureHandle]) -> PipelineTarget {
        PipelineTarget::Attachments(handles.iter().copied().collect())
    }

    fn counter() -> impl FnMut(&PipelineKey) -> Result<GpuPipeline, GraphicsError> {
        let mut next = 0;
        move |_| {
            next += 1;
            Ok(GpuPipeline::Dummy { id: next })
        }
    }

    #[test]
    fn test_identical_keys_share_a_pipeline() {
        let mut handles = Handles::new();
        let shader = handles.shaders.insert(());
        let cache = PipelineCache::new();
        let mut create = counter();

        let a = key(shader, PipelineTarget::Swapchain(TextureFormat::Bgra8Unorm));
        let (first, _) = cache.get_or_create(&a, &mut create).unwrap();
        let (second, _) = cache.get_or_create(&a.clone(), &mut create).unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_any_field_change_misses() {
        let mut handles = Handles::new();
        let shader = handles.shaders.insert(());
        let cache = PipelineCache::new();
        let mut create = counter();
        let base = key(shader, PipelineTarget::Swapchain(TextureFormat::Bgra8Unorm));

        let variants = [
            PipelineKey {
                blend: BlendMode::ADD,
                ..base.clone()
            },
            PipelineKey {
                cull: CullMode::Back,
                ..base.clone()
            },
            PipelineKey {
                depth_test: true,
                ..base.clone()
            },
            PipelineKey {
                vertex_format: VertexFormat::new([VertexElement::new(0, VertexType::Float3)]),
                ..base.clone()
            },
            PipelineKey {
                target: PipelineTarget::Swapchain(TextureFormat::Rgba8Unorm),
                ..base.clone()
            },
        ];

        let (base_id, _) = cache.get_or_create(&base, &mut create).unwrap();
        for variant in &variants {
            let (id, _) = cache.get_or_create(variant, &mut create).unwrap();
            assert_ne!(id, base_id);
        }
        assert_eq!(cache.len(), variants.len() + 1);
    }

    #[test]
    fn test_invalidation_removes_only_dependents() {
        let mut handles = Handles::new();
        let shader_a = handles.shaders.insert(());
        let shader_b = handles.shaders.insert(());
        let color = handles.textures.insert(());
        let other = handles.textures.insert(());
        let cache = PipelineCache::new();
        let mut create = counter();

        let on_target = key(shader_a, attachments(&[color]));
        let on_other = key(shader_b, attachments(&[other]));
        let on_swapchain = key(shader_b, PipelineTarget::Swapchain(TextureFormat::Bgra8Unorm));
        let (target_id, _) = cache.get_or_create(&on_target, &mut create).unwrap();
        let (other_id, _) = cache.get_or_create(&on_other, &mut create).unwrap();
        let (swapchain_id, _) = cache.get_or_create(&on_swapchain, &mut create).unwrap();

        let removed = cache.invalidate(PipelineDependency::Texture(color));
        assert_eq!(removed.len(), 1);
        assert!(!cache.contains(target_id));
        assert!(cache.contains(other_id));
        assert!(cache.contains(swapchain_id));

        let removed = cache.invalidate(PipelineDependency::Shader(shader_b));
        assert_eq!(removed.len(), 2);
        assert!(cache.is_empty());

        // Nothing left to invalidate; the shader A list went with its pipeline.
        assert!(cache.invalidate(PipelineDependency::Shader(shader_a)).is_empty());
    }

    #[test]
    fn test_recreated_pipeline_gets_new_id() {
        let mut handles = Handles::new();
        let shader = handles.shaders.insert(());
        let cache = PipelineCache::new();
        let mut create = counter();
        let k = key(shader, PipelineTarget::Swapchain(TextureFormat::Bgra8Unorm));

        let (first, _) = cache.get_or_create(&k, &mut create).unwrap();
        cache.invalidate(PipelineDependency::Shader(shader));
        let (second, _) = cache.get_or_create(&k, &mut create).unwrap();
        assert_ne!(first, second);
        assert_eq!(cache.lookup(&k), Some(second));
    }

    #[test]
    fn test_failed_creation_is_not_cached() {
        let mut handles = Handles::new();
        let shader = handles.shaders.insert(());
        let cache = PipelineCache::new();
        let k = key(shader, PipelineTarget::Swapchain(TextureFormat::Bgra8Unorm));

        let result = cache.get_or_create(&k, |_| {
            Err(GraphicsError::CreationFailed("rejected".into()))
        });
        assert!(matches!(result, Err(GraphicsError::CreationFailed(_))));
        assert!(cache.is_empty());
        assert_eq!(cache.lookup(&k), None);
    }

    #[test]
    fn test_descriptor_depth_state() {
        let mut handles = Handles::new();
        let shader = GpuShader::Dummy { id: 1 };
        let mut k = key(
            handles.shaders.insert(()),
            PipelineTarget::Swapchain(TextureFormat::Bgra8Unorm),
        );
        k.depth_compare = DepthCompare::Less;
        k.depth_write = true;

        let desc = k
            .descriptor(
                &shader,
                &[TextureFormat::Rgba8Unorm],
                Some(TextureFormat::Depth24PlusStencil8),
            )
            .unwrap();
        let depth = desc.depth_stencil.unwrap();
        assert!(!depth.depth_write_enabled);
        assert_eq!(depth.depth_compare, crate::types::CompareFunction::Always);

        k.depth_test = true;
        let desc = k.descriptor(&shader, &[], Some(TextureFormat::Depth24PlusStencil8)).unwrap();
        let depth = desc.depth_stencil.unwrap();
        assert!(depth.depth_write_enabled);
        assert_eq!(depth.depth_compare, crate::types::CompareFunction::Less);

        let desc = k.descriptor(&shader, &[TextureFormat::Rgba8Unorm], None).unwrap();
        assert!(desc.depth_stencil.is_none());
        assert_eq!(desc.color_targets.len(), 1);
    }

    #[test]
    fn test_descriptor_rejects_unsupported_blend() {
        let mut handles = Handles::new();
        let shader = GpuShader::Dummy { id: 1 };
        let mut k = key(
            handles.shaders.insert(()),
            PipelineTarget::Swapchain(TextureFormat::Bgra8Unorm),
        );
        k.blend.color_src = BlendFactor::Src1Color;

        assert!(matches!(
            k.descriptor(&shader, &[TextureFormat::Bgra8Unorm], None),
            Err(GraphicsError::UnsupportedFormat(_))
        ));
    }
}
