//! Sampler cache.

use std::collections::HashMap;

use ember_core::TextureSampler;
use parking_lot::Mutex;

use crate::backend::{GpuBackend, GpuSampler};
use crate::error::GraphicsError;
use crate::pipeline::tables;

/// Native samplers keyed by their public configuration.
///
/// Samplers are created on first use and live until [`drain`](Self::drain)
/// at shutdown. The cache may be shared with threads creating resources.
///
/// # Example
///
/// ```ignore
/// let sampler = cache.get_or_create(&backend, TextureSampler::linear_clamp())?;
/// ```
#[derive(Default)]
pub struct SamplerCache {
    samplers: Mutex<HashMap<TextureSampler, GpuSampler>>,
}

impl SamplerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Native sampler for `sampler`, created on a miss.
    pub fn get_or_create(
        &self,
        backend: &GpuBackend,
        sampler: TextureSampler,
    ) -> Result<GpuSampler, GraphicsError> {
        let mut samplers = self.samplers.lock();
        if let Some(native) = samplers.get(&sampler) {
            return Ok(native.clone());
        }

        log::trace!("Creating sampler {sampler:?}");
        let native = backend.create_sampler(&tables::sampler_descriptor(sampler))?;
        samplers.insert(sampler, native.clone());
        Ok(native)
    }

    /// Remove every cached sampler, handing them back for release.
    pub fn drain(&self) -> Vec<GpuSampler> {
        self.samplers.lock().drain().map(|(_, s)| s).collect()
    }

    pub fn len(&self) -> usize {
        self.samplers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SamplerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerCache")
            .field("len", &self.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(SamplerCache: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use ember_core::{TextureFilter, TextureWrap};

    #[test]
    fn test_samplers_are_reused_by_value() {
        let backend = GpuBackend::Dummy(DummyBackend::new());
        let cache = SamplerCache::new();

        cache
            .get_or_create(&backend, TextureSampler::linear_clamp())
            .unwrap();
        cache
            .get_or_create(&backend, TextureSampler::linear_clamp())
            .unwrap();
        assert_eq!(cache.len(), 1);

        let mirrored = TextureSampler::new(
            TextureFilter::Linear,
            TextureWrap::MirroredRepeat,
            TextureWrap::Clamp,
        );
        cache.get_or_create(&backend, mirrored).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(backend.as_dummy().unwrap().live_objects().samplers, 2);
    }

    #[test]
    fn test_drain_empties_cache() {
        let backend = GpuBackend::Dummy(DummyBackend::new());
        let cache = SamplerCache::new();
        cache
            .get_or_create(&backend, TextureSampler::nearest_repeat())
            .unwrap();

        let drained = cache.drain();
        assert_eq!(drained.len(), 1);
        assert!(cache.is_empty());
    }
}
