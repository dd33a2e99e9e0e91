//! Fence pairs guarding one frame slot.

use crate::backend::{GpuBackend, GpuFence};
use crate::error::GraphicsError;

/// The fences of one submitted frame: one for the upload command buffer
/// and one for the render command buffer.
///
/// Both fences are waited on and released together, exactly one full
/// rotation of the frame ring after they were acquired.
#[derive(Debug)]
pub struct FenceGroup {
    pub upload: GpuFence,
    pub render: GpuFence,
}

impl FenceGroup {
    pub fn new(upload: GpuFence, render: GpuFence) -> Self {
        Self { upload, render }
    }

    /// Block until both fences signal.
    pub fn wait(&self, backend: &GpuBackend) -> Result<(), GraphicsError> {
        backend.wait_fence(&self.upload)?;
        backend.wait_fence(&self.render)
    }

    /// Hand both fences back to the backend.
    pub fn release(self, backend: &GpuBackend) {
        backend.release_fence(self.upload);
        backend.release_fence(self.render);
    }

    /// Wait for both fences, then release them.
    ///
    /// A failed wait keeps the fences unreleased and returns the error.
    pub fn retire(self, backend: &GpuBackend) -> Result<(), GraphicsError> {
        self.wait(backend)?;
        self.release(backend);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, DummyCall};

    #[test]
    fn test_retire_waits_before_release() {
        let backend = GpuBackend::Dummy(DummyBackend::new());
        let upload = backend.acquire_command_buffer("upload").unwrap();
        let render = backend.acquire_command_buffer("render").unwrap();
        let group = FenceGroup::new(
            backend.submit(upload).unwrap(),
            backend.submit(render).unwrap(),
        );
        let dummy = backend.as_dummy().unwrap();
        dummy.clear_calls();

        group.retire(&backend).unwrap();

        let calls = dummy.calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(calls[0], DummyCall::WaitFence { .. }));
        assert!(matches!(calls[1], DummyCall::WaitFence { .. }));
        assert!(matches!(calls[2], DummyCall::ReleaseFence { .. }));
        assert!(matches!(calls[3], DummyCall::ReleaseFence { .. }));
        assert_eq!(dummy.live_objects().fences, 0);
    }

    #[test]
    fn test_failed_wait_does_not_release() {
        let backend = GpuBackend::Dummy(DummyBackend::new());
        let upload = backend.acquire_command_buffer("upload").unwrap();
        let render = backend.acquire_command_buffer("render").unwrap();
        let group = FenceGroup::new(
            backend.submit(upload).unwrap(),
            backend.submit(render).unwrap(),
        );
        let dummy = backend.as_dummy().unwrap();
        dummy.lose_device();
        dummy.clear_calls();

        let result = group.retire(&backend);

        assert!(matches!(result, Err(GraphicsError::Internal(_))));
        assert!(
            !dummy
                .calls()
                .iter()
                .any(|call| matches!(call, DummyCall::ReleaseFence { .. }))
        );
    }
}
