//! Frame synchronization across multiple frames in flight.
//!
//! [`FramePipeline`] keeps one [`FenceGroup`] per frame slot. Presenting a
//! frame reuses the current slot: if the slot still holds fences from the
//! frame submitted `frames_in_flight` presents ago, the CPU blocks on them
//! first. This is the only stall in a steady-state frame loop and bounds
//! how far the CPU runs ahead of the GPU.
//!
//! ```text
//! frames_in_flight = 3
//!
//! Slot 0: [Frame 0] ──► [Frame 3] ──► [Frame 6] ──►
//! Slot 1: [Frame 1] ──► [Frame 4] ──► [Frame 7] ──►
//! Slot 2: [Frame 2] ──► [Frame 5] ──► [Frame 8] ──►
//! ```
//!
//! # Example
//!
//! ```ignore
//! // Once per present:
//! frames.begin_frame(&backend)?;                 // may block on frame N-3
//! let upload = backend.submit(upload_cmd)?;
//! let render = backend.submit(render_cmd)?;
//! frames.end_frame(&backend, FenceGroup::new(upload, render))?;
//!
//! // Shutdown:
//! frames.wait_idle(&backend)?;
//! ```

mod sync;

pub use sync::FenceGroup;

use crate::backend::GpuBackend;
use crate::error::GraphicsError;

/// Ring of fence groups, one per frame in flight.
///
/// `FramePipeline` is owned by the renderer and only touched from the thread
/// driving submission.
#[derive(Debug)]
pub struct FramePipeline {
    /// Fences for each frame slot. `None` if the slot is free.
    slots: Vec<Option<FenceGroup>>,

    /// Current frame slot index (0 to frames_in_flight - 1).
    current_slot: usize,

    /// Total frames ended.
    frame_count: u64,

    /// Number of times `begin_frame` had to wait on a slot.
    stalls: u64,
}

impl FramePipeline {
    /// Create a new frame pipeline.
    ///
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is 0.
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "frames_in_flight must be at least 1");

        Self {
            slots: (0..frames_in_flight).map(|_| None).collect(),
            current_slot: 0,
            frame_count: 0,
            stalls: 0,
        }
    }

    /// Make the current slot available.
    ///
    /// If the slot still holds the fences of an earlier frame, blocks until
    /// both signal and releases them. Returns whether a wait happened.
    /// A failed wait (device loss) is returned and the slot is left empty.
    pub fn begin_frame(&mut self, backend: &GpuBackend) -> Result<bool, GraphicsError> {
        let Some(group) = self.slots[self.current_slot].take() else {
            return Ok(false);
        };

        log::trace!(
            "Waiting for frame slot {} (frame {})",
            self.current_slot,
            self.frame_count
        );
        group.retire(backend)?;
        self.stalls += 1;
        Ok(true)
    }

    /// Store the fences of the frame just submitted and advance the slot.
    ///
    /// Call [`begin_frame`](Self::begin_frame) first; a slot that still holds
    /// fences is retired here rather than leaked.
    pub fn end_frame(
        &mut self,
        backend: &GpuBackend,
        group: FenceGroup,
    ) -> Result<(), GraphicsError> {
        let stale = self.slots[self.current_slot].replace(group);

        log::trace!(
            "End frame {} (slot {})",
            self.frame_count,
            self.current_slot
        );

        self.frame_count += 1;
        self.current_slot = (self.current_slot + 1) % self.slots.len();
        stale.map_or(Ok(()), |stale| stale.retire(backend))
    }

    /// Wait for and release every fence in the ring.
    pub fn wait_idle(&mut self, backend: &GpuBackend) -> Result<(), GraphicsError> {
        log::trace!("Waiting for GPU idle ({} slots)", self.slots.len());

        for group in self.slots.iter_mut().filter_map(Option::take) {
            group.retire(backend)?;
        }
        Ok(())
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Current frame slot index.
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    /// Number of slots holding fences of unfinished frames.
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }
}
