//! Ring allocator for staging uploads.
//!
//! Each upload direction (texture payloads, buffer payloads) owns one
//! [`UploadRing`] over a fixed-size transfer buffer. Payloads are appended at
//! the write offset; when a payload would run past the end the ring wraps
//! back to offset 0 and *cycles* the transfer buffer, telling the backend
//! that earlier contents may still be read by recorded copies and must not
//! be overwritten in place.
//!
//! The number of wraps per frame is capped. Once the cap is reached the
//! caller has to flush and wait for the GPU before the ring may wrap again,
//! which bounds how much staging memory cycling can pile up.
//!
//! Payloads at least as large as the whole ring never touch it; they go
//! through a one-shot transfer buffer instead.
//!
//! # Example
//!
//! ```ignore
//! match ring.stage(payload.len() as u64, alignment) {
//!     StagePlan::Bypass => upload_through_temporary_buffer(payload),
//!     StagePlan::Write { offset, cycle } => {
//!         backend.write_transfer_buffer(&transfer, offset, payload, cycle)?;
//!     }
//!     StagePlan::Stall => {
//!         flush_and_wait()?;
//!         ring.reset();
//!         // stage again
//!     }
//! }
//!
//! // At the start of every frame:
//! ring.reset();
//! ```

/// Where a payload goes, as decided by [`UploadRing::stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePlan {
    /// The payload is at least as large as the ring; use a one-shot buffer.
    Bypass,
    /// Write the payload at `offset`, cycling the transfer buffer if `cycle`.
    Write { offset: u64, cycle: bool },
    /// The wrap cap is exhausted; flush, wait, [`reset`](UploadRing::reset)
    /// and stage again.
    Stall,
}

/// Counters accumulated over the ring's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingStats {
    pub writes: u64,
    pub wraps: u64,
    pub stalls: u64,
    pub bypasses: u64,
}

/// Write-offset and cycle bookkeeping of one upload ring.
///
/// The ring never owns GPU memory itself; it only plans where payloads land
/// in a transfer buffer of `capacity` bytes.
#[derive(Debug, Clone)]
pub struct UploadRing {
    capacity: u64,
    offset: u64,
    cycle_count: u32,
    max_cycles: u32,
    stats: RingStats,
}

impl UploadRing {
    pub fn new(capacity: u64, max_cycles: u32) -> Self {
        Self {
            capacity,
            offset: 0,
            cycle_count: 0,
            max_cycles,
            stats: RingStats::default(),
        }
    }

    /// Plan the placement of a `size`-byte payload whose staging offset must
    /// be a multiple of `alignment`.
    ///
    /// Every plan except [`StagePlan::Stall`] is committed: the write offset
    /// advances past the payload. A stall leaves the ring untouched.
    pub fn stage(&mut self, size: u64, alignment: u64) -> StagePlan {
        if size >= self.capacity {
            self.stats.bypasses += 1;
            return StagePlan::Bypass;
        }

        let aligned = align_up(self.offset, alignment);
        let (offset, cycle) = if aligned + size >= self.capacity {
            if self.cycle_count >= self.max_cycles {
                self.stats.stalls += 1;
                log::warn!(
                    "Upload ring wrapped {} times this frame, stalling for the GPU",
                    self.cycle_count
                );
                return StagePlan::Stall;
            }
            self.cycle_count += 1;
            self.stats.wraps += 1;
            (0, true)
        } else {
            // The first write of a frame lands at offset 0 and cycles too.
            (aligned, aligned == 0)
        };

        self.offset = offset + size;
        self.stats.writes += 1;
        StagePlan::Write { offset, cycle }
    }

    /// Rewind to offset 0 with no cycles used.
    ///
    /// Only call this once the GPU can no longer read anything staged since
    /// the previous reset, or once every such read has been submitted.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.cycle_count = 0;
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Current write offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Wraps performed since the last reset.
    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    pub fn max_cycles(&self) -> u32 {
        self.max_cycles
    }

    pub fn stats(&self) -> RingStats {
        self.stats
    }
}

/// Align a value up to the given alignment.
#[inline]
fn align_up(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}
