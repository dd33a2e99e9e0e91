//! Staging memory for the wgpu backend.
//!
//! A [`WgpuTransferBuffer`] is a pool of `COPY_SRC` buffers of equal size.
//! Host writes go through `Queue::write_buffer`, which wgpu applies at the
//! next submit ahead of that submit's command buffers. A backing written
//! since the last submit may still be read by recorded copies, so a cycled
//! write moves to a backing that is not, growing the pool when all are busy.
//!
//! Uniform data lives in the [`UniformArena`]: chunks handed to one command
//! buffer at a time and returned when it is submitted.

use parking_lot::Mutex;

use super::WgpuBackend;
use crate::backend::GpuTransferBuffer;
use crate::error::GraphicsError;

struct TransferBacking {
    buffer: wgpu::Buffer,
    written_epoch: Option<u64>,
}

struct TransferPool {
    backings: Vec<TransferBacking>,
    active: usize,
}

/// Host-visible staging buffer with cycling support.
pub struct WgpuTransferBuffer {
    size: u64,
    pool: Mutex<TransferPool>,
}

impl WgpuTransferBuffer {
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Buffer that copies recorded now should read from.
    pub(super) fn active_buffer(&self) -> wgpu::Buffer {
        let pool = self.pool.lock();
        pool.backings[pool.active].buffer.clone()
    }
}

/// Uniform memory owned by one command buffer until it is submitted.
pub(super) struct UniformChunk {
    pub(super) buffer: wgpu::Buffer,
    used: u64,
}

/// Recycles uniform chunks between command buffers.
pub(super) struct UniformArena {
    chunk_size: u64,
    alignment: u64,
    free: Vec<wgpu::Buffer>,
}

impl UniformArena {
    pub(super) fn new(chunk_size: u64, alignment: u64) -> Self {
        Self {
            chunk_size,
            alignment: alignment.max(1),
            free: Vec::new(),
        }
    }

    pub(super) fn recycle(&mut self, chunks: Vec<UniformChunk>) {
        self.free.extend(
            chunks
                .into_iter()
                .filter(|c| c.buffer.size() == self.chunk_size)
                .map(|c| c.buffer),
        );
    }
}

impl WgpuBackend {
    pub fn create_transfer_buffer(&self, size: u64) -> Result<GpuTransferBuffer, GraphicsError> {
        let buffer = self.create_transfer_backing(size)?;
        Ok(GpuTransferBuffer::Wgpu(std::sync::Arc::new(
            WgpuTransferBuffer {
                size,
                pool: Mutex::new(TransferPool {
                    backings: vec![TransferBacking {
                        buffer,
                        written_epoch: None,
                    }],
                    active: 0,
                }),
            },
        )))
    }

    fn create_transfer_backing(&self, size: u64) -> Result<wgpu::Buffer, GraphicsError> {
        self.scoped("transfer buffer", || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Transfer Buffer"),
                size: size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
                usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })
    }

    pub fn release_transfer_buffer(&self, _buffer: GpuTransferBuffer) {
        // Dropping the pool releases every backing once pending copies finish.
    }

    pub fn write_transfer_buffer(
        &self,
        buffer: &GpuTransferBuffer,
        offset: u64,
        data: &[u8],
        cycle: bool,
    ) -> Result<(), GraphicsError> {
        let GpuTransferBuffer::Wgpu(transfer) = buffer else {
            return Err(GraphicsError::Internal(
                "write_transfer_buffer called with non-Wgpu buffer".into(),
            ));
        };
        if offset + data.len() as u64 > transfer.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at {offset} overflows transfer buffer of {} bytes",
                data.len(),
                transfer.size
            )));
        }

        let epoch = self.current_epoch();
        let mut pool = transfer.pool.lock();
        if cycle && pool.backings[pool.active].written_epoch == Some(epoch) {
            let free = pool
                .backings
                .iter()
                .position(|b| b.written_epoch != Some(epoch));
            pool.active = match free {
                Some(index) => index,
                None => {
                    log::trace!("Growing transfer pool to {}", pool.backings.len() + 1);
                    let buffer = self.create_transfer_backing(transfer.size)?;
                    pool.backings.push(TransferBacking {
                        buffer,
                        written_epoch: None,
                    });
                    pool.backings.len() - 1
                }
            };
        }
        let active = pool.active;
        let backing = &mut pool.backings[active];
        backing.written_epoch = Some(epoch);
        self.queue.write_buffer(&backing.buffer, offset, data);
        Ok(())
    }

    /// Reserve `size` bytes of uniform memory for a command buffer.
    ///
    /// Returns the chunk index and the aligned offset inside it.
    pub(super) fn allocate_uniforms(
        &self,
        chunks: &mut Vec<UniformChunk>,
        size: u64,
    ) -> Result<(usize, u64), GraphicsError> {
        let (chunk_size, alignment) = {
            let arena = self.uniforms.lock();
            (arena.chunk_size, arena.alignment)
        };

        if let Some(last) = chunks.last_mut() {
            let offset = last.used.next_multiple_of(alignment);
            if offset + size <= last.buffer.size() {
                last.used = offset + size;
                return Ok((chunks.len() - 1, offset));
            }
        }

        let recycled = if size <= chunk_size {
            self.uniforms.lock().free.pop()
        } else {
            None
        };
        let buffer = match recycled {
            Some(buffer) => buffer,
            None => self.scoped("uniform arena chunk", || {
                self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Uniform Arena Chunk"),
                    size: size.max(chunk_size),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })?,
        };
        chunks.push(UniformChunk { buffer, used: size });
        Ok((chunks.len() - 1, 0))
    }
}
