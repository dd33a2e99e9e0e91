//! Texture and mesh uploads.
//!
//! Data is written into one of two transfer rings (textures, buffers) and a
//! copy into its destination is recorded into the frame's upload command
//! buffer. The ring decides where each write lands:
//!
//! - uploads at least as large as the ring get a transient transfer buffer;
//! - the first write of a frame and every wrap cycle the ring's backing;
//! - once the ring has cycled `max_upload_cycles` times this frame, the
//!   renderer submits what it has and waits for the GPU before continuing.

use std::borrow::Cow;

use ember_core::{IndexFormat, MeshHandle, TextureHandle, VertexFormat};

use super::frame::{RingKind, ensure_copy_pass, flush_and_stall};
use super::{Device, Renderer};
use crate::backend::{GpuBackend, GpuBuffer, GpuTexture, GpuTransferBuffer};
use crate::error::GraphicsError;
use crate::resources::{BufferRecord, MeshBuffer, StagePlan, grown_capacity};
use crate::types::{BufferDescriptor, BufferUsage, TextureFormat};

use super::frame::FrameState;

/// Where a staged upload is copied to.
enum UploadDst<'a> {
    Texture {
        texture: &'a GpuTexture,
        bytes_per_row: u32,
        width: u32,
        height: u32,
    },
    Buffer {
        buffer: &'a GpuBuffer,
        offset: u64,
    },
}

fn record_copy(
    backend: &GpuBackend,
    frame: &mut FrameState,
    src: &GpuTransferBuffer,
    src_offset: u64,
    size: u64,
    dst: &UploadDst<'_>,
) -> Result<(), GraphicsError> {
    ensure_copy_pass(backend, frame)?;
    match *dst {
        UploadDst::Texture {
            texture,
            bytes_per_row,
            width,
            height,
        } => backend.upload_to_texture(
            &mut frame.upload_cmd,
            src,
            src_offset,
            bytes_per_row,
            texture,
            width,
            height,
        ),
        UploadDst::Buffer { buffer, offset } => backend.upload_to_buffer(
            &mut frame.upload_cmd,
            src,
            src_offset,
            buffer,
            offset,
            size,
        ),
    }
}

/// Stage `data` through the `kind` ring and record its copy into `dst`.
fn stage(
    backend: &GpuBackend,
    frame: &mut FrameState,
    kind: RingKind,
    data: &[u8],
    alignment: u64,
    dst: UploadDst<'_>,
) -> Result<(), GraphicsError> {
    let size = data.len() as u64;
    let mut plan = frame.ring_mut(kind).ring.stage(size, alignment);
    if plan == StagePlan::Stall {
        flush_and_stall(backend, frame)?;
        plan = frame.ring_mut(kind).ring.stage(size, alignment);
    }

    match plan {
        StagePlan::Bypass => {
            log::trace!("Upload of {size} bytes bypasses the {kind:?} ring");
            let transient = backend.create_transfer_buffer(size)?;
            backend.write_transfer_buffer(&transient, 0, data, false)?;
            let recorded = record_copy(backend, frame, &transient, 0, size, &dst);
            backend.release_transfer_buffer(transient);
            recorded
        }
        StagePlan::Write { offset, cycle } => {
            let ring = frame.ring_mut(kind).buffer.clone();
            backend.write_transfer_buffer(&ring, offset, data, cycle)?;
            record_copy(backend, frame, &ring, offset, size, &dst)
        }
        StagePlan::Stall => Err(GraphicsError::Internal(format!(
            "{kind:?} ring still full after waiting for the GPU"
        ))),
    }
}

/// Stage a full texture image. `data` is tightly packed rows.
pub(super) fn stage_texture(
    backend: &GpuBackend,
    frame: &mut FrameState,
    texture: &GpuTexture,
    format: TextureFormat,
    width: u32,
    height: u32,
    data: &[u8],
) -> Result<(), GraphicsError> {
    let layout = backend.texture_upload_layout(format, width, height);
    let row = (width * format.block_size()) as usize;
    let staged: Cow<'_, [u8]> = if layout.bytes_per_row as usize == row {
        Cow::Borrowed(data)
    } else {
        let mut padded = vec![0u8; layout.size as usize];
        for (src, dst) in data
            .chunks_exact(row)
            .zip(padded.chunks_exact_mut(layout.bytes_per_row as usize))
        {
            dst[..row].copy_from_slice(src);
        }
        Cow::Owned(padded)
    };

    stage(
        backend,
        frame,
        RingKind::Texture,
        &staged,
        backend.texture_copy_alignment(format),
        UploadDst::Texture {
            texture,
            bytes_per_row: layout.bytes_per_row,
            width,
            height,
        },
    )
}

impl Renderer {
    /// Replace the contents of a texture.
    ///
    /// `data` must hold exactly `width * height` pixels of the texture's
    /// format, rows tightly packed.
    pub fn set_texture_data(
        &mut self,
        handle: TextureHandle,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        ember_core::profile_function!();
        let Self { device, registry } = self;
        let Device {
            id, backend, frame, ..
        } = device.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        let frame = frame.as_mut().ok_or(GraphicsError::DeviceNotReady)?;

        let record = registry.texture(handle, *id)?;
        if record.format().is_depth_stencil() {
            return Err(GraphicsError::InvalidParameter(
                "depth/stencil textures cannot be uploaded to".into(),
            ));
        }
        if data.len() != record.footprint() {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture {handle:?} needs {} bytes, got {}",
                record.footprint(),
                data.len()
            )));
        }

        stage_texture(
            backend,
            frame,
            &record.gpu,
            record.native_format(),
            record.width(),
            record.height(),
            data,
        )
    }

    /// Read back the contents of a texture, rows tightly packed.
    ///
    /// Submits everything recorded so far and waits for the GPU, so this is
    /// slow and meant for tests and screenshots.
    pub fn get_texture_data(&mut self, handle: TextureHandle) -> Result<Vec<u8>, GraphicsError> {
        ember_core::profile_function!();
        let Self { device, registry } = self;
        let Device {
            id, backend, frame, ..
        } = device.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        let frame = frame.as_mut().ok_or(GraphicsError::DeviceNotReady)?;

        let record = registry.texture(handle, *id)?;
        if record.format().is_depth_stencil() {
            return Err(GraphicsError::InvalidParameter(
                "depth/stencil textures cannot be read back".into(),
            ));
        }

        flush_and_stall(backend, frame)?;
        backend.read_texture(
            &record.gpu,
            record.native_format(),
            record.width(),
            record.height(),
        )
    }

    /// Write vertex data at `dest_offset` bytes into the mesh's vertex buffer.
    ///
    /// The buffer grows (discarding its old contents) when the write does not
    /// fit. `format` describes the vertex layout used by later draws.
    pub fn set_mesh_vertex_data(
        &mut self,
        mesh: MeshHandle,
        data: &[u8],
        dest_offset: u64,
        format: &VertexFormat,
    ) -> Result<(), GraphicsError> {
        self.write_mesh_buffer(mesh, MeshBuffer::Vertex, data, dest_offset)?;
        self.mesh_record_mut(mesh)?.vertex_format = Some(format.clone());
        Ok(())
    }

    pub fn set_mesh_index_data(
        &mut self,
        mesh: MeshHandle,
        data: &[u8],
        dest_offset: u64,
        format: IndexFormat,
    ) -> Result<(), GraphicsError> {
        self.write_mesh_buffer(mesh, MeshBuffer::Index, data, dest_offset)?;
        self.mesh_record_mut(mesh)?.index_format = format;
        Ok(())
    }

    /// Write per-instance vertex data into the mesh's instance buffer.
    pub fn set_mesh_instance_data(
        &mut self,
        mesh: MeshHandle,
        data: &[u8],
        dest_offset: u64,
        format: &VertexFormat,
    ) -> Result<(), GraphicsError> {
        self.write_mesh_buffer(mesh, MeshBuffer::Instance, data, dest_offset)?;
        self.mesh_record_mut(mesh)?.instance_format = Some(format.clone());
        Ok(())
    }

    fn mesh_record_mut(
        &mut self,
        mesh: MeshHandle,
    ) -> Result<&mut crate::resources::MeshRecord, GraphicsError> {
        let device = self.device.as_ref().ok_or(GraphicsError::DeviceNotReady)?;
        self.registry.mesh_mut(mesh, device.id)
    }

    fn write_mesh_buffer(
        &mut self,
        mesh: MeshHandle,
        which: MeshBuffer,
        data: &[u8],
        dest_offset: u64,
    ) -> Result<(), GraphicsError> {
        ember_core::profile_function!();
        let Self { device, registry } = self;
        let Device {
            id, backend, frame, ..
        } = device.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        let frame = frame.as_mut().ok_or(GraphicsError::DeviceNotReady)?;
        let record = registry.mesh_mut(mesh, *id)?;

        if data.is_empty() {
            return Err(GraphicsError::InvalidParameter(format!(
                "empty {} upload",
                which.label()
            )));
        }
        let alignment = backend.buffer_copy_alignment();
        if dest_offset % alignment != 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} offset {dest_offset} is not a multiple of {alignment}",
                which.label()
            )));
        }
        let padded_len = (data.len() as u64).next_multiple_of(alignment);
        let required = dest_offset + padded_len;

        let slot = record.buffer_slot(which);
        if slot.as_ref().is_none_or(|buffer| !buffer.fits(required)) {
            let current = slot.as_ref().map_or(0, BufferRecord::capacity);
            let capacity = grown_capacity(current, required);
            let usage = match which {
                MeshBuffer::Index => BufferUsage::INDEX | BufferUsage::COPY_DST,
                MeshBuffer::Vertex | MeshBuffer::Instance => {
                    BufferUsage::VERTEX | BufferUsage::COPY_DST
                }
            };
            let gpu = backend
                .create_buffer(&BufferDescriptor::new(capacity, usage).with_label(which.label()))?;
            if let Some(old) = slot.replace(BufferRecord::new(gpu, capacity)) {
                backend.release_buffer(old.gpu);
            }
            frame.passes.forget_mesh(mesh);
            log::trace!(
                "Mesh {mesh:?} {} buffer grown {current} -> {capacity} bytes",
                which.label()
            );
        }
        let Some(buffer) = slot.as_mut() else {
            return Err(GraphicsError::Internal(format!(
                "mesh {mesh:?} lost its {} buffer",
                which.label()
            )));
        };
        buffer.dirty = true;
        buffer.record_write(dest_offset, data);

        stage(
            backend,
            frame,
            RingKind::Buffer,
            buffer.contents(dest_offset, padded_len),
            alignment,
            UploadDst::Buffer {
                buffer: &buffer.gpu,
                offset: dest_offset,
            },
        )
    }
}
