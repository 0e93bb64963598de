//! Device buffers and synchronous readback.
//!
//! A [`GpuBuffer`] is a typed handle over one storage buffer: element
//! type, element count, and the mutability the kernel side sees. Handles
//! are cheap clones of the underlying device resource; the caller owns
//! allocation and lifetime, dispatches only borrow.
//!
//! Readback is synchronous: copy into a staging buffer, map, block until
//! the device signals completion.

use std::sync::mpsc;

use wgpu::util::DeviceExt;

use super::GpuDevice;
use crate::error::KernelError;
use crate::ir::ScalarType;

/// Host types that can live in a storage buffer.
pub trait Element: bytemuck::Pod {
    fn scalar_type() -> ScalarType;
}

impl Element for f32 {
    fn scalar_type() -> ScalarType {
        ScalarType::F32
    }
}

impl Element for i32 {
    fn scalar_type() -> ScalarType {
        ScalarType::I32
    }
}

impl Element for u32 {
    fn scalar_type() -> ScalarType {
        ScalarType::U32
    }
}

/// A typed handle to one device storage buffer.
#[derive(Clone, Debug)]
pub struct GpuBuffer {
    buffer: wgpu::Buffer,
    len: usize,
    elem: ScalarType,
    read_only: bool,
}

impl GpuBuffer {
    /// Element count.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element type.
    pub fn elem(&self) -> ScalarType {
        self.elem
    }

    /// Whether kernels may only read this buffer.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn byte_size(&self) -> u64 {
        self.len as u64 * self.elem.byte_size() as u64
    }

    pub(crate) fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

impl GpuDevice {
    /// Allocate a storage buffer initialized from host data.
    pub fn alloc<T: Element>(&self, contents: &[T], read_only: bool) -> GpuBuffer {
        let buffer = self
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("riptide_storage"),
                contents: bytemuck::cast_slice(contents),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
            });
        GpuBuffer {
            buffer,
            len: contents.len(),
            elem: T::scalar_type(),
            read_only,
        }
    }

    /// Allocate a zero-filled read-write storage buffer of `len` elements.
    pub fn alloc_zeroed<T: Element>(&self, len: usize) -> GpuBuffer {
        let buffer = self.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("riptide_storage"),
            size: len as u64 * T::scalar_type().byte_size() as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        GpuBuffer {
            buffer,
            len,
            elem: T::scalar_type(),
            read_only: false,
        }
    }

    /// Overwrite a buffer's contents from host data.
    pub fn write<T: Element>(&self, buffer: &GpuBuffer, data: &[T]) -> Result<(), KernelError> {
        if T::scalar_type() != buffer.elem || data.len() != buffer.len {
            return Err(KernelError::BindingMismatch {
                detail: format!(
                    "write of {} {} elements into a buffer of {} {} elements",
                    data.len(),
                    T::scalar_type().wgsl(),
                    buffer.len,
                    buffer.elem.wgsl()
                ),
            });
        }
        self.queue()
            .write_buffer(buffer.raw(), 0, bytemuck::cast_slice(data));
        Ok(())
    }

    /// Copy a buffer's contents back to the host, blocking until the
    /// device has finished all submitted work touching it.
    pub fn read_back<T: Element>(&self, buffer: &GpuBuffer) -> Result<Vec<T>, KernelError> {
        if T::scalar_type() != buffer.elem {
            return Err(KernelError::BindingMismatch {
                detail: format!(
                    "readback as {} from a buffer of {}",
                    T::scalar_type().wgsl(),
                    buffer.elem.wgsl()
                ),
            });
        }
        if buffer.len == 0 {
            return Ok(Vec::new());
        }

        let size = buffer.byte_size();
        let staging = self.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("riptide_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("riptide_readback"),
            });
        encoder.copy_buffer_to_buffer(buffer.raw(), 0, &staging, 0, size);
        self.queue().submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device().poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| KernelError::DeviceExecution {
                message: "readback channel closed before the map completed".into(),
            })?
            .map_err(|e| KernelError::DeviceExecution {
                message: format!("buffer map failed: {}", e),
            })?;

        let data = slice.get_mapped_range();
        let out: Vec<T> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(out)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
