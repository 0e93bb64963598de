//! Dispatch — binding validation, constant-buffer packing, and the
//! compute pass itself.
//!
//! A dispatch borrows the caller's buffers for its duration and blocks
//! until the device has finished, so once [`run`] returns every
//! read-write buffer holds the kernel's output.

use wgpu::util::DeviceExt;

use super::{GpuBuffer, GpuDevice};
use crate::binding::{FieldKind, PARAMS_BINDING};
use crate::cache::CompiledShader;
use crate::closure::{CaptureValue, KernelDescriptor};
use crate::error::KernelError;
use crate::wgsl::WORKGROUP_SIZE;

// ─── Grid Shape ─────────────────────────────────────────────────────

/// The iteration domain of one dispatch: one thread per grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridShape {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl GridShape {
    pub fn d1(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    pub fn d2(x: u32, y: u32) -> Self {
        Self { x, y, z: 1 }
    }

    pub fn d3(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Total cell count.
    pub fn total(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// Workgroup counts covering the grid. The x axis is rounded up to
    /// the workgroup width; the bounds guard in the shader retires the
    /// excess threads.
    pub fn workgroups(&self) -> (u32, u32, u32) {
        (self.x.div_ceil(WORKGROUP_SIZE), self.y, self.z)
    }
}

// ─── Dispatch ───────────────────────────────────────────────────────

/// Validate the dispatch-time captures against the compiled shape, pack
/// the constant buffer, and run one compute pass to completion.
pub(crate) fn run(
    device: &GpuDevice,
    shader: &CompiledShader,
    grid: GridShape,
    desc: &KernelDescriptor,
) -> Result<(), KernelError> {
    if grid.total() == 0 {
        return Ok(());
    }

    let fields = &shader.program.fields;
    if fields.len() != desc.captures.len() {
        return Err(KernelError::BindingMismatch {
            detail: format!(
                "shader was compiled against {} captures, dispatch supplies {}",
                fields.len(),
                desc.captures.len()
            ),
        });
    }

    // Fields are positional over the capture sequence; validation is by
    // kind and declared type only. Names are not part of the compiled
    // shape — a cache hit from a renamed kernel carries the first
    // kernel's capture names and must still dispatch.
    let mut buffers: Vec<(u32, GpuBuffer)> = Vec::new();
    for (field, capture) in fields.iter().zip(&desc.captures) {
        match &capture.value {
            CaptureValue::Scalar(v) => {
                if field.kind != FieldKind::Scalar || v.type_ref() != field.declared {
                    return Err(KernelError::BindingMismatch {
                        detail: format!(
                            "capture `{}` is a {} scalar, compiled shape expects {}",
                            capture.name,
                            v.type_ref(),
                            field.declared
                        ),
                    });
                }
            }
            CaptureValue::Buffer(b) => {
                let expected_kind = if b.is_read_only() {
                    FieldKind::ReadOnlyBuffer
                } else {
                    FieldKind::ReadWriteBuffer
                };
                if field.kind != expected_kind
                    || field.declared != crate::ir::TypeRef::Scalar(b.elem())
                {
                    return Err(KernelError::BindingMismatch {
                        detail: format!(
                            "buffer `{}` does not match the compiled shape",
                            capture.name
                        ),
                    });
                }
                buffers.push((field.device_slot(), b.clone()));
            }
            CaptureValue::DeferredBuffer { .. } => {
                return Err(KernelError::BindingMismatch {
                    detail: format!("no device buffer bound to `{}`", capture.name),
                });
            }
            CaptureValue::ClosureRef(_) | CaptureValue::Opaque { .. } => {
                return Err(KernelError::BindingMismatch {
                    detail: format!("capture `{}` is not dispatchable", capture.name),
                });
            }
        }
    }

    // Constant buffer: grid header, then captured scalars at the offsets
    // the compiled layout assigned.
    let layout = &shader.program.layout;
    let mut uniform = vec![0u8; layout.total_size as usize];
    uniform[0..4].copy_from_slice(&grid.x.to_le_bytes());
    uniform[4..8].copy_from_slice(&grid.y.to_le_bytes());
    uniform[8..12].copy_from_slice(&grid.z.to_le_bytes());
    for slot in &layout.slots {
        if let CaptureValue::Scalar(v) = &desc.captures[slot.field_index].value {
            let bytes = v.to_bytes();
            let start = slot.byte_offset as usize;
            uniform[start..start + bytes.len()].copy_from_slice(&bytes);
        }
    }

    let params_buf = device
        .device()
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("riptide_params"),
            contents: &uniform,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

    let mut entries = vec![wgpu::BindGroupEntry {
        binding: PARAMS_BINDING,
        resource: params_buf.as_entire_binding(),
    }];
    for (slot, buffer) in &buffers {
        entries.push(wgpu::BindGroupEntry {
            binding: *slot,
            resource: buffer.raw().as_entire_binding(),
        });
    }

    let bind_group_layout = shader.pipeline.get_bind_group_layout(0);
    let bind_group = device
        .device()
        .create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("riptide_bind_group"),
            layout: &bind_group_layout,
            entries: &entries,
        });

    device
        .device()
        .push_error_scope(wgpu::ErrorFilter::Validation);

    let (wx, wy, wz) = grid.workgroups();
    let mut encoder = device
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("riptide_dispatch"),
        });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("riptide_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&shader.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(wx, wy, wz);
    }
    device.queue().submit(std::iter::once(encoder.finish()));

    if let Some(error) = pollster::block_on(device.device().pop_error_scope()) {
        return Err(KernelError::DeviceExecution {
            message: error.to_string(),
        });
    }

    // Synchronous semantics: block until the pass has retired.
    device.device().poll(wgpu::Maintain::Wait);
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────
