//! Resource binding — field descriptors and constant-buffer layout.
//!
//! A [`FieldDescriptor`] records one captured value's name, declared type
//! and binding classification. Descriptors are produced once per
//! translation by the inspector, in first-discovery order, and are
//! immutable afterwards.
//!
//! Slot policy:
//! - WGSL binding 0 is reserved for the uniform (constant) buffer.
//! - Storage buffers take bindings `1..=N` in discovery order; read-only
//!   and read-write buffers share one numbering space on the device even
//!   though their `binding_index` counters are per kind.
//! - Captured scalars are packed into the constant buffer by
//!   [`layout_scalars`], a pure function of the descriptor sequence, so a
//!   cached shader's byte offsets stay valid across dispatches with
//!   different captured values but the same shape.

use crate::ir::TypeRef;

/// WGSL binding slot of the constant (uniform) buffer.
pub const PARAMS_BINDING: u32 = 0;

/// Constant-buffer row width. No scalar field straddles a row; padding is
/// inserted instead.
pub const CBUFFER_ALIGN: u32 = 16;

/// The constant buffer opens with a fixed header holding the grid bounds
/// (grid_x, grid_y, grid_z, pad) consumed by the entry point's bounds guard.
pub const GRID_HEADER_BYTES: u32 = 16;

// ─── Field Descriptors ──────────────────────────────────────────────

/// Binding classification of one captured value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Constant scalar, packed into the constant buffer.
    Scalar,
    /// Read-only storage buffer.
    ReadOnlyBuffer,
    /// Read-write storage buffer.
    ReadWriteBuffer,
}

impl FieldKind {
    pub fn is_buffer(&self) -> bool {
        !matches!(self, FieldKind::Scalar)
    }
}

/// Metadata for one captured value. `binding_index` is unique within its
/// kind's numbering space (buffers share one counter, scalars another) and
/// assigned in first-discovery order.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    /// The captured value's type: the scalar/vector type for a scalar
    /// capture, the element type for a buffer capture.
    pub declared: TypeRef,
    pub kind: FieldKind,
    pub binding_index: u32,
}

impl FieldDescriptor {
    /// Device binding slot for a buffer field (uniform sits at slot 0).
    pub fn device_slot(&self) -> u32 {
        debug_assert!(self.kind.is_buffer());
        PARAMS_BINDING + 1 + self.binding_index
    }

    /// Rendered WGSL name. Positional, so generated source depends only on
    /// shape, never on capture names.
    pub fn rendered_name(&self) -> String {
        match self.kind {
            FieldKind::Scalar => format!("s{}", self.binding_index),
            _ => format!("b{}", self.binding_index),
        }
    }
}

// ─── Constant Buffer Layout ─────────────────────────────────────────

/// One scalar field's place inside the constant buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarSlot {
    /// Index of the field in the full descriptor sequence.
    pub field_index: usize,
    pub ty: TypeRef,
    pub byte_offset: u32,
    pub byte_size: u32,
}

/// Packed layout of all captured scalars, plus the grid header.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantBufferLayout {
    pub slots: Vec<ScalarSlot>,
    /// Total upload size, rounded up to [`CBUFFER_ALIGN`]. Includes the
    /// grid header.
    pub total_size: u32,
}

fn align_to(offset: u32, align: u32) -> u32 {
    (offset + align - 1) / align * align
}

/// Compute the constant-buffer layout for an ordered descriptor sequence.
///
/// Pure function: identical descriptor sequences always produce identical
/// layouts. Fields are packed in discovery order; a field that would
/// straddle a 16-byte row is pushed to the next row.
pub fn layout_scalars(fields: &[FieldDescriptor]) -> ConstantBufferLayout {
    let mut slots = Vec::new();
    let mut offset = GRID_HEADER_BYTES;

    for (field_index, field) in fields.iter().enumerate() {
        if field.kind != FieldKind::Scalar {
            continue;
        }
        let size = field.declared.byte_size();
        offset = align_to(offset, field.declared.cbuffer_align());
        // Row-straddle rule: never split a field across a 16-byte row.
        if offset / CBUFFER_ALIGN != (offset + size - 1) / CBUFFER_ALIGN {
            offset = align_to(offset, CBUFFER_ALIGN);
        }
        slots.push(ScalarSlot {
            field_index,
            ty: field.declared,
            byte_offset: offset,
            byte_size: size,
        });
        offset += size;
    }

    ConstantBufferLayout {
        slots,
        total_size: align_to(offset, CBUFFER_ALIGN),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
