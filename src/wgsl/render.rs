//! Shader source rendering — deterministic template expansion.
//!
//! Assembles the declaration block (storage buffers with their assigned
//! binding indices, captured scalars inside one uniform block laid out by
//! the binding allocator), translated user functions in call-graph order
//! (callees before callers), and the compute entry point.
//!
//! The entry point receives the implicit per-invocation thread identifier
//! and opens with a bounds guard so excess threads at the grid edges no-op
//! instead of writing out of range.
//!
//! Rendering has no side effects and is idempotent: identical IR and
//! descriptors always produce byte-identical source.

use crate::binding::{layout_scalars, ConstantBufferLayout, FieldDescriptor, FieldKind};
use crate::cache::signature::{signature_of, Signature};
use crate::closure::Inspection;
use crate::error::KernelError;
use crate::ir::IrMethod;

use super::{translate_body, TranslationCtx};

/// Threads per workgroup along x. Grids are covered by
/// `ceil(x / WORKGROUP_SIZE) × y × z` workgroups.
pub const WORKGROUP_SIZE: u32 = 64;

/// A rendered shader: source text, the field descriptors it was rendered
/// from, their constant-buffer layout, and the shape-only signature.
/// Immutable after rendering.
#[derive(Clone, Debug)]
pub struct ShaderProgram {
    pub source: String,
    pub fields: Vec<FieldDescriptor>,
    pub layout: ConstantBufferLayout,
    pub signature: Signature,
}

/// Render an inspection into a complete WGSL compute shader.
pub fn render(inspection: &Inspection) -> Result<ShaderProgram, KernelError> {
    let layout = layout_scalars(&inspection.fields);
    let ctx = TranslationCtx::new(&inspection.fields, &inspection.methods);

    let mut source = String::new();
    render_params_struct(&inspection.fields, &layout, &mut source);
    render_bindings(&inspection.fields, &mut source);

    for (ordinal, method) in inspection
        .methods
        .iter()
        .filter(|m| !m.is_entry)
        .enumerate()
    {
        render_function(method, ordinal, &ctx, &mut source)?;
    }

    let entry = inspection
        .methods
        .iter()
        .find(|m| m.is_entry)
        .ok_or_else(|| KernelError::UnsupportedConstruct {
            detail: "translation unit has no entry point".into(),
        })?;
    render_entry(entry, &ctx, &mut source)?;

    Ok(ShaderProgram {
        source,
        fields: inspection.fields.clone(),
        layout,
        signature: signature_of(inspection),
    })
}

// ─── Declaration Block ──────────────────────────────────────────────

fn render_params_struct(
    fields: &[FieldDescriptor],
    layout: &ConstantBufferLayout,
    out: &mut String,
) {
    out.push_str("struct Params {\n");
    out.push_str("    grid_x: u32,\n");
    out.push_str("    grid_y: u32,\n");
    out.push_str("    grid_z: u32,\n");
    out.push_str("    _pad0: u32,\n");

    let mut cursor = crate::binding::GRID_HEADER_BYTES;
    let mut pad_counter = 1u32;
    for slot in &layout.slots {
        // Explicit padding members realize the allocator's byte offsets.
        while cursor < slot.byte_offset {
            out.push_str(&format!("    _pad{}: u32,\n", pad_counter));
            pad_counter += 1;
            cursor += 4;
        }
        let field = &fields[slot.field_index];
        out.push_str(&format!(
            "    {}: {},\n",
            field.rendered_name(),
            super::uniform_member_type(&slot.ty)
        ));
        cursor = slot.byte_offset + slot.byte_size;
    }
    out.push_str("}\n\n");
    out.push_str("@group(0) @binding(0) var<uniform> params: Params;\n");
}

fn render_bindings(fields: &[FieldDescriptor], out: &mut String) {
    for field in fields {
        let access = match field.kind {
            FieldKind::Scalar => continue,
            FieldKind::ReadOnlyBuffer => "read",
            FieldKind::ReadWriteBuffer => "read_write",
        };
        out.push_str(&format!(
            "@group(0) @binding({}) var<storage, {}> {}: array<{}>;\n",
            field.device_slot(),
            access,
            field.rendered_name(),
            field.declared.wgsl()
        ));
    }
    out.push('\n');
}

// ─── Function Bodies ────────────────────────────────────────────────

fn render_function(
    method: &IrMethod,
    ordinal: usize,
    ctx: &TranslationCtx,
    out: &mut String,
) -> Result<(), KernelError> {
    let params = method
        .params
        .iter()
        .map(|(name, ty)| format!("{}: {}", name, ty.wgsl()))
        .collect::<Vec<_>>()
        .join(", ");
    match &method.return_type {
        Some(ret) => out.push_str(&format!("fn f{}({}) -> {} {{\n", ordinal, params, ret.wgsl())),
        None => out.push_str(&format!("fn f{}({}) {{\n", ordinal, params)),
    }
    translate_body(&method.body, ctx, 1, out)?;
    out.push_str("}\n\n");
    Ok(())
}

fn render_entry(
    entry: &IrMethod,
    ctx: &TranslationCtx,
    out: &mut String,
) -> Result<(), KernelError> {
    out.push_str(&format!(
        "@compute @workgroup_size({}, 1, 1)\n",
        WORKGROUP_SIZE
    ));
    out.push_str("fn main(@builtin(global_invocation_id) gid: vec3<u32>) {\n");
    // Excess edge threads must never dereference past the grid extent.
    out.push_str(
        "    if (gid.x >= params.grid_x || gid.y >= params.grid_y || gid.z >= params.grid_z) {\n",
    );
    out.push_str("        return;\n");
    out.push_str("    }\n");
    translate_body(&entry.body, ctx, 1, out)?;
    out.push_str("}\n");
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────
