//! WGSL translation — maps kernel IR nodes to shading-language text.
//!
//! The mapping is pure and context-free: operators map one-to-one, a fixed
//! catalog of intrinsic names maps to WGSL builtins, buffer indexers map to
//! the storage-buffer indexer syntax keyed by the field's assigned binding
//! index, and captured scalars map to a dotted path into the rendered
//! constant buffer. Control flow maps structurally 1:1.
//!
//! Rendered names are positional (`s0`, `b1`, `f0`), so generated source
//! depends only on the kernel's shape, never on capture or function names.
//!
//! Anything the target language cannot express fails with
//! `UnsupportedConstruct` at translation time; nothing degrades silently.

pub mod render;

pub use render::{render, ShaderProgram, WORKGROUP_SIZE};

use std::collections::HashMap;

use crate::binding::{FieldDescriptor, FieldKind};
use crate::error::KernelError;
use crate::ir::{IrExpr, IrMethod, IrStmt, Literal, ScalarType, TypeRef};

// ─── Intrinsic Catalog ──────────────────────────────────────────────

/// Resolve an intrinsic function name to its WGSL spelling.
///
/// The catalog is fixed; the inspector builds its resolution table against
/// it, so a name missing here is simply not an intrinsic.
pub fn intrinsic(name: &str) -> Option<&'static str> {
    Some(match name {
        // Trigonometric
        "sin" => "sin",
        "cos" => "cos",
        "tan" => "tan",
        "asin" => "asin",
        "acos" => "acos",
        "atan" => "atan",
        "atan2" => "atan2",
        "sinh" => "sinh",
        "cosh" => "cosh",
        "tanh" => "tanh",
        // Exponential
        "exp" => "exp",
        "exp2" => "exp2",
        "log" => "log",
        "log2" => "log2",
        "pow" => "pow",
        "sqrt" => "sqrt",
        "rsqrt" => "inverseSqrt",
        // Rounding
        "floor" => "floor",
        "ceil" => "ceil",
        "round" => "round",
        "trunc" => "trunc",
        "frac" => "fract",
        "fract" => "fract",
        // Common math
        "abs" => "abs",
        "sign" => "sign",
        "min" => "min",
        "max" => "max",
        "clamp" => "clamp",
        "saturate" => "saturate",
        "lerp" => "mix",
        "mix" => "mix",
        "step" => "step",
        "smoothstep" => "smoothstep",
        "fma" => "fma",
        // Type conversions
        "f32" => "f32",
        "i32" => "i32",
        "u32" => "u32",
        _ => return None,
    })
}

// ─── Translation Context ────────────────────────────────────────────

/// Name-to-slot lookups for one translation unit, built from the
/// inspector's field descriptors and method order.
pub(crate) struct TranslationCtx<'a> {
    /// Captured scalar name → (positional index, declared type).
    scalars: HashMap<&'a str, (u32, TypeRef)>,
    /// Captured buffer name → (positional index, read-only).
    buffers: HashMap<&'a str, (u32, bool)>,
    /// User function name → positional index in call-graph order.
    functions: HashMap<&'a str, usize>,
}

impl<'a> TranslationCtx<'a> {
    pub(crate) fn new(fields: &'a [FieldDescriptor], methods: &'a [IrMethod]) -> Self {
        let mut scalars = HashMap::new();
        let mut buffers = HashMap::new();
        for field in fields {
            match field.kind {
                FieldKind::Scalar => {
                    scalars.insert(field.name.as_str(), (field.binding_index, field.declared));
                }
                FieldKind::ReadOnlyBuffer => {
                    buffers.insert(field.name.as_str(), (field.binding_index, true));
                }
                FieldKind::ReadWriteBuffer => {
                    buffers.insert(field.name.as_str(), (field.binding_index, false));
                }
            }
        }
        let functions = methods
            .iter()
            .filter(|m| !m.is_entry)
            .enumerate()
            .map(|(i, m)| (m.name.as_str(), i))
            .collect();
        Self {
            scalars,
            buffers,
            functions,
        }
    }

    /// Rendered name of a user function.
    pub(crate) fn function_name(&self, name: &str) -> Option<String> {
        self.functions.get(name).map(|i| format!("f{}", i))
    }
}

/// WGSL spelling of a type as a uniform-block member. Bool is not
/// host-shareable, so it is stored as a u32 word.
pub(crate) fn uniform_member_type(ty: &TypeRef) -> String {
    match ty {
        TypeRef::Scalar(ScalarType::Bool) => "u32".to_string(),
        other => other.wgsl(),
    }
}

// ─── Statement Translation ──────────────────────────────────────────

/// Translate a method body into indented WGSL statements.
pub(crate) fn translate_body(
    body: &[IrStmt],
    ctx: &TranslationCtx,
    indent: usize,
    out: &mut String,
) -> Result<(), KernelError> {
    let pad = "    ".repeat(indent);
    for stmt in body {
        match stmt {
            IrStmt::Let { name, ty, value } => {
                let value = translate_expr(value, ctx)?;
                match ty {
                    Some(ty) => {
                        out.push_str(&format!("{}var {}: {} = {};\n", pad, name, ty.wgsl(), value))
                    }
                    None => out.push_str(&format!("{}var {} = {};\n", pad, name, value)),
                }
            }
            IrStmt::Assign { name, value } => {
                let value = translate_expr(value, ctx)?;
                out.push_str(&format!("{}{} = {};\n", pad, name, value));
            }
            IrStmt::Store {
                buffer,
                index,
                value,
            } => {
                let Some((slot, read_only)) = ctx.buffers.get(buffer.as_str()) else {
                    return Err(KernelError::UnsupportedConstruct {
                        detail: format!("store target `{}` is not a captured buffer", buffer),
                    });
                };
                if *read_only {
                    return Err(KernelError::UnsupportedConstruct {
                        detail: format!("write to read-only buffer `{}`", buffer),
                    });
                }
                let index = translate_expr(index, ctx)?;
                let value = translate_expr(value, ctx)?;
                out.push_str(&format!("{}b{}[{}] = {};\n", pad, slot, index, value));
            }
            IrStmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = translate_expr(cond, ctx)?;
                out.push_str(&format!("{}if ({}) {{\n", pad, cond));
                translate_body(then_body, ctx, indent + 1, out)?;
                if else_body.is_empty() {
                    out.push_str(&format!("{}}}\n", pad));
                } else {
                    out.push_str(&format!("{}}} else {{\n", pad));
                    translate_body(else_body, ctx, indent + 1, out)?;
                    out.push_str(&format!("{}}}\n", pad));
                }
            }
            IrStmt::For {
                var,
                begin,
                end,
                body,
            } => {
                let begin = translate_expr(begin, ctx)?;
                let end = translate_expr(end, ctx)?;
                out.push_str(&format!(
                    "{}for (var {} = {}; {} < {}; {}++) {{\n",
                    pad, var, begin, var, end, var
                ));
                translate_body(body, ctx, indent + 1, out)?;
                out.push_str(&format!("{}}}\n", pad));
            }
            IrStmt::While { cond, body } => {
                let cond = translate_expr(cond, ctx)?;
                out.push_str(&format!("{}while ({}) {{\n", pad, cond));
                translate_body(body, ctx, indent + 1, out)?;
                out.push_str(&format!("{}}}\n", pad));
            }
            IrStmt::Return(Some(value)) => {
                let value = translate_expr(value, ctx)?;
                out.push_str(&format!("{}return {};\n", pad, value));
            }
            IrStmt::Return(None) => out.push_str(&format!("{}return;\n", pad)),
            IrStmt::Expr(expr) => {
                // WGSL only admits calls as expression statements.
                if !matches!(expr, IrExpr::Call { .. }) {
                    return Err(KernelError::UnsupportedConstruct {
                        detail: "expression statement must be a call".into(),
                    });
                }
                let expr = translate_expr(expr, ctx)?;
                out.push_str(&format!("{}{};\n", pad, expr));
            }
        }
    }
    Ok(())
}

// ─── Expression Translation ─────────────────────────────────────────

pub(crate) fn translate_expr(
    expr: &IrExpr,
    ctx: &TranslationCtx,
) -> Result<String, KernelError> {
    Ok(match expr {
        IrExpr::Literal(lit) => translate_literal(lit),
        IrExpr::Local(name) => name.clone(),
        IrExpr::Capture(name) => {
            if let Some((slot, declared)) = ctx.scalars.get(name.as_str()) {
                // Bools live in the uniform block as u32 words.
                if *declared == TypeRef::Scalar(ScalarType::Bool) {
                    format!("(params.s{} != 0u)", slot)
                } else {
                    format!("params.s{}", slot)
                }
            } else if ctx.buffers.contains_key(name.as_str()) {
                return Err(KernelError::UnsupportedConstruct {
                    detail: format!(
                        "buffer `{}` can only be accessed through an indexer",
                        name
                    ),
                });
            } else {
                return Err(KernelError::UnsupportedConstruct {
                    detail: format!("reference to unknown capture `{}`", name),
                });
            }
        }
        IrExpr::ThreadId(axis) => format!("gid.{}", axis.component()),
        IrExpr::Member { base, member } => {
            format!("{}.{}", translate_expr(base, ctx)?, member)
        }
        IrExpr::Unary { op, operand } => {
            format!("({}{})", op.token(), translate_expr(operand, ctx)?)
        }
        IrExpr::Binary { op, lhs, rhs } => format!(
            "({} {} {})",
            translate_expr(lhs, ctx)?,
            op.token(),
            translate_expr(rhs, ctx)?
        ),
        IrExpr::Call { callee, args } => {
            let args = args
                .iter()
                .map(|a| translate_expr(a, ctx))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ");
            if let Some(rendered) = ctx.function_name(callee) {
                format!("{}({})", rendered, args)
            } else if let Some(builtin) = intrinsic(callee) {
                format!("{}({})", builtin, args)
            } else {
                return Err(KernelError::AmbiguousOverload {
                    name: callee.clone(),
                    detail: "resolves to no known intrinsic or user function".into(),
                });
            }
        }
        IrExpr::Index { buffer, index } => {
            let Some((slot, _)) = ctx.buffers.get(buffer.as_str()) else {
                return Err(KernelError::UnsupportedConstruct {
                    detail: format!("indexer target `{}` is not a captured buffer", buffer),
                });
            };
            format!("b{}[{}]", slot, translate_expr(index, ctx)?)
        }
    })
}

fn translate_literal(lit: &Literal) -> String {
    match lit {
        // Debug formatting keeps the decimal point WGSL requires for
        // float literals (`3.0`, not `3`).
        Literal::F32(v) => format!("{:?}", v),
        Literal::I32(v) => format!("{}", v),
        Literal::U32(v) => format!("{}u", v),
        Literal::Bool(v) => format!("{}", v),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
