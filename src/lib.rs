//! Riptide — closure-shaped kernels compiled to WGSL and dispatched on
//! the GPU through wgpu.
//!
//! A kernel is described structurally as a [`KernelDescriptor`]: captured
//! scalars and buffer handles, an entry body in kernel IR, and the user
//! functions the body calls. One call runs the whole pipeline:
//!
//! ```text
//! KernelDescriptor ─→ inspect   → fields + call-graph-ordered methods
//!                  ─→ signature → BLAKE3 over the kernel's shape
//!                  ─→ cache     → hit: reuse pipeline
//!                  ─→ render    → miss: WGSL source
//!                  ─→ compile   → device pipeline, cached by signature
//!                  ─→ dispatch  → one thread per grid cell, synchronous
//! ```
//!
//! Captured scalar values never enter the signature, so redispatching
//! with new values is a lookup plus one uniform upload. Anything the
//! target cannot express fails with a typed [`KernelError`] before the
//! device is touched.

pub mod binding;
pub mod cache;
pub mod closure;
pub mod error;
pub mod gpu;
pub mod ir;
pub mod wgsl;

pub use binding::{FieldDescriptor, FieldKind};
pub use cache::{signature_of, CompiledShader, ShaderCache, Signature};
pub use closure::{inspect, Capture, Inspection, KernelDescriptor, KernelSource, ScalarValue};
pub use error::KernelError;
pub use gpu::{Element, GpuBuffer, GpuDevice, GridShape};
pub use ir::{IrExpr, IrMethod, IrStmt, ScalarType, TypeRef};
pub use wgsl::{render, ShaderProgram, WORKGROUP_SIZE};
