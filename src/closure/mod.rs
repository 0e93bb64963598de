//! Kernel descriptors — the structural view of a data-parallel closure.
//!
//! Rust has no runtime reflection over closures, so the "closure" the
//! pipeline consumes is an explicit [`KernelDescriptor`]: the entry body,
//! the captured variable list (name + current value or buffer handle), and
//! every user function the body statically calls. The inspector
//! ([`inspect`]) extracts field descriptors and translatable IR from it in
//! one shot; nothing downstream keeps a live dependency on the descriptor.

pub mod inspect;

pub use inspect::{inspect, Inspection};

use crate::gpu::GpuBuffer;
use crate::ir::{IrStmt, ScalarType, TypeRef};

// ─── Captured Values ────────────────────────────────────────────────

/// The current value of a captured scalar, packed into the constant
/// buffer at dispatch time. Bools are uploaded as a 4-byte word.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScalarValue {
    F32(f32),
    I32(i32),
    U32(u32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl ScalarValue {
    /// Declared type of this value.
    pub fn type_ref(&self) -> TypeRef {
        match self {
            ScalarValue::F32(_) => TypeRef::Scalar(ScalarType::F32),
            ScalarValue::I32(_) => TypeRef::Scalar(ScalarType::I32),
            ScalarValue::U32(_) => TypeRef::Scalar(ScalarType::U32),
            ScalarValue::Bool(_) => TypeRef::Scalar(ScalarType::Bool),
            ScalarValue::Vec2(_) => TypeRef::Vector(ScalarType::F32, 2),
            ScalarValue::Vec3(_) => TypeRef::Vector(ScalarType::F32, 3),
            ScalarValue::Vec4(_) => TypeRef::Vector(ScalarType::F32, 4),
        }
    }

    /// Little-endian device bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ScalarValue::F32(v) => v.to_le_bytes().to_vec(),
            ScalarValue::I32(v) => v.to_le_bytes().to_vec(),
            ScalarValue::U32(v) => v.to_le_bytes().to_vec(),
            ScalarValue::Bool(v) => (*v as u32).to_le_bytes().to_vec(),
            ScalarValue::Vec2(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            ScalarValue::Vec3(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            ScalarValue::Vec4(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        }
    }
}

/// What a capture binds to.
#[derive(Clone, Debug)]
pub enum CaptureValue {
    /// A constant scalar value.
    Scalar(ScalarValue),
    /// A live device buffer (caller-owned; must outlive any dispatch
    /// referencing it).
    Buffer(GpuBuffer),
    /// A buffer capture by shape only, for translating and compiling a
    /// kernel ahead of allocating its buffers. Dispatching with one bound
    /// is a [`BindingMismatch`](crate::KernelError::BindingMismatch).
    DeferredBuffer { elem: ScalarType, read_only: bool },
    /// A reference to another closure. No translation rule exists.
    ClosureRef(String),
    /// Any other host value. No translation rule exists.
    Opaque { type_name: String },
}

/// One captured variable: its name and its current value or handle.
#[derive(Clone, Debug)]
pub struct Capture {
    pub name: String,
    pub value: CaptureValue,
}

impl Capture {
    pub fn scalar(name: impl Into<String>, value: ScalarValue) -> Self {
        Self {
            name: name.into(),
            value: CaptureValue::Scalar(value),
        }
    }

    pub fn f32(name: impl Into<String>, value: f32) -> Self {
        Self::scalar(name, ScalarValue::F32(value))
    }

    pub fn u32(name: impl Into<String>, value: u32) -> Self {
        Self::scalar(name, ScalarValue::U32(value))
    }

    pub fn i32(name: impl Into<String>, value: i32) -> Self {
        Self::scalar(name, ScalarValue::I32(value))
    }

    /// Capture a live device buffer. Mutability classification follows the
    /// buffer's own read-only flag.
    pub fn buffer(name: impl Into<String>, buffer: &GpuBuffer) -> Self {
        Self {
            name: name.into(),
            value: CaptureValue::Buffer(buffer.clone()),
        }
    }

    /// Capture a buffer by shape only (no device resource yet).
    pub fn deferred_buffer(name: impl Into<String>, elem: ScalarType, read_only: bool) -> Self {
        Self {
            name: name.into(),
            value: CaptureValue::DeferredBuffer { elem, read_only },
        }
    }

    /// Capture a reference to another closure. Always rejected by the
    /// inspector; exists so callers get a precise error instead of a
    /// silent misclassification.
    pub fn closure_ref(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: CaptureValue::ClosureRef(target.into()),
        }
    }

    pub fn opaque(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: CaptureValue::Opaque {
                type_name: type_name.into(),
            },
        }
    }
}

// ─── Kernel Sources ─────────────────────────────────────────────────

/// One function's code: the entry body or a user function resolved from
/// the call graph.
#[derive(Clone, Debug, PartialEq)]
pub struct KernelSource {
    pub name: String,
    pub params: Vec<(String, TypeRef)>,
    pub return_type: Option<TypeRef>,
    pub body: Vec<IrStmt>,
}

impl KernelSource {
    pub fn new(
        name: impl Into<String>,
        params: Vec<(String, TypeRef)>,
        return_type: Option<TypeRef>,
        body: Vec<IrStmt>,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            return_type,
            body,
        }
    }
}

/// The structural view of one data-parallel closure: entry body, captured
/// variables in declaration order, and statically-invoked user functions.
#[derive(Clone, Debug)]
pub struct KernelDescriptor {
    pub entry: KernelSource,
    pub captures: Vec<Capture>,
    pub functions: Vec<KernelSource>,
}

/// Name given to the entry point in IR and in generated source.
pub const ENTRY_NAME: &str = "main";

impl KernelDescriptor {
    /// Start a descriptor from the entry body. The entry takes no explicit
    /// parameters; its thread identifier is the implicit
    /// [`IrExpr::ThreadId`](crate::ir::IrExpr::ThreadId).
    pub fn new(body: Vec<IrStmt>) -> Self {
        Self {
            entry: KernelSource::new(ENTRY_NAME, Vec::new(), None, body),
            captures: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Add a captured variable. Declaration order is discovery order.
    pub fn capture(mut self, capture: Capture) -> Self {
        self.captures.push(capture);
        self
    }

    /// Add a user function the kernel may call.
    pub fn function(mut self, function: KernelSource) -> Self {
        self.functions.push(function);
        self
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
