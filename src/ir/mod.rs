//! Kernel IR — a closed expression/statement tree for GPU kernels.
//!
//! The IR is what a kernel descriptor's bodies are written in and what the
//! WGSL translator consumes. Every node is one of a fixed finite set of
//! variants; downstream stages fail fast on anything whose semantics fall
//! outside that set rather than guessing.
//!
//! Pipeline:
//! ```text
//! KernelDescriptor ─→ inspect  → FieldDescriptors + Vec<IrMethod>
//!                  ─→ wgsl     → shader source (one String)
//!                  ─→ cache    → compiled pipeline, keyed by shape
//! ```
//!
//! Constructors are layered so kernel bodies read naturally:
//! `IrExpr::capture("k").mul(IrExpr::capture("k"))`.

use std::fmt;

// ─── Types ──────────────────────────────────────────────────────────

/// A scalar element type. The only types a buffer element or a vector
/// lane can have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    F32,
    I32,
    U32,
    Bool,
}

impl ScalarType {
    /// The WGSL spelling of this type.
    pub fn wgsl(&self) -> &'static str {
        match self {
            ScalarType::F32 => "f32",
            ScalarType::I32 => "i32",
            ScalarType::U32 => "u32",
            ScalarType::Bool => "bool",
        }
    }

    /// Byte size on the device. Bool is stored as a 4-byte word.
    pub fn byte_size(&self) -> u32 {
        4
    }
}

/// A value type reference: a scalar or a small vector of scalars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Scalar(ScalarType),
    /// Vector of 2, 3 or 4 lanes.
    Vector(ScalarType, u8),
}

impl TypeRef {
    pub fn wgsl(&self) -> String {
        match self {
            TypeRef::Scalar(s) => s.wgsl().to_string(),
            TypeRef::Vector(s, n) => format!("vec{}<{}>", n, s.wgsl()),
        }
    }

    pub fn byte_size(&self) -> u32 {
        match self {
            TypeRef::Scalar(s) => s.byte_size(),
            TypeRef::Vector(s, n) => s.byte_size() * *n as u32,
        }
    }

    /// Constant-buffer alignment: scalars 4, vec2 8, vec3/vec4 16.
    /// Matches WGSL uniform address space requirements.
    pub fn cbuffer_align(&self) -> u32 {
        match self {
            TypeRef::Scalar(_) => 4,
            TypeRef::Vector(_, 2) => 8,
            TypeRef::Vector(_, _) => 16,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wgsl())
    }
}

// ─── Operators ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn token(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn token(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

// ─── Expressions ────────────────────────────────────────────────────

/// A grid axis of the implicit per-invocation thread identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn component(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

/// A literal embedded in kernel code. Unlike captured scalars, literals
/// are part of the kernel's shape and participate in the cache signature.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    F32(f32),
    I32(i32),
    U32(u32),
    Bool(bool),
}

/// A kernel expression.
#[derive(Clone, Debug, PartialEq)]
pub enum IrExpr {
    Literal(Literal),
    /// Reference to a local variable or function parameter.
    Local(String),
    /// Reference to a captured scalar (rendered as a dotted path into the
    /// constant buffer).
    Capture(String),
    /// One axis of the implicit thread identifier the device supplies.
    ThreadId(Axis),
    /// Vector component access, e.g. `.x`.
    Member { base: Box<IrExpr>, member: String },
    Unary {
        op: UnaryOp,
        operand: Box<IrExpr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<IrExpr>,
        rhs: Box<IrExpr>,
    },
    /// Call to an intrinsic or a user function, resolved by name.
    Call { callee: String, args: Vec<IrExpr> },
    /// Read of one element of a captured buffer.
    Index { buffer: String, index: Box<IrExpr> },
}

impl IrExpr {
    pub fn f32(v: f32) -> Self {
        IrExpr::Literal(Literal::F32(v))
    }

    pub fn i32(v: i32) -> Self {
        IrExpr::Literal(Literal::I32(v))
    }

    pub fn u32(v: u32) -> Self {
        IrExpr::Literal(Literal::U32(v))
    }

    pub fn bool(v: bool) -> Self {
        IrExpr::Literal(Literal::Bool(v))
    }

    pub fn local(name: impl Into<String>) -> Self {
        IrExpr::Local(name.into())
    }

    pub fn capture(name: impl Into<String>) -> Self {
        IrExpr::Capture(name.into())
    }

    pub fn thread_x() -> Self {
        IrExpr::ThreadId(Axis::X)
    }

    pub fn thread_y() -> Self {
        IrExpr::ThreadId(Axis::Y)
    }

    pub fn thread_z() -> Self {
        IrExpr::ThreadId(Axis::Z)
    }

    pub fn call(callee: impl Into<String>, args: Vec<IrExpr>) -> Self {
        IrExpr::Call {
            callee: callee.into(),
            args,
        }
    }

    pub fn index(buffer: impl Into<String>, index: IrExpr) -> Self {
        IrExpr::Index {
            buffer: buffer.into(),
            index: Box::new(index),
        }
    }

    pub fn member(self, member: impl Into<String>) -> Self {
        IrExpr::Member {
            base: Box::new(self),
            member: member.into(),
        }
    }

    pub fn unary(op: UnaryOp, operand: IrExpr) -> Self {
        IrExpr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinaryOp, lhs: IrExpr, rhs: IrExpr) -> Self {
        IrExpr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn add(self, rhs: IrExpr) -> Self {
        Self::binary(BinaryOp::Add, self, rhs)
    }

    pub fn sub(self, rhs: IrExpr) -> Self {
        Self::binary(BinaryOp::Sub, self, rhs)
    }

    pub fn mul(self, rhs: IrExpr) -> Self {
        Self::binary(BinaryOp::Mul, self, rhs)
    }

    pub fn div(self, rhs: IrExpr) -> Self {
        Self::binary(BinaryOp::Div, self, rhs)
    }

    pub fn rem(self, rhs: IrExpr) -> Self {
        Self::binary(BinaryOp::Rem, self, rhs)
    }

    pub fn lt(self, rhs: IrExpr) -> Self {
        Self::binary(BinaryOp::Lt, self, rhs)
    }

    pub fn le(self, rhs: IrExpr) -> Self {
        Self::binary(BinaryOp::Le, self, rhs)
    }

    pub fn gt(self, rhs: IrExpr) -> Self {
        Self::binary(BinaryOp::Gt, self, rhs)
    }

    pub fn ge(self, rhs: IrExpr) -> Self {
        Self::binary(BinaryOp::Ge, self, rhs)
    }

    pub fn eq(self, rhs: IrExpr) -> Self {
        Self::binary(BinaryOp::Eq, self, rhs)
    }

    pub fn ne(self, rhs: IrExpr) -> Self {
        Self::binary(BinaryOp::Ne, self, rhs)
    }

    pub fn neg(self) -> Self {
        Self::unary(UnaryOp::Neg, self)
    }

    pub fn not(self) -> Self {
        Self::unary(UnaryOp::Not, self)
    }
}

// ─── Statements ─────────────────────────────────────────────────────

/// A kernel statement. Control flow maps structurally 1:1 onto WGSL;
/// no flattening or inlining is required.
#[derive(Clone, Debug, PartialEq)]
pub enum IrStmt {
    /// Declare a mutable local. The type is inferred by WGSL when omitted.
    Let {
        name: String,
        ty: Option<TypeRef>,
        value: IrExpr,
    },
    /// Reassign an existing local.
    Assign { name: String, value: IrExpr },
    /// Write one element of a captured buffer.
    Store {
        buffer: String,
        index: IrExpr,
        value: IrExpr,
    },
    If {
        cond: IrExpr,
        then_body: Vec<IrStmt>,
        else_body: Vec<IrStmt>,
    },
    /// Counted loop: `var` ranges over `[begin, end)`.
    For {
        var: String,
        begin: IrExpr,
        end: IrExpr,
        body: Vec<IrStmt>,
    },
    While { cond: IrExpr, body: Vec<IrStmt> },
    Return(Option<IrExpr>),
    /// Expression evaluated for effect (a call).
    Expr(IrExpr),
}

impl IrStmt {
    pub fn let_(name: impl Into<String>, value: IrExpr) -> Self {
        IrStmt::Let {
            name: name.into(),
            ty: None,
            value,
        }
    }

    pub fn let_typed(name: impl Into<String>, ty: TypeRef, value: IrExpr) -> Self {
        IrStmt::Let {
            name: name.into(),
            ty: Some(ty),
            value,
        }
    }

    pub fn assign(name: impl Into<String>, value: IrExpr) -> Self {
        IrStmt::Assign {
            name: name.into(),
            value,
        }
    }

    pub fn store(buffer: impl Into<String>, index: IrExpr, value: IrExpr) -> Self {
        IrStmt::Store {
            buffer: buffer.into(),
            index,
            value,
        }
    }

    pub fn ret(value: IrExpr) -> Self {
        IrStmt::Return(Some(value))
    }
}

// ─── Methods ────────────────────────────────────────────────────────

/// One translated function: the entry point or a user function the entry
/// point (transitively) calls. At most one method per translation unit
/// has `is_entry = true`.
#[derive(Clone, Debug, PartialEq)]
pub struct IrMethod {
    pub name: String,
    pub params: Vec<(String, TypeRef)>,
    pub return_type: Option<TypeRef>,
    pub body: Vec<IrStmt>,
    pub is_entry: bool,
}

// ─── Tests ──────────────────────────────────────────────────────────
