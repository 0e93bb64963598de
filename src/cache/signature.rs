//! Structural kernel signatures: IR normalization + BLAKE3 hashing.
//!
//! A kernel's signature covers everything that determines the generated
//! shader source — field kinds and types in discovery order, the IR of the
//! entry body and every reachable user function, and embedded literals.
//! It deliberately excludes captured *values* and all user-chosen names:
//! capture, function and local names are replaced with ordinals before
//! hashing, so two kernels that differ only in naming share one signature
//! and one compiled pipeline.
//!
//! Properties:
//! - Two kernels with identical structure but different variable names
//!   produce the same signature.
//! - Changing a literal, an operator, a field type or a buffer's
//!   mutability changes the signature.
//! - Redispatching with different captured scalar values does not.

use std::collections::HashMap;

use crate::binding::{FieldDescriptor, FieldKind};
use crate::closure::Inspection;
use crate::ir::{Axis, BinaryOp, IrExpr, IrMethod, IrStmt, Literal, TypeRef, UnaryOp};

// ─── Serialization Format Tags ─────────────────────────────────────

// Node type tags (1-byte prefix).
const TAG_FIELD: u8 = 0x01;
const TAG_METHOD: u8 = 0x02;
const TAG_LET: u8 = 0x03;
const TAG_ASSIGN: u8 = 0x04;
const TAG_STORE: u8 = 0x05;
const TAG_IF: u8 = 0x06;
const TAG_FOR: u8 = 0x07;
const TAG_WHILE: u8 = 0x08;
const TAG_RETURN: u8 = 0x09;
const TAG_EXPR_STMT: u8 = 0x0A;
const TAG_F32_LIT: u8 = 0x0B;
const TAG_I32_LIT: u8 = 0x0C;
const TAG_U32_LIT: u8 = 0x0D;
const TAG_BOOL_LIT: u8 = 0x0E;
const TAG_LOCAL: u8 = 0x0F;
const TAG_CAPTURE: u8 = 0x10;
const TAG_THREAD_ID: u8 = 0x11;
const TAG_MEMBER: u8 = 0x12;
const TAG_UNARY: u8 = 0x13;
const TAG_BINARY: u8 = 0x14;
const TAG_CALL_USER: u8 = 0x15;
const TAG_CALL_INTRINSIC: u8 = 0x16;
const TAG_INDEX: u8 = 0x17;
const TAG_NONE: u8 = 0x18;
const TAG_SOME: u8 = 0x19;

// Field kind tags
const TAG_KIND_SCALAR: u8 = 0x40;
const TAG_KIND_RO_BUFFER: u8 = 0x41;
const TAG_KIND_RW_BUFFER: u8 = 0x42;

// Type tags
const TAG_TY_F32: u8 = 0x80;
const TAG_TY_I32: u8 = 0x81;
const TAG_TY_U32: u8 = 0x82;
const TAG_TY_BOOL: u8 = 0x83;
const TAG_TY_VECTOR: u8 = 0x84;

// Version byte for hash stability
const HASH_VERSION: u8 = 1;

// ─── Signature ─────────────────────────────────────────────────────

/// A 256-bit BLAKE3 structural signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 32]);

impl Signature {
    /// Display as full hex.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Display as short base-32 (8 characters, 40 bits).
    pub fn to_short(&self) -> String {
        const ALPHABET: &[u8] = b"0123456789abcdefghjkmnpqrstuvwxyz";
        let val = u64::from_be_bytes([
            0, 0, 0, self.0[0], self.0[1], self.0[2], self.0[3], self.0[4],
        ]);
        let mut result = String::with_capacity(8);
        for i in (0..8).rev() {
            let idx = ((val >> (i * 5)) & 0x1F) as usize;
            result.push(ALPHABET[idx] as char);
        }
        result
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.to_short())
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.to_short())
    }
}

/// Compute the structural signature of an inspected kernel.
pub fn signature_of(inspection: &Inspection) -> Signature {
    let mut ser = Serializer::new(&inspection.fields, &inspection.methods);
    ser.buf.push(HASH_VERSION);

    ser.write_u32(inspection.fields.len() as u32);
    for field in &inspection.fields {
        ser.write_field(field);
    }

    ser.write_u32(inspection.methods.len() as u32);
    for method in &inspection.methods {
        ser.write_method(method);
    }

    Signature(*blake3::hash(&ser.buf).as_bytes())
}

// ─── Normalizing Serializer ────────────────────────────────────────

struct Serializer<'a> {
    buf: Vec<u8>,
    /// Capture name → ordinal (position in the field sequence).
    captures: HashMap<&'a str, u32>,
    /// User function name → ordinal (position in callee-first order; the
    /// entry point gets the last ordinal).
    functions: HashMap<&'a str, u32>,
    /// Local name → de-Bruijn-style ordinal, reset per method.
    locals: HashMap<String, u32>,
}

impl<'a> Serializer<'a> {
    fn new(fields: &'a [FieldDescriptor], methods: &'a [IrMethod]) -> Self {
        let captures = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.as_str(), i as u32))
            .collect();
        let functions = methods
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.as_str(), i as u32))
            .collect();
        Self {
            buf: Vec::new(),
            captures,
            functions,
            locals: HashMap::new(),
        }
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn local_ordinal(&mut self, name: &str) -> u32 {
        if let Some(&ord) = self.locals.get(name) {
            return ord;
        }
        let ord = self.locals.len() as u32;
        self.locals.insert(name.to_string(), ord);
        ord
    }

    fn write_type(&mut self, ty: &TypeRef) {
        match ty {
            TypeRef::Scalar(s) => self.buf.push(scalar_tag(*s)),
            TypeRef::Vector(s, n) => {
                self.buf.push(TAG_TY_VECTOR);
                self.buf.push(scalar_tag(*s));
                self.buf.push(*n);
            }
        }
    }

    fn write_opt_type(&mut self, ty: &Option<TypeRef>) {
        match ty {
            None => self.buf.push(TAG_NONE),
            Some(t) => {
                self.buf.push(TAG_SOME);
                self.write_type(t);
            }
        }
    }

    fn write_field(&mut self, field: &FieldDescriptor) {
        self.buf.push(TAG_FIELD);
        self.buf.push(match field.kind {
            FieldKind::Scalar => TAG_KIND_SCALAR,
            FieldKind::ReadOnlyBuffer => TAG_KIND_RO_BUFFER,
            FieldKind::ReadWriteBuffer => TAG_KIND_RW_BUFFER,
        });
        self.write_type(&field.declared);
        self.write_u32(field.binding_index);
    }

    fn write_method(&mut self, method: &IrMethod) {
        self.buf.push(TAG_METHOD);
        self.buf.push(method.is_entry as u8);
        self.locals.clear();
        // Parameters take the first local ordinals, in declaration order.
        self.write_u32(method.params.len() as u32);
        for (name, ty) in &method.params {
            let ord = self.local_ordinal(name);
            self.write_u32(ord);
            self.write_type(ty);
        }
        self.write_opt_type(&method.return_type);
        self.write_body(&method.body);
    }

    fn write_body(&mut self, body: &[IrStmt]) {
        self.write_u32(body.len() as u32);
        for stmt in body {
            self.write_stmt(stmt);
        }
    }

    fn write_stmt(&mut self, stmt: &IrStmt) {
        match stmt {
            IrStmt::Let { name, ty, value } => {
                self.buf.push(TAG_LET);
                let ord = self.local_ordinal(name);
                self.write_u32(ord);
                self.write_opt_type(ty);
                self.write_expr(value);
            }
            IrStmt::Assign { name, value } => {
                self.buf.push(TAG_ASSIGN);
                let ord = self.local_ordinal(name);
                self.write_u32(ord);
                self.write_expr(value);
            }
            IrStmt::Store {
                buffer,
                index,
                value,
            } => {
                self.buf.push(TAG_STORE);
                let ord = self.captures.get(buffer.as_str()).copied().unwrap_or(u32::MAX);
                self.write_u32(ord);
                self.write_expr(index);
                self.write_expr(value);
            }
            IrStmt::If {
                cond,
                then_body,
                else_body,
            } => {
                self.buf.push(TAG_IF);
                self.write_expr(cond);
                self.write_body(then_body);
                self.write_body(else_body);
            }
            IrStmt::For {
                var,
                begin,
                end,
                body,
            } => {
                self.buf.push(TAG_FOR);
                let ord = self.local_ordinal(var);
                self.write_u32(ord);
                self.write_expr(begin);
                self.write_expr(end);
                self.write_body(body);
            }
            IrStmt::While { cond, body } => {
                self.buf.push(TAG_WHILE);
                self.write_expr(cond);
                self.write_body(body);
            }
            IrStmt::Return(value) => {
                self.buf.push(TAG_RETURN);
                match value {
                    None => self.buf.push(TAG_NONE),
                    Some(v) => {
                        self.buf.push(TAG_SOME);
                        self.write_expr(v);
                    }
                }
            }
            IrStmt::Expr(e) => {
                self.buf.push(TAG_EXPR_STMT);
                self.write_expr(e);
            }
        }
    }

    fn write_expr(&mut self, expr: &IrExpr) {
        match expr {
            IrExpr::Literal(lit) => self.write_literal(lit),
            IrExpr::Local(name) => {
                self.buf.push(TAG_LOCAL);
                let ord = self.local_ordinal(name);
                self.write_u32(ord);
            }
            IrExpr::Capture(name) => {
                self.buf.push(TAG_CAPTURE);
                let ord = self.captures.get(name.as_str()).copied().unwrap_or(u32::MAX);
                self.write_u32(ord);
            }
            IrExpr::ThreadId(axis) => {
                self.buf.push(TAG_THREAD_ID);
                self.buf.push(match axis {
                    Axis::X => 0,
                    Axis::Y => 1,
                    Axis::Z => 2,
                });
            }
            IrExpr::Member { base, member } => {
                self.buf.push(TAG_MEMBER);
                self.write_expr(base);
                // Member names are structural (vector components), not
                // user-chosen, so they hash as-is.
                self.write_u32(member.len() as u32);
                self.buf.extend_from_slice(member.as_bytes());
            }
            IrExpr::Unary { op, operand } => {
                self.buf.push(TAG_UNARY);
                self.buf.push(unary_tag(*op));
                self.write_expr(operand);
            }
            IrExpr::Binary { op, lhs, rhs } => {
                self.buf.push(TAG_BINARY);
                self.buf.push(binary_tag(*op));
                self.write_expr(lhs);
                self.write_expr(rhs);
            }
            IrExpr::Call { callee, args } => {
                match self.functions.get(callee.as_str()).copied() {
                    Some(ord) => {
                        self.buf.push(TAG_CALL_USER);
                        self.write_u32(ord);
                    }
                    None => {
                        // Intrinsic names are part of the language, not of
                        // the user's naming; they hash literally.
                        self.buf.push(TAG_CALL_INTRINSIC);
                        self.write_u32(callee.len() as u32);
                        self.buf.extend_from_slice(callee.as_bytes());
                    }
                }
                self.write_u32(args.len() as u32);
                for arg in args {
                    self.write_expr(arg);
                }
            }
            IrExpr::Index { buffer, index } => {
                self.buf.push(TAG_INDEX);
                let ord = self.captures.get(buffer.as_str()).copied().unwrap_or(u32::MAX);
                self.write_u32(ord);
                self.write_expr(index);
            }
        }
    }

    fn write_literal(&mut self, lit: &Literal) {
        match lit {
            Literal::F32(v) => {
                self.buf.push(TAG_F32_LIT);
                self.buf.extend_from_slice(&v.to_bits().to_le_bytes());
            }
            Literal::I32(v) => {
                self.buf.push(TAG_I32_LIT);
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            Literal::U32(v) => {
                self.buf.push(TAG_U32_LIT);
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            Literal::Bool(v) => {
                self.buf.push(TAG_BOOL_LIT);
                self.buf.push(*v as u8);
            }
        }
    }
}

fn scalar_tag(s: crate::ir::ScalarType) -> u8 {
    match s {
        crate::ir::ScalarType::F32 => TAG_TY_F32,
        crate::ir::ScalarType::I32 => TAG_TY_I32,
        crate::ir::ScalarType::U32 => TAG_TY_U32,
        crate::ir::ScalarType::Bool => TAG_TY_BOOL,
    }
}

fn unary_tag(op: UnaryOp) -> u8 {
    match op {
        UnaryOp::Neg => 0,
        UnaryOp::Not => 1,
    }
}

fn binary_tag(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Add => 0,
        BinaryOp::Sub => 1,
        BinaryOp::Mul => 2,
        BinaryOp::Div => 3,
        BinaryOp::Rem => 4,
        BinaryOp::Eq => 5,
        BinaryOp::Ne => 6,
        BinaryOp::Lt => 7,
        BinaryOp::Le => 8,
        BinaryOp::Gt => 9,
        BinaryOp::Ge => 10,
        BinaryOp::And => 11,
        BinaryOp::Or => 12,
        BinaryOp::BitAnd => 13,
        BinaryOp::BitOr => 14,
        BinaryOp::BitXor => 15,
        BinaryOp::Shl => 16,
        BinaryOp::Shr => 17,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
