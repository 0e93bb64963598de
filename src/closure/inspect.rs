//! Closure inspection — one-shot structural extraction.
//!
//! Walks a [`KernelDescriptor`] and the call graph of every function it
//! statically invokes, producing ordered [`FieldDescriptor`]s and one
//! [`IrMethod`] per distinct invoked function plus the entry point.
//!
//! Classification: an indexable buffer capture becomes a ReadOnlyBuffer or
//! ReadWriteBuffer field per its declared mutability; any scalar capture
//! becomes a constant-buffer field. Binding indices are assigned in
//! first-encounter order with a separate counter per kind.
//!
//! Call resolution is a deterministic table built once per inspection:
//! every call site must resolve to exactly one intrinsic or one user
//! function, and the reachable call graph must be acyclic (there is no
//! translation for recursion). Two calls to the same function translate
//! it once; later renders reference it by name.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::{CaptureValue, KernelDescriptor, KernelSource};
use crate::binding::{FieldDescriptor, FieldKind};
use crate::error::KernelError;
use crate::ir::{IrExpr, IrMethod, IrStmt, TypeRef};
use crate::wgsl::intrinsic;

/// The immutable result of inspecting one kernel descriptor.
#[derive(Clone, Debug)]
pub struct Inspection {
    /// Captured fields in first-discovery order.
    pub fields: Vec<FieldDescriptor>,
    /// Translated-unit methods in call-graph order (callees before
    /// callers); the entry point is always last.
    pub methods: Vec<IrMethod>,
}

/// Inspect a descriptor: classify captures and extract the reachable call
/// graph. Fails before any GPU resource is touched.
pub fn inspect(desc: &KernelDescriptor) -> Result<Inspection, KernelError> {
    let fields = classify_captures(desc)?;
    let methods = extract_methods(desc)?;
    Ok(Inspection { fields, methods })
}

// ─── Capture Classification ─────────────────────────────────────────

fn classify_captures(desc: &KernelDescriptor) -> Result<Vec<FieldDescriptor>, KernelError> {
    let mut fields = Vec::with_capacity(desc.captures.len());
    let mut seen = HashSet::new();
    let mut scalar_counter = 0u32;
    let mut buffer_counter = 0u32;

    for capture in &desc.captures {
        if !seen.insert(capture.name.as_str()) {
            return Err(KernelError::UnsupportedConstruct {
                detail: format!("capture `{}` is declared twice", capture.name),
            });
        }

        let (declared, kind) = match &capture.value {
            CaptureValue::Scalar(v) => (v.type_ref(), FieldKind::Scalar),
            CaptureValue::Buffer(b) => (
                TypeRef::Scalar(b.elem()),
                if b.is_read_only() {
                    FieldKind::ReadOnlyBuffer
                } else {
                    FieldKind::ReadWriteBuffer
                },
            ),
            CaptureValue::DeferredBuffer { elem, read_only } => (
                TypeRef::Scalar(*elem),
                if *read_only {
                    FieldKind::ReadOnlyBuffer
                } else {
                    FieldKind::ReadWriteBuffer
                },
            ),
            CaptureValue::ClosureRef(target) => {
                return Err(KernelError::UnsupportedCaptureKind {
                    name: capture.name.clone(),
                    detail: format!("reference to closure `{}` cannot be translated", target),
                });
            }
            CaptureValue::Opaque { type_name } => {
                return Err(KernelError::UnsupportedCaptureKind {
                    name: capture.name.clone(),
                    detail: format!("host type `{}` has no translation rule", type_name),
                });
            }
        };

        let binding_index = if kind.is_buffer() {
            let i = buffer_counter;
            buffer_counter += 1;
            i
        } else {
            let i = scalar_counter;
            scalar_counter += 1;
            i
        };

        fields.push(FieldDescriptor {
            name: capture.name.clone(),
            declared,
            kind,
            binding_index,
        });
    }

    Ok(fields)
}

// ─── Call Graph Extraction ──────────────────────────────────────────

fn extract_methods(desc: &KernelDescriptor) -> Result<Vec<IrMethod>, KernelError> {
    // Resolution table: name → user function, built once. A duplicate
    // definition can never resolve to exactly one target.
    let mut table: HashMap<&str, &KernelSource> = HashMap::new();
    for function in &desc.functions {
        if table.insert(function.name.as_str(), function).is_some() {
            return Err(KernelError::AmbiguousOverload {
                name: function.name.clone(),
                detail: "user function is defined more than once".into(),
            });
        }
    }

    // Depth-first walk from the entry, resolving every call site and
    // recording caller→callee edges between user functions.
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
    let entry_node = graph.add_node(desc.entry.name.as_str());
    nodes.insert(desc.entry.name.as_str(), entry_node);

    let mut pending: Vec<&KernelSource> = vec![&desc.entry];
    let mut visited: HashSet<&str> = HashSet::from([desc.entry.name.as_str()]);

    while let Some(source) = pending.pop() {
        let caller = nodes[source.name.as_str()];
        let mut callees = Vec::new();
        collect_calls(&source.body, &mut callees);

        for callee in callees {
            let is_intrinsic = intrinsic(&callee).is_some();
            let user = table.get(callee.as_str()).copied();

            match (is_intrinsic, user) {
                (true, Some(_)) => {
                    return Err(KernelError::AmbiguousOverload {
                        name: callee,
                        detail: "resolves to both an intrinsic and a user function".into(),
                    });
                }
                (false, None) => {
                    return Err(KernelError::AmbiguousOverload {
                        name: callee,
                        detail: "resolves to no known intrinsic or user function".into(),
                    });
                }
                (true, None) => {}
                (false, Some(function)) => {
                    let node = *nodes
                        .entry(function.name.as_str())
                        .or_insert_with(|| graph.add_node(function.name.as_str()));
                    graph.update_edge(caller, node, ());
                    if visited.insert(function.name.as_str()) {
                        pending.push(function);
                    }
                }
            }
        }
    }

    // Callees must precede callers in the rendered source: topological
    // order over caller→callee edges, reversed. A cycle is recursion.
    let order = toposort(&graph, None).map_err(|cycle| {
        let name = graph[cycle.node_id()].to_string();
        KernelError::UnsupportedConstruct {
            detail: format!("recursive call chain through `{}`", name),
        }
    })?;

    let mut methods = Vec::new();
    for node in order.into_iter().rev() {
        let name = graph[node];
        if name == desc.entry.name {
            continue;
        }
        methods.push(to_method(table[name], false));
    }
    methods.push(to_method(&desc.entry, true));
    Ok(methods)
}

fn to_method(source: &KernelSource, is_entry: bool) -> IrMethod {
    IrMethod {
        name: source.name.clone(),
        params: source.params.clone(),
        return_type: source.return_type,
        body: source.body.clone(),
        is_entry,
    }
}

/// Collect every callee name in a statement list, in source order.
fn collect_calls(body: &[IrStmt], out: &mut Vec<String>) {
    for stmt in body {
        match stmt {
            IrStmt::Let { value, .. } | IrStmt::Assign { value, .. } => {
                collect_expr_calls(value, out)
            }
            IrStmt::Store { index, value, .. } => {
                collect_expr_calls(index, out);
                collect_expr_calls(value, out);
            }
            IrStmt::If {
                cond,
                then_body,
                else_body,
            } => {
                collect_expr_calls(cond, out);
                collect_calls(then_body, out);
                collect_calls(else_body, out);
            }
            IrStmt::For {
                begin, end, body, ..
            } => {
                collect_expr_calls(begin, out);
                collect_expr_calls(end, out);
                collect_calls(body, out);
            }
            IrStmt::While { cond, body } => {
                collect_expr_calls(cond, out);
                collect_calls(body, out);
            }
            IrStmt::Return(Some(value)) => collect_expr_calls(value, out),
            IrStmt::Return(None) => {}
            IrStmt::Expr(value) => collect_expr_calls(value, out),
        }
    }
}

fn collect_expr_calls(expr: &IrExpr, out: &mut Vec<String>) {
    match expr {
        IrExpr::Literal(_) | IrExpr::Local(_) | IrExpr::Capture(_) | IrExpr::ThreadId(_) => {}
        IrExpr::Member { base, .. } => collect_expr_calls(base, out),
        IrExpr::Unary { operand, .. } => collect_expr_calls(operand, out),
        IrExpr::Binary { lhs, rhs, .. } => {
            collect_expr_calls(lhs, out);
            collect_expr_calls(rhs, out);
        }
        IrExpr::Call { callee, args } => {
            out.push(callee.clone());
            for arg in args {
                collect_expr_calls(arg, out);
            }
        }
        IrExpr::Index { index, .. } => collect_expr_calls(index, out),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::Capture;
    use crate::ir::ScalarType;

    fn square_kernel() -> KernelDescriptor {
        KernelDescriptor::new(vec![IrStmt::store(
            "b",
            IrExpr::u32(0),
            IrExpr::capture("k").mul(IrExpr::capture("k")),
        )])
        .capture(Capture::f32("k", 3.0))
        .capture(Capture::deferred_buffer("b", ScalarType::F32, false))
    }

    #[test]
    fn test_fields_in_discovery_order() {
        let inspection = inspect(&square_kernel()).unwrap();
        assert_eq!(inspection.fields.len(), 2);

        assert_eq!(inspection.fields[0].name, "k");
        assert_eq!(inspection.fields[0].kind, FieldKind::Scalar);
        assert_eq!(inspection.fields[0].binding_index, 0);

        assert_eq!(inspection.fields[1].name, "b");
        assert_eq!(inspection.fields[1].kind, FieldKind::ReadWriteBuffer);
        assert_eq!(inspection.fields[1].binding_index, 0);
    }

    #[test]
    fn test_per_kind_binding_counters() {
        let desc = KernelDescriptor::new(vec![])
            .capture(Capture::deferred_buffer("a", ScalarType::F32, true))
            .capture(Capture::f32("k", 1.0))
            .capture(Capture::deferred_buffer("out", ScalarType::F32, false))
            .capture(Capture::u32("n", 4));
        let inspection = inspect(&desc).unwrap();

        let kinds: Vec<(FieldKind, u32)> = inspection
            .fields
            .iter()
            .map(|f| (f.kind, f.binding_index))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (FieldKind::ReadOnlyBuffer, 0),
                (FieldKind::Scalar, 0),
                (FieldKind::ReadWriteBuffer, 1),
                (FieldKind::Scalar, 1),
            ]
        );
    }

    #[test]
    fn test_closure_capture_is_rejected() {
        let desc = KernelDescriptor::new(vec![]).capture(Capture::closure_ref("f", "other"));
        match inspect(&desc) {
            Err(KernelError::UnsupportedCaptureKind { name, .. }) => assert_eq!(name, "f"),
            other => panic!("expected UnsupportedCaptureKind, got {:?}", other),
        }
    }

    #[test]
    fn test_opaque_capture_is_rejected() {
        let desc =
            KernelDescriptor::new(vec![]).capture(Capture::opaque("handle", "std::fs::File"));
        assert!(matches!(
            inspect(&desc),
            Err(KernelError::UnsupportedCaptureKind { .. })
        ));
    }

    #[test]
    fn test_duplicate_capture_name_is_rejected() {
        let desc = KernelDescriptor::new(vec![])
            .capture(Capture::f32("k", 1.0))
            .capture(Capture::f32("k", 2.0));
        assert!(matches!(
            inspect(&desc),
            Err(KernelError::UnsupportedConstruct { .. })
        ));
    }

    #[test]
    fn test_callees_precede_callers_and_entry_is_last() {
        // main → f → g
        let g = KernelSource::new(
            "g",
            vec![("x".into(), TypeRef::Scalar(ScalarType::F32))],
            Some(TypeRef::Scalar(ScalarType::F32)),
            vec![IrStmt::ret(IrExpr::local("x").add(IrExpr::f32(1.0)))],
        );
        let f = KernelSource::new(
            "f",
            vec![("x".into(), TypeRef::Scalar(ScalarType::F32))],
            Some(TypeRef::Scalar(ScalarType::F32)),
            vec![IrStmt::ret(IrExpr::call("g", vec![IrExpr::local("x")]))],
        );
        let desc = KernelDescriptor::new(vec![IrStmt::store(
            "b",
            IrExpr::u32(0),
            IrExpr::call("f", vec![IrExpr::f32(2.0)]),
        )])
        .capture(Capture::deferred_buffer("b", ScalarType::F32, false))
        .function(f)
        .function(g);

        let inspection = inspect(&desc).unwrap();
        let names: Vec<&str> = inspection.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["g", "f", "main"]);
        assert!(inspection.methods.last().unwrap().is_entry);
        assert_eq!(
            inspection.methods.iter().filter(|m| m.is_entry).count(),
            1
        );
    }

    #[test]
    fn test_function_called_twice_is_translated_once() {
        let f = KernelSource::new(
            "f",
            vec![("x".into(), TypeRef::Scalar(ScalarType::F32))],
            Some(TypeRef::Scalar(ScalarType::F32)),
            vec![IrStmt::ret(IrExpr::local("x").mul(IrExpr::local("x")))],
        );
        let desc = KernelDescriptor::new(vec![IrStmt::store(
            "b",
            IrExpr::u32(0),
            IrExpr::call("f", vec![IrExpr::f32(2.0)])
                .add(IrExpr::call("f", vec![IrExpr::f32(3.0)])),
        )])
        .capture(Capture::deferred_buffer("b", ScalarType::F32, false))
        .function(f);

        let inspection = inspect(&desc).unwrap();
        assert_eq!(inspection.methods.len(), 2);
    }

    #[test]
    fn test_unreachable_function_is_not_translated() {
        let unused = KernelSource::new("unused", vec![], None, vec![]);
        let desc = KernelDescriptor::new(vec![]).function(unused);
        let inspection = inspect(&desc).unwrap();
        assert_eq!(inspection.methods.len(), 1);
        assert_eq!(inspection.methods[0].name, "main");
    }

    #[test]
    fn test_recursion_is_rejected() {
        let f = KernelSource::new(
            "f",
            vec![("x".into(), TypeRef::Scalar(ScalarType::F32))],
            Some(TypeRef::Scalar(ScalarType::F32)),
            vec![IrStmt::ret(IrExpr::call("f", vec![IrExpr::local("x")]))],
        );
        let desc = KernelDescriptor::new(vec![IrStmt::Expr(IrExpr::call(
            "f",
            vec![IrExpr::f32(1.0)],
        ))])
        .function(f);

        match inspect(&desc) {
            Err(KernelError::UnsupportedConstruct { detail }) => {
                assert!(detail.contains("recursive"), "got: {}", detail)
            }
            other => panic!("expected UnsupportedConstruct, got {:?}", other),
        }
    }

    #[test]
    fn test_mutual_recursion_is_rejected() {
        let f = KernelSource::new(
            "f",
            vec![],
            None,
            vec![IrStmt::Expr(IrExpr::call("g", vec![]))],
        );
        let g = KernelSource::new(
            "g",
            vec![],
            None,
            vec![IrStmt::Expr(IrExpr::call("f", vec![]))],
        );
        let desc = KernelDescriptor::new(vec![IrStmt::Expr(IrExpr::call("f", vec![]))])
            .function(f)
            .function(g);
        assert!(matches!(
            inspect(&desc),
            Err(KernelError::UnsupportedConstruct { .. })
        ));
    }

    #[test]
    fn test_unknown_call_is_ambiguous() {
        let desc =
            KernelDescriptor::new(vec![IrStmt::Expr(IrExpr::call("mystery", vec![]))]);
        match inspect(&desc) {
            Err(KernelError::AmbiguousOverload { name, .. }) => assert_eq!(name, "mystery"),
            other => panic!("expected AmbiguousOverload, got {:?}", other),
        }
    }

    #[test]
    fn test_intrinsic_shadowed_by_user_function_is_ambiguous() {
        let shadow = KernelSource::new(
            "pow",
            vec![("x".into(), TypeRef::Scalar(ScalarType::F32))],
            Some(TypeRef::Scalar(ScalarType::F32)),
            vec![IrStmt::ret(IrExpr::local("x"))],
        );
        let desc = KernelDescriptor::new(vec![IrStmt::Expr(IrExpr::call(
            "pow",
            vec![IrExpr::f32(2.0), IrExpr::f32(2.0)],
        ))])
        .function(shadow);

        assert!(matches!(
            inspect(&desc),
            Err(KernelError::AmbiguousOverload { .. })
        ));
    }

    #[test]
    fn test_duplicate_function_definition_is_ambiguous() {
        let f1 = KernelSource::new("f", vec![], None, vec![]);
        let f2 = KernelSource::new("f", vec![], None, vec![]);
        let desc = KernelDescriptor::new(vec![]).function(f1).function(f2);
        assert!(matches!(
            inspect(&desc),
            Err(KernelError::AmbiguousOverload { .. })
        ));
    }

    #[test]
    fn test_intrinsic_calls_resolve() {
        let desc = KernelDescriptor::new(vec![IrStmt::store(
            "b",
            IrExpr::u32(0),
            IrExpr::call("sqrt", vec![IrExpr::f32(2.0)]),
        )])
        .capture(Capture::deferred_buffer("b", ScalarType::F32, false));
        assert!(inspect(&desc).is_ok());
    }
}
