//! End-to-end kernel dispatches against a real adapter.
//!
//! Every test acquires its own device and skips (with a note on stderr)
//! when the host has no GPU adapter, so the suite stays green on
//! headless CI.

use std::sync::Arc;

use riptide::{
    Capture, GpuDevice, GridShape, IrExpr, IrStmt, KernelDescriptor, KernelError, KernelSource,
    ScalarType, ShaderCache, TypeRef,
};

fn try_device() -> Option<GpuDevice> {
    let device = GpuDevice::try_default();
    if device.is_none() {
        eprintln!("skipping: no GPU adapter available");
    }
    device
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= 1e-5 * e.abs().max(1.0),
            "element {}: got {}, expected {}",
            i,
            a,
            e
        );
    }
}

#[test]
fn test_scale_kernel_over_non_multiple_grid() {
    let Some(device) = try_device() else { return };

    // 100 is not a multiple of the workgroup width; the bounds guard must
    // retire the 28 excess threads without touching memory.
    let n = 100usize;
    let input: Vec<f32> = (0..n).map(|i| i as f32).collect();
    let src = device.alloc(&input, true);
    let dst = device.alloc_zeroed::<f32>(n);

    let desc = KernelDescriptor::new(vec![IrStmt::store(
        "dst",
        IrExpr::thread_x(),
        IrExpr::index("src", IrExpr::thread_x()).mul(IrExpr::capture("scale")),
    )])
    .capture(Capture::f32("scale", 2.5))
    .capture(Capture::buffer("src", &src))
    .capture(Capture::buffer("dst", &dst));

    device.for_each(GridShape::d1(n as u32), &desc).unwrap();

    let out = device.read_back::<f32>(&dst).unwrap();
    let expected: Vec<f32> = input.iter().map(|v| v * 2.5).collect();
    assert_close(&out, &expected);
}

#[test]
fn test_two_buffer_combine_through_user_function() {
    let Some(device) = try_device() else { return };

    let n = 64usize;
    let a_host: Vec<f32> = (0..n).map(|i| i as f32).collect();
    let b_host: Vec<f32> = (0..n).map(|i| (i * i) as f32).collect();
    let a = device.alloc(&a_host, true);
    let b = device.alloc(&b_host, true);
    let out = device.alloc_zeroed::<f32>(n);

    // blend(x, y) = x * 0.25 + y * 0.75
    let blend = KernelSource::new(
        "blend",
        vec![
            ("x".into(), TypeRef::Scalar(ScalarType::F32)),
            ("y".into(), TypeRef::Scalar(ScalarType::F32)),
        ],
        Some(TypeRef::Scalar(ScalarType::F32)),
        vec![IrStmt::ret(
            IrExpr::local("x")
                .mul(IrExpr::f32(0.25))
                .add(IrExpr::local("y").mul(IrExpr::f32(0.75))),
        )],
    );

    let desc = KernelDescriptor::new(vec![IrStmt::store(
        "out",
        IrExpr::thread_x(),
        IrExpr::call(
            "blend",
            vec![
                IrExpr::index("a", IrExpr::thread_x()),
                IrExpr::index("b", IrExpr::thread_x()),
            ],
        ),
    )])
    .capture(Capture::buffer("a", &a))
    .capture(Capture::buffer("b", &b))
    .capture(Capture::buffer("out", &out))
    .function(blend);

    device.for_each(GridShape::d1(n as u32), &desc).unwrap();

    let got = device.read_back::<f32>(&out).unwrap();
    let expected: Vec<f32> = a_host
        .iter()
        .zip(&b_host)
        .map(|(x, y)| x * 0.25 + y * 0.75)
        .collect();
    assert_close(&got, &expected);
}

#[test]
fn test_2d_grid_addressing() {
    let Some(device) = try_device() else { return };

    let (w, h) = (16u32, 9u32);
    let out = device.alloc_zeroed::<u32>((w * h) as usize);

    let desc = KernelDescriptor::new(vec![IrStmt::store(
        "out",
        IrExpr::thread_y()
            .mul(IrExpr::capture("width"))
            .add(IrExpr::thread_x()),
        IrExpr::thread_x().add(IrExpr::thread_y().mul(IrExpr::u32(100))),
    )])
    .capture(Capture::u32("width", w))
    .capture(Capture::buffer("out", &out));

    device.for_each(GridShape::d2(w, h), &desc).unwrap();

    let got = device.read_back::<u32>(&out).unwrap();
    for y in 0..h {
        for x in 0..w {
            assert_eq!(got[(y * w + x) as usize], x + y * 100, "cell ({}, {})", x, y);
        }
    }
}

#[test]
fn test_loop_and_branch_in_kernel_body() {
    let Some(device) = try_device() else { return };

    let n = 32usize;
    let input: Vec<f32> = (0..n).map(|i| (i % 7) as f32).collect();
    let src = device.alloc(&input, true);
    let dst = device.alloc_zeroed::<f32>(n);

    // Windowed sum of 4 leading elements, clamped to zero if negative.
    let desc = KernelDescriptor::new(vec![
        IrStmt::let_typed("acc", TypeRef::Scalar(ScalarType::F32), IrExpr::f32(0.0)),
        IrStmt::For {
            var: "i".into(),
            begin: IrExpr::u32(0),
            end: IrExpr::u32(4),
            body: vec![IrStmt::assign(
                "acc",
                IrExpr::local("acc").add(IrExpr::index(
                    "src",
                    IrExpr::thread_x()
                        .add(IrExpr::local("i"))
                        .rem(IrExpr::capture("len")),
                )),
            )],
        },
        IrStmt::If {
            cond: IrExpr::local("acc").lt(IrExpr::f32(0.0)),
            then_body: vec![IrStmt::assign("acc", IrExpr::f32(0.0))],
            else_body: vec![],
        },
        IrStmt::store("dst", IrExpr::thread_x(), IrExpr::local("acc")),
    ])
    .capture(Capture::u32("len", n as u32))
    .capture(Capture::buffer("src", &src))
    .capture(Capture::buffer("dst", &dst));

    device.for_each(GridShape::d1(n as u32), &desc).unwrap();

    let got = device.read_back::<f32>(&dst).unwrap();
    let expected: Vec<f32> = (0..n)
        .map(|t| (0..4).map(|i| input[(t + i) % n]).sum::<f32>().max(0.0))
        .collect();
    assert_close(&got, &expected);
}

#[test]
fn test_intrinsics_translate_and_run() {
    let Some(device) = try_device() else { return };

    let n = 16usize;
    let out = device.alloc_zeroed::<f32>(n);

    // lerp(floor(sqrt(t)), t, 0.5), exercising renamed intrinsics.
    let desc = KernelDescriptor::new(vec![
        IrStmt::let_("t", IrExpr::call("f32", vec![IrExpr::thread_x()])),
        IrStmt::store(
            "out",
            IrExpr::thread_x(),
            IrExpr::call(
                "lerp",
                vec![
                    IrExpr::call("floor", vec![IrExpr::call("sqrt", vec![IrExpr::local("t")])]),
                    IrExpr::local("t"),
                    IrExpr::f32(0.5),
                ],
            ),
        ),
    ])
    .capture(Capture::buffer("out", &out));

    device.for_each(GridShape::d1(n as u32), &desc).unwrap();

    let got = device.read_back::<f32>(&out).unwrap();
    let expected: Vec<f32> = (0..n)
        .map(|i| {
            let t = i as f32;
            let a = t.sqrt().floor();
            a + (t - a) * 0.5
        })
        .collect();
    assert_close(&got, &expected);
}

#[test]
fn test_redispatch_with_new_values_reuses_cached_shape() {
    let Some(device) = try_device() else { return };

    let n = 8usize;
    let dst = device.alloc_zeroed::<f32>(n);

    let kernel = |scalar_name: &str, buffer_name: &str, k: f32, dst: &riptide::GpuBuffer| {
        KernelDescriptor::new(vec![IrStmt::store(
            buffer_name,
            IrExpr::thread_x(),
            IrExpr::capture(scalar_name),
        )])
        .capture(Capture::f32(scalar_name, k))
        .capture(Capture::buffer(buffer_name, dst))
    };

    let first = kernel("k", "dst", 1.5, &dst);
    device.for_each(GridShape::d1(n as u32), &first).unwrap();
    assert_close(&device.read_back::<f32>(&dst).unwrap(), &[1.5; 8]);

    let sig_first = riptide::signature_of(&riptide::inspect(&first).unwrap());
    let entry_first = ShaderCache::global().lookup(&sig_first).unwrap();

    // Same shape, different names and a different captured value: must hit
    // the cached pipeline, not compile a second one. The cached fields
    // still carry the first kernel's capture names; dispatch validation is
    // positional by kind and type, so the rename must not be rejected.
    let cached_names: Vec<&str> = entry_first
        .program
        .fields
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(cached_names, vec!["k", "dst"]);
    let second = kernel("gain", "sink", -4.0, &dst);
    device.for_each(GridShape::d1(n as u32), &second).unwrap();
    assert_close(&device.read_back::<f32>(&dst).unwrap(), &[-4.0; 8]);

    let sig_second = riptide::signature_of(&riptide::inspect(&second).unwrap());
    assert_eq!(sig_first, sig_second);
    let entry_second = ShaderCache::global().lookup(&sig_second).unwrap();
    assert!(Arc::ptr_eq(&entry_first, &entry_second));
}

#[test]
fn test_concurrent_first_dispatches_keep_one_entry() {
    let Some(device) = try_device() else { return };
    let device = Arc::new(device);

    let n = 64u32;
    // A shape no other test uses, so every thread starts from a miss.
    let build = move |device: &GpuDevice| {
        let dst = device.alloc_zeroed::<f32>(n as usize);
        let desc = KernelDescriptor::new(vec![IrStmt::store(
            "dst",
            IrExpr::thread_x(),
            IrExpr::call("f32", vec![IrExpr::thread_x()]).mul(IrExpr::f32(0.125)),
        )])
        .capture(Capture::buffer("dst", &dst));
        (dst, desc)
    };

    let inspection = riptide::inspect(&build(&device).1).unwrap();
    let signature = riptide::signature_of(&inspection);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let device = Arc::clone(&device);
            std::thread::spawn(move || {
                let (dst, desc) = build(&device);
                device.for_each(GridShape::d1(n), &desc).unwrap();
                device.read_back::<f32>(&dst).unwrap()
            })
        })
        .collect();

    let expected: Vec<f32> = (0..n).map(|i| i as f32 * 0.125).collect();
    for handle in handles {
        assert_close(&handle.join().unwrap(), &expected);
    }

    // All racers converged on one cached pipeline.
    let entry = ShaderCache::global().lookup(&signature).unwrap();
    let again = ShaderCache::global().lookup(&signature).unwrap();
    assert!(Arc::ptr_eq(&entry, &again));
}

#[test]
fn test_square_captured_scalar_and_rehit_with_new_value() {
    let Some(device) = try_device() else { return };

    let b = device.alloc_zeroed::<f32>(1);
    let square = |k: f32, b: &riptide::GpuBuffer| {
        KernelDescriptor::new(vec![IrStmt::store(
            "b",
            IrExpr::u32(0),
            IrExpr::capture("k").mul(IrExpr::capture("k")),
        )])
        .capture(Capture::f32("k", k))
        .capture(Capture::buffer("b", b))
    };

    let first = square(3.0, &b);
    device.for_each(GridShape::d1(1), &first).unwrap();
    assert_eq!(device.read_back::<f32>(&b).unwrap(), vec![9.0]);

    let sig = riptide::signature_of(&riptide::inspect(&first).unwrap());
    let compiled = ShaderCache::global().lookup(&sig).unwrap();

    // Same shape, new captured value: no recompilation, just new output.
    let second = square(4.0, &b);
    assert_eq!(sig, riptide::signature_of(&riptide::inspect(&second).unwrap()));
    device.for_each(GridShape::d1(1), &second).unwrap();
    assert_eq!(device.read_back::<f32>(&b).unwrap(), vec![16.0]);
    assert!(Arc::ptr_eq(
        &compiled,
        &ShaderCache::global().lookup(&sig).unwrap()
    ));
}

#[test]
fn test_sigmoid_of_pow() {
    let Some(device) = try_device() else { return };

    let out = device.alloc_zeroed::<f32>(1);

    // sigmoid(v) = 1 / (1 + exp(-v))
    let sigmoid = KernelSource::new(
        "sigmoid",
        vec![("v".into(), TypeRef::Scalar(ScalarType::F32))],
        Some(TypeRef::Scalar(ScalarType::F32)),
        vec![IrStmt::ret(IrExpr::f32(1.0).div(
            IrExpr::f32(1.0).add(IrExpr::call("exp", vec![IrExpr::local("v").neg()])),
        ))],
    );

    let desc = KernelDescriptor::new(vec![IrStmt::store(
        "out",
        IrExpr::u32(0),
        IrExpr::call(
            "sigmoid",
            vec![IrExpr::call(
                "pow",
                vec![IrExpr::capture("x"), IrExpr::f32(2.0)],
            )],
        ),
    )])
    .capture(Capture::f32("x", 3.0))
    .capture(Capture::buffer("out", &out))
    .function(sigmoid);

    device.for_each(GridShape::d1(1), &desc).unwrap();

    let got = device.read_back::<f32>(&out).unwrap()[0];
    assert!((got - 0.9998766).abs() < 1e-4, "got {}", got);
}

#[test]
fn test_redispatch_is_idempotent() {
    let Some(device) = try_device() else { return };

    let n = 16usize;
    let input: Vec<f32> = (0..n).map(|i| (i as f32).sin()).collect();
    let src = device.alloc(&input, true);
    let dst = device.alloc_zeroed::<f32>(n);

    let desc = KernelDescriptor::new(vec![IrStmt::store(
        "dst",
        IrExpr::thread_x(),
        IrExpr::call("abs", vec![IrExpr::index("src", IrExpr::thread_x())]),
    )])
    .capture(Capture::buffer("src", &src))
    .capture(Capture::buffer("dst", &dst));

    device.for_each(GridShape::d1(n as u32), &desc).unwrap();
    let first = device.read_back::<f32>(&dst).unwrap();

    device.for_each(GridShape::d1(n as u32), &desc).unwrap();
    let second = device.read_back::<f32>(&dst).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_dispatch_with_deferred_buffer_is_rejected() {
    let Some(device) = try_device() else { return };

    let desc = KernelDescriptor::new(vec![IrStmt::store(
        "dst",
        IrExpr::thread_x(),
        IrExpr::f32(1.0),
    )])
    .capture(Capture::deferred_buffer("dst", ScalarType::F32, false));

    let err = device.for_each(GridShape::d1(8), &desc).unwrap_err();
    match err {
        KernelError::BindingMismatch { detail } => {
            assert!(detail.contains("dst"), "got: {}", detail)
        }
        other => panic!("expected BindingMismatch, got {:?}", other),
    }
}

#[test]
fn test_translation_error_reports_before_device_work() {
    let Some(device) = try_device() else { return };

    let dst = device.alloc_zeroed::<f32>(4);
    let desc = KernelDescriptor::new(vec![IrStmt::store(
        "dst",
        IrExpr::thread_x(),
        IrExpr::call("not_a_function", vec![]),
    )])
    .capture(Capture::buffer("dst", &dst));

    let err = device.for_each(GridShape::d1(4), &desc).unwrap_err();
    assert!(matches!(err, KernelError::AmbiguousOverload { .. }));
    assert!(err.is_translation_error());
    // The target buffer is untouched.
    assert_eq!(device.read_back::<f32>(&dst).unwrap(), vec![0.0; 4]);
}
