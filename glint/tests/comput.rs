// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Substrate tests: buffers, promises, operations and pipeline wiring, all
//! against the always-available CPU device.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use glint::math::{Vec3, Vec4};
use glint::{
    call, callc, compile, devices, fill, platforms, pull, push, run, wait, Buffer, CompileOptions,
    Context, ContextGuard, DeviceKind, Error, Hooked, KernelArgs, Kernel, Pipeline, Promise,
    Rgba8, StorageClass,
};

fn cpu_context() -> Result<(Context, ContextGuard)> {
    let ps = platforms();
    let ds = devices(&ps, DeviceKind::Cpu);
    let ctx = Context::new(&ds[0])?;
    let guard = ContextGuard::new(&ctx)?;
    Ok((ctx, guard))
}

const COPY_KERNEL: &str = r#"
@group(0) @binding(0) var<storage, read> src_data: array<u32>;
@group(0) @binding(1) var<storage, read_write> dst_data: array<u32>;

@compute @workgroup_size(64)
fn copy_data(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= arrayLength(&src_data) || i >= arrayLength(&dst_data)) {
        return;
    }
    dst_data[i] = src_data[i];
}
"#;

fn copy_data_cpu(n: u32, args: &KernelArgs) {
    let src = args.buf::<u32>(0);
    let mut dst = args.buf::<u32>(1);
    for i in 0..(n as usize).min(src.len()).min(dst.len()) {
        dst[i] = src[i];
    }
}

fn copy_program() -> Result<glint::Program> {
    let program = compile(COPY_KERNEL, &CompileOptions::default().arg_info(true))?;
    program.register_cpu_kernel("copy_data", copy_data_cpu)?;
    Ok(program)
}

#[test]
fn buffer_roundtrip_identity() -> Result<()> {
    let (_ctx, _scope) = cpu_context()?;
    for class in [
        StorageClass::HostMap,
        StorageClass::NoAccess,
        StorageClass::Direct,
    ] {
        let values: Vec<u32> = (0..257).map(|i| i * 31 + 7).collect();
        let buf = Buffer::from_values_in(&values, class);
        Promise::new()?
            .then(push(&buf))?
            .then(pull(&buf))?
            .then(wait())?;
        assert_eq!(buf.to_vec(), values, "class {class:?}");
    }
    Ok(())
}

#[test]
fn buffer_roundtrip_converted_types() -> Result<()> {
    let (_ctx, _scope) = cpu_context()?;

    let v4: Vec<Vec4> = (0..64)
        .map(|i| Vec4::new(i as f32, -(i as f32), 0.5 * i as f32, 1.0))
        .collect();
    let buf = Buffer::from_values(&v4);
    Promise::new()?
        .then(push(&buf))?
        .then(pull(&buf))?
        .then(wait())?;
    assert_eq!(buf.to_vec(), v4);

    let v3: Vec<Vec3> = (0..64)
        .map(|i| Vec3::new(i as f32, 2.0 * i as f32, -3.0 * i as f32))
        .collect();
    let buf = Buffer::from_values(&v3);
    Promise::new()?
        .then(push(&buf))?
        .then(pull(&buf))?
        .then(wait())?;
    assert_eq!(buf.to_vec(), v3);

    let px: Vec<Rgba8> = (0..=255u32)
        .map(|i| Rgba8::new(i as u8, (i ^ 0x5a) as u8, (255 - i) as u8, 255))
        .collect();
    let buf = Buffer::from_values(&px);
    Promise::new()?
        .then(push(&buf))?
        .then(pull(&buf))?
        .then(wait())?;
    assert_eq!(buf.to_vec(), px);
    Ok(())
}

#[test]
fn fill_writes_converted_pattern() -> Result<()> {
    let (_ctx, _scope) = cpu_context()?;
    let buf: Buffer<i32> = Buffer::with_capacity_in(33, StorageClass::Direct);
    Promise::new()?
        .then(fill(&buf, i32::MAX))?
        .then(pull(&buf))?
        .then(wait())?;
    assert!(buf.to_vec().iter().all(|&v| v == i32::MAX));
    Ok(())
}

#[test]
fn out_of_range_host_access_is_rejected() -> Result<()> {
    let buf: Buffer<u32> = Buffer::with_capacity(4);
    assert!(matches!(
        buf.get(4),
        Err(Error::OutOfRange { index: 4, len: 4 })
    ));
    assert!(matches!(buf.set(17, 1), Err(Error::OutOfRange { .. })));
    assert_eq!(buf.get(3)?, 0);
    Ok(())
}

#[test]
fn promise_chain_orders_effects() -> Result<()> {
    let (_ctx, _scope) = cpu_context()?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut p = Promise::new()?;
    for i in 0..8 {
        let seen = seen.clone();
        p = p.then(call(move || seen.lock().push(i)))?;
    }
    p.then(wait())?;
    assert_eq!(*seen.lock(), (0..8).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn merged_branches_precede_successors() -> Result<()> {
    let (_ctx, _scope) = cpu_context()?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let root = Promise::new()?;
    let left = {
        let seen = seen.clone();
        root.then(call(move || seen.lock().push("left")))?
    };
    let right = {
        let seen = seen.clone();
        root.then(call(move || seen.lock().push("right")))?
    };
    let joined = Promise::merge([left, right])?;
    let tail = {
        let seen = seen.clone();
        joined.then(call(move || seen.lock().push("tail")))?
    };
    tail.then(wait())?;

    let order = seen.lock().clone();
    assert_eq!(order.len(), 3);
    assert_eq!(order[2], "tail");
    Ok(())
}

#[test]
fn callc_subchain_completes_before_successor() -> Result<()> {
    let (_ctx, _scope) = cpu_context()?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let base = Promise::new()?;

    let sub_base = base.clone();
    let sub_seen = seen.clone();
    let p = base.then(callc(move || {
        let s1 = sub_seen.clone();
        let s2 = sub_seen.clone();
        sub_base
            .then(call(move || s1.lock().push(1)))?
            .then(call(move || s2.lock().push(2)))
    }))?;
    let tail_seen = seen.clone();
    p.then(call(move || tail_seen.lock().push(3)))?.then(wait())?;

    assert_eq!(*seen.lock(), vec![1, 2, 3]);
    Ok(())
}

#[test]
fn merge_across_queues_is_rejected() -> Result<()> {
    let ps = platforms();
    let ds = devices(&ps, DeviceKind::Cpu);

    let ctx_a = Context::new(&ds[0])?;
    let p_a = {
        let _scope = ContextGuard::new(&ctx_a)?;
        Promise::new()?
    };
    let ctx_b = Context::new(&ds[0])?;
    let p_b = {
        let _scope = ContextGuard::new(&ctx_b)?;
        Promise::new()?
    };
    assert!(matches!(
        Promise::merge([p_a, p_b]),
        Err(Error::QueueMismatch)
    ));
    Ok(())
}

#[test]
fn recursive_context_is_rejected() -> Result<()> {
    let (ctx, _scope) = cpu_context()?;
    assert!(matches!(
        ContextGuard::new(&ctx),
        Err(Error::RecursiveContext)
    ));
    Ok(())
}

#[test]
fn operations_need_a_current_context() {
    assert!(matches!(Promise::new(), Err(Error::NoCurrentContext)));
}

#[test]
fn compile_error_carries_backend_log() {
    let err = compile("@compute fn nonsense {", &CompileOptions::default()).unwrap_err();
    match err {
        Error::Compile { head, log } => {
            assert!(head.starts_with("@compute"));
            assert!(!log.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn reflection_requires_arg_info() -> Result<()> {
    let program = compile(COPY_KERNEL, &CompileOptions::default())?;
    let kernel = Kernel::new(&program, "copy_data")?;
    assert!(matches!(
        kernel.arg_indices(),
        Err(Error::ReflectionUnavailable)
    ));

    let program = compile(COPY_KERNEL, &CompileOptions::default().arg_info(true))?;
    let kernel = Kernel::new(&program, "copy_data")?;
    let indices = kernel.arg_indices()?;
    assert_eq!(indices.get("src_data"), Some(&0));
    assert_eq!(indices.get("dst_data"), Some(&1));
    Ok(())
}

#[test]
fn pipeline_wiring_is_order_independent() -> Result<()> {
    let (_ctx, _scope) = cpu_context()?;
    let values: Vec<u32> = (0..100).collect();

    // Buffers first, kernel second.
    let src = Buffer::from_values(&values);
    let dst: Buffer<u32> = Buffer::with_capacity_in(values.len(), StorageClass::Direct);
    let mut pl = Pipeline::new();
    pl.bind_buffer("src_data", &src);
    pl.bind_buffer("dst_data", &dst);
    pl.bind_kernels_from_program(&copy_program()?)?;
    Promise::new()?
        .then(push(&src))?
        .then(run(&pl.get_kernel("copy_data").unwrap(), values.len()))?
        .then(pull(&dst))?
        .then(wait())?;
    let buffers_first = dst.to_vec();

    // Kernel first, buffers second.
    let src = Buffer::from_values(&values);
    let dst: Buffer<u32> = Buffer::with_capacity_in(values.len(), StorageClass::Direct);
    let mut pl = Pipeline::new();
    pl.bind_kernels_from_program(&copy_program()?)?;
    pl.bind_buffer("src_data", &src);
    pl.bind_buffer("dst_data", &dst);
    Promise::new()?
        .then(push(&src))?
        .then(run(&pl.get_kernel("copy_data").unwrap(), values.len()))?
        .then(pull(&dst))?
        .then(wait())?;
    let kernel_first = dst.to_vec();

    assert_eq!(buffers_first, values);
    assert_eq!(kernel_first, values);
    Ok(())
}

#[test]
fn rebinding_replaces_for_all_kernels() -> Result<()> {
    let (_ctx, _scope) = cpu_context()?;
    let first: Vec<u32> = vec![1; 16];
    let second: Vec<u32> = vec![2; 16];

    let src_a = Buffer::from_values(&first);
    let src_b = Buffer::from_values(&second);
    let dst: Buffer<u32> = Buffer::with_capacity_in(16, StorageClass::Direct);

    let mut pl = Pipeline::new();
    pl.bind_kernels_from_program(&copy_program()?)?;
    pl.bind_buffer("dst_data", &dst);
    pl.bind_buffer("src_data", &src_a);
    pl.bind_buffer("src_data", &src_b);
    let kernel = pl.get_kernel("copy_data").unwrap();

    Promise::new()?
        .then(push(&src_a))?
        .then(push(&src_b))?
        .then(run(&kernel, 16))?
        .then(pull(&dst))?
        .then(wait())?;
    assert_eq!(dst.to_vec(), second);
    Ok(())
}

#[test]
fn run_uses_kernel_range_when_unsized() -> Result<()> {
    let (_ctx, _scope) = cpu_context()?;
    let values: Vec<u32> = (10..26).collect();
    let src = Buffer::from_values(&values);
    let dst: Buffer<u32> = Buffer::with_capacity_in(values.len(), StorageClass::Direct);
    let mut pl = Pipeline::new();
    pl.bind_kernels_from_program(&copy_program()?)?;
    pl.bind_buffer("src_data", &src);
    pl.bind_buffer("dst_data", &dst);
    let kernel = pl.get_kernel("copy_data").unwrap();

    // Only the first half is copied when the range says so.
    kernel.set_range(8);
    Promise::new()?
        .then(push(&src))?
        .then(run(&kernel, 0))?
        .then(pull(&dst))?
        .then(wait())?;
    let out = dst.to_vec();
    assert_eq!(&out[..8], &values[..8]);
    assert!(out[8..].iter().all(|&v| v == 0));
    Ok(())
}

#[test]
fn hooked_listeners_wrap_the_body() -> Result<()> {
    let (_ctx, _scope) = cpu_context()?;
    let seen = Arc::new(Mutex::new(Vec::new()));

    let pre_seen = seen.clone();
    let body_seen = seen.clone();
    let post_seen = seen.clone();
    let op = Hooked::new(call(move || body_seen.lock().push("body")))
        .pre(move |p| p.then(call(move || pre_seen.lock().push("pre"))))
        .post(move |p| p.then(call(move || post_seen.lock().push("post"))));

    Promise::new()?.then(op)?.then(wait())?;
    assert_eq!(*seen.lock(), vec!["pre", "body", "post"]);
    Ok(())
}

#[test]
fn callc_errors_surface_at_wait() -> Result<()> {
    let (_ctx, _scope) = cpu_context()?;
    let p = Promise::new()?.then(callc(|| Err(Error::Backend("stage failed".into()))))?;
    let Err(err) = p.wait() else {
        panic!("expected the stage failure to surface");
    };
    assert!(matches!(err, Error::Backend(_)));
    Ok(())
}

#[test]
fn call_panics_resume_at_wait() -> Result<()> {
    let (_ctx, _scope) = cpu_context()?;
    let p = Promise::new()?.then(call(|| panic!("user callback exploded")))?;
    let outcome = catch_unwind(AssertUnwindSafe(|| p.wait()));
    assert!(outcome.is_err());
    Ok(())
}
