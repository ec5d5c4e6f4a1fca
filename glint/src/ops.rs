// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The concrete operation set: `push`, `pull`, `fill`, `run`, `call`,
//! `callc` and `wait`.
//!
//! All of these are non-blocking at the point of enqueue except `wait`.
//! Host-side conversion work runs on the queue's worker thread after the
//! operation's dependencies complete, which keeps the host and device views
//! of a buffer consistent at the documented synchronization points.

use crate::buffer::{cpu_download, cpu_upload, Buffer, BufferHandle};
use crate::convert::HostValue;
use crate::engine::EngineKind;
use crate::program::Kernel;
use crate::promise::{Promise, Runnable};
use crate::queue::JobStatus;
use crate::{Error, Result};

/// Converts host → device and uploads the buffer.
pub fn push(buf: impl Into<BufferHandle>) -> Push {
    Push { buf: buf.into() }
}

/// Downloads the buffer and converts device → host.
pub fn pull(buf: impl Into<BufferHandle>) -> Pull {
    Pull { buf: buf.into() }
}

/// Fills the whole buffer with the converted pattern.
pub fn fill<H: HostValue>(buf: &Buffer<H>, pattern: H) -> Fill {
    Fill {
        buf: BufferHandle::from(buf),
        pattern: bytemuck::bytes_of(&pattern.to_device()).to_vec(),
    }
}

/// Launches `kernel` with global size `n`, or the kernel's range when
/// `n == 0`.
pub fn run(kernel: &Kernel, n: usize) -> Run {
    Run {
        kernel: kernel.clone(),
        n,
    }
}

/// Invokes `f` on the completion-callback thread once all dependencies are
/// done.
pub fn call<F: FnOnce() + Send + 'static>(f: F) -> Call<F> {
    Call { f }
}

/// Like [`call`], but `f` returns a promise; successors of this operation
/// additionally wait until that promise's operations have drained.
pub fn callc<F: FnOnce() -> Result<Promise> + Send + 'static>(f: F) -> CallChain<F> {
    CallChain { f }
}

/// Blocks the caller until all dependencies complete.
pub fn wait() -> Wait {
    Wait
}

pub struct Push {
    buf: BufferHandle,
}

impl Runnable for Push {
    fn run(self, p: &Promise) -> Result<Promise> {
        let buf = self.buf;
        p.enqueue(Box::new(move |ctx| {
            buf.conv_host_to_dev();
            let dev = buf.device_in(ctx.engine)?;
            match ctx.engine.kind() {
                EngineKind::Cpu => {
                    cpu_upload(&*buf.0, &dev);
                    Ok(JobStatus::Complete)
                }
                EngineKind::Wgpu(state) => {
                    let shadow = buf.shadow();
                    let store = shadow.lock();
                    state.upload(dev.expect_wgpu(), store.as_slice(), ctx.event);
                    Ok(JobStatus::Deferred)
                }
            }
        }))
    }
}

pub struct Pull {
    buf: BufferHandle,
}

impl Runnable for Pull {
    fn run(self, p: &Promise) -> Result<Promise> {
        let buf = self.buf;
        p.enqueue(Box::new(move |ctx| {
            let dev = buf.device_in(ctx.engine)?;
            match ctx.engine.kind() {
                EngineKind::Cpu => {
                    cpu_download(&*buf.0, &dev);
                    buf.conv_dev_to_host();
                    Ok(JobStatus::Complete)
                }
                EngineKind::Wgpu(state) => {
                    let shadow = buf.shadow();
                    let target = buf.clone();
                    state.download(
                        dev.expect_wgpu(),
                        buf.size_in_bytes(),
                        move |bytes| {
                            {
                                let mut store = shadow.lock();
                                let dst = store.as_mut_slice();
                                let n = dst.len().min(bytes.len());
                                dst[..n].copy_from_slice(&bytes[..n]);
                            }
                            target.conv_dev_to_host();
                        },
                        ctx.event,
                    );
                    Ok(JobStatus::Deferred)
                }
            }
        }))
    }
}

pub struct Fill {
    buf: BufferHandle,
    pattern: Vec<u8>,
}

impl Runnable for Fill {
    fn run(self, p: &Promise) -> Result<Promise> {
        let Fill { buf, pattern } = self;
        p.enqueue(Box::new(move |ctx| {
            let dev = buf.device_in(ctx.engine)?;
            match ctx.engine.kind() {
                EngineKind::Cpu => {
                    let mut store = dev.expect_cpu().lock();
                    for chunk in store.as_mut_slice().chunks_exact_mut(pattern.len()) {
                        chunk.copy_from_slice(&pattern);
                    }
                    Ok(JobStatus::Complete)
                }
                EngineKind::Wgpu(state) => {
                    let count = buf.size_in_bytes() / pattern.len();
                    let image: Vec<u8> = pattern
                        .iter()
                        .cycle()
                        .take(count * pattern.len())
                        .copied()
                        .collect();
                    state.upload(dev.expect_wgpu(), &image, ctx.event);
                    Ok(JobStatus::Deferred)
                }
            }
        }))
    }
}

pub struct Run {
    kernel: Kernel,
    n: usize,
}

impl Runnable for Run {
    fn run(self, p: &Promise) -> Result<Promise> {
        let Run { kernel, n } = self;
        p.enqueue(Box::new(move |ctx| {
            let launch = if n != 0 { n } else { kernel.range() };
            match ctx.engine.kind() {
                EngineKind::Cpu => {
                    let f = kernel.program().cpu_kernel(kernel.name()).ok_or_else(|| {
                        Error::Backend(format!(
                            "kernel '{}' has no CPU implementation registered",
                            kernel.name()
                        ))
                    })?;
                    let args = cpu_bindings(&kernel, ctx.engine)?;
                    f(launch as u32, &args);
                    Ok(JobStatus::Complete)
                }
                EngineKind::Wgpu(state) => {
                    state.dispatch(ctx.engine, &kernel, launch, ctx.event)?;
                    Ok(JobStatus::Deferred)
                }
            }
        }))
    }
}

fn cpu_bindings(
    kernel: &Kernel,
    engine: &crate::engine::Engine,
) -> Result<crate::cpu_dispatch::KernelArgs> {
    let args = kernel.args_snapshot();
    let max_index = kernel
        .arg_bindings()
        .values()
        .copied()
        .max()
        .map_or(0, |m| m as usize + 1);
    let mut slots = vec![None; max_index];
    for &index in kernel.arg_bindings().values() {
        if let Some(Some(handle)) = args.get(&index) {
            let dev = handle.device_in(engine)?;
            slots[index as usize] = Some(dev.expect_cpu().clone());
        }
    }
    Ok(crate::cpu_dispatch::KernelArgs::new(slots))
}

pub struct Call<F> {
    f: F,
}

impl<F: FnOnce() + Send + 'static> Runnable for Call<F> {
    fn run(self, p: &Promise) -> Result<Promise> {
        let f = self.f;
        p.enqueue(Box::new(move |_ctx| {
            f();
            Ok(JobStatus::Complete)
        }))
    }
}

pub struct CallChain<F> {
    f: F,
}

impl<F: FnOnce() -> Result<Promise> + Send + 'static> Runnable for CallChain<F> {
    fn run(self, p: &Promise) -> Result<Promise> {
        let f = self.f;
        p.enqueue(Box::new(move |ctx| {
            let sub = f()?;
            let event = ctx.event.clone();
            sub.then(call(move || event.signal()))?;
            Ok(JobStatus::Deferred)
        }))
    }
}

pub struct Wait;

impl Runnable for Wait {
    fn run(self, p: &Promise) -> Result<Promise> {
        p.wait()
    }
}
