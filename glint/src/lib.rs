// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Glint is a programmable triangle rasterizer built on a generic GPU-compute
//! substrate. A frame is produced by a fixed, staged pipeline of compute
//! kernels (vertex transform, scanline marking, scanline fill, per-fragment
//! depth resolution, fragment shading and pixel packing) driven over an
//! asynchronous promise runtime.
//!
//! The substrate has two execution engines behind a single device model:
//! [`wgpu`] compute pipelines built from WGSL, and a host worker that runs
//! registered CPU twins of the same kernels. The CPU device is always
//! available, which keeps the whole pipeline runnable (and testable) on
//! machines without a GPU.
//!
//! User-authored vertex and fragment kernels plug into the fixed stages by
//! *argument name*: every resource binding in a kernel is reflected at
//! compile time, and the [`Pipeline`] registry wires buffers to every kernel
//! argument sharing the buffer's bound name.
//!
//! ```no_run
//! use glint::{devices, platforms, Context, ContextGuard, DeviceKind, Rasterizer};
//!
//! let ps = platforms();
//! let ds = devices(&ps, DeviceKind::Cpu);
//! let ctx = Context::new(&ds[0])?;
//! let _scope = ContextGuard::new(&ctx)?;
//!
//! let rp = Rasterizer::new(800, 600)?;
//! // install shader programs, bind attribute buffers, then:
//! rp.render()?;
//! # Ok::<(), glint::Error>(())
//! ```

mod backend;
mod buffer;
mod context;
mod convert;
mod cpu_dispatch;
mod engine;
mod kernels;
mod ops;
mod pipeline;
mod program;
mod promise;
mod queue;
mod rasterizer;
mod wgpu_engine;

pub mod shaders;

pub mod image;
pub mod logging;
pub mod math;
pub mod mesh;

use thiserror::Error;

pub use backend::{devices, platforms, Device, DeviceKind, Platform};
pub use buffer::{AnyBuffer, Buffer, BufferHandle, StorageClass};
pub use context::{Context, ContextGuard};
pub use convert::{Float3, Float4, HostValue, Rgba8};
pub use engine::{DeviceBuffer, Engine};
pub use cpu_dispatch::{CpuKernelFn, KernelArgs};
pub use kernels::{depth_key, monotone_depth_key};
pub use ops::{call, callc, fill, pull, push, run, wait};
pub use pipeline::Pipeline;
pub use program::{compile, CompileOptions, Kernel, Program};
pub use promise::{Event, Hooked, Promise, Runnable};
pub use rasterizer::Rasterizer;

/// Errors that can occur in Glint.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Kernel source was rejected by the backend compiler.
    ///
    /// `head` holds the first ~50 characters of the offending source and
    /// `log` the backend diagnostic rendered against it.
    #[error("compilation error in '{head}...':\n{log}")]
    Compile { head: String, log: String },

    /// The program was compiled without argument-info reflection.
    ///
    /// Pass [`CompileOptions::arg_info`] to retain argument names.
    #[error("program was not compiled with argument-info reflection")]
    ReflectionUnavailable,

    /// Promises merged across different command queues.
    #[error("all promises have to belong to the same command queue")]
    QueueMismatch,

    /// A context was made current while another is already current.
    #[error("recursive context is not allowed")]
    RecursiveContext,

    /// A device-resource operation ran without a current context.
    #[error("no context is current on this thread")]
    NoCurrentContext,

    /// Host-side buffer access out of bounds.
    #[error("index {index} out of range for buffer of {len} elements")]
    OutOfRange { index: usize, len: usize },

    /// There is no device satisfying the requested kind.
    #[error("couldn't find a suitable device")]
    NoCompatibleDevice,

    /// Propagated fault from the compute backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// Allocating a shadow array or device handle failed.
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// A required argument name is missing from a user kernel.
    #[error("kernel '{kernel}' is missing required argument '{arg}'")]
    ShaderContract { kernel: String, arg: String },

    /// A mesh file could not be parsed.
    #[error("mesh parse error at line {line}: {msg}")]
    MeshParse { line: usize, msg: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
