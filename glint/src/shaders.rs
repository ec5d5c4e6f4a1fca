// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The built-in rasterizer program: embedded WGSL plus the registered CPU
//! twins of each stage kernel.

use crate::kernels;
use crate::program::{compile, CompileOptions, Program};
use crate::Result;

pub const RASTERIZER_WGSL: &str = include_str!("../shaders/rasterizer.wgsl");

/// Compiles the fixed-function rasterizer program with reflection retained
/// and all four CPU twins registered.
pub fn rasterizer_program() -> Result<Program> {
    let program = compile(RASTERIZER_WGSL, &CompileOptions::default().arg_info(true))?;
    program.register_cpu_kernel("mark_scanline", kernels::mark_scanline)?;
    program.register_cpu_kernel("fill_scanline", kernels::fill_scanline)?;
    program.register_cpu_kernel("depth_test", kernels::depth_test)?;
    program.register_cpu_kernel("adapt_pixel", kernels::adapt_pixel)?;
    Ok(program)
}
