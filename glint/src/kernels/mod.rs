// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPU implementations of the rasterizer kernel stages.
//!
//! Each module mirrors one entry point of `shaders/rasterizer.wgsl`; the
//! argument indices match that module's binding indices. Atomic counters on
//! the device side become plain adds here, since a queue runs one dispatch
//! at a time.

mod adapt_pixel;
mod depth_test;
mod fill_scanline;
mod mark_scanline;
pub(crate) mod util;

pub(crate) use adapt_pixel::adapt_pixel;
pub(crate) use depth_test::depth_test;
pub(crate) use fill_scanline::fill_scanline;
pub(crate) use mark_scanline::mark_scanline;

pub use util::{depth_key, monotone_depth_key};

// Binding indices of `shaders/rasterizer.wgsl`.
pub(crate) const ARG_INTERP_POSITION: usize = 0;
pub(crate) const ARG_VIEWPORT: usize = 1;
pub(crate) const ARG_MARK_SIZE: usize = 2;
pub(crate) const ARG_FRAGMENT_SIZE: usize = 3;
pub(crate) const ARG_MARK_POS: usize = 4;
pub(crate) const ARG_MARK_INFO: usize = 5;
pub(crate) const ARG_FRAG_POS: usize = 6;
pub(crate) const ARG_FRAG_INFO: usize = 7;
pub(crate) const ARG_BUFFER_SIZE: usize = 8;
pub(crate) const ARG_DEPTH_BUFFER: usize = 9;
pub(crate) const ARG_COLOR_BUFFER: usize = 10;
pub(crate) const ARG_PIXEL_BUFFER: usize = 11;
