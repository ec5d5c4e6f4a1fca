// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::convert::Float4;
use crate::cpu_dispatch::KernelArgs;

use super::{ARG_COLOR_BUFFER, ARG_PIXEL_BUFFER};

/// Packs the float color buffer into 32-bit pixels, R in the lowest byte and
/// A in the highest. Channels are clamped to `[0, 255]`.
pub(crate) fn adapt_pixel(n_texels: u32, args: &KernelArgs) {
    let color = args.buf::<Float4>(ARG_COLOR_BUFFER);
    let mut pixel = args.buf::<u32>(ARG_PIXEL_BUFFER);

    let count = (n_texels as usize).min(color.len()).min(pixel.len());
    for i in 0..count {
        let c = color[i];
        let r = c.x.clamp(0.0, 255.0) as u32;
        let g = c.y.clamp(0.0, 255.0) as u32;
        let b = c.z.clamp(0.0, 255.0) as u32;
        let a = c.w.clamp(0.0, 255.0) as u32;
        pixel[i] = (a << 24) | (b << 16) | (g << 8) | r;
    }
}
