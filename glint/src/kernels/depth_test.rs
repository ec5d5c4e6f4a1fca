// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::convert::Float4;
use crate::cpu_dispatch::KernelArgs;

use super::util::depth_key;
use super::{ARG_BUFFER_SIZE, ARG_DEPTH_BUFFER, ARG_FRAGMENT_SIZE, ARG_FRAG_POS};

/// Resolves per-pixel minimum depth: each fragment minimizes the depth cell
/// at its `(x, y)` with its z's integer key.
pub(crate) fn depth_test(n_frags: u32, args: &KernelArgs) {
    let frag_pos = args.buf::<Float4>(ARG_FRAG_POS);
    let frag_size = args.buf::<u32>(ARG_FRAGMENT_SIZE);
    let buffer_size = args.buf::<u32>(ARG_BUFFER_SIZE);
    let mut depth = args.buf::<i32>(ARG_DEPTH_BUFFER);

    let w = buffer_size[0] as usize;
    let h = buffer_size[1] as usize;
    let count = (n_frags as usize)
        .min(frag_size[0] as usize)
        .min(frag_pos.len());

    for i in 0..count {
        let p = frag_pos[i];
        let x = p.x as usize;
        let y = p.y as usize;
        if x >= w || y >= h {
            continue;
        }
        let cell = &mut depth[y * w + x];
        let key = depth_key(p.z);
        if key < *cell {
            *cell = key;
        }
    }
}
