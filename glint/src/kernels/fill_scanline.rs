// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::convert::Float4;
use crate::cpu_dispatch::KernelArgs;

use super::util::lerp;
use super::{
    ARG_FRAGMENT_SIZE, ARG_FRAG_INFO, ARG_FRAG_POS, ARG_MARK_INFO, ARG_MARK_POS, ARG_MARK_SIZE,
};

/// Expands span endpoints into per-pixel fragment records; one work item per
/// scanline.
pub(crate) fn fill_scanline(n_scanlines: u32, args: &KernelArgs) {
    let mark_pos = args.buf::<Float4>(ARG_MARK_POS);
    let mark_info = args.buf::<Float4>(ARG_MARK_INFO);
    let mark_size = args.buf::<u32>(ARG_MARK_SIZE);
    let mut frag_size = args.buf::<u32>(ARG_FRAGMENT_SIZE);
    let mut frag_pos = args.buf::<Float4>(ARG_FRAG_POS);
    let mut frag_info = args.buf::<Float4>(ARG_FRAG_INFO);

    let scanlines = (n_scanlines as usize)
        .min(mark_size[0] as usize / 2)
        .min(mark_pos.len() / 2);

    for k in 0..scanlines {
        let pos_l = mark_pos[2 * k];
        let pos_r = mark_pos[2 * k + 1];
        let info_l = mark_info[2 * k];
        let info_r = mark_info[2 * k + 1];

        let len = (pos_r.x - pos_l.x) as i32 + 1;
        if len <= 0 {
            continue;
        }
        let base = frag_size[0] as usize;
        frag_size[0] += len as u32;

        for i in 0..len as usize {
            let index = base + i;
            if index >= frag_pos.len() || index >= frag_info.len() {
                break;
            }
            let t = if len > 1 {
                i as f32 / (len - 1) as f32
            } else {
                0.0
            };
            frag_pos[index] = Float4::new(
                pos_l.x + i as f32 + 0.5,
                pos_l.y + 0.5,
                lerp(pos_l.z, pos_r.z, t),
                info_l.w,
            );
            frag_info[index] = Float4::new(
                lerp(info_l.x, info_r.x, t),
                lerp(info_l.y, info_r.y, t),
                lerp(info_l.z, info_r.z, t),
                info_l.w,
            );
        }
    }
}
