// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::convert::Float4;
use crate::cpu_dispatch::KernelArgs;

use super::util::{barycentric, edge_x, signed_area2, to_screen, ScreenVertex};
use super::{
    ARG_FRAGMENT_SIZE, ARG_INTERP_POSITION, ARG_MARK_INFO, ARG_MARK_POS, ARG_MARK_SIZE,
    ARG_VIEWPORT,
};

/// Converts screen-space triangles into per-row span endpoints.
///
/// With `gclMarkInfo` unbound the kernel runs in counting mode: the mark and
/// fragment counters advance as if spans were emitted, but nothing is
/// written. The driver uses one counting pass to size the mark buffers.
pub(crate) fn mark_scanline(n_tris: u32, args: &KernelArgs) {
    let pos = args.buf::<Float4>(ARG_INTERP_POSITION);
    let viewport = args.buf::<f32>(ARG_VIEWPORT);
    let mut mark_size = args.buf::<u32>(ARG_MARK_SIZE);
    let mut frag_size = args.buf::<u32>(ARG_FRAGMENT_SIZE);
    if args.is_null(ARG_MARK_INFO) {
        mark_main(
            n_tris,
            &pos,
            &viewport,
            &mut mark_size,
            &mut frag_size,
            None,
        );
    } else {
        let mut mark_pos = args.buf::<Float4>(ARG_MARK_POS);
        let mut mark_info = args.buf::<Float4>(ARG_MARK_INFO);
        mark_main(
            n_tris,
            &pos,
            &viewport,
            &mut mark_size,
            &mut frag_size,
            Some((&mut *mark_pos, &mut *mark_info)),
        );
    }
}

fn mark_main(
    n_tris: u32,
    pos: &[Float4],
    viewport: &[f32],
    mark_size: &mut [u32],
    frag_size: &mut [u32],
    mut out: Option<(&mut [Float4], &mut [Float4])>,
) {
    let w = viewport[2];
    let h = viewport[3];
    let n_tris = (n_tris as usize).min(pos.len() / 3);

    for tri in 0..n_tris {
        let a = to_screen(pos[tri * 3], viewport);
        let b = to_screen(pos[tri * 3 + 1], viewport);
        let c = to_screen(pos[tri * 3 + 2], viewport);

        let area2 = signed_area2(a, b, c);
        if area2 == 0.0 {
            continue;
        }

        // Sort by screen y; the long edge (top, bot) stays active for every
        // row, the short edges swap at mid.
        let mut sorted = [a, b, c];
        sorted.sort_by(|p, q| p.y.total_cmp(&q.y));
        let [top, mid, bot] = sorted;

        let y_first = (top.y.ceil()).max(0.0) as i32;
        let y_last = (bot.y.floor()).min(h - 1.0) as i32;

        for y in y_first..=y_last {
            let yc = y as f32 + 0.5;
            let x_long = edge_x(top, bot, yc);
            let x_short = if (y as f32) < mid.y {
                edge_x(top, mid, yc)
            } else {
                edge_x(mid, bot, yc)
            };
            let (lo, hi) = if x_long <= x_short {
                (x_long, x_short)
            } else {
                (x_short, x_long)
            };
            let xl = lo.round().clamp(0.0, w - 1.0);
            let xr = hi.round().clamp(0.0, w - 1.0);
            if xr < xl {
                continue;
            }

            frag_size[0] += (xr - xl) as u32 + 1;
            let slot = mark_size[0] as usize;
            mark_size[0] += 2;

            if let Some((mark_pos, mark_info)) = out.as_mut() {
                if slot + 1 >= mark_pos.len() || slot + 1 >= mark_info.len() {
                    continue;
                }
                for (k, x) in [(slot, xl), (slot + 1, xr)] {
                    let (alpha, beta, gamma) = barycentric(a, b, c, area2, x + 0.5, yc);
                    let z = interp_z(a, b, c, alpha, beta, gamma);
                    mark_pos[k] = Float4::new(x, y as f32, z, 1.0);
                    mark_info[k] = Float4::new(alpha, beta, gamma, tri as f32);
                }
            }
        }
    }
}

fn interp_z(
    a: ScreenVertex,
    b: ScreenVertex,
    c: ScreenVertex,
    alpha: f32,
    beta: f32,
    gamma: f32,
) -> f32 {
    (alpha * a.z + beta * b.z + gamma * c.z).clamp(0.0, 1.0)
}
