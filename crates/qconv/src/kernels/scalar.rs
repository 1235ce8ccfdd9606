//! Scalar accumulation loops over packed weights.
//!
//! Baseline implementations guaranteed to work on any architecture. The
//! packed walk order is `[KH, KW, OC/G, G, IC/G]` (see
//! [`crate::packing::PackedWeightMatrix`]); activations are read in their
//! native `[MB, IH, IW, IC]` layout, with out-of-bounds taps reading the
//! activation zero point.

use std::ops::Range;

use crate::shape::ConvShape;

/// One output value: the full receptive-field dot product for output
/// channel `k` of `group` at position `(n, hout, wout)`, bounds-checked
/// per tap.
#[allow(clippy::too_many_arguments)]
fn tap_sum(
    shape: &ConvShape,
    activations: &[u8],
    a_zero_point: i32,
    packed: &[i8],
    group: usize,
    n: usize,
    hout: usize,
    wout: usize,
    k: usize,
) -> i32 {
    let (ih, iw) = (shape.ih as isize, shape.iw as isize);
    let ic = shape.ic;
    let ic_per_g = shape.ic_per_group();
    let oc_per_g = shape.oc_per_group();

    let mut sum = 0i32;
    for r in 0..shape.kh {
        let h_in = (hout * shape.stride_h + r) as isize - shape.pad_top as isize;
        for s in 0..shape.kw {
            let w_in = (wout * shape.stride_w + s) as isize - shape.pad_left as isize;
            let w_base = (((r * shape.kw + s) * oc_per_g + k) * shape.g + group) * ic_per_g;
            if h_in >= 0 && h_in < ih && w_in >= 0 && w_in < iw {
                let a_base =
                    ((n as isize * ih + h_in) * iw + w_in) as usize * ic + group * ic_per_g;
                for c in 0..ic_per_g {
                    sum += activations[a_base + c] as i32 * packed[w_base + c] as i32;
                }
            } else if a_zero_point != 0 {
                for c in 0..ic_per_g {
                    sum += a_zero_point * packed[w_base + c] as i32;
                }
            }
        }
    }
    sum
}

/// Generic fallback: correct for every kernel size, stride, and padding.
pub(crate) fn conv_rows_generic(
    shape: &ConvShape,
    activations: &[u8],
    a_zero_point: i32,
    packed: &[i8],
    group: usize,
    rows: Range<usize>,
    acc: &mut [i32],
) {
    let (oh, ow, oc) = (shape.oh(), shape.ow(), shape.oc);
    let oc_per_g = shape.oc_per_group();

    for (local, row) in rows.enumerate() {
        let n = row / oh;
        let hout = row % oh;
        for wout in 0..ow {
            let out_base = (local * ow + wout) * oc + group * oc_per_g;
            for k in 0..oc_per_g {
                acc[out_base + k] =
                    tap_sum(shape, activations, a_zero_point, packed, group, n, hout, wout, k);
            }
        }
    }
}

/// Specialized 3x3 / stride-1 / pad-1 variant: interior positions see a
/// fully in-bounds window and run with no per-tap bounds checks; borders
/// fall back to the checked path. Accumulators are bit-identical to
/// [`conv_rows_generic`].
pub(crate) fn conv_rows_3x3s1(
    shape: &ConvShape,
    activations: &[u8],
    a_zero_point: i32,
    packed: &[i8],
    group: usize,
    rows: Range<usize>,
    acc: &mut [i32],
) {
    debug_assert!(shape.kh == 3 && shape.kw == 3);
    debug_assert!(shape.stride_h == 1 && shape.stride_w == 1);
    debug_assert!(
        shape.pad_top == 1
            && shape.pad_left == 1
            && shape.pad_bottom == 1
            && shape.pad_right == 1
    );

    let (ih, iw, ic, oc) = (shape.ih, shape.iw, shape.ic, shape.oc);
    let (oh, ow) = (shape.oh(), shape.ow());
    let ic_per_g = shape.ic_per_group();
    let oc_per_g = shape.oc_per_group();

    for (local, row) in rows.enumerate() {
        let n = row / oh;
        let hout = row % oh;
        let interior_h = hout >= 1 && hout + 1 < ih;
        for wout in 0..ow {
            let out_base = (local * ow + wout) * oc + group * oc_per_g;
            if interior_h && wout >= 1 && wout + 1 < iw {
                // nine taps, all in bounds
                for k in 0..oc_per_g {
                    let mut sum = 0i32;
                    for r in 0..3 {
                        let a_base =
                            ((n * ih + hout + r - 1) * iw + wout - 1) * ic + group * ic_per_g;
                        for s in 0..3 {
                            let w_base =
                                (((r * 3 + s) * oc_per_g + k) * shape.g + group) * ic_per_g;
                            let a_tap = a_base + s * ic;
                            for c in 0..ic_per_g {
                                sum += activations[a_tap + c] as i32 * packed[w_base + c] as i32;
                            }
                        }
                    }
                    acc[out_base + k] = sum;
                }
            } else {
                for k in 0..oc_per_g {
                    acc[out_base + k] = tap_sum(
                        shape,
                        activations,
                        a_zero_point,
                        packed,
                        group,
                        n,
                        hout,
                        wout,
                        k,
                    );
                }
            }
        }
    }
}

/// Per-row activation sums for one group over the given row range:
/// `row_offset[m] = sum of the receptive field feeding output position m`,
/// padded taps contributing the zero point. Only needed when weight zero
/// points are nonzero.
pub(crate) fn row_offsets_rows(
    shape: &ConvShape,
    activations: &[u8],
    a_zero_point: i32,
    group: usize,
    rows: Range<usize>,
    out: &mut [i32],
) {
    let (ih, iw) = (shape.ih as isize, shape.iw as isize);
    let ic = shape.ic;
    let ic_per_g = shape.ic_per_group();
    let (oh, ow) = (shape.oh(), shape.ow());

    for (local, row) in rows.enumerate() {
        let n = row / oh;
        let hout = row % oh;
        for wout in 0..ow {
            let mut sum = 0i32;
            for r in 0..shape.kh {
                let h_in = (hout * shape.stride_h + r) as isize - shape.pad_top as isize;
                for s in 0..shape.kw {
                    let w_in = (wout * shape.stride_w + s) as isize - shape.pad_left as isize;
                    if h_in >= 0 && h_in < ih && w_in >= 0 && w_in < iw {
                        let a_base =
                            ((n as isize * ih + h_in) * iw + w_in) as usize * ic + group * ic_per_g;
                        for c in 0..ic_per_g {
                            sum += activations[a_base + c] as i32;
                        }
                    } else {
                        sum += a_zero_point * ic_per_g as i32;
                    }
                }
            }
            out[local * ow + wout] = sum;
        }
    }
}
