//! Ground-truth transforms: im2col, weight transpose, reference
//! convolution and requantization.
//!
//! Everything in this module is the slow, obviously-correct path. The
//! direct kernel behind [`crate::conv::groupwise_conv`] must match these
//! functions bit-for-bit; they are also reused to compute correction
//! offsets in tests.
//!
//! Convention, shared with the optimized path: padded taps read the
//! activation zero point (not zero) and accumulators are plain `a * w`
//! sums. All zero-point algebra happens later, in the offset and
//! requantization stages, which is what makes the correction identity in
//! [`crate::quant::Requantize`] reduce to `sum((a - a_zp) * (w - b_zp))`.

use ndarray::Array2;

use crate::packing::WeightLayout;
use crate::quant::QuantGranularity;
use crate::shape::ConvShape;


/// Unfolds activations into a `[MB*OH*OW, G*KH*KW*IC/G]` matrix where each
/// row is the flattened receptive field of one output position, group-major
/// columns, out-of-bounds taps filled with the activation zero point.
pub fn im2col(shape: &ConvShape, activations: &[u8], a_zero_point: i32) -> Array2<u8> {
    assert_eq!(activations.len(), shape.input_len());

    let (ih, iw, ic) = (shape.ih as isize, shape.iw as isize, shape.ic);
    let ic_per_g = shape.ic_per_group();
    let rf = shape.receptive_field_len();
    let mut out = Array2::zeros((shape.im2col_rows(), shape.im2col_cols()));

    let mut row = 0;
    for n in 0..shape.mb {
        for oh in 0..shape.oh() {
            for ow in 0..shape.ow() {
                for g in 0..shape.g {
                    for r in 0..shape.kh {
                        let h_in = (oh * shape.stride_h + r) as isize - shape.pad_top as isize;
                        for s in 0..shape.kw {
                            let w_in =
                                (ow * shape.stride_w + s) as isize - shape.pad_left as isize;
                            let col = g * rf + (r * shape.kw + s) * ic_per_g;
                            if h_in >= 0 && h_in < ih && w_in >= 0 && w_in < iw {
                                let base = ((n as isize * ih + h_in) * iw + w_in) as usize * ic
                                    + g * ic_per_g;
                                for c in 0..ic_per_g {
                                    out[[row, col + c]] = activations[base + c];
                                }
                            } else {
                                for c in 0..ic_per_g {
                                    out[[row, col + c]] = a_zero_point as u8;
                                }
                            }
                        }
                    }
                }
                row += 1;
            }
        }
    }
    out
}

/// Permutes raw weights between the two logical layouts: per group, a
/// matrix transpose between `(KH*KW*IC/G) x OC/G` (`Standard`) and its
/// transpose (`Transposed`). Shape-preserving and, applied twice with the
/// toggled layout tag, returns the original buffer.
pub fn transpose_weights(shape: &ConvShape, src: &[i8], src_layout: WeightLayout) -> Vec<i8> {
    assert_eq!(src.len(), shape.weight_len());

    let rf = shape.receptive_field_len();
    let oc_per_g = shape.oc_per_group();
    let (rows, cols) = match src_layout {
        WeightLayout::Standard => (rf, oc_per_g),
        WeightLayout::Transposed => (oc_per_g, rf),
    };

    let mut out = vec![0i8; src.len()];
    for g in 0..shape.g {
        let base = g * rf * oc_per_g;
        for i in 0..rows {
            for j in 0..cols {
                out[base + j * rows + i] = src[base + i * cols + j];
            }
        }
    }
    out
}

/// Exact i32 accumulators for the grouped convolution; the oracle every
/// optimized path must match element-for-element.
///
/// `weights` must be in the `Standard` layout `[G, KH, KW, IC/G, OC/G]`.
pub fn conv_ref(
    shape: &ConvShape,
    activations: &[u8],
    a_zero_point: i32,
    weights: &[i8],
) -> Vec<i32> {
    assert_eq!(activations.len(), shape.input_len());
    assert_eq!(weights.len(), shape.weight_len());

    let (ih, iw) = (shape.ih as isize, shape.iw as isize);
    let ic_per_g = shape.ic_per_group();
    let oc_per_g = shape.oc_per_group();
    let mut out = vec![0i32; shape.output_len()];

    for n in 0..shape.mb {
        for oh in 0..shape.oh() {
            for ow in 0..shape.ow() {
                for g in 0..shape.g {
                    for k in 0..oc_per_g {
                        let mut sum = 0i32;
                        for r in 0..shape.kh {
                            let h_in =
                                (oh * shape.stride_h + r) as isize - shape.pad_top as isize;
                            for s in 0..shape.kw {
                                let w_in =
                                    (ow * shape.stride_w + s) as isize - shape.pad_left as isize;
                                let in_bounds =
                                    h_in >= 0 && h_in < ih && w_in >= 0 && w_in < iw;
                                for c in 0..ic_per_g {
                                    let a = if in_bounds {
                                        let idx = ((n as isize * ih + h_in) * iw + w_in) as usize
                                            * shape.ic
                                            + g * ic_per_g
                                            + c;
                                        activations[idx] as i32
                                    } else {
                                        a_zero_point
                                    };
                                    let w = weights[(((g * shape.kh + r) * shape.kw + s)
                                        * ic_per_g
                                        + c)
                                        * oc_per_g
                                        + k] as i32;
                                    sum += a * w;
                                }
                            }
                        }
                        out[((n * shape.oh() + oh) * shape.ow() + ow) * shape.oc
                            + g * oc_per_g
                            + k] = sum;
                    }
                }
            }
        }
    }
    out
}

/// Per-row sums of one group's im2col column block: the activation side of
/// the zero-point correction.
pub fn row_offsets_ref(im2col: &Array2<u8>, shape: &ConvShape, group: usize) -> Vec<i32> {
    let rf = shape.receptive_field_len();
    let block = im2col.slice(ndarray::s![.., group * rf..(group + 1) * rf]);
    block
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|&a| a as i32).sum())
        .collect()
}

/// Reference requantization over the full accumulator matrix, group by
/// group, recomputing row offsets from the im2col matrix. The oracle for
/// [`crate::quant::Requantize`]; deliberately written as the full
/// correction formula with no skip logic, so the optimized stage's
/// symmetric shortcuts are tested against it.
#[allow(clippy::too_many_arguments)]
pub fn requantize_ref(
    shape: &ConvShape,
    acc: &[i32],
    im2col: &Array2<u8>,
    granularity: QuantGranularity,
    multipliers: &[f32],
    out_zero_point: i32,
    a_zero_point: i32,
    b_zero_points: &[i32],
    col_offsets: &[i32],
    bias: Option<&[i32]>,
    fuse_relu: bool,
) -> Vec<u8> {
    assert_eq!(acc.len(), shape.output_len());
    assert_eq!(col_offsets.len(), shape.oc);

    let rows = shape.im2col_rows();
    let oc_per_g = shape.oc_per_group();
    let ncols = granularity.ncols_per_quant_group(shape);
    let mut out = vec![0u8; acc.len()];

    for g in 0..shape.g {
        let row_offsets = row_offsets_ref(im2col, shape, g);
        for m in 0..rows {
            for j in 0..oc_per_g {
                let col = g * oc_per_g + j;
                let q = col / ncols;
                let mut raw = acc[m * shape.oc + col];
                raw -= a_zero_point * col_offsets[col];
                raw -= b_zero_points[q] * row_offsets[m];
                if let Some(bias) = bias {
                    raw += bias[col];
                }
                let rounded = (raw as f32 * multipliers[q]).round() as i32 + out_zero_point;
                let lo = if fuse_relu { out_zero_point.max(0) } else { 0 };
                out[m * shape.oc + col] = rounded.clamp(lo, 255) as u8;
            }
        }
    }
    out
}
