//! Column offsets for zero-point correction.
//!
//! A pure function of the weights and the chosen granularity, computed
//! once per packed weight set. The matching per-row activation sums are
//! produced lazily inside the kernel (see [`crate::kernels`]) because they
//! depend on the activations of each invocation.

use crate::error::{ConvError, ConvResult};
use crate::quant::QuantGranularity;
use crate::shape::ConvShape;

/// Per-output-column weight sums, one entry per output channel
/// (`G * OC/G` total), with the weight zero-point correction folded in.
///
/// `weights` must be in the `Standard` layout `[G, KH, KW, IC/G, OC/G]`
/// (unpack a [`crate::packing::PackedWeightMatrix`] to get there).
/// `b_zero_points` is `None` for symmetric weights, in which case the
/// correction term is skipped and the offsets are plain sums:
///
/// ```text
/// col_offsets[g*OC/G + k] = sum of weights feeding column k of group g
///                           - receptive_field_len * b_zp[q(k)]
/// ```
pub fn column_offsets(
    shape: &ConvShape,
    weights: &[i8],
    b_zero_points: Option<&[i32]>,
    granularity: QuantGranularity,
) -> ConvResult<Vec<i32>> {
    if weights.len() != shape.weight_len() {
        return Err(ConvError::ShapeMismatch {
            what: "raw weights",
            expected: shape.weight_len(),
            actual: weights.len(),
        });
    }
    let ncols = granularity.ncols_per_quant_group(shape);
    if let Some(zps) = b_zero_points {
        let expected = granularity.num_quant_groups(shape);
        if zps.len() != expected {
            return Err(ConvError::InvalidGranularity {
                what: "weight zero points",
                granularity,
                expected,
                actual: zps.len(),
            });
        }
    }

    let rf = shape.receptive_field_len();
    let oc_per_g = shape.oc_per_group();
    let mut offsets = vec![0i32; shape.oc];

    for g in 0..shape.g {
        let group_weights = &weights[g * rf * oc_per_g..(g + 1) * rf * oc_per_g];
        for k in 0..oc_per_g {
            let mut sum = 0i32;
            for t in 0..rf {
                sum += group_weights[t * oc_per_g + k] as i32;
            }
            let col = g * oc_per_g + k;
            if let Some(zps) = b_zero_points {
                sum -= zps[col / ncols] * rf as i32;
            }
            offsets[col] = sum;
        }
    }
    Ok(offsets)
}
