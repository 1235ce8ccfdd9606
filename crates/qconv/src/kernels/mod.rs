//! Micro-kernels for the direct groupwise convolution.
//!
//! [`accumulate_rows`] is the dispatch seam: shape-keyed selection between
//! the specialized 3x3/stride-1 variant and the generic fallback. Both are
//! scalar here; an architecture-specific backend (SIMD or generated code)
//! slots in behind the same seam without touching the driver's contract.
//! Correctness never depends on a shape hitting the fast path.

pub(crate) mod scalar;

use std::ops::Range;

use crate::shape::ConvShape;

pub(crate) use scalar::row_offsets_rows;

/// Whether `shape` is served by a specialized micro-kernel rather than the
/// generic fallback.
pub fn has_specialized_kernel(shape: &ConvShape) -> bool {
    shape.kh == 3
        && shape.kw == 3
        && shape.stride_h == 1
        && shape.stride_w == 1
        && shape.pad_top == 1
        && shape.pad_left == 1
        && shape.pad_bottom == 1
        && shape.pad_right == 1
}

/// Accumulates one group's output channels for the `(batch, output-row)`
/// range `rows`, writing into `acc` (indexed local to the range, row
/// stride `OC`).
pub(crate) fn accumulate_rows(
    shape: &ConvShape,
    activations: &[u8],
    a_zero_point: i32,
    packed: &[i8],
    group: usize,
    rows: Range<usize>,
    acc: &mut [i32],
) {
    if has_specialized_kernel(shape) {
        scalar::conv_rows_3x3s1(shape, activations, a_zero_point, packed, group, rows, acc);
    } else {
        scalar::conv_rows_generic(shape, activations, a_zero_point, packed, group, rows, acc);
    }
}
