//! Quantization granularities and the output processing stages applied to
//! raw accumulator tiles.

use crate::error::{ConvError, ConvResult};
use crate::shape::ConvShape;

/// How many requantization parameter sets one convolution carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantGranularity {
    /// One multiplier / weight zero point for the whole tensor.
    Tensor,
    /// One per convolution group.
    Group,
    /// One per output channel.
    OutChannel,
}

impl QuantGranularity {
    /// Number of adjacent output columns sharing one multiplier and weight
    /// zero point. The offset engine and the requantization stage must
    /// both index through this divisor or outputs come out wrong.
    pub fn ncols_per_quant_group(&self, shape: &ConvShape) -> usize {
        match self {
            QuantGranularity::Tensor => shape.oc,
            QuantGranularity::Group => shape.oc_per_group(),
            QuantGranularity::OutChannel => 1,
        }
    }

    /// Expected length of the multiplier and weight zero-point arrays.
    pub fn num_quant_groups(&self, shape: &ConvShape) -> usize {
        shape.oc / self.ncols_per_quant_group(shape)
    }
}

/// Coordinates of one accumulator tile handed to an output processor.
///
/// Rows index the flattened `(batch, oh, ow)` output space local to the
/// buffers passed along with the block; columns are global output
/// channels. `ld` is the row stride of both buffers (always `OC`).
#[derive(Debug, Clone, Copy)]
pub struct TileBlock {
    /// First output position of the tile, in global (whole-output) terms.
    pub row_start: usize,
    /// Number of output positions covered.
    pub rows: usize,
    /// First output channel of the tile.
    pub col_start: usize,
    /// Number of output channels covered.
    pub cols: usize,
    /// Row stride of the accumulator and output buffers.
    pub ld: usize,
}

/// One stage of the output pipeline: consume a tile of i32 accumulators,
/// produce final output.
///
/// The kernel calls [`process`](Self::process) once per (row-block, group)
/// tile, immediately after that tile's accumulators are produced. `out`
/// and `acc` cover the same rows with stride `block.ld`; `row_offsets`,
/// when present, holds one per-row activation sum for each of the tile's
/// rows, computed against the tile's group.
pub trait OutputProcessor: Sync {
    type Out: Copy + Send;

    fn process(
        &self,
        out: &mut [Self::Out],
        acc: &[i32],
        block: &TileBlock,
        row_offsets: Option<&[i32]>,
    ) -> ConvResult<()>;

    /// Whether tiles must arrive with per-row activation sums.
    fn requires_row_offsets(&self) -> bool {
        false
    }

    /// Entry-time validation against the shape the kernel will run.
    fn check(&self, _shape: &ConvShape) -> ConvResult<()> {
        Ok(())
    }
}

/// Pass-through stage: copies raw i32 accumulators to the output buffer
/// unchanged, for callers that quantize downstream themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl OutputProcessor for PassThrough {
    type Out = i32;

    fn process(
        &self,
        out: &mut [i32],
        acc: &[i32],
        block: &TileBlock,
        _row_offsets: Option<&[i32]>,
    ) -> ConvResult<()> {
        for i in 0..block.rows {
            let base = i * block.ld + block.col_start;
            out[base..base + block.cols].copy_from_slice(&acc[base..base + block.cols]);
        }
        Ok(())
    }
}

/// Requantization stage: maps i32 accumulators back to u8, correcting for
/// activation and weight zero points via precomputed column and row
/// offsets.
///
/// For output column `j` with quantization group `q = j / ncols`:
///
/// ```text
/// raw = acc - a_zp * col_offsets[j] - b_zp[q] * row_offset[m] (+ bias[j])
/// out = clamp(round(raw * multiplier[q]) + out_zp, lo, 255)
/// ```
///
/// where each subtraction is skipped when its zero point is zero (the
/// all-symmetric path does no correction arithmetic at all), and `lo` is
/// `out_zp` under fused ReLU, else 0. Rounding is
/// round-half-away-from-zero (`f32::round`).
#[derive(Debug)]
pub struct Requantize<'a> {
    granularity: QuantGranularity,
    multipliers: &'a [f32],
    out_zero_point: i32,
    a_zero_point: i32,
    b_zero_points: &'a [i32],
    col_offsets: Option<&'a [i32]>,
    bias: Option<&'a [i32]>,
    fuse_relu: bool,
    ncols_per_quant_group: usize,
    oc: usize,
}

impl<'a> Requantize<'a> {
    /// Builds a requantization stage, validating every parameter count
    /// against `shape` and `granularity` up front.
    ///
    /// `col_offsets` may only be omitted when the activation zero point is
    /// zero (the term it feeds vanishes); `b_zero_points` must have one
    /// entry per quantization group, zeros meaning symmetric weights.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shape: &ConvShape,
        granularity: QuantGranularity,
        multipliers: &'a [f32],
        out_zero_point: i32,
        a_zero_point: i32,
        b_zero_points: &'a [i32],
        col_offsets: Option<&'a [i32]>,
        bias: Option<&'a [i32]>,
    ) -> ConvResult<Self> {
        let quant_groups = granularity.num_quant_groups(shape);
        if b_zero_points.len() != quant_groups {
            return Err(ConvError::InvalidGranularity {
                what: "weight zero points",
                granularity,
                expected: quant_groups,
                actual: b_zero_points.len(),
            });
        }
        if multipliers.len() != quant_groups {
            return Err(ConvError::InvalidGranularity {
                what: "requantization multipliers",
                granularity,
                expected: quant_groups,
                actual: multipliers.len(),
            });
        }
        match col_offsets {
            Some(co) if co.len() != shape.oc => {
                return Err(ConvError::ShapeMismatch {
                    what: "column offsets",
                    expected: shape.oc,
                    actual: co.len(),
                });
            }
            None if a_zero_point != 0 => {
                return Err(ConvError::ShapeMismatch {
                    what: "column offsets (required for nonzero activation zero point)",
                    expected: shape.oc,
                    actual: 0,
                });
            }
            _ => {}
        }
        if let Some(b) = bias {
            if b.len() != shape.oc {
                return Err(ConvError::ShapeMismatch {
                    what: "bias",
                    expected: shape.oc,
                    actual: b.len(),
                });
            }
        }

        Ok(Self {
            granularity,
            multipliers,
            out_zero_point,
            a_zero_point,
            b_zero_points,
            col_offsets,
            bias,
            fuse_relu: false,
            ncols_per_quant_group: granularity.ncols_per_quant_group(shape),
            oc: shape.oc,
        })
    }

    /// Clamp the low end at the output zero point instead of 0, fusing a
    /// ReLU into the requantization.
    pub fn with_relu(mut self) -> Self {
        self.fuse_relu = true;
        self
    }

    pub fn granularity(&self) -> QuantGranularity {
        self.granularity
    }
}

impl OutputProcessor for Requantize<'_> {
    type Out = u8;

    fn process(
        &self,
        out: &mut [u8],
        acc: &[i32],
        block: &TileBlock,
        row_offsets: Option<&[i32]>,
    ) -> ConvResult<()> {
        if self.requires_row_offsets() && row_offsets.is_none() {
            return Err(ConvError::ShapeMismatch {
                what: "row offsets",
                expected: block.rows,
                actual: 0,
            });
        }
        let lo = if self.fuse_relu { self.out_zero_point.max(0) } else { 0 };

        for i in 0..block.rows {
            let base = i * block.ld + block.col_start;
            for j in 0..block.cols {
                let col = block.col_start + j;
                let q = col / self.ncols_per_quant_group;

                let mut raw = acc[base + j];
                if self.a_zero_point != 0 {
                    if let Some(co) = self.col_offsets {
                        raw -= self.a_zero_point * co[col];
                    }
                }
                let b_zp = self.b_zero_points[q];
                if b_zp != 0 {
                    if let Some(ro) = row_offsets {
                        raw -= b_zp * ro[i];
                    }
                }
                if let Some(bias) = self.bias {
                    raw += bias[col];
                }

                let scaled = raw as f32 * self.multipliers[q];
                let rounded = scaled.round() as i32 + self.out_zero_point;
                out[base + j] = rounded.clamp(lo, 255) as u8;
            }
        }
        Ok(())
    }

    fn requires_row_offsets(&self) -> bool {
        self.b_zero_points.iter().any(|&zp| zp != 0)
    }

    fn check(&self, shape: &ConvShape) -> ConvResult<()> {
        // parameters were validated against the construction shape; make
        // sure the kernel is not being run against a different one
        if shape.oc != self.oc
            || self.granularity.ncols_per_quant_group(shape) != self.ncols_per_quant_group
        {
            return Err(ConvError::InvalidGranularity {
                what: "requantization parameters",
                granularity: self.granularity,
                expected: self.granularity.num_quant_groups(shape),
                actual: self.multipliers.len(),
            });
        }
        Ok(())
    }
}
