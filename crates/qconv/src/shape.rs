//! Convolution shape descriptor and work partitioning.

use std::fmt;
use std::ops::Range;

/// Dimensions of a grouped 2D convolution, plus the derived output size.
///
/// Layouts are channel-last throughout: activations are `[MB, IH, IW, IC]`,
/// outputs `[MB, OH, OW, OC]`. Constructed once per configuration and
/// shared read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvShape {
    /// Batch size.
    pub mb: usize,
    /// Input channels (across all groups).
    pub ic: usize,
    /// Output channels (across all groups).
    pub oc: usize,
    /// Input height.
    pub ih: usize,
    /// Input width.
    pub iw: usize,
    /// Group count. `ic` and `oc` must both divide evenly by this.
    pub g: usize,
    /// Kernel height.
    pub kh: usize,
    /// Kernel width.
    pub kw: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_top: usize,
    pub pad_left: usize,
    pub pad_bottom: usize,
    pub pad_right: usize,
    oh: usize,
    ow: usize,
}

impl ConvShape {
    /// Builds a shape descriptor and derives the output spatial dims.
    ///
    /// Argument grouping mirrors the conventional parameter order:
    /// `(MB, IC, OC, [IH, IW], G, [KH, KW], [stride_h, stride_w],
    /// [pad_top, pad_left, pad_bottom, pad_right])`.
    ///
    /// Panics if the channel counts are not divisible by the group count or
    /// a stride is zero; validation beyond that is the config layer's job.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mb: usize,
        ic: usize,
        oc: usize,
        in_dim: [usize; 2],
        g: usize,
        k_dim: [usize; 2],
        stride: [usize; 2],
        pad: [usize; 4],
    ) -> Self {
        assert!(g > 0 && ic % g == 0, "IC ({ic}) must divide evenly by G ({g})");
        assert!(oc % g == 0, "OC ({oc}) must divide evenly by G ({g})");
        assert!(stride[0] > 0 && stride[1] > 0, "strides must be nonzero");

        let [ih, iw] = in_dim;
        let [kh, kw] = k_dim;
        let [pad_top, pad_left, pad_bottom, pad_right] = pad;
        let oh = (ih + pad_top + pad_bottom - kh) / stride[0] + 1;
        let ow = (iw + pad_left + pad_right - kw) / stride[1] + 1;

        Self {
            mb,
            ic,
            oc,
            ih,
            iw,
            g,
            kh,
            kw,
            stride_h: stride[0],
            stride_w: stride[1],
            pad_top,
            pad_left,
            pad_bottom,
            pad_right,
            oh,
            ow,
        }
    }

    /// Output height.
    pub fn oh(&self) -> usize {
        self.oh
    }

    /// Output width.
    pub fn ow(&self) -> usize {
        self.ow
    }

    pub fn ic_per_group(&self) -> usize {
        self.ic / self.g
    }

    pub fn oc_per_group(&self) -> usize {
        self.oc / self.g
    }

    /// Taps contributing to one output value: `KH * KW * IC/G`.
    pub fn receptive_field_len(&self) -> usize {
        self.kh * self.kw * self.ic_per_group()
    }

    /// Activation buffer length: `MB * IH * IW * IC`.
    pub fn input_len(&self) -> usize {
        self.mb * self.ih * self.iw * self.ic
    }

    /// Output / accumulator buffer length: `MB * OH * OW * OC`.
    pub fn output_len(&self) -> usize {
        self.mb * self.oh * self.ow * self.oc
    }

    /// Raw and packed weight buffer length: `KH * KW * G * IC/G * OC/G`.
    pub fn weight_len(&self) -> usize {
        self.kh * self.kw * self.g * self.ic_per_group() * self.oc_per_group()
    }

    /// Rows of the im2col matrix, one per output position: `MB * OH * OW`.
    pub fn im2col_rows(&self) -> usize {
        self.mb * self.oh * self.ow
    }

    /// Columns of the im2col matrix: `G * KH * KW * IC/G`, group-major.
    pub fn im2col_cols(&self) -> usize {
        self.g * self.receptive_field_len()
    }

    /// Required length of the row-offset scratch buffer.
    pub fn row_offsets_len(&self) -> usize {
        self.mb * self.oh * self.ow
    }
}

impl fmt::Display for ConvShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MB:{} IC:{} OC:{} IN:{}x{} G:{} K:{}x{} stride:{}x{} pad:[{} {} {} {}]",
            self.mb,
            self.ic,
            self.oc,
            self.ih,
            self.iw,
            self.g,
            self.kh,
            self.kw,
            self.stride_h,
            self.stride_w,
            self.pad_top,
            self.pad_left,
            self.pad_bottom,
            self.pad_right,
        )
    }
}

/// Contiguous 1-D partition of `total` items for worker `thread_id` of
/// `num_threads`.
///
/// Every item lands in exactly one range; when `total < num_threads` the
/// trailing workers receive empty ranges and simply do no work.
pub fn partition_1d(total: usize, thread_id: usize, num_threads: usize) -> Range<usize> {
    debug_assert!(thread_id < num_threads);
    let per_thread = (total + num_threads - 1) / num_threads;
    let start = (thread_id * per_thread).min(total);
    let end = (start + per_thread).min(total);
    start..end
}
