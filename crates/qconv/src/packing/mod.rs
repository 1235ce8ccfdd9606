//! Packed weight storage for the direct groupwise kernel.

use log::debug;

use crate::error::{ConvError, ConvResult};
use crate::shape::ConvShape;


/// Memory order of a raw weight buffer.
///
/// `Standard` is `[G, KH, KW, IC/G, OC/G]`; `Transposed` is
/// `[G, OC/G, KH, KW, IC/G]`. Both encode the same mathematical weights.
/// The tag travels beside the buffer; a buffer cannot self-report its
/// layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightLayout {
    Standard,
    Transposed,
}

#[derive(Debug)]
enum PackedBuf<'a> {
    Owned(Vec<i8>),
    Workspace(&'a mut [i8]),
}

impl PackedBuf<'_> {
    fn as_slice(&self) -> &[i8] {
        match self {
            PackedBuf::Owned(v) => v,
            PackedBuf::Workspace(s) => s,
        }
    }
}

/// Weights reordered into the direct kernel's walk order.
///
/// Packed order is `[KH, KW, OC/G, G, IC/G]`: for a fixed kernel tap and
/// output channel, the per-group input-channel runs the inner loops read
/// are contiguous. Built once by [`pack`](Self::pack) or
/// [`pack_into`](Self::pack_into), read-only afterwards; the kernel only
/// ever consumes it. The physical layout is private; downstream code goes
/// through [`unpack`](Self::unpack) when it needs raw-layout access (e.g.
/// for column offsets).
#[derive(Debug)]
pub struct PackedWeightMatrix<'a> {
    shape: ConvShape,
    src_layout: WeightLayout,
    buf: PackedBuf<'a>,
}

impl PackedWeightMatrix<'static> {
    /// Packs raw weights into freshly-owned storage.
    ///
    /// Deterministic for a given (shape, layout, weights) triple; fails
    /// with `ShapeMismatch` when the raw buffer length is not
    /// `KH*KW*G*IC/G*OC/G`.
    pub fn pack(
        src_layout: WeightLayout,
        shape: &ConvShape,
        weights: &[i8],
    ) -> ConvResult<Self> {
        let mut buf = vec![0i8; shape.weight_len()];
        pack_into_buf(src_layout, shape, weights, &mut buf)?;
        Ok(Self { shape: *shape, src_layout, buf: PackedBuf::Owned(buf) })
    }
}

impl<'a> PackedWeightMatrix<'a> {
    /// Packs raw weights into a caller-provided workspace. The workspace
    /// stays owned by the caller; only its first `weight_len` elements are
    /// used.
    pub fn pack_into(
        src_layout: WeightLayout,
        shape: &ConvShape,
        weights: &[i8],
        workspace: &'a mut [i8],
    ) -> ConvResult<Self> {
        let needed = shape.weight_len();
        if workspace.len() < needed {
            return Err(ConvError::ShapeMismatch {
                what: "packing workspace",
                expected: needed,
                actual: workspace.len(),
            });
        }
        let buf = &mut workspace[..needed];
        pack_into_buf(src_layout, shape, weights, &mut buf[..])?;
        Ok(Self { shape: *shape, src_layout, buf: PackedBuf::Workspace(buf) })
    }

    /// The descriptor this matrix was packed for.
    pub fn shape(&self) -> &ConvShape {
        &self.shape
    }

    /// The raw layout the source buffer was in.
    pub fn src_layout(&self) -> WeightLayout {
        self.src_layout
    }

    /// Reconstructs the raw weights in `Standard` layout
    /// (`[G, KH, KW, IC/G, OC/G]`), regardless of the layout they were
    /// packed from. Keeps offset computation index-compatible with raw
    /// weight buffers.
    pub fn unpack(&self) -> Vec<i8> {
        let shape = &self.shape;
        let (ic_per_g, oc_per_g) = (shape.ic_per_group(), shape.oc_per_group());
        let packed = self.buf.as_slice();
        let mut out = vec![0i8; shape.weight_len()];

        for r in 0..shape.kh {
            for s in 0..shape.kw {
                for k in 0..oc_per_g {
                    for g in 0..shape.g {
                        let src = (((r * shape.kw + s) * oc_per_g + k) * shape.g + g) * ic_per_g;
                        for c in 0..ic_per_g {
                            out[(((g * shape.kh + r) * shape.kw + s) * ic_per_g + c) * oc_per_g
                                + k] = packed[src + c];
                        }
                    }
                }
            }
        }
        out
    }

    pub(crate) fn as_slice(&self) -> &[i8] {
        self.buf.as_slice()
    }
}

fn pack_into_buf(
    src_layout: WeightLayout,
    shape: &ConvShape,
    src: &[i8],
    dst: &mut [i8],
) -> ConvResult<()> {
    if src.len() != shape.weight_len() {
        return Err(ConvError::ShapeMismatch {
            what: "raw weights",
            expected: shape.weight_len(),
            actual: src.len(),
        });
    }

    let (kh, kw, g) = (shape.kh, shape.kw, shape.g);
    let (ic_per_g, oc_per_g) = (shape.ic_per_group(), shape.oc_per_group());

    for r in 0..kh {
        for s in 0..kw {
            for k in 0..oc_per_g {
                for gi in 0..g {
                    let dst_base = (((r * kw + s) * oc_per_g + k) * g + gi) * ic_per_g;
                    for c in 0..ic_per_g {
                        let v = match src_layout {
                            WeightLayout::Standard => {
                                src[(((gi * kh + r) * kw + s) * ic_per_g + c) * oc_per_g + k]
                            }
                            WeightLayout::Transposed => {
                                src[(((gi * oc_per_g + k) * kh + r) * kw + s) * ic_per_g + c]
                            }
                        };
                        dst[dst_base + c] = v;
                    }
                }
            }
        }
    }
    debug!("packed weights ({:?} source) for {}", src_layout, shape);
    Ok(())
}
