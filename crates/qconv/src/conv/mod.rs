//! Public driver for the quantized groupwise convolution.

use log::debug;
use rayon::prelude::*;

use crate::error::{ConvError, ConvResult};
use crate::kernels;
use crate::packing::PackedWeightMatrix;
use crate::quant::{OutputProcessor, TileBlock};
use crate::shape::{partition_1d, ConvShape};


/// Runs the grouped convolution: one i32 accumulator per
/// `(batch, oh, ow, output channel)`, each group's tile handed to the
/// output processor as soon as it is produced.
///
/// Buffers, all caller-allocated:
/// - `activations`: `[MB, IH, IW, IC]`, length [`ConvShape::input_len`];
/// - `row_offsets`: scratch of length [`ConvShape::row_offsets_len`],
///   required exactly when the processor corrects for weight zero points
///   (pass `None` on the symmetric path and it is never touched);
/// - `out` and `acc`: `[MB, OH, OW, OC]`, length
///   [`ConvShape::output_len`]; `acc` is scratch, `out` receives the
///   processed result.
///
/// Work is partitioned over the flattened `(batch, output-row)` space into
/// `num_threads` contiguous blocks; each worker owns disjoint chunks of
/// `out`, `acc`, and the row-offset scratch, so no synchronization happens
/// during accumulation and the result is invariant to `num_threads`.
/// Threads beyond the number of row blocks do no work.
///
/// All errors are detected before any output is written.
#[allow(clippy::too_many_arguments)]
pub fn groupwise_conv<P: OutputProcessor>(
    shape: &ConvShape,
    activations: &[u8],
    a_zero_point: i32,
    row_offsets: Option<&mut [i32]>,
    packed: &PackedWeightMatrix<'_>,
    out: &mut [P::Out],
    acc: &mut [i32],
    processor: &P,
    num_threads: usize,
) -> ConvResult<()> {
    if num_threads == 0 {
        return Err(ConvError::UnsupportedConfiguration(
            "thread count must be at least 1",
        ));
    }
    if packed.shape() != shape {
        return Err(ConvError::UnsupportedConfiguration(
            "packed weight matrix was built for a different shape",
        ));
    }
    check_len("activations", activations.len(), shape.input_len())?;
    check_len("output buffer", out.len(), shape.output_len())?;
    check_len("accumulator buffer", acc.len(), shape.output_len())?;
    processor.check(shape)?;

    let needs_row_offsets = processor.requires_row_offsets();
    let row_offsets = match row_offsets {
        Some(buf) => {
            check_len("row-offset scratch", buf.len(), shape.row_offsets_len())?;
            Some(buf)
        }
        None if needs_row_offsets => {
            return Err(ConvError::ShapeMismatch {
                what: "row-offset scratch",
                expected: shape.row_offsets_len(),
                actual: 0,
            });
        }
        None => None,
    };

    let total_rows = shape.mb * shape.oh();
    let rows_per_thread = (total_rows + num_threads - 1) / num_threads;
    let chunk = rows_per_thread * shape.ow() * shape.oc;
    let ro_chunk = rows_per_thread * shape.ow();
    debug!(
        "groupwise conv {shape}: {num_threads} thread(s), {} kernel, offsets {}",
        if kernels::has_specialized_kernel(shape) { "3x3s1" } else { "generic" },
        if needs_row_offsets { "on" } else { "off" },
    );

    let out_chunks: Vec<&mut [P::Out]> = out.chunks_mut(chunk).collect();
    let acc_chunks: Vec<&mut [i32]> = acc.chunks_mut(chunk).collect();
    let ro_chunks: Vec<Option<&mut [i32]>> = match row_offsets {
        Some(buf) => buf.chunks_mut(ro_chunk).map(Some).collect(),
        None => (0..out_chunks.len()).map(|_| None).collect(),
    };

    out_chunks
        .into_par_iter()
        .zip(acc_chunks)
        .zip(ro_chunks)
        .enumerate()
        .try_for_each(|(tid, ((out_chunk, acc_chunk), ro_chunk))| {
            let rows = partition_1d(total_rows, tid, num_threads);
            conv_rows(
                shape,
                activations,
                a_zero_point,
                packed,
                rows,
                out_chunk,
                acc_chunk,
                ro_chunk,
                processor,
            )
        })
}

/// One worker's share: accumulate each group over `rows`, fill that
/// group's row offsets if the processor wants them, process the tile.
#[allow(clippy::too_many_arguments)]
fn conv_rows<P: OutputProcessor>(
    shape: &ConvShape,
    activations: &[u8],
    a_zero_point: i32,
    packed: &PackedWeightMatrix<'_>,
    rows: std::ops::Range<usize>,
    out: &mut [P::Out],
    acc: &mut [i32],
    mut row_offsets: Option<&mut [i32]>,
    processor: &P,
) -> ConvResult<()> {
    let positions = rows.len() * shape.ow();
    let oc_per_g = shape.oc_per_group();
    debug_assert_eq!(acc.len(), positions * shape.oc);

    for g in 0..shape.g {
        kernels::accumulate_rows(
            shape,
            activations,
            a_zero_point,
            packed.as_slice(),
            g,
            rows.clone(),
            acc,
        );
        let block = TileBlock {
            row_start: rows.start * shape.ow(),
            rows: positions,
            col_start: g * oc_per_g,
            cols: oc_per_g,
            ld: shape.oc,
        };
        match row_offsets.as_deref_mut() {
            Some(buf) if processor.requires_row_offsets() => {
                kernels::row_offsets_rows(shape, activations, a_zero_point, g, rows.clone(), buf);
                processor.process(out, acc, &block, Some(&buf[..]))?;
            }
            _ => processor.process(out, acc, &block, None)?,
        }
    }
    Ok(())
}

fn check_len(what: &'static str, actual: usize, expected: usize) -> ConvResult<()> {
    if actual != expected {
        return Err(ConvError::ShapeMismatch { what, expected, actual });
    }
    Ok(())
}
