//! Error types for the convolution subsystem.

use crate::quant::QuantGranularity;
use thiserror::Error;

/// Errors surfaced by packing, offset computation, and the convolution
/// driver.
///
/// Every variant is a precondition failure detected before any output is
/// written; a partially-computed convolution has no meaningful semantics,
/// so nothing here is retried or recovered mid-kernel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvError {
    /// A buffer length disagrees with what the shape descriptor implies.
    #[error("{what}: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Quantization parameter count inconsistent with the requested
    /// granularity.
    #[error("{what}: {granularity:?} granularity needs {expected} entries, got {actual}")]
    InvalidGranularity {
        what: &'static str,
        granularity: QuantGranularity,
        expected: usize,
        actual: usize,
    },

    /// A dispatch or threading request the kernel cannot honor.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(&'static str),
}

/// Result alias for this crate.
pub type ConvResult<T> = Result<T, ConvError>;
