//! Convolution error types

use thiserror::Error;

/// Errors raised while building or running a [`super::ConvolutionEngine`]
///
/// The variants returned from `process` carry no heap data so they can be
/// produced on the audio thread.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvolutionError {
    /// Impulse response has no samples
    #[error("Impulse response is empty")]
    EmptyFilter,

    /// Block size of zero
    #[error("Invalid block size: {0}")]
    InvalidBlockSize(usize),

    /// Impulse response contains NaN or infinite coefficients
    #[error("Impulse response has a non-finite coefficient at index {0}")]
    NonFiniteFilter(usize),

    /// Could not reserve memory for partitions or delay line
    #[error("Failed to allocate {0} spectrum bins")]
    Allocation(usize),

    /// Input or output block does not match the configured block size
    #[error("Block size mismatch")]
    BlockSizeMismatch,

    /// Forward or inverse transform rejected its buffers
    #[error("Transform failed")]
    TransformFailed,
}

/// Result type for convolution operations
pub type ConvolutionResult<T> = Result<T, ConvolutionError>;
