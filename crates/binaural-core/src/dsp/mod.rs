//! Frequency-domain DSP
//!
//! - [`TransformCache`]: process-wide cache of real FFT plans keyed by size
//! - [`ConvolutionEngine`]: uniformly partitioned overlap-save convolver

mod convolver;
mod error;
mod plan_cache;

pub use convolver::{direct_convolve, ConvolutionEngine};
pub use error::{ConvolutionError, ConvolutionResult};
pub use plan_cache::{TransformCache, TransformPlan};
