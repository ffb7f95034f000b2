//! Renderer error types

use std::path::PathBuf;

use thiserror::Error;

use crate::dsp::ConvolutionError;

use super::speaker::SpeakerRole;

/// Errors raised while loading filter sets or building a renderer
#[derive(Error, Debug)]
pub enum RenderError {
    /// Block size of zero
    #[error("Invalid block size: {0}")]
    InvalidBlockSize(usize),

    /// Layout has no speakers
    #[error("Input layout is empty")]
    EmptyLayout,

    /// None of the layout's speakers has a channel map entry
    #[error("No speaker of the layout is present in the channel map")]
    NoMappedSpeakers,

    /// Channel map refers to a filter the set does not have
    #[error("Speaker {role} uses filter {index}, but the set only has {available}")]
    FilterIndexOutOfRange {
        role: SpeakerRole,
        index: usize,
        available: usize,
    },

    /// Sample rate conversion failed
    #[error("Failed to resample impulse response: {0}")]
    Resample(String),

    /// Engine construction failed
    #[error("Convolution setup failed for {role}: {source}")]
    Convolution {
        role: SpeakerRole,
        #[source]
        source: ConvolutionError,
    },

    /// Filter set file could not be read
    #[error("Failed to read filter set {path:?}: {message}")]
    Load { path: PathBuf, message: String },

    /// Filter set is internally inconsistent
    #[error("Invalid filter set: {0}")]
    InvalidFilterSet(String),
}

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;
