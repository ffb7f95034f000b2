//! Engine error types

use thiserror::Error;

use super::controller::EngineState;
use crate::audio::AudioError;
use crate::render::RenderError;

/// Snapshot queue has no room; the reader is not draining it
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Snapshot queue is full")]
pub struct SnapshotFull;

/// Errors from the channel router
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// Requested window does not fit the output device, or is not stereo
    #[error("Invalid channel range: start={start} count={count} (device has {total} outputs)")]
    InvalidChannelRange {
        start: usize,
        count: usize,
        total: usize,
    },
}

/// Errors reported back to the caller of `activate`
#[derive(Error, Debug)]
pub enum ActivationError {
    /// Renderer could not be built; the previous one stays active
    #[error("Failed to build renderer: {0}")]
    Build(#[from] RenderError),

    /// The running stream has not consumed earlier snapshots
    #[error("Renderer snapshot queue is full")]
    QueueFull,

    /// Activator thread is gone
    #[error("Preset activator is not running")]
    ActivatorGone,
}

/// Errors from the engine control surface
#[derive(Error, Debug)]
pub enum EngineError {
    /// Operation not allowed in the current state
    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },

    /// Engine configuration is unusable
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Device layer failure
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Channel routing failure
    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Result type for router operations
pub type RouterResult<T> = Result<T, RouterError>;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
