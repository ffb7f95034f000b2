//! Audio device error types

use thiserror::Error;

/// Errors that can occur while opening or running device streams
#[derive(Error, Debug)]
pub enum AudioError {
    /// No default device in the requested direction
    #[error("No default {0} device")]
    NoDefaultDevice(&'static str),

    /// Named device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to query device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build a stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start a stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Device offers no usable sample format
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Capture and playback devices cannot agree on a rate
    #[error("Sample rate mismatch: input={input}Hz, output={output}Hz")]
    SampleRateMismatch { input: u32, output: u32 },

    /// Stream is already running
    #[error("Audio stream already running")]
    AlreadyRunning,
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
