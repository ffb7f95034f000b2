//! Device backend trait
//!
//! The engine never talks to a sound API directly. A backend reports the
//! negotiated format, then takes ownership of an [`AudioIOBridge`] and drives
//! it from its callbacks until stopped. Dropping the bridge (on stop) is what
//! releases the renderer the stream was using.

use crate::engine::AudioIOBridge;

use super::error::AudioResult;

/// Negotiated stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    pub sample_rate: u32,
    pub input_channels: usize,
    pub output_channels: usize,
    /// Largest callback the backend will hand to the bridge, if it knows
    pub max_frames: Option<usize>,
}

/// A source of device callbacks
pub trait DeviceBackend {
    /// Format the next `start` will run with
    fn format(&self) -> AudioResult<DeviceFormat>;

    /// Open the streams and start calling into `bridge`
    fn start(&mut self, bridge: AudioIOBridge) -> AudioResult<()>;

    /// Stop the streams; returns once no callback is in flight
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}
