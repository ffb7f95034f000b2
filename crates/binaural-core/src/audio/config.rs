//! Audio device configuration

use serde::{Deserialize, Serialize};

/// Preferred sample rate when none is configured
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default capacity of the capture → playback FIFO, in blocks
pub const DEFAULT_FIFO_BLOCKS: usize = 4;

/// Audio device identifier
///
/// Name plus an optional host backend (e.g. "ALSA", "JACK", "CoreAudio"),
/// since the same name may appear under several hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: Some(host.into()),
        }
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.host {
            Some(host) => write!(f, "[{}] {}", host, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Device selection for the capture and playback streams
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture device (None = system default input)
    pub input_device: Option<DeviceId>,
    /// Playback device (None = system default output)
    pub output_device: Option<DeviceId>,
    /// Preferred sample rate (None = 48kHz if supported)
    pub sample_rate: Option<u32>,
    /// FIFO capacity between the two streams, in convolution blocks
    pub fifo_blocks: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            sample_rate: None,
            fifo_blocks: DEFAULT_FIFO_BLOCKS,
        }
    }
}

impl AudioConfig {
    pub fn with_input_device(mut self, device: DeviceId) -> Self {
        self.input_device = Some(device);
        self
    }

    pub fn with_output_device(mut self, device: DeviceId) -> Self {
        self.output_device = Some(device);
        self
    }

    /// Sample rate to ask the devices for
    pub fn target_sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }
}
