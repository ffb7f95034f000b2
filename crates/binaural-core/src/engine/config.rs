//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::types::{DEFAULT_BLOCK_SIZE, MAX_BUFFER_SIZE};

/// Default number of unread renderer snapshots allowed in flight
pub const DEFAULT_PUBLISH_QUEUE_DEPTH: usize = 4;

/// Signal-path settings shared by the renderer and the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Convolution block size in frames (also the added latency)
    pub block_size: usize,
    /// Largest callback the bridge accepts when the device does not say
    pub max_frames: usize,
    /// Renderer snapshot queue depth
    pub publish_queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_frames: MAX_BUFFER_SIZE,
            publish_queue_depth: DEFAULT_PUBLISH_QUEUE_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Check the settings can drive a stream
    pub fn validate(&self) -> Result<(), String> {
        if self.block_size == 0 {
            return Err("block_size must be greater than zero".into());
        }
        if self.max_frames < self.block_size {
            return Err(format!(
                "max_frames ({}) is smaller than block_size ({})",
                self.max_frames, self.block_size
            ));
        }
        if self.publish_queue_depth == 0 {
            return Err("publish_queue_depth must be greater than zero".into());
        }
        Ok(())
    }
}
