//! Device layer
//!
//! The engine drives an [`AudioIOBridge`](crate::engine::AudioIOBridge)
//! through the [`DeviceBackend`] trait. The default implementation,
//! [`CpalBackend`], opens separate capture and playback streams (which may
//! live on different devices) and joins them with a lock-free FIFO.
//!
//! # Example Usage
//!
//! ```ignore
//! use binaural_core::audio::{AudioConfig, CpalBackend};
//! use binaural_core::engine::{EngineConfig, SpatialEngine};
//!
//! let engine_config = EngineConfig::default();
//! let backend = CpalBackend::new(AudioConfig::default(), engine_config.block_size);
//! let mut engine = SpatialEngine::new(engine_config, Box::new(backend))?;
//! engine.start()?;
//! ```

mod backend;
mod config;
mod error;

#[cfg(feature = "cpal-backend")]
mod cpal_backend;
#[cfg(feature = "cpal-backend")]
mod device;

pub use backend::{DeviceBackend, DeviceFormat};
pub use config::{AudioConfig, DeviceId, DEFAULT_FIFO_BLOCKS, DEFAULT_SAMPLE_RATE};
pub use error::{AudioError, AudioResult};

#[cfg(feature = "cpal-backend")]
pub use cpal_backend::CpalBackend;
#[cfg(feature = "cpal-backend")]
pub use device::{find_device, list_devices, negotiate_config, Direction};
