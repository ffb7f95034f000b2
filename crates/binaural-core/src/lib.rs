//! Binaural Core - real-time HRIR spatialization
//!
//! Convolves N live input channels against head-related impulse responses
//! and renders a stereo mix into a selectable channel pair of an output device.
//!
//! - [`dsp`]: partitioned overlap-save convolution and the shared FFT plan cache
//! - [`render`]: virtual speakers, filter sets and the multi-speaker renderer
//! - [`engine`]: lock-free snapshot publishing, routing, the audio I/O bridge
//!   and the control surface ([`engine::SpatialEngine`])
//! - [`audio`]: device layer (cpal backend behind the `cpal-backend` feature)
//! - [`config`]: YAML configuration helpers

pub mod audio;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod render;
pub mod types;

pub use types::*;
