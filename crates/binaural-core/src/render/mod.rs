//! Virtual-speaker rendering
//!
//! Turns N input channels into a binaural stereo pair:
//!
//! - [`speaker`]: speaker roles, input layouts and the role → ear-filter map
//! - [`FilterSet`] / [`FilterSetLoader`]: HRIR banks (WAV loader included)
//! - [`Resampler`]: converts HRIRs to the device rate
//! - [`RendererState`]: per-speaker engine pairs plus the stereo mixdown

mod error;
mod filter_set;
mod resample;
pub mod speaker;
mod state;

pub use error::{RenderError, RenderResult};
pub use filter_set::{FilterSet, FilterSetLoader, WavFilterSetLoader};
pub use resample::{Resampler, SincResampler};
pub use speaker::{ChannelMap, EarPair, InputLayout, SpeakerRole, VirtualSpeaker};
pub use state::{passthrough, RendererState};
