//! Real-time engine
//!
//! Everything between a device callback and a published preset:
//!
//! - [`snapshot`]: version-counted, lock-free hand-over of built values
//! - [`gc`]: deferred deallocation so the audio thread never frees memory
//! - [`ChannelRouter`]: places the stereo mix on two physical outputs
//! - [`AudioIOBridge`]: the per-callback driver owned by the audio thread
//! - [`PresetActivator`]: builds renderers on a background thread
//! - [`SpatialEngine`]: the control surface and stream lifecycle

mod activator;
mod bridge;
mod config;
mod controller;
mod diagnostics;
mod error;
pub mod gc;
mod router;
pub mod snapshot;

pub use activator::{ActivationOutcome, ActivationReport, PresetActivator};
pub use bridge::{AudioIOBridge, BridgeConfig};
pub use config::{EngineConfig, DEFAULT_PUBLISH_QUEUE_DEPTH};
pub use controller::{EngineState, SpatialEngine};
pub use diagnostics::{BridgeDiagnostics, DiagnosticsMonitor, DiagnosticsSnapshot};
pub use error::{
    ActivationError, EngineError, EngineResult, RouterError, RouterResult, SnapshotFull,
};
pub use router::{ChannelRange, ChannelRouter, RouteReader};
pub use snapshot::{snapshot_channel, SnapshotPublisher, SnapshotSubscriber};
