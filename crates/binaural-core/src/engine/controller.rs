//! Engine control surface
//!
//! [`SpatialEngine`] is what an application holds. It owns the device
//! backend, the activator thread and the router, and runs the stream
//! lifecycle:
//!
//! ```text
//! Stopped ──start()──▶ Configuring ──backend started──▶ Running
//!    ▲                     │ error                         │
//!    └─────────────────────┴──────────────stop()───────────┘
//! ```
//!
//! Preset activation, output range changes and the convolution toggle never
//! stop the stream; they reach the running bridge through snapshots and
//! atomics. A device change goes through `restart()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use super::activator::{ActivationOutcome, PresetActivator};
use super::bridge::{AudioIOBridge, BridgeConfig};
use super::config::EngineConfig;
use super::diagnostics::{BridgeDiagnostics, DiagnosticsSnapshot};
use super::error::{EngineError, EngineResult};
use super::router::{ChannelRange, ChannelRouter, RouteReader};
use super::snapshot::snapshot_channel;
use crate::audio::{DeviceBackend, DeviceFormat};
use crate::render::{FilterSet, InputLayout, Resampler, SincResampler};
use crate::types::STEREO_CHANNELS;

/// Stream lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Configuring,
    Running,
}

/// Binaural renderer with its device stream
pub struct SpatialEngine {
    config: EngineConfig,
    backend: Box<dyn DeviceBackend>,
    activator: PresetActivator,
    router: ChannelRouter,
    enabled: Arc<AtomicBool>,
    diagnostics: Arc<BridgeDiagnostics>,
    state: EngineState,
    format: Option<DeviceFormat>,
}

impl SpatialEngine {
    /// Create a stopped engine using the sinc resampler
    pub fn new(config: EngineConfig, backend: Box<dyn DeviceBackend>) -> EngineResult<Self> {
        Self::with_resampler(config, backend, Arc::new(SincResampler::new()))
    }

    /// Create a stopped engine with a custom HRIR resampler
    pub fn with_resampler(
        config: EngineConfig,
        backend: Box<dyn DeviceBackend>,
        resampler: Arc<dyn Resampler>,
    ) -> EngineResult<Self> {
        config.validate().map_err(EngineError::InvalidConfig)?;

        // Range requests before the first start are checked against this
        let outputs = match backend.format() {
            Ok(format) => format.output_channels,
            Err(e) => {
                log::warn!("[ENGINE] Could not query device format: {}", e);
                STEREO_CHANNELS
            }
        };

        let activator = PresetActivator::spawn(config.block_size, resampler);
        Ok(Self {
            config,
            backend,
            activator,
            router: ChannelRouter::new(outputs),
            enabled: Arc::new(AtomicBool::new(true)),
            diagnostics: Arc::new(BridgeDiagnostics::new()),
            state: EngineState::Stopped,
            format: None,
        })
    }

    /// Build and publish a renderer for `filter_set`
    ///
    /// While a stream runs, filters are prepared for the device rate instead
    /// of `target_sample_rate`. On failure the previous renderer stays
    /// active.
    pub fn activate(
        &self,
        filter_set: Arc<FilterSet>,
        target_sample_rate: u32,
        layout: InputLayout,
    ) -> oneshot::Receiver<ActivationOutcome> {
        self.activator.activate(filter_set, target_sample_rate, layout)
    }

    /// Route the binaural mix to outputs `start..start + count`
    pub fn set_output_channel_range(&mut self, start: usize, count: usize) -> EngineResult<ChannelRange> {
        Ok(self.router.set_range(start, count)?)
    }

    /// Toggle convolution; when off the input is passed through
    pub fn set_convolution_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        log::info!(
            "[ENGINE] Convolution {}",
            if enabled { "enabled" } else { "bypassed" }
        );
    }

    pub fn is_convolution_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Open the device streams
    pub fn start(&mut self) -> EngineResult<()> {
        if self.state != EngineState::Stopped {
            return Err(EngineError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }

        self.state = EngineState::Configuring;
        match self.configure_and_start() {
            Ok(format) => {
                self.format = Some(format);
                self.state = EngineState::Running;
                log::info!(
                    "[ENGINE] Running: {} in / {} out @ {}Hz, mix on {}",
                    format.input_channels,
                    format.output_channels,
                    format.sample_rate,
                    self.router.range()
                );
                Ok(())
            }
            Err(e) => {
                self.activator.detach();
                self.router.detach();
                self.state = EngineState::Stopped;
                log::error!("[ENGINE] Failed to start: {}", e);
                Err(e)
            }
        }
    }

    fn configure_and_start(&mut self) -> EngineResult<DeviceFormat> {
        let format = self.backend.format()?;
        self.router.set_total_output_channels(format.output_channels);

        let max_frames = format.max_frames.unwrap_or(self.config.max_frames);
        if max_frames % self.config.block_size != 0 {
            log::warn!(
                "[ENGINE] Device callbacks of {} frames are not a multiple of block {}",
                max_frames,
                self.config.block_size
            );
        }

        let depth = self.config.publish_queue_depth;
        let (renderer_tx, renderer_rx) = snapshot_channel(depth);
        let (route_tx, route_rx) = snapshot_channel(depth);

        self.diagnostics.reset_fifo_stats();
        let bridge = AudioIOBridge::new(
            BridgeConfig {
                input_channels: format.input_channels,
                output_channels: format.output_channels,
                max_frames,
            },
            renderer_rx,
            RouteReader::new(route_rx),
            self.enabled.clone(),
            self.diagnostics.clone(),
        );

        self.activator
            .attach(renderer_tx, format.sample_rate, format.input_channels);
        self.router.attach(route_tx);
        self.backend.start(bridge)?;
        Ok(format)
    }

    /// Close the device streams
    ///
    /// The in-flight callback completes; the bridge and its renderer are
    /// released with the streams.
    pub fn stop(&mut self) {
        if self.state == EngineState::Stopped {
            return;
        }
        self.backend.stop();
        self.activator.detach();
        self.router.detach();
        self.state = EngineState::Stopped;
        log::info!("[ENGINE] Stopped");
    }

    /// Stop and start again, picking up a changed device
    pub fn restart(&mut self) -> EngineResult<()> {
        log::info!("[ENGINE] Restarting stream");
        self.stop();
        self.start()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn output_channel_range(&self) -> ChannelRange {
        self.router.range()
    }

    /// Format of the running stream
    pub fn device_format(&self) -> Option<DeviceFormat> {
        match self.state {
            EngineState::Running => self.format,
            _ => None,
        }
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Shared counters, for a monitor on another thread
    pub fn diagnostics_handle(&self) -> Arc<BridgeDiagnostics> {
        self.diagnostics.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for SpatialEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
