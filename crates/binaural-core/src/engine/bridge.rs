//! Real-time audio I/O bridge
//!
//! Drives the signal path from a device callback:
//!
//! ```text
//! inputs (N) ──▶ RendererState / pass-through ──▶ stereo mix
//!                                                    │
//!      outputs (M, all zeroed) ◀── ChannelRange ─────┘
//! ```
//!
//! All buffers are sized for `max_frames` at construction. `process` never
//! allocates, locks, logs or performs I/O; the only cross-thread traffic is
//! the snapshot polls at the start of each callback and relaxed counters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::diagnostics::BridgeDiagnostics;
use super::router::RouteReader;
use super::snapshot::SnapshotSubscriber;
use crate::render::{passthrough, RendererState};
use crate::types::{ChannelBuffers, Sample, STEREO_CHANNELS};

/// Channel counts and buffer capacity of a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    pub input_channels: usize,
    pub output_channels: usize,
    pub max_frames: usize,
}

/// Per-stream callback driver, owned by the audio thread
pub struct AudioIOBridge {
    config: BridgeConfig,
    renderer: SnapshotSubscriber<RendererState>,
    route: RouteReader,
    enabled: Arc<AtomicBool>,
    diagnostics: Arc<BridgeDiagnostics>,
    inputs: ChannelBuffers,
    outputs: ChannelBuffers,
    mix: ChannelBuffers,
}

impl AudioIOBridge {
    pub fn new(
        config: BridgeConfig,
        renderer: SnapshotSubscriber<RendererState>,
        route: RouteReader,
        enabled: Arc<AtomicBool>,
        diagnostics: Arc<BridgeDiagnostics>,
    ) -> Self {
        Self {
            inputs: ChannelBuffers::new(config.input_channels, config.max_frames),
            outputs: ChannelBuffers::new(config.output_channels, config.max_frames),
            mix: ChannelBuffers::new(STEREO_CHANNELS, config.max_frames),
            config,
            renderer,
            route,
            enabled,
            diagnostics,
        }
    }

    pub fn config(&self) -> BridgeConfig {
        self.config
    }

    /// Render one callback's worth of frames from the input arena into the
    /// output arena
    pub fn process(&mut self, frames: usize) {
        self.diagnostics.record_callback();
        if self.renderer.poll() {
            if let Some(state) = self.renderer.current() {
                self.diagnostics.record_swap(state.version());
            }
        }
        let range = self.route.poll();

        debug_assert!(
            frames <= self.config.max_frames,
            "callback of {} frames exceeds bridge capacity {}",
            frames,
            self.config.max_frames
        );
        if frames > self.config.max_frames {
            self.outputs.fill_silence();
            self.diagnostics.record_contract_violation();
            return;
        }

        let input_channels = self.config.input_channels;
        let (left, right) = self.mix.pair_mut(0, 1);
        let (left, right) = (&mut left[..frames], &mut right[..frames]);

        let enabled = self.enabled.load(Ordering::Relaxed);
        match self.renderer.current_mut() {
            Some(state) if enabled && frames % state.block_size() == 0 => {
                let anomalies = state.process(&self.inputs, input_channels, frames, left, right);
                if anomalies > 0 {
                    self.diagnostics.record_anomalies(anomalies);
                }
            }
            Some(_) if enabled => {
                self.diagnostics.record_misaligned();
                passthrough(&self.inputs, input_channels, 0..frames, left, right);
            }
            _ => passthrough(&self.inputs, input_channels, 0..frames, left, right),
        }

        self.outputs.silence_frames(frames);
        if range.fits(self.config.output_channels) {
            let start = range.start();
            self.outputs.channel_mut(start)[..frames].copy_from_slice(&self.mix.channel(0)[..frames]);
            self.outputs.channel_mut(start + 1)[..frames].copy_from_slice(&self.mix.channel(1)[..frames]);
        }
    }

    /// Planar callback: copy in, process, copy out
    ///
    /// Missing input channels read as silence; extra ones are ignored.
    pub fn process_planar(&mut self, frames: usize, inputs: &[&[Sample]], outputs: &mut [&mut [Sample]]) {
        let copied = self.clamp_frames(frames);
        for ch in 0..self.config.input_channels {
            let dst = &mut self.inputs.channel_mut(ch)[..copied];
            match inputs.get(ch) {
                Some(src) => dst.copy_from_slice(&src[..copied]),
                None => dst.fill(0.0),
            }
        }
        self.process(frames);
        for (ch, out) in outputs.iter_mut().enumerate() {
            let out = &mut out[..frames];
            if frames == copied && ch < self.config.output_channels {
                out.copy_from_slice(&self.outputs.channel(ch)[..frames]);
            } else {
                out.fill(0.0);
            }
        }
    }

    /// Interleaved callback using the bridge's own channel counts
    pub fn process_interleaved(&mut self, frames: usize, input: &[Sample], output: &mut [Sample]) {
        let in_ch = self.config.input_channels;
        let out_ch = self.config.output_channels;
        self.write_input_interleaved(frames, input, in_ch);
        self.process(frames);
        self.read_output_interleaved(frames, output, out_ch);
    }

    /// Deinterleave `frames` frames of `channels`-wide data into the input
    /// arena
    pub fn write_input_interleaved(&mut self, frames: usize, data: &[Sample], channels: usize) {
        let frames = self.clamp_frames(frames);
        if channels == 0 {
            self.inputs.silence_frames(frames);
            return;
        }
        for ch in 0..self.config.input_channels {
            let dst = &mut self.inputs.channel_mut(ch)[..frames];
            if ch < channels {
                for (d, frame) in dst.iter_mut().zip(data.chunks_exact(channels)) {
                    *d = frame[ch];
                }
            } else {
                dst.fill(0.0);
            }
        }
    }

    /// Interleave the first `frames` frames of the output arena into a
    /// `channels`-wide buffer; channels the bridge does not have are silent
    pub fn read_output_interleaved(&self, frames: usize, data: &mut [Sample], channels: usize) {
        if channels == 0 {
            return;
        }
        let frames = frames.min(data.len() / channels);
        let available = frames.min(self.config.max_frames);
        for (i, frame) in data.chunks_exact_mut(channels).take(frames).enumerate() {
            for (ch, out) in frame.iter_mut().enumerate() {
                *out = if i < available && ch < self.config.output_channels {
                    self.outputs.channel(ch)[i]
                } else {
                    0.0
                };
            }
        }
    }

    /// Output arena of the last callback
    pub fn outputs(&self) -> &ChannelBuffers {
        &self.outputs
    }

    /// Input arena, for callers that fill it directly before `process`
    pub fn inputs_mut(&mut self) -> &mut ChannelBuffers {
        &mut self.inputs
    }

    /// Counters shared with the control side
    pub fn diagnostics(&self) -> &Arc<BridgeDiagnostics> {
        &self.diagnostics
    }

    /// Version of the renderer in use, if any
    pub fn active_version(&self) -> Option<u64> {
        self.renderer.current().map(RendererState::version)
    }

    fn clamp_frames(&self, frames: usize) -> usize {
        frames.min(self.config.max_frames)
    }
}
