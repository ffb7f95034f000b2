//! CPAL device backend
//!
//! Capture and playback run as two independent streams, possibly on two
//! devices, joined by a lock-free sample FIFO:
//!
//! ```text
//!  ┌──────────────────┐   interleaved f32   ┌─────────────────────┐
//!  │  Input stream    │───push────────────▶ │  Sample FIFO        │
//!  │  (capture cb)    │   whole frames      │  (rtrb SPSC)        │
//!  └──────────────────┘                     └──────────┬──────────┘
//!                                                      │ pop one block
//!                                           ┌──────────▼──────────┐
//!                                           │  Output stream      │
//!                                           │  owns AudioIOBridge │
//!                                           │  block → staging    │
//!                                           └─────────────────────┘
//! ```
//!
//! The output callback renders in exact convolution blocks and serves the
//! device from a one-block staging buffer, so device buffer sizes never need
//! to line up with the block size. Neither callback blocks on the other: a
//! full FIFO drops capture frames (overrun), an empty one renders silence
//! (underrun). Both are counted in the bridge diagnostics.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Stream, StreamConfig};

use super::backend::{DeviceBackend, DeviceFormat};
use super::config::AudioConfig;
use super::device::{find_device, negotiate_config, Direction};
use super::error::{AudioError, AudioResult};
use crate::engine::{AudioIOBridge, BridgeDiagnostics};
use crate::types::Sample;

/// Streams kept alive while running; dropping them stops the callbacks
struct CpalStreams {
    _input: Stream,
    _output: Stream,
}

/// Resolved devices and stream configs for one run
struct StreamSetup {
    input: cpal::Device,
    output: cpal::Device,
    input_config: StreamConfig,
    output_config: StreamConfig,
}

/// Device backend on top of CPAL
pub struct CpalBackend {
    config: AudioConfig,
    block_size: usize,
    streams: Option<CpalStreams>,
}

impl CpalBackend {
    /// Create a backend rendering in `block_size` frame blocks
    pub fn new(config: AudioConfig, block_size: usize) -> Self {
        Self {
            config,
            block_size,
            streams: None,
        }
    }

    fn setup(&self) -> AudioResult<StreamSetup> {
        let output = find_device(self.config.output_device.as_ref(), Direction::Output)?;
        let input = find_device(self.config.input_device.as_ref(), Direction::Input)?;

        let output_supported =
            negotiate_config(&output, Direction::Output, self.config.target_sample_rate())?;
        let rate = output_supported.sample_rate().0;
        let input_supported = negotiate_config(&input, Direction::Input, rate)?;
        if input_supported.sample_rate().0 != rate {
            return Err(AudioError::SampleRateMismatch {
                input: input_supported.sample_rate().0,
                output: rate,
            });
        }

        // Any device buffer size works; the output callback re-blocks
        let to_stream = |supported: &cpal::SupportedStreamConfig| StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: BufferSize::Default,
        };

        Ok(StreamSetup {
            input_config: to_stream(&input_supported),
            output_config: to_stream(&output_supported),
            input,
            output,
        })
    }
}

impl DeviceBackend for CpalBackend {
    fn format(&self) -> AudioResult<DeviceFormat> {
        let setup = self.setup()?;
        Ok(DeviceFormat {
            sample_rate: setup.output_config.sample_rate.0,
            input_channels: setup.input_config.channels as usize,
            output_channels: setup.output_config.channels as usize,
            max_frames: Some(self.block_size),
        })
    }

    fn start(&mut self, bridge: AudioIOBridge) -> AudioResult<()> {
        if self.streams.is_some() {
            return Err(AudioError::AlreadyRunning);
        }
        let setup = self.setup()?;

        let in_channels = setup.input_config.channels as usize;
        let out_channels = setup.output_config.channels as usize;
        let capacity = self.config.fifo_blocks.max(2) * self.block_size * in_channels;
        let (producer, consumer) = rtrb::RingBuffer::<Sample>::new(capacity);

        let input_name = setup.input.name().unwrap_or_else(|_| "Unknown".to_string());
        let output_name = setup.output.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!(
            "[CPAL] Input '{}' ({} ch), output '{}' ({} ch) @ {}Hz, block {} frames, FIFO {} samples",
            input_name,
            in_channels,
            output_name,
            out_channels,
            setup.output_config.sample_rate.0,
            self.block_size,
            capacity
        );

        // FIFO faults are counted next to the bridge's own counters
        let capture = CaptureState {
            producer,
            channels: in_channels,
            diagnostics: bridge.diagnostics().clone(),
        };
        let playback = PlaybackState::new(bridge, consumer, in_channels, out_channels, self.block_size);

        let input_stream = build_input_stream(&setup.input, &setup.input_config, capture)?;
        let output_stream = build_output_stream(&setup.output, &setup.output_config, playback)?;

        input_stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(format!("Input: {}", e)))?;
        output_stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(format!("Output: {}", e)))?;

        self.streams = Some(CpalStreams {
            _input: input_stream,
            _output: output_stream,
        });
        log::info!("[CPAL] Streams started");
        Ok(())
    }

    fn stop(&mut self) {
        if self.streams.take().is_some() {
            log::info!("[CPAL] Streams stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.streams.is_some()
    }
}

/// Owned by the capture callback
struct CaptureState {
    producer: rtrb::Producer<Sample>,
    channels: usize,
    diagnostics: Arc<BridgeDiagnostics>,
}

impl CaptureState {
    fn push(&mut self, data: &[Sample]) {
        // Whole frames only, so the consumer never loses channel alignment
        let free = self.producer.slots();
        let writable = (free - free % self.channels).min(data.len());
        if writable < data.len() {
            self.diagnostics.record_overrun();
        }
        if writable == 0 {
            return;
        }
        if let Ok(chunk) = self.producer.write_chunk_uninit(writable) {
            chunk.fill_from_iter(data[..writable].iter().copied());
        }
    }
}

/// Owned by the playback callback
struct PlaybackState {
    bridge: AudioIOBridge,
    diagnostics: Arc<BridgeDiagnostics>,
    consumer: rtrb::Consumer<Sample>,
    in_channels: usize,
    out_channels: usize,
    block_size: usize,
    /// One block of interleaved capture samples
    input_block: Vec<Sample>,
    /// One rendered block of interleaved device output
    staged: Vec<Sample>,
    /// Frames of `staged` already handed to the device
    staged_pos: usize,
}

impl PlaybackState {
    fn new(
        bridge: AudioIOBridge,
        consumer: rtrb::Consumer<Sample>,
        in_channels: usize,
        out_channels: usize,
        block_size: usize,
    ) -> Self {
        Self {
            diagnostics: bridge.diagnostics().clone(),
            bridge,
            consumer,
            in_channels,
            out_channels,
            block_size,
            input_block: vec![0.0; block_size * in_channels],
            staged: vec![0.0; block_size * out_channels],
            staged_pos: block_size,
        }
    }

    fn fill(&mut self, data: &mut [Sample]) {
        let channels = self.out_channels;
        for frame in data.chunks_exact_mut(channels) {
            if self.staged_pos == self.block_size {
                self.render_block();
            }
            let at = self.staged_pos * channels;
            frame.copy_from_slice(&self.staged[at..at + channels]);
            self.staged_pos += 1;
        }
    }

    fn render_block(&mut self) {
        let needed = self.block_size * self.in_channels;
        self.diagnostics.record_fifo_fill(self.consumer.slots());
        match self.consumer.read_chunk(needed) {
            Ok(chunk) => {
                let (first, second) = chunk.as_slices();
                self.input_block[..first.len()].copy_from_slice(first);
                self.input_block[first.len()..first.len() + second.len()].copy_from_slice(second);
                chunk.commit_all();
            }
            Err(_) => {
                self.input_block.fill(0.0);
                self.diagnostics.record_underrun();
            }
        }

        self.bridge
            .write_input_interleaved(self.block_size, &self.input_block, self.in_channels);
        self.bridge.process(self.block_size);
        self.bridge
            .read_output_interleaved(self.block_size, &mut self.staged, self.out_channels);
        self.staged_pos = 0;
    }
}

fn build_input_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut capture: CaptureState,
) -> AudioResult<Stream> {
    device
        .build_input_stream(
            config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| capture.push(data),
            move |err| log::error!("[CPAL] Input stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(format!("Input: {}", e)))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut playback: PlaybackState,
) -> AudioResult<Stream> {
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| playback.fill(data),
            move |err| log::error!("[CPAL] Output stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(format!("Output: {}", e)))
}
