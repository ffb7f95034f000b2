//! Background renderer construction
//!
//! Building a renderer means resampling HRIRs, planning FFTs and transforming
//! every filter partition, which takes far longer than a device callback.
//! The activator does all of it on its own thread and is the only writer of
//! the renderer snapshot channel.
//!
//! ```text
//! Control thread                Activator thread                 Audio thread
//! ──────────────                ────────────────                 ────────────
//! activate(set, rate, layout)
//!   ──Activate──────────────▶   RendererState::build()
//!                                ├ resample filters
//!                                ├ partition + FFT
//!                                └ publish ──────────snapshot──▶ swap at next callback
//!   ◀──oneshot reply──────────  ActivationReport / ActivationError
//! ```
//!
//! The last successful parameters are kept so a restarted stream (possibly
//! at a new device rate or input count) gets a fresh renderer without
//! another request.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;

use super::error::ActivationError;
use super::snapshot::SnapshotPublisher;
use crate::dsp::TransformCache;
use crate::render::{FilterSet, InputLayout, RendererState, Resampler};

/// Outcome of one activation request
pub type ActivationOutcome = Result<ActivationReport, ActivationError>;

/// What an activation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    /// Version id of the new renderer
    pub version: u64,
    /// Speakers that got an engine pair
    pub speaker_count: usize,
    /// Rate the filters were prepared for
    pub sample_rate: u32,
    pub block_size: usize,
    pub latency_frames: usize,
    /// False when no stream is running; the preset is kept for the next start
    pub published: bool,
}

#[derive(Clone)]
struct ActivationParams {
    filter_set: Arc<FilterSet>,
    target_sample_rate: u32,
    layout: InputLayout,
}

enum ActivatorCommand {
    Activate {
        params: ActivationParams,
        reply: oneshot::Sender<ActivationOutcome>,
    },
    Attach {
        publisher: SnapshotPublisher<RendererState>,
        sample_rate: u32,
        input_channels: usize,
    },
    Detach,
    Shutdown,
}

/// Handle to the activator thread
pub struct PresetActivator {
    tx: Sender<ActivatorCommand>,
    handle: Option<JoinHandle<()>>,
}

impl PresetActivator {
    /// Spawn the activator thread
    pub fn spawn(block_size: usize, resampler: Arc<dyn Resampler>) -> Self {
        let (tx, rx) = mpsc::channel::<ActivatorCommand>();

        let handle = thread::Builder::new()
            .name("preset-activator".to_string())
            .spawn(move || {
                ActivatorThread::new(block_size, resampler).run(rx);
            });
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                // Requests will report ActivatorGone
                log::error!("[ACTIVATOR] Failed to spawn activator thread: {}", e);
                None
            }
        };

        log::info!("[ACTIVATOR] Spawned preset activator thread (block {})", block_size);
        Self { tx, handle }
    }

    /// Request a renderer for `filter_set` (non-blocking)
    ///
    /// The reply arrives once the renderer is built and, if a stream is
    /// running, published. On failure the previous renderer stays active.
    pub fn activate(
        &self,
        filter_set: Arc<FilterSet>,
        target_sample_rate: u32,
        layout: InputLayout,
    ) -> oneshot::Receiver<ActivationOutcome> {
        let (reply, rx) = oneshot::channel();
        let command = ActivatorCommand::Activate {
            params: ActivationParams {
                filter_set,
                target_sample_rate,
                layout,
            },
            reply,
        };
        if let Err(mpsc::SendError(command)) = self.tx.send(command) {
            log::error!("[ACTIVATOR] Activator thread is gone");
            if let ActivatorCommand::Activate { reply, .. } = command {
                let _ = reply.send(Err(ActivationError::ActivatorGone));
            }
        }
        rx
    }

    /// Connect to the renderer channel of a started stream
    ///
    /// The last preset is rebuilt for the stream. If its layout does not
    /// cover `input_channels`, the default layout for that count is used.
    pub fn attach(
        &self,
        publisher: SnapshotPublisher<RendererState>,
        sample_rate: u32,
        input_channels: usize,
    ) {
        self.send(ActivatorCommand::Attach {
            publisher,
            sample_rate,
            input_channels,
        });
    }

    /// Disconnect from a stopped stream
    pub fn detach(&self) {
        self.send(ActivatorCommand::Detach);
    }

    fn send(&self, command: ActivatorCommand) {
        if self.tx.send(command).is_err() {
            log::error!("[ACTIVATOR] Activator thread is gone");
        }
    }
}

impl Drop for PresetActivator {
    fn drop(&mut self) {
        let _ = self.tx.send(ActivatorCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[ACTIVATOR] Activator thread panicked");
            }
        }
    }
}

struct ActivatorThread {
    block_size: usize,
    resampler: Arc<dyn Resampler>,
    cache: &'static TransformCache,
    /// Monotonic renderer version
    next_version: u64,
    publisher: Option<SnapshotPublisher<RendererState>>,
    device_rate: Option<u32>,
    last: Option<ActivationParams>,
}

impl ActivatorThread {
    fn new(block_size: usize, resampler: Arc<dyn Resampler>) -> Self {
        Self {
            block_size,
            resampler,
            cache: TransformCache::global(),
            next_version: 1,
            publisher: None,
            device_rate: None,
            last: None,
        }
    }

    fn run(mut self, rx: Receiver<ActivatorCommand>) {
        log::info!("[ACTIVATOR] Thread started");

        while let Ok(command) = rx.recv() {
            match command {
                ActivatorCommand::Activate { params, reply } => {
                    let outcome = self.activate(params);
                    if let Err(e) = &outcome {
                        log::warn!("[ACTIVATOR] Activation failed: {}", e);
                    }
                    // Caller may have stopped waiting
                    let _ = reply.send(outcome);
                }
                ActivatorCommand::Attach {
                    publisher,
                    sample_rate,
                    input_channels,
                } => {
                    log::info!(
                        "[ACTIVATOR] Attached to stream at {}Hz with {} inputs",
                        sample_rate,
                        input_channels
                    );
                    self.publisher = Some(publisher);
                    self.device_rate = Some(sample_rate);
                    if let Some(mut params) = self.last.clone() {
                        if params.layout.len() != input_channels {
                            log::info!(
                                "[ACTIVATOR] Input count changed {} -> {}, using default layout",
                                params.layout.len(),
                                input_channels
                            );
                            params.layout = InputLayout::detect(input_channels);
                        }
                        match self.activate(params) {
                            Ok(report) => log::info!(
                                "[ACTIVATOR] Restored preset as renderer v{}",
                                report.version
                            ),
                            Err(e) => log::error!("[ACTIVATOR] Failed to restore preset: {}", e),
                        }
                    }
                }
                ActivatorCommand::Detach => {
                    log::info!("[ACTIVATOR] Detached from stream");
                    self.publisher = None;
                    self.device_rate = None;
                }
                ActivatorCommand::Shutdown => break,
            }
        }

        log::info!("[ACTIVATOR] Thread exiting");
    }

    fn activate(&mut self, params: ActivationParams) -> ActivationOutcome {
        // A running device dictates the rate
        let rate = self.device_rate.unwrap_or(params.target_sample_rate);
        if rate != params.target_sample_rate {
            log::info!(
                "[ACTIVATOR] Requested {}Hz, building for device rate {}Hz",
                params.target_sample_rate,
                rate
            );
        }

        let version = self.next_version;
        self.next_version += 1;
        let state = RendererState::build(
            &params.filter_set,
            &params.layout,
            self.block_size,
            rate,
            self.resampler.as_ref(),
            self.cache,
            version,
        )?;

        let report = ActivationReport {
            version,
            speaker_count: state.speaker_count(),
            sample_rate: rate,
            block_size: state.block_size(),
            latency_frames: state.latency_frames(),
            published: self.publisher.is_some(),
        };

        if let Some(publisher) = &mut self.publisher {
            publisher
                .publish(state)
                .map_err(|_| ActivationError::QueueFull)?;
            log::info!(
                "[ACTIVATOR] Published renderer v{} ({} speakers @ {}Hz)",
                version,
                report.speaker_count,
                rate
            );
        }

        self.last = Some(params);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::snapshot::snapshot_channel;
    use crate::render::{ChannelMap, SincResampler, SpeakerRole};

    fn stereo_set(rate: u32) -> Arc<FilterSet> {
        let roles = [SpeakerRole::FrontLeft, SpeakerRole::FrontRight];
        let filters = vec![vec![1.0, 0.5], vec![0.2], vec![0.2], vec![1.0, 0.5]];
        Arc::new(FilterSet::new(rate, filters, ChannelMap::interleaved_pairs(&roles)).unwrap())
    }

    fn activator() -> PresetActivator {
        PresetActivator::spawn(64, Arc::new(SincResampler::new()))
    }

    #[test]
    fn test_activate_without_stream_is_kept_for_later() {
        let activator = activator();
        let report = activator
            .activate(stereo_set(48000), 48000, InputLayout::detect(2))
            .blocking_recv()
            .unwrap()
            .unwrap();
        assert!(!report.published);
        assert_eq!(report.speaker_count, 2);
        assert_eq!(report.latency_frames, 64);

        // Attaching publishes a rebuilt renderer
        let (publisher, mut subscriber) = snapshot_channel(4);
        activator.attach(publisher, 48000, 2);
        let report = activator
            .activate(stereo_set(48000), 48000, InputLayout::detect(2))
            .blocking_recv()
            .unwrap()
            .unwrap();
        assert!(report.published);

        assert!(subscriber.poll());
        assert_eq!(subscriber.current().map(RendererState::version), Some(report.version));
    }

    #[test]
    fn test_attach_rebuilds_for_device_rate() {
        let activator = activator();
        activator
            .activate(stereo_set(48000), 48000, InputLayout::detect(2))
            .blocking_recv()
            .unwrap()
            .unwrap();

        let (publisher, mut subscriber) = snapshot_channel(4);
        activator.attach(publisher, 44100, 2);

        // A later request is processed after the attach, so the restored
        // renderer is already queued by the time its reply arrives
        let report = activator
            .activate(stereo_set(48000), 48000, InputLayout::detect(2))
            .blocking_recv()
            .unwrap()
            .unwrap();
        assert_eq!(report.sample_rate, 44100);
        assert!(subscriber.poll());
        assert_eq!(subscriber.current().map(RendererState::sample_rate), Some(44100));
    }

    #[test]
    fn test_failed_build_keeps_previous_renderer() {
        let activator = activator();
        let (publisher, mut subscriber) = snapshot_channel(4);
        activator.attach(publisher, 48000, 2);

        let good = activator
            .activate(stereo_set(48000), 48000, InputLayout::detect(2))
            .blocking_recv()
            .unwrap()
            .unwrap();
        let bad = activator
            .activate(stereo_set(48000), 48000, InputLayout::default())
            .blocking_recv()
            .unwrap();
        assert!(matches!(bad, Err(ActivationError::Build(_))));

        subscriber.poll();
        assert_eq!(subscriber.current().map(RendererState::version), Some(good.version));
    }

    #[test]
    fn test_versions_increase() {
        let activator = activator();
        let a = activator
            .activate(stereo_set(48000), 48000, InputLayout::detect(2))
            .blocking_recv()
            .unwrap()
            .unwrap();
        let b = activator
            .activate(stereo_set(48000), 48000, InputLayout::detect(2))
            .blocking_recv()
            .unwrap()
            .unwrap();
        assert!(b.version > a.version);
    }
}
