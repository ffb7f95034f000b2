//! Multi-speaker binaural renderer
//!
//! A [`RendererState`] owns one convolution engine per (speaker, ear) and
//! mixes every speaker into a stereo pair. It is built on the activator
//! thread and then moved, whole, to the audio thread.
//!
//! Its configuration (filters, channel map, block size, version) is fixed at
//! build time and is only ever replaced by publishing a new state. The only
//! thing that changes inside a published state is DSP history: engine delay
//! lines and overlap buffers advance with every processed block.

use std::collections::HashMap;
use std::ops::Range;

use super::error::{RenderError, RenderResult};
use super::filter_set::FilterSet;
use super::resample::Resampler;
use super::speaker::{InputLayout, SpeakerRole};
use crate::dsp::{ConvolutionEngine, TransformCache};
use crate::types::{ChannelBuffers, Sample};

/// Engine pair rendering one virtual speaker
struct SpeakerChain {
    role: SpeakerRole,
    input_channel: usize,
    left: ConvolutionEngine,
    right: ConvolutionEngine,
}

/// Immutable-configuration renderer for one preset
pub struct RendererState {
    speakers: Vec<SpeakerChain>,
    /// Two `block_size` channels per speaker: `2i` left ear, `2i + 1` right ear
    scratch: ChannelBuffers,
    /// Which speakers produced output in the current chunk
    rendered: Vec<bool>,
    block_size: usize,
    sample_rate: u32,
    version: u64,
}

impl RendererState {
    /// Build a renderer for `layout` from `filter_set`
    ///
    /// Filters are converted to `target_rate` when the set was recorded at a
    /// different rate; each filter index is converted at most once. Speakers
    /// without a channel map entry are skipped.
    pub fn build(
        filter_set: &FilterSet,
        layout: &InputLayout,
        block_size: usize,
        target_rate: u32,
        resampler: &dyn Resampler,
        cache: &TransformCache,
        version: u64,
    ) -> RenderResult<Self> {
        if block_size == 0 {
            return Err(RenderError::InvalidBlockSize(block_size));
        }
        if layout.is_empty() {
            return Err(RenderError::EmptyLayout);
        }

        let map = filter_set.channel_map();
        let needs_resample = filter_set.sample_rate() != target_rate;
        let mut converted: HashMap<usize, Vec<Sample>> = HashMap::new();
        let mut speakers = Vec::with_capacity(layout.len());

        for speaker in layout.speakers() {
            let Some(pair) = map.get(speaker.role) else {
                log::debug!("[RENDER] No channel map entry for {}, skipping", speaker.role);
                continue;
            };

            let mut engine_for = |index: usize| -> RenderResult<ConvolutionEngine> {
                let raw = filter_set
                    .channel(index)
                    .ok_or(RenderError::FilterIndexOutOfRange {
                        role: speaker.role,
                        index,
                        available: filter_set.channel_count(),
                    })?;
                let filter: &[Sample] = if needs_resample {
                    if !converted.contains_key(&index) {
                        let resampled =
                            resampler.resample(raw, filter_set.sample_rate(), target_rate)?;
                        converted.insert(index, resampled);
                    }
                    &converted[&index]
                } else {
                    raw
                };
                ConvolutionEngine::with_cache(filter, block_size, cache).map_err(|source| {
                    RenderError::Convolution {
                        role: speaker.role,
                        source,
                    }
                })
            };

            let left = engine_for(pair.left)?;
            let right = engine_for(pair.right)?;
            speakers.push(SpeakerChain {
                role: speaker.role,
                input_channel: speaker.input_channel,
                left,
                right,
            });
        }

        if speakers.is_empty() {
            return Err(RenderError::NoMappedSpeakers);
        }

        let scratch = ChannelBuffers::new(speakers.len() * 2, block_size);
        let rendered = vec![false; speakers.len()];

        log::info!(
            "[RENDER] Built renderer v{}: {} speakers, block {}, {}Hz{}",
            version,
            speakers.len(),
            block_size,
            target_rate,
            if needs_resample { " (resampled)" } else { "" }
        );

        Ok(Self {
            speakers,
            scratch,
            rendered,
            block_size,
            sample_rate: target_rate,
            version,
        })
    }

    /// Render `frames` frames of `inputs` into the stereo pair
    ///
    /// `frames` must be a multiple of the block size; any remainder is left
    /// silent. Returns how many blocks hit a numeric anomaly. All engine
    /// history is flushed after each one. A block whose input is non-finite
    /// is never convolved and comes out silent; a block whose output went
    /// non-finite is replaced with pass-through.
    ///
    /// Real-time safe.
    pub fn process(
        &mut self,
        inputs: &ChannelBuffers,
        channel_count: usize,
        frames: usize,
        left: &mut [Sample],
        right: &mut [Sample],
    ) -> usize {
        let b = self.block_size;
        debug_assert!(frames % b == 0, "frames {} not a multiple of block {}", frames, b);
        let channel_count = channel_count.min(inputs.channels());
        let aligned = frames - frames % b;
        left[aligned..frames].fill(0.0);
        right[aligned..frames].fill(0.0);

        let mut anomalies = 0;
        for start in (0..aligned).step_by(b) {
            let chunk = start..start + b;
            let clean_input = inputs.is_finite(chunk.clone());
            if clean_input && self.render_chunk(inputs, channel_count, chunk.clone(), left, right) {
                continue;
            }

            let (l, r) = (&mut left[chunk.clone()], &mut right[chunk.clone()]);
            if clean_input {
                passthrough(inputs, channel_count, chunk, l, r);
            } else {
                l.fill(0.0);
                r.fill(0.0);
            }
            self.reset();
            anomalies += 1;
        }
        anomalies
    }

    /// Convolve-all then accumulate-all for one block; false on NaN/Inf
    fn render_chunk(
        &mut self,
        inputs: &ChannelBuffers,
        channel_count: usize,
        chunk: Range<usize>,
        left: &mut [Sample],
        right: &mut [Sample],
    ) -> bool {
        for (i, speaker) in self.speakers.iter_mut().enumerate() {
            self.rendered[i] = false;
            if speaker.input_channel >= channel_count {
                continue;
            }
            let input = &inputs.channel(speaker.input_channel)[chunk.clone()];
            let (l, r) = self.scratch.pair_mut(2 * i, 2 * i + 1);
            if speaker.left.process(input, l).is_err() || speaker.right.process(input, r).is_err() {
                return false;
            }
            self.rendered[i] = true;
        }

        let out_l = &mut left[chunk.clone()];
        let out_r = &mut right[chunk];
        out_l.fill(0.0);
        out_r.fill(0.0);
        for i in 0..self.rendered.len() {
            if !self.rendered[i] {
                continue;
            }
            for (acc, s) in out_l.iter_mut().zip(self.scratch.channel(2 * i)) {
                *acc += s;
            }
            for (acc, s) in out_r.iter_mut().zip(self.scratch.channel(2 * i + 1)) {
                *acc += s;
            }
        }

        out_l.iter().chain(out_r.iter()).all(|s| s.is_finite())
    }

    /// Flush the history of every engine
    pub fn reset(&mut self) {
        for speaker in &mut self.speakers {
            speaker.left.reset();
            speaker.right.reset();
        }
        self.scratch.fill_silence();
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of rendered (mapped) speakers
    pub fn speaker_count(&self) -> usize {
        self.speakers.len()
    }

    /// Roles of the rendered speakers, in layout order
    pub fn roles(&self) -> impl Iterator<Item = SpeakerRole> + '_ {
        self.speakers.iter().map(|s| s.role)
    }

    /// Output delay added by the convolution
    pub fn latency_frames(&self) -> usize {
        self.block_size
    }
}

impl std::fmt::Debug for RendererState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererState")
            .field("version", &self.version)
            .field("speakers", &self.speakers.len())
            .field("block_size", &self.block_size)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// Copy the input straight to the stereo pair
///
/// Left takes channel 0, right takes channel 1 (or channel 0 for mono
/// input). Without input channels both sides are silent.
pub fn passthrough(
    inputs: &ChannelBuffers,
    channel_count: usize,
    frames: Range<usize>,
    left: &mut [Sample],
    right: &mut [Sample],
) {
    match channel_count.min(inputs.channels()) {
        0 => {
            left.fill(0.0);
            right.fill(0.0);
        }
        1 => {
            let mono = &inputs.channel(0)[frames];
            left.copy_from_slice(mono);
            right.copy_from_slice(mono);
        }
        _ => {
            left.copy_from_slice(&inputs.channel(0)[frames.clone()]);
            right.copy_from_slice(&inputs.channel(1)[frames]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::resample::SincResampler;
    use crate::render::speaker::{ChannelMap, EarPair};

    /// Resampler that must never be called
    struct NoResample;

    impl Resampler for NoResample {
        fn resample(&self, _: &[Sample], from: u32, to: u32) -> RenderResult<Vec<Sample>> {
            panic!("unexpected resample {} -> {}", from, to);
        }
    }

    /// Resampler that counts calls and returns the input unchanged
    #[derive(Default)]
    struct CountingResampler(std::sync::atomic::AtomicUsize);

    impl Resampler for CountingResampler {
        fn resample(&self, samples: &[Sample], _: u32, _: u32) -> RenderResult<Vec<Sample>> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Ok(samples.to_vec())
        }
    }

    fn build(set: &FilterSet, layout: &InputLayout, block: usize) -> RenderResult<RendererState> {
        RendererState::build(set, layout, block, set.sample_rate(), &NoResample, &TransformCache::new(), 1)
    }

    fn front_left_set(filter: Vec<Sample>) -> FilterSet {
        let mut map = ChannelMap::new();
        map.insert(SpeakerRole::FrontLeft, EarPair { left: 0, right: 1 });
        FilterSet::new(48000, vec![filter, vec![0.0]], map).unwrap()
    }

    #[test]
    fn test_front_left_impulse_scenario() {
        let b = 512;
        let set = front_left_set(vec![1.0, 0.5, 0.0, 0.0]);
        let layout = InputLayout::from_roles(&[SpeakerRole::FrontLeft]);
        let mut state = build(&set, &layout, b).unwrap();

        let mut inputs = ChannelBuffers::new(1, b);
        inputs.channel_mut(0)[0] = 1.0;
        let mut left = vec![0.0; b];
        let mut right = vec![0.0; b];

        assert_eq!(state.process(&inputs, 1, b, &mut left, &mut right), 0);
        assert!(left.iter().all(|s| s.abs() < 1e-6));

        inputs.fill_silence();
        state.process(&inputs, 1, b, &mut left, &mut right);
        assert!((left[0] - 1.0).abs() < 1e-5);
        assert!((left[1] - 0.5).abs() < 1e-5);
        assert!(left[2..].iter().all(|s| s.abs() < 1e-5));
        assert!(right.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_speakers_superpose() {
        let b = 32;
        let roles = [SpeakerRole::FrontLeft, SpeakerRole::FrontRight];
        let map = ChannelMap::interleaved_pairs(&roles);
        let filters = vec![vec![1.0], vec![0.25], vec![0.5], vec![2.0]];
        let set = FilterSet::new(48000, filters, map).unwrap();
        let mut state = build(&set, &InputLayout::from_roles(&roles), b).unwrap();

        let mut inputs = ChannelBuffers::new(2, 2 * b);
        inputs.channel_mut(0)[..b].fill(1.0);
        inputs.channel_mut(1)[..b].fill(2.0);
        let mut left = vec![0.0; 2 * b];
        let mut right = vec![0.0; 2 * b];
        state.process(&inputs, 2, 2 * b, &mut left, &mut right);

        // Second block carries the first input block: L = 1·1 + 2·0.5, R = 1·0.25 + 2·2
        for i in b..2 * b {
            assert!((left[i] - 2.0).abs() < 1e-4);
            assert!((right[i] - 4.25).abs() < 1e-4);
        }
    }

    #[test]
    fn test_unmapped_speakers_are_skipped() {
        let set = front_left_set(vec![1.0]);
        let layout = InputLayout::detect(6);
        let state = build(&set, &layout, 64).unwrap();
        assert_eq!(state.speaker_count(), 1);
        assert_eq!(state.roles().collect::<Vec<_>>(), vec![SpeakerRole::FrontLeft]);
    }

    #[test]
    fn test_build_errors() {
        let set = front_left_set(vec![1.0]);
        assert!(matches!(
            build(&set, &InputLayout::default(), 64),
            Err(RenderError::EmptyLayout)
        ));
        assert!(matches!(
            build(&set, &InputLayout::from_roles(&[SpeakerRole::FrontLeft]), 0),
            Err(RenderError::InvalidBlockSize(0))
        ));
        assert!(matches!(
            build(&set, &InputLayout::from_roles(&[SpeakerRole::BackCenter]), 64),
            Err(RenderError::NoMappedSpeakers)
        ));

        let mut map = ChannelMap::new();
        map.insert(SpeakerRole::FrontLeft, EarPair { left: 0, right: 7 });
        let bad = FilterSet::new(48000, vec![vec![1.0]], map).unwrap();
        assert!(matches!(
            build(&bad, &InputLayout::from_roles(&[SpeakerRole::FrontLeft]), 64),
            Err(RenderError::FilterIndexOutOfRange { index: 7, available: 1, .. })
        ));
    }

    #[test]
    fn test_each_filter_resampled_once() {
        // Both ears of both speakers share filter 0
        let mut map = ChannelMap::new();
        map.insert(SpeakerRole::FrontLeft, EarPair { left: 0, right: 0 });
        map.insert(SpeakerRole::FrontRight, EarPair { left: 0, right: 1 });
        let set = FilterSet::new(44100, vec![vec![1.0], vec![0.5]], map).unwrap();
        let layout = InputLayout::detect(2);
        let resampler = CountingResampler::default();

        let state =
            RendererState::build(&set, &layout, 64, 48000, &resampler, &TransformCache::new(), 3)
                .unwrap();
        assert_eq!(resampler.0.load(std::sync::atomic::Ordering::Relaxed), 2);
        assert_eq!(state.sample_rate(), 48000);
        assert_eq!(state.version(), 3);
    }

    #[test]
    fn test_sinc_resampled_build() {
        let set = front_left_set(vec![1.0; 64]);
        let layout = InputLayout::from_roles(&[SpeakerRole::FrontLeft]);
        let state = RendererState::build(
            &set,
            &layout,
            64,
            44100,
            &SincResampler::new(),
            &TransformCache::new(),
            1,
        )
        .unwrap();
        assert_eq!(state.sample_rate(), 44100);
    }

    #[test]
    fn test_channels_beyond_input_count_are_silent() {
        let b = 16;
        let roles = [SpeakerRole::FrontLeft, SpeakerRole::FrontRight];
        let set = FilterSet::new(48000, vec![vec![1.0]; 4], ChannelMap::interleaved_pairs(&roles)).unwrap();
        let mut state = build(&set, &InputLayout::from_roles(&roles), b).unwrap();

        let mut inputs = ChannelBuffers::new(2, 2 * b);
        inputs.channel_mut(1).fill(1.0);
        let mut left = vec![0.0; 2 * b];
        let mut right = vec![0.0; 2 * b];
        state.process(&inputs, 1, 2 * b, &mut left, &mut right);
        assert!(left.iter().chain(&right).all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_non_finite_input_falls_back_and_resets() {
        let b = 16;
        let set = front_left_set(vec![1.0, 0.5]);
        let mut state = build(&set, &InputLayout::from_roles(&[SpeakerRole::FrontLeft]), b).unwrap();

        let mut inputs = ChannelBuffers::new(1, 2 * b);
        inputs.channel_mut(0)[3] = f32::INFINITY;
        let mut left = vec![0.0; 2 * b];
        let mut right = vec![0.0; 2 * b];

        // The infinity sits in the first block, which is muted
        let anomalies = state.process(&inputs, 1, 2 * b, &mut left, &mut right);
        assert_eq!(anomalies, 1);
        assert!(left.iter().chain(&right).all(|s| s.is_finite()));

        // After the reset, silence in gives silence out
        let silent = ChannelBuffers::new(1, 2 * b);
        assert_eq!(state.process(&silent, 1, 2 * b, &mut left, &mut right), 0);
        assert!(left.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sustained_nan_input_never_reaches_output() {
        let b = 16;
        let set = front_left_set(vec![1.0, 0.5]);
        let mut state = build(&set, &InputLayout::from_roles(&[SpeakerRole::FrontLeft]), b).unwrap();

        let mut inputs = ChannelBuffers::new(1, 3 * b);
        inputs.channel_mut(0).fill(f32::NAN);
        let mut left = vec![1.0; 3 * b];
        let mut right = vec![1.0; 3 * b];

        // Every block is counted, every output sample is finite
        assert_eq!(state.process(&inputs, 1, 3 * b, &mut left, &mut right), 3);
        assert!(left.iter().chain(&right).all(|&s| s == 0.0));
        assert_eq!(state.process(&inputs, 1, 3 * b, &mut left, &mut right), 3);
        assert!(left.iter().chain(&right).all(|s| s.is_finite()));

        // Once the input recovers, the engines start from clean history
        let mut clean = ChannelBuffers::new(1, 2 * b);
        clean.channel_mut(0)[0] = 1.0;
        assert_eq!(state.process(&clean, 1, 2 * b, &mut left[..2 * b], &mut right[..2 * b]), 0);
        for (got, want) in left[b..b + 3].iter().zip([1.0, 0.5, 0.0]) {
            assert!((got - want).abs() < 1e-5, "got {} want {}", got, want);
        }
    }

    #[test]
    fn test_passthrough() {
        let inputs = ChannelBuffers::from_channels(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
        let mut left = vec![0.0; 2];
        let mut right = vec![0.0; 2];

        passthrough(&inputs, 2, 0..2, &mut left, &mut right);
        assert_eq!((left.as_slice(), right.as_slice()), (&[1.0, 2.0][..], &[3.0, 4.0][..]));

        passthrough(&inputs, 1, 0..2, &mut left, &mut right);
        assert_eq!(right, vec![1.0, 2.0]);

        passthrough(&inputs, 0, 0..2, &mut left, &mut right);
        assert!(left.iter().chain(&right).all(|&s| s == 0.0));
    }
}
