//! HRIR filter sets and loaders
//!
//! A filter set is a bank of mono impulse responses at one sample rate plus
//! the [`ChannelMap`] telling which two of them belong to each speaker role.
//! The map always travels with the data; nothing here guesses it.

use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};

use super::error::{RenderError, RenderResult};
use super::speaker::ChannelMap;
use crate::types::Sample;

/// Loaded impulse responses plus their channel map
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSet {
    sample_rate: u32,
    channels: Vec<Vec<Sample>>,
    channel_map: ChannelMap,
}

impl FilterSet {
    /// Create a filter set, checking that it is usable
    pub fn new(
        sample_rate: u32,
        channels: Vec<Vec<Sample>>,
        channel_map: ChannelMap,
    ) -> RenderResult<Self> {
        if sample_rate == 0 {
            return Err(RenderError::InvalidFilterSet("sample rate is zero".into()));
        }
        if channels.is_empty() {
            return Err(RenderError::InvalidFilterSet("no impulse responses".into()));
        }
        if let Some(index) = channels
            .iter()
            .position(|c| c.iter().any(|s| !s.is_finite()))
        {
            return Err(RenderError::InvalidFilterSet(format!(
                "impulse response {} has non-finite coefficients",
                index
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            channel_map,
        })
    }

    /// Number of impulse responses in the set
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Impulse response `index`, if present
    pub fn channel(&self, index: usize) -> Option<&[Sample]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channel_map(&self) -> &ChannelMap {
        &self.channel_map
    }

    /// Length of the longest impulse response
    pub fn max_length(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Source of filter sets
pub trait FilterSetLoader: Send + Sync {
    fn load(&self, path: &Path) -> RenderResult<FilterSet>;
}

/// Loads a multichannel WAV file, one impulse response per channel
///
/// The channel map comes from the loader itself when one was given, or from a
/// YAML file next to the WAV (`hrir.wav` → `hrir.yaml`).
#[derive(Debug, Clone, Default)]
pub struct WavFilterSetLoader {
    channel_map: Option<ChannelMap>,
}

impl WavFilterSetLoader {
    /// Loader that reads the map from the sidecar file
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader that applies `map` to every file
    pub fn with_channel_map(map: ChannelMap) -> Self {
        Self {
            channel_map: Some(map),
        }
    }

    /// Path of the channel map sidecar for a WAV file
    pub fn sidecar_path(path: &Path) -> PathBuf {
        path.with_extension("yaml")
    }

    fn read_channel_map(path: &Path) -> RenderResult<ChannelMap> {
        let sidecar = Self::sidecar_path(path);
        let contents = std::fs::read_to_string(&sidecar).map_err(|e| RenderError::Load {
            path: sidecar.clone(),
            message: format!("channel map: {}", e),
        })?;
        serde_yaml::from_str(&contents).map_err(|e| RenderError::Load {
            path: sidecar,
            message: format!("channel map: {}", e),
        })
    }
}

impl FilterSetLoader for WavFilterSetLoader {
    fn load(&self, path: &Path) -> RenderResult<FilterSet> {
        let load_err = |message: String| RenderError::Load {
            path: path.to_path_buf(),
            message,
        };

        let reader = WavReader::open(path).map_err(|e| load_err(e.to_string()))?;
        let spec = reader.spec();
        let channel_count = spec.channels as usize;
        if channel_count == 0 {
            return Err(load_err("WAV file has no channels".into()));
        }

        let interleaved: Vec<Sample> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| load_err(e.to_string()))?,
            SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| load_err(e.to_string()))?
            }
        };

        let frames = interleaved.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in interleaved.chunks_exact(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        let channel_map = match &self.channel_map {
            Some(map) => map.clone(),
            None => Self::read_channel_map(path)?,
        };

        if let Some(index) = channel_map.max_filter_index() {
            if index >= channel_count {
                log::warn!(
                    "[FILTER_SET] Channel map of {:?} references response {} but the file has {}",
                    path,
                    index,
                    channel_count
                );
            }
        }

        let set = FilterSet::new(spec.sample_rate, channels, channel_map)?;
        log::info!(
            "[FILTER_SET] Loaded {:?}: {} responses x {} samples @ {}Hz, {} mapped speakers",
            path,
            set.channel_count(),
            set.max_length(),
            set.sample_rate(),
            set.channel_map().len()
        );
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::speaker::{EarPair, SpeakerRole};
    use hound::{WavSpec, WavWriter};

    fn write_wav(path: &Path, spec: WavSpec, frames: &[[f32; 2]]) {
        let mut writer = WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for &s in frame {
                match spec.sample_format {
                    SampleFormat::Float => writer.write_sample(s).unwrap(),
                    SampleFormat::Int => writer.write_sample((s * 32767.0) as i16).unwrap(),
                }
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_float_wav_with_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("hrir.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        write_wav(&wav, spec, &[[1.0, 0.25], [0.5, 0.0]]);
        std::fs::write(dir.path().join("hrir.yaml"), "FC: { left: 0, right: 1 }\n").unwrap();

        let set = WavFilterSetLoader::new().load(&wav).unwrap();
        assert_eq!(set.channel_count(), 2);
        assert_eq!(set.sample_rate(), 44100);
        assert_eq!(set.channel(0), Some(&[1.0, 0.5][..]));
        assert_eq!(set.channel(1), Some(&[0.25, 0.0][..]));
        assert_eq!(
            set.channel_map().get(SpeakerRole::FrontCenter),
            Some(EarPair { left: 0, right: 1 })
        );
    }

    #[test]
    fn test_load_int_wav_with_explicit_map() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("hrir.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        write_wav(&wav, spec, &[[0.5, -0.5]]);

        let map = ChannelMap::interleaved_pairs(&[SpeakerRole::FrontLeft]);
        let set = WavFilterSetLoader::with_channel_map(map).load(&wav).unwrap();
        let left = set.channel(0).unwrap()[0];
        let right = set.channel(1).unwrap()[0];
        assert!((left - 0.5).abs() < 1e-3);
        assert!((right + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_missing_sidecar_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("hrir.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&wav, spec).unwrap();
        writer.write_sample(1.0f32).unwrap();
        writer.finalize().unwrap();

        assert!(matches!(
            WavFilterSetLoader::new().load(&wav),
            Err(RenderError::Load { .. })
        ));
    }

    #[test]
    fn test_filter_set_requires_responses() {
        assert!(FilterSet::new(48000, Vec::new(), ChannelMap::new()).is_err());
        assert!(FilterSet::new(0, vec![vec![1.0]], ChannelMap::new()).is_err());
    }

    #[test]
    fn test_filter_set_rejects_non_finite_coefficients() {
        let map = ChannelMap::interleaved_pairs(&[SpeakerRole::FrontLeft]);
        let result = FilterSet::new(48000, vec![vec![1.0], vec![0.5, f32::NAN]], map.clone());
        assert!(matches!(result, Err(RenderError::InvalidFilterSet(msg)) if msg.contains("1")));
        assert!(FilterSet::new(48000, vec![vec![f32::INFINITY], vec![0.5]], map).is_err());
    }
}
