//! Host configuration
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/binaural-host/config.yaml

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use binaural_core::audio::AudioConfig;
use binaural_core::config::default_preset_dir;
use binaural_core::engine::EngineConfig;

pub const APP_NAME: &str = "binaural-host";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Block size and queue settings
    pub engine: EngineConfig,
    /// Device selection
    pub audio: AudioConfig,
    /// HRIR preset activated at startup (WAV with a .yaml channel map)
    pub preset: Option<PathBuf>,
    /// First output channel of the binaural pair
    pub output_channel_start: usize,
    pub convolution_enabled: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            audio: AudioConfig::default(),
            preset: None,
            output_channel_start: 0,
            convolution_enabled: true,
        }
    }
}

/// Resolve a preset given on the command line or in the config
///
/// Bare names that don't exist relative to the working directory are looked
/// up in ~/.config/binaural-host/presets.
pub fn resolve_preset(path: &Path) -> PathBuf {
    resolve_preset_in(path, &default_preset_dir(APP_NAME))
}

fn resolve_preset_in(path: &Path, preset_dir: &Path) -> PathBuf {
    if path.is_absolute() || path.exists() {
        return path.to_path_buf();
    }
    let candidate = preset_dir.join(path);
    if candidate.exists() {
        candidate
    } else {
        path.to_path_buf()
    }
}
