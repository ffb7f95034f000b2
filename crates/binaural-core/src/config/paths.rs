//! Standard locations for configuration and presets

use std::path::PathBuf;

fn config_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
}

/// Config file for an application
///
/// Returns: `~/.config/{app}/config.yaml`
pub fn default_config_path(app: &str) -> PathBuf {
    config_root().join(app).join("config.yaml")
}

/// Directory searched for HRIR presets given by bare file name
///
/// Returns: `~/.config/{app}/presets`
pub fn default_preset_dir(app: &str) -> PathBuf {
    config_root().join(app).join("presets")
}
