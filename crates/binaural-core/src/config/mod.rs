//! Configuration infrastructure
//!
//! Generic YAML loading/saving plus the standard paths applications use.
//! Section types live next to what they configure:
//! [`EngineConfig`](crate::engine::EngineConfig) and
//! [`AudioConfig`](crate::audio::AudioConfig).
//!
//! ```ignore
//! use binaural_core::config::{default_config_path, load_config, save_config};
//!
//! let path = default_config_path("binaural-host");
//! let config: MyAppConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{default_config_path, default_preset_dir};
