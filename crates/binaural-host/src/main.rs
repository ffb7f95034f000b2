//! Binaural Host - headless HRIR renderer
//!
//! Captures every channel of the input device, renders them as virtual
//! speakers through the configured HRIR preset and plays the stereo result on
//! a selectable pair of output channels. Runtime control is line-based on
//! stdin (type `help`).
//!
//! ## Command line flags
//!
//! - `--config <path>`: config file (default ~/.config/binaural-host/config.yaml)
//! - `--preset <path>`: HRIR preset, overrides the config
//! - `--range <start>`: first output channel, overrides the config
//! - `--bypass`: start with convolution disabled
//! - `--list-devices`: print capture and playback devices and exit
//! - `--save-config`: write the effective config back before starting

mod commands;
mod config;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use binaural_core::audio::{list_devices, CpalBackend, Direction};
use binaural_core::config::{default_config_path, load_config, save_config};
use binaural_core::engine::{DiagnosticsMonitor, SpatialEngine};
use binaural_core::render::{FilterSetLoader, InputLayout, WavFilterSetLoader};

use commands::{Command, HELP};
use config::{resolve_preset, HostConfig, APP_NAME};

/// Interval between diagnostics checks
const MONITOR_INTERVAL: Duration = Duration::from_millis(250);
/// Minimum time between two diagnostics warnings
const REPORT_INTERVAL: Duration = Duration::from_secs(2);

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if args.iter().any(|arg| arg == "--list-devices") {
        print_devices();
        return Ok(());
    }

    let config_path = flag_value(&args, "--config")
        .map(PathBuf::from)
        .unwrap_or_else(|| default_config_path(APP_NAME));
    let mut config: HostConfig = load_config(&config_path);

    if let Some(preset) = flag_value(&args, "--preset") {
        config.preset = Some(PathBuf::from(preset));
    }
    if let Some(start) = flag_value(&args, "--range") {
        config.output_channel_start = start
            .parse()
            .with_context(|| format!("Invalid --range value: {}", start))?;
    }
    if args.iter().any(|arg| arg == "--bypass") {
        config.convolution_enabled = false;
    }
    if args.iter().any(|arg| arg == "--save-config") {
        save_config(&config, &config_path)?;
    }

    log::info!("binaural-host starting up");
    let backend = CpalBackend::new(config.audio.clone(), config.engine.block_size);
    let mut engine = SpatialEngine::new(config.engine.clone(), Box::new(backend))?;
    engine.set_convolution_enabled(config.convolution_enabled);
    if let Err(e) = engine.set_output_channel_range(config.output_channel_start, 2) {
        log::warn!("Ignoring configured output range: {}", e);
    }

    engine.start().context("Could not open audio devices")?;

    if let Some(preset) = &config.preset {
        if let Err(e) = activate_preset(&engine, &config, preset) {
            log::error!("{:#}", e);
            log::warn!("Passing input through until a preset is loaded");
        }
    } else {
        log::warn!("No preset configured, passing input through (use `load <path>`)");
    }

    let running = Arc::new(AtomicBool::new(true));
    let monitor = spawn_monitor(&engine, running.clone())?;

    println!("{}", HELP);
    run_commands(&mut engine, &config)?;

    running.store(false, Ordering::Relaxed);
    let _ = monitor.join();
    engine.stop();
    log::info!("binaural-host shut down");
    Ok(())
}

fn print_devices() {
    println!("Input devices:");
    for device in list_devices(Direction::Input) {
        println!("  {}", device);
    }
    println!("Output devices:");
    for device in list_devices(Direction::Output) {
        println!("  {}", device);
    }
}

/// Load a preset and wait for the renderer to go live
fn activate_preset(engine: &SpatialEngine, config: &HostConfig, preset: &Path) -> Result<()> {
    let path = resolve_preset(preset);
    let filter_set = WavFilterSetLoader::new()
        .load(&path)
        .with_context(|| format!("Failed to load preset {:?}", path))?;

    let (sample_rate, inputs) = engine
        .device_format()
        .map(|f| (f.sample_rate, f.input_channels))
        .unwrap_or((config.audio.target_sample_rate(), 2));
    let layout = InputLayout::detect(inputs);

    let report = engine
        .activate(Arc::new(filter_set), sample_rate, layout)
        .blocking_recv()
        .context("Preset activator stopped")??;

    log::info!(
        "Preset {:?} active: {} speakers @ {}Hz, latency {} frames (v{})",
        path,
        report.speaker_count,
        report.sample_rate,
        report.latency_frames,
        report.version
    );
    Ok(())
}

fn spawn_monitor(engine: &SpatialEngine, running: Arc<AtomicBool>) -> Result<thread::JoinHandle<()>> {
    let mut monitor = DiagnosticsMonitor::new(engine.diagnostics_handle(), REPORT_INTERVAL);
    thread::Builder::new()
        .name("diagnostics".to_string())
        .spawn(move || {
            while running.load(Ordering::Relaxed) {
                monitor.poll();
                thread::sleep(MONITOR_INTERVAL);
            }
        })
        .context("Failed to spawn diagnostics thread")
}

fn run_commands(engine: &mut SpatialEngine, config: &HostConfig) -> Result<()> {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match command {
            Command::Range(start) => match engine.set_output_channel_range(start, 2) {
                Ok(range) => println!("mix on {}", range),
                Err(e) => println!("{}", e),
            },
            Command::Enable => engine.set_convolution_enabled(true),
            Command::Bypass => engine.set_convolution_enabled(false),
            Command::Load(path) => {
                if let Err(e) = activate_preset(engine, config, &path) {
                    println!("{:#}", e);
                }
            }
            Command::Restart => {
                if let Err(e) = engine.restart() {
                    println!("{}", e);
                }
            }
            Command::Stats => {
                println!("{:?}: {}", engine.state(), engine.diagnostics());
                if let Some(format) = engine.device_format() {
                    println!(
                        "{} in / {} out @ {}Hz, mix on {}, convolution {}",
                        format.input_channels,
                        format.output_channels,
                        format.sample_rate,
                        engine.output_channel_range(),
                        if engine.is_convolution_enabled() { "on" } else { "off" }
                    );
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
        }
    }
    Ok(())
}
