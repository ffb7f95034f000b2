//! CPAL device lookup and format negotiation

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{HostId, SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Display name for a host id ("ALSA", "JACK", "CoreAudio", ...)
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn devices_of(host: &cpal::Host, direction: Direction) -> Option<Vec<cpal::Device>> {
    let devices = match direction {
        Direction::Input => host.input_devices().map(|d| d.collect()),
        Direction::Output => host.output_devices().map(|d| d.collect()),
    };
    match devices {
        Ok(devices) => Some(devices),
        Err(e) => {
            log::debug!("[CPAL] Could not enumerate {} devices: {}", direction.label(), e);
            None
        }
    }
}

/// Resolve a device: the configured one, or the default host's default
pub fn find_device(id: Option<&DeviceId>, direction: Direction) -> AudioResult<cpal::Device> {
    let Some(id) = id else {
        let host = cpal::default_host();
        let device = match direction {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        };
        return device.ok_or(AudioError::NoDefaultDevice(direction.label()));
    };

    for host_id in cpal::available_hosts() {
        if let Some(host_filter) = &id.host {
            if &host_name(host_id) != host_filter {
                continue;
            }
        }
        let Ok(host) = cpal::host_from_id(host_id) else {
            continue;
        };
        if let Some(devices) = devices_of(&host, direction) {
            if let Some(device) = devices
                .into_iter()
                .find(|d| d.name().ok().as_deref() == Some(id.name.as_str()))
            {
                return Ok(device);
            }
        }
    }

    Err(AudioError::DeviceNotFound(id.to_string()))
}

/// Names of all devices in one direction, across hosts
pub fn list_devices(direction: Direction) -> Vec<DeviceId> {
    let mut found = Vec::new();
    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            continue;
        };
        for device in devices_of(&host, direction).unwrap_or_default() {
            if let Ok(name) = device.name() {
                found.push(DeviceId::with_host(name, host_name(host_id)));
            }
        }
    }
    found
}

/// Pick an f32 stream configuration at `sample_rate`
///
/// Falls back to the best f32 configuration's maximum rate when the device
/// cannot run at the requested one.
pub fn negotiate_config(
    device: &cpal::Device,
    direction: Direction,
    sample_rate: u32,
) -> AudioResult<SupportedStreamConfig> {
    let ranges: Vec<SupportedStreamConfigRange> = match direction {
        Direction::Input => device
            .supported_input_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect(),
        Direction::Output => device
            .supported_output_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect(),
    };

    let f32_ranges: Vec<&SupportedStreamConfigRange> = ranges
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();
    if f32_ranges.is_empty() {
        return Err(AudioError::UnsupportedFormat(format!(
            "{} device offers no f32 configuration",
            direction.label()
        )));
    }

    let in_range = |c: &&&SupportedStreamConfigRange| {
        sample_rate >= c.min_sample_rate().0 && sample_rate <= c.max_sample_rate().0
    };

    // Widest channel set that runs at the requested rate
    if let Some(best) = f32_ranges.iter().filter(in_range).max_by_key(|c| c.channels()) {
        return Ok((*best).clone().with_sample_rate(cpal::SampleRate(sample_rate)));
    }

    let fallback = f32_ranges
        .iter()
        .max_by_key(|c| c.channels())
        .ok_or_else(|| AudioError::ConfigError("no configuration".into()))?;
    log::warn!(
        "[CPAL] {} device doesn't support {}Hz, falling back to {}Hz",
        direction.label(),
        sample_rate,
        fallback.max_sample_rate().0
    );
    Ok((*fallback).clone().with_max_sample_rate())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_listing_does_not_fail() {
        // May be empty on CI machines without audio hardware
        let outputs = list_devices(Direction::Output);
        for device in &outputs {
            println!("  - {}", device);
        }
    }

    #[test]
    fn test_unknown_device_is_reported() {
        let id = DeviceId::with_host("no-such-device", "no-such-host");
        assert!(matches!(
            find_device(Some(&id), Direction::Output),
            Err(AudioError::DeviceNotFound(_))
        ));
    }
}
