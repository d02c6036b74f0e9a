//! Output device enumeration
//!
//! Devices are selected by their index among the host's output-capable
//! devices, in the order the host enumerates them.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::error::AudioError;

/// Wrapper around cpal device
pub struct AudioDevice {
    inner: cpal::Device,
    pub index: usize,
    pub name: String,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device, index: usize) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self {
            inner: device,
            index,
            name,
        }
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }

    /// Get supported output configurations
    pub fn supported_output_configs(&self) -> Result<Vec<cpal::SupportedStreamConfigRange>, AudioError> {
        self.inner
            .supported_output_configs()
            .map(|iter| iter.collect())
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))
    }

    /// Pick a configuration running at `sample_rate`, preferring i16 and the
    /// fewest channels.
    pub fn output_config_for_rate(&self, sample_rate: u32) -> Result<cpal::SupportedStreamConfig, AudioError> {
        let rate = cpal::SampleRate(sample_rate);
        let mut candidates: Vec<_> = self
            .supported_output_configs()?
            .into_iter()
            .filter(|c| c.min_sample_rate() <= rate && rate <= c.max_sample_rate())
            .collect();
        candidates.sort_by_key(|c| (c.sample_format() != cpal::SampleFormat::I16, c.channels()));

        candidates
            .into_iter()
            .next()
            .map(|c| c.with_sample_rate(rate))
            .ok_or_else(|| {
                AudioError::UnsupportedFormat(format!("{} does not support {} Hz output", self.name, sample_rate))
            })
    }
}

/// Description of an output device
#[derive(Debug, Clone, Serialize)]
pub struct OutputDeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// List all output-capable devices with their selector index
pub fn list_output_devices() -> Vec<OutputDeviceInfo> {
    let host = cpal::default_host();
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    if let Ok(output_devices) = host.output_devices() {
        for (index, device) in output_devices.enumerate() {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let is_default = default_output_name.as_ref() == Some(&name);
            let (sample_rates, channels) = get_device_capabilities(&device);

            devices.push(OutputDeviceInfo {
                index,
                name,
                is_default,
                sample_rates,
                channels,
            });
        }
    }
    devices
}

/// Get device capabilities
fn get_device_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    if let Ok(configs) = device.supported_output_configs() {
        for config in configs {
            for rate_val in [8000u32, 16000, 22050, 32000, 44100, 48000, 96000] {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate() && rate <= config.max_sample_rate() && !sample_rates.contains(&rate_val) {
                    sample_rates.push(rate_val);
                }
            }

            let ch = config.channels();
            if !channels.contains(&ch) {
                channels.push(ch);
            }
        }
    }

    sample_rates.sort();
    channels.sort();

    (sample_rates, channels)
}

/// Get an output device by its index, or the default device for `None`
pub fn get_output_device(index: Option<usize>) -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();

    match index {
        Some(index) => host
            .output_devices()
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?
            .nth(index)
            .map(|d| AudioDevice::from_cpal(d, index))
            .ok_or_else(|| AudioError::DeviceNotFound(format!("no output device at index {}", index))),
        None => {
            let device = host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))?;
            let name = device.name().ok();
            let index = host
                .output_devices()
                .ok()
                .and_then(|mut devices| devices.position(|d| d.name().ok() == name))
                .unwrap_or(0);
            Ok(AudioDevice::from_cpal(device, index))
        }
    }
}
