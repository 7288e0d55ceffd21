//! Audio device discovery, selection and startup validation.
//!
//! [`DeviceCaps`] is the capability metadata the session checks before any
//! stream is built. It is plain data, so selection and validation work (and are
//! tested) without audio hardware. [`CpalDevice`] wraps a real cpal device
//! together with its caps.
//!
//! # Example: List devices
//!
//! ```no_run
//! use yawfield::{CpalDevice, Direction};
//!
//! for (i, device) in CpalDevice::list(Direction::Output).iter().enumerate() {
//!     println!("[{}] {} ({} ch max)", i, device.name(), device.caps().max_channels);
//! }
//! ```

use core::fmt;

use crate::config::DeviceSelector;
use crate::error::{Error, Result};
use crate::layout::SurroundFormat;

#[cfg(feature = "cpal_io")]
use cpal::traits::{DeviceTrait, HostTrait};

/// Capture or playback side
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Input => "input",
            Direction::Output => "output",
        })
    }
}

/// Inclusive range of supported sample rates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateRange {
    pub min: u32,
    pub max: u32,
}

impl RateRange {
    #[inline]
    pub fn contains(&self, rate: u32) -> bool {
        (self.min..=self.max).contains(&rate)
    }
}

/// What a device can do, as reported by the backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCaps {
    pub name: String,
    /// Largest channel count of any supported configuration
    pub max_channels: u16,
    pub sample_rates: Vec<RateRange>,
}

impl DeviceCaps {
    pub fn supports_rate(&self, rate: u32) -> bool {
        self.sample_rates.iter().any(|r| r.contains(rate))
    }

    /// The playback device must carry every channel of `format` at `sample_rate`
    pub fn validate_output(&self, format: SurroundFormat, sample_rate: u32) -> Result<()> {
        if (self.max_channels as usize) < format.channels() {
            return Err(Error::config(format!(
                "output device '{}' has {} channels, {format} needs {}",
                self.name,
                self.max_channels,
                format.channels()
            )));
        }
        self.validate_rate(sample_rate)
    }

    /// The capture device needs at least one channel at `sample_rate`
    pub fn validate_input(&self, sample_rate: u32) -> Result<()> {
        if self.max_channels == 0 {
            return Err(Error::config(format!("input device '{}' has no channels", self.name)));
        }
        self.validate_rate(sample_rate)
    }

    fn validate_rate(&self, sample_rate: u32) -> Result<()> {
        if !self.supports_rate(sample_rate) {
            return Err(Error::config(format!(
                "device '{}' does not support {sample_rate} Hz (no sample-rate conversion is done)",
                self.name
            )));
        }
        Ok(())
    }
}

impl fmt::Display for DeviceCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} ch", self.name, self.max_channels)?;
        for range in &self.sample_rates {
            if range.min == range.max {
                write!(f, ", {} Hz", range.min)?;
            } else {
                write!(f, ", {}-{} Hz", range.min, range.max)?;
            }
        }
        f.write_str(")")
    }
}

/// Pick a device by enumeration index or case-insensitive name substring.
///
/// Returns the index into `devices`.
pub fn select(devices: &[DeviceCaps], selector: &DeviceSelector) -> Result<usize> {
    match selector {
        DeviceSelector::Index(i) if *i < devices.len() => Ok(*i),
        DeviceSelector::Index(i) => Err(Error::Device(format!(
            "device index {i} out of range ({} devices)",
            devices.len()
        ))),
        DeviceSelector::Name(name) => {
            let needle = name.to_lowercase();
            devices
                .iter()
                .position(|d| d.name.to_lowercase().contains(&needle))
                .ok_or_else(|| Error::Device(format!("no device matching '{name}'")))
        }
    }
}

/// A discovered cpal device.
///
/// Use [`CpalDevice::find`] to resolve a configured selector (or the host
/// default) and [`CpalDevice::list`] to enumerate.
#[cfg(feature = "cpal_io")]
pub struct CpalDevice {
    device: cpal::Device,
    direction: Direction,
    caps: DeviceCaps,
}

#[cfg(feature = "cpal_io")]
impl CpalDevice {
    fn from_device(device: cpal::Device, direction: Direction) -> Option<Self> {
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        let ranges: Vec<cpal::SupportedStreamConfigRange> = match direction {
            Direction::Input => device.supported_input_configs().ok()?.collect(),
            Direction::Output => device.supported_output_configs().ok()?.collect(),
        };
        let caps = DeviceCaps {
            name,
            max_channels: ranges.iter().map(|r| r.channels()).max().unwrap_or(0),
            sample_rates: ranges
                .iter()
                .map(|r| RateRange { min: r.min_sample_rate().0, max: r.max_sample_rate().0 })
                .collect(),
        };
        Some(Self { device, direction, caps })
    }

    /// The host's default device for `direction`
    pub fn default_for(direction: Direction) -> Option<Self> {
        let host = cpal::default_host();
        let device = match direction {
            Direction::Input => host.default_input_device()?,
            Direction::Output => host.default_output_device()?,
        };
        Self::from_device(device, direction)
    }

    /// All devices for `direction`. Empty if enumeration fails.
    pub fn list(direction: Direction) -> Vec<Self> {
        let host = cpal::default_host();
        let devices = match direction {
            Direction::Input => host.input_devices().map(|d| d.collect::<Vec<_>>()),
            Direction::Output => host.output_devices().map(|d| d.collect::<Vec<_>>()),
        };
        match devices {
            Ok(devices) => devices.into_iter().filter_map(|d| Self::from_device(d, direction)).collect(),
            Err(e) => {
                tracing::warn!(%direction, "device enumeration failed: {e}");
                Vec::new()
            }
        }
    }

    /// Resolve `selector`, or the host default when it is `None`
    pub fn find(direction: Direction, selector: Option<&DeviceSelector>) -> Result<Self> {
        let Some(selector) = selector else {
            return Self::default_for(direction)
                .ok_or_else(|| Error::Device(format!("no default {direction} device")));
        };

        let mut devices = Self::list(direction);
        let caps: Vec<DeviceCaps> = devices.iter().map(|d| d.caps.clone()).collect();
        let index = select(&caps, selector)?;
        Ok(devices.swap_remove(index))
    }

    pub fn name(&self) -> &str {
        &self.caps.name
    }

    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn device(&self) -> &cpal::Device {
        &self.device
    }

    /// Pick a stream configuration with at least `min_channels` channels at `sample_rate`.
    ///
    /// Prefers f32 samples and the fewest channels that fit, and asks for a
    /// fixed `block_size` buffer when the device allows one.
    pub fn stream_config(
        &self,
        min_channels: usize,
        sample_rate: u32,
        block_size: usize,
    ) -> Result<(cpal::StreamConfig, cpal::SampleFormat)> {
        let ranges: Vec<cpal::SupportedStreamConfigRange> = match self.direction {
            Direction::Input => self.device.supported_input_configs().map(|r| r.collect()),
            Direction::Output => self.device.supported_output_configs().map(|r| r.collect()),
        }
        .map_err(|e| Error::Device(format!("cannot query '{}': {e}", self.name())))?;

        let chosen = ranges
            .iter()
            .filter(|r| r.channels() as usize >= min_channels)
            .filter(|r| r.min_sample_rate().0 <= sample_rate && r.max_sample_rate().0 >= sample_rate)
            .min_by_key(|r| (r.sample_format() != cpal::SampleFormat::F32, r.channels()))
            .ok_or_else(|| {
                Error::config(format!(
                    "{} device '{}' has no configuration with {min_channels}+ channels at {sample_rate} Hz",
                    self.direction,
                    self.name()
                ))
            })?;

        let buffer_size = match chosen.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => {
                let target = (block_size as u32).clamp(*min, *max);
                tracing::debug!(target, min, max, "buffer size negotiation");
                cpal::BufferSize::Fixed(target)
            }
            cpal::SupportedBufferSize::Unknown => cpal::BufferSize::Default,
        };

        let config = cpal::StreamConfig {
            channels: chosen.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size,
        };
        Ok((config, chosen.sample_format()))
    }
}
