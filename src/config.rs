//! Session configuration (`yawfield.toml`)
//!
//! Every field has a default, so an empty or missing file gives a working 7.1
//! setup on the default devices. [`Config::validate`] runs once at startup;
//! nothing is re-validated while streams are running.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layout::SurroundFormat;

/// Complete session configuration, one section per TOML table
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub rotation: RotationConfig,
    pub upmix: UpmixConfig,
    pub tracking: TrackingConfig,
}

/// A device picked by enumeration index or by name substring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceSelector {
    Index(usize),
    Name(String),
}

/// What the bridge emits when it has no good block to play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradedOutput {
    #[default]
    Silence,
    /// Re-emit the previous good block
    Repeat,
}

/// Audio stream settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 48000)
    pub sample_rate: u32,
    /// Frames per processing block (default: 512)
    pub block_size: usize,
    /// Capture device; host default when unset
    pub input_device: Option<DeviceSelector>,
    /// Playback device; host default when unset
    pub output_device: Option<DeviceSelector>,
    /// Capture backlog, in blocks, before stale blocks are dropped (default: 4)
    pub max_queued_blocks: usize,
    pub degraded_output: DegradedOutput,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
            input_device: None,
            output_device: None,
            max_queued_blocks: 4,
            degraded_output: DegradedOutput::Silence,
        }
    }
}

/// Rotation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    pub format: SurroundFormat,
    /// EMA smoothing factor α, `0 <= α < 1` (default: 0.85)
    pub smoothing: f32,
    /// Level of stereo sources rotated fully behind the listener; 1.0 disables
    pub stereo_rear_floor: f32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            format: SurroundFormat::Surround71,
            smoothing: 0.85,
            stereo_rear_floor: 0.2,
        }
    }
}

/// Upmixer tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpmixConfig {
    pub lfe_cutoff_hz: f32,
    /// Sub level; 0 silences the LFE channel
    pub lfe_level: f32,
    pub surround_delay_ms: f32,
    pub rear_delay_ms: f32,
}

impl Default for UpmixConfig {
    fn default() -> Self {
        Self {
            lfe_cutoff_hz: 80.0,
            lfe_level: 1.0,
            surround_delay_ms: 5.0,
            rear_delay_ms: 10.0,
        }
    }
}

/// Which angle source drives the rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    /// Continuous rotation at a fixed rate
    #[default]
    Rotate,
    /// Sinusoidal sweep around the front
    Sweep,
    /// Manually set angle
    Static,
}

/// Angle source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub mode: TrackingMode,
    /// How often the angle source is polled, in Hz
    pub update_rate_hz: f32,
    pub rotate_degrees_per_second: f32,
    pub sweep_amplitude_degrees: f32,
    /// Sweep angular frequency in radians per second
    pub sweep_rate: f32,
    pub static_angle: f32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            mode: TrackingMode::Rotate,
            update_rate_hz: 50.0,
            rotate_degrees_per_second: 30.0,
            sweep_amplitude_degrees: 180.0,
            sweep_rate: 0.5,
            static_angle: 0.0,
        }
    }
}

impl Config {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config");
                Self::from_toml_str(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::config(format!("malformed config: {e}")))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(format!("cannot serialize config: {e}")))
    }

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if !(8000..=192_000).contains(&audio.sample_rate) {
            return Err(Error::config(format!("sample_rate {} outside 8000..=192000", audio.sample_rate)));
        }
        if !(16..=8192).contains(&audio.block_size) {
            return Err(Error::config(format!("block_size {} outside 16..=8192", audio.block_size)));
        }
        if audio.max_queued_blocks == 0 {
            return Err(Error::config("max_queued_blocks must be at least 1"));
        }

        let rotation = &self.rotation;
        if !(0.0..1.0).contains(&rotation.smoothing) {
            return Err(Error::config(format!("smoothing {} outside [0, 1)", rotation.smoothing)));
        }
        if !(0.0..=1.0).contains(&rotation.stereo_rear_floor) {
            return Err(Error::config(format!(
                "stereo_rear_floor {} outside [0, 1]",
                rotation.stereo_rear_floor
            )));
        }

        let upmix = &self.upmix;
        let nyquist = audio.sample_rate as f32 / 2.0;
        if !(upmix.lfe_cutoff_hz > 0.0 && upmix.lfe_cutoff_hz < nyquist) {
            return Err(Error::config(format!(
                "lfe_cutoff_hz {} must be between 0 and {nyquist}",
                upmix.lfe_cutoff_hz
            )));
        }
        if !(upmix.lfe_level >= 0.0 && upmix.lfe_level.is_finite()) {
            return Err(Error::config(format!("lfe_level {} must be >= 0", upmix.lfe_level)));
        }
        for (name, ms) in [("surround_delay_ms", upmix.surround_delay_ms), ("rear_delay_ms", upmix.rear_delay_ms)] {
            if !(0.0..1000.0).contains(&ms) {
                return Err(Error::config(format!("{name} {ms} outside [0, 1000)")));
            }
        }

        let tracking = &self.tracking;
        if !(tracking.update_rate_hz > 0.0 && tracking.update_rate_hz.is_finite()) {
            return Err(Error::config(format!("update_rate_hz {} must be > 0", tracking.update_rate_hz)));
        }
        let finite = [
            ("rotate_degrees_per_second", tracking.rotate_degrees_per_second),
            ("sweep_amplitude_degrees", tracking.sweep_amplitude_degrees),
            ("sweep_rate", tracking.sweep_rate),
            ("static_angle", tracking.static_angle),
        ];
        if let Some((name, _)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::config(format!("{name} must be finite")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.rotation.format, SurroundFormat::Surround71);
        config.validate().unwrap();
    }

    #[test]
    fn parses_full_file() {
        let config = Config::from_toml_str(
            r#"
            [audio]
            sample_rate = 44100
            block_size = 256
            input_device = "CABLE Output"
            output_device = 3
            degraded_output = "repeat"

            [rotation]
            format = "5.1"
            smoothing = 0.7

            [upmix]
            lfe_level = 0.0

            [tracking]
            mode = "sweep"
            "#,
        )
        .unwrap();

        assert_eq!(config.audio.block_size, 256);
        assert_eq!(config.audio.input_device, Some(DeviceSelector::Name("CABLE Output".into())));
        assert_eq!(config.audio.output_device, Some(DeviceSelector::Index(3)));
        assert_eq!(config.audio.degraded_output, DegradedOutput::Repeat);
        assert_eq!(config.audio.max_queued_blocks, 4);
        assert_eq!(config.rotation.format, SurroundFormat::Surround51);
        assert_eq!(config.upmix.lfe_cutoff_hz, 80.0);
        assert_eq!(config.tracking.mode, TrackingMode::Sweep);
        config.validate().unwrap();
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        assert!(matches!(Config::from_toml_str("[rotation]\nformat = \"9.1\""), Err(Error::Configuration(_))));
        assert!(matches!(Config::from_toml_str("audio = 3"), Err(Error::Configuration(_))));
    }

    #[test]
    fn each_invalid_field_is_rejected() {
        let cases: &[fn(&mut Config)] = &[
            |c| c.audio.sample_rate = 4000,
            |c| c.audio.sample_rate = 384_000,
            |c| c.audio.block_size = 8,
            |c| c.audio.block_size = 16_384,
            |c| c.audio.max_queued_blocks = 0,
            |c| c.rotation.smoothing = 1.0,
            |c| c.rotation.smoothing = -0.1,
            |c| c.rotation.stereo_rear_floor = 1.5,
            |c| c.upmix.lfe_cutoff_hz = 0.0,
            |c| c.upmix.lfe_cutoff_hz = 30_000.0,
            |c| c.upmix.lfe_level = -1.0,
            |c| c.upmix.surround_delay_ms = -1.0,
            |c| c.upmix.rear_delay_ms = 1000.0,
            |c| c.tracking.update_rate_hz = 0.0,
            |c| c.tracking.static_angle = f32::NAN,
        ];

        for (i, mutate) in cases.iter().enumerate() {
            let mut config = Config::default();
            mutate(&mut config);
            assert!(
                matches!(config.validate(), Err(Error::Configuration(_))),
                "case {i} should fail validation: {config:?}"
            );
        }
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(missing, Config::default());

        let path = dir.path().join("yawfield.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[rotation]\nformat = \"stereo\"").unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.rotation.format, SurroundFormat::Stereo);
    }

    #[test]
    fn serialized_config_loads_back() {
        let mut config = Config::default();
        config.audio.output_device = Some(DeviceSelector::Name("Speakers".into()));
        config.tracking.mode = TrackingMode::Static;
        let text = config.to_toml_string().unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }
}
