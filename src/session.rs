//! High-level session API
//!
//! A [`Session`] is one running instance: capture stream, bridge, playback
//! stream and tracker thread, all built from one [`Config`].
//!
//! # Example
//!
//! ```no_run
//! use yawfield::{Config, Session, TrackerSource};
//!
//! let config = Config::load("yawfield.toml")?;
//! let source = TrackerSource::from_config(&config.tracking);
//! let session = Session::start(config, source)?;
//!
//! println!("yaw: {:.1}°", session.angle().read());
//! session.stop()?;
//! # Ok::<(), yawfield::Error>(())
//! ```

use std::sync::Arc;

use crate::angle::{angle_state, AngleMonitor};
use crate::bridge::{Bridge, BridgeInput};
use crate::config::Config;
use crate::device::{CpalDevice, Direction};
use crate::error::Result;
use crate::nodes::sink::{CpalSink, CpalSource, RtrbSink};
use crate::nodes::source::{Sine, StaticHandle, TrackerSource};
use crate::pipeline::Pipeline;
use crate::stats::PipelineStats;
use crate::tracker::{spawn_tracker, TrackerThread};

/// A running upmix + rotation session.
///
/// Everything that can fail is checked in [`start`](Self::start). Once it
/// returns, no error stops audio; faults only show up in [`stats`](Self::stats).
pub struct Session {
    config: Config,
    angle: AngleMonitor,
    stats: Arc<PipelineStats>,
    static_handle: Option<StaticHandle>,
    tracker: TrackerThread,
    playback: CpalSink,
    capture: Option<CpalSource>,
}

impl Session {
    /// Start processing audio from the configured capture device
    pub fn start(config: Config, source: TrackerSource) -> Result<Self> {
        Self::launch(config, source, None)
    }

    /// Start with an internal in-phase test tone at `frequency` Hz instead of capture
    pub fn start_with_tone(config: Config, source: TrackerSource, frequency: f32) -> Result<Self> {
        Self::launch(config, source, Some(frequency))
    }

    fn launch(config: Config, source: TrackerSource, tone: Option<f32>) -> Result<Self> {
        config.validate()?;
        let audio = &config.audio;
        let format = config.rotation.format;

        let output = CpalDevice::find(Direction::Output, audio.output_device.as_ref())?;
        output.caps().validate_output(format, audio.sample_rate)?;

        let (writer, reader) = angle_state(config.rotation.smoothing)?;
        let angle = reader.monitor();
        let pipeline = Pipeline::new(&config, reader)?;
        let stats = pipeline.stats();

        let (input, capture_parts) = match tone {
            Some(frequency) => (BridgeInput::Tone(Sine::new(frequency)), None),
            None => {
                let device = CpalDevice::find(Direction::Input, audio.input_device.as_ref())?;
                device.caps().validate_input(audio.sample_rate)?;
                // the backlog the bridge tolerates, plus slack for one block in flight each side
                let capacity = audio.block_size * (audio.max_queued_blocks + 2);
                let (sink, consumer) = RtrbSink::with_capacity(capacity, stats.clone());
                (BridgeInput::Capture(consumer), Some((device, sink)))
            }
        };

        let bridge = Bridge::new(pipeline, input, audio.max_queued_blocks);
        let static_handle = source.static_handle();
        let tracker = spawn_tracker(source, writer, config.tracking.update_rate_hz)?;

        let playback = CpalSink::new(&output, bridge)?;
        let capture = match capture_parts {
            Some((device, sink)) => Some(CpalSource::new(&device, sink, audio.sample_rate, audio.block_size)?),
            None => None,
        };

        tracing::info!(
            %format,
            sample_rate = audio.sample_rate,
            block_size = audio.block_size,
            output = output.name(),
            output_channels = playback.channels(),
            buffer_frames = ?playback.buffer_size(),
            tone = tone.is_some(),
            "session started"
        );

        Ok(Self { config, angle, stats, static_handle, tracker, playback, capture })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Observer view of the smoothed yaw the audio path is using
    #[inline]
    pub fn angle(&self) -> &AngleMonitor {
        &self.angle
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Make the current head direction the new forward
    pub fn recenter(&self) {
        self.tracker.recenter();
    }

    /// Set the angle of a static source. Returns false for other sources.
    pub fn set_static_angle(&self, degrees: f32) -> bool {
        match &self.static_handle {
            Some(handle) => {
                handle.set(degrees);
                true
            }
            None => false,
        }
    }

    /// Nominal latency through the bridge: one block buffered on each side
    pub fn latency_ms(&self) -> f32 {
        2.0 * self.config.audio.block_size as f32 * 1000.0 / self.config.audio.sample_rate as f32
    }

    /// Stop the streams and the tracker thread
    pub fn stop(mut self) -> Result<()> {
        if let Some(capture) = &self.capture {
            capture.pause()?;
        }
        self.playback.pause()?;
        self.tracker.stop();

        let stats = self.stats.snapshot();
        tracing::info!(
            blocks = stats.blocks,
            faults = stats.faults(),
            worst_block_us = stats.worst_block_us,
            "session stopped"
        );
        Ok(())
    }
}
