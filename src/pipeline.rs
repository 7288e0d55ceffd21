//! The per-block processing chain: upmix, then rotate
//!
//! [`Pipeline`] owns every buffer and filter it needs, allocated once in
//! [`Pipeline::new`]. [`Pipeline::process`] runs exactly one block and never
//! allocates, locks or logs, so it can be called straight from an audio
//! callback.

use std::sync::Arc;
use std::time::Instant;

use crate::angle::AngleReader;
use crate::block::AudioBlock;
use crate::config::{Config, DegradedOutput};
use crate::error::{Error, Result};
use crate::layout::SpeakerLayout;
use crate::node::{AudioNode, ProcessContext};
use crate::nodes::effect::{Rotator, Upmixer};
use crate::stats::PipelineStats;

/// Stereo in, rotated surround out, one block at a time.
///
/// After every call to [`process`](Self::process), [`output`](Self::output)
/// holds the block to play, whatever the result was: the processed block on
/// success or deadline miss, the degraded replacement on any other error.
pub struct Pipeline {
    ctx: ProcessContext,
    layout: SpeakerLayout,
    /// `None` in stereo mode, where the input goes straight to the rotator
    upmixer: Option<Upmixer>,
    rotator: Rotator,
    upmixed: AudioBlock,
    output: AudioBlock,
    last_good: AudioBlock,
    degraded: DegradedOutput,
    angle: AngleReader,
    stats: Arc<PipelineStats>,
    /// Processing time allowed per block; the block period unless overridden in tests
    deadline_us: u64,
}

impl Pipeline {
    /// Build a pipeline for a validated configuration, reading yaw from `angle`
    pub fn new(config: &Config, angle: AngleReader) -> Result<Self> {
        config.validate()?;

        let sample_rate = config.audio.sample_rate;
        let block_size = config.audio.block_size;
        let layout = SpeakerLayout::new(config.rotation.format);
        let n = layout.num_channels();

        let upmixer = if layout.format().is_stereo() {
            None
        } else {
            Some(Upmixer::new(&layout, sample_rate, &config.upmix)?)
        };
        let rotator = Rotator::new(&layout, config.rotation.stereo_rear_floor)?;

        let ctx = ProcessContext::new(sample_rate, block_size);
        Ok(Self {
            deadline_us: ctx.period_us(),
            ctx,
            layout,
            upmixer,
            rotator,
            upmixed: AudioBlock::new(n, block_size),
            output: AudioBlock::new(n, block_size),
            last_good: AudioBlock::new(n, block_size),
            degraded: config.audio.degraded_output,
            angle,
            stats: Arc::new(PipelineStats::new()),
        })
    }

    #[inline]
    pub fn layout(&self) -> &SpeakerLayout {
        &self.layout
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.layout.num_channels()
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.ctx.block_size
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.ctx.sample_rate
    }

    /// Context used for the most recent block, including the yaw it was rotated by
    #[inline]
    pub fn context(&self) -> &ProcessContext {
        &self.ctx
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// The block to play after the last [`process`](Self::process) or [`emit_degraded`](Self::emit_degraded)
    #[inline]
    pub fn output(&self) -> &AudioBlock {
        &self.output
    }

    /// Process one stereo block of exactly `block_size` frames.
    ///
    /// Recoverable errors are counted in [`PipelineStats`] before being
    /// returned. [`Error::DeadlineMiss`] still leaves the processed block in
    /// [`output`](Self::output); every other error leaves the degraded block.
    pub fn process(&mut self, input: &AudioBlock) -> Result<()> {
        let started = Instant::now();

        // yaw is sampled once and held for the whole block
        self.ctx = self.ctx.with_yaw(self.angle.read());

        match self.run(input) {
            Ok(()) => {
                if self.degraded == DegradedOutput::Repeat {
                    self.last_good.copy_from(&self.output);
                }
            }
            Err(e) => {
                match &e {
                    Error::NumericFault { stage } => {
                        self.stats.record_numeric_fault();
                        // input faults never reached the filters
                        if *stage != "input" {
                            self.reset();
                        }
                    }
                    Error::BlockSizeMismatch { .. } => self.stats.record_size_mismatch(),
                    _ => {}
                }
                self.emit_degraded();
                self.stats.record_block(started.elapsed().as_micros() as u64);
                return Err(e);
            }
        }

        let elapsed_us = started.elapsed().as_micros() as u64;
        self.stats.record_block(elapsed_us);

        if elapsed_us > self.deadline_us {
            self.stats.record_deadline_miss();
            return Err(Error::DeadlineMiss { elapsed_us, period_us: self.deadline_us });
        }
        Ok(())
    }

    fn run(&mut self, input: &AudioBlock) -> Result<()> {
        self.ctx.check_frames(input)?;
        if input.num_channels() != 2 {
            return Err(Error::config(format!("pipeline input must be stereo, got {} channels", input.num_channels())));
        }
        if !input.is_finite() {
            return Err(Error::NumericFault { stage: "input" });
        }

        match self.upmixer.as_mut() {
            Some(upmixer) => {
                upmixer.process(&self.ctx, input, &mut self.upmixed)?;
                if !self.upmixed.is_finite() {
                    return Err(Error::NumericFault { stage: "upmix" });
                }
                self.rotator.process(&self.ctx, &self.upmixed, &mut self.output)
            }
            None => self.rotator.process(&self.ctx, input, &mut self.output),
        }
    }

    /// Replace the output with the configured degraded block
    pub fn emit_degraded(&mut self) {
        match self.degraded {
            DegradedOutput::Silence => self.output.silence(),
            DegradedOutput::Repeat => self.output.copy_from(&self.last_good),
        }
    }

    /// Clear all filter state
    pub fn reset(&mut self) {
        if let Some(upmixer) = self.upmixer.as_mut() {
            upmixer.reset();
        }
        self.rotator.reset();
    }

    #[cfg(test)]
    fn set_deadline_us(&mut self, deadline_us: u64) {
        self.deadline_us = deadline_us;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle::angle_state;
    use crate::layout::SurroundFormat;

    fn config(format: SurroundFormat, block_size: usize) -> Config {
        let mut config = Config::default();
        config.rotation.format = format;
        config.audio.block_size = block_size;
        config
    }

    fn ok_or_late(result: Result<()>) {
        match result {
            Ok(()) | Err(Error::DeadlineMiss { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    fn ramp(frames: usize) -> AudioBlock {
        let left = (0..frames).map(|i| (i as f32 / frames as f32) - 0.5).collect();
        let right = (0..frames).map(|i| 0.3 * (i as f32 * 0.1).sin()).collect();
        AudioBlock::from_channels(vec![left, right]).unwrap()
    }

    #[test]
    fn stereo_mode_at_zero_yaw_passes_input_through() {
        let (_writer, reader) = angle_state(0.85).unwrap();
        let mut pipeline = Pipeline::new(&config(SurroundFormat::Stereo, 64), reader).unwrap();
        let input = ramp(64);
        ok_or_late(pipeline.process(&input));
        assert_eq!(pipeline.output(), &input);
    }

    #[test]
    fn yaw_is_read_at_block_start() {
        let (mut writer, reader) = angle_state(0.0).unwrap();
        let mut pipeline = Pipeline::new(&config(SurroundFormat::Surround71, 64), reader).unwrap();
        writer.update(42.0);
        ok_or_late(pipeline.process(&ramp(64)));
        assert_eq!(pipeline.context().yaw, 42.0);
    }

    #[test]
    fn non_finite_input_yields_silence_and_recovers() {
        let (_writer, reader) = angle_state(0.85).unwrap();
        let mut pipeline = Pipeline::new(&config(SurroundFormat::Surround51, 64), reader).unwrap();
        let stats = pipeline.stats();

        let mut bad = ramp(64);
        bad.channel_mut(1)[10] = f32::INFINITY;
        assert!(matches!(pipeline.process(&bad), Err(Error::NumericFault { stage: "input" })));
        assert!(pipeline.output().channels().all(|c| c.iter().all(|&s| s == 0.0)));
        assert_eq!(stats.snapshot().numeric_faults, 1);

        ok_or_late(pipeline.process(&ramp(64)));
        assert!(pipeline.output().is_finite());
        assert!(pipeline.output().rms(0) > 0.0);
    }

    #[test]
    fn repeat_mode_replays_last_good_block() {
        let (_writer, reader) = angle_state(0.85).unwrap();
        let mut cfg = config(SurroundFormat::Surround51, 64);
        cfg.audio.degraded_output = DegradedOutput::Repeat;
        let mut pipeline = Pipeline::new(&cfg, reader).unwrap();

        ok_or_late(pipeline.process(&ramp(64)));
        let good = pipeline.output().clone();

        assert!(pipeline.process(&AudioBlock::new(2, 32)).is_err());
        assert_eq!(pipeline.output(), &good);
        assert_eq!(pipeline.stats().snapshot().size_mismatches, 1);
    }

    #[test]
    fn late_block_is_counted_and_still_delivered() {
        let cfg = config(SurroundFormat::Surround71, 512);
        let input = ramp(512);

        let (_writer, reader) = angle_state(0.85).unwrap();
        let mut reference = Pipeline::new(&cfg, reader).unwrap();
        ok_or_late(reference.process(&input));

        let (_writer, reader) = angle_state(0.85).unwrap();
        let mut late = Pipeline::new(&cfg, reader).unwrap();
        late.set_deadline_us(0);
        let stats = late.stats();

        assert!(matches!(late.process(&input), Err(Error::DeadlineMiss { period_us: 0, .. })));
        assert_eq!(stats.snapshot().deadline_misses, 1);
        assert_eq!(stats.snapshot().blocks, 1);
        assert_eq!(late.output(), reference.output());
        assert!(late.output().rms(0) > 0.0);
    }

    #[test]
    fn wrong_input_shape_is_rejected() {
        let (_writer, reader) = angle_state(0.85).unwrap();
        let mut pipeline = Pipeline::new(&config(SurroundFormat::Surround71, 64), reader).unwrap();
        assert!(matches!(
            pipeline.process(&AudioBlock::new(2, 65)),
            Err(Error::BlockSizeMismatch { expected: 64, actual: 65 })
        ));
        assert!(matches!(pipeline.process(&AudioBlock::new(3, 64)), Err(Error::Configuration(_))));
    }

    #[test]
    fn invalid_config_fails_construction() {
        let (_writer, reader) = angle_state(0.85).unwrap();
        let mut cfg = Config::default();
        cfg.audio.block_size = 3;
        assert!(matches!(Pipeline::new(&cfg, reader), Err(Error::Configuration(_))));
    }
}
