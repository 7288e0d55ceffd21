//! Sine test tone

use crate::block::AudioBlock;
use crate::error::Result;
use crate::node::{AudioNode, ProcessContext};

/// A sine oscillator written identically to every output channel.
///
/// Fed in place of the capture stream, it gives a fully in-phase stereo
/// signal, which the upmixer should place in the center channel.
pub struct Sine {
    frequency: f32,
    phase: f32,
    amplitude: f32,
}

impl Sine {
    /// A stereo tone at `frequency` Hz
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency: frequency.max(0.0),
            phase: 0.0,
            amplitude: 0.25, // -12dB, safe default
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }
}

impl AudioNode for Sine {
    fn process(&mut self, ctx: &ProcessContext, _input: &AudioBlock, output: &mut AudioBlock) -> Result<()> {
        ctx.check_frames(output)?;

        let phase_inc = self.frequency / ctx.sample_rate as f32;
        let amplitude = self.amplitude;
        let mut channels = output.channels_mut();

        let Some(first) = channels.next() else {
            return Ok(());
        };
        for sample in first.iter_mut() {
            *sample = (self.phase * core::f32::consts::TAU).sin() * amplitude;

            self.phase += phase_inc;
            // Branchless phase wrap (phase is always positive)
            self.phase -= (self.phase >= 1.0) as u32 as f32;
        }

        for buffer in channels {
            buffer.copy_from_slice(first);
        }
        Ok(())
    }

    #[inline]
    fn num_inputs(&self) -> usize { 0 }

    #[inline]
    fn num_outputs(&self) -> usize { 2 }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}
