//! Core node trait and context types.

use crate::block::AudioBlock;
use crate::error::{Error, Result};

/// Information available while processing one block.
///
/// Built by the pipeline at the start of every block. The yaw is read from the
/// [`AngleReader`](crate::AngleReader) exactly once per block and held fixed
/// for all of its samples.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProcessContext {
    /// Sample rate of the session in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of frames per block
    pub block_size: usize,
    /// Smoothed head yaw in degrees, `[0, 360)`
    pub yaw: f32,
}

impl ProcessContext {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self { sample_rate, block_size, yaw: 0.0 }
    }

    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.yaw = yaw;
        self
    }

    /// Duration of one block in microseconds
    pub fn period_us(&self) -> u64 {
        (self.block_size as u64 * 1_000_000) / self.sample_rate.max(1) as u64
    }

    /// Fails with [`Error::BlockSizeMismatch`] unless `block` holds exactly `block_size` frames
    #[inline]
    pub fn check_frames(&self, block: &AudioBlock) -> Result<()> {
        if block.frames() != self.block_size {
            return Err(Error::BlockSizeMismatch {
                expected: self.block_size,
                actual: block.frames(),
            });
        }
        Ok(())
    }
}

/// A processing stage in the rotation pipeline.
///
/// Stages are driven synchronously from the real-time callback, once per block:
/// - **Sources** generate audio (0 inputs), e.g. the test tone
/// - **Effects** map an input block to an output block, e.g. the upmixer and rotator
///
/// Implementations must not allocate, lock or block inside [`process`](Self::process).
/// Any state they carry (filters, delay lines) persists from block to block.
pub trait AudioNode: Send + 'static {
    /// Process one block.
    ///
    /// `input` has [`num_inputs`](Self::num_inputs) channels (ignored by sources),
    /// `output` has [`num_outputs`](Self::num_outputs) channels. Both hold
    /// `ctx.block_size` frames.
    fn process(&mut self, ctx: &ProcessContext, input: &AudioBlock, output: &mut AudioBlock) -> Result<()>;

    /// Number of input channels (0 for sources)
    fn num_inputs(&self) -> usize { 0 }

    /// Number of output channels
    fn num_outputs(&self) -> usize { 1 }

    /// Clear internal state (filter memories, delay lines)
    fn reset(&mut self) {}
}
