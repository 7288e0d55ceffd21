//! Planar audio blocks

use crate::error::{Error, Result};

/// A fixed-length block of planar audio, one buffer per channel.
///
/// Blocks are allocated once when a pipeline is built and reused for every
/// callback afterwards, so nothing on the audio thread allocates.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBlock {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl AudioBlock {
    /// Create a silent block
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channels],
            frames,
        }
    }

    /// Build a block from per-channel sample vectors. All channels must have equal length.
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Result<Self> {
        let frames = channels.first().map_or(0, Vec::len);
        if let Some(bad) = channels.iter().find(|c| c.len() != frames) {
            return Err(Error::BlockSizeMismatch { expected: frames, actual: bad.len() });
        }
        Ok(Self { channels, frames })
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.channels[ch]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        &mut self.channels[ch]
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        self.channels.iter_mut().map(Vec::as_mut_slice)
    }

    /// Zero every sample
    pub fn silence(&mut self) {
        for buffer in self.channels.iter_mut() {
            buffer.iter_mut().for_each(|s| *s = 0.0);
        }
    }

    /// Copy samples from a block of the same shape
    pub fn copy_from(&mut self, other: &AudioBlock) {
        for (dst, src) in self.channels.iter_mut().zip(other.channels.iter()) {
            dst.copy_from_slice(src);
        }
    }

    /// Returns false if any sample is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.channels.iter().all(|c| c.iter().all(|s| s.is_finite()))
    }

    /// Flush subnormal samples to zero
    pub fn flush_denormals(&mut self) {
        for buffer in self.channels.iter_mut() {
            for s in buffer.iter_mut() {
                if s.is_subnormal() {
                    *s = 0.0;
                }
            }
        }
    }

    /// Root-mean-square level of one channel
    pub fn rms(&self, ch: usize) -> f32 {
        let buffer = &self.channels[ch];
        if buffer.is_empty() {
            return 0.0;
        }
        let sum: f32 = buffer.iter().map(|s| s * s).sum();
        (sum / buffer.len() as f32).sqrt()
    }

    /// Write frames `start..start + count` into `out` as interleaved frames of
    /// `out_channels` samples. Output channels this block doesn't have are zeroed.
    pub fn write_interleaved(&self, start: usize, count: usize, out: &mut [f32], out_channels: usize) {
        let out_channels = out_channels.max(1);
        for (i, frame) in out.chunks_exact_mut(out_channels).take(count).enumerate() {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = self.channels.get(ch).map_or(0.0, |c| c[start + i]);
            }
        }
    }
}
