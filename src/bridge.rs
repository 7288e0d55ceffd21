//! Audio I/O bridge
//!
//! Connects the capture ring to the playback callback. Playback callbacks come
//! in whatever size the backend picks; the bridge re-chunks them into whole
//! pipeline blocks. Each time its pending output runs out it takes exactly one
//! block of stereo input, runs the [`Pipeline`] once and serves the result
//! until it has all been written out.

use std::sync::Arc;

use rtrb::Consumer;

use crate::block::AudioBlock;
use crate::node::{AudioNode, ProcessContext};
use crate::nodes::source::Sine;
use crate::pipeline::Pipeline;
use crate::stats::PipelineStats;

/// Where the bridge gets its stereo input
pub enum BridgeInput {
    /// Interleaved stereo frames from the capture stream
    Capture(Consumer<f32>),
    /// Internal test tone, for running without a capture device
    Tone(Sine),
}

/// Drives a [`Pipeline`] from the playback callback
pub struct Bridge {
    pipeline: Pipeline,
    input: BridgeInput,
    staging: AudioBlock,
    /// Frames of the current output block already written to the device
    cursor: usize,
    max_queued_blocks: usize,
    stats: Arc<PipelineStats>,
}

impl Bridge {
    pub fn new(pipeline: Pipeline, input: BridgeInput, max_queued_blocks: usize) -> Self {
        let block_size = pipeline.block_size();
        let stats = pipeline.stats();
        Self {
            staging: AudioBlock::new(2, block_size),
            // start exhausted so the first callback pulls a block
            cursor: block_size,
            max_queued_blocks: max_queued_blocks.max(1),
            stats,
            pipeline,
            input,
        }
    }

    #[inline]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Fill an interleaved device buffer with `device_channels` channels per frame.
    ///
    /// Device channels beyond the layout's are written as silence.
    pub fn fill(&mut self, out: &mut [f32], device_channels: usize) {
        let device_channels = device_channels.max(1);
        let block_size = self.pipeline.block_size();
        let total = out.len() / device_channels;

        let mut written = 0;
        while written < total {
            if self.cursor >= block_size {
                self.next_block();
                self.cursor = 0;
            }

            let count = (block_size - self.cursor).min(total - written);
            let dst = &mut out[written * device_channels..(written + count) * device_channels];
            self.pipeline.output().write_interleaved(self.cursor, count, dst, device_channels);

            self.cursor += count;
            written += count;
        }

        // trailing partial frame, if the backend ever hands us one
        out[total * device_channels..].iter_mut().for_each(|s| *s = 0.0);
    }

    /// Pull one input block and run it through the pipeline
    fn next_block(&mut self) {
        let block_size = self.pipeline.block_size();

        match &mut self.input {
            BridgeInput::Capture(consumer) => {
                let block_samples = block_size * 2;

                let queued = consumer.slots() / block_samples;
                if queued > self.max_queued_blocks {
                    let stale = queued - self.max_queued_blocks;
                    if let Ok(chunk) = consumer.read_chunk(stale * block_samples) {
                        chunk.commit_all();
                        self.stats.record_overrun(stale as u64);
                    }
                }

                match consumer.read_chunk(block_samples) {
                    Ok(chunk) => {
                        for (i, sample) in chunk.into_iter().enumerate() {
                            self.staging.channel_mut(i % 2)[i / 2] = sample;
                        }
                    }
                    Err(_) => {
                        self.stats.record_underrun();
                        self.pipeline.emit_degraded();
                        return;
                    }
                }
            }
            BridgeInput::Tone(sine) => {
                let ctx = ProcessContext::new(self.pipeline.sample_rate(), block_size);
                // fixed frame count and channel count, cannot fail
                let _ = sine.process(&ctx, &AudioBlock::new(0, 0), &mut self.staging);
            }
        }

        // faults are already counted and output() holds what to play
        let _ = self.pipeline.process(&self.staging);
    }
}
