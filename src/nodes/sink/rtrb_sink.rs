//! Ring buffer sink for captured audio

use std::sync::Arc;

use cpal::{FromSample, Sample};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::stats::PipelineStats;

/// A sink that pushes captured frames into an rtrb ring buffer as interleaved stereo.
///
/// Lives in the capture callback. Whatever the device channel count, exactly
/// two samples per frame go into the ring: a mono device is duplicated, extra
/// channels are ignored. Frames that don't fit are dropped and counted.
pub struct RtrbSink {
    producer: Producer<f32>,
    stats: Arc<PipelineStats>,
}

impl RtrbSink {
    pub fn new(producer: Producer<f32>, stats: Arc<PipelineStats>) -> Self {
        Self { producer, stats }
    }

    /// A capture ring holding `frames` stereo frames, plus the sink feeding it
    pub fn with_capacity(frames: usize, stats: Arc<PipelineStats>) -> (Self, Consumer<f32>) {
        let (producer, consumer) = RingBuffer::new(frames.max(1) * 2);
        (Self::new(producer, stats), consumer)
    }

    /// Returns how many stereo frames fit before the ring is full
    #[inline]
    pub fn available(&self) -> usize {
        self.producer.slots() / 2
    }

    /// Push interleaved device samples with `device_channels` channels per frame
    pub fn push<T>(&mut self, data: &[T], device_channels: usize)
    where
        T: Sample,
        f32: FromSample<T>,
    {
        let device_channels = device_channels.max(1);
        let frames = data.len() / device_channels;
        let fits = frames.min(self.available());

        if fits > 0 {
            if let Ok(chunk) = self.producer.write_chunk_uninit(fits * 2) {
                let samples = data.chunks_exact(device_channels).take(fits).flat_map(|frame| {
                    let left = f32::from_sample(frame[0]);
                    let right = frame.get(1).map_or(left, |&s| f32::from_sample(s));
                    [left, right]
                });
                chunk.fill_from_iter(samples);
            }
        }

        if fits < frames {
            self.stats.record_dropped_frames((frames - fits) as u64);
        }
    }
}
