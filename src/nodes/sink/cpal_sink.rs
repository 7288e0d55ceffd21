//! CPAL playback and capture streams

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig};

use crate::bridge::Bridge;
use crate::device::{CpalDevice, Direction};
use crate::error::{Error, Result};

use super::RtrbSink;

/// Playback stream driven by a [`Bridge`].
///
/// The bridge moves into the stream callback; every callback fills the whole
/// device buffer from it, whatever size the backend asks for.
pub struct CpalSink {
    stream: cpal::Stream,
    config: StreamConfig,
}

impl CpalSink {
    /// Build and start a playback stream with at least `bridge`'s channel count
    pub fn new(device: &CpalDevice, bridge: Bridge) -> Result<Self> {
        if device.direction() != Direction::Output {
            return Err(Error::Device(format!("'{}' is not an output device", device.name())));
        }
        let pipeline = bridge.pipeline();
        let (config, format) =
            device.stream_config(pipeline.num_channels(), pipeline.sample_rate(), pipeline.block_size())?;

        let stream = match format {
            SampleFormat::F32 => build_output_f32(device.device(), &config, bridge),
            SampleFormat::I16 => build_output::<i16>(device.device(), &config, bridge),
            SampleFormat::U16 => build_output::<u16>(device.device(), &config, bridge),
            SampleFormat::I32 => build_output::<i32>(device.device(), &config, bridge),
            SampleFormat::F64 => build_output::<f64>(device.device(), &config, bridge),
            other => return Err(Error::Stream(format!("unsupported output sample format {other}"))),
        }
        .map_err(|e| Error::Stream(format!("cannot build output stream: {e}")))?;

        stream.play().map_err(|e| Error::Stream(format!("cannot start output stream: {e}")))?;
        tracing::info!(device = device.name(), channels = config.channels, ?format, "playback started");

        Ok(Self { stream, config })
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.config.channels as usize
    }

    pub fn buffer_size(&self) -> Option<u32> {
        match self.config.buffer_size {
            cpal::BufferSize::Fixed(frames) => Some(frames),
            cpal::BufferSize::Default => None,
        }
    }

    pub fn pause(&self) -> Result<()> {
        self.stream.pause().map_err(|e| Error::Stream(format!("cannot pause output stream: {e}")))
    }
}

fn build_output_f32(
    device: &cpal::Device,
    config: &StreamConfig,
    mut bridge: Bridge,
) -> core::result::Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = config.channels as usize;
    device.build_output_stream(
        config,
        move |data: &mut [f32], _| bridge.fill(data, channels),
        |err| tracing::error!("playback stream error: {err}"),
        None,
    )
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut bridge: Bridge,
) -> core::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch = vec![0.0f32; bridge.pipeline().block_size() * channels * 4];

    device.build_output_stream(
        config,
        move |data: &mut [T], _| fill_converted(&mut bridge, data, &mut scratch, channels),
        |err| tracing::error!("playback stream error: {err}"),
        None,
    )
}

/// Fill a device buffer of any sample type through a fixed f32 scratch buffer,
/// a whole number of frames at a time. `scratch` is never resized.
fn fill_converted<T>(bridge: &mut Bridge, data: &mut [T], scratch: &mut [f32], channels: usize)
where
    T: SizedSample + FromSample<f32>,
{
    let channels = channels.max(1);
    let chunk = (scratch.len() / channels * channels).max(1);
    for out in data.chunks_mut(chunk) {
        let buffer = &mut scratch[..out.len()];
        bridge.fill(buffer, channels);
        for (sample, &value) in out.iter_mut().zip(buffer.iter()) {
            *sample = T::from_sample(value);
        }
    }
}

/// Capture stream feeding an [`RtrbSink`]
pub struct CpalSource {
    stream: cpal::Stream,
    config: StreamConfig,
}

impl CpalSource {
    /// Build and start a capture stream at `sample_rate`
    pub fn new(device: &CpalDevice, sink: RtrbSink, sample_rate: u32, block_size: usize) -> Result<Self> {
        if device.direction() != Direction::Input {
            return Err(Error::Device(format!("'{}' is not an input device", device.name())));
        }
        // stereo if the device has it, mono is duplicated by the sink
        let (config, format) = device
            .stream_config(2, sample_rate, block_size)
            .or_else(|_| device.stream_config(1, sample_rate, block_size))?;

        let stream = match format {
            SampleFormat::F32 => build_input::<f32>(device.device(), &config, sink),
            SampleFormat::I16 => build_input::<i16>(device.device(), &config, sink),
            SampleFormat::U16 => build_input::<u16>(device.device(), &config, sink),
            SampleFormat::I32 => build_input::<i32>(device.device(), &config, sink),
            SampleFormat::F64 => build_input::<f64>(device.device(), &config, sink),
            other => return Err(Error::Stream(format!("unsupported input sample format {other}"))),
        }
        .map_err(|e| Error::Stream(format!("cannot build input stream: {e}")))?;

        stream.play().map_err(|e| Error::Stream(format!("cannot start input stream: {e}")))?;
        tracing::info!(device = device.name(), channels = config.channels, ?format, "capture started");

        Ok(Self { stream, config })
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.config.channels as usize
    }

    pub fn pause(&self) -> Result<()> {
        self.stream.pause().map_err(|e| Error::Stream(format!("cannot pause input stream: {e}")))
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut sink: RtrbSink,
) -> core::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    device.build_input_stream(
        config,
        move |data: &[T], _| sink.push(data, channels),
        |err| tracing::error!("capture stream error: {err}"),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::Sample;

    use crate::angle::angle_state;
    use crate::bridge::BridgeInput;
    use crate::config::Config;
    use crate::layout::SurroundFormat;
    use crate::pipeline::Pipeline;

    #[test]
    fn large_callback_is_converted_through_small_scratch() {
        let mut config = Config::default();
        config.rotation.format = SurroundFormat::Stereo;
        config.audio.block_size = 16;
        let (_writer, reader) = angle_state(0.0).unwrap();
        let pipeline = Pipeline::new(&config, reader).unwrap();

        let (mut producer, consumer) = rtrb::RingBuffer::new(256);
        let input: Vec<f32> = (0..64).flat_map(|i| [i as f32 / 128.0, -(i as f32) / 128.0]).collect();
        for &s in &input {
            producer.push(s).unwrap();
        }
        let mut bridge = Bridge::new(pipeline, BridgeInput::Capture(consumer), 8);

        // five frames of scratch for a 64-frame callback
        let mut scratch = vec![0.0f32; 11];
        let mut data = vec![0i16; 128];
        fill_converted(&mut bridge, &mut data, &mut scratch, 2);

        assert_eq!(scratch.len(), 11);
        let expected: Vec<i16> = input.iter().map(|&s| i16::from_sample(s)).collect();
        assert_eq!(data, expected);
    }
}
