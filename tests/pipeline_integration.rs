use dasp_signal::{self as signal, Signal};
use yawfield::layout::ChannelId;
use yawfield::nodes::RtrbSink;
use yawfield::{
    angle_state, AudioBlock, Bridge, BridgeInput, Config, DegradedOutput, Error, Pipeline, PipelineStats,
    SurroundFormat,
};

use std::sync::Arc;

const SAMPLE_RATE: u32 = 48000;
const BLOCK: usize = 512;

fn config(format: SurroundFormat) -> Config {
    let mut config = Config::default();
    config.audio.sample_rate = SAMPLE_RATE;
    config.audio.block_size = BLOCK;
    config.rotation.format = format;
    config.rotation.smoothing = 0.85;
    config
}

/// 440 Hz in-phase stereo, `blocks` blocks long
fn in_phase_tone(blocks: usize) -> Vec<AudioBlock> {
    let mut tone = signal::rate(SAMPLE_RATE as f64).const_hz(440.0).sine();
    (0..blocks)
        .map(|_| {
            let samples: Vec<f32> = (0..BLOCK).map(|_| 0.5 * tone.next() as f32).collect();
            AudioBlock::from_channels(vec![samples.clone(), samples]).unwrap()
        })
        .collect()
}

fn process(pipeline: &mut Pipeline, block: &AudioBlock) {
    match pipeline.process(block) {
        Ok(()) | Err(Error::DeadlineMiss { .. }) => {}
        Err(e) => panic!("block failed: {e}"),
    }
}

#[test]
fn tone_at_zero_yaw_lands_in_center() {
    let (_writer, reader) = angle_state(0.85).unwrap();
    let mut pipeline = Pipeline::new(&config(SurroundFormat::Surround51), reader).unwrap();
    let layout = pipeline.layout().clone();
    let ch = |id| layout.channel_index(id).unwrap();

    for block in in_phase_tone(20) {
        process(&mut pipeline, &block);
    }

    let out = pipeline.output();
    let center = out.rms(ch(ChannelId::C));
    assert!(center > 0.3, "center rms {center}");
    for id in [ChannelId::L, ChannelId::R, ChannelId::Ls, ChannelId::Rs] {
        let level = out.rms(ch(id));
        assert!(level < center * 0.01, "{} rms {level} vs center {center}", id.label());
    }
}

#[test]
fn turning_the_head_moves_the_center_image() {
    let (mut writer, reader) = angle_state(0.0).unwrap();
    let mut pipeline = Pipeline::new(&config(SurroundFormat::Surround71), reader).unwrap();
    let layout = pipeline.layout().clone();
    let ch = |id| layout.channel_index(id).unwrap();

    // facing the right surround: front content should come from the left surround
    writer.update(90.0);
    for block in in_phase_tone(10) {
        process(&mut pipeline, &block);
    }

    let out = pipeline.output();
    let ls = out.rms(ch(ChannelId::Ls));
    assert!(ls > 0.3, "LS rms {ls}");
    assert!(out.rms(ch(ChannelId::C)) < ls * 0.01);
}

#[test]
fn nan_block_is_silenced_then_recovers() {
    let (_writer, reader) = angle_state(0.85).unwrap();
    let mut pipeline = Pipeline::new(&config(SurroundFormat::Surround71), reader).unwrap();
    let stats = pipeline.stats();
    let blocks = in_phase_tone(3);

    process(&mut pipeline, &blocks[0]);

    let mut poisoned = blocks[1].clone();
    poisoned.channel_mut(0)[100] = f32::NAN;
    assert!(matches!(pipeline.process(&poisoned), Err(Error::NumericFault { .. })));
    assert!(pipeline.output().channels().all(|c| c.iter().all(|&s| s == 0.0)));

    process(&mut pipeline, &blocks[2]);
    assert!(pipeline.output().is_finite());
    assert!(pipeline.output().rms(2) > 0.1);
    assert_eq!(stats.snapshot().numeric_faults, 1);
}

#[test]
fn capture_to_playback_through_the_bridge() {
    let (_writer, reader) = angle_state(0.85).unwrap();
    let mut cfg = config(SurroundFormat::Surround51);
    cfg.audio.degraded_output = DegradedOutput::Silence;
    let pipeline = Pipeline::new(&cfg, reader).unwrap();
    let stats: Arc<PipelineStats> = pipeline.stats();

    let (mut capture, consumer) = RtrbSink::with_capacity(BLOCK * 8, stats.clone());
    let mut bridge = Bridge::new(pipeline, BridgeInput::Capture(consumer), 8);

    // the capture device delivers 480-frame stereo buffers
    let tone: Vec<f32> = in_phase_tone(6)
        .iter()
        .flat_map(|b| {
            let (l, r) = (b.channel(0).to_vec(), b.channel(1).to_vec());
            l.into_iter().zip(r).flat_map(|(l, r)| [l, r]).collect::<Vec<_>>()
        })
        .collect();
    for chunk in tone.chunks(480 * 2) {
        capture.push(chunk, 2);
    }

    // playback pulls 441 frames per callback into an 8-channel device
    let mut played = Vec::new();
    for _ in 0..6 {
        let mut buf = vec![0.0f32; 441 * 8];
        bridge.fill(&mut buf, 8);
        played.extend(buf);
    }

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.underruns, 0);
    assert_eq!(snapshot.dropped_frames, 0);
    assert!(snapshot.blocks >= 5);

    // center (channel 2) carries the tone, the two spare device channels stay silent
    let center: f32 = played.chunks_exact(8).map(|f| f[2] * f[2]).sum();
    let spare: f32 = played.chunks_exact(8).map(|f| f[6].abs() + f[7].abs()).sum();
    assert!(center > 1.0);
    assert_eq!(spare, 0.0);
}

#[test]
fn starved_bridge_repeats_last_block_when_configured() {
    let (_writer, reader) = angle_state(0.85).unwrap();
    let mut cfg = config(SurroundFormat::Stereo);
    cfg.audio.block_size = 64;
    cfg.audio.degraded_output = DegradedOutput::Repeat;
    let pipeline = Pipeline::new(&cfg, reader).unwrap();
    let stats = pipeline.stats();

    let (mut capture, consumer) = RtrbSink::with_capacity(256, stats.clone());
    let mut bridge = Bridge::new(pipeline, BridgeInput::Capture(consumer), 4);

    let frame: Vec<f32> = (0..64).flat_map(|i| [i as f32 / 64.0, 0.5]).collect();
    capture.push(&frame, 2);

    let mut first = vec![0.0f32; 128];
    bridge.fill(&mut first, 2);
    let mut second = vec![0.0f32; 128];
    bridge.fill(&mut second, 2);

    assert_eq!(first, second);
    assert_eq!(stats.snapshot().underruns, 1);
}
