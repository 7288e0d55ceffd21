//! Yaw-compensated rotation of a surround block
//!
//! Every directional source channel is moved to a virtual position
//! `position - yaw` and constant-power panned between the two speakers that
//! bracket that position on the layout's ring. The resulting N×N gain matrix is
//! rebuilt at the start of each block and applied to all of its samples.
//! The LFE channel always passes straight through.

use core::f32::consts::FRAC_PI_2;

use crate::block::AudioBlock;
use crate::error::{Error, Result};
use crate::layout::{normalize_degrees, signed_degrees, RingSlot, SpeakerLayout};
use crate::node::{AudioNode, ProcessContext};

/// A source panned between two adjacent ring speakers
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PanPair {
    /// Channel index of the speaker at or before the virtual position
    pub first: usize,
    /// Channel index of the next speaker clockwise
    pub second: usize,
    pub first_gain: f32,
    pub second_gain: f32,
}

/// Find the ring speakers bracketing `virtual_angle` and the constant-power gains between them.
///
/// Each pair covers the half-open arc `[a, b)`, so a virtual position exactly on
/// a speaker maps fully onto that speaker. `ring` must hold at least two slots
/// sorted by position.
pub fn pan_pair(ring: &[RingSlot], virtual_angle: f32) -> PanPair {
    let v = normalize_degrees(virtual_angle);

    // positions below the first slot belong to the arc wrapping round from the last one
    let i = ring.iter().rposition(|slot| slot.position <= v).unwrap_or(ring.len() - 1);
    let a = ring[i];
    let b = ring[(i + 1) % ring.len()];

    let span = normalize_degrees(b.position - a.position);
    let offset = normalize_degrees(v - a.position);
    let t = if span > 0.0 { (offset / span).clamp(0.0, 1.0) } else { 0.0 };

    let theta = t * FRAC_PI_2;
    PanPair {
        first: a.channel,
        second: b.channel,
        first_gain: theta.cos(),
        second_gain: if t == 0.0 { 0.0 } else { theta.sin() },
    }
}

/// Level applied to a stereo source rotated behind the listener:
/// 1 up to 90° off-axis, falling linearly to `floor` at 180°
fn rear_attenuation(virtual_angle: f32, floor: f32) -> f32 {
    let off_axis = signed_degrees(virtual_angle).abs();
    if off_axis <= 90.0 {
        1.0
    } else {
        let t = (off_axis - 90.0) / 90.0;
        1.0 - t * (1.0 - floor)
    }
}

/// Row-major N×N gain table: `gain(source, dest)`
#[derive(Clone, Debug, PartialEq)]
pub struct GainMatrix {
    n: usize,
    gains: Vec<f32>,
}

impl GainMatrix {
    pub fn new(n: usize) -> Self {
        Self { n, gains: vec![0.0; n * n] }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn gain(&self, source: usize, dest: usize) -> f32 {
        self.gains[source * self.n + dest]
    }

    /// Gains from one source channel to every destination
    #[inline]
    pub fn row(&self, source: usize) -> &[f32] {
        &self.gains[source * self.n..(source + 1) * self.n]
    }

    /// Overwrite the table for `yaw` degrees.
    ///
    /// `rear_floor` dims sources rotated behind the listener; pass `None` to keep
    /// pure constant-power gains.
    pub fn compute(&mut self, layout: &SpeakerLayout, yaw: f32, rear_floor: Option<f32>) {
        self.gains.iter_mut().for_each(|g| *g = 0.0);

        if let Some(lfe) = layout.lfe_channel() {
            self.gains[lfe * self.n + lfe] = 1.0;
        }

        let ring = layout.ring();
        for slot in ring {
            let virtual_angle = normalize_degrees(slot.position - yaw);
            let pair = pan_pair(ring, virtual_angle);
            let level = rear_floor.map_or(1.0, |floor| rear_attenuation(virtual_angle, floor));

            let row = slot.channel * self.n;
            self.gains[row + pair.first] += level * pair.first_gain;
            self.gains[row + pair.second] += level * pair.second_gain;
        }
    }

    /// `output[dest] = sum(gain(source, dest) * input[source])`
    pub fn apply(&self, input: &AudioBlock, output: &mut AudioBlock) {
        output.silence();
        for source in 0..self.n {
            let src = input.channel(source);
            for (dest, &gain) in self.row(source).iter().enumerate() {
                if gain == 0.0 {
                    continue;
                }
                let dst = output.channel_mut(dest);
                if gain == 1.0 {
                    dst.iter_mut().zip(src).for_each(|(d, s)| *d += s);
                } else {
                    dst.iter_mut().zip(src).for_each(|(d, s)| *d += gain * s);
                }
            }
        }
    }
}

/// Rotates an N-channel block by the context's yaw
pub struct Rotator {
    layout: SpeakerLayout,
    matrix: GainMatrix,
    rear_floor: Option<f32>,
}

impl Rotator {
    /// `rear_floor` only takes effect for the stereo layout; 1.0 disables it
    pub fn new(layout: &SpeakerLayout, rear_floor: f32) -> Result<Self> {
        if layout.ring().len() < 2 {
            return Err(Error::config(format!(
                "layout {} needs at least two directional channels to rotate",
                layout.format()
            )));
        }
        if !(0.0..=1.0).contains(&rear_floor) {
            return Err(Error::config(format!("stereo rear floor must be in [0, 1], got {rear_floor}")));
        }

        let rear_floor = (layout.format().is_stereo() && rear_floor < 1.0).then_some(rear_floor);
        let mut matrix = GainMatrix::new(layout.num_channels());
        matrix.compute(layout, 0.0, rear_floor);

        Ok(Self { layout: layout.clone(), matrix, rear_floor })
    }

    #[inline]
    pub fn layout(&self) -> &SpeakerLayout {
        &self.layout
    }

    /// Gain table used for the last processed block
    #[inline]
    pub fn matrix(&self) -> &GainMatrix {
        &self.matrix
    }
}

impl AudioNode for Rotator {
    fn process(&mut self, ctx: &ProcessContext, input: &AudioBlock, output: &mut AudioBlock) -> Result<()> {
        let n = self.layout.num_channels();
        if input.num_channels() != n || output.num_channels() != n {
            return Err(Error::config(format!(
                "rotator for {} expects {n} channels, got {} -> {}",
                self.layout.format(),
                input.num_channels(),
                output.num_channels()
            )));
        }
        ctx.check_frames(input)?;
        ctx.check_frames(output)?;

        self.matrix.compute(&self.layout, ctx.yaw, self.rear_floor);
        self.matrix.apply(input, output);

        if !output.is_finite() {
            output.silence();
            return Err(Error::NumericFault { stage: "rotation" });
        }
        output.flush_denormals();
        Ok(())
    }

    fn num_inputs(&self) -> usize { self.layout.num_channels() }

    fn num_outputs(&self) -> usize { self.layout.num_channels() }
}
