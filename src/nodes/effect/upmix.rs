//! Stereo to 5.1 / 7.1 upmixer
//!
//! Per block:
//! 1. Estimate how much of L and R is shared, in-phase content at equal level
//!    (`2·ΣLR / (ΣLL + ΣRR)`, clamped to `[0, 1]`) and pull that much of
//!    `(L+R)/2` into the center. A hard-panned source scores near 0. The estimate is smoothed across blocks and ramped across
//!    each block, so the center gain never steps.
//! 2. The residual L/R after center extraction feed the front pair.
//! 3. Surrounds (and backs on 7.1) carry the residual side-difference signal,
//!    delayed and run through per-channel all-pass filters so the rear image is
//!    diffuse instead of a correlated copy of the front.
//! 4. The LFE gets a low-passed mono sum, or silence when the sub level is 0.

use crate::block::AudioBlock;
use crate::config::UpmixConfig;
use crate::error::{Error, Result};
use crate::layout::{ChannelId, SpeakerLayout, SurroundFormat};
use crate::node::{AudioNode, ProcessContext};

use super::filters::{AllPass1, DelayLine, LowPass4};

/// Weight of the previous block's coherence estimate
const COHERENCE_SMOOTHING: f32 = 0.5;

const SURROUND_GAIN: f32 = 0.7;
const BACK_GAIN: f32 = -0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// One decorrelated ambience feed (LS, RS, LB or RB)
struct AmbienceFeed {
    channel: usize,
    side: Side,
    gain: f32,
    delay: DelayLine,
    allpass: AllPass1,
}

impl AmbienceFeed {
    fn new(channel: usize, side: Side, gain: f32, delay_ms: f32, allpass: f32, sample_rate: u32) -> Self {
        Self {
            channel,
            side,
            gain,
            delay: DelayLine::from_ms(delay_ms, sample_rate),
            allpass: AllPass1::new(allpass),
        }
    }

    #[inline]
    fn process(&mut self, left: f32, right: f32) -> f32 {
        let side = match self.side {
            Side::Left => left - right,
            Side::Right => right - left,
        };
        self.gain * self.allpass.process(self.delay.process(side))
    }

    fn reset(&mut self) {
        self.delay.reset();
        self.allpass.reset();
    }
}

/// Converts a stereo block into a 5.1 or 7.1 block, before rotation.
///
/// Filter state persists from block to block, so the output is deterministic
/// for a given input history.
pub struct Upmixer {
    format: SurroundFormat,
    channels: usize,
    front: [usize; 3],
    lfe: usize,
    lfe_level: f32,
    lfe_filter: LowPass4,
    ambience: Vec<AmbienceFeed>,
    coherence: Option<f32>,
}

impl Upmixer {
    /// Build an upmixer for a surround layout. The stereo layout has no upmix stage.
    pub fn new(layout: &SpeakerLayout, sample_rate: u32, config: &UpmixConfig) -> Result<Self> {
        if layout.format().is_stereo() {
            return Err(Error::config("stereo output has no upmix stage"));
        }

        let index = |id: ChannelId| {
            layout
                .channel_index(id)
                .ok_or_else(|| Error::config(format!("layout {} has no {} channel", layout.format(), id.label())))
        };

        let front = [index(ChannelId::L)?, index(ChannelId::R)?, index(ChannelId::C)?];
        let lfe = index(ChannelId::Lfe)?;

        let mut ambience = vec![
            AmbienceFeed::new(index(ChannelId::Ls)?, Side::Left, SURROUND_GAIN, config.surround_delay_ms, 0.45, sample_rate),
            AmbienceFeed::new(index(ChannelId::Rs)?, Side::Right, SURROUND_GAIN, config.surround_delay_ms, -0.35, sample_rate),
        ];
        if layout.format() == SurroundFormat::Surround71 {
            ambience.push(AmbienceFeed::new(index(ChannelId::Lb)?, Side::Left, BACK_GAIN, config.rear_delay_ms, 0.6, sample_rate));
            ambience.push(AmbienceFeed::new(index(ChannelId::Rb)?, Side::Right, BACK_GAIN, config.rear_delay_ms, -0.55, sample_rate));
        }

        Ok(Self {
            format: layout.format(),
            channels: layout.num_channels(),
            front,
            lfe,
            lfe_level: config.lfe_level.max(0.0),
            lfe_filter: LowPass4::butterworth(config.lfe_cutoff_hz, sample_rate),
            ambience,
            coherence: None,
        })
    }

    #[inline]
    pub fn format(&self) -> SurroundFormat {
        self.format
    }

    /// Coherence used at the end of the last processed block
    #[inline]
    pub fn coherence(&self) -> Option<f32> {
        self.coherence
    }
}

/// Level-aware correlation of two buffers, clamped to `[0, 1]`.
///
/// Reaches 1 only when L equals R; a level difference lowers it as much as a
/// phase difference does.
fn block_coherence(left: &[f32], right: &[f32]) -> f32 {
    let (mut lr, mut ll, mut rr) = (0.0f64, 0.0f64, 0.0f64);
    for (&l, &r) in left.iter().zip(right) {
        let (l, r) = (l as f64, r as f64);
        lr += l * r;
        ll += l * l;
        rr += r * r;
    }
    let power = ll + rr;
    if power <= f64::EPSILON {
        return 0.0;
    }
    (2.0 * lr / power).clamp(0.0, 1.0) as f32
}

impl AudioNode for Upmixer {
    fn process(&mut self, ctx: &ProcessContext, input: &AudioBlock, output: &mut AudioBlock) -> Result<()> {
        ctx.check_frames(input)?;
        ctx.check_frames(output)?;
        if input.num_channels() != 2 || output.num_channels() != self.channels {
            return Err(Error::config(format!(
                "upmixer expects 2 -> {} channels, got {} -> {}",
                self.channels,
                input.num_channels(),
                output.num_channels()
            )));
        }

        let left = input.channel(0);
        let right = input.channel(1);

        let measured = block_coherence(left, right);
        let (start, target) = match self.coherence {
            Some(previous) => (previous, COHERENCE_SMOOTHING * previous + (1.0 - COHERENCE_SMOOTHING) * measured),
            None => (measured, measured),
        };
        self.coherence = Some(target);

        let frames = ctx.block_size;
        let step = (target - start) / frames as f32;
        let [l_ch, r_ch, c_ch] = self.front;

        for i in 0..frames {
            let (l, r) = (left[i], right[i]);
            let weight = start + step * (i + 1) as f32;

            let center = weight * 0.5 * (l + r);
            let l_res = l - center;
            let r_res = r - center;

            output.channel_mut(l_ch)[i] = l_res;
            output.channel_mut(r_ch)[i] = r_res;
            output.channel_mut(c_ch)[i] = center;

            output.channel_mut(self.lfe)[i] = if self.lfe_level > 0.0 {
                self.lfe_level * self.lfe_filter.process(0.5 * (l + r))
            } else {
                0.0
            };

            for feed in self.ambience.iter_mut() {
                output.channel_mut(feed.channel)[i] = feed.process(l_res, r_res);
            }
        }

        Ok(())
    }

    fn num_inputs(&self) -> usize { 2 }

    fn num_outputs(&self) -> usize { self.channels }

    fn reset(&mut self) {
        self.coherence = None;
        self.lfe_filter.reset();
        self.ambience.iter_mut().for_each(AmbienceFeed::reset);
    }
}
