//! Speaker layout table
//!
//! Static channel order and angular position for every supported output format,
//! following ITU-R BS.775-3. Angles are in degrees around the listener with 0°
//! straight ahead, negative to the left and positive to the right.
//!
//! | Format | Channels (angle °) |
//! |---|---|
//! | stereo | L(-30), R(30) |
//! | 5.1 | L(-30), R(30), C(0), LFE, LS(-110), RS(110) |
//! | 7.1 | L(-30), R(30), C(0), LFE, LS(-90), RS(90), LB(-150), RB(150) |

use core::fmt;
use core::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifies a speaker feed
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ChannelId {
    L,
    R,
    C,
    Lfe,
    Ls,
    Rs,
    Lb,
    Rb,
}

impl ChannelId {
    pub fn label(&self) -> &'static str {
        match self {
            ChannelId::L => "L",
            ChannelId::R => "R",
            ChannelId::C => "C",
            ChannelId::Lfe => "LFE",
            ChannelId::Ls => "LS",
            ChannelId::Rs => "RS",
            ChannelId::Lb => "LB",
            ChannelId::Rb => "RB",
        }
    }
}

/// Output format selector
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum SurroundFormat {
    /// Debug path: no upmix, rotation degenerates to stereo panning
    #[serde(rename = "stereo")]
    Stereo,
    #[serde(rename = "5.1")]
    Surround51,
    #[default]
    #[serde(rename = "7.1")]
    Surround71,
}

impl SurroundFormat {
    /// Number of output channels for this format
    pub fn channels(&self) -> usize {
        match self {
            SurroundFormat::Stereo => 2,
            SurroundFormat::Surround51 => 6,
            SurroundFormat::Surround71 => 8,
        }
    }

    pub fn is_stereo(&self) -> bool {
        matches!(self, SurroundFormat::Stereo)
    }
}

impl FromStr for SurroundFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stereo" | "2.0" => Ok(SurroundFormat::Stereo),
            "5.1" => Ok(SurroundFormat::Surround51),
            "7.1" => Ok(SurroundFormat::Surround71),
            other => Err(Error::config(format!(
                "unknown surround format '{other}' (expected stereo, 5.1 or 7.1)"
            ))),
        }
    }
}

impl fmt::Display for SurroundFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SurroundFormat::Stereo => "stereo",
            SurroundFormat::Surround51 => "5.1",
            SurroundFormat::Surround71 => "7.1",
        })
    }
}

/// One speaker feed in a layout
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Speaker {
    pub id: ChannelId,
    /// Position in degrees, `None` for the non-directional LFE feed
    pub angle: Option<f32>,
}

impl Speaker {
    const fn at(id: ChannelId, angle: f32) -> Self {
        Self { id, angle: Some(angle) }
    }

    const fn lfe() -> Self {
        Self { id: ChannelId::Lfe, angle: None }
    }

    #[inline]
    pub fn is_lfe(&self) -> bool {
        self.angle.is_none()
    }
}

const STEREO: [Speaker; 2] = [Speaker::at(ChannelId::L, -30.0), Speaker::at(ChannelId::R, 30.0)];

const SURROUND_51: [Speaker; 6] = [
    Speaker::at(ChannelId::L, -30.0),
    Speaker::at(ChannelId::R, 30.0),
    Speaker::at(ChannelId::C, 0.0),
    Speaker::lfe(),
    Speaker::at(ChannelId::Ls, -110.0),
    Speaker::at(ChannelId::Rs, 110.0),
];

const SURROUND_71: [Speaker; 8] = [
    Speaker::at(ChannelId::L, -30.0),
    Speaker::at(ChannelId::R, 30.0),
    Speaker::at(ChannelId::C, 0.0),
    Speaker::lfe(),
    Speaker::at(ChannelId::Ls, -90.0),
    Speaker::at(ChannelId::Rs, 90.0),
    Speaker::at(ChannelId::Lb, -150.0),
    Speaker::at(ChannelId::Rb, 150.0),
];

/// A directional speaker on the ring, sorted by normalized position
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct RingSlot {
    /// Index of the channel in the layout
    pub channel: usize,
    /// Position in `[0, 360)`
    pub position: f32,
}

/// Channel order and speaker positions for one output format.
///
/// Immutable once built. The directional speakers are also kept sorted around
/// the circle so the rotation engine can find the pair bracketing any angle.
#[derive(Clone, Debug)]
pub struct SpeakerLayout {
    format: SurroundFormat,
    speakers: Vec<Speaker>,
    ring: Vec<RingSlot>,
}

impl SpeakerLayout {
    pub fn new(format: SurroundFormat) -> Self {
        let speakers: Vec<Speaker> = match format {
            SurroundFormat::Stereo => STEREO.to_vec(),
            SurroundFormat::Surround51 => SURROUND_51.to_vec(),
            SurroundFormat::Surround71 => SURROUND_71.to_vec(),
        };

        let ring = speakers
            .iter()
            .enumerate()
            .filter_map(|(channel, s)| {
                s.angle.map(|a| RingSlot { channel, position: normalize_degrees(a) })
            })
            .sorted_by(|a, b| a.position.total_cmp(&b.position))
            .collect();

        Self { format, speakers, ring }
    }

    /// Look up a layout by its selector string (`stereo`, `5.1`, `7.1`)
    pub fn from_selector(selector: &str) -> Result<Self> {
        selector.parse().map(Self::new)
    }

    #[inline]
    pub fn format(&self) -> SurroundFormat {
        self.format
    }

    #[inline]
    pub fn speakers(&self) -> &[Speaker] {
        &self.speakers
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.speakers.len()
    }

    /// Directional speakers sorted by position in `[0, 360)`
    #[inline]
    pub fn ring(&self) -> &[RingSlot] {
        &self.ring
    }

    pub fn lfe_channel(&self) -> Option<usize> {
        self.speakers.iter().position(Speaker::is_lfe)
    }

    pub fn channel_index(&self, id: ChannelId) -> Option<usize> {
        self.speakers.iter().position(|s| s.id == id)
    }
}

/// Wrap an angle in degrees into `[0, 360)`
#[inline]
pub fn normalize_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `from` to `to`, in `(-180, 180]`
#[inline]
pub fn shortest_delta(from: f32, to: f32) -> f32 {
    let delta = normalize_degrees(to - from);
    if delta > 180.0 {
        delta - 360.0
    } else {
        delta
    }
}

/// Express an angle in `(-180, 180]`
#[inline]
pub fn signed_degrees(angle: f32) -> f32 {
    shortest_delta(0.0, angle)
}
