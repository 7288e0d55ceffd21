mod filters;
mod rotate;
mod upmix;

pub use filters::{AllPass1, Biquad, DelayLine, LowPass4};
pub use rotate::{pan_pair, GainMatrix, PanPair, Rotator};
pub use upmix::Upmixer;
