//! Built-in processing stages.
//!
//! Stages are organized into three categories:
//!
//! ## Sources ([`source`])
//!
//! Produce signals with no audio inputs:
//! - [`Sine`] - In-phase stereo test tone
//! - [`TrackerSource`] - Raw yaw producers (rotate, sweep, static, tracked)
//!
//! ## Effects ([`effect`])
//!
//! Process audio (inputs → outputs):
//! - [`Upmixer`] - Stereo to 5.1 / 7.1
//! - [`Rotator`] - Yaw-compensated constant-power rotation
//!
//! ## Sinks ([`sink`])
//!
//! Move audio across thread boundaries:
//! - [`RtrbSink`] - Push captured frames into the capture ring
//! - [`CpalSink`] / [`CpalSource`] - Playback and capture streams (requires `cpal_io` feature)

pub mod source;
pub mod effect;
pub mod sink;

// Re-export common types at the top level for convenience
pub use source::{yaw_from_pose, AngleSource, Pose, Sine, StaticHandle, TrackerSource};
pub use effect::{GainMatrix, PanPair, Rotator, Upmixer};
pub use sink::RtrbSink;

#[cfg(feature = "cpal_io")]
pub use sink::{CpalSink, CpalSource};
