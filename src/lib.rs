//! Yawfield - head-tracked surround rotation
//!
//! Takes a stereo stream, upmixes it to 5.1 or 7.1 and rotates the resulting
//! soundfield against the listener's head yaw, so "front" in the content stays
//! where the listener is facing while the physical speakers stay put.
//!
//! Design principles:
//! - Fixed block size; every buffer is allocated before streaming starts
//! - The yaw crosses threads through a single atomic, never a lock
//! - Nothing stops audio once it is running: faults degrade a block and are counted
//! - The DSP core runs without hardware; cpal lives behind the `cpal_io` feature
//!
//! # Pipeline
//!
//! ```text
//! capture -> RtrbSink -> Bridge -> Upmixer -> Rotator -> Bridge -> playback
//!                                               ^
//!                   TrackerSource -> AngleWriter | AngleReader
//! ```

mod angle;
mod block;
pub mod bridge;
pub mod config;
pub mod device;
mod error;
pub mod layout;
mod node;
pub mod nodes;
pub mod pipeline;
pub mod stats;
pub mod tracker;

#[cfg(feature = "cpal_io")]
mod session;

pub use angle::{angle_state, angle_state_from, AngleMonitor, AngleReader, AngleWriter};
pub use block::AudioBlock;
pub use bridge::{Bridge, BridgeInput};
pub use config::{Config, DegradedOutput, DeviceSelector, TrackingMode};
pub use device::{DeviceCaps, Direction};
pub use error::{Error, Result};
pub use layout::{ChannelId, SpeakerLayout, SurroundFormat};
pub use node::{AudioNode, ProcessContext};
pub use nodes::{AngleSource, TrackerSource};
pub use pipeline::Pipeline;
pub use stats::{PipelineStats, StatsReporter, StatsSnapshot};
pub use tracker::{spawn_tracker, TrackerThread};

#[cfg(feature = "cpal_io")]
pub use device::CpalDevice;
#[cfg(feature = "cpal_io")]
pub use session::Session;
