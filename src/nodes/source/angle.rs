//! Raw yaw sources
//!
//! Each source answers one question: "what is the raw yaw right now?". The
//! tracker thread polls the selected source at its update rate and feeds the
//! answer to the [`AngleWriter`](crate::AngleWriter).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rtrb::Consumer;

use crate::config::{TrackingConfig, TrackingMode};
use crate::layout::normalize_degrees;

/// Row-major 3×4 device-to-world transform, as reported by OpenVR-style trackers
pub type Pose = [[f32; 4]; 3];

/// Yaw in degrees `[0, 360)` from a pose, turning right positive.
///
/// The forward axis is the third column of the rotation part. Returns `None`
/// for non-finite poses or when the forward axis points straight up or down.
pub fn yaw_from_pose(pose: &Pose) -> Option<f32> {
    let forward_x = pose[0][2];
    let forward_z = pose[2][2];
    if !(forward_x.is_finite() && forward_z.is_finite()) || forward_x.hypot(forward_z) < 1e-6 {
        return None;
    }
    Some(normalize_degrees(-forward_x.atan2(forward_z).to_degrees()))
}

/// Continuous rotation at a fixed rate
#[derive(Clone, Debug)]
pub struct Rotate {
    pub degrees_per_second: f32,
}

impl AngleSource for Rotate {
    fn raw_yaw(&mut self, elapsed: Duration) -> f32 {
        normalize_degrees((elapsed.as_secs_f64() * self.degrees_per_second as f64 % 360.0) as f32)
    }
}

/// `sin(rate·t) · amplitude`, swinging either side of straight ahead
#[derive(Clone, Debug)]
pub struct Sweep {
    pub amplitude: f32,
    /// Angular frequency in radians per second
    pub rate: f32,
}

impl AngleSource for Sweep {
    fn raw_yaw(&mut self, elapsed: Duration) -> f32 {
        let t = elapsed.as_secs_f64();
        normalize_degrees(((self.rate as f64 * t).sin() * self.amplitude as f64) as f32)
    }
}

/// A manually set angle, changeable through a [`StaticHandle`]
#[derive(Clone, Debug)]
pub struct Static {
    angle: Arc<AtomicU32>,
}

impl Static {
    pub fn new(angle: f32) -> Self {
        Self { angle: Arc::new(AtomicU32::new(normalize_degrees(angle).to_bits())) }
    }

    pub fn handle(&self) -> StaticHandle {
        StaticHandle { angle: self.angle.clone() }
    }
}

impl AngleSource for Static {
    fn raw_yaw(&mut self, _elapsed: Duration) -> f32 {
        f32::from_bits(self.angle.load(Ordering::Acquire))
    }
}

/// Sets the angle reported by a [`Static`] source from any thread
#[derive(Clone, Debug)]
pub struct StaticHandle {
    angle: Arc<AtomicU32>,
}

impl StaticHandle {
    /// Non-finite angles are ignored
    pub fn set(&self, degrees: f32) {
        if degrees.is_finite() {
            self.angle.store(normalize_degrees(degrees).to_bits(), Ordering::Release);
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.angle.load(Ordering::Acquire))
    }
}

/// Head pose pushed by an external tracking backend
pub struct Tracked {
    poses: Consumer<Pose>,
    last: f32,
}

impl Tracked {
    pub fn new(poses: Consumer<Pose>) -> Self {
        Self { poses, last: 0.0 }
    }
}

impl AngleSource for Tracked {
    /// Drains every queued pose and reports the newest valid one, or the last
    /// known yaw when none arrived.
    fn raw_yaw(&mut self, _elapsed: Duration) -> f32 {
        while let Ok(pose) = self.poses.pop() {
            match yaw_from_pose(&pose) {
                Some(yaw) => self.last = yaw,
                None => tracing::debug!("discarding invalid pose"),
            }
        }
        self.last
    }
}

/// Produces raw yaw samples in degrees
pub trait AngleSource {
    /// Current raw yaw in `[0, 360)`; `elapsed` is the time since tracking started
    fn raw_yaw(&mut self, elapsed: Duration) -> f32;
}

/// The closed set of angle sources a session can run
#[enum_delegate::implement(AngleSource, pub trait AngleSource { fn raw_yaw(&mut self, elapsed: Duration) -> f32; })]
pub enum TrackerSource {
    Rotate(Rotate),
    Sweep(Sweep),
    Static(Static),
    Tracked(Tracked),
}

impl TrackerSource {
    /// Test-pattern source for the configured mode
    pub fn from_config(config: &TrackingConfig) -> Self {
        match config.mode {
            TrackingMode::Rotate => Rotate { degrees_per_second: config.rotate_degrees_per_second }.into(),
            TrackingMode::Sweep => Sweep { amplitude: config.sweep_amplitude_degrees, rate: config.sweep_rate }.into(),
            TrackingMode::Static => Static::new(config.static_angle).into(),
        }
    }

    /// Handle for changing the angle, if this is a static source
    pub fn static_handle(&self) -> Option<StaticHandle> {
        match self {
            TrackerSource::Static(s) => Some(s.handle()),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TrackerSource::Rotate(_) => "rotate",
            TrackerSource::Sweep(_) => "sweep",
            TrackerSource::Static(_) => "static",
            TrackerSource::Tracked(_) => "tracked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f32) -> Duration {
        Duration::from_secs_f32(s)
    }

    fn y_rotation(degrees: f32) -> Pose {
        let (sin, cos) = degrees.to_radians().sin_cos();
        [[cos, 0.0, sin, 0.0], [0.0, 1.0, 0.0, 1.7], [-sin, 0.0, cos, 0.0]]
    }

    #[test]
    fn rotate_wraps() {
        let mut source = Rotate { degrees_per_second: 30.0 };
        assert!((source.raw_yaw(secs(2.0)) - 60.0).abs() < 1e-3);
        assert!((source.raw_yaw(secs(13.0)) - 30.0).abs() < 1e-3);
    }

    #[test]
    fn sweep_peaks_at_amplitude() {
        let mut source = Sweep { amplitude: 180.0, rate: 0.5 };
        assert_eq!(source.raw_yaw(Duration::ZERO), 0.0);
        assert!((source.raw_yaw(secs(core::f32::consts::PI)) - 180.0).abs() < 1e-2);
        // -180 wraps round to 180
        assert!((source.raw_yaw(secs(3.0 * core::f32::consts::PI)) - 180.0).abs() < 1e-2);
        assert!(source.raw_yaw(secs(2.0 * core::f32::consts::PI + 1.0)) > 180.0);
    }

    #[test]
    fn static_angle_is_set_through_handle() {
        let mut source = TrackerSource::from_config(&TrackingConfig {
            mode: TrackingMode::Static,
            static_angle: -45.0,
            ..TrackingConfig::default()
        });
        assert_eq!(source.raw_yaw(Duration::ZERO), 315.0);

        let handle = source.static_handle().unwrap();
        handle.set(90.0);
        handle.set(f32::NAN);
        assert_eq!(source.raw_yaw(Duration::ZERO), 90.0);
        assert_eq!(source.name(), "static");
    }

    #[test]
    fn pose_yaw_turning_right_is_positive() {
        assert_eq!(yaw_from_pose(&y_rotation(0.0)), Some(0.0));
        let right = yaw_from_pose(&y_rotation(-90.0)).unwrap();
        assert!((right - 90.0).abs() < 1e-3, "{right}");
        let left = yaw_from_pose(&y_rotation(30.0)).unwrap();
        assert!((left - 330.0).abs() < 1e-3, "{left}");

        let mut looking_up = y_rotation(0.0);
        looking_up[0][2] = 0.0;
        looking_up[2][2] = 0.0;
        assert_eq!(yaw_from_pose(&looking_up), None);
    }

    #[test]
    fn tracked_source_holds_last_valid_pose() {
        let (mut producer, consumer) = rtrb::RingBuffer::new(8);
        let mut source: TrackerSource = Tracked::new(consumer).into();
        assert_eq!(source.raw_yaw(Duration::ZERO), 0.0);

        producer.push(y_rotation(-20.0)).unwrap();
        producer.push(y_rotation(-40.0)).unwrap();
        assert!((source.raw_yaw(Duration::ZERO) - 40.0).abs() < 1e-3);

        let mut broken = y_rotation(0.0);
        broken[0][2] = f32::NAN;
        producer.push(broken).unwrap();
        assert!((source.raw_yaw(Duration::ZERO) - 40.0).abs() < 1e-3);
    }
}
