//! Smoothed yaw shared between the tracker thread and the audio callback
//!
//! [`angle_state`] splits one shared slot into an [`AngleWriter`] (owned by the
//! angle-update context) and an [`AngleReader`] (owned by the audio context).
//! The smoothed value is stored as the bit pattern of an `f32` in an
//! `AtomicU32`, so a read never blocks and can never observe a torn value.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::layout::{normalize_degrees, shortest_delta};

#[derive(Debug)]
struct SharedAngle {
    smoothed: AtomicU32,
    raw: AtomicU32,
}

impl SharedAngle {
    fn new(initial: f32) -> Self {
        Self {
            smoothed: AtomicU32::new(initial.to_bits()),
            raw: AtomicU32::new(initial.to_bits()),
        }
    }
}

/// Create a smoothed angle slot with smoothing factor `alpha` (`0 <= alpha < 1`).
///
/// Higher values are smoother but lag more: 0.85 is a good balance, 0.95 is
/// very smooth with noticeable lag, 0.7 is responsive with slight jitter.
pub fn angle_state(alpha: f32) -> Result<(AngleWriter, AngleReader)> {
    angle_state_from(alpha, 0.0)
}

/// Like [`angle_state`] but starting from `initial` degrees instead of 0
pub fn angle_state_from(alpha: f32, initial: f32) -> Result<(AngleWriter, AngleReader)> {
    if !(0.0..1.0).contains(&alpha) {
        return Err(Error::config(format!("smoothing factor must be in [0, 1), got {alpha}")));
    }
    if !initial.is_finite() {
        return Err(Error::config("initial angle must be finite"));
    }

    let initial = normalize_degrees(initial);
    let shared = Arc::new(SharedAngle::new(initial));
    let writer = AngleWriter {
        shared: shared.clone(),
        alpha,
        smoothed: initial,
        last_raw: initial,
        forward: 0.0,
    };
    Ok((writer, AngleReader { shared }))
}

/// The single writer side of the angle slot.
///
/// Not `Clone`: exactly one angle-update context owns it.
#[derive(Debug)]
pub struct AngleWriter {
    shared: Arc<SharedAngle>,
    alpha: f32,
    smoothed: f32,
    last_raw: f32,
    /// Raw yaw treated as straight ahead
    forward: f32,
}

impl AngleWriter {
    /// Feed one raw yaw sample (degrees, any range) and advance the moving average.
    ///
    /// The average moves along the shortest arc, so 350° → 10° passes through 0°.
    /// Non-finite samples are ignored. Returns the new smoothed angle.
    pub fn update(&mut self, raw: f32) -> f32 {
        if !raw.is_finite() {
            tracing::debug!(raw, "ignoring non-finite yaw sample");
            return self.smoothed;
        }

        let raw = normalize_degrees(raw - self.forward);
        self.last_raw = raw;

        // alpha * smoothed + (1 - alpha) * raw, with raw unwrapped next to smoothed
        let delta = shortest_delta(self.smoothed, raw);
        self.smoothed = normalize_degrees(self.smoothed + (1.0 - self.alpha) * delta);

        self.shared.raw.store(raw.to_bits(), Ordering::Release);
        self.shared.smoothed.store(self.smoothed.to_bits(), Ordering::Release);
        self.smoothed
    }

    /// Make the most recent raw direction the new forward reference
    pub fn recenter(&mut self) {
        self.forward = normalize_degrees(self.forward + self.last_raw);
        self.smoothed = normalize_degrees(self.smoothed - self.last_raw);
        self.last_raw = 0.0;
        self.shared.raw.store(0.0f32.to_bits(), Ordering::Release);
        self.shared.smoothed.store(self.smoothed.to_bits(), Ordering::Release);
        tracing::info!(forward = self.forward, "recentered yaw");
    }
}

/// The reader side of the angle slot, owned by the audio context. Reading never blocks.
///
/// Not `Clone`: observers that only display the angle take an [`AngleMonitor`].
#[derive(Debug)]
pub struct AngleReader {
    shared: Arc<SharedAngle>,
}

impl AngleReader {
    /// A read-only handle for status displays and logging
    pub fn monitor(&self) -> AngleMonitor {
        AngleMonitor { shared: self.shared.clone() }
    }

    /// Current smoothed yaw in `[0, 360)`
    #[inline]
    pub fn read(&self) -> f32 {
        f32::from_bits(self.shared.smoothed.load(Ordering::Acquire))
    }
}

/// Observer view of the angle slot, for anything outside the audio path
#[derive(Clone, Debug)]
pub struct AngleMonitor {
    shared: Arc<SharedAngle>,
}

impl AngleMonitor {
    /// Current smoothed yaw in `[0, 360)`
    #[inline]
    pub fn read(&self) -> f32 {
        f32::from_bits(self.shared.smoothed.load(Ordering::Acquire))
    }

    /// Latest raw yaw fed to the writer, relative to the forward reference
    #[inline]
    pub fn raw(&self) -> f32 {
        f32::from_bits(self.shared.raw.load(Ordering::Acquire))
    }
}
