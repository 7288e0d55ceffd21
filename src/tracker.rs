//! The angle-update thread
//!
//! Polls a [`TrackerSource`] at a fixed rate and feeds every sample through the
//! [`AngleWriter`]. This is the only place the writer lives once a session is
//! running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::angle::AngleWriter;
use crate::error::{Error, Result};
use crate::nodes::source::{AngleSource, TrackerSource};

#[derive(Debug, Default)]
struct Flags {
    stop: AtomicBool,
    recenter: AtomicBool,
}

/// Handle to a running tracker thread. Stops and joins the thread when dropped.
pub struct TrackerThread {
    flags: Arc<Flags>,
    handle: Option<JoinHandle<()>>,
}

/// Spawn the tracker thread, polling `source` at `rate_hz`
pub fn spawn_tracker(mut source: TrackerSource, mut writer: AngleWriter, rate_hz: f32) -> Result<TrackerThread> {
    if !(rate_hz > 0.0 && rate_hz.is_finite()) {
        return Err(Error::config(format!("tracker rate must be > 0, got {rate_hz}")));
    }
    let period = Duration::from_secs_f32(1.0 / rate_hz);
    let flags = Arc::new(Flags::default());
    let thread_flags = flags.clone();

    tracing::info!(source = source.name(), rate_hz, "starting tracker");

    let handle = std::thread::Builder::new()
        .name("yawfield-tracker".into())
        .spawn(move || {
            let start = Instant::now();
            let mut next = start;
            while !thread_flags.stop.load(Ordering::Acquire) {
                let raw = source.raw_yaw(start.elapsed());
                writer.update(raw);
                if thread_flags.recenter.swap(false, Ordering::AcqRel) {
                    writer.recenter();
                }

                next += period;
                match next.checked_duration_since(Instant::now()) {
                    Some(wait) => std::thread::sleep(wait),
                    // fell behind; don't try to catch up with a burst of updates
                    None => next = Instant::now(),
                }
            }
            tracing::debug!("tracker stopped");
        })
        .map_err(Error::Io)?;

    Ok(TrackerThread { flags, handle: Some(handle) })
}

impl TrackerThread {
    /// Make the direction the source reports next the new forward
    pub fn recenter(&self) {
        self.flags.recenter.store(true, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it to exit
    pub fn stop(&mut self) {
        self.flags.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("tracker thread panicked");
            }
        }
    }
}

impl Drop for TrackerThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle::angle_state;
    use crate::nodes::source::Static;

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn feeds_source_into_angle_state() {
        let (writer, reader) = angle_state(0.0).unwrap();
        let source = Static::new(0.0);
        let handle = source.handle();
        let mut tracker = spawn_tracker(source.into(), writer, 500.0).unwrap();

        handle.set(120.0);
        assert!(wait_for(|| reader.read() == 120.0));

        tracker.recenter();
        assert!(wait_for(|| reader.read() == 0.0));
        handle.set(130.0);
        assert!(wait_for(|| (reader.read() - 10.0).abs() < 1e-3));

        tracker.stop();
        assert!(!tracker.is_running());
    }

    #[test]
    fn rejects_zero_rate() {
        let (writer, _reader) = angle_state(0.5).unwrap();
        assert!(spawn_tracker(Static::new(0.0).into(), writer, 0.0).is_err());
    }
}
