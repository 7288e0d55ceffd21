//! Pipeline health counters
//!
//! The real-time side only ever bumps these with relaxed atomic adds. Reporting
//! (logging, status lines) happens elsewhere, from a [`StatsSnapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the audio callbacks and observers
#[derive(Debug, Default)]
pub struct PipelineStats {
    blocks: AtomicU64,
    deadline_misses: AtomicU64,
    numeric_faults: AtomicU64,
    underruns: AtomicU64,
    overruns: AtomicU64,
    size_mismatches: AtomicU64,
    dropped_frames: AtomicU64,
    worst_block_us: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_block(&self, elapsed_us: u64) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
        self.worst_block_us.fetch_max(elapsed_us, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_deadline_miss(&self) {
        self.deadline_misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_numeric_fault(&self) {
        self.numeric_faults.fetch_add(1, Ordering::Relaxed);
    }

    /// No full input block was available when playback needed one
    #[inline]
    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    /// `blocks` stale input blocks were skipped to catch up
    #[inline]
    pub fn record_overrun(&self, blocks: u64) {
        self.overruns.fetch_add(blocks, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_size_mismatch(&self) {
        self.size_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    /// Capture frames lost because the capture ring was full
    #[inline]
    pub fn record_dropped_frames(&self, frames: u64) {
        self.dropped_frames.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks: self.blocks.load(Ordering::Relaxed),
            deadline_misses: self.deadline_misses.load(Ordering::Relaxed),
            numeric_faults: self.numeric_faults.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            size_mismatches: self.size_mismatches.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            worst_block_us: self.worst_block_us.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub blocks: u64,
    pub deadline_misses: u64,
    pub numeric_faults: u64,
    pub underruns: u64,
    pub overruns: u64,
    pub size_mismatches: u64,
    pub dropped_frames: u64,
    pub worst_block_us: u64,
}

impl StatsSnapshot {
    /// Sum of every fault counter
    pub fn faults(&self) -> u64 {
        self.deadline_misses + self.numeric_faults + self.underruns + self.overruns + self.size_mismatches + self.dropped_frames
    }
}

/// Logs fault counters whenever they change since the last report
#[derive(Debug, Default)]
pub struct StatsReporter {
    last: StatsSnapshot,
}

impl StatsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log what changed since the previous call. Returns true if any fault counter moved.
    pub fn report(&mut self, stats: &PipelineStats) -> bool {
        let now = stats.snapshot();
        let changed = now.faults() != self.last.faults();
        if changed {
            tracing::warn!(
                deadline_misses = now.deadline_misses - self.last.deadline_misses,
                numeric_faults = now.numeric_faults - self.last.numeric_faults,
                underruns = now.underruns - self.last.underruns,
                overruns = now.overruns - self.last.overruns,
                size_mismatches = now.size_mismatches - self.last.size_mismatches,
                dropped_frames = now.dropped_frames - self.last.dropped_frames,
                worst_block_us = now.worst_block_us,
                "pipeline recovered from faults"
            );
        }
        self.last = now;
        changed
    }
}
