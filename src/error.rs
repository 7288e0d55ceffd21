//! Error types

use thiserror::Error;

/// Errors that can occur while configuring or running the rotation pipeline
///
/// Only startup problems are fatal. Once streams are running, the bridge
/// recovers from every variant locally and reports it through
/// [`PipelineStats`](crate::PipelineStats) instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid format, device or channel combination
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backend delivered a block that doesn't match the configured block size
    #[error("Block size mismatch: expected {expected} frames, got {actual}")]
    BlockSizeMismatch { expected: usize, actual: usize },

    /// NaN or infinity detected in a block
    #[error("Non-finite sample in {stage} block")]
    NumericFault { stage: &'static str },

    /// Block processing took longer than one block period
    #[error("Deadline miss: block took {elapsed_us}us, period is {period_us}us")]
    DeadlineMiss { elapsed_us: u64, period_us: u64 },

    /// Audio device could not be found or queried
    #[error("Audio device error: {0}")]
    Device(String),

    /// Audio stream could not be built or started
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// Config file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}

/// Result type for yawfield operations
pub type Result<T> = core::result::Result<T, Error>;
