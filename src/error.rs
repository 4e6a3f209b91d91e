//! Error types for syncscan
//!
//! This module defines the error hierarchy used across the crate:
//! - Scan-level errors surfaced by [`fill_buffer`](crate::scan::fill_buffer)
//! - Observer aborts (the foreground asked us to stop)
//! - Worker interruption (cooperative cancellation)
//! - Configuration and CLI errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include context about what to do
//! - Cancellation is a distinct failure kind, never conflated with I/O

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for a scan run
#[derive(Error, Debug)]
pub enum ScanError {
    /// The foreground observer asked to stop the scan
    #[error(transparent)]
    Aborted(#[from] ScanAbort),

    /// A worker thread could not be spawned
    #[error("failed to spawn worker {index}: {source}")]
    WorkerSpawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Raised by the foreground observer to cancel the scan
///
/// Propagates out of [`fill_buffer`](crate::scan::fill_buffer) after all
/// workers have been interrupted and joined.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("scan aborted: {reason}")]
pub struct ScanAbort {
    /// Human-readable reason supplied by the observer
    pub reason: String,
}

impl ScanAbort {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Cooperative cancellation observed inside a worker
///
/// Every cancellable wait and every traversal callback entry point returns
/// this when the worker has been asked to stop. It unwinds the traversal
/// stack; it is never negotiable with the observer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation interrupted")]
pub struct Interruption;

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Scan root does not exist or is not a directory
    #[error("invalid scan root '{path}': {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    /// Invalid exclude pattern
    #[error("invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Invalid parallel operation count
    #[error("invalid parallel op count {count}: must be at most {max}")]
    InvalidParallelOps { count: usize, max: usize },

    /// Report interval must be positive
    #[error("report interval must be greater than zero")]
    InvalidReportInterval,
}

/// Result type alias for ScanError
pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_conversion() {
        let abort = ScanAbort::new("user pressed cancel");
        let err: ScanError = abort.into();
        assert!(matches!(err, ScanError::Aborted(_)));
        assert_eq!(err.to_string(), "scan aborted: user pressed cancel");
    }

    #[test]
    fn test_interruption_display() {
        assert_eq!(Interruption.to_string(), "operation interrupted");
    }
}
