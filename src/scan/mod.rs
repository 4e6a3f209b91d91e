//! Parallel scan core
//!
//! [`fill_buffer`] partitions the requested base folders by root device,
//! spawns one traversal worker per device and drives the foreground loop
//! until every worker finished. Workers talk to the single foreground
//! observer exclusively through the [`ScanCoordinator`].

pub mod callback;
pub mod coordinator;
pub mod dispatcher;

pub use callback::DirCallback;
pub use coordinator::ScanCoordinator;
pub use dispatcher::fill_buffer;

use crate::error::{Interruption, ScanAbort};
use crate::fs::ErrorDecision;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Foreground observer of a running scan
///
/// Both methods are invoked only from the thread that called
/// [`fill_buffer`]. Returning an error cancels the whole scan.
pub trait ScanObserver {
    /// Periodic progress: current status line plus items scanned so far
    fn report_status(&mut self, status_text: &str, items_scanned: u64) -> Result<(), ScanAbort>;

    /// A worker hit a negotiable error; decide between retry and continue
    fn resolve_error(
        &mut self,
        msg: &str,
        retry_number: usize,
    ) -> Result<ErrorDecision, ScanAbort>;
}

/// Shared cancellation flag observed by every worker
///
/// Cloning shares the flag. Once raised it never resets; workers surface it
/// as [`Interruption`] from their next suspension point.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    flag: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this flag to stop
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Fail with [`Interruption`] when the flag has been raised
    pub fn check(&self) -> Result<(), Interruption> {
        if self.is_interrupted() {
            Err(Interruption)
        } else {
            Ok(())
        }
    }
}
