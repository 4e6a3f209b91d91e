//! Worker/foreground coordination
//!
//! The [`ScanCoordinator`] is the only shared mutable state between the
//! traversal workers and the foreground thread. It serializes two things:
//!
//! - error round trips: one worker at a time parks an error in a single-slot
//!   mailbox and blocks until the foreground deposits the decision in the
//!   response slot
//! - progress: only the lowest-indexed active worker may publish, at most
//!   once per report interval
//!
//! Two independent locks back this: `request` for the error mailboxes and
//! the remaining-thread count, `status` for the display path and the active
//! worker table. They are never held at the same time. Workers keep
//! traversing (and publishing progress) while an error dialog is in flight.

use crate::error::{Interruption, ScanAbort};
use crate::fs::ErrorDecision;
use crate::scan::{InterruptFlag, ScanObserver};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Upper bound on how long a cancellable wait sleeps between flag checks
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// Error round-trip mailboxes plus worker accounting
struct RequestState {
    /// Error message + retry number parked by a worker
    error_request: Option<(String, usize)>,

    /// Decision deposited by the foreground
    error_response: Option<ErrorDecision>,

    /// Workers yet to finish; monotonically decreasing
    threads_to_finish: usize,
}

/// Progress display state
struct StatusState {
    /// Latest path a worker chose to advertise
    current_path: String,

    /// worker index -> declared parallel ops
    active_workers: BTreeMap<usize, usize>,
}

/// Broker between N traversal workers and the single foreground observer
pub struct ScanCoordinator {
    request: Mutex<RequestState>,
    ready_for_request: Condvar,
    new_request: Condvar,
    have_response: Condvar,

    status: Mutex<StatusState>,

    /// Worker currently permitted to publish progress (lowest active index)
    reporting_worker: AtomicUsize,

    items_scanned: AtomicU64,

    report_interval: Duration,
}

impl ScanCoordinator {
    pub fn new(threads_to_finish: usize, report_interval: Duration) -> Self {
        Self {
            request: Mutex::new(RequestState {
                error_request: None,
                error_response: None,
                threads_to_finish,
            }),
            ready_for_request: Condvar::new(),
            new_request: Condvar::new(),
            have_response: Condvar::new(),
            status: Mutex::new(StatusState {
                current_path: String::new(),
                active_workers: BTreeMap::new(),
            }),
            reporting_worker: AtomicUsize::new(0),
            items_scanned: AtomicU64::new(0),
            report_interval,
        }
    }

    /// Park an error and block until the foreground decides (worker context)
    ///
    /// At most one round trip is in flight across all workers; later callers
    /// queue until both mailbox slots cleared. Every wait observes the
    /// interrupt flag and fails with [`Interruption`] when raised.
    pub fn report_error(
        &self,
        interrupt: &InterruptFlag,
        msg: &str,
        retry_number: usize,
    ) -> Result<ErrorDecision, Interruption> {
        let mut req = self.request.lock();

        while req.error_request.is_some() || req.error_response.is_some() {
            interrupt.check()?;
            self.ready_for_request.wait_for(&mut req, INTERRUPT_POLL);
        }
        interrupt.check()?;

        req.error_request = Some((msg.to_owned(), retry_number));
        self.new_request.notify_all();

        let decision = loop {
            if let Some(decision) = req.error_response.take() {
                break decision;
            }
            interrupt.check()?;
            self.have_response.wait_for(&mut req, INTERRUPT_POLL);
        };

        req.error_request = None;
        drop(req);
        self.ready_for_request.notify_all();

        Ok(decision)
    }

    /// Foreground loop: answer error requests, emit status at the report
    /// cadence, return once every worker finished
    pub fn drain_until_done(&self, observer: &mut dyn ScanObserver) -> Result<(), ScanAbort> {
        loop {
            let deadline = Instant::now() + self.report_interval;
            {
                let mut req = self.request.lock();
                loop {
                    let error_pending =
                        req.error_request.is_some() && req.error_response.is_none();

                    if error_pending {
                        if let Some((msg, retry_number)) = req.error_request.clone() {
                            let decision = observer.resolve_error(&msg, retry_number)?;
                            req.error_response = Some(decision);
                            self.have_response.notify_all();
                        }
                        continue;
                    }

                    if req.threads_to_finish == 0 {
                        drop(req);
                        // one last call for accurate final stats
                        observer.report_status(&self.current_status(), self.items_scanned())?;
                        return Ok(());
                    }

                    if self.new_request.wait_until(&mut req, deadline).timed_out() {
                        let error_pending =
                            req.error_request.is_some() && req.error_response.is_none();
                        if !error_pending && req.threads_to_finish != 0 {
                            break;
                        }
                    }
                }
            }

            observer.report_status(&self.current_status(), self.items_scanned())?;
        }
    }

    /// Lock-free gate: may this worker publish progress right now?
    ///
    /// True only for the reporting worker, and only when the report interval
    /// elapsed since its last publication. `last_report` stays worker-local;
    /// keeping it out of the coordinator avoids taking any lock here.
    pub fn may_report_progress(
        &self,
        worker_index: usize,
        last_report: &mut Option<Instant>,
    ) -> bool {
        if worker_index != self.reporting_worker.load(Ordering::Relaxed) {
            return false;
        }

        let now = Instant::now();
        match last_report {
            Some(last) if now.saturating_duration_since(*last) <= self.report_interval => false,
            _ => {
                *last_report = Some(now);
                true
            }
        }
    }

    /// Advertise the path a worker is currently reading (worker context)
    pub fn report_current_path(&self, display_path: String) {
        self.status.lock().current_path = display_path;
    }

    pub fn inc_items_scanned(&self) {
        self.items_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn items_scanned(&self) -> u64 {
        self.items_scanned.load(Ordering::Relaxed)
    }

    pub fn notify_work_begin(&self, worker_index: usize, parallel_ops: usize) {
        let mut status = self.status.lock();
        status.active_workers.insert(worker_index, parallel_ops);
        let first = status.active_workers.keys().next().copied().unwrap_or(0);
        self.reporting_worker.store(first, Ordering::Relaxed);
    }

    pub fn notify_work_end(&self, worker_index: usize) {
        {
            let mut status = self.status.lock();
            status.active_workers.remove(&worker_index);
            let first = status.active_workers.keys().next().copied().unwrap_or(0);
            self.reporting_worker.store(first, Ordering::Relaxed);
        }

        let all_done = {
            let mut req = self.request.lock();
            req.threads_to_finish = req.threads_to_finish.saturating_sub(1);
            req.threads_to_finish == 0
        };
        if all_done {
            self.new_request.notify_all();
        }
    }

    /// Compose the status line from the advertised path and the total
    /// parallel ops of all active workers
    pub fn current_status(&self) -> String {
        let (parallel_ops_total, display_path) = {
            let status = self.status.lock();
            let total: usize = status.active_workers.values().sum();
            (total, status.current_path.clone())
        };

        let mut text = String::from("Scanning: ");
        if parallel_ops_total >= 2 {
            text.push_str(&format!("[{parallel_ops_total} threads] "));
        }
        text.push_str(&display_path);
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    struct RecordingObserver {
        statuses: Vec<(String, u64)>,
        errors: Vec<(String, usize)>,
        decisions: Vec<ErrorDecision>,
    }

    impl RecordingObserver {
        fn new(decisions: Vec<ErrorDecision>) -> Self {
            Self {
                statuses: Vec::new(),
                errors: Vec::new(),
                decisions,
            }
        }
    }

    impl ScanObserver for RecordingObserver {
        fn report_status(&mut self, text: &str, items: u64) -> Result<(), ScanAbort> {
            self.statuses.push((text.to_string(), items));
            Ok(())
        }

        fn resolve_error(
            &mut self,
            msg: &str,
            retry_number: usize,
        ) -> Result<ErrorDecision, ScanAbort> {
            self.errors.push((msg.to_string(), retry_number));
            Ok(if self.decisions.is_empty() {
                ErrorDecision::Continue
            } else {
                self.decisions.remove(0)
            })
        }
    }

    #[test]
    fn test_progress_gate_lowest_worker_only() {
        let coord = ScanCoordinator::new(2, Duration::from_millis(50));
        coord.notify_work_begin(0, 1);
        coord.notify_work_begin(1, 1);

        let mut last = None;
        assert!(!coord.may_report_progress(1, &mut last));
        assert!(coord.may_report_progress(0, &mut last));

        // interval not yet elapsed
        assert!(!coord.may_report_progress(0, &mut last));

        thread::sleep(Duration::from_millis(60));
        assert!(coord.may_report_progress(0, &mut last));

        coord.notify_work_end(0);
        let mut last_other = None;
        assert!(coord.may_report_progress(1, &mut last_other));
    }

    #[test]
    fn test_status_line_annotates_parallelism() {
        let coord = ScanCoordinator::new(2, Duration::from_millis(10));
        coord.notify_work_begin(0, 2);
        coord.notify_work_begin(1, 3);
        coord.report_current_path("/mnt/data/file.txt".to_string());

        let status = coord.current_status();
        assert!(status.contains("[5 threads]"), "got: {status}");
        assert!(status.ends_with("/mnt/data/file.txt"));

        coord.notify_work_end(1);
        coord.notify_work_end(0);
        assert!(!coord.current_status().contains("threads"));
    }

    #[test]
    fn test_error_round_trip() {
        let coord = Arc::new(ScanCoordinator::new(1, Duration::from_millis(10)));
        let flag = InterruptFlag::new();

        let worker = {
            let coord = Arc::clone(&coord);
            let flag = flag.clone();
            thread::spawn(move || {
                coord.notify_work_begin(0, 1);
                let decision = coord.report_error(&flag, "cannot open directory", 0);
                coord.notify_work_end(0);
                decision
            })
        };

        let mut observer = RecordingObserver::new(vec![ErrorDecision::Retry]);
        coord.drain_until_done(&mut observer).unwrap();

        assert_eq!(worker.join().unwrap(), Ok(ErrorDecision::Retry));
        assert_eq!(observer.errors, vec![("cannot open directory".to_string(), 0)]);
        // the final status update always fires
        assert!(!observer.statuses.is_empty());
    }

    #[test]
    fn test_errors_are_serialized() {
        let coord = Arc::new(ScanCoordinator::new(2, Duration::from_millis(10)));
        let flag = InterruptFlag::new();

        let workers: Vec<_> = (0..2)
            .map(|idx| {
                let coord = Arc::clone(&coord);
                let flag = flag.clone();
                thread::spawn(move || {
                    coord.notify_work_begin(idx, 1);
                    let decision = coord.report_error(&flag, &format!("error {idx}"), idx);
                    coord.notify_work_end(idx);
                    decision
                })
            })
            .collect();

        let mut observer = RecordingObserver::new(Vec::new());
        coord.drain_until_done(&mut observer).unwrap();

        for worker in workers {
            assert_eq!(worker.join().unwrap(), Ok(ErrorDecision::Continue));
        }
        assert_eq!(observer.errors.len(), 2);
    }

    #[test]
    fn test_report_error_is_interruptible() {
        let coord = Arc::new(ScanCoordinator::new(1, Duration::from_millis(10)));
        let flag = InterruptFlag::new();

        let worker = {
            let coord = Arc::clone(&coord);
            let flag = flag.clone();
            thread::spawn(move || coord.report_error(&flag, "stuck", 0))
        };

        // nobody answers; cancellation must unblock the worker
        thread::sleep(Duration::from_millis(30));
        flag.interrupt();

        assert_eq!(worker.join().unwrap(), Err(Interruption));
    }

    #[test]
    fn test_items_scanned_accumulates() {
        let coord = ScanCoordinator::new(1, Duration::from_millis(10));
        assert_eq!(coord.items_scanned(), 0);
        coord.inc_items_scanned();
        coord.inc_items_scanned();
        assert_eq!(coord.items_scanned(), 2);
    }
}
