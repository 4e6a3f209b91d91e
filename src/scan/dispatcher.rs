//! Device partitioning and worker dispatch
//!
//! [`fill_buffer`] is the entry point of the scan core. It buckets the
//! requested base folders by root device, spawns one traversal worker per
//! device and runs the foreground loop until all workers signalled
//! completion or the observer cancelled.
//!
//! Bucketing by root device keeps unrelated traversals from thrashing a
//! single spindle or piling connections onto one remote mount; parallelism
//! *within* a device is the caller's explicit choice and is handed to the
//! traversal primitive untouched.

use crate::error::{Interruption, ScanError};
use crate::fs::{AbstractPath, FileSystem, TraversalJob};
use crate::scan::callback::DirCallback;
use crate::scan::coordinator::ScanCoordinator;
use crate::scan::{InterruptFlag, ScanObserver};
use crate::snapshot::{DirectoryKey, DirectoryValue};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Scan every requested base folder into `buf`
///
/// On normal return `buf` holds exactly one [`DirectoryValue`] per input
/// key and no worker thread remains. When the observer cancels, all workers
/// are interrupted and joined before the abort propagates; `buf` is left
/// empty.
///
/// `device_parallel_ops` maps root devices to the maximum concurrent I/O
/// operations permitted against them; missing devices default to 1.
pub fn fill_buffer(
    fs: &Arc<dyn FileSystem>,
    folders_to_read: &BTreeSet<DirectoryKey>,
    buf: &mut BTreeMap<DirectoryKey, DirectoryValue>,
    device_parallel_ops: &BTreeMap<AbstractPath, usize>,
    observer: &mut dyn ScanObserver,
    report_interval: Duration,
) -> Result<(), ScanError> {
    buf.clear();

    if folders_to_read.is_empty() {
        return Ok(());
    }

    // one worker thread per root device
    let mut per_device: BTreeMap<AbstractPath, Vec<DirectoryKey>> = BTreeMap::new();
    for key in folders_to_read {
        let root = fs.path_components(&key.folder_path).root_path;
        per_device.entry(root).or_default().push(key.clone());
    }

    // pre-create one slot per key so each worker holds a stable, unshared
    // handle; no structural mutation happens while workers run
    let slots: BTreeMap<DirectoryKey, Arc<Mutex<DirectoryValue>>> = folders_to_read
        .iter()
        .map(|key| (key.clone(), Arc::new(Mutex::new(DirectoryValue::default()))))
        .collect();

    let coordinator = Arc::new(ScanCoordinator::new(per_device.len(), report_interval));
    let interrupt = InterruptFlag::new();

    let mut workers: Vec<ScanWorker> = Vec::with_capacity(per_device.len());
    let mut spawn_error = None;

    for (worker_index, (root_path, keys)) in per_device.into_iter().enumerate() {
        let mut parallel_ops = device_parallel_ops
            .get(&root_path)
            .copied()
            .unwrap_or(1)
            .max(1); // sanitize early for a correct status display
        if !fs.parallel_traversal_supported() {
            parallel_ops = 1;
        }

        let workload: Vec<(DirectoryKey, Arc<Mutex<DirectoryValue>>)> = keys
            .iter()
            .map(|key| (key.clone(), Arc::clone(&slots[key])))
            .collect();

        debug!(
            worker = worker_index,
            root = %root_path,
            bases = workload.len(),
            parallel_ops,
            "spawning traversal worker"
        );

        match ScanWorker::spawn(
            worker_index,
            Arc::clone(fs),
            root_path,
            workload,
            parallel_ops,
            Arc::clone(&coordinator),
            interrupt.clone(),
        ) {
            Ok(worker) => workers.push(worker),
            Err(err) => {
                spawn_error = Some(err);
                break;
            }
        }
    }

    let outcome: Result<(), ScanError> = match spawn_error {
        Some(err) => Err(err),
        None => coordinator
            .drain_until_done(observer)
            .map_err(ScanError::from),
    };

    // failure path: interrupt everyone first, then join; success path: all
    // workers already signalled completion, joining is immediate
    if outcome.is_err() {
        interrupt.interrupt();
    }
    for worker in workers {
        worker.join();
    }
    outcome?;

    // workers are gone; restore exclusive ownership of each snapshot
    for (key, slot) in slots {
        let value = match Arc::try_unwrap(slot) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().clone(),
        };
        buf.insert(key, value);
    }

    Ok(())
}

/// Calls `notify_work_end` on every exit path of a worker, keeping the
/// coordinator's remaining-thread count accurate even on interruption
struct WorkEndGuard {
    coordinator: Arc<ScanCoordinator>,
    index: usize,
}

impl Drop for WorkEndGuard {
    fn drop(&mut self) {
        self.coordinator.notify_work_end(self.index);
    }
}

/// One traversal worker thread, bound to a single root device
struct ScanWorker {
    index: usize,
    handle: Option<JoinHandle<Result<(), Interruption>>>,
}

impl ScanWorker {
    #[allow(clippy::too_many_arguments)]
    fn spawn(
        index: usize,
        fs: Arc<dyn FileSystem>,
        root_path: AbstractPath,
        workload: Vec<(DirectoryKey, Arc<Mutex<DirectoryValue>>)>,
        parallel_ops: usize,
        coordinator: Arc<ScanCoordinator>,
        interrupt: InterruptFlag,
    ) -> Result<Self, ScanError> {
        let handle = thread::Builder::new()
            .name(format!("traverser-{index}"))
            .spawn(move || {
                coordinator.notify_work_begin(index, parallel_ops);
                let _work_end = WorkEndGuard {
                    coordinator: Arc::clone(&coordinator),
                    index,
                };

                // one progress clock per worker
                let last_report = Arc::new(Mutex::new(None));

                let jobs: Vec<TraversalJob> = workload
                    .iter()
                    .map(|(key, slot)| TraversalJob {
                        rel_path: fs.path_components(&key.folder_path).rel_path,
                        callback: Box::new(DirCallback::base(
                            key,
                            Arc::clone(slot),
                            Arc::clone(&coordinator),
                            index,
                            interrupt.clone(),
                            Arc::clone(&last_report),
                        )),
                    })
                    .collect();

                fs.traverse_folders_parallel(&root_path, jobs, parallel_ops)
            })
            .map_err(|source| ScanError::WorkerSpawn { index, source })?;

        Ok(Self {
            index,
            handle: Some(handle),
        })
    }

    fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(Interruption)) => debug!(worker = self.index, "worker interrupted"),
                Err(_) => warn!(worker = self.index, "worker thread panicked"),
            }
        }
    }
}
