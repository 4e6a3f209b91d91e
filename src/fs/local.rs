//! Local filesystem traversal backed by std::fs
//!
//! Each `traverse_folders_parallel` call runs a small worker pool over a
//! shared job queue of directories. A job owns the callback for its folder;
//! descending into a sub-folder enqueues a new job with the child callback,
//! so up to `parallel_ops` directories are enumerated concurrently against
//! the device.

use crate::error::Interruption;
use crate::fs::{
    AbstractPath, ErrorDecision, FileInfo, FileSystem, FolderInfo, LinkHandling, PathComponents,
    SymlinkInfo, TraversalJob, TraverserCallback, try_reporting_item_error, REL_PATH_SEPARATOR,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, trace, warn};

/// Poll interval for idle pool workers
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Scans directories reachable through the OS filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFileSystem {
    fn path_components(&self, path: &AbstractPath) -> PathComponents {
        let mut root = String::new();
        let mut segments: Vec<String> = Vec::new();

        for component in Path::new(path.display()).components() {
            match component {
                Component::Prefix(prefix) => {
                    root.push_str(&prefix.as_os_str().to_string_lossy());
                }
                Component::RootDir => root.push(REL_PATH_SEPARATOR),
                Component::CurDir => {}
                Component::ParentDir => segments.push("..".to_owned()),
                Component::Normal(seg) => segments.push(seg.to_string_lossy().into_owned()),
            }
        }

        // relative inputs have no root component; anchor them at the
        // process-wide root so they still land on one device bucket
        if root.is_empty() {
            root.push(REL_PATH_SEPARATOR);
        }

        PathComponents {
            root_path: AbstractPath::new(root),
            rel_path: segments.join("/"),
        }
    }

    fn traverse_folders_parallel(
        &self,
        root: &AbstractPath,
        workload: Vec<TraversalJob>,
        parallel_ops: usize,
    ) -> Result<(), Interruption> {
        let pool = JobPool::new();

        for job in workload {
            let abs_path = resolve(root, &job.rel_path);
            pool.push(DirJob {
                abs_path,
                callback: job.callback,
            });
        }

        pool.run(parallel_ops.max(1))
    }
}

/// A directory waiting to be enumerated
struct DirJob {
    abs_path: PathBuf,
    callback: Box<dyn TraverserCallback>,
}

/// Shared queue of directory jobs plus completion tracking
///
/// `pending` counts queued plus in-flight jobs; it only reaches zero once the
/// whole tree has been enumerated, which is the pool's exit condition.
struct JobPool {
    tx: Sender<DirJob>,
    rx: Receiver<DirJob>,
    pending: Arc<AtomicUsize>,
    aborted: Arc<AtomicBool>,
}

impl JobPool {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            pending: Arc::new(AtomicUsize::new(0)),
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    fn push(&self, job: DirJob) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        // send on an unbounded channel only fails when disconnected; the pool
        // holds both ends for its whole lifetime
        if self.tx.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn run(&self, parallel_ops: usize) -> Result<(), Interruption> {
        if parallel_ops <= 1 {
            self.worker_loop();
        } else {
            std::thread::scope(|scope| {
                for _ in 0..parallel_ops {
                    scope.spawn(|| self.worker_loop());
                }
            });
        }

        if self.aborted.load(Ordering::Relaxed) {
            Err(Interruption)
        } else {
            Ok(())
        }
    }

    fn worker_loop(&self) {
        loop {
            if self.aborted.load(Ordering::Relaxed) {
                return;
            }

            match self.rx.recv_timeout(IDLE_POLL) {
                Ok(job) => {
                    let path = job.abs_path.clone();
                    let result = self.process_dir(job);
                    self.pending.fetch_sub(1, Ordering::SeqCst);

                    if result.is_err() {
                        debug!(path = %path.display(), "traversal interrupted");
                        self.aborted.store(true, Ordering::Relaxed);
                        return;
                    }
                }
                Err(_) => {
                    if self.pending.load(Ordering::SeqCst) == 0 {
                        return;
                    }
                }
            }
        }
    }

    /// Enumerate one directory, driving its callback over every entry
    ///
    /// A failed enumeration is negotiated through `report_dir_error`; Retry
    /// restarts the enumeration from the beginning, Continue abandons the
    /// directory (the callback discards whatever it already collected).
    /// Entries delivered before a restart are never delivered twice: a
    /// replayed folder entry would enqueue a second job for the same child
    /// and traverse its subtree again.
    fn process_dir(&self, job: DirJob) -> Result<(), Interruption> {
        let DirJob { abs_path, mut callback } = job;
        let mut retry_number = 0usize;
        let mut delivered: HashSet<OsString> = HashSet::new();

        'enumerate: loop {
            let reader = match fs::read_dir(&abs_path) {
                Ok(reader) => reader,
                Err(err) => {
                    let msg = format!("Cannot open directory \"{}\": {}", abs_path.display(), err);
                    match callback.report_dir_error(&msg, retry_number)? {
                        ErrorDecision::Retry => {
                            retry_number += 1;
                            continue 'enumerate;
                        }
                        ErrorDecision::Continue => return Ok(()),
                    }
                }
            };

            for entry in reader {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        let msg =
                            format!("Cannot read directory \"{}\": {}", abs_path.display(), err);
                        match callback.report_dir_error(&msg, retry_number)? {
                            ErrorDecision::Retry => {
                                retry_number += 1;
                                continue 'enumerate;
                            }
                            ErrorDecision::Continue => return Ok(()),
                        }
                    }
                };

                if !delivered.insert(entry.file_name()) {
                    continue;
                }

                let item_name = entry.file_name().to_string_lossy().into_owned();
                let child_path = abs_path.join(entry.file_name());

                let metadata = match try_reporting_item_error(
                    callback.as_mut(),
                    &item_name,
                    || fs::symlink_metadata(&child_path),
                    |e| format!("Cannot read attributes of \"{}\": {}", child_path.display(), e),
                )? {
                    Some(metadata) => metadata,
                    None => continue,
                };

                if metadata.file_type().is_symlink() {
                    self.visit_symlink(callback.as_mut(), &item_name, &child_path, &metadata)?;
                } else if metadata.is_dir() {
                    let info = FolderInfo {
                        item_name,
                        followed_symlink: false,
                    };
                    if let Some(child_callback) = callback.on_folder(&info)? {
                        self.push(DirJob {
                            abs_path: child_path,
                            callback: child_callback,
                        });
                    }
                } else {
                    callback.on_file(&file_info(item_name, &metadata, false))?;
                }
            }

            return Ok(());
        }
    }

    /// Deliver a symlink entry and, if requested, its resolved target
    fn visit_symlink(
        &self,
        callback: &mut dyn TraverserCallback,
        item_name: &str,
        child_path: &Path,
        link_metadata: &fs::Metadata,
    ) -> Result<(), Interruption> {
        let info = SymlinkInfo {
            item_name: item_name.to_owned(),
            mod_time: mod_time_secs(link_metadata),
        };

        match callback.on_symlink(&info)? {
            LinkHandling::Skip => Ok(()),
            LinkHandling::Follow => {
                // broken links surface here as probe errors
                let target = try_reporting_item_error(
                    callback,
                    item_name,
                    || fs::metadata(child_path),
                    |e| format!("Cannot resolve symbolic link \"{}\": {}", child_path.display(), e),
                )?;

                let Some(target) = target else { return Ok(()) };

                if target.is_dir() {
                    let info = FolderInfo {
                        item_name: item_name.to_owned(),
                        followed_symlink: true,
                    };
                    if let Some(child_callback) = callback.on_folder(&info)? {
                        self.push(DirJob {
                            abs_path: child_path.to_path_buf(),
                            callback: child_callback,
                        });
                    }
                } else {
                    callback.on_file(&file_info(item_name.to_owned(), &target, true))?;
                }
                Ok(())
            }
        }
    }
}

fn file_info(item_name: String, metadata: &fs::Metadata, followed_symlink: bool) -> FileInfo {
    FileInfo {
        item_name,
        mod_time: mod_time_secs(metadata),
        file_size: metadata.len(),
        file_id: file_id(metadata),
        followed_symlink,
    }
}

fn mod_time_secs(metadata: &fs::Metadata) -> i64 {
    match metadata.modified() {
        Ok(time) => match time.duration_since(UNIX_EPOCH) {
            Ok(since) => since.as_secs() as i64,
            Err(before) => -(before.duration().as_secs() as i64),
        },
        Err(err) => {
            trace!(error = %err, "modification time unavailable");
            0
        }
    }
}

#[cfg(unix)]
fn file_id(metadata: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn file_id(_metadata: &fs::Metadata) -> u64 {
    0
}

fn resolve(root: &AbstractPath, rel_path: &str) -> PathBuf {
    let mut path = PathBuf::from(root.display());
    for segment in rel_path.split(REL_PATH_SEPARATOR).filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    if path.as_os_str().is_empty() {
        warn!("empty traversal root, falling back to current directory");
        path.push(".");
    }
    path
}
