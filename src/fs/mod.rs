//! Filesystem abstraction and the traversal-primitive contract
//!
//! The scan core never touches the OS directly. It talks to a [`FileSystem`]
//! which knows how to split a path into root device and relative part, and
//! how to drive a set of [`TraverserCallback`]s over the directories below a
//! root, with up to `parallel_ops` concurrent I/O operations.
//!
//! Error negotiation happens through the callbacks: the primitive reports
//! enumeration and per-item probe failures and retries or abandons according
//! to the returned [`ErrorDecision`].

pub mod local;

pub use local::LocalFileSystem;

use crate::error::Interruption;
use std::fmt;

/// Separator used in base-relative paths on all platforms
pub const REL_PATH_SEPARATOR: char = '/';

/// An opaque display path addressing a folder on some storage endpoint
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbstractPath {
    raw: String,
}

impl AbstractPath {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn display(&self) -> &str {
        &self.raw
    }

    /// Append a '/'-separated relative path for display purposes
    pub fn append_rel(&self, rel_path: &str) -> AbstractPath {
        if rel_path.is_empty() {
            return self.clone();
        }
        let mut raw = self.raw.clone();
        if !raw.ends_with(REL_PATH_SEPARATOR) {
            raw.push(REL_PATH_SEPARATOR);
        }
        raw.push_str(rel_path);
        AbstractPath { raw }
    }
}

impl fmt::Display for AbstractPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A path split into its root device and the remainder below it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathComponents {
    /// Outermost prefix identifying the storage endpoint
    pub root_path: AbstractPath,

    /// '/'-separated path below the root; empty when the path is the root
    pub rel_path: String,
}

/// A directory entry describing a regular file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub item_name: String,
    pub mod_time: i64,
    pub file_size: u64,
    pub file_id: u64,

    /// True when the file was reached by following a symlink
    pub followed_symlink: bool,
}

/// A directory entry describing a sub-folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    pub item_name: String,

    /// True when the folder was reached by following a symlink
    pub followed_symlink: bool,
}

/// A directory entry describing a symbolic link (not yet resolved)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkInfo {
    pub item_name: String,
    pub mod_time: i64,
}

/// What to do with a symlink after the callback inspected it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkHandling {
    /// Do not resolve the link target
    Skip,
    /// Resolve the target and deliver it as file or folder
    Follow,
}

/// Resolution for a negotiable traversal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDecision {
    /// Record the failure and move on
    Continue,
    /// Repeat the failed operation
    Retry,
}

/// Visitor invoked by the traversal primitive once per directory entry
///
/// `on_folder` returning a child callback instructs the primitive to descend
/// into that folder and drive the child over its entries; returning `None`
/// prunes the subtree. All entry points observe cancellation and surface it
/// as [`Interruption`].
pub trait TraverserCallback: Send {
    fn on_file(&mut self, info: &FileInfo) -> Result<(), Interruption>;

    fn on_folder(
        &mut self,
        info: &FolderInfo,
    ) -> Result<Option<Box<dyn TraverserCallback>>, Interruption>;

    fn on_symlink(&mut self, info: &SymlinkInfo) -> Result<LinkHandling, Interruption>;

    /// A directory enumeration failed; decide between retry and abandon
    fn report_dir_error(
        &mut self,
        msg: &str,
        retry_number: usize,
    ) -> Result<ErrorDecision, Interruption>;

    /// Probing a single item failed; decide between retry and abandon
    fn report_item_error(
        &mut self,
        msg: &str,
        retry_number: usize,
        item_name: &str,
    ) -> Result<ErrorDecision, Interruption>;
}

/// One unit of traversal work: a folder below the root plus its callback
pub struct TraversalJob {
    /// '/'-separated path below the traversal root; empty for the root itself
    pub rel_path: String,

    /// Callback driven over the folder's entries
    pub callback: Box<dyn TraverserCallback>,
}

/// A storage backend the scan core can traverse
pub trait FileSystem: Send + Sync {
    /// Split a path into root device and relative remainder
    fn path_components(&self, path: &AbstractPath) -> PathComponents;

    /// Whether `traverse_folders_parallel` honors `parallel_ops > 1`
    fn parallel_traversal_supported(&self) -> bool {
        true
    }

    /// Enumerate each workload folder and drive its callback tree, using up
    /// to `parallel_ops` concurrent operations against this device
    fn traverse_folders_parallel(
        &self,
        root: &AbstractPath,
        workload: Vec<TraversalJob>,
        parallel_ops: usize,
    ) -> Result<(), Interruption>;
}

/// Run a fallible I/O action, negotiating failures through the item-error
/// channel
///
/// On failure the error is formatted via `describe`, the retry counter is
/// bumped and the decision is requested from the callback; `Retry` repeats
/// the action, `Continue` abandons it and yields `None`.
pub fn try_reporting_item_error<T>(
    callback: &mut dyn TraverserCallback,
    item_name: &str,
    mut action: impl FnMut() -> std::io::Result<T>,
    describe: impl Fn(&std::io::Error) -> String,
) -> Result<Option<T>, Interruption> {
    let mut retry_number = 0usize;
    loop {
        match action() {
            Ok(value) => return Ok(Some(value)),
            Err(err) => match callback.report_item_error(&describe(&err), retry_number, item_name)? {
                ErrorDecision::Retry => retry_number += 1,
                ErrorDecision::Continue => return Ok(None),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_rel() {
        let base = AbstractPath::new("/data");
        assert_eq!(base.append_rel("a/b").display(), "/data/a/b");
        assert_eq!(base.append_rel("").display(), "/data");

        let root = AbstractPath::new("/");
        assert_eq!(root.append_rel("etc").display(), "/etc");
    }

    struct CountingCallback {
        decisions: Vec<ErrorDecision>,
        reported: Vec<(String, usize)>,
    }

    impl TraverserCallback for CountingCallback {
        fn on_file(&mut self, _: &FileInfo) -> Result<(), Interruption> {
            Ok(())
        }

        fn on_folder(
            &mut self,
            _: &FolderInfo,
        ) -> Result<Option<Box<dyn TraverserCallback>>, Interruption> {
            Ok(None)
        }

        fn on_symlink(&mut self, _: &SymlinkInfo) -> Result<LinkHandling, Interruption> {
            Ok(LinkHandling::Skip)
        }

        fn report_dir_error(&mut self, _: &str, _: usize) -> Result<ErrorDecision, Interruption> {
            Ok(ErrorDecision::Continue)
        }

        fn report_item_error(
            &mut self,
            msg: &str,
            retry_number: usize,
            _: &str,
        ) -> Result<ErrorDecision, Interruption> {
            self.reported.push((msg.to_string(), retry_number));
            Ok(self.decisions.remove(0))
        }
    }

    #[test]
    fn test_try_reporting_retries_then_succeeds() {
        let mut cb = CountingCallback {
            decisions: vec![ErrorDecision::Retry],
            reported: Vec::new(),
        };

        let mut attempts = 0;
        let result = try_reporting_item_error(
            &mut cb,
            "item",
            || {
                attempts += 1;
                if attempts < 2 {
                    Err(std::io::Error::other("transient"))
                } else {
                    Ok(attempts)
                }
            },
            |e| format!("probe failed: {e}"),
        )
        .unwrap();

        assert_eq!(result, Some(2));
        assert_eq!(cb.reported.len(), 1);
        assert_eq!(cb.reported[0].1, 0);
    }

    #[test]
    fn test_try_reporting_gives_up_on_continue() {
        let mut cb = CountingCallback {
            decisions: vec![ErrorDecision::Retry, ErrorDecision::Continue],
            reported: Vec::new(),
        };

        let result: Option<()> = try_reporting_item_error(
            &mut cb,
            "item",
            || Err(std::io::Error::other("permanent")),
            |e| e.to_string(),
        )
        .unwrap();

        assert!(result.is_none());
        assert_eq!(cb.reported.len(), 2);
        assert_eq!(cb.reported[1].1, 1);
    }
}
