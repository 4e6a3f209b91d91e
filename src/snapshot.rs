//! Snapshot model: the output of a scan
//!
//! A scan produces one [`DirectoryValue`] per requested [`DirectoryKey`]: a
//! tree of [`FolderContainer`] nodes holding the files, sub-folders and
//! symlinks that passed the filter, plus two maps recording the directories
//! and items whose read ultimately failed.
//!
//! All nodes are created by the worker thread owning the base folder and are
//! never mutated after that worker terminates.

use crate::filter::FilterRef;
use crate::fs::AbstractPath;
use std::collections::BTreeMap;

/// How symbolic links encountered during traversal are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SymlinkMode {
    /// Never record or follow symlinks
    Exclude,
    /// Record the link itself (modification time only), never its target
    Direct,
    /// Resolve the link and record the target as file or folder
    Follow,
}

/// Identity of a single scan request: base folder + filter + symlink handling
///
/// Equality and ordering consider all three fields; the filter compares by
/// handle identity (see [`FilterRef`]).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirectoryKey {
    pub folder_path: AbstractPath,
    pub filter: FilterRef,
    pub symlink_mode: SymlinkMode,
}

/// Attributes recorded for a regular file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes {
    /// Modification time, seconds since the Unix epoch
    pub mod_time: i64,

    /// File size in bytes
    pub file_size: u64,

    /// Native file identifier (inode on Unix, 0 where unavailable)
    pub file_id: u64,

    /// Whether the file was reached through a followed symlink
    pub via_symlink: bool,
}

/// Attributes recorded for a symlink kept as-is (SymlinkMode::Direct)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkAttributes {
    /// Modification time of the link itself, seconds since the Unix epoch
    pub mod_time: i64,
}

/// A single child of a folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderEntry {
    File(FileAttributes),
    Folder {
        node: FolderContainer,
        via_symlink: bool,
    },
    Symlink(LinkAttributes),
}

/// One folder node: an ordered mapping of child name to entry
///
/// Child names are unique within a folder; nodes own their children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderContainer {
    entries: BTreeMap<String, FolderEntry>,
}

/// Recursive counts over a folder tree, used for summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotTotals {
    pub files: u64,
    pub folders: u64,
    pub symlinks: u64,
    pub bytes: u64,
}

impl FolderContainer {
    pub fn add_file(&mut self, name: &str, attrs: FileAttributes) {
        self.entries.insert(name.to_owned(), FolderEntry::File(attrs));
    }

    pub fn add_symlink(&mut self, name: &str, attrs: LinkAttributes) {
        self.entries
            .insert(name.to_owned(), FolderEntry::Symlink(attrs));
    }

    /// Insert a sub-folder node and return a handle to it
    ///
    /// Re-inserting an existing folder (e.g. after a retried enumeration)
    /// keeps the node already built.
    pub fn add_folder(&mut self, name: &str, via_symlink: bool) -> &mut FolderContainer {
        let entry = self
            .entries
            .entry(name.to_owned())
            .and_modify(|e| {
                if !matches!(e, FolderEntry::Folder { .. }) {
                    *e = FolderEntry::Folder {
                        node: FolderContainer::default(),
                        via_symlink,
                    };
                }
            })
            .or_insert_with(|| FolderEntry::Folder {
                node: FolderContainer::default(),
                via_symlink,
            });
        match entry {
            FolderEntry::Folder { node, .. } => node,
            _ => unreachable!(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FolderEntry> {
        self.entries.get(name)
    }

    pub fn file(&self, name: &str) -> Option<&FileAttributes> {
        match self.entries.get(name) {
            Some(FolderEntry::File(attrs)) => Some(attrs),
            _ => None,
        }
    }

    pub fn folder(&self, name: &str) -> Option<&FolderContainer> {
        match self.entries.get(name) {
            Some(FolderEntry::Folder { node, .. }) => Some(node),
            _ => None,
        }
    }

    pub fn symlink(&self, name: &str) -> Option<&LinkAttributes> {
        match self.entries.get(name) {
            Some(FolderEntry::Symlink(attrs)) => Some(attrs),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FolderEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every child of this node
    ///
    /// Used when a directory's enumeration is abandoned: a snapshot node and
    /// a failed-read record for the same directory are mutually exclusive.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Navigate to a nested folder node by name segments
    pub fn node_mut(&mut self, segments: &[String]) -> Option<&mut FolderContainer> {
        let mut cur = self;
        for seg in segments {
            match cur.entries.get_mut(seg) {
                Some(FolderEntry::Folder { node, .. }) => cur = node,
                _ => return None,
            }
        }
        Some(cur)
    }

    /// Recursive totals over this subtree (not counting the node itself)
    pub fn totals(&self) -> SnapshotTotals {
        let mut totals = SnapshotTotals::default();
        self.accumulate(&mut totals);
        totals
    }

    fn accumulate(&self, totals: &mut SnapshotTotals) {
        for entry in self.entries.values() {
            match entry {
                FolderEntry::File(attrs) => {
                    totals.files += 1;
                    totals.bytes += attrs.file_size;
                }
                FolderEntry::Folder { node, .. } => {
                    totals.folders += 1;
                    node.accumulate(totals);
                }
                FolderEntry::Symlink(_) => totals.symlinks += 1,
            }
        }
    }
}

/// Per-base scan output: the folder tree plus error bookkeeping
///
/// The error maps are keyed by relative path ('/'-separated). An entry in
/// either map never shadows a successfully recorded item under the same
/// relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryValue {
    /// Root of the snapshot tree for this base folder
    pub folder_cont: FolderContainer,

    /// Relative directory path -> last error message for enumerations that
    /// ultimately failed
    pub failed_folder_reads: BTreeMap<String, String>,

    /// Relative item path -> last error message for file/symlink probes that
    /// ultimately failed
    pub failed_item_reads: BTreeMap<String, String>,
}

impl DirectoryValue {
    /// True when the scan recorded neither entries nor errors
    pub fn is_empty(&self) -> bool {
        self.folder_cont.is_empty()
            && self.failed_folder_reads.is_empty()
            && self.failed_item_reads.is_empty()
    }
}
