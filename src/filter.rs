//! Include/exclude predicates applied during traversal
//!
//! Filters see '/'-separated paths relative to the scanned base folder and
//! decide, per item, whether it belongs in the snapshot. Directory filtering
//! additionally answers whether an excluded directory might still contain
//! matching descendants, which controls descent.

use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Verdict of the directory filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirFilterVerdict {
    /// The directory itself passed the filter
    pub passed: bool,

    /// A descendant of the directory might pass even if the directory did not
    pub child_item_might_match: bool,
}

/// A predicate over base-relative paths
pub trait PathFilter: Send + Sync {
    /// Does a file or symlink at this relative path belong in the snapshot?
    fn pass_file_filter(&self, rel_path: &str) -> bool;

    /// Does a directory at this relative path belong in the snapshot, and
    /// could its subtree still contain matches if it does not?
    fn pass_dir_filter(&self, rel_path: &str) -> DirFilterVerdict;
}

/// Shared filter handle
///
/// Cloning shares the underlying filter. Equality and ordering are by handle
/// identity: two handles compare equal only when they point at the same
/// filter instance. Scan requests built from the same handle therefore
/// coalesce, while structurally identical but separately constructed filters
/// stay distinct.
#[derive(Clone)]
pub struct FilterRef(Arc<dyn PathFilter>);

impl FilterRef {
    pub fn new(filter: impl PathFilter + 'static) -> Self {
        Self(Arc::new(filter))
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl std::ops::Deref for FilterRef {
    type Target = dyn PathFilter;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for FilterRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for FilterRef {}

impl PartialOrd for FilterRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FilterRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl fmt::Debug for FilterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilterRef({:#x})", self.addr())
    }
}

/// Filter that admits everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PathFilter for AllowAll {
    fn pass_file_filter(&self, _rel_path: &str) -> bool {
        true
    }

    fn pass_dir_filter(&self, _rel_path: &str) -> DirFilterVerdict {
        DirFilterVerdict {
            passed: true,
            child_item_might_match: true,
        }
    }
}

/// Exclusion filter driven by a list of regular expressions
///
/// An item is excluded when any pattern matches its relative path. An
/// excluded directory excludes its whole subtree: descendants share the
/// matched path prefix, so no child can pass.
pub struct RegexFilter {
    exclude: Vec<Regex>,
}

impl RegexFilter {
    pub fn new(exclude: Vec<Regex>) -> Self {
        Self { exclude }
    }

    fn excluded(&self, rel_path: &str) -> bool {
        self.exclude.iter().any(|re| re.is_match(rel_path))
    }
}

impl PathFilter for RegexFilter {
    fn pass_file_filter(&self, rel_path: &str) -> bool {
        !self.excluded(rel_path)
    }

    fn pass_dir_filter(&self, rel_path: &str) -> DirFilterVerdict {
        let passed = !self.excluded(rel_path);
        DirFilterVerdict {
            passed,
            child_item_might_match: passed,
        }
    }
}

impl fmt::Debug for RegexFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegexFilter")
            .field("patterns", &self.exclude.len())
            .finish()
    }
}
