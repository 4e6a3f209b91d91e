//! Filter-aware traversal callbacks
//!
//! One [`DirCallback`] exists per directory being enumerated: the base
//! callback for the requested folder itself, and one child per descended
//! sub-folder, created with the relative prefix extended and the level
//! bumped. All callbacks of a base share a [`BaseContext`] and write into
//! the base's snapshot slot; the slot's mutex also covers the traversal
//! primitive's intra-device sub-threads.

use crate::error::Interruption;
use crate::filter::FilterRef;
use crate::fs::{
    AbstractPath, ErrorDecision, FileInfo, FolderInfo, LinkHandling, SymlinkInfo,
    TraverserCallback, REL_PATH_SEPARATOR,
};
use crate::scan::coordinator::ScanCoordinator;
use crate::scan::InterruptFlag;
use crate::snapshot::{
    DirectoryKey, DirectoryValue, FileAttributes, FolderContainer, LinkAttributes, SymlinkMode,
};
use crate::{LOCK_FILE_SUFFIX, SYNC_DB_SUFFIX};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// Traversal refuses to descend past this nesting level; deeper trees are
/// treated as endless recursion (e.g. a followed symlink cycle)
pub const MAX_FOLDER_DEPTH: usize = 100;

/// State shared by every callback of one base folder
struct BaseContext {
    base_path: AbstractPath,
    filter: FilterRef,
    symlink_mode: SymlinkMode,
    output: Arc<Mutex<DirectoryValue>>,
    coordinator: Arc<ScanCoordinator>,
    worker_index: usize,
    interrupt: InterruptFlag,

    /// Worker-level progress clock; never shared with other workers
    last_report: Arc<Mutex<Option<Instant>>>,
}

/// Visitor for one directory of a scanned base folder
pub struct DirCallback {
    ctx: Arc<BaseContext>,

    /// '/'-postfixed relative path of the enumerated directory; empty for
    /// the base folder
    parent_rel_path: String,

    /// Name segments addressing this directory's node in the snapshot tree
    node_path: Vec<String>,

    level: usize,
}

impl DirCallback {
    /// Build the callback for a requested base folder (level 0, empty prefix)
    pub fn base(
        key: &DirectoryKey,
        output: Arc<Mutex<DirectoryValue>>,
        coordinator: Arc<ScanCoordinator>,
        worker_index: usize,
        interrupt: InterruptFlag,
        last_report: Arc<Mutex<Option<Instant>>>,
    ) -> Self {
        let callback = Self {
            ctx: Arc::new(BaseContext {
                base_path: key.folder_path.clone(),
                filter: key.filter.clone(),
                symlink_mode: key.symlink_mode,
                output,
                coordinator,
                worker_index,
                interrupt,
                last_report,
            }),
            parent_rel_path: String::new(),
            node_path: Vec::new(),
            level: 0,
        };

        // advertise the base right away: the first directory access may block
        callback.publish_progress("");
        callback
    }

    fn rel_path_of(&self, item_name: &str) -> String {
        format!("{}{item_name}", self.parent_rel_path)
    }

    fn publish_progress(&self, rel_path: &str) {
        let mut last_report = self.ctx.last_report.lock();
        if self
            .ctx
            .coordinator
            .may_report_progress(self.ctx.worker_index, &mut last_report)
        {
            let display = self.ctx.base_path.append_rel(rel_path).display().to_owned();
            self.ctx.coordinator.report_current_path(display);
        }
    }

    fn with_node(&self, f: impl FnOnce(&mut FolderContainer)) {
        let mut output = self.ctx.output.lock();
        if let Some(node) = output.folder_cont.node_mut(&self.node_path) {
            f(node);
        }
    }

    /// Route a synthesized item failure through the negotiation loop; Retry
    /// re-raises the same failure with the retry counter bumped
    fn report_item_failure(&mut self, msg: &str, item_name: &str) -> Result<(), Interruption> {
        let mut retry_number = 0usize;
        loop {
            match self.report_item_error(msg, retry_number, item_name)? {
                ErrorDecision::Continue => return Ok(()),
                ErrorDecision::Retry => retry_number += 1,
            }
        }
    }
}

impl TraverserCallback for DirCallback {
    fn on_file(&mut self, info: &FileInfo) -> Result<(), Interruption> {
        self.ctx.interrupt.check()?;

        // the engine's own database and lock files are never recorded
        if info.item_name.ends_with(SYNC_DB_SUFFIX) || info.item_name.ends_with(LOCK_FILE_SUFFIX)
        {
            return Ok(());
        }

        let rel_path = self.rel_path_of(&info.item_name);

        // advertise progress whether or not the item passes the filter
        self.publish_progress(&rel_path);

        if !self.ctx.filter.pass_file_filter(&rel_path) {
            return Ok(());
        }

        self.with_node(|node| {
            node.add_file(
                &info.item_name,
                FileAttributes {
                    mod_time: info.mod_time,
                    file_size: info.file_size,
                    file_id: info.file_id,
                    via_symlink: info.followed_symlink,
                },
            );
        });
        self.ctx.coordinator.inc_items_scanned();
        Ok(())
    }

    fn on_folder(
        &mut self,
        info: &FolderInfo,
    ) -> Result<Option<Box<dyn TraverserCallback>>, Interruption> {
        self.ctx.interrupt.check()?;

        let rel_path = self.rel_path_of(&info.item_name);
        self.publish_progress(&rel_path);

        let verdict = self.ctx.filter.pass_dir_filter(&rel_path);
        if !verdict.passed && !verdict.child_item_might_match {
            return Ok(None);
        }
        // an excluded directory may still be descended; it stays in the tree
        // only as the carrier of admissible descendants

        self.with_node(|node| {
            node.add_folder(&info.item_name, info.followed_symlink);
        });
        if verdict.passed {
            self.ctx.coordinator.inc_items_scanned();
        }

        if self.level > MAX_FOLDER_DEPTH {
            let display = self.ctx.base_path.append_rel(&rel_path);
            let msg = format!("Cannot read directory \"{display}\": endless recursion.");
            self.report_item_failure(&msg, &info.item_name)?;
            return Ok(None);
        }

        let mut node_path = self.node_path.clone();
        node_path.push(info.item_name.clone());

        Ok(Some(Box::new(DirCallback {
            ctx: Arc::clone(&self.ctx),
            parent_rel_path: format!("{rel_path}{REL_PATH_SEPARATOR}"),
            node_path,
            level: self.level + 1,
        })))
    }

    fn on_symlink(&mut self, info: &SymlinkInfo) -> Result<LinkHandling, Interruption> {
        self.ctx.interrupt.check()?;

        let rel_path = self.rel_path_of(&info.item_name);
        self.publish_progress(&rel_path);

        match self.ctx.symlink_mode {
            SymlinkMode::Exclude => Ok(LinkHandling::Skip),

            SymlinkMode::Direct => {
                // always the file filter: the target's type is not stable
                if self.ctx.filter.pass_file_filter(&rel_path) {
                    self.with_node(|node| {
                        node.add_symlink(
                            &info.item_name,
                            LinkAttributes {
                                mod_time: info.mod_time,
                            },
                        );
                    });
                    self.ctx.coordinator.inc_items_scanned();
                }
                Ok(LinkHandling::Skip)
            }

            SymlinkMode::Follow => {
                // filter before resolving, so user-excluded broken links
                // never surface as errors; skip only when both filter views
                // agree the link cannot matter
                if !self.ctx.filter.pass_file_filter(&rel_path) {
                    let verdict = self.ctx.filter.pass_dir_filter(&rel_path);
                    if !verdict.passed && !verdict.child_item_might_match {
                        return Ok(LinkHandling::Skip);
                    }
                }
                Ok(LinkHandling::Follow)
            }
        }
    }

    fn report_dir_error(
        &mut self,
        msg: &str,
        retry_number: usize,
    ) -> Result<ErrorDecision, Interruption> {
        let decision =
            self.ctx
                .coordinator
                .report_error(&self.ctx.interrupt, msg, retry_number)?;

        if decision == ErrorDecision::Continue {
            let dir_rel_path = self
                .parent_rel_path
                .strip_suffix(REL_PATH_SEPARATOR)
                .unwrap_or(&self.parent_rel_path)
                .to_owned();
            let mut output = self.ctx.output.lock();
            // a failed enumeration may have delivered entries before dying;
            // the abandoned subtree must not survive next to its failure
            // record
            if let Some(node) = output.folder_cont.node_mut(&self.node_path) {
                node.clear();
            }
            output
                .failed_folder_reads
                .insert(dir_rel_path, msg.to_owned());
        }
        Ok(decision)
    }

    fn report_item_error(
        &mut self,
        msg: &str,
        retry_number: usize,
        item_name: &str,
    ) -> Result<ErrorDecision, Interruption> {
        let decision =
            self.ctx
                .coordinator
                .report_error(&self.ctx.interrupt, msg, retry_number)?;

        if decision == ErrorDecision::Continue {
            self.ctx
                .output
                .lock()
                .failed_item_reads
                .insert(self.rel_path_of(item_name), msg.to_owned());
        }
        Ok(decision)
    }
}
