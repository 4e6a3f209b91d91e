//! syncscan - Parallel Directory Scanner
//!
//! The scan core of a file-synchronization engine: given a set of base
//! folders, produce per folder a hierarchical snapshot of its contents
//! (files, sub-folders, symlinks) filtered by a caller-supplied predicate,
//! while a single foreground observer receives progress and arbitrates
//! error resolution.
//!
//! # Features
//!
//! - **One worker per device**: base folders are bucketed by root device so
//!   parallel traversal never oversubscribes a single spindle or remote
//!   mount; per-device parallelism is the caller's explicit choice.
//!
//! - **Single foreground observer**: progress ticks and blocking error
//!   dialogs from all workers are multiplexed through one coordinator, so
//!   the caller only ever deals with one thread.
//!
//! - **Cooperative cancellation**: every wait and every traversal callback
//!   observes an interrupt flag; cancelling never leaks worker threads.
//!
//! - **Filter-aware traversal**: include/exclude predicates prune subtrees
//!   before descent; excluded directories are still entered when they might
//!   carry admissible descendants.
//!
//! # Architecture
//!
//! ```text
//!                        ┌────────────────────────┐
//!                        │      fill_buffer       │
//!                        │  partition by device   │
//!                        │  foreground drain loop │
//!                        └───────────┬────────────┘
//!                                    │
//!            ┌───────────────────────┼───────────────────────┐
//!            │                       │                       │
//!      ┌─────▼─────┐           ┌─────▼─────┐           ┌─────▼─────┐
//!      │ Worker 0  │           │ Worker 1  │           │ Worker N  │
//!      │ device A  │           │ device B  │           │ device …  │
//!      └─────┬─────┘           └─────┬─────┘           └─────┬─────┘
//!            │   DirCallback tree per base folder            │
//!            └───────────────────────┼───────────────────────┘
//!                                    │
//!                        ┌───────────▼────────────┐
//!                        │    ScanCoordinator     │
//!                        │  error round trips     │
//!                        │  serialized progress   │
//!                        └───────────┬────────────┘
//!                                    │
//!                        ┌───────────▼────────────┐
//!                        │     ScanObserver       │
//!                        │  (foreground thread)   │
//!                        └────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # scan two folders, excluding build artifacts
//! syncscan /home/alice/docs /mnt/backup/docs --exclude 'target/' --exclude '\.tmp$'
//!
//! # follow symlinks, four parallel ops per device
//! syncscan /srv/share --symlinks follow --parallel 4
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod fs;
pub mod progress;
pub mod scan;
pub mod snapshot;

/// File suffix of the engine's sync-state databases; such files are never
/// part of a snapshot
pub const SYNC_DB_SUFFIX: &str = ".syncdb";

/// File suffix of the engine's directory lock files; such files are never
/// part of a snapshot
pub const LOCK_FILE_SUFFIX: &str = ".synclock";

pub use config::{CliArgs, ScanConfig};
pub use error::{ConfigError, Interruption, Result, ScanAbort, ScanError};
pub use filter::{AllowAll, DirFilterVerdict, FilterRef, PathFilter, RegexFilter};
pub use fs::{AbstractPath, ErrorDecision, FileSystem, LocalFileSystem};
pub use scan::{fill_buffer, InterruptFlag, ScanCoordinator, ScanObserver};
pub use snapshot::{
    DirectoryKey, DirectoryValue, FileAttributes, FolderContainer, FolderEntry, LinkAttributes,
    SnapshotTotals, SymlinkMode,
};
