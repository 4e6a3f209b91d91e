//! Configuration types for syncscan
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::error::ConfigError;
use crate::snapshot::SymlinkMode;
use clap::Parser;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable per-device parallel op count
const MAX_PARALLEL_OPS: usize = 64;

/// Parallel directory scanner for sync tooling
#[derive(Parser, Debug, Clone)]
#[command(
    name = "syncscan",
    version,
    about = "Parallel directory scanner producing filtered folder snapshots",
    long_about = "Scans one or more base folders in parallel, one worker per root device,\n\
                  and prints a per-folder summary of files, directories and symlinks.\n\n\
                  Items matching an exclude pattern are left out of the snapshot;\n\
                  excluded directories are not descended.",
    after_help = "EXAMPLES:\n    \
        syncscan /home/alice/docs\n    \
        syncscan /srv/a /srv/b --exclude '\\.tmp$' --exclude '^cache/'\n    \
        syncscan /mnt/nas/media --symlinks follow --parallel 4"
)]
pub struct CliArgs {
    /// Base folders to scan
    #[arg(value_name = "DIR", required = true)]
    pub roots: Vec<PathBuf>,

    /// Exclude relative paths matching pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// How to handle symbolic links
    #[arg(long, value_enum, default_value_t = SymlinkOption::Exclude)]
    pub symlinks: SymlinkOption,

    /// Parallel I/O operations per device (0 = one per CPU core)
    #[arg(short = 'p', long, default_value = "1", value_name = "NUM")]
    pub parallel: usize,

    /// Progress report interval in milliseconds
    #[arg(long, default_value = "250", value_name = "MS")]
    pub interval: u64,

    /// Automatic retries before an error is recorded and skipped
    #[arg(long, default_value = "2", value_name = "NUM")]
    pub retries: usize,

    /// Quiet mode - suppress the progress display
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (show per-worker activity)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// CLI-facing symlink handling choice
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymlinkOption {
    /// Ignore symlinks entirely
    Exclude,
    /// Record the link itself, never its target
    Direct,
    /// Resolve links and record their targets
    Follow,
}

impl From<SymlinkOption> for SymlinkMode {
    fn from(option: SymlinkOption) -> Self {
        match option {
            SymlinkOption::Exclude => SymlinkMode::Exclude,
            SymlinkOption::Direct => SymlinkMode::Direct,
            SymlinkOption::Follow => SymlinkMode::Follow,
        }
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Canonicalized base folders
    pub roots: Vec<PathBuf>,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Symlink handling mode
    pub symlink_mode: SymlinkMode,

    /// Parallel I/O operations per device
    pub parallel_ops: usize,

    /// Progress report cadence
    pub report_interval: Duration,

    /// Automatic retries before recording an error
    pub retry_limit: usize,

    /// Show the progress display
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl ScanConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.interval == 0 {
            return Err(ConfigError::InvalidReportInterval);
        }

        let parallel_ops = if args.parallel == 0 {
            num_cpus::get()
        } else {
            args.parallel
        };
        if parallel_ops > MAX_PARALLEL_OPS {
            return Err(ConfigError::InvalidParallelOps {
                count: parallel_ops,
                max: MAX_PARALLEL_OPS,
            });
        }

        let mut roots = Vec::with_capacity(args.roots.len());
        for root in &args.roots {
            let canonical = root
                .canonicalize()
                .map_err(|e| ConfigError::InvalidRoot {
                    path: root.clone(),
                    reason: e.to_string(),
                })?;
            if !canonical.is_dir() {
                return Err(ConfigError::InvalidRoot {
                    path: root.clone(),
                    reason: "not a directory".to_string(),
                });
            }
            roots.push(canonical);
        }

        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            roots,
            exclude_patterns,
            symlink_mode: args.symlinks.into(),
            parallel_ops,
            report_interval: Duration::from_millis(args.interval),
            retry_limit: args.retries,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(roots: Vec<PathBuf>) -> CliArgs {
        CliArgs {
            roots,
            exclude_patterns: Vec::new(),
            symlinks: SymlinkOption::Exclude,
            parallel: 1,
            interval: 250,
            retries: 2,
            quiet: false,
            verbose: false,
        }
    }

    #[test]
    fn test_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig::from_args(args(vec![dir.path().to_path_buf()])).unwrap();

        assert_eq!(config.roots.len(), 1);
        assert_eq!(config.parallel_ops, 1);
        assert_eq!(config.report_interval, Duration::from_millis(250));
        assert_eq!(config.symlink_mode, SymlinkMode::Exclude);
    }

    #[test]
    fn test_missing_root_rejected() {
        let result = ScanConfig::from_args(args(vec![PathBuf::from("/no/such/folder/here")]));
        assert!(matches!(result, Err(ConfigError::InvalidRoot { .. })));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = args(vec![dir.path().to_path_buf()]);
        a.interval = 0;
        assert!(matches!(
            ScanConfig::from_args(a),
            Err(ConfigError::InvalidReportInterval)
        ));
    }

    #[test]
    fn test_parallel_auto_detect() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = args(vec![dir.path().to_path_buf()]);
        a.parallel = 0;
        let config = ScanConfig::from_args(a).unwrap();
        assert!(config.parallel_ops >= 1);
    }

    #[test]
    fn test_bad_exclude_pattern_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = args(vec![dir.path().to_path_buf()]);
        a.exclude_patterns = vec!["[unclosed".to_string()];
        assert!(matches!(
            ScanConfig::from_args(a),
            Err(ConfigError::InvalidExcludePattern { .. })
        ));
    }
}
