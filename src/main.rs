//! syncscan - Parallel Directory Scanner
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::{BTreeMap, BTreeSet};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use syncscan::config::{CliArgs, ScanConfig};
use syncscan::filter::{AllowAll, FilterRef, RegexFilter};
use syncscan::fs::{AbstractPath, FileSystem, LocalFileSystem};
use syncscan::progress::{print_header, print_summary, ProgressReporter};
use syncscan::scan::fill_buffer;
use syncscan::snapshot::{DirectoryKey, DirectoryValue};
use syncscan::ScanError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    let config = ScanConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(config.roots.len(), config.parallel_ops);
    }

    let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());

    // one shared filter handle: identical requests coalesce on the key
    let filter = if config.exclude_patterns.is_empty() {
        FilterRef::new(AllowAll)
    } else {
        FilterRef::new(RegexFilter::new(config.exclude_patterns.clone()))
    };

    let folders_to_read: BTreeSet<DirectoryKey> = config
        .roots
        .iter()
        .map(|root| DirectoryKey {
            folder_path: AbstractPath::new(root.to_string_lossy().into_owned()),
            filter: filter.clone(),
            symlink_mode: config.symlink_mode,
        })
        .collect();

    let device_parallel_ops: BTreeMap<AbstractPath, usize> = folders_to_read
        .iter()
        .map(|key| {
            let root = fs.path_components(&key.folder_path).root_path;
            (root, config.parallel_ops)
        })
        .collect();

    let mut observer = if config.show_progress {
        ProgressReporter::new(config.retry_limit)
    } else {
        ProgressReporter::hidden(config.retry_limit)
    };

    info!(
        bases = folders_to_read.len(),
        parallel_ops = config.parallel_ops,
        "starting scan"
    );

    let start = Instant::now();
    let mut buf: BTreeMap<DirectoryKey, DirectoryValue> = BTreeMap::new();

    let result = fill_buffer(
        &fs,
        &folders_to_read,
        &mut buf,
        &device_parallel_ops,
        &mut observer,
        config.report_interval,
    );

    observer.finish_and_clear();

    match result {
        Ok(()) => {}
        Err(ScanError::Aborted(abort)) => {
            return Err(abort).context("Scan cancelled");
        }
        Err(err) => return Err(err).context("Scan failed"),
    }

    let duration = start.elapsed();
    let items_scanned: u64 = buf
        .values()
        .map(|value| {
            let totals = value.folder_cont.totals();
            totals.files + totals.folders + totals.symlinks
        })
        .sum();

    info!(
        items = items_scanned,
        errors = observer.errors_continued(),
        duration_secs = duration.as_secs(),
        "scan finished"
    );

    if config.show_progress {
        print_summary(&buf, items_scanned, duration);
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("syncscan=debug,warn")
    } else {
        EnvFilter::new("syncscan=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
