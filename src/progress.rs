//! Progress reporting for the CLI scanner
//!
//! Provides a [`ScanObserver`] implementation that renders the coordinator's
//! status feed on an indicatif spinner and auto-resolves negotiable errors
//! (retry a few times, then record and continue).

use crate::error::ScanAbort;
use crate::fs::ErrorDecision;
use crate::scan::ScanObserver;
use crate::snapshot::{DirectoryKey, DirectoryValue, SnapshotTotals};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Spinner-backed observer for interactive scans
pub struct ProgressReporter {
    bar: ProgressBar,

    /// Automatic retries granted per error before giving up on the item
    retry_limit: usize,

    /// Errors resolved with Continue (i.e. recorded and skipped)
    errors_continued: u64,
}

impl ProgressReporter {
    /// Create a reporter with a visible spinner
    pub fn new(retry_limit: usize) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            bar,
            retry_limit,
            errors_continued: 0,
        }
    }

    /// Create a reporter that renders nothing (quiet mode)
    pub fn hidden(retry_limit: usize) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            retry_limit,
            errors_continued: 0,
        }
    }

    /// Number of errors that were recorded and skipped
    pub fn errors_continued(&self) -> u64 {
        self.errors_continued
    }

    /// Stop the spinner and clear its line
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl ScanObserver for ProgressReporter {
    fn report_status(&mut self, status_text: &str, items_scanned: u64) -> Result<(), ScanAbort> {
        self.bar.set_message(format!(
            "{status_text} | Items: {}",
            format_number(items_scanned)
        ));
        Ok(())
    }

    fn resolve_error(
        &mut self,
        msg: &str,
        retry_number: usize,
    ) -> Result<ErrorDecision, ScanAbort> {
        if retry_number < self.retry_limit {
            debug!(retry = retry_number, "retrying after error: {msg}");
            Ok(ErrorDecision::Retry)
        } else {
            warn!("giving up after {retry_number} retries: {msg}");
            self.errors_continued += 1;
            Ok(ErrorDecision::Continue)
        }
    }
}

/// Print a header at the start of the scan
pub fn print_header(roots: usize, parallel_ops: usize) {
    println!();
    println!(
        "{} {}",
        style("syncscan").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Base folders:").bold(), roots);
    println!("  {} {}", style("Parallel ops:").bold(), parallel_ops);
    println!();
}

/// Print per-base and overall results of a finished scan
pub fn print_summary(
    buf: &BTreeMap<DirectoryKey, DirectoryValue>,
    items_scanned: u64,
    duration: Duration,
) {
    let mut overall = SnapshotTotals::default();
    let mut failed_reads = 0usize;

    println!();
    println!("{}", style("Scan Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());

    for (key, value) in buf {
        let totals = value.folder_cont.totals();
        let failed = value.failed_folder_reads.len() + value.failed_item_reads.len();

        println!("  {}", style(key.folder_path.display()).bold());
        println!(
            "    {} files, {} folders, {} symlinks, {}",
            format_number(totals.files),
            format_number(totals.folders),
            format_number(totals.symlinks),
            format_size(totals.bytes, BINARY)
        );
        if failed > 0 {
            println!(
                "    {} {}",
                style("failed reads:").yellow().bold(),
                format_number(failed as u64)
            );
        }

        overall.files += totals.files;
        overall.folders += totals.folders;
        overall.symlinks += totals.symlinks;
        overall.bytes += totals.bytes;
        failed_reads += failed;
    }

    let secs = duration.as_secs_f64();
    let rate = if secs > 0.0 {
        items_scanned as f64 / secs
    } else {
        0.0
    };

    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {} ({})",
        style("Total:").bold(),
        format_number(overall.files + overall.folders + overall.symlinks),
        format_size(overall.bytes, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.0} items/sec)",
        style("Duration:").bold(),
        secs,
        rate
    );
    if failed_reads > 0 {
        println!(
            "  {} {}",
            style("Failed reads:").yellow().bold(),
            format_number(failed_reads as u64)
        );
    }
    println!();
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
