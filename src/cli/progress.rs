//! Progress bars and summary reporting for CLI transfers.

use std::path::Path;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::monitor::{DownloadProgress, TickReport};
use crate::remote::RemoteId;
use crate::report::{SEPARATOR, UploadReport, render_summary};
use crate::stats::DownloadStats;
use crate::upload::{LeafResult, ProgressAggregate, TreeScan, UploadProgress};
use crate::{format_bytes, format_duration};

fn style_or_default(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Creates the download spinner; `on_metadata` switches it to a byte bar.
fn make_download_bar() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(style_or_default("{spinner:.cyan} {msg}"));
    bar.enable_steady_tick(Duration::from_millis(250));
    bar
}

fn transfer_style() -> ProgressStyle {
    style_or_default(
        "{prefix:.bold} [{bar:40.cyan/blue}] {percent:>3}% {bytes}/{total_bytes}\n  {msg}",
    )
    .progress_chars("━━╌")
}

/// Creates the total progress bar for an upload.
fn make_upload_bar(size: u64) -> ProgressBar {
    let bar = ProgressBar::new(size);
    bar.set_style(
        style_or_default("Upload [{bar:40.green/white}] {bytes}/{total_bytes} @ {bytes_per_sec} - {msg}")
            .progress_chars("━━╌"),
    );
    bar
}

/// Renders download ticks on a single progress bar.
pub struct CliDownloadProgress {
    bar: ProgressBar,
}

impl CliDownloadProgress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bar: make_download_bar(),
        }
    }
}

impl Default for CliDownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadProgress for CliDownloadProgress {
    fn on_waiting_metadata(&self) {
        self.bar.set_message("Fetching metadata...");
    }

    fn on_metadata(&self, name: &str, total_bytes: u64) {
        self.bar.println(format!(
            "{} {} ({})",
            style("Downloading").green().bold(),
            name,
            format_bytes(total_bytes)
        ));
        self.bar.set_length(total_bytes);
        self.bar.set_style(transfer_style());
    }

    fn on_tick(&self, report: &TickReport) {
        self.bar.set_prefix(report.phase.label());
        self.bar.set_length(report.total_wanted);
        self.bar.set_position(report.total_done);
        self.bar.set_message(report.line());
    }

    fn on_complete(&self, _stats: &DownloadStats) {
        self.bar.finish_and_clear();
    }

    fn on_paused(&self) {
        self.bar.abandon_with_message("Paused");
    }
}

/// Renders upload progress as one aggregate bar with a line per file.
pub struct CliUploadProgress {
    bar: ProgressBar,
}

impl CliUploadProgress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bar: make_upload_bar(0),
        }
    }
}

impl Default for CliUploadProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadProgress for CliUploadProgress {
    fn on_start(&self, scan: &TreeScan, destination: &RemoteId) {
        self.bar.println(format!(
            "Found {} file(s) in {} folder(s), {} total -> {destination}",
            scan.files,
            scan.folders,
            format_bytes(scan.bytes)
        ));
        self.bar.set_length(scan.bytes);
    }

    fn on_file(&self, path: &Path, result: LeafResult, aggregate: &ProgressAggregate) {
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let tag = match result {
            LeafResult::Uploaded => style("uploaded").green(),
            LeafResult::Skipped => style("skipped ").yellow(),
            LeafResult::Failed => style("failed  ").red(),
        };
        self.bar.println(format!("  {tag} {name}"));
        self.bar.set_position(aggregate.uploaded_bytes);
        self.bar.set_message(format!(
            "{}/{} files",
            aggregate.completed_files, aggregate.total_files
        ));
    }

    fn on_finish(&self, _aggregate: &ProgressAggregate) {
        self.bar.finish_and_clear();
    }
}

/// Prints a summary of a completed download.
pub fn print_download_summary(stats: &DownloadStats, path: &Path) {
    println!("\n{SEPARATOR}");
    println!("{}", style("Download Complete").green().bold());
    println!("{SEPARATOR}");
    println!("  Name:              {}", stats.name);
    println!("  Saved to:          {}", path.display());
    println!("  Total size:        {}", format_bytes(stats.total_bytes));
    println!("  This run:          {}", format_bytes(stats.bytes_this_run));
    println!("  Time:              {}", format_duration(stats.elapsed));
    println!("  Average speed:     {}/s", format_bytes(stats.average_speed()));
    println!("  Peak speed:        {}/s", format_bytes(stats.peak_speed));
    if stats.resumed {
        println!("  Resumed from a saved session");
    }
    println!("{SEPARATOR}");
}

/// Prints the upload summary.
pub fn print_upload_summary(report: &UploadReport, link: Option<&str>) {
    println!();
    println!("{}", render_summary(report, link));
}

/// Prints a fatal setup error in a box.
pub fn print_setup_error(message: &str) {
    eprintln!("\n{SEPARATOR}");
    eprintln!("{}", style("UPLOAD ERROR").red().bold());
    eprintln!("{SEPARATOR}");
    for line in message.lines() {
        eprintln!("  {line}");
    }
    eprintln!("{SEPARATOR}");
}
