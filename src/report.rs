//! Upload result aggregation and the end-of-job summary.

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::format::format_bytes;
use crate::remote::RemoteId;
use crate::upload::ProgressAggregate;

/// Horizontal rule used by summaries.
pub const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Per-path results of an upload walk.
///
/// Every visited leaf lands in exactly one of the three lists. A directory
/// that could not be created or listed appears once in `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    /// Remote id of the outermost folder created or reused by the job.
    pub root_remote_id: Option<RemoteId>,
}

impl UploadOutcome {
    #[must_use]
    pub fn from_success(path: PathBuf, id: Option<RemoteId>) -> Self {
        Self {
            succeeded: vec![path],
            root_remote_id: id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_skip(path: PathBuf, id: Option<RemoteId>) -> Self {
        Self {
            skipped: vec![path],
            root_remote_id: id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_failure(path: PathBuf) -> Self {
        Self {
            failed: vec![path],
            ..Self::default()
        }
    }

    /// Appends `other`'s lists. The receiver's root id is kept.
    pub fn merge(&mut self, other: Self) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
        self.skipped.extend(other.skipped);
        if self.root_remote_id.is_none() {
            self.root_remote_id = other.root_remote_id;
        }
    }

    /// Number of entries across all three lists.
    #[must_use]
    pub fn len(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Everything an upload job produced.
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub outcome: UploadOutcome,
    pub aggregate: ProgressAggregate,
    /// Files the pre-scan could not size.
    pub unreadable: usize,
    /// The job stopped early on cancellation.
    pub cancelled: bool,
}

impl UploadReport {
    /// Returns true if the job finished and nothing failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.cancelled && !self.outcome.has_failures()
    }
}

/// Renders the end-of-job summary.
///
/// `link` is the browse URL of [`UploadOutcome::root_remote_id`], if any.
#[must_use]
pub fn render_summary(report: &UploadReport, link: Option<&str>) -> String {
    let outcome = &report.outcome;
    let mut out = String::new();

    let _ = writeln!(out, "{SEPARATOR}");
    let _ = writeln!(out, "Upload Summary");
    let _ = writeln!(out, "{SEPARATOR}");
    let _ = writeln!(out, "  Uploaded:          {}", outcome.succeeded.len());
    let _ = writeln!(out, "  Skipped (exists):  {}", outcome.skipped.len());
    let _ = writeln!(out, "  Failed:            {}", outcome.failed.len());
    let _ = writeln!(
        out,
        "  Data processed:    {} of {}",
        format_bytes(report.aggregate.uploaded_bytes),
        format_bytes(report.aggregate.total_bytes)
    );

    if report.unreadable > 0 {
        let _ = writeln!(
            out,
            "  Warning: {} file(s) could not be read during scan",
            report.unreadable
        );
    }

    if !outcome.failed.is_empty() {
        let _ = writeln!(out, "  Failed paths:");
        for path in &outcome.failed {
            let _ = writeln!(out, "    {}", path.display());
        }
    }

    if report.cancelled {
        let _ = writeln!(out, "  Interrupted before all files were visited");
    }

    if let Some(link) = link {
        let _ = writeln!(out, "  Folder: {link}");
    }

    let _ = write!(out, "{SEPARATOR}");
    out
}
