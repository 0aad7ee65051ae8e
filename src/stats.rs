//! Transfer statistics types.

use std::time::{Duration, Instant};

use crate::engine::TransferStatus;

/// Statistics for one run of a download (from start or resume to completion).
#[derive(Debug, Clone)]
pub struct DownloadStats {
    /// Content name reported by the engine.
    pub name: String,
    /// Total size of the wanted content in bytes.
    pub total_bytes: u64,
    /// Bytes gained during this run (excludes data restored from a session).
    pub bytes_this_run: u64,
    /// Time spent in this run.
    pub elapsed: Duration,
    /// Highest download rate observed, in bytes per second.
    pub peak_speed: u64,
    /// Whether the run continued a saved session.
    pub resumed: bool,
}

impl DownloadStats {
    /// Returns the average download speed of this run in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.bytes_this_run as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Accumulates statistics from successive status snapshots.
#[derive(Debug)]
pub struct DownloadStatsTracker {
    start_time: Instant,
    name: String,
    first_done: Option<u64>,
    last_done: u64,
    total_bytes: u64,
    peak_speed: u64,
}

impl DownloadStatsTracker {
    /// Creates a tracker starting now.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            start_time: Instant::now(),
            name: name.to_string(),
            first_done: None,
            last_done: 0,
            total_bytes: 0,
            peak_speed: 0,
        }
    }

    /// Records one snapshot.
    pub fn record(&mut self, status: &TransferStatus) {
        self.first_done.get_or_insert(status.total_done);
        self.last_done = self.last_done.max(status.total_done);
        self.total_bytes = status.total_wanted;
        self.peak_speed = self.peak_speed.max(status.download_rate);
    }

    /// Returns the peak speed recorded.
    #[must_use]
    pub const fn peak_speed(&self) -> u64 {
        self.peak_speed
    }

    /// Builds the final statistics.
    #[must_use]
    pub fn build(self, resumed: bool) -> DownloadStats {
        DownloadStats {
            name: self.name,
            total_bytes: self.total_bytes,
            bytes_this_run: self.last_done.saturating_sub(self.first_done.unwrap_or(0)),
            elapsed: self.start_time.elapsed(),
            peak_speed: self.peak_speed,
            resumed,
        }
    }
}
