//! Download progress monitor.
//!
//! Drives one transfer from metadata acquisition to completion or pause,
//! deriving a display report from every status snapshot and checkpointing
//! the engine state on an elapsed-time cadence.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::DownloadConfig;
use crate::engine::{TransferEngine, TransferState, TransferStatus};
use crate::error::{Error, Result};
use crate::format::{eta_secs, format_eta, format_speed};
use crate::session::SessionStore;
use crate::stats::{DownloadStats, DownloadStatsTracker};

/// Progress at or above which a resumed transfer is no longer labelled as resuming.
const RESUME_LABEL_CUTOFF: f64 = 0.95;

/// Display phase of a transferring download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Continuing a saved session and still catching up.
    Resuming,
    /// No data flowing and no peers connected.
    Connecting,
    Active,
}

impl Phase {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Resuming => "Resuming Download",
            Self::Connecting => "Connecting to Peers",
            Self::Active => "Download Progress",
        }
    }
}

/// Derives the [`Phase`] from successive snapshots.
///
/// The resuming flag is sticky-off: once any snapshot shows data flowing,
/// the session is never labelled as resuming again.
#[derive(Debug, Clone, Copy)]
pub struct PhaseTracker {
    resuming: bool,
}

impl PhaseTracker {
    #[must_use]
    pub const fn new(resumed: bool) -> Self {
        Self { resuming: resumed }
    }

    pub fn observe(&mut self, status: &TransferStatus) -> Phase {
        if status.download_rate > 0 {
            self.resuming = false;
        }
        if self.resuming && status.progress < RESUME_LABEL_CUTOFF {
            Phase::Resuming
        } else if status.download_rate == 0 && status.num_peers == 0 {
            Phase::Connecting
        } else {
            Phase::Active
        }
    }

    #[must_use]
    pub const fn is_resuming(&self) -> bool {
        self.resuming
    }
}

/// Elapsed-time checkpoint trigger.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointTimer {
    interval: Duration,
    last: Instant,
}

impl CheckpointTimer {
    #[must_use]
    pub const fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last: now,
        }
    }

    /// Returns true (and restarts the interval) once `interval` has elapsed since the last trigger.
    pub fn due(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}

/// Everything a renderer needs for one transferring tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub phase: Phase,
    /// Completion in percent, `0.0..=100.0`.
    pub percent: f64,
    pub total_done: u64,
    pub total_wanted: u64,
    pub speed: String,
    /// `"N/A"` while the rate is zero.
    pub eta: String,
    pub seeds: u32,
    /// Connected peers that are not seeds.
    pub peers: u32,
}

impl TickReport {
    #[must_use]
    pub fn new(status: &TransferStatus, phase: Phase) -> Self {
        Self {
            phase,
            percent: (status.progress * 100.0).clamp(0.0, 100.0),
            total_done: status.total_done,
            total_wanted: status.total_wanted,
            speed: format_speed(status.download_rate),
            eta: eta_secs(status.total_wanted, status.total_done, status.download_rate)
                .map_or_else(|| "N/A".to_string(), format_eta),
            seeds: status.num_seeds,
            peers: status.leechers(),
        }
    }

    /// Renders the one-line status shown next to the progress bar.
    #[must_use]
    pub fn line(&self) -> String {
        format!(
            "Seeds: {} | Peers: {} | {} | ETA: {}",
            self.seeds, self.peers, self.speed, self.eta
        )
    }
}

/// How a monitored download ended.
#[derive(Debug)]
pub enum DownloadOutcome {
    /// All content is on disk at `path`; the session file was removed.
    Completed { path: PathBuf, stats: DownloadStats },
    /// Stopped by the user; the session file holds the latest state.
    Paused,
}

/// Trait for receiving download progress updates.
///
/// All methods have default no-op implementations.
pub trait DownloadProgress: Send + Sync {
    /// Called once if the first snapshot lacks metadata.
    fn on_waiting_metadata(&self) {}

    /// Called when metadata is available and transferring starts.
    fn on_metadata(&self, _name: &str, _total_bytes: u64) {}

    /// Called on every transferring tick.
    fn on_tick(&self, _report: &TickReport) {}

    /// Called after each successful checkpoint.
    fn on_checkpoint(&self) {}

    /// Called when the transfer completes.
    fn on_complete(&self, _stats: &DownloadStats) {}

    /// Called when the transfer is paused by cancellation.
    fn on_paused(&self) {}
}

/// A no-op progress reporter.
pub struct NoProgress;

impl DownloadProgress for NoProgress {}

/// Polls one transfer until it completes, fails or is cancelled.
pub struct ProgressMonitor<'a, E: TransferEngine> {
    engine: &'a E,
    handle: &'a E::Handle,
    store: &'a SessionStore,
    config: &'a DownloadConfig,
    resumed: bool,
}

impl<'a, E: TransferEngine> ProgressMonitor<'a, E> {
    #[must_use]
    pub const fn new(
        engine: &'a E,
        handle: &'a E::Handle,
        store: &'a SessionStore,
        config: &'a DownloadConfig,
        resumed: bool,
    ) -> Self {
        Self {
            engine,
            handle,
            store,
            config,
            resumed,
        }
    }

    /// Runs the monitor loop.
    ///
    /// Cancellation is observed at tick boundaries and results in a final
    /// checkpoint and [`DownloadOutcome::Paused`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataTimeout`] if metadata never arrives, or
    /// [`Error::Engine`] if the engine reports the transfer as failed.
    pub async fn run(
        &self,
        save_path: &Path,
        progress: &dyn DownloadProgress,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome> {
        let Some(first) = self.await_metadata(progress, cancel).await? else {
            return Ok(self.pause(progress).await);
        };

        progress.on_metadata(&first.name, first.total_wanted);
        log::info!(
            "Transferring {} ({} bytes, resumed: {})",
            first.name,
            first.total_wanted,
            self.resumed
        );

        let mut phases = PhaseTracker::new(self.resumed);
        let mut timer = CheckpointTimer::new(self.config.checkpoint_interval(), Instant::now());
        let mut stats = DownloadStatsTracker::new(&first.name);
        let mut pending = Some(first);

        while !cancel.is_cancelled() {
            let status = match pending.take() {
                Some(status) => status,
                None => match self.engine.status(self.handle).await {
                    Ok(status) => status,
                    Err(e) => {
                        log::warn!("Status read failed, retrying: {e}");
                        if !self.wait_tick(cancel).await {
                            break;
                        }
                        continue;
                    }
                },
            };

            if let TransferState::Failed(message) = &status.state {
                log::error!("Transfer {} failed: {message}", status.name);
                self.checkpoint(progress).await;
                return Err(Error::Engine(message.clone()));
            }

            stats.record(&status);
            let phase = phases.observe(&status);
            progress.on_tick(&TickReport::new(&status, phase));

            if status.state.is_complete() {
                if let Err(e) = self.store.clear() {
                    log::warn!("Could not remove session file: {e}");
                }
                let stats = stats.build(self.resumed);
                log::info!("Download complete: {}", status.name);
                progress.on_complete(&stats);
                return Ok(DownloadOutcome::Completed {
                    path: save_path.join(&status.name),
                    stats,
                });
            }

            if timer.due(Instant::now()) {
                self.checkpoint(progress).await;
            }

            if !self.wait_tick(cancel).await {
                break;
            }
        }

        Ok(self.pause(progress).await)
    }

    /// Polls until metadata is present. `None` means cancelled.
    async fn await_metadata(
        &self,
        progress: &dyn DownloadProgress,
        cancel: &CancellationToken,
    ) -> Result<Option<TransferStatus>> {
        let started = Instant::now();
        let timeout = self.config.metadata_timeout();
        let mut announced = false;

        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            match self.engine.status(self.handle).await {
                Ok(status)
                    if status.has_metadata || matches!(status.state, TransferState::Failed(_)) =>
                {
                    return Ok(Some(status));
                }
                Ok(_) => {
                    if !announced {
                        log::info!("Fetching metadata...");
                        progress.on_waiting_metadata();
                        announced = true;
                    }
                }
                Err(e) => log::warn!("Status read failed while awaiting metadata: {e}"),
            }
            if started.elapsed() >= timeout {
                return Err(Error::MetadataTimeout {
                    secs: timeout.as_secs(),
                });
            }
            if !self.wait_tick(cancel).await {
                return Ok(None);
            }
        }
    }

    /// Sleeps one poll interval. Returns false if cancelled first.
    async fn wait_tick(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(self.config.poll_interval()) => true,
        }
    }

    async fn pause(&self, progress: &dyn DownloadProgress) -> DownloadOutcome {
        log::info!("Pausing download...");
        if let Err(e) = self.engine.pause(self.handle).await {
            log::warn!("Engine did not pause the transfer: {e}");
        }
        self.checkpoint(progress).await;
        progress.on_paused();
        DownloadOutcome::Paused
    }

    /// Persists the engine state. Failures are logged only.
    async fn checkpoint(&self, progress: &dyn DownloadProgress) {
        let result = match self.engine.save_state().await {
            Ok(state) => self.store.save(&state).map_err(Error::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => progress.on_checkpoint(),
            Err(e) => log::warn!("Checkpoint failed: {e}"),
        }
    }
}
