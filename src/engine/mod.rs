//! Transfer engine seam.
//!
//! The engine owns the peer-wire protocol and on-disk piece data. The
//! orchestrator only adds sources, polls [`TransferStatus`] snapshots and
//! asks for an opaque state blob to persist between runs.

pub mod aria2;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::source::SourceDescriptor;

pub use aria2::{Aria2Engine, Aria2Factory};

/// Lifecycle state reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    /// Verifying data already on disk.
    CheckingFiles,
    /// Fetching the descriptor from peers (magnet sources).
    DownloadingMetadata,
    /// Transferring content.
    Downloading,
    /// All wanted pieces are present.
    Finished,
    /// Complete and uploading to peers.
    Seeding,
    /// Held by the engine, not transferring.
    Paused,
    /// The engine gave up on the transfer.
    Failed(String),
}

impl TransferState {
    /// Returns true once the content is fully present locally.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Finished | Self::Seeding)
    }
}

/// A point-in-time view of one transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferStatus {
    pub has_metadata: bool,
    pub name: String,
    pub state: TransferState,
    /// Completed fraction in `[0, 1]`.
    pub progress: f64,
    /// Bytes per second.
    pub download_rate: u64,
    pub total_wanted: u64,
    pub total_done: u64,
    pub num_seeds: u32,
    /// Connected peers, seeds included.
    pub num_peers: u32,
}

impl TransferStatus {
    /// Connected peers that are not seeds.
    #[must_use]
    pub const fn leechers(&self) -> u32 {
        self.num_peers.saturating_sub(self.num_seeds)
    }
}

/// A running transfer engine.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Identifies one transfer inside the engine.
    type Handle: Send + Sync;

    /// Starts (or re-attaches to) a transfer saving into `save_path`.
    async fn add_source(&self, source: &SourceDescriptor, save_path: &Path) -> Result<Self::Handle>;

    /// Reads the current status of a transfer.
    async fn status(&self, handle: &Self::Handle) -> Result<TransferStatus>;

    /// Stops transferring without forgetting the transfer. A later
    /// [`TransferEngine::add_source`] for the same source resumes it.
    async fn pause(&self, handle: &Self::Handle) -> Result<()>;

    /// Serializes the engine's resumable state.
    async fn save_state(&self) -> Result<Vec<u8>>;
}

/// Builds engines either fresh or from a previously saved state blob.
pub trait EngineFactory {
    type Engine: TransferEngine;

    /// Creates an engine with no prior state.
    fn create(&self) -> Self::Engine;

    /// Rebuilds an engine from [`TransferEngine::save_state`] output.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be decoded.
    fn restore(&self, state: &[u8]) -> Result<Self::Engine>;
}
