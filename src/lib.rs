//! seedup - resumable torrent downloads with upload to a remote store.
//!
//! This library provides the orchestration core: session persistence for an
//! interruptible pull transfer, a progress monitor over a transfer engine,
//! and a recursive uploader that deduplicates against a remote namespace.
//! Engines and stores are reached through traits; aria2 and Google Drive
//! adapters are included.
//!
//! # Example
//!
//! ```no_run
//! use seedup::{Aria2Factory, DownloadConfig, DownloadOutcome, Downloader, NoProgress, SourceDescriptor};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> seedup::Result<()> {
//! let config = DownloadConfig::default().with_download_dir("/data/torrents");
//! let downloader = Downloader::new(Aria2Factory::from_config(&config)?, config);
//!
//! let source = SourceDescriptor::resolve("magnet:?xt=urn:btih:...").await?;
//! match downloader.download(&source, &NoProgress, &CancellationToken::new()).await? {
//!     DownloadOutcome::Completed { path, .. } => println!("Saved to {}", path.display()),
//!     DownloadOutcome::Paused => println!("Paused; run again to resume"),
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod bencode;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod format;
pub mod fs;
pub mod monitor;
pub mod remote;
pub mod report;
pub mod secret;
pub mod session;
pub mod source;
pub mod stats;
pub mod upload;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use config::{AppConfig, DownloadConfig, UploadConfig};
pub use download::{Downloader, SessionStatus};
pub use engine::{Aria2Factory, EngineFactory, TransferEngine, TransferState, TransferStatus};
pub use error::{Error, Result};
pub use format::{format_bytes, format_duration, format_eta, format_speed};
pub use fs::{FileSystem, TokioFileSystem};
pub use monitor::{DownloadOutcome, DownloadProgress, NoProgress, Phase, TickReport};
pub use remote::{DedupPolicy, DriveStore, RemoteId, RemoteStore};
pub use report::{UploadOutcome, UploadReport, render_summary};
pub use session::SessionStore;
pub use source::SourceDescriptor;
pub use stats::DownloadStats;
pub use upload::{NoProgress as NoUploadProgress, ProgressAggregate, UploadProgress, Uploader};
