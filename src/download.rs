//! Pull transfer driver: session selection, source registration and monitoring.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::DownloadConfig;
use crate::engine::{EngineFactory, TransferEngine};
use crate::error::Result;
use crate::fs::{FileSystem, TokioFileSystem};
use crate::monitor::{DownloadOutcome, DownloadProgress, ProgressMonitor};
use crate::session::{Restored, SessionOrigin, SessionStore};
use crate::source::SourceDescriptor;

/// Snapshot of the session file for the `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub path: PathBuf,
    pub exists: bool,
    pub modified: Option<DateTime<Utc>>,
}

/// Drives a pull transfer from source to completed content on disk.
pub struct Downloader<F: EngineFactory, S: FileSystem = TokioFileSystem> {
    factory: F,
    config: DownloadConfig,
    fs: S,
}

impl<F: EngineFactory> Downloader<F, TokioFileSystem> {
    /// Creates a new downloader with the default file system.
    #[must_use]
    pub const fn new(factory: F, config: DownloadConfig) -> Self {
        Self {
            factory,
            config,
            fs: TokioFileSystem,
        }
    }
}

impl<F: EngineFactory, S: FileSystem> Downloader<F, S> {
    /// Creates a new downloader with a custom file system implementation.
    #[must_use]
    pub const fn with_fs(factory: F, config: DownloadConfig, fs: S) -> Self {
        Self {
            factory,
            config,
            fs,
        }
    }

    /// Returns a reference to the download configuration.
    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Returns the session store for the configured download root.
    #[must_use]
    pub fn session_store(&self) -> SessionStore {
        self.config.session_store()
    }

    /// Downloads `source` into the configured directory.
    ///
    /// With auto-resume enabled a saved session is restored first; an
    /// unusable session silently falls back to a fresh engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the download directory cannot be created, the
    /// engine rejects the source, metadata never arrives, or the engine
    /// reports the transfer as failed.
    pub async fn download(
        &self,
        source: &SourceDescriptor,
        progress: &dyn DownloadProgress,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome> {
        let save_path = &self.config.download_dir;
        self.fs.create_dir_all(save_path).await?;

        let store = self.session_store();
        let Restored { engine, origin } = if self.config.auto_resume {
            store.load(&self.factory)
        } else {
            if store.exists() {
                log::info!(
                    "Resume disabled; ignoring saved session at {}",
                    store.path().display()
                );
            }
            Restored {
                engine: self.factory.create(),
                origin: SessionOrigin::Fresh,
            }
        };

        let resumed = origin == SessionOrigin::Resumed;
        if resumed {
            log::info!("Resuming previous session");
        }

        log::info!("Adding {source}");
        let handle = engine.add_source(source, save_path).await?;

        ProgressMonitor::new(&engine, &handle, &store, &self.config, resumed)
            .run(save_path, progress, cancel)
            .await
    }

    /// Reports whether a resumable session exists.
    #[must_use]
    pub fn session_status(&self) -> SessionStatus {
        let store = self.session_store();
        SessionStatus {
            exists: store.exists(),
            modified: store.modified(),
            path: store.path().to_path_buf(),
        }
    }

    /// Removes the saved session. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear_session(&self) -> Result<bool> {
        let store = self.session_store();
        let existed = store.exists();
        store.clear()?;
        Ok(existed)
    }
}
