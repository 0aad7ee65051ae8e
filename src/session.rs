//! Session file persistence for resume support.
//!
//! The session file holds the transfer engine's opaque state. Its presence
//! is the only signal that an interrupted download can be resumed.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::engine::EngineFactory;

/// File name used for the session inside a download directory.
pub const SESSION_FILE_NAME: &str = ".seedup-session";

/// Whether an engine came from a saved session or started fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    Fresh,
    Resumed,
}

/// An engine produced by [`SessionStore::load`].
pub struct Restored<E> {
    pub engine: E,
    pub origin: SessionOrigin,
}

/// Location of the session file for one download root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Creates a store for the given session file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store using the default session file inside `download_dir`.
    #[must_use]
    pub fn in_dir(download_dir: &Path) -> Self {
        Self::new(download_dir.join(SESSION_FILE_NAME))
    }

    /// Returns the session file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if a resumable session file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Returns when the session was last written, if it exists.
    #[must_use]
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        let modified = fs::metadata(&self.path).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Writes the engine state (write tmp + fsync + rename).
    ///
    /// A crash mid-write leaves at worst a corrupt temp file; the previous
    /// session file is only replaced once the new bytes are on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, state: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.tmp_path();
        {
            let mut options = fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(&tmp_path)?;
            // A stale temp file keeps its old mode.
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(fs::Permissions::from_mode(0o600))?;
            }
            file.write_all(state)?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        log::debug!("Session saved to {}", self.path.display());
        Ok(())
    }

    /// Reads the raw session bytes, if the file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn read(&self) -> std::io::Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Returns a resumed engine, or a fresh one if there is no usable session.
    ///
    /// An empty, unreadable or undecodable session file is logged, deleted
    /// and treated as absent. This never fails.
    pub fn load<F: EngineFactory>(&self, factory: &F) -> Restored<F::Engine> {
        let fresh = || Restored {
            engine: factory.create(),
            origin: SessionOrigin::Fresh,
        };

        let bytes = match self.read() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return fresh(),
            Err(e) => {
                log::warn!("Failed to read session ({e}). Starting fresh.");
                self.discard();
                return fresh();
            }
        };

        if bytes.is_empty() {
            log::warn!("Session file is empty. Starting fresh.");
            self.discard();
            return fresh();
        }

        match factory.restore(&bytes) {
            Ok(engine) => {
                log::info!("Session loaded from {}", self.path.display());
                Restored {
                    engine,
                    origin: SessionOrigin::Resumed,
                }
            }
            Err(e) => {
                log::warn!("Failed to load session ({e}). Starting fresh.");
                self.discard();
                fresh()
            }
        }
    }

    /// Removes the session file. Absence counts as success.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::info!("Session file cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn discard(&self) {
        if let Err(e) = self.clear() {
            log::warn!("Could not remove corrupt session file: {e}");
        }
    }
}
