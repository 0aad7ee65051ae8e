//! Configuration for download and upload operations.
//!
//! Settings live in a TOML file (by default `$XDG_CONFIG_HOME/seedup/config.toml`).
//! A missing or unreadable file yields the defaults; command-line flags
//! override individual values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::remote::DedupPolicy;
use crate::secret;
use crate::session::SessionStore;

/// Default download directory, relative to the working directory.
pub const DEFAULT_DOWNLOAD_DIR: &str = "SeedUp Downloads";
/// Name of the well-known destination folder in the remote root.
pub const DEFAULT_REMOTE_FOLDER: &str = "SeedUp Downloads";
/// Environment variable that overrides the configured access token.
pub const TOKEN_ENV: &str = "SEEDUP_DRIVE_TOKEN";

/// Configuration for pull transfers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory where content is saved.
    pub download_dir: PathBuf,
    /// Explicit session file; defaults to a hidden file in `download_dir`.
    pub session_file: Option<PathBuf>,
    /// Whether to continue from a saved session.
    pub auto_resume: bool,
    /// Delay between status polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// How long to wait for magnet metadata before giving up, in seconds.
    pub metadata_timeout_secs: u64,
    /// Minimum time between session checkpoints, in seconds.
    pub checkpoint_interval_secs: u64,
    /// JSON-RPC endpoint of the aria2 daemon.
    pub rpc_url: String,
    /// aria2 `--rpc-secret`, if the daemon requires one.
    pub rpc_secret: Option<String>,
    /// Peer listen port requested from the engine.
    pub listen_port: u16,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            session_file: None,
            auto_resume: true,
            poll_interval_ms: 1000,
            metadata_timeout_secs: 600,
            checkpoint_interval_secs: 10,
            rpc_url: "http://127.0.0.1:6800/jsonrpc".to_string(),
            rpc_secret: None,
            listen_port: 6881,
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the download directory.
    #[must_use]
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Sets an explicit session file location.
    #[must_use]
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    /// Sets whether to continue from a saved session.
    #[must_use]
    pub const fn with_auto_resume(mut self, resume: bool) -> Self {
        self.auto_resume = resume;
        self
    }

    /// Sets the status poll interval.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the metadata wait limit.
    #[must_use]
    pub const fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the minimum time between checkpoints.
    #[must_use]
    pub const fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval_secs = interval.as_secs();
        self
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    #[must_use]
    pub const fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }

    /// Returns the session store for this download root.
    #[must_use]
    pub fn session_store(&self) -> SessionStore {
        self.session_file.as_ref().map_or_else(
            || SessionStore::in_dir(&self.download_dir),
            SessionStore::new,
        )
    }
}

/// Configuration for push transfers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// How local files are matched against existing remote files.
    pub dedup: DedupPolicy,
    /// Upload into the well-known folder when no destination is given.
    pub use_default_folder: bool,
    /// Name of the well-known folder in the remote root.
    pub default_folder_name: String,
    /// Destination folder id used when none is passed on the command line.
    pub folder_id: Option<String>,
    /// Resumable upload chunk size in bytes (rounded to 256 KiB by the store).
    pub chunk_size: u64,
    /// Encrypted access token (see [`UploadConfig::set_access_token`]).
    pub access_token: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dedup: DedupPolicy::default(),
            use_default_folder: true,
            default_folder_name: DEFAULT_REMOTE_FOLDER.to_string(),
            folder_id: None,
            chunk_size: 100 * 1024 * 1024,
            access_token: None,
        }
    }
}

impl UploadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the dedup policy.
    #[must_use]
    pub const fn with_dedup(mut self, dedup: DedupPolicy) -> Self {
        self.dedup = dedup;
        self
    }

    /// Sets whether to fall back to the well-known destination folder.
    #[must_use]
    pub const fn with_default_folder(mut self, enabled: bool) -> Self {
        self.use_default_folder = enabled;
        self
    }

    /// Stores `token` encrypted with the machine key.
    pub fn set_access_token(&mut self, token: &str) {
        self.access_token = Some(secret::encrypt(token));
    }

    /// Returns the access token from the environment or the config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] if no token is available or the stored one
    /// cannot be decrypted on this machine.
    pub fn access_token(&self) -> Result<String> {
        if let Ok(token) = std::env::var(TOKEN_ENV)
            && !token.trim().is_empty()
        {
            return Ok(token.trim().to_string());
        }
        let stored = self.access_token.as_deref().ok_or_else(|| {
            Error::Setup(format!(
                "No remote store access token. Set {TOKEN_ENV} or run `seedup config --token <TOKEN>`."
            ))
        })?;
        secret::decrypt(stored).ok_or_else(|| {
            Error::Setup(
                "Stored access token cannot be decrypted on this machine. Run `seedup config --token <TOKEN>` again."
                    .to_string(),
            )
        })
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub download: DownloadConfig,
    pub upload: UploadConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("seedup")
            .join("config.toml")
    }

    /// Loads configuration from `path`, falling back to defaults.
    ///
    /// A missing file is silent; an unreadable or malformed one is logged.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    log::debug!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Could not parse config file {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                log::warn!("Could not load config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Writes configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails or [`Error::Io`] if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, toml_str)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        log::info!("Configuration saved to {}", path.display());
        Ok(())
    }
}
