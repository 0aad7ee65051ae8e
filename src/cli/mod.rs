//! CLI mode for seedup: download, upload and session management commands.

mod progress;

use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::{
    AppConfig, Aria2Factory, DownloadConfig, DownloadOutcome, Downloader, DriveStore, RemoteId,
    RemoteStore, SourceDescriptor, UploadConfig, Uploader,
};

pub use progress::{
    CliDownloadProgress, CliUploadProgress, print_download_summary, print_setup_error,
    print_upload_summary,
};

/// Process outcome of a CLI command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// A download error or at least one failed upload.
    Failure,
    /// Interrupted by the user; the session was saved.
    Paused,
}

impl ExitStatus {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Paused => 130,
        }
    }
}

/// Runs a download, optionally followed by an upload of the result.
///
/// # Errors
///
/// Returns an error if the source is invalid or the download fails.
pub async fn run_download(
    config: &AppConfig,
    source: &str,
    upload_after: bool,
    folder_id: Option<String>,
    cancel: &CancellationToken,
) -> crate::Result<ExitStatus> {
    let source = SourceDescriptor::resolve(source).await?;
    let factory = Aria2Factory::from_config(&config.download)?;
    let downloader = Downloader::new(factory, config.download.clone());

    if config.download.auto_resume && downloader.session_status().exists {
        println!("Found saved session, resuming...");
    }

    let progress = CliDownloadProgress::new();
    match downloader.download(&source, &progress, cancel).await? {
        DownloadOutcome::Completed { path, stats } => {
            print_download_summary(&stats, &path);
            if upload_after {
                return run_upload(&config.upload, &path, folder_id, cancel).await;
            }
            Ok(ExitStatus::Success)
        }
        DownloadOutcome::Paused => {
            println!("\nDownload paused. Run the same command again to resume.");
            Ok(ExitStatus::Paused)
        }
    }
}

/// Uploads a file or directory tree.
///
/// # Errors
///
/// Returns [`crate::Error::Setup`] if no access token is configured or the
/// destination folder cannot be resolved.
pub async fn run_upload(
    config: &UploadConfig,
    path: &Path,
    folder_id: Option<String>,
    cancel: &CancellationToken,
) -> crate::Result<ExitStatus> {
    let token = config.access_token()?;
    let store = DriveStore::new(&token, config.chunk_size)?;
    let uploader = Uploader::new(store, config.clone());

    println!("Uploading {} (dedup: {})", path.display(), config.dedup);
    let progress = CliUploadProgress::new();
    let report = uploader
        .upload(path, folder_id.map(RemoteId::new), &progress, cancel)
        .await?;

    let link = report
        .outcome
        .root_remote_id
        .as_ref()
        .and_then(|id| uploader.remote().browse_url(id));
    print_upload_summary(&report, link.as_deref());

    Ok(if report.cancelled {
        ExitStatus::Paused
    } else if report.outcome.has_failures() {
        ExitStatus::Failure
    } else {
        ExitStatus::Success
    })
}

/// Prints whether a resumable session exists.
#[must_use]
pub fn run_status(config: &DownloadConfig) -> ExitStatus {
    let store = config.session_store();
    if store.exists() {
        println!("Resumable session found: {}", store.path().display());
        if let Some(modified) = store.modified() {
            println!("Last saved: {}", modified.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        println!("Run `seedup download` with the same source to continue.");
    } else {
        println!("No saved session in {}", config.download_dir.display());
    }
    ExitStatus::Success
}

/// Removes the saved session.
///
/// # Errors
///
/// Returns an error if the session file cannot be removed.
pub fn run_clear(config: &DownloadConfig) -> crate::Result<ExitStatus> {
    let store = config.session_store();
    let existed = store.exists();
    store.clear()?;
    if existed {
        println!("Session cleared: {}", store.path().display());
    } else {
        println!("No saved session to clear.");
    }
    Ok(ExitStatus::Success)
}

/// Settings changed by the `config` command.
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub token: Option<String>,
    pub folder_id: Option<String>,
    pub destination: Option<std::path::PathBuf>,
}

impl ConfigUpdate {
    const fn is_empty(&self) -> bool {
        self.token.is_none() && self.folder_id.is_none() && self.destination.is_none()
    }
}

/// Applies `update` to the config file at `path` and optionally prints it.
///
/// # Errors
///
/// Returns an error if the config file cannot be written.
pub fn run_config(path: &Path, update: ConfigUpdate, show: bool) -> crate::Result<ExitStatus> {
    let mut config = AppConfig::load(path);
    let was_empty = update.is_empty();

    if !was_empty {
        if let Some(token) = update.token {
            config.upload.set_access_token(token.trim());
        }
        if let Some(folder_id) = update.folder_id {
            config.upload.folder_id = Some(folder_id).filter(|id| !id.is_empty());
        }
        if let Some(destination) = update.destination {
            config.download.download_dir = destination;
        }
        config.save(path)?;
        println!("Configuration saved to {}", path.display());
    }

    if show || was_empty {
        let mut shown = config.clone();
        if shown.upload.access_token.is_some() {
            shown.upload.access_token = Some("<encrypted>".to_string());
        }
        println!("# {}", path.display());
        match toml::to_string_pretty(&shown) {
            Ok(text) => println!("{text}"),
            Err(e) => return Err(crate::Error::Config(e.to_string())),
        }
    }
    Ok(ExitStatus::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Failure.code(), 1);
        assert_eq!(ExitStatus::Paused.code(), 130);
    }

    #[test]
    fn clear_without_session_succeeds() {
        let dir = TempDir::new().unwrap();
        let config = DownloadConfig::new().with_download_dir(dir.path());
        assert_eq!(run_clear(&config).unwrap(), ExitStatus::Success);

        config.session_store().save(b"x").unwrap();
        assert_eq!(run_clear(&config).unwrap(), ExitStatus::Success);
        assert!(!config.session_store().exists());
    }

    #[test]
    fn config_update_persists_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let update = ConfigUpdate {
            token: Some(" tok ".to_string()),
            folder_id: Some("F9".to_string()),
            destination: Some(dir.path().join("dl")),
        };
        run_config(&path, update, false).unwrap();

        let loaded = AppConfig::load(&path);
        assert_eq!(loaded.upload.folder_id.as_deref(), Some("F9"));
        assert_eq!(loaded.download.download_dir, dir.path().join("dl"));
        let stored = loaded.upload.access_token.unwrap();
        assert_eq!(crate::secret::decrypt(&stored).as_deref(), Some("tok"));
    }

    #[test]
    fn empty_folder_id_clears_setting() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let set = ConfigUpdate {
            folder_id: Some("F9".to_string()),
            ..ConfigUpdate::default()
        };
        run_config(&path, set, false).unwrap();
        let unset = ConfigUpdate {
            folder_id: Some(String::new()),
            ..ConfigUpdate::default()
        };
        run_config(&path, unset, false).unwrap();
        assert!(AppConfig::load(&path).upload.folder_id.is_none());
    }

    #[test]
    fn show_without_changes_does_not_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(
            run_config(&path, ConfigUpdate::default(), true).unwrap(),
            ExitStatus::Success
        );
        assert!(!path.exists());

        let update = ConfigUpdate {
            folder_id: Some("F1".to_string()),
            ..ConfigUpdate::default()
        };
        run_config(&path, update, true).unwrap();
        assert!(path.exists());
    }
}
