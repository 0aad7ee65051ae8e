//! Recursive upload of a local tree into a remote store.
//!
//! The walk is strictly sequential. One [`ProgressAggregate`] is threaded
//! through the recursion by `&mut`, so every level updates the same totals.
//! Per-node failures are recorded in the [`UploadOutcome`] and never abort
//! the job; only destination resolution can fail the whole upload.

use std::path::{Path, PathBuf};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::config::UploadConfig;
use crate::error::{Error, Result};
use crate::fs::{EntryKind, FileSystem, TokioFileSystem};
use crate::remote::{NodeKind, RemoteId, RemoteNode, RemoteStore};
use crate::report::{UploadOutcome, UploadReport};

/// Byte and file totals for one upload job.
///
/// Updates saturate at the totals computed by the pre-scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressAggregate {
    pub total_bytes: u64,
    pub uploaded_bytes: u64,
    pub total_files: usize,
    pub completed_files: usize,
}

impl ProgressAggregate {
    #[must_use]
    pub const fn new(total_files: usize, total_bytes: u64) -> Self {
        Self {
            total_bytes,
            uploaded_bytes: 0,
            total_files,
            completed_files: 0,
        }
    }

    /// Records one finished leaf of `bytes` bytes (uploaded or skipped).
    pub fn record(&mut self, bytes: u64) {
        self.uploaded_bytes = self
            .uploaded_bytes
            .saturating_add(bytes)
            .min(self.total_bytes);
        self.completed_files = (self.completed_files + 1).min(self.total_files);
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.completed_files >= self.total_files
    }

    /// Byte fraction in `[0, 1]`; an empty job counts as done.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.uploaded_bytes as f64 / self.total_bytes as f64
        }
    }
}

/// Result of the pre-upload scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeScan {
    pub files: usize,
    pub folders: usize,
    pub bytes: u64,
    /// Files that could not be sized; counted in `files` with zero bytes.
    pub unreadable: usize,
}

/// What happened to one leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafResult {
    Uploaded,
    Skipped,
    Failed,
}

/// Trait for receiving upload progress updates.
///
/// All methods have default no-op implementations.
pub trait UploadProgress: Send + Sync {
    /// Called once after the pre-scan, before any remote writes.
    fn on_start(&self, _scan: &TreeScan, _destination: &RemoteId) {}

    /// Called when a remote folder is created or reused for a local directory.
    fn on_folder(&self, _path: &Path, _folder: &RemoteId) {}

    /// Called after each leaf, with the aggregate already updated.
    fn on_file(&self, _path: &Path, _result: LeafResult, _aggregate: &ProgressAggregate) {}

    /// Called exactly once per job.
    fn on_finish(&self, _aggregate: &ProgressAggregate) {}
}

/// A no-op progress reporter.
pub struct NoProgress;

impl UploadProgress for NoProgress {}

/// Mutable state threaded through one walk.
struct Job<'a> {
    progress: &'a dyn UploadProgress,
    cancel: &'a CancellationToken,
    aggregate: ProgressAggregate,
    finished: bool,
    cancelled: bool,
}

impl Job<'_> {
    fn finish_if_complete(&mut self) {
        if !self.finished && self.aggregate.is_complete() {
            self.finished = true;
            self.progress.on_finish(&self.aggregate);
        }
    }

    fn check_cancelled(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            if !self.cancelled {
                log::warn!("Upload interrupted");
            }
            self.cancelled = true;
        }
        self.cancelled
    }
}

/// Uploads local files and directories into a [`RemoteStore`].
pub struct Uploader<R: RemoteStore, S: FileSystem = TokioFileSystem> {
    remote: R,
    config: UploadConfig,
    fs: S,
}

impl<R: RemoteStore> Uploader<R, TokioFileSystem> {
    /// Creates a new uploader with the default file system.
    #[must_use]
    pub const fn new(remote: R, config: UploadConfig) -> Self {
        Self {
            remote,
            config,
            fs: TokioFileSystem,
        }
    }
}

impl<R: RemoteStore, S: FileSystem> Uploader<R, S> {
    /// Creates a new uploader with a custom file system implementation.
    #[must_use]
    pub const fn with_fs(remote: R, config: UploadConfig, fs: S) -> Self {
        Self { remote, config, fs }
    }

    #[must_use]
    pub const fn remote(&self) -> &R {
        &self.remote
    }

    #[must_use]
    pub const fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Uploads `local` (a file or a directory tree) under `destination`.
    ///
    /// Without an explicit destination the configured folder id is used,
    /// then the well-known default folder (created in the remote root if
    /// missing), then the remote root itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] if the default destination folder cannot be
    /// resolved. Every other failure is recorded per path in the report.
    pub async fn upload(
        &self,
        local: &Path,
        destination: Option<RemoteId>,
        progress: &dyn UploadProgress,
        cancel: &CancellationToken,
    ) -> Result<UploadReport> {
        let Some(kind) = self.fs.entry_kind(local).await else {
            log::error!("Path not found: {}", local.display());
            return Ok(UploadReport {
                outcome: UploadOutcome::from_failure(local.to_path_buf()),
                ..UploadReport::default()
            });
        };

        let destination = self.resolve_destination(destination).await?;
        let scan = self.scan(local, kind).await;
        log::info!(
            "Uploading {} ({} files, {} folders, {} bytes) to {destination}",
            local.display(),
            scan.files,
            scan.folders,
            scan.bytes
        );
        progress.on_start(&scan, &destination);

        let mut job = Job {
            progress,
            cancel,
            aggregate: ProgressAggregate::new(scan.files, scan.bytes),
            finished: false,
            cancelled: false,
        };
        let mut outcome = self
            .visit(local.to_path_buf(), destination.clone(), &mut job)
            .await;
        if kind != EntryKind::Dir {
            outcome.root_remote_id = Some(destination);
        }

        if !job.finished {
            progress.on_finish(&job.aggregate);
        }

        Ok(UploadReport {
            outcome,
            aggregate: job.aggregate,
            unreadable: scan.unreadable,
            cancelled: job.cancelled,
        })
    }

    async fn resolve_destination(&self, explicit: Option<RemoteId>) -> Result<RemoteId> {
        if let Some(id) = explicit.or_else(|| self.config.folder_id.clone().map(RemoteId::new)) {
            return Ok(id);
        }
        let root = self.remote.root_id();
        if !self.config.use_default_folder {
            return Ok(root);
        }

        let name = &self.config.default_folder_name;
        let existing = self
            .remote
            .find_by_name_and_parent(name, &root, Some(NodeKind::Folder))
            .await
            .map_err(|e| Error::Setup(format!("Could not look up folder '{name}': {e}")))?;
        if let Some(node) = existing {
            log::debug!("Using existing folder '{name}' ({})", node.id);
            return Ok(node.id);
        }

        let id = self
            .remote
            .create_folder(name, &root)
            .await
            .map_err(|e| Error::Setup(format!("Could not create folder '{name}': {e}")))?;
        log::info!("Created folder '{name}' ({id})");
        Ok(id)
    }

    /// Counts files, folders and bytes below `local`.
    async fn scan(&self, local: &Path, kind: EntryKind) -> TreeScan {
        let mut scan = TreeScan::default();
        let mut stack = vec![(local.to_path_buf(), Some(kind))];

        while let Some((path, kind)) = stack.pop() {
            match kind {
                Some(EntryKind::File) => {
                    scan.files += 1;
                    match self.fs.file_size(&path).await {
                        Ok(size) => scan.bytes += size,
                        Err(e) => {
                            log::warn!("Cannot read {}: {e}", path.display());
                            scan.unreadable += 1;
                        }
                    }
                }
                Some(EntryKind::Dir) => {
                    scan.folders += 1;
                    match self.fs.list_dir(&path).await {
                        Ok(children) => {
                            for child in children {
                                let kind = self.fs.entry_kind(&child).await;
                                stack.push((child, kind));
                            }
                        }
                        Err(e) => log::warn!("Cannot list {}: {e}", path.display()),
                    }
                }
                Some(EntryKind::Other) | None => {
                    log::warn!("Cannot read {}: not a regular file", path.display());
                    scan.files += 1;
                    scan.unreadable += 1;
                }
            }
        }
        scan
    }

    fn visit<'a>(
        &'a self,
        path: PathBuf,
        parent: RemoteId,
        job: &'a mut Job<'_>,
    ) -> BoxFuture<'a, UploadOutcome> {
        async move {
            if job.check_cancelled() {
                return UploadOutcome::default();
            }
            match self.fs.entry_kind(&path).await {
                Some(EntryKind::File) => self.upload_leaf(path, &parent, job).await,
                Some(EntryKind::Dir) => self.upload_dir(path, &parent, job).await,
                Some(EntryKind::Other) | None => {
                    log::error!("Not a regular file or directory: {}", path.display());
                    job.aggregate.record(0);
                    job.progress.on_file(&path, LeafResult::Failed, &job.aggregate);
                    job.finish_if_complete();
                    UploadOutcome::from_failure(path)
                }
            }
        }
        .boxed()
    }

    async fn upload_leaf(&self, path: PathBuf, parent: &RemoteId, job: &mut Job<'_>) -> UploadOutcome {
        let name = node_name(&path);
        let size = self.fs.file_size(&path).await.unwrap_or_else(|e| {
            log::warn!("Cannot read size of {}: {e}", path.display());
            0
        });

        let duplicate = self
            .find_existing(&name, parent, NodeKind::File)
            .await
            .filter(|node| self.config.dedup.is_duplicate(node, size));

        let result = if duplicate.is_some() {
            log::info!("Skipping (already exists): {name}");
            LeafResult::Skipped
        } else {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            match self
                .remote
                .upload_file(&path, &name, parent, mime.essence_str())
                .await
            {
                Ok(id) => {
                    log::info!("Uploaded {name} ({id})");
                    LeafResult::Uploaded
                }
                Err(e) => {
                    log::error!("Failed to upload {}: {e}", path.display());
                    LeafResult::Failed
                }
            }
        };

        job.aggregate.record(size);
        job.progress.on_file(&path, result, &job.aggregate);
        job.finish_if_complete();

        match result {
            LeafResult::Uploaded => UploadOutcome::from_success(path, None),
            LeafResult::Skipped => UploadOutcome::from_skip(path, None),
            LeafResult::Failed => UploadOutcome::from_failure(path),
        }
    }

    async fn upload_dir(&self, path: PathBuf, parent: &RemoteId, job: &mut Job<'_>) -> UploadOutcome {
        let name = node_name(&path);
        let folder = match self.folder_for(&name, parent).await {
            Ok(id) => id,
            Err(e) => {
                log::error!("Failed to create folder for {}: {e}", path.display());
                return UploadOutcome::from_failure(path);
            }
        };
        job.progress.on_folder(&path, &folder);

        let children = match self.fs.list_dir(&path).await {
            Ok(children) => children,
            Err(e) => {
                log::error!("Cannot list {}: {e}", path.display());
                let mut outcome = UploadOutcome::from_failure(path);
                outcome.root_remote_id = Some(folder);
                return outcome;
            }
        };

        let mut outcome = UploadOutcome {
            root_remote_id: Some(folder.clone()),
            ..UploadOutcome::default()
        };
        for child in children {
            if job.cancelled {
                break;
            }
            outcome.merge(self.visit(child, folder.clone(), job).await);
        }
        job.finish_if_complete();
        outcome
    }

    /// Looks up an existing node when dedup is enabled. Query failures count as absent.
    async fn find_existing(&self, name: &str, parent: &RemoteId, kind: NodeKind) -> Option<RemoteNode> {
        if !self.config.dedup.is_enabled() {
            return None;
        }
        match self
            .remote
            .find_by_name_and_parent(name, parent, Some(kind))
            .await
        {
            Ok(found) => found,
            Err(e) => {
                log::warn!("Existence check for {name} failed, treating as absent: {e}");
                None
            }
        }
    }

    /// Reuses a same-named folder when dedup is enabled, otherwise creates one.
    async fn folder_for(&self, name: &str, parent: &RemoteId) -> Result<RemoteId> {
        if let Some(node) = self.find_existing(name, parent, NodeKind::Folder).await {
            log::info!("Using existing folder: {name}");
            return Ok(node.id);
        }
        let id = self.remote.create_folder(name, parent).await?;
        log::info!("Created folder: {name}");
        Ok(id)
    }
}

fn node_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |n| n.to_string_lossy().into_owned(),
    )
}
