//! File system abstraction for testability.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// What a local path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A directory.
    Dir,
    /// Present but neither a file nor a directory (socket, device,
    /// dangling symlink).
    Other,
}

/// Abstraction over file system operations for testability.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Classifies a path, or returns `None` if it does not exist.
    async fn entry_kind(&self, path: &Path) -> Option<EntryKind>;

    /// Returns the size of a file in bytes.
    async fn file_size(&self, path: &Path) -> std::io::Result<u64>;

    /// Lists the direct children of a directory, sorted by name.
    async fn list_dir(&self, path: &Path) -> std::io::Result<Vec<PathBuf>>;

    /// Creates all directories in the given path.
    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;
}

/// Default file system implementation using `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    /// Creates a new `TokioFileSystem` instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn entry_kind(&self, path: &Path) -> Option<EntryKind> {
        let Ok(meta) = tokio::fs::metadata(path).await else {
            tokio::fs::symlink_metadata(path).await.ok()?;
            return Some(EntryKind::Other);
        };
        Some(if meta.is_file() {
            EntryKind::File
        } else if meta.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::Other
        })
    }

    async fn file_size(&self, path: &Path) -> std::io::Result<u64> {
        tokio::fs::metadata(path).await.map(|m| m.len())
    }

    async fn list_dir(&self, path: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            children.push(entry.path());
        }
        children.sort();
        Ok(children)
    }

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }
}
