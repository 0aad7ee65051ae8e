//! Remote object store seam and the dedup policy applied against it.

pub mod drive;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use drive::DriveStore;

/// Opaque identifier of a node in the remote namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Folder,
}

/// A node as seen by the remote namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    pub id: RemoteId,
    pub name: String,
    pub parent_id: RemoteId,
    pub kind: NodeKind,
    /// Known only for files, and only if the store reports it.
    pub size: Option<u64>,
}

/// Remote object store operations used by the upload orchestrator.
///
/// Every method may fail with a transport-level error; callers treat those
/// as failures of a single node, not of the job.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// The namespace root.
    fn root_id(&self) -> RemoteId;

    /// Returns the first node named `name` directly under `parent`.
    ///
    /// `kind` restricts the match; `None` matches files and folders alike.
    async fn find_by_name_and_parent(
        &self,
        name: &str,
        parent: &RemoteId,
        kind: Option<NodeKind>,
    ) -> Result<Option<RemoteNode>>;

    /// Creates a folder and returns its id.
    async fn create_folder(&self, name: &str, parent: &RemoteId) -> Result<RemoteId>;

    /// Uploads a local file and returns the new node's id.
    async fn upload_file(
        &self,
        local: &Path,
        name: &str,
        parent: &RemoteId,
        mime: &str,
    ) -> Result<RemoteId>;

    /// A human-facing link to browse a folder, if the store has one.
    fn browse_url(&self, _folder: &RemoteId) -> Option<String> {
        None
    }
}

/// How a local file is matched against what already exists remotely.
///
/// Content is never hashed. `Name` trades false-positive skips (same name,
/// different content) for a single cheap query per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
    /// Always upload; folders are always created anew.
    Disabled,
    /// Same name under the same parent counts as already uploaded.
    #[default]
    Name,
    /// Same name and same reported size under the same parent.
    NameAndSize,
}

impl DedupPolicy {
    /// Returns true if existence queries should be made at all.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Decides whether `existing` stands in for a local file of `local_size` bytes.
    #[must_use]
    pub fn is_duplicate(self, existing: &RemoteNode, local_size: u64) -> bool {
        match self {
            Self::Disabled => false,
            Self::Name => true,
            Self::NameAndSize => existing.size == Some(local_size),
        }
    }
}

impl fmt::Display for DedupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disabled",
            Self::Name => "name",
            Self::NameAndSize => "name-and-size",
        })
    }
}
