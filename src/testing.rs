//! In-memory collaborators shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::{EngineFactory, TransferEngine, TransferState, TransferStatus};
use crate::error::{Error, Result};
use crate::fs::{EntryKind, FileSystem};
use crate::remote::{NodeKind, RemoteId, RemoteNode, RemoteStore};
use crate::source::SourceDescriptor;

// ============================================================================
// Transfer engine
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MockTransfer {
    name: String,
    progress_bits: u64,
}

/// Engine whose status is either a scripted sequence or a static transfer.
#[derive(Default)]
pub struct MockEngine {
    transfers: Mutex<Vec<MockTransfer>>,
    script: Mutex<VecDeque<std::result::Result<TransferStatus, String>>>,
    saves: AtomicUsize,
    pauses: AtomicUsize,
    fail_add: bool,
}

impl MockEngine {
    pub fn with_transfer(name: &str, progress: f64) -> Self {
        let engine = Self::default();
        engine.transfers.lock().unwrap().push(MockTransfer {
            name: name.to_string(),
            progress_bits: progress.to_bits(),
        });
        engine
    }

    /// Replays `script` one entry per `status` call; the last entry repeats.
    pub fn scripted(script: Vec<std::result::Result<TransferStatus, String>>) -> Self {
        let engine = Self::default();
        *engine.script.lock().unwrap() = script.into();
        engine
    }

    pub fn transfers(&self) -> Vec<String> {
        self.transfers
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn pause_count(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferEngine for MockEngine {
    type Handle = usize;

    async fn add_source(&self, source: &SourceDescriptor, _save_path: &Path) -> Result<usize> {
        if self.fail_add {
            return Err(Error::Engine("rejected".to_string()));
        }
        let mut transfers = self.transfers.lock().unwrap();
        let name = source.label();
        if let Some(idx) = transfers.iter().position(|t| t.name == name) {
            return Ok(idx);
        }
        transfers.push(MockTransfer {
            name,
            progress_bits: 0f64.to_bits(),
        });
        Ok(transfers.len() - 1)
    }

    async fn status(&self, handle: &usize) -> Result<TransferStatus> {
        {
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            if let Some(next) = next {
                return next.map_err(Error::Engine);
            }
        }
        let transfers = self.transfers.lock().unwrap();
        let t = transfers
            .get(*handle)
            .ok_or_else(|| Error::Engine(format!("no transfer {handle}")))?;
        let mut status = snapshot(f64::from_bits(t.progress_bits), 0, 0);
        status.name.clone_from(&t.name);
        Ok(status)
    }

    async fn pause(&self, _handle: &usize) -> Result<()> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_state(&self) -> Result<Vec<u8>> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::to_vec(&*self.transfers.lock().unwrap())?)
    }
}

/// Builds [`MockEngine`]s that all replay the same status script.
#[derive(Default)]
pub struct MockFactory {
    script: Vec<std::result::Result<TransferStatus, String>>,
    fail_add: bool,
}

impl MockFactory {
    pub fn scripted(script: Vec<std::result::Result<TransferStatus, String>>) -> Self {
        Self {
            script,
            fail_add: false,
        }
    }

    pub const fn failing_add(mut self) -> Self {
        self.fail_add = true;
        self
    }

    fn build(&self) -> MockEngine {
        let mut engine = MockEngine::scripted(self.script.clone());
        engine.fail_add = self.fail_add;
        engine
    }
}

impl EngineFactory for MockFactory {
    type Engine = MockEngine;

    fn create(&self) -> MockEngine {
        self.build()
    }

    fn restore(&self, state: &[u8]) -> Result<MockEngine> {
        let transfers: Vec<MockTransfer> = serde_json::from_slice(state)?;
        let engine = self.build();
        *engine.transfers.lock().unwrap() = transfers;
        Ok(engine)
    }
}

/// A downloading snapshot of a 1000-byte transfer named "demo".
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn snapshot(progress: f64, rate: u64, peers: u32) -> TransferStatus {
    TransferStatus {
        has_metadata: true,
        name: "demo".to_string(),
        state: TransferState::Downloading,
        progress,
        download_rate: rate,
        total_wanted: 1000,
        total_done: (progress * 1000.0) as u64,
        num_seeds: 0,
        num_peers: peers,
    }
}

// ============================================================================
// Remote store
// ============================================================================

/// In-memory remote namespace rooted at `"root"`.
#[derive(Default)]
pub struct MockRemote {
    nodes: Mutex<Vec<RemoteNode>>,
    next_id: AtomicUsize,
    fail_folders: HashSet<String>,
    fail_uploads: HashSet<String>,
    fail_queries: bool,
    uploads: Mutex<Vec<(String, RemoteId)>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_folder(mut self, name: &str) -> Self {
        self.fail_folders.insert(name.to_string());
        self
    }

    pub fn failing_upload(mut self, name: &str) -> Self {
        self.fail_uploads.insert(name.to_string());
        self
    }

    pub const fn failing_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    /// Seeds an existing node and returns its id.
    pub fn insert(&self, name: &str, parent: &RemoteId, kind: NodeKind, size: Option<u64>) -> RemoteId {
        let id = self.fresh_id();
        self.nodes.lock().unwrap().push(RemoteNode {
            id: id.clone(),
            name: name.to_string(),
            parent_id: parent.clone(),
            kind,
            size,
        });
        id
    }

    pub fn uploads(&self) -> Vec<(String, RemoteId)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn folders_named(&self, name: &str) -> Vec<RemoteNode> {
        self.nodes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.name == name && n.kind == NodeKind::Folder)
            .cloned()
            .collect()
    }

    fn fresh_id(&self) -> RemoteId {
        RemoteId::new(format!("id{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    fn root_id(&self) -> RemoteId {
        RemoteId::new("root")
    }

    async fn find_by_name_and_parent(
        &self,
        name: &str,
        parent: &RemoteId,
        kind: Option<NodeKind>,
    ) -> Result<Option<RemoteNode>> {
        if self.fail_queries {
            return Err(Error::Remote("query failed".to_string()));
        }
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.name == name && &n.parent_id == parent && kind.is_none_or(|k| n.kind == k))
            .cloned())
    }

    async fn create_folder(&self, name: &str, parent: &RemoteId) -> Result<RemoteId> {
        if self.fail_folders.contains(name) {
            return Err(Error::Remote(format!("cannot create {name}")));
        }
        Ok(self.insert(name, parent, NodeKind::Folder, None))
    }

    async fn upload_file(
        &self,
        local: &Path,
        name: &str,
        parent: &RemoteId,
        _mime: &str,
    ) -> Result<RemoteId> {
        if self.fail_uploads.contains(name) {
            return Err(Error::Remote(format!("cannot upload {}", local.display())));
        }
        self.uploads
            .lock()
            .unwrap()
            .push((name.to_string(), parent.clone()));
        Ok(self.insert(name, parent, NodeKind::File, None))
    }

    fn browse_url(&self, folder: &RemoteId) -> Option<String> {
        Some(format!("mock://{folder}"))
    }
}

// ============================================================================
// Local file system
// ============================================================================

enum MockEntry {
    File(Option<u64>),
    Dir { listable: bool },
    Other,
}

/// In-memory tree; parents must be added before children.
#[derive(Default)]
pub struct MockFs {
    entries: Mutex<HashMap<PathBuf, MockEntry>>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dir(self, path: &str) -> Self {
        self.entries
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), MockEntry::Dir { listable: true });
        self
    }

    pub fn unlistable_dir(self, path: &str) -> Self {
        self.entries
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), MockEntry::Dir { listable: false });
        self
    }

    pub fn file(self, path: &str, size: u64) -> Self {
        self.entries
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), MockEntry::File(Some(size)));
        self
    }

    /// A file that lists but cannot be sized.
    pub fn unreadable_file(self, path: &str) -> Self {
        self.entries
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), MockEntry::File(None));
        self
    }

    /// An entry that lists but is neither a file nor a directory.
    pub fn special(self, path: &str) -> Self {
        self.entries
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), MockEntry::Other);
        self
    }
}

#[async_trait]
impl FileSystem for MockFs {
    async fn entry_kind(&self, path: &Path) -> Option<EntryKind> {
        match self.entries.lock().unwrap().get(path)? {
            MockEntry::File(_) => Some(EntryKind::File),
            MockEntry::Dir { .. } => Some(EntryKind::Dir),
            MockEntry::Other => Some(EntryKind::Other),
        }
    }

    async fn file_size(&self, path: &Path) -> std::io::Result<u64> {
        match self.entries.lock().unwrap().get(path) {
            Some(MockEntry::File(Some(size))) => Ok(*size),
            Some(MockEntry::File(None)) => Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "mock unreadable",
            )),
            _ => Err(std::io::Error::new(std::io::ErrorKind::NotFound, "mock")),
        }
    }

    async fn list_dir(&self, path: &Path) -> std::io::Result<Vec<PathBuf>> {
        let entries = self.entries.lock().unwrap();
        match entries.get(path) {
            Some(MockEntry::Dir { listable: true }) => {}
            Some(MockEntry::Dir { listable: false }) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "mock unlistable",
                ));
            }
            _ => return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "mock")),
        }
        let mut children: Vec<_> = entries
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect();
        children.sort();
        Ok(children)
    }

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        let mut entries = self.entries.lock().unwrap();
        for ancestor in path.ancestors().filter(|p| !p.as_os_str().is_empty()) {
            entries
                .entry(ancestor.to_path_buf())
                .or_insert(MockEntry::Dir { listable: true });
        }
        Ok(())
    }
}
