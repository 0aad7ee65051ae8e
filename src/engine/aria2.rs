//! [`TransferEngine`] backed by an aria2 daemon over JSON-RPC.
//!
//! aria2 owns the peer-wire protocol and its `.aria2` control files; with
//! `continue=true` a re-added source picks up the pieces already on disk.
//! The state blob persisted here maps each source to the aria2 gid serving it.

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{EngineFactory, TransferEngine, TransferState, TransferStatus};
use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::source::SourceDescriptor;

const STATE_VERSION: u32 = 1;

const STATUS_KEYS: &[&str] = &[
    "gid",
    "status",
    "totalLength",
    "completedLength",
    "downloadSpeed",
    "connections",
    "numSeeders",
    "seeder",
    "errorCode",
    "errorMessage",
    "followedBy",
    "bittorrent",
];

/// One source registered with aria2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Tracked {
    /// Stable identity of the source (info hash or descriptor path).
    key: String,
    /// gid returned when the source was added; used as the handle.
    gid: String,
    /// gid currently carrying the data (differs after a magnet's metadata phase).
    current: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedState {
    version: u32,
    transfers: Vec<Tracked>,
}

#[derive(Debug, Deserialize)]
struct RpcReply<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RpcStatus {
    gid: String,
    status: String,
    total_length: String,
    completed_length: String,
    download_speed: String,
    connections: String,
    num_seeders: String,
    seeder: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
    followed_by: Vec<String>,
    bittorrent: Option<RpcBittorrent>,
}

#[derive(Debug, Deserialize)]
struct RpcBittorrent {
    info: Option<RpcInfo>,
}

#[derive(Debug, Deserialize)]
struct RpcInfo {
    name: String,
}

fn parse_num<T: std::str::FromStr + Default>(s: &str) -> T {
    s.parse().unwrap_or_default()
}

impl RpcStatus {
    fn name(&self) -> Option<&str> {
        self.bittorrent
            .as_ref()
            .and_then(|bt| bt.info.as_ref())
            .map(|info| info.name.as_str())
    }

    /// A magnet's metadata-only download that has handed over to a new gid.
    fn successor(&self) -> Option<&str> {
        if self.name().is_some() {
            return None;
        }
        self.followed_by.first().map(String::as_str)
    }

    #[allow(clippy::cast_precision_loss)]
    fn into_status(self) -> TransferStatus {
        let total_wanted: u64 = parse_num(&self.total_length);
        let total_done: u64 = parse_num(&self.completed_length);
        let has_metadata = self.name().is_some();

        let state = match self.status.as_str() {
            "complete" => TransferState::Finished,
            "paused" => TransferState::Paused,
            "error" => TransferState::Failed(self.error_message.clone().unwrap_or_else(|| {
                format!(
                    "aria2 error code {}",
                    self.error_code.as_deref().unwrap_or("unknown")
                )
            })),
            "removed" => TransferState::Failed("removed from aria2".to_string()),
            _ if self.seeder.as_deref() == Some("true") => TransferState::Seeding,
            _ if !has_metadata => TransferState::DownloadingMetadata,
            _ => TransferState::Downloading,
        };

        let progress = if total_wanted == 0 {
            0.0
        } else {
            (total_done as f64 / total_wanted as f64).clamp(0.0, 1.0)
        };

        TransferStatus {
            has_metadata,
            name: self.name().unwrap_or_default().to_string(),
            state,
            progress,
            download_rate: parse_num(&self.download_speed),
            total_wanted,
            total_done,
            num_seeds: parse_num(&self.num_seeders),
            num_peers: parse_num(&self.connections),
        }
    }
}

fn source_key(source: &SourceDescriptor) -> String {
    match source {
        SourceDescriptor::Magnet { info_hash, .. } => format!("btih:{info_hash}"),
        SourceDescriptor::TorrentFile { path, .. } => format!("file:{}", path.display()),
    }
}

fn add_options(save_path: &Path, listen_port: u16) -> Value {
    json!({
        "dir": save_path.to_string_lossy(),
        "continue": "true",
        "listen-port": listen_port.to_string(),
        "seed-time": "0",
        "bt-save-metadata": "true",
    })
}

fn request_body(method: &str, secret: Option<&str>, params: Vec<Value>) -> Value {
    let mut all = Vec::with_capacity(params.len() + 1);
    if let Some(secret) = secret {
        all.push(json!(format!("token:{secret}")));
    }
    all.extend(params);
    json!({
        "jsonrpc": "2.0",
        "id": "seedup",
        "method": method,
        "params": all,
    })
}

/// A connection to one aria2 daemon.
pub struct Aria2Engine {
    client: reqwest::Client,
    rpc_url: String,
    secret: Option<String>,
    listen_port: u16,
    transfers: Mutex<Vec<Tracked>>,
}

impl Aria2Engine {
    fn tracked(&self, key: &str) -> Option<Tracked> {
        self.transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|t| t.key == key)
            .cloned()
    }

    fn track(&self, entry: Tracked) {
        let mut transfers = self.transfers.lock().unwrap_or_else(PoisonError::into_inner);
        transfers.retain(|t| t.key != entry.key);
        transfers.push(entry);
    }

    fn current_gid(&self, handle: &str) -> String {
        self.transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|t| t.gid == handle)
            .map_or_else(|| handle.to_string(), |t| t.current.clone())
    }

    fn redirect(&self, handle: &str, gid: &str) {
        let mut transfers = self.transfers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(t) = transfers.iter_mut().find(|t| t.gid == handle) {
            log::debug!("Metadata received; {} continues as {gid}", t.key);
            t.current = gid.to_string();
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let body = request_body(method, self.secret.as_deref(), params);
        let response = self.client.post(&self.rpc_url).json(&body).send().await?;
        let reply: RpcReply<T> = response.json().await?;
        match reply {
            RpcReply {
                error: Some(err), ..
            } => Err(Error::Engine(format!(
                "{method} failed: {} (code {})",
                err.message, err.code
            ))),
            RpcReply {
                result: Some(result),
                ..
            } => Ok(result),
            RpcReply { .. } => Err(Error::Engine(format!("{method} returned no result"))),
        }
    }

    async fn tell(&self, gid: &str) -> Result<RpcStatus> {
        self.call("aria2.tellStatus", vec![json!(gid), json!(STATUS_KEYS)])
            .await
    }
}

#[async_trait]
impl TransferEngine for Aria2Engine {
    type Handle = String;

    async fn add_source(&self, source: &SourceDescriptor, save_path: &Path) -> Result<String> {
        let key = source_key(source);

        if let Some(existing) = self.tracked(&key) {
            match self.tell(&existing.current).await {
                Ok(status) => {
                    if status.status == "paused" {
                        let _: String = self
                            .call("aria2.unpause", vec![json!(existing.current)])
                            .await?;
                    }
                    log::info!("Re-attached to {key} (gid {})", existing.gid);
                    return Ok(existing.gid);
                }
                Err(e) => log::info!("aria2 no longer knows gid {}, re-adding: {e}", existing.gid),
            }
        }

        let options = add_options(save_path, self.listen_port);
        let gid: String = match source {
            SourceDescriptor::Magnet { uri, .. } => {
                self.call("aria2.addUri", vec![json!([uri]), options]).await?
            }
            SourceDescriptor::TorrentFile { metadata, .. } => {
                self.call(
                    "aria2.addTorrent",
                    vec![json!(BASE64.encode(&metadata.raw)), json!([]), options],
                )
                .await?
            }
        };
        log::info!("Added {key} (gid {gid})");
        self.track(Tracked {
            key,
            gid: gid.clone(),
            current: gid.clone(),
        });
        Ok(gid)
    }

    async fn status(&self, handle: &String) -> Result<TransferStatus> {
        let status = self.tell(&self.current_gid(handle)).await?;
        if let Some(next) = status.successor().map(str::to_string) {
            self.redirect(handle, &next);
            return Ok(self.tell(&next).await?.into_status());
        }
        Ok(status.into_status())
    }

    async fn pause(&self, handle: &String) -> Result<()> {
        let gid = self.current_gid(handle);
        let _: String = self.call("aria2.forcePause", vec![json!(gid)]).await?;
        log::info!("Paused gid {gid}");
        Ok(())
    }

    async fn save_state(&self) -> Result<Vec<u8>> {
        let transfers = self
            .transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(serde_json::to_vec(&SavedState {
            version: STATE_VERSION,
            transfers,
        })?)
    }
}

/// Creates [`Aria2Engine`]s sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct Aria2Factory {
    client: reqwest::Client,
    rpc_url: String,
    secret: Option<String>,
    listen_port: u16,
}

impl Aria2Factory {
    /// Builds a factory from the download configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            secret: config.rpc_secret.clone(),
            listen_port: config.listen_port,
        })
    }

    fn engine(&self, transfers: Vec<Tracked>) -> Aria2Engine {
        Aria2Engine {
            client: self.client.clone(),
            rpc_url: self.rpc_url.clone(),
            secret: self.secret.clone(),
            listen_port: self.listen_port,
            transfers: Mutex::new(transfers),
        }
    }
}

impl EngineFactory for Aria2Factory {
    type Engine = Aria2Engine;

    fn create(&self) -> Aria2Engine {
        self.engine(Vec::new())
    }

    fn restore(&self, state: &[u8]) -> Result<Aria2Engine> {
        let saved: SavedState = serde_json::from_slice(state)?;
        if saved.version != STATE_VERSION {
            return Err(Error::Engine(format!(
                "unsupported session version {}",
                saved.version
            )));
        }
        Ok(self.engine(saved.transfers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> Aria2Factory {
        Aria2Factory::from_config(&DownloadConfig::default()).unwrap()
    }

    fn rpc_status(value: Value) -> RpcStatus {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn maps_active_download() {
        let status = rpc_status(json!({
            "gid": "2089b05ecca3d829",
            "status": "active",
            "totalLength": "1000",
            "completedLength": "250",
            "downloadSpeed": "4096",
            "connections": "7",
            "numSeeders": "3",
            "seeder": "false",
            "bittorrent": {"info": {"name": "ubuntu.iso"}}
        }))
        .into_status();

        assert!(status.has_metadata);
        assert_eq!(status.name, "ubuntu.iso");
        assert_eq!(status.state, TransferState::Downloading);
        assert!((status.progress - 0.25).abs() < f64::EPSILON);
        assert_eq!(status.download_rate, 4096);
        assert_eq!(status.num_seeds, 3);
        assert_eq!(status.num_peers, 7);
        assert_eq!(status.leechers(), 4);
    }

    #[test]
    fn maps_metadata_phase() {
        let status = rpc_status(json!({
            "gid": "a",
            "status": "active",
            "totalLength": "0",
            "completedLength": "0",
            "bittorrent": {}
        }))
        .into_status();
        assert!(!status.has_metadata);
        assert_eq!(status.state, TransferState::DownloadingMetadata);
        assert!(status.progress.abs() < f64::EPSILON);
    }

    #[test]
    fn maps_terminal_states() {
        let seeding = rpc_status(json!({
            "status": "active",
            "seeder": "true",
            "bittorrent": {"info": {"name": "x"}}
        }));
        assert_eq!(seeding.into_status().state, TransferState::Seeding);

        let complete = rpc_status(json!({"status": "complete", "bittorrent": {"info": {"name": "x"}}}));
        assert!(complete.into_status().state.is_complete());

        let paused = rpc_status(json!({"status": "paused"}));
        assert_eq!(paused.into_status().state, TransferState::Paused);

        let error = rpc_status(json!({"status": "error", "errorCode": "9"}));
        assert_eq!(
            error.into_status().state,
            TransferState::Failed("aria2 error code 9".to_string())
        );

        let error = rpc_status(json!({"status": "error", "errorMessage": "No space left"}));
        assert_eq!(
            error.into_status().state,
            TransferState::Failed("No space left".to_string())
        );
    }

    #[test]
    fn metadata_download_hands_over_to_successor() {
        let finished_meta = rpc_status(json!({
            "status": "complete",
            "followedBy": ["b2"],
            "bittorrent": {}
        }));
        assert_eq!(finished_meta.successor(), Some("b2"));

        let real = rpc_status(json!({
            "status": "active",
            "followedBy": ["zz"],
            "bittorrent": {"info": {"name": "x"}}
        }));
        assert_eq!(real.successor(), None);
    }

    #[test]
    fn malformed_numbers_read_as_zero() {
        let status = rpc_status(json!({
            "status": "active",
            "totalLength": "lots",
            "downloadSpeed": "-1",
            "bittorrent": {"info": {"name": "x"}}
        }))
        .into_status();
        assert_eq!(status.total_wanted, 0);
        assert_eq!(status.download_rate, 0);
    }

    #[test]
    fn request_body_prepends_token() {
        let body = request_body("aria2.tellStatus", Some("s3cret"), vec![json!("gid1")]);
        assert_eq!(body["method"], "aria2.tellStatus");
        assert_eq!(body["params"], json!(["token:s3cret", "gid1"]));

        let body = request_body("aria2.tellStatus", None, vec![json!("gid1")]);
        assert_eq!(body["params"], json!(["gid1"]));
    }

    #[test]
    fn add_options_enable_resume() {
        let options = add_options(Path::new("/data/dl"), 6881);
        assert_eq!(options["dir"], "/data/dl");
        assert_eq!(options["continue"], "true");
        assert_eq!(options["listen-port"], "6881");
        assert_eq!(options["seed-time"], "0");
    }

    #[test]
    fn source_keys_are_stable() {
        let magnet = SourceDescriptor::from_magnet(
            "magnet:?xt=urn:btih:0123456789ABCDEF0123456789ABCDEF01234567",
        )
        .unwrap();
        assert_eq!(
            source_key(&magnet),
            "btih:0123456789abcdef0123456789abcdef01234567"
        );
    }

    #[tokio::test]
    async fn state_round_trip_keeps_redirects() {
        let factory = factory();
        let engine = factory.create();
        engine.track(Tracked {
            key: "btih:abc".to_string(),
            gid: "g1".to_string(),
            current: "g1".to_string(),
        });
        engine.redirect("g1", "g2");

        let restored = factory.restore(&engine.save_state().await.unwrap()).unwrap();
        assert_eq!(restored.current_gid("g1"), "g2");
        assert_eq!(restored.tracked("btih:abc").unwrap().gid, "g1");
        assert_eq!(restored.current_gid("unknown"), "unknown");
    }

    #[test]
    fn track_replaces_same_key() {
        let engine = factory().create();
        for gid in ["g1", "g2"] {
            engine.track(Tracked {
                key: "k".to_string(),
                gid: gid.to_string(),
                current: gid.to_string(),
            });
        }
        assert_eq!(engine.tracked("k").unwrap().gid, "g2");
        assert_eq!(engine.transfers.lock().unwrap().len(), 1);
    }

    #[test]
    fn restore_rejects_garbage_and_unknown_versions() {
        let factory = factory();
        assert!(factory.restore(b"\x00\x01").is_err());
        let future = serde_json::to_vec(&json!({"version": 99, "transfers": []})).unwrap();
        assert!(factory.restore(&future).is_err());
    }
}
