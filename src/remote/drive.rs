//! Google Drive v3 implementation of [`RemoteStore`].
//!
//! Authenticates with a pre-issued OAuth bearer token. Files are sent with
//! the resumable upload protocol in fixed-size chunks.

use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, HeaderValue, LOCATION, RANGE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{NodeKind, RemoteId, RemoteNode, RemoteStore};
use crate::error::{Error, Result};

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
/// Resumable chunks must be a multiple of this size.
const CHUNK_ALIGN: u64 = 256 * 1024;

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    /// Decimal string; absent for folders and native documents.
    size: Option<String>,
}

impl DriveFile {
    fn into_node(self, parent: &RemoteId) -> RemoteNode {
        let kind = if self.mime_type == FOLDER_MIME {
            NodeKind::Folder
        } else {
            NodeKind::File
        };
        RemoteNode {
            id: RemoteId::new(self.id),
            name: self.name,
            parent_id: parent.clone(),
            kind,
            size: self.size.and_then(|s| s.parse().ok()),
        }
    }
}

/// Escapes a value for a single-quoted Drive query literal.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn lookup_query(name: &str, parent: &RemoteId, kind: Option<NodeKind>) -> String {
    let mut q = format!(
        "name = '{}' and '{}' in parents and trashed = false",
        escape_query(name),
        escape_query(parent.as_str())
    );
    match kind {
        Some(NodeKind::Folder) => q.push_str(&format!(" and mimeType = '{FOLDER_MIME}'")),
        Some(NodeKind::File) => q.push_str(&format!(" and mimeType != '{FOLDER_MIME}'")),
        None => {}
    }
    q
}

/// Rounds down to the chunk alignment, never below one aligned block.
const fn aligned_chunk_size(requested: u64) -> u64 {
    let aligned = requested - requested % CHUNK_ALIGN;
    if aligned == 0 { CHUNK_ALIGN } else { aligned }
}

/// `Content-Range` for bytes `start..start + len` of a `total`-byte file.
fn content_range(start: u64, len: u64, total: u64) -> String {
    if len == 0 {
        format!("bytes */{total}")
    } else {
        format!("bytes {start}-{}/{total}", start + len - 1)
    }
}

/// Offset of the next byte the server expects, from a 308 `Range` header.
fn next_offset(range: Option<&str>) -> u64 {
    range
        .and_then(|r| r.strip_prefix("bytes="))
        .and_then(|r| r.split_once('-'))
        .and_then(|(_, end)| end.parse::<u64>().ok())
        .map_or(0, |end| end + 1)
}

/// Google Drive client.
pub struct DriveStore {
    http: reqwest::Client,
    chunk_size: u64,
}

impl DriveStore {
    /// Creates a client authenticated with `access_token`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] if the token is not a valid header value, or
    /// [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(access_token: &str, chunk_size: u64) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|_| Error::Setup("Access token contains invalid characters".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(15))
            .pool_idle_timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            chunk_size: aligned_chunk_size(chunk_size),
        })
    }

    /// Turns a non-success response into [`Error::Remote`].
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Remote(format!("{status}: {}", body.trim())))
    }

    async fn start_session(&self, name: &str, parent: &RemoteId, mime: &str, size: u64) -> Result<String> {
        let response = self
            .http
            .post(format!("{UPLOAD_BASE}/files"))
            .query(&[("uploadType", "resumable"), ("fields", "id")])
            .header("X-Upload-Content-Type", mime)
            .header("X-Upload-Content-Length", size)
            .json(&json!({ "name": name, "parents": [parent.as_str()] }))
            .send()
            .await?;
        let response = Self::check(response).await?;
        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::Remote("resumable session without Location header".to_string()))
    }
}

#[async_trait]
impl RemoteStore for DriveStore {
    fn root_id(&self) -> RemoteId {
        RemoteId::new("root")
    }

    async fn find_by_name_and_parent(
        &self,
        name: &str,
        parent: &RemoteId,
        kind: Option<NodeKind>,
    ) -> Result<Option<RemoteNode>> {
        let q = lookup_query(name, parent, kind);
        let response = self
            .http
            .get(format!("{API_BASE}/files"))
            .query(&[
                ("q", q.as_str()),
                ("fields", "files(id,name,mimeType,size)"),
                ("pageSize", "1"),
                ("spaces", "drive"),
            ])
            .send()
            .await?;
        let list: FileList = Self::check(response).await?.json().await?;
        Ok(list.files.into_iter().next().map(|f| f.into_node(parent)))
    }

    async fn create_folder(&self, name: &str, parent: &RemoteId) -> Result<RemoteId> {
        let response = self
            .http
            .post(format!("{API_BASE}/files"))
            .query(&[("fields", "id")])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME,
                "parents": [parent.as_str()],
            }))
            .send()
            .await?;
        let file: DriveFile = Self::check(response).await?.json().await?;
        Ok(RemoteId::new(file.id))
    }

    async fn upload_file(
        &self,
        local: &Path,
        name: &str,
        parent: &RemoteId,
        mime: &str,
    ) -> Result<RemoteId> {
        let mut file = tokio::fs::File::open(local).await?;
        let total = file.metadata().await?.len();
        let session = self.start_session(name, parent, mime, total).await?;
        log::debug!("Upload session for {name} ({total} bytes)");

        let mut offset = 0u64;
        loop {
            let len = self.chunk_size.min(total.saturating_sub(offset));
            #[allow(clippy::cast_possible_truncation)]
            let mut chunk = vec![0u8; len as usize];
            file.read_exact(&mut chunk).await?;

            let response = self
                .http
                .put(&session)
                .header(CONTENT_LENGTH, len)
                .header(CONTENT_RANGE, content_range(offset, len, total))
                .body(Bytes::from(chunk))
                .send()
                .await?;

            if response.status() == StatusCode::PERMANENT_REDIRECT {
                let next = next_offset(
                    response
                        .headers()
                        .get(RANGE)
                        .and_then(|v| v.to_str().ok()),
                );
                if len == 0 {
                    return Err(Error::Remote(format!("upload of {name} was not finalized")));
                }
                if next != offset + len {
                    file.seek(SeekFrom::Start(next)).await?;
                }
                offset = next;
                log::debug!("{name}: {offset}/{total} bytes sent");
                continue;
            }

            let created: DriveFile = Self::check(response).await?.json().await?;
            return Ok(RemoteId::new(created.id));
        }
    }

    fn browse_url(&self, folder: &RemoteId) -> Option<String> {
        Some(format!("https://drive.google.com/drive/folders/{folder}"))
    }
}
