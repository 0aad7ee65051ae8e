//! Pull source classification: magnet references and `.torrent` descriptors.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::bencode::{self, Value};
use crate::error::{Error, Result};

static BTIH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[?&]xt=urn:btih:([0-9a-f]{40}|[a-z2-7]{32})(?:&|$)").expect("valid regex")
});

/// Parsed view of a `.torrent` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetadata {
    /// Suggested name of the content (file or top-level directory).
    pub name: String,
    /// Sum of all file lengths in bytes.
    pub total_length: u64,
    /// Number of files described.
    pub file_count: usize,
    /// Primary tracker, if any.
    pub announce: Option<String>,
    /// The descriptor exactly as read from disk.
    pub raw: Vec<u8>,
}

impl TorrentMetadata {
    /// Parses bencoded descriptor bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] if the bytes are not a valid descriptor.
    pub fn parse(raw: Vec<u8>) -> Result<Self> {
        let root = bencode::decode(&raw).map_err(|e| Error::Source(format!("bad torrent: {e}")))?;
        let info = root
            .get("info")
            .ok_or_else(|| Error::Source("torrent has no info dictionary".to_string()))?;
        let name = info
            .get("name")
            .and_then(Value::as_text)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Source("torrent has no name".to_string()))?;

        let (total_length, file_count) = if let Some(files) = info.get("files").and_then(Value::as_list) {
            let total = files
                .iter()
                .filter_map(|f| f.get("length").and_then(Value::as_int))
                .filter_map(|n| u64::try_from(n).ok())
                .sum();
            (total, files.len())
        } else {
            let length = info
                .get("length")
                .and_then(Value::as_int)
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| Error::Source("torrent has neither length nor files".to_string()))?;
            (length, 1)
        };

        let announce = root.get("announce").and_then(Value::as_text);

        Ok(Self {
            name,
            total_length,
            file_count,
            announce,
            raw,
        })
    }
}

/// The resolved identity of a pull source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// A `magnet:` URI; metadata is fetched from peers.
    Magnet {
        uri: String,
        info_hash: String,
        display_name: Option<String>,
    },
    /// A descriptor file read from disk.
    TorrentFile {
        path: PathBuf,
        metadata: TorrentMetadata,
    },
}

impl SourceDescriptor {
    /// Classifies `input` as a magnet URI or a `.torrent` path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] if the input is neither a valid magnet URI
    /// nor an existing, parseable descriptor file.
    pub async fn resolve(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.get(..7).is_some_and(|p| p.eq_ignore_ascii_case("magnet:")) {
            return Self::from_magnet(input);
        }
        if !is_torrent_path(input) {
            return Err(Error::Source(
                "provide a .torrent file or magnet link".to_string(),
            ));
        }

        let path = expand_home(input);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Source(format!(
                    "torrent file not found: {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = TorrentMetadata::parse(raw)?;
        log::debug!(
            "Parsed {}: {} ({} files)",
            path.display(),
            metadata.name,
            metadata.file_count
        );
        Ok(Self::TorrentFile { path, metadata })
    }

    /// Builds a magnet descriptor after checking its info hash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] if the URI carries no BitTorrent info hash.
    pub fn from_magnet(uri: &str) -> Result<Self> {
        let info_hash = BTIH_RE
            .captures(uri)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_ascii_lowercase())
            .ok_or_else(|| Error::Source("magnet link has no btih info hash".to_string()))?;
        let display_name = magnet_param(uri, "dn").map(|v| decode_param(&v));
        Ok(Self::Magnet {
            uri: uri.to_string(),
            info_hash,
            display_name,
        })
    }

    /// Best-effort name for log lines before metadata is known.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Magnet {
                display_name: Some(name),
                ..
            } => name.clone(),
            Self::Magnet { info_hash, .. } => info_hash.clone(),
            Self::TorrentFile { metadata, .. } => metadata.name.clone(),
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Magnet { uri, .. } => {
                let shown: String = uri.chars().take(60).collect();
                if shown.len() < uri.len() {
                    write!(f, "magnet link {shown}...")
                } else {
                    write!(f, "magnet link {shown}")
                }
            }
            Self::TorrentFile { path, .. } => write!(f, "torrent file {}", path.display()),
        }
    }
}

/// Returns true if the path has a `.torrent` extension (case-insensitive).
#[must_use]
pub fn is_torrent_path(s: &str) -> bool {
    Path::new(s)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("torrent"))
}

fn expand_home(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(s)
}

fn magnet_param(uri: &str, key: &str) -> Option<String> {
    let query = uri.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| v.to_string())
    })
}

/// Decodes a form-encoded query value (`+` is a space).
fn decode_param(value: &str) -> String {
    percent_decode_str(&value.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HASH: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";

    fn single_file_torrent() -> Vec<u8> {
        b"d8:announce23:http://tracker/announce4:infod6:lengthi1024e4:name8:file.bin12:piece lengthi16384eee".to_vec()
    }

    #[test]
    fn magnet_with_hex_hash() {
        let uri = format!("magnet:?xt=urn:btih:{}&dn=Some+Movie%202025", HASH.to_uppercase());
        let src = SourceDescriptor::from_magnet(&uri).unwrap();
        match src {
            SourceDescriptor::Magnet {
                info_hash,
                display_name,
                ..
            } => {
                assert_eq!(info_hash, HASH);
                assert_eq!(display_name.as_deref(), Some("Some Movie 2025"));
            }
            SourceDescriptor::TorrentFile { .. } => panic!("expected magnet"),
        }
    }

    #[test]
    fn magnet_with_base32_hash() {
        let uri = "magnet:?xt=urn:btih:YNCKHTQCWBZS5YQHYMQUS7JZIWFNGZWE";
        assert!(SourceDescriptor::from_magnet(uri).is_ok());
    }

    #[test]
    fn magnet_without_hash_is_rejected() {
        let err = SourceDescriptor::from_magnet("magnet:?dn=nothing").unwrap_err();
        assert!(matches!(err, Error::Source(_)));
    }

    #[test]
    fn magnet_label_falls_back_to_hash() {
        let src = SourceDescriptor::from_magnet(&format!("magnet:?xt=urn:btih:{HASH}")).unwrap();
        assert_eq!(src.label(), HASH);
    }

    #[test]
    fn parse_single_file_metadata() {
        let meta = TorrentMetadata::parse(single_file_torrent()).unwrap();
        assert_eq!(meta.name, "file.bin");
        assert_eq!(meta.total_length, 1024);
        assert_eq!(meta.file_count, 1);
        assert_eq!(meta.announce.as_deref(), Some("http://tracker/announce"));
    }

    #[test]
    fn parse_multi_file_metadata() {
        let raw = b"d4:infod5:filesld6:lengthi10e4:pathl1:aeed6:lengthi20e4:pathl1:beee4:name3:diree".to_vec();
        let meta = TorrentMetadata::parse(raw).unwrap();
        assert_eq!(meta.name, "dir");
        assert_eq!(meta.total_length, 30);
        assert_eq!(meta.file_count, 2);
        assert!(meta.announce.is_none());
    }

    #[test]
    fn parse_rejects_missing_info() {
        assert!(TorrentMetadata::parse(b"d3:foo3:bare".to_vec()).is_err());
    }

    #[tokio::test]
    async fn resolve_reads_torrent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("movie.TORRENT");
        std::fs::write(&path, single_file_torrent()).unwrap();

        let src = SourceDescriptor::resolve(path.to_str().unwrap()).await.unwrap();
        match src {
            SourceDescriptor::TorrentFile { path: p, metadata } => {
                assert_eq!(p, path);
                assert_eq!(metadata.raw, single_file_torrent());
            }
            SourceDescriptor::Magnet { .. } => panic!("expected torrent file"),
        }
    }

    #[tokio::test]
    async fn resolve_missing_torrent_file() {
        let err = SourceDescriptor::resolve("/nonexistent/movie.torrent")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Source(msg) if msg.contains("not found")));
    }

    #[tokio::test]
    async fn resolve_rejects_other_inputs() {
        assert!(matches!(
            SourceDescriptor::resolve("https://example.com/file.zip").await,
            Err(Error::Source(_))
        ));
    }

    #[tokio::test]
    async fn resolve_accepts_magnet_case_insensitively() {
        let uri = format!("MAGNET:?xt=urn:btih:{HASH}");
        assert!(matches!(
            SourceDescriptor::resolve(&uri).await,
            Ok(SourceDescriptor::Magnet { .. })
        ));
    }

    #[test]
    fn query_values_decode_escapes_and_plus() {
        assert_eq!(decode_param("a%2"), "a%2");
        assert_eq!(decode_param("100%zz"), "100%zz");
        assert_eq!(decode_param("a%20b+c"), "a b c");
        assert_eq!(decode_param("caf%C3%A9"), "café");
    }
}
