//! Error types for the seedup library.

use thiserror::Error;

/// Errors that can occur during transfer operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed JSON from a remote API.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The pull source could not be classified or parsed.
    #[error("Invalid source: {0}")]
    Source(String),

    /// The transfer engine rejected a request or reported a failed transfer.
    #[error("Transfer engine error: {0}")]
    Engine(String),

    /// A remote store operation failed.
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Metadata never arrived within the configured wait.
    #[error("Timed out after {secs}s waiting for metadata")]
    MetadataTimeout {
        /// Seconds waited before giving up.
        secs: u64,
    },

    /// Required environment or authenticated context is unavailable.
    ///
    /// Fatal for the whole job; reported separately from per-file failures.
    #[error("{0}")]
    Setup(String),

    /// Configuration file could not be read or written.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true for environment/initialisation failures.
    #[must_use]
    pub const fn is_setup(&self) -> bool {
        matches!(self, Self::Setup(_))
    }
}

/// A specialized `Result` type for seedup operations.
pub type Result<T> = std::result::Result<T, Error>;
