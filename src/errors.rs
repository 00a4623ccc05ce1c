//! Mirror Error Types
//!
//! Structured error handling for a mirror run.
//! Network failures are split by cause so the synchronizer can decide on retries
//! and the run driver can tell fatal errors from recoverable ones.

use std::path::PathBuf;

/// Mirror error types
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("Integrity check failed for {url}: {reason}")]
    Integrity { url: String, reason: String },

    #[error("Parse error in {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Download cache {path} is corrupt: {reason}")]
    CacheCorruption { path: PathBuf, reason: String },

    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = MirrorError> = std::result::Result<T, E>;

impl MirrorError {
    /// Whether this error came from talking to a remote server
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            MirrorError::Network { .. } | MirrorError::Timeout { .. } | MirrorError::Http { .. }
        )
    }

    /// Whether an artifact fetch failed in a way the run recovers from
    pub fn is_download_failure(&self) -> bool {
        self.is_network() || matches!(self, MirrorError::Integrity { .. })
    }

    /// Whether this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            MirrorError::Timeout { .. } | MirrorError::Network { .. } => true,
            MirrorError::Http { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }

    /// Map a reqwest failure onto the network variants
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MirrorError::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = err.status() {
            MirrorError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            MirrorError::Network {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MirrorError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<String>, reason: impl Into<String>) -> Self {
        MirrorError::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
