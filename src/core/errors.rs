use std::path::PathBuf;

use thiserror::Error;

/// Errors raised at the orchestrator boundary.
///
/// Only `InvalidBudget` and `InvalidQuery` ever reach a caller; the remaining
/// variants are recorded in diagnostics at the point of occurrence.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid budget: {0}")]
    InvalidBudget(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),
    #[error("retrieval deadline exceeded")]
    DeadlineExceeded,
}

impl RetrievalError {
    pub fn index_unavailable<E: std::fmt::Display>(err: E) -> Self {
        RetrievalError::IndexUnavailable(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index file missing: {}", .0.display())]
    Missing(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed index metadata in {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("index format error: {0}")]
    Format(String),
    #[error("embedding checksum mismatch: expected {expected}, found {actual}")]
    Checksum { expected: String, actual: String },
    #[error("embedding dimension mismatch: index has {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },
    #[error("embedding failed while building index: {0}")]
    Embedding(#[from] EmbedError),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("embedding request timed out")]
    Timeout,
    #[error("embedding response malformed: {0}")]
    Malformed(String),
    #[error("embedding count mismatch: sent {sent}, received {received}")]
    CountMismatch { sent: usize, received: usize },
}

impl EmbedError {
    pub fn request<E: std::fmt::Display>(err: E) -> Self {
        EmbedError::Request(err.to_string())
    }
}

/// Failure of a single source adapter. Isolated to that adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("adapter '{adapter}' request failed: {message}")]
    Request { adapter: String, message: String },
    #[error("adapter '{adapter}' returned HTTP {status}")]
    Http { adapter: String, status: u16 },
    #[error("adapter '{adapter}' timed out")]
    Timeout { adapter: String },
    #[error("adapter '{adapter}' response malformed: {message}")]
    Malformed { adapter: String, message: String },
    #[error("adapter '{adapter}' is not configured: {reason}")]
    NotConfigured { adapter: String, reason: String },
}

impl AdapterError {
    pub fn request(adapter: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Request {
            adapter: adapter.into(),
            message: err.to_string(),
        }
    }

    pub fn http(adapter: impl Into<String>, status: u16) -> Self {
        Self::Http {
            adapter: adapter.into(),
            status,
        }
    }

    pub fn malformed(adapter: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Malformed {
            adapter: adapter.into(),
            message: err.to_string(),
        }
    }

    pub fn not_configured(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotConfigured {
            adapter: adapter.into(),
            reason: reason.into(),
        }
    }

    pub fn from_reqwest(adapter: impl Into<String>, err: reqwest::Error) -> Self {
        let adapter = adapter.into();
        if err.is_timeout() {
            Self::Timeout { adapter }
        } else {
            Self::request(adapter, err)
        }
    }

    /// Whether retrying later could plausibly succeed (network blips,
    /// throttling, upstream 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Request { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed { .. } | Self::NotConfigured { .. } => false,
        }
    }

    pub fn adapter(&self) -> &str {
        match self {
            Self::Request { adapter, .. }
            | Self::Http { adapter, .. }
            | Self::Timeout { adapter }
            | Self::Malformed { adapter, .. }
            | Self::NotConfigured { adapter, .. } => adapter,
        }
    }
}

/// Failure of a single URL fetch. Never aborts sibling fetches.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch of {url} timed out")]
    Timeout { url: String },
    #[error("fetch of {url} failed: {reason}")]
    Failed { url: String, reason: String },
    #[error("fetch of {url} blocked: {reason}")]
    Blocked { url: String, reason: String },
}

impl FetchError {
    pub fn failed(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Failed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn blocked(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Blocked {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("config field '{field}' has the wrong shape: {message}")]
    Shape { field: String, message: String },
    #[error("invalid config value for '{field}': {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}
