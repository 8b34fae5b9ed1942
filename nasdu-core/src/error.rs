use std::time::Duration;

use thiserror::Error;

/// Failures reported by the remote directory-size task service.
///
/// The runner classifies these at its boundary: transient variants are
/// retried with backoff, everything else fails the affected path at once.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote service unavailable: {0}")]
    Unavailable(String),

    #[error("remote service rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    #[error("remote call timed out")]
    Timeout,

    #[error("path not found on remote: {0}")]
    PathNotFound(String),

    #[error("permission denied for {0}")]
    PermissionDenied(String),

    #[error("remote authentication failed")]
    AuthFailed,

    #[error("remote task {0} no longer exists")]
    TaskNotFound(String),

    #[error("unexpected remote response: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Whether the failure is worth retrying locally.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Unavailable(_)
                | RemoteError::RateLimited { .. }
                | RemoteError::Timeout
        )
    }

    /// Server-provided hint for how long to back off, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid scan invocation: {0}")]
    InvalidInvocation(String),

    #[error("malformed scan id: {0:?}")]
    MalformedScanId(String),

    #[error("history store error: {0}")]
    History(#[from] HistoryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
