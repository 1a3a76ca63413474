use thiserror::Error;

/// Failure taxonomy for everything that talks to the server.
///
/// None of these ever escape to the UI as a panic. Poll tasks log and skip the
/// tick, sends turn them into a [`SendOutcome`](crate::common::SendOutcome).
#[derive(Debug, Error)]
pub enum SyncError {
    /// Request never produced a response (connect error, timeout, reset).
    #[error("network error: {0}")]
    TransientNetwork(String),

    /// HTTP 429 on a send.
    #[error("rate limited by server")]
    RateLimited,

    /// HTTP 401 or a lost API session. Handled as a logout.
    #[error("authentication expired")]
    AuthExpired,

    /// HTTP 403 on a privileged call.
    #[error("forbidden")]
    Forbidden,

    /// A client-side gate refused the action before any request was made.
    #[error("not allowed: {0}")]
    ModerationDenied(String),

    /// Body did not match the expected JSON shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("server returned HTTP {status}")]
    Http { status: u16 },

    /// Server URL or request path cannot form a valid URL. Retrying will
    /// not help.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl SyncError {
    /// Whether a poll task should just try again next interval.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::TransientNetwork(_) | SyncError::MalformedResponse(_) | SyncError::Http { .. }
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::MalformedResponse(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
