//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Authentication with the remote store failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The device contact directory denied access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No device contact directory exists on this platform.
    #[error("device contacts unavailable: {0}")]
    Unavailable(String),

    /// The remote store failed while handling the request.
    #[error("server error: {0}")]
    ServerError(String),

    /// The remote store rejected the request (validation and similar).
    #[error("request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// A record was not found.
    #[error("contact not found: {0}")]
    NotFound(String),

    /// The device contact source failed.
    #[error("device source error: {0}")]
    Source(String),

    /// The adapter does not support this operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Codec error (JSON bodies).
    #[error("codec error: {0}")]
    Codec(String),

    /// Invalid model value.
    #[error("invalid contact data: {0}")]
    Model(#[from] synchro_model::ModelError),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Another run is in progress on this engine.
    #[error("a sync run is already in progress")]
    AlreadyRunning,

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::ServerError(_) => true,
            _ => false,
        }
    }

    /// Returns true if this error should stop the whole run rather than a
    /// single record.
    pub fn aborts_run(&self) -> bool {
        matches!(
            self,
            SyncError::PermissionDenied(_)
                | SyncError::Unavailable(_)
                | SyncError::AuthenticationFailed(_)
                | SyncError::Cancelled
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}
