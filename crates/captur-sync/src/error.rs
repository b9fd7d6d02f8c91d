use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the remote backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("unexpected HTTP status {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// No signed-in user, or the session token was rejected.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid backend URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("unexpected backend response: {0}")]
    Unexpected(String),
}

impl BackendError {
    /// Transient failures that a later attempt may get past.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            BackendError::Status { status, .. } => *status >= 500 || *status == 429,
            BackendError::NotAuthenticated
            | BackendError::Deserialize { .. }
            | BackendError::InvalidBaseUrl { .. }
            | BackendError::Unexpected(_) => false,
        }
    }
}

/// Errors from durable local storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialize stored value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors surfaced by the tracking controller.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// The user refused location access. Terminal for the session.
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location provider error: {0}")]
    Provider(String),
}
