//! Core error types for holdfast-core.
//!
//! Every failure in this crate degrades to a visible message; none of these
//! errors is fatal to the process. The hierarchy mirrors the three failure
//! families the pipeline distinguishes: permission errors on the camera,
//! capture precondition errors, and remote-call errors.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for holdfast-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Remote store, blob store or transform errors
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Camera and encoding errors
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Upload lifecycle errors
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local database errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by the remote collaborators (task store, blob store,
/// image transform).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The request never produced an HTTP response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// No base URL or credentials configured.
    #[error("remote store not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for RemoteError {
    fn from(err: url::ParseError) -> Self {
        RemoteError::NotConfigured(format!("invalid base URL: {err}"))
    }
}

/// Camera acquisition and frame capture errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The user or the platform refused camera access.
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    /// No matching device, or the device went away mid-stream.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// The frame could not be turned into a compressed image.
    #[error("failed to encode frame: {0}")]
    Encode(String),

    /// Capture was attempted without a live stream.
    #[error("no live stream to capture from")]
    NotLive,
}

/// Upload lifecycle errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Only one upload may ever start per capture session.
    #[error("an upload was already started for this capture")]
    AlreadyStarted,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Dotted key does not name a configuration field
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_status_message_includes_code() {
        let err = RemoteError::Status {
            status: 503,
            body: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "HTTP 503: unavailable");
    }

    #[test]
    fn capture_error_converts_into_core_error() {
        let err: CoreError = CaptureError::PermissionDenied("NotAllowedError".into()).into();
        assert!(matches!(err, CoreError::Capture(CaptureError::PermissionDenied(_))));
    }

    #[test]
    fn locked_sqlite_maps_to_locked() {
        let raw = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            None,
        );
        assert!(matches!(DatabaseError::from(raw), DatabaseError::Locked));
    }
}
