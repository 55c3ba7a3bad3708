//! Error types for `permctl` core library.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::permission::{PermissionKind, PermissionStatus};

/// Result type alias using `permctl` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `permctl` operations.
///
/// The permission variants never escape the orchestrator: the probe and
/// grant boundaries log them and fold them into a [`PermissionStatus`].
#[derive(Debug, Error)]
pub enum Error {
    /// The OS privacy-authorization subsystem could not be queried.
    #[error("Authorization subsystem unavailable for {kind}: {reason}")]
    ProbeUnavailable { kind: PermissionKind, reason: String },

    /// The native consent flow did not respond within its budget.
    #[error("Consent request for {kind} timed out after {timeout:?}")]
    RequestTimedOut {
        kind: PermissionKind,
        timeout: Duration,
    },

    /// The consent flow finished without a grant.
    #[error("Consent request for {kind} was not granted (status: {status})")]
    RequestDenied {
        kind: PermissionKind,
        status: PermissionStatus,
    },

    /// No restart strategy succeeded.
    #[error("No restart strategy succeeded (attempted: {attempted:?})")]
    RestartUnavailable { attempted: Vec<String> },

    /// An on-disk marker could not be read.
    #[error("Marker {path} is unreadable: {reason}")]
    MarkerCorrupt { path: PathBuf, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
