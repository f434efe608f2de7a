//! Error types for the Docker client.

use thiserror::Error;

/// Result type alias for Docker API operations.
pub type Result<T> = std::result::Result<T, DockerError>;

/// Errors that can occur while talking to the Docker daemon.
#[derive(Debug, Error)]
pub enum DockerError {
    /// The DOCKER_HOST value is not a UNIX socket URL.
    #[error("unsupported Docker host {0:?} (only unix:// is supported)")]
    UnsupportedHost(String),

    /// Connecting to or speaking HTTP over the socket failed.
    #[error("failed to reach Docker daemon: {0}")]
    Transport(String),

    /// The daemon answered with a non-success status.
    #[error("Docker daemon returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Daemon-provided message, when present.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode Docker response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request did not complete within the client timeout.
    #[error("Docker request timed out")]
    Timeout,
}
