//! Error types for DHCP client supervision.

use thiserror::Error;

/// Result type alias for DHCP client operations.
pub type Result<T> = std::result::Result<T, DhcpError>;

/// Errors that can occur while running udhcpc(6).
#[derive(Debug, Error)]
pub enum DhcpError {
    /// The client binary could not be spawned or waited on.
    #[error("failed to run udhcpc: {0}")]
    Spawn(std::io::Error),

    /// A stdio pipe was not set up.
    #[error("failed to set up udhcpc {0} pipe")]
    Pipe(&'static str),

    /// Namespace entry for the spawn failed.
    #[error(transparent)]
    Namespace(#[from] netdhcp_net::NetError),

    /// Signalling the client failed.
    #[error("{0}")]
    Signal(String),

    /// The client exited with a non-zero status.
    #[error("udhcpc exited with {0}")]
    Exit(std::process::ExitStatus),

    /// The client did not exit within the finish deadline.
    #[error("timed out waiting for udhcpc to exit")]
    FinishTimeout,

    /// The one-shot client exited without reporting a lease.
    #[error("udhcpc did not output a lease")]
    NoLease,

    /// The one-shot lease was not obtained within the timeout.
    #[error("timed out waiting for a DHCP lease")]
    LeaseTimeout,
}
