//! Error types for kernel-facing operations.

use thiserror::Error;

/// Result type alias for netlink and namespace operations.
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors that can occur while talking to the kernel.
#[derive(Debug, Error)]
pub enum NetError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Netlink error.
    #[error("netlink error: {0}")]
    Netlink(String),

    /// Kernel rejected a netlink request.
    #[error("netlink request failed: {0}")]
    Kernel(std::io::Error),

    /// No interface with the given name exists.
    #[error("interface not found: {0}")]
    LinkNotFound(String),

    /// No interface with the given index exists.
    #[error("interface index not found: {0}")]
    LinkIndexNotFound(u32),

    /// Malformed address or prefix.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Network namespace entry or restore failed.
    #[error("namespace error: {0}")]
    Namespace(String),
}
