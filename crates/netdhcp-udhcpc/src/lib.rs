//! udhcpc(6) supervision for the net-dhcp plugin.
//!
//! Wraps the BusyBox DHCP clients as children emitting line-delimited JSON
//! lease events, with one-shot and persistent modes, namespace-aware
//! spawning, and the handler-side event assembly.

pub mod client;
pub mod error;
pub mod event;
pub mod handler;

pub use client::{build_args, lease_once, DhcpClient, DhcpClientOptions, DEFAULT_HANDLER, VENDOR_ID};
pub use error::{DhcpError, Result};
pub use event::{DhcpEvent, DhcpEventType, LeaseInfo};
pub use handler::{assemble_event, HandlerEnv, SILENT_EVENTS};
