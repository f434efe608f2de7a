//! Minimal Docker Engine API client.
//!
//! The plugin needs three read-only operations from the daemon: list
//! networks, inspect a network, inspect a container. This crate provides
//! exactly those, over the daemon's UNIX socket, with a short per-request
//! deadline and lazy API-version negotiation.

pub mod client;
pub mod error;
pub mod types;

pub use client::{DockerClient, DEFAULT_SOCKET};
pub use error::{DockerError, Result};
pub use types::{
    ContainerConfig, ContainerInspect, ContainerState, Ipam, IpamConfig, NetworkContainer,
    NetworkResource,
};
