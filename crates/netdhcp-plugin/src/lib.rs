//! Docker remote network driver backed by an external DHCP service.
//!
//! The driver attaches containers to a user-managed Linux bridge with veth
//! pairs whose addresses come from the DHCP infrastructure already serving
//! that bridge: a one-shot lease during CreateEndpoint, route mirroring at
//! Join, and a persistent in-namespace client renewing the lease for the
//! container's lifetime.

pub mod driver;
pub mod error;
pub mod manager;
pub mod options;
pub mod poll;
pub mod protocol;
pub mod routes;
pub mod server;
pub mod state;
pub mod util;

pub use driver::{NetworkDriver, DRIVER_NAME};
pub use error::{PluginError, Result};
pub use manager::DhcpManager;
pub use options::{NetworkOptions, DEFAULT_LEASE_TIMEOUT, GENERIC_OPTIONS_KEY};
pub use server::{router, serve, DEFAULT_SOCKET};
pub use state::{JoinHint, PluginState};
pub use util::{is_dhcp_plugin, veth_pair_names};
