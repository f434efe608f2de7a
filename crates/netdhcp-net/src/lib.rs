//! Kernel plumbing for the net-dhcp plugin.
//!
//! Two pieces: a hand-rolled rtnetlink handle covering the link, address and
//! route operations the driver needs, and a scoped guard for entering a
//! container's network namespace with guaranteed restore.

pub mod error;
pub mod netlink;
pub mod netns;

pub use error::{NetError, Result};
pub use netlink::{
    format_mac, parse_mac, Family, Link, MacAddr, Netlink, RouteEntry, RTPROT_BOOT, RTPROT_KERNEL,
    RTN_UNICAST, RT_SCOPE_UNIVERSE, RT_TABLE_MAIN,
};
pub use netns::NetnsGuard;
