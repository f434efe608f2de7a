//! Netlink socket operations for link, address and route management.
//!
//! Thin synchronous interface to the rtnetlink subsystem. Messages are built
//! and parsed by hand; kernel errors surface verbatim as errno values.

use std::io;
use std::mem;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;

use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};

use crate::error::{NetError, Result};
use crate::netns::NetnsGuard;

const NETLINK_ROUTE: i32 = 0;

// Netlink message types
const NLMSG_ERROR: u16 = 2;
const NLMSG_DONE: u16 = 3;
const RTM_NEWLINK: u16 = 16;
const RTM_DELLINK: u16 = 17;
const RTM_GETLINK: u16 = 18;
const RTM_GETADDR: u16 = 22;
const RTM_NEWROUTE: u16 = 24;
const RTM_GETROUTE: u16 = 26;

// Netlink flags
const NLM_F_REQUEST: u16 = 0x0001;
const NLM_F_ACK: u16 = 0x0004;
const NLM_F_ROOT: u16 = 0x0100;
const NLM_F_MATCH: u16 = 0x0200;
const NLM_F_DUMP: u16 = NLM_F_ROOT | NLM_F_MATCH;
const NLM_F_REPLACE: u16 = 0x0100;
const NLM_F_EXCL: u16 = 0x0200;
const NLM_F_CREATE: u16 = 0x0400;

// Interface flags
const IFF_UP: u32 = 0x1;

// Attribute types for link messages
const IFLA_ADDRESS: u16 = 1;
const IFLA_IFNAME: u16 = 3;
const IFLA_LINK: u16 = 5;
const IFLA_MASTER: u16 = 10;
const IFLA_LINKINFO: u16 = 18;
const IFLA_INFO_KIND: u16 = 1;
const IFLA_INFO_DATA: u16 = 2;
const VETH_INFO_PEER: u16 = 1;

// Attribute types for address messages
const IFA_ADDRESS: u16 = 1;
const IFA_LOCAL: u16 = 2;

// Attribute types for route messages
const RTA_DST: u16 = 1;
const RTA_OIF: u16 = 4;
const RTA_GATEWAY: u16 = 5;
const RTA_TABLE: u16 = 15;

// Route table, protocol, scope and type constants
pub const RT_TABLE_MAIN: u8 = 254;
pub const RTPROT_KERNEL: u8 = 2;
pub const RTPROT_BOOT: u8 = 3;
pub const RT_SCOPE_UNIVERSE: u8 = 0;
pub const RTN_UNICAST: u8 = 1;

const NLA_F_NESTED: u16 = 1 << 15;
const NLA_TYPE_MASK: u16 = 0x3fff;

/// Netlink message header.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct NlMsgHdr {
    nlmsg_len: u32,
    nlmsg_type: u16,
    nlmsg_flags: u16,
    nlmsg_seq: u32,
    nlmsg_pid: u32,
}

/// Interface info message.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct IfInfoMsg {
    ifi_family: u8,
    _pad: u8,
    ifi_type: u16,
    ifi_index: i32,
    ifi_flags: u32,
    ifi_change: u32,
}

/// Interface address message.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct IfAddrMsg {
    ifa_family: u8,
    ifa_prefixlen: u8,
    ifa_flags: u8,
    ifa_scope: u8,
    ifa_index: u32,
}

/// Route message.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct RtMsg {
    rtm_family: u8,
    rtm_dst_len: u8,
    rtm_src_len: u8,
    rtm_tos: u8,
    rtm_table: u8,
    rtm_protocol: u8,
    rtm_scope: u8,
    rtm_type: u8,
    rtm_flags: u32,
}

/// Netlink attribute header.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct NlAttr {
    nla_len: u16,
    nla_type: u16,
}

/// Address family selector for dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    fn raw(self) -> u8 {
        match self {
            Self::V4 => libc::AF_INET as u8,
            Self::V6 => libc::AF_INET6 as u8,
        }
    }
}

/// A hardware (MAC) address.
pub type MacAddr = [u8; 6];

/// Parses a colon-separated MAC address string.
pub fn parse_mac(s: &str) -> Option<MacAddr> {
    let mut mac = [0u8; 6];
    let mut parts = s.split(':');
    for byte in &mut mac {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

/// Formats a MAC address in the conventional colon-separated form.
pub fn format_mac(mac: &MacAddr) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// A network interface as reported by the kernel.
#[derive(Debug, Clone)]
pub struct Link {
    /// Interface index.
    pub index: u32,
    /// Current interface name.
    pub name: String,
    /// Link kind (e.g. "bridge", "veth"), when the kernel reports one.
    pub kind: Option<String>,
    /// Hardware address.
    pub hwaddr: Option<MacAddr>,
    /// Peer interface index (IFLA_LINK; the other end for veth links).
    pub peer_index: Option<u32>,
}

/// A unicast route as reported by the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Destination network; `None` is the default route.
    pub dst: Option<IpNetwork>,
    /// Next hop, if any.
    pub gateway: Option<IpAddr>,
    /// Output interface index.
    pub oif: Option<u32>,
    /// Routing protocol (RTPROT_*).
    pub protocol: u8,
    /// Route scope.
    pub scope: u8,
    /// Routing table.
    pub table: u8,
}

impl RouteEntry {
    fn family(&self) -> u8 {
        let v6 = match (self.dst, self.gateway) {
            (Some(IpNetwork::V6(_)), _) | (None, Some(IpAddr::V6(_))) => true,
            _ => false,
        };
        if v6 {
            libc::AF_INET6 as u8
        } else {
            libc::AF_INET as u8
        }
    }
}

/// Netlink socket handle.
///
/// A handle created with [`Netlink::in_namespace`] stays bound to that
/// namespace for its whole lifetime, regardless of the namespace the calling
/// thread is in afterwards.
pub struct Netlink {
    fd: OwnedFd,
    seq: u32,
}

impl Netlink {
    /// Creates a netlink socket in the current network namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be created or bound.
    pub fn new() -> Result<Self> {
        let fd = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                NETLINK_ROUTE,
            )
        };
        if fd < 0 {
            return Err(NetError::Netlink(format!(
                "failed to create netlink socket: {}",
                io::Error::last_os_error()
            )));
        }

        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as u16;
        addr.nl_pid = 0;
        addr.nl_groups = 0;
        let ret = unsafe {
            libc::bind(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as u32,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(NetError::Netlink(format!(
                "failed to bind netlink socket: {err}"
            )));
        }

        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd, seq: 0 })
    }

    /// Creates a netlink socket bound to the network namespace at `path`.
    ///
    /// The calling thread enters the namespace only for the socket creation
    /// and is restored before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be entered or the socket
    /// cannot be created.
    pub fn in_namespace(path: &Path) -> Result<Self> {
        let guard = NetnsGuard::enter(path)?;
        let handle = Self::new();
        guard.restore()?;
        handle
    }

    fn next_seq(&mut self) -> u32 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    // ------------------------------------------------------------------
    // Link operations
    // ------------------------------------------------------------------

    /// Looks up an interface by name.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::LinkNotFound`] if no such interface exists.
    pub fn link_by_name(&mut self, name: &str) -> Result<Link> {
        let mut msg = self.begin(RTM_GETLINK, NLM_F_REQUEST);
        put_struct(&mut msg, &IfInfoMsg::default());
        add_attr_string(&mut msg, IFLA_IFNAME, name);
        let payload = self.request_one(msg).map_err(|e| match e {
            NetError::Kernel(err) if err.raw_os_error() == Some(libc::ENODEV) => {
                NetError::LinkNotFound(name.to_string())
            }
            other => other,
        })?;
        parse_link(&payload)
    }

    /// Looks up an interface by index.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::LinkIndexNotFound`] if no such interface exists.
    pub fn link_by_index(&mut self, index: u32) -> Result<Link> {
        let mut msg = self.begin(RTM_GETLINK, NLM_F_REQUEST);
        put_struct(
            &mut msg,
            &IfInfoMsg {
                ifi_index: index as i32,
                ..Default::default()
            },
        );
        let payload = self.request_one(msg).map_err(|e| match e {
            NetError::Kernel(err) if err.raw_os_error() == Some(libc::ENODEV) => {
                NetError::LinkIndexNotFound(index)
            }
            other => other,
        })?;
        parse_link(&payload)
    }

    /// Creates a veth pair, optionally assigning a MAC to the peer side.
    ///
    /// Returns the interface index of the `name` (host) side.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel rejects the request.
    pub fn create_veth(
        &mut self,
        name: &str,
        peer_name: &str,
        peer_mac: Option<MacAddr>,
    ) -> Result<u32> {
        let mut msg = self.begin(
            RTM_NEWLINK,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        );
        put_struct(&mut msg, &IfInfoMsg::default());
        add_attr_string(&mut msg, IFLA_IFNAME, name);

        let linkinfo = begin_nested(&mut msg, IFLA_LINKINFO);
        add_attr_string(&mut msg, IFLA_INFO_KIND, "veth");
        let data = begin_nested(&mut msg, IFLA_INFO_DATA);
        let peer = begin_nested(&mut msg, VETH_INFO_PEER);
        put_struct(&mut msg, &IfInfoMsg::default());
        add_attr_string(&mut msg, IFLA_IFNAME, peer_name);
        if let Some(mac) = peer_mac {
            add_attr_bytes(&mut msg, IFLA_ADDRESS, &mac);
        }
        end_nested(&mut msg, peer);
        end_nested(&mut msg, data);
        end_nested(&mut msg, linkinfo);

        self.request_ack(msg)?;
        Ok(self.link_by_name(name)?.index)
    }

    /// Deletes an interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel rejects the request.
    pub fn del_link(&mut self, index: u32) -> Result<()> {
        let mut msg = self.begin(RTM_DELLINK, NLM_F_REQUEST | NLM_F_ACK);
        put_struct(
            &mut msg,
            &IfInfoMsg {
                ifi_index: index as i32,
                ..Default::default()
            },
        );
        self.request_ack(msg)
    }

    /// Brings an interface up.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel rejects the request.
    pub fn set_up(&mut self, index: u32) -> Result<()> {
        let mut msg = self.begin(RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK);
        put_struct(
            &mut msg,
            &IfInfoMsg {
                ifi_index: index as i32,
                ifi_flags: IFF_UP,
                ifi_change: IFF_UP,
                ..Default::default()
            },
        );
        self.request_ack(msg)
    }

    /// Enslaves an interface to a master (bridge) interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel rejects the request.
    pub fn set_master(&mut self, index: u32, master: u32) -> Result<()> {
        let mut msg = self.begin(RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK);
        put_struct(
            &mut msg,
            &IfInfoMsg {
                ifi_index: index as i32,
                ..Default::default()
            },
        );
        add_attr_u32(&mut msg, IFLA_MASTER, master);
        self.request_ack(msg)
    }

    /// Sets an interface's hardware address.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel rejects the request.
    pub fn set_hwaddr(&mut self, index: u32, mac: MacAddr) -> Result<()> {
        let mut msg = self.begin(RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK);
        put_struct(
            &mut msg,
            &IfInfoMsg {
                ifi_index: index as i32,
                ..Default::default()
            },
        );
        add_attr_bytes(&mut msg, IFLA_ADDRESS, &mac);
        self.request_ack(msg)
    }

    // ------------------------------------------------------------------
    // Address operations
    // ------------------------------------------------------------------

    /// Lists the addresses of one family assigned to an interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the dump fails or an address cannot be decoded.
    pub fn addresses(&mut self, family: Family, index: u32) -> Result<Vec<IpNetwork>> {
        let mut msg = self.begin(RTM_GETADDR, NLM_F_REQUEST | NLM_F_DUMP);
        put_struct(
            &mut msg,
            &IfAddrMsg {
                ifa_family: family.raw(),
                ..Default::default()
            },
        );

        let mut addrs = Vec::new();
        for payload in self.request_dump(msg)? {
            if payload.len() < mem::size_of::<IfAddrMsg>() {
                continue;
            }
            let ifa: IfAddrMsg = read_struct(&payload);
            // Old kernels ignore the family filter in the request.
            if ifa.ifa_index != index || ifa.ifa_family != family.raw() {
                continue;
            }
            let attrs = parse_attrs(&payload[align4(mem::size_of::<IfAddrMsg>())..]);
            let raw = attr_value(&attrs, IFA_ADDRESS).or_else(|| attr_value(&attrs, IFA_LOCAL));
            if let Some(raw) = raw {
                addrs.push(decode_network(raw, ifa.ifa_prefixlen)?);
            }
        }
        Ok(addrs)
    }

    // ------------------------------------------------------------------
    // Route operations
    // ------------------------------------------------------------------

    /// Lists main-table unicast routes of one family whose output interface
    /// is `oif`.
    ///
    /// # Errors
    ///
    /// Returns an error if the dump fails or a route cannot be decoded.
    pub fn routes(&mut self, family: Family, oif: u32) -> Result<Vec<RouteEntry>> {
        let mut msg = self.begin(RTM_GETROUTE, NLM_F_REQUEST | NLM_F_DUMP);
        put_struct(
            &mut msg,
            &RtMsg {
                rtm_family: family.raw(),
                ..Default::default()
            },
        );

        let mut routes = Vec::new();
        for payload in self.request_dump(msg)? {
            if payload.len() < mem::size_of::<RtMsg>() {
                continue;
            }
            let rtm: RtMsg = read_struct(&payload);
            if rtm.rtm_type != RTN_UNICAST || rtm.rtm_family != family.raw() {
                continue;
            }
            let attrs = parse_attrs(&payload[align4(mem::size_of::<RtMsg>())..]);

            let table = attr_value(&attrs, RTA_TABLE)
                .and_then(read_u32)
                .map_or(rtm.rtm_table, |t| t as u8);
            if table != RT_TABLE_MAIN {
                continue;
            }

            let route_oif = attr_value(&attrs, RTA_OIF).and_then(read_u32);
            if route_oif != Some(oif) {
                continue;
            }

            let dst = match attr_value(&attrs, RTA_DST) {
                Some(raw) => Some(decode_network(raw, rtm.rtm_dst_len)?),
                None => None,
            };
            let gateway = match attr_value(&attrs, RTA_GATEWAY) {
                Some(raw) => Some(decode_ip(raw)?),
                None => None,
            };

            routes.push(RouteEntry {
                dst,
                gateway,
                oif: route_oif,
                protocol: rtm.rtm_protocol,
                scope: rtm.rtm_scope,
                table,
            });
        }
        Ok(routes)
    }

    /// Lists the default routes of one family on `oif`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying route dump fails.
    pub fn default_routes(&mut self, family: Family, oif: u32) -> Result<Vec<RouteEntry>> {
        Ok(self
            .routes(family, oif)?
            .into_iter()
            .filter(|r| r.dst.is_none())
            .collect())
    }

    /// Adds a default route via `gateway` on `oif`.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel rejects the request.
    pub fn add_default_route(&mut self, oif: u32, gateway: IpAddr) -> Result<()> {
        let route = RouteEntry {
            dst: None,
            gateway: Some(gateway),
            oif: Some(oif),
            protocol: RTPROT_BOOT,
            scope: RT_SCOPE_UNIVERSE,
            table: RT_TABLE_MAIN,
        };
        let msg = self.route_message(&route, NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL);
        self.request_ack(msg)
    }

    /// Replaces a route, matching on its destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel rejects the request.
    pub fn replace_route(&mut self, route: &RouteEntry) -> Result<()> {
        let msg = self.route_message(
            route,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_REPLACE,
        );
        self.request_ack(msg)
    }

    fn route_message(&mut self, route: &RouteEntry, flags: u16) -> Vec<u8> {
        let mut msg = self.begin(RTM_NEWROUTE, flags);
        put_struct(
            &mut msg,
            &RtMsg {
                rtm_family: route.family(),
                rtm_dst_len: route.dst.map_or(0, |d| d.prefix()),
                rtm_table: route.table,
                rtm_protocol: route.protocol,
                rtm_scope: route.scope,
                rtm_type: RTN_UNICAST,
                ..Default::default()
            },
        );
        if let Some(dst) = route.dst {
            match dst {
                IpNetwork::V4(v4) => add_attr_bytes(&mut msg, RTA_DST, &v4.ip().octets()),
                IpNetwork::V6(v6) => add_attr_bytes(&mut msg, RTA_DST, &v6.ip().octets()),
            }
        }
        if let Some(gw) = route.gateway {
            match gw {
                IpAddr::V4(v4) => add_attr_bytes(&mut msg, RTA_GATEWAY, &v4.octets()),
                IpAddr::V6(v6) => add_attr_bytes(&mut msg, RTA_GATEWAY, &v6.octets()),
            }
        }
        if let Some(oif) = route.oif {
            add_attr_u32(&mut msg, RTA_OIF, oif);
        }
        msg
    }

    // ------------------------------------------------------------------
    // Message transport
    // ------------------------------------------------------------------

    fn begin(&mut self, msg_type: u16, flags: u16) -> Vec<u8> {
        let seq = self.next_seq();
        let mut msg = Vec::with_capacity(256);
        put_struct(
            &mut msg,
            &NlMsgHdr {
                nlmsg_len: 0,
                nlmsg_type: msg_type,
                nlmsg_flags: flags,
                nlmsg_seq: seq,
                nlmsg_pid: 0,
            },
        );
        msg
    }

    fn send(&self, msg: &mut Vec<u8>) -> Result<()> {
        let len = msg.len() as u32;
        msg[..4].copy_from_slice(&len.to_ne_bytes());

        let ret = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                msg.as_ptr() as *const libc::c_void,
                msg.len(),
                0,
            )
        };
        if ret < 0 {
            return Err(NetError::Netlink(format!(
                "failed to send netlink message: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    fn recv(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; 65536];
        let len = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if len < 0 {
            return Err(NetError::Netlink(format!(
                "failed to receive netlink response: {}",
                io::Error::last_os_error()
            )));
        }
        buf.truncate(len as usize);
        Ok(buf)
    }

    /// Sends a change request and waits for its acknowledgement.
    fn request_ack(&mut self, mut msg: Vec<u8>) -> Result<()> {
        let seq = self.seq;
        self.send(&mut msg)?;

        loop {
            let buf = self.recv()?;
            for (hdr, payload) in split_messages(&buf) {
                if hdr.nlmsg_seq != seq {
                    continue;
                }
                if hdr.nlmsg_type == NLMSG_ERROR {
                    return ack_error(&payload);
                }
            }
        }
    }

    /// Sends a single-answer GET request and returns the reply payload.
    fn request_one(&mut self, mut msg: Vec<u8>) -> Result<Vec<u8>> {
        let seq = self.seq;
        self.send(&mut msg)?;

        loop {
            let buf = self.recv()?;
            for (hdr, payload) in split_messages(&buf) {
                if hdr.nlmsg_seq != seq {
                    continue;
                }
                if hdr.nlmsg_type == NLMSG_ERROR {
                    ack_error(&payload)?;
                    continue;
                }
                return Ok(payload);
            }
        }
    }

    /// Sends a dump request and collects every reply payload.
    fn request_dump(&mut self, mut msg: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        let seq = self.seq;
        self.send(&mut msg)?;

        let mut payloads = Vec::new();
        loop {
            let buf = self.recv()?;
            for (hdr, payload) in split_messages(&buf) {
                if hdr.nlmsg_seq != seq {
                    continue;
                }
                match hdr.nlmsg_type {
                    NLMSG_DONE => return Ok(payloads),
                    NLMSG_ERROR => ack_error(&payload)?,
                    _ => payloads.push(payload),
                }
            }
        }
    }
}

// ----------------------------------------------------------------------
// Message encoding helpers
// ----------------------------------------------------------------------

fn align4(len: usize) -> usize {
    (len + 3) & !3
}

fn put_struct<T: Copy>(msg: &mut Vec<u8>, value: &T) {
    // SAFETY: T is a plain #[repr(C)] value read as raw bytes.
    msg.extend_from_slice(unsafe {
        std::slice::from_raw_parts(value as *const T as *const u8, mem::size_of::<T>())
    });
}

fn read_struct<T: Copy>(buf: &[u8]) -> T {
    assert!(buf.len() >= mem::size_of::<T>());
    // SAFETY: length checked above; T is a plain #[repr(C)] struct and the
    // read is unaligned-safe.
    unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const T) }
}

fn add_attr_bytes(msg: &mut Vec<u8>, attr_type: u16, value: &[u8]) {
    let attr_len = mem::size_of::<NlAttr>() + value.len();
    put_struct(
        msg,
        &NlAttr {
            nla_len: attr_len as u16,
            nla_type: attr_type,
        },
    );
    msg.extend_from_slice(value);
    msg.extend(std::iter::repeat(0).take(align4(attr_len) - attr_len));
}

fn add_attr_string(msg: &mut Vec<u8>, attr_type: u16, value: &str) {
    let mut bytes = value.as_bytes().to_vec();
    bytes.push(0);
    add_attr_bytes(msg, attr_type, &bytes);
}

fn add_attr_u32(msg: &mut Vec<u8>, attr_type: u16, value: u32) {
    add_attr_bytes(msg, attr_type, &value.to_ne_bytes());
}

fn begin_nested(msg: &mut Vec<u8>, attr_type: u16) -> usize {
    let start = msg.len();
    put_struct(
        msg,
        &NlAttr {
            nla_len: 0,
            nla_type: attr_type | NLA_F_NESTED,
        },
    );
    start
}

fn end_nested(msg: &mut Vec<u8>, start: usize) {
    let len = (msg.len() - start) as u16;
    msg[start..start + 2].copy_from_slice(&len.to_ne_bytes());
}

// ----------------------------------------------------------------------
// Message decoding helpers
// ----------------------------------------------------------------------

/// Splits a received datagram into (header, payload) pairs.
fn split_messages(buf: &[u8]) -> Vec<(NlMsgHdr, Vec<u8>)> {
    let hdr_len = mem::size_of::<NlMsgHdr>();
    let mut messages = Vec::new();
    let mut offset = 0;

    while offset + hdr_len <= buf.len() {
        let hdr: NlMsgHdr = read_struct(&buf[offset..]);
        let total = hdr.nlmsg_len as usize;
        if total < hdr_len || offset + total > buf.len() {
            break;
        }
        messages.push((hdr, buf[offset + hdr_len..offset + total].to_vec()));
        offset += align4(total);
    }
    messages
}

/// Decodes an NLMSG_ERROR payload; errno 0 is an acknowledgement.
fn ack_error(payload: &[u8]) -> Result<()> {
    if payload.len() < 4 {
        return Err(NetError::Netlink("truncated netlink error".to_string()));
    }
    let code = i32::from_ne_bytes([payload[0], payload[1], payload[2], payload[3]]);
    if code == 0 {
        return Ok(());
    }
    Err(NetError::Kernel(io::Error::from_raw_os_error(-code)))
}

/// Parses a flat attribute region into (type, value) pairs.
fn parse_attrs(buf: &[u8]) -> Vec<(u16, Vec<u8>)> {
    let hdr_len = mem::size_of::<NlAttr>();
    let mut attrs = Vec::new();
    let mut offset = 0;

    while offset + hdr_len <= buf.len() {
        let attr: NlAttr = read_struct(&buf[offset..]);
        let total = attr.nla_len as usize;
        if total < hdr_len || offset + total > buf.len() {
            break;
        }
        attrs.push((
            attr.nla_type & NLA_TYPE_MASK,
            buf[offset + hdr_len..offset + total].to_vec(),
        ));
        offset += align4(total);
    }
    attrs
}

fn attr_value<'a>(attrs: &'a [(u16, Vec<u8>)], attr_type: u16) -> Option<&'a [u8]> {
    attrs
        .iter()
        .find(|(t, _)| *t == attr_type)
        .map(|(_, v)| v.as_slice())
}

fn read_u32(raw: &[u8]) -> Option<u32> {
    raw.get(..4)
        .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn decode_ip(raw: &[u8]) -> Result<IpAddr> {
    match raw.len() {
        4 => Ok(IpAddr::V4(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]))),
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(raw);
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        n => Err(NetError::InvalidAddress(format!(
            "unexpected address length {n}"
        ))),
    }
}

fn decode_network(raw: &[u8], prefix: u8) -> Result<IpNetwork> {
    match decode_ip(raw)? {
        IpAddr::V4(ip) => Ipv4Network::new(ip, prefix)
            .map(IpNetwork::V4)
            .map_err(|e| NetError::InvalidAddress(e.to_string())),
        IpAddr::V6(ip) => Ipv6Network::new(ip, prefix)
            .map(IpNetwork::V6)
            .map_err(|e| NetError::InvalidAddress(e.to_string())),
    }
}

fn parse_link(payload: &[u8]) -> Result<Link> {
    if payload.len() < mem::size_of::<IfInfoMsg>() {
        return Err(NetError::Netlink("truncated link message".to_string()));
    }
    let ifi: IfInfoMsg = read_struct(payload);
    let attrs = parse_attrs(&payload[align4(mem::size_of::<IfInfoMsg>())..]);

    let name = attr_value(&attrs, IFLA_IFNAME)
        .map(read_string)
        .unwrap_or_default();
    let hwaddr = attr_value(&attrs, IFLA_ADDRESS).and_then(|raw| {
        let mut mac = [0u8; 6];
        if raw.len() == 6 {
            mac.copy_from_slice(raw);
            Some(mac)
        } else {
            None
        }
    });
    let peer_index = attr_value(&attrs, IFLA_LINK).and_then(read_u32);
    let kind = attr_value(&attrs, IFLA_LINKINFO).and_then(|nested| {
        let inner = parse_attrs(nested);
        attr_value(&inner, IFLA_INFO_KIND).map(read_string)
    });

    Ok(Link {
        index: ifi.ifi_index as u32,
        name,
        kind,
        hwaddr,
        peer_index,
    })
}
