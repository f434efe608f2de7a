//! Assembly of handler events from the DHCP client's environment.
//!
//! udhcpc(6) passes the state transition as argv[1] and the lease fields as
//! environment variables. The udhcpc-handler binary snapshots that
//! environment and builds the JSON event here, so the contract stays
//! testable without spawning anything.

use ipnetwork::Ipv6Network;

use crate::event::{DhcpEvent, DhcpEventType, LeaseInfo};

/// Event types the handler acknowledges but does not forward.
pub const SILENT_EVENTS: [&str; 3] = ["deconfig", "leasefail", "nak"];

/// Snapshot of the lease environment variables udhcpc(6) sets.
#[derive(Debug, Clone, Default)]
pub struct HandlerEnv {
    /// `$ip` (v4, address only).
    pub ip: Option<String>,
    /// `$mask` (v4 prefix length).
    pub mask: Option<String>,
    /// `$router` (v4 gateway).
    pub router: Option<String>,
    /// `$domain`.
    pub domain: Option<String>,
    /// `$ipv6`; presence marks the event as DHCPv6.
    pub ipv6: Option<String>,
}

impl HandlerEnv {
    /// Captures the relevant variables from the process environment.
    pub fn from_process_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self {
            ip: var("ip"),
            mask: var("mask"),
            router: var("router"),
            domain: var("domain"),
            ipv6: var("ipv6"),
        }
    }
}

/// Builds the event to emit for a state transition, if any.
///
/// Only `bound` and `renew` produce output. The caller decides how to log
/// the rest (see [`SILENT_EVENTS`]).
pub fn assemble_event(kind: &str, env: &HandlerEnv) -> Option<DhcpEvent> {
    let event_type = match kind {
        "bound" => DhcpEventType::Bound,
        "renew" => DhcpEventType::Renew,
        _ => return None,
    };

    let data = if let Some(v6) = &env.ipv6 {
        // udhcpc6 emits every zero group; normalizing through a /128 network
        // produces the canonical compressed form.
        let ip = match format!("{v6}/128").parse::<Ipv6Network>() {
            Ok(net) => net.to_string(),
            Err(e) => {
                tracing::warn!("failed to parse IPv6 address {v6}: {e}");
                format!("{v6}/128")
            }
        };
        LeaseInfo {
            ip,
            ..Default::default()
        }
    } else {
        LeaseInfo {
            ip: format!(
                "{}/{}",
                env.ip.as_deref().unwrap_or_default(),
                env.mask.as_deref().unwrap_or_default()
            ),
            gateway: env.router.clone().unwrap_or_default(),
            domain: env.domain.clone().unwrap_or_default(),
        }
    };

    Some(DhcpEvent { event_type, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_v4_event_carries_cidr_gateway_and_domain() {
        let env = HandlerEnv {
            ip: Some("10.0.0.42".to_string()),
            mask: Some("24".to_string()),
            router: Some("10.0.0.1".to_string()),
            domain: Some("lan".to_string()),
            ipv6: None,
        };

        let event = assemble_event("bound", &env).unwrap();
        assert_eq!(event.event_type, DhcpEventType::Bound);
        assert_eq!(event.data.ip, "10.0.0.42/24");
        assert_eq!(event.data.gateway, "10.0.0.1");
        assert_eq!(event.data.domain, "lan");
    }

    #[test]
    fn v6_event_normalizes_uncompressed_addresses() {
        let env = HandlerEnv {
            ipv6: Some("2001:db8:0:0:0:0:0:1".to_string()),
            ..Default::default()
        };

        let event = assemble_event("renew", &env).unwrap();
        assert_eq!(event.data.ip, "2001:db8::1/128");
        assert_eq!(event.data.gateway, "");
        assert_eq!(event.data.domain, "");
    }

    #[test]
    fn silent_and_unknown_events_emit_nothing() {
        let env = HandlerEnv::default();
        for kind in SILENT_EVENTS {
            assert!(assemble_event(kind, &env).is_none());
        }
        assert!(assemble_event("mystery", &env).is_none());
    }

    #[test]
    fn round_trip_through_json_preserves_the_event() {
        let env = HandlerEnv {
            ip: Some("192.168.1.7".to_string()),
            mask: Some("16".to_string()),
            router: Some("192.168.0.1".to_string()),
            domain: None,
            ipv6: None,
        };

        let event = assemble_event("renew", &env).unwrap();
        let line = serde_json::to_string(&event).unwrap();
        let back: DhcpEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(back, event);
    }
}
