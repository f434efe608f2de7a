//! Lease events exchanged between the handler sidecar and the plugin.
//!
//! The DHCP client invokes the handler on every state transition; the
//! handler emits one JSON line per relevant event on stdout, which the
//! supervising process decodes back into these types.

use serde::{Deserialize, Serialize};

/// udhcpc(6) state transition names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DhcpEventType {
    /// Initial lease acquired.
    Bound,
    /// Existing lease renewed.
    Renew,
    /// Interface should be deconfigured.
    Deconfig,
    /// No lease could be obtained.
    Leasefail,
    /// Server refused the request.
    Nak,
}

/// Addressing information carried by bound/renew events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInfo {
    /// Leased address in CIDR form.
    #[serde(default)]
    pub ip: String,
    /// IPv4 gateway; empty when the server offered none (and for DHCPv6).
    #[serde(default)]
    pub gateway: String,
    /// Search domain; may be empty.
    #[serde(default)]
    pub domain: String,
}

/// One decoded handler line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpEvent {
    /// The state transition.
    #[serde(rename = "type")]
    pub event_type: DhcpEventType,
    /// Lease data; only populated for bound/renew.
    #[serde(default)]
    pub data: LeaseInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_json_round_trip() {
        let event = DhcpEvent {
            event_type: DhcpEventType::Bound,
            data: LeaseInfo {
                ip: "10.0.0.42/24".to_string(),
                gateway: "10.0.0.1".to_string(),
                domain: "lan".to_string(),
            },
        };

        let line = serde_json::to_string(&event).unwrap();
        assert!(line.contains(r#""type":"bound""#));
        let back: DhcpEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn event_without_data_decodes_to_default() {
        let event: DhcpEvent = serde_json::from_str(r#"{"type":"renew"}"#).unwrap();
        assert_eq!(event.event_type, DhcpEventType::Renew);
        assert_eq!(event.data, LeaseInfo::default());
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(serde_json::from_str::<DhcpEvent>(r#"{"type":"mystery"}"#).is_err());
    }
}
