//! Process-wide plugin state.
//!
//! Two maps keyed by endpoint ID, guarded by a single mutex: the transient
//! join hints produced by CreateEndpoint, and the persistent DHCP managers
//! registered after Join. Nothing here is persisted; a plugin restart
//! relies on Docker re-establishing endpoints.

use std::collections::HashMap;

use ipnetwork::IpNetwork;
use parking_lot::Mutex;

use crate::manager::DhcpManager;

/// Addressing acquired by CreateEndpoint, consumed exactly once by Join.
#[derive(Debug, Clone, Default)]
pub struct JoinHint {
    /// Leased IPv4 address with prefix.
    pub ipv4: Option<IpNetwork>,
    /// Leased IPv6 address with prefix, when DHCPv6 is enabled.
    pub ipv6: Option<IpNetwork>,
    /// IPv4 gateway as reported by the lease; empty when none was offered.
    pub gateway: String,
}

#[derive(Default)]
struct Maps {
    join_hints: HashMap<String, JoinHint>,
    managers: HashMap<String, DhcpManager>,
}

/// Shared state of the running plugin.
#[derive(Default)]
pub struct PluginState {
    inner: Mutex<Maps>,
}

impl PluginState {
    /// Creates or updates the hint for an endpoint in place.
    pub fn update_hint(&self, endpoint_id: &str, f: impl FnOnce(&mut JoinHint)) {
        let mut maps = self.inner.lock();
        f(maps.join_hints.entry(endpoint_id.to_string()).or_default());
    }

    /// Removes and returns the hint for an endpoint.
    pub fn take_hint(&self, endpoint_id: &str) -> Option<JoinHint> {
        self.inner.lock().join_hints.remove(endpoint_id)
    }

    /// Drops any hint recorded for an endpoint.
    pub fn discard_hint(&self, endpoint_id: &str) {
        self.inner.lock().join_hints.remove(endpoint_id);
    }

    /// Registers the persistent manager for an endpoint.
    pub fn register_manager(&self, endpoint_id: String, manager: DhcpManager) {
        let mut maps = self.inner.lock();
        if maps.managers.insert(endpoint_id.clone(), manager).is_some() {
            tracing::warn!(endpoint = %endpoint_id, "replaced an existing DHCP manager");
        }
    }

    /// Removes and returns the persistent manager for an endpoint.
    pub fn remove_manager(&self, endpoint_id: &str) -> Option<DhcpManager> {
        self.inner.lock().managers.remove(endpoint_id)
    }

    /// Removes every registered manager, for shutdown.
    pub fn drain_managers(&self) -> Vec<(String, DhcpManager)> {
        self.inner.lock().managers.drain().collect()
    }

    /// Number of registered managers.
    pub fn manager_count(&self) -> usize {
        self.inner.lock().managers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_is_read_then_deleted_exactly_once() {
        let state = PluginState::default();
        state.update_hint("ep1", |hint| {
            hint.ipv4 = Some("10.0.0.42/24".parse().unwrap());
            hint.gateway = "10.0.0.1".to_string();
        });
        state.update_hint("ep1", |hint| {
            hint.ipv6 = Some("2001:db8::1/64".parse().unwrap());
        });

        let hint = state.take_hint("ep1").unwrap();
        assert_eq!(hint.gateway, "10.0.0.1");
        assert!(hint.ipv4.is_some());
        assert!(hint.ipv6.is_some());

        assert!(state.take_hint("ep1").is_none());
    }

    #[test]
    fn discard_removes_partial_hints() {
        let state = PluginState::default();
        state.update_hint("ep1", |hint| {
            hint.ipv4 = Some("10.0.0.42/24".parse().unwrap());
        });
        state.discard_hint("ep1");
        assert!(state.take_hint("ep1").is_none());
    }

    #[test]
    fn hints_do_not_leak_across_endpoints() {
        let state = PluginState::default();
        state.update_hint("ep1", |hint| hint.gateway = "10.0.0.1".to_string());
        assert!(state.take_hint("ep2").is_none());
        assert!(state.take_hint("ep1").is_some());
    }
}
