//! Engine API response shapes.
//!
//! Only the fields the plugin actually reads are modelled; everything else
//! in the daemon's responses is ignored.

use std::collections::HashMap;

use serde::Deserialize;

/// A network as returned by `GET /networks` and `GET /networks/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkResource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Driver name; plugin-backed networks carry the plugin image reference.
    #[serde(default)]
    pub driver: String,
    /// Driver-specific options as stored by the daemon.
    #[serde(default)]
    pub options: HashMap<String, String>,
    #[serde(default, rename = "IPAM")]
    pub ipam: Ipam,
    /// Containers attached to the network, keyed by container ID.
    #[serde(default)]
    pub containers: HashMap<String, NetworkContainer>,
}

/// IPAM configuration of a network.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ipam {
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub config: Vec<IpamConfig>,
}

/// One IPAM pool entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpamConfig {
    #[serde(default)]
    pub subnet: String,
}

/// Per-container attachment info inside a network inspect.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkContainer {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "EndpointID")]
    pub endpoint_id: String,
}

/// A container as returned by `GET /containers/{id}/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub state: ContainerState,
    #[serde(default)]
    pub config: ContainerConfig,
}

/// Runtime state subset of a container inspect.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    #[serde(default)]
    pub pid: i64,
}

/// Static configuration subset of a container inspect.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default)]
    pub hostname: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_inspect_decodes_the_read_fields() {
        let json = r#"{
            "Name": "dhcpnet",
            "Id": "9f6f8b2a41c0",
            "Driver": "ghcr.io/devplayer0/docker-net-dhcp:release-0.3",
            "Scope": "local",
            "IPAM": {
                "Driver": "null",
                "Options": null,
                "Config": [{"Subnet": "0.0.0.0/0"}]
            },
            "Options": {"bridge": "br0", "ipv6": "true"},
            "Containers": {
                "3f2a": {"Name": "web", "EndpointID": "abcdef0123456789"}
            },
            "Labels": {}
        }"#;

        let net: NetworkResource = serde_json::from_str(json).unwrap();
        assert_eq!(net.name, "dhcpnet");
        assert_eq!(net.ipam.driver, "null");
        assert_eq!(net.ipam.config[0].subnet, "0.0.0.0/0");
        assert_eq!(net.options["bridge"], "br0");
        assert_eq!(net.containers["3f2a"].endpoint_id, "abcdef0123456789");
    }

    #[test]
    fn container_inspect_decodes_pid_and_hostname() {
        let json = r#"{
            "Id": "3f2a",
            "State": {"Status": "running", "Running": true, "Pid": 4242},
            "Config": {"Hostname": "web0", "Image": "alpine"}
        }"#;

        let ctr: ContainerInspect = serde_json::from_str(json).unwrap();
        assert_eq!(ctr.state.pid, 4242);
        assert_eq!(ctr.config.hostname, "web0");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let net: NetworkResource = serde_json::from_str("{}").unwrap();
        assert!(net.options.is_empty());
        assert!(net.ipam.config.is_empty());
        assert!(net.containers.is_empty());
    }
}
