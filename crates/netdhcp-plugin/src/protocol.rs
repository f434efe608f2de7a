//! Remote network driver wire types.
//!
//! Request and response shapes of the libnetwork remote driver contract.
//! Unknown fields in requests are rejected, matching the strictness of the
//! driver's JSON handling everywhere else.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// GetCapabilities reply; constant for this driver.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CapabilitiesResponse {
    pub scope: String,
    pub connectivity_scope: String,
}

/// IPv4/IPv6 pool description sent by the daemon.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct IpamData {
    #[serde(default)]
    pub address_space: String,
    #[serde(default)]
    pub pool: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub aux_addresses: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct CreateNetworkRequest {
    #[serde(default, rename = "NetworkID")]
    pub network_id: String,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default, rename = "IPv4Data")]
    pub ipv4_data: Vec<IpamData>,
    #[serde(default, rename = "IPv6Data")]
    pub ipv6_data: Vec<IpamData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DeleteNetworkRequest {
    #[serde(default, rename = "NetworkID")]
    pub network_id: String,
}

/// Interface description, used both in CreateEndpoint requests (as the
/// daemon's hints) and in its response (as what the driver provisioned).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct EndpointInterface {
    #[serde(default)]
    pub address: String,
    #[serde(default, rename = "AddressIPv6")]
    pub address_ipv6: String,
    #[serde(default)]
    pub mac_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct CreateEndpointRequest {
    #[serde(default, rename = "NetworkID")]
    pub network_id: String,
    #[serde(default, rename = "EndpointID")]
    pub endpoint_id: String,
    #[serde(default)]
    pub interface: Option<EndpointInterface>,
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateEndpointResponse {
    pub interface: EndpointInterface,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct InfoRequest {
    #[serde(default, rename = "NetworkID")]
    pub network_id: String,
    #[serde(default, rename = "EndpointID")]
    pub endpoint_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InfoResponse {
    pub value: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DeleteEndpointRequest {
    #[serde(default, rename = "NetworkID")]
    pub network_id: String,
    #[serde(default, rename = "EndpointID")]
    pub endpoint_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct JoinRequest {
    #[serde(default, rename = "NetworkID")]
    pub network_id: String,
    #[serde(default, rename = "EndpointID")]
    pub endpoint_id: String,
    #[serde(default)]
    pub sandbox_key: String,
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
}

/// Name under which the sandbox adopts the container-side interface.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct InterfaceName {
    pub src_name: String,
    pub dst_prefix: String,
}

/// One mirrored route for the sandbox.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct StaticRoute {
    pub destination: String,
    /// 0 = via next hop, 1 = on-link.
    pub route_type: i32,
    pub next_hop: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct JoinResponse {
    pub interface_name: InterfaceName,
    pub gateway: String,
    #[serde(rename = "GatewayIPv6")]
    pub gateway_ipv6: String,
    pub static_routes: Vec<StaticRoute>,
    pub disable_gateway_service: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct LeaveRequest {
    #[serde(default, rename = "NetworkID")]
    pub network_id: String,
    #[serde(default, rename = "EndpointID")]
    pub endpoint_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_network_request_decodes_daemon_shape() {
        let req: CreateNetworkRequest = serde_json::from_value(json!({
            "NetworkID": "9f6f8b2a41c0",
            "Options": {
                "com.docker.network.enable_ipv6": false,
                "com.docker.network.generic": {"bridge": "br0"}
            },
            "IPv4Data": [
                {"AddressSpace": "null", "Pool": "0.0.0.0/0", "Gateway": "", "AuxAddresses": null}
            ],
            "IPv6Data": []
        }))
        .unwrap();

        assert_eq!(req.network_id, "9f6f8b2a41c0");
        assert_eq!(req.ipv4_data[0].address_space, "null");
        assert_eq!(req.ipv4_data[0].pool, "0.0.0.0/0");
    }

    #[test]
    fn unknown_request_fields_are_rejected() {
        let result = serde_json::from_value::<JoinRequest>(json!({
            "NetworkID": "n", "EndpointID": "e", "SandboxKey": "/k", "Options": {},
            "Surprise": true
        }));
        assert!(result.is_err());
    }

    #[test]
    fn join_response_serializes_protocol_keys() {
        let res = JoinResponse {
            interface_name: InterfaceName {
                src_name: "abcdef012345-dh".to_string(),
                dst_prefix: "br0".to_string(),
            },
            gateway: "10.0.0.1".to_string(),
            gateway_ipv6: String::new(),
            static_routes: vec![StaticRoute {
                destination: "10.1.0.0/16".to_string(),
                route_type: 0,
                next_hop: "10.0.0.2".to_string(),
            }],
            disable_gateway_service: false,
        };

        let value = serde_json::to_value(&res).unwrap();
        assert_eq!(value["InterfaceName"]["SrcName"], "abcdef012345-dh");
        assert_eq!(value["InterfaceName"]["DstPrefix"], "br0");
        assert_eq!(value["Gateway"], "10.0.0.1");
        assert_eq!(value["GatewayIPv6"], "");
        assert_eq!(value["StaticRoutes"][0]["RouteType"], 0);
        assert_eq!(value["StaticRoutes"][0]["NextHop"], "10.0.0.2");
        assert_eq!(value["DisableGatewayService"], false);
    }

    #[test]
    fn endpoint_interface_round_trips() {
        let value = json!({"Address": "10.0.0.42/24", "AddressIPv6": "", "MacAddress": "02:42:ac:11:00:02"});
        let iface: EndpointInterface = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(iface.address, "10.0.0.42/24");
        assert_eq!(serde_json::to_value(&iface).unwrap(), value);
    }
}
