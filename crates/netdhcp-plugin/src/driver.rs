//! The network driver: the seven remote-driver operations.
//!
//! Implements the endpoint lifecycle against the kernel (veth + bridge),
//! the Docker daemon (network/container lookups) and udhcpc (one-shot
//! leases), and hands running endpoints over to persistent DHCP managers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ipnetwork::IpNetwork;

use netdhcp_docker::DockerClient;
use netdhcp_net::{format_mac, parse_mac, Family, Netlink};
use netdhcp_udhcpc::{lease_once, DhcpClientOptions};

use crate::error::{PluginError, Result};
use crate::manager::DhcpManager;
use crate::options::{decode_options, decode_options_map, generic_options, NetworkOptions};
use crate::protocol::{
    CapabilitiesResponse, CreateEndpointRequest, CreateEndpointResponse, CreateNetworkRequest,
    DeleteEndpointRequest, DeleteNetworkRequest, InfoRequest, InfoResponse, InterfaceName,
    JoinRequest, JoinResponse, LeaveRequest,
};
use crate::routes::mirror_routes;
use crate::state::PluginState;
use crate::util::{is_dhcp_plugin, short_id, veth_pair_names};

/// The published driver name.
pub const DRIVER_NAME: &str = "net-dhcp";

/// The network driver behind the plugin socket.
pub struct NetworkDriver {
    docker: Arc<DockerClient>,
    state: Arc<PluginState>,
    await_timeout: Duration,
}

impl NetworkDriver {
    /// Creates the driver.
    #[must_use]
    pub fn new(docker: DockerClient, await_timeout: Duration) -> Self {
        Self {
            docker: Arc::new(docker),
            state: Arc::new(PluginState::default()),
            await_timeout,
        }
    }

    /// Shared plugin state, for shutdown handling.
    #[must_use]
    pub fn state(&self) -> Arc<PluginState> {
        Arc::clone(&self.state)
    }

    /// GetCapabilities: this driver is local-scoped.
    #[must_use]
    pub fn capabilities(&self) -> CapabilitiesResponse {
        CapabilitiesResponse {
            scope: "local".to_string(),
            connectivity_scope: "global".to_string(),
        }
    }

    /// CreateNetwork: pure validation, nothing is stored.
    ///
    /// # Errors
    ///
    /// Rejects unknown options, a missing bridge, non-null IPAM pools, a
    /// non-bridge interface, and (unless disabled) bridge conflicts.
    pub async fn create_network(&self, req: CreateNetworkRequest) -> Result<()> {
        tracing::debug!(options = ?req.options, "CreateNetwork options");

        let opts = decode_options(&generic_options(&req.options)?)?;
        if opts.bridge.is_empty() {
            return Err(PluginError::BridgeRequired);
        }
        for data in &req.ipv4_data {
            if data.address_space != "null" || data.pool != "0.0.0.0/0" {
                return Err(PluginError::Ipam);
            }
        }

        let mut netlink = Netlink::new()
            .map_err(|e| PluginError::Net("failed to open netlink handle".to_string(), e))?;
        let bridge = netlink.link_by_name(&opts.bridge).map_err(|e| {
            PluginError::Net(format!("failed to lookup interface {}", opts.bridge), e)
        })?;
        if bridge.kind.as_deref() != Some("bridge") {
            return Err(PluginError::NotBridge);
        }

        if !opts.ignore_conflicts {
            self.check_conflicts(&mut netlink, &opts, bridge.index)
                .await?;
        }

        tracing::info!(
            network = %req.network_id,
            bridge = %opts.bridge,
            ipv6 = opts.ipv6,
            "network created"
        );
        Ok(())
    }

    /// Makes sure the bridge's addresses are not used by another Docker
    /// network and the bridge is not claimed by another driver network.
    async fn check_conflicts(
        &self,
        netlink: &mut Netlink,
        opts: &NetworkOptions,
        bridge_index: u32,
    ) -> Result<()> {
        let mut bridge_addrs = netlink.addresses(Family::V4, bridge_index).map_err(|e| {
            PluginError::Net(
                format!("failed to retrieve IPv4 addresses for {}", opts.bridge),
                e,
            )
        })?;
        bridge_addrs.extend(netlink.addresses(Family::V6, bridge_index).map_err(|e| {
            PluginError::Net(
                format!("failed to retrieve IPv6 addresses for {}", opts.bridge),
                e,
            )
        })?);

        let networks = self.docker.network_list().await.map_err(|e| {
            PluginError::Docker(
                "failed to retrieve list of networks from Docker".to_string(),
                e,
            )
        })?;

        for network in networks {
            if is_dhcp_plugin(&network.driver) {
                match decode_options_map(&network.options) {
                    Ok(other) if other.bridge == opts.bridge => {
                        return Err(PluginError::BridgeUsed)
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(
                        network = %network.name,
                        "failed to parse other DHCP network's options: {e}"
                    ),
                }
            }
            if network.ipam.driver == "null" {
                // Null-IPAM networks carry 0.0.0.0/0, which would overlap
                // everything.
                continue;
            }

            for config in &network.ipam.config {
                let subnet: IpNetwork = config.subnet.parse().map_err(|e| {
                    PluginError::Internal(format!(
                        "failed to parse subnet {} on Docker network {}: {e}",
                        config.subnet, network.id
                    ))
                })?;
                if subnet.prefix() == 0 {
                    // Catch-all masks would always overlap.
                    continue;
                }
                if bridge_addrs.iter().any(|addr| subnets_overlap(*addr, subnet)) {
                    return Err(PluginError::BridgeUsed);
                }
            }
        }
        Ok(())
    }

    /// DeleteNetwork: the bridge belongs to the user, nothing to undo.
    pub fn delete_network(&self, req: &DeleteNetworkRequest) {
        tracing::info!(network = %req.network_id, "network deleted");
    }

    /// CreateEndpoint: builds the veth pair and leases the initial
    /// address(es) while the container side is still in the host namespace.
    ///
    /// # Errors
    ///
    /// Rejects requested static addresses and invalid MACs; any failure
    /// after the veth exists deletes it again.
    pub async fn create_endpoint(
        &self,
        req: CreateEndpointRequest,
    ) -> Result<CreateEndpointResponse> {
        tracing::debug!(options = ?req.options, "CreateEndpoint options");

        let requested = req.interface.clone().unwrap_or_default();
        if !requested.address.is_empty() || !requested.address_ipv6.is_empty() {
            // DHCP is the only addressing source this driver supports.
            return Err(PluginError::Ipam);
        }

        let opts = self.net_options(&req.network_id).await?;

        let mut netlink = Netlink::new()
            .map_err(|e| PluginError::Net("failed to open netlink handle".to_string(), e))?;
        let bridge = netlink
            .link_by_name(&opts.bridge)
            .map_err(|e| PluginError::Net("failed to get bridge interface".to_string(), e))?;

        let (host_name, ctr_name) = veth_pair_names(&req.endpoint_id);
        let requested_mac = if requested.mac_address.is_empty() {
            None
        } else {
            Some(parse_mac(&requested.mac_address).ok_or(PluginError::MacAddress)?)
        };

        let host_index = netlink
            .create_veth(&host_name, &ctr_name, requested_mac)
            .map_err(|e| PluginError::Net("failed to create veth pair".to_string(), e))?;

        let mut response = CreateEndpointResponse::default();
        if let Err(e) = self
            .provision_endpoint(
                &mut netlink,
                &opts,
                &req,
                bridge.index,
                host_index,
                &ctr_name,
                requested_mac.is_none(),
                &mut response,
            )
            .await
        {
            // Clean up the veth pair if any of this failed.
            if let Err(del_err) = netlink.del_link(host_index) {
                tracing::error!(
                    endpoint = %short_id(&req.endpoint_id),
                    "failed to delete veth pair after endpoint failure: {del_err}"
                );
            }
            self.state.discard_hint(&req.endpoint_id);
            return Err(e);
        }

        tracing::info!(
            network = %short_id(&req.network_id),
            endpoint = %short_id(&req.endpoint_id),
            mac_address = %response.interface.mac_address,
            ip = %response.interface.address,
            ipv6 = %response.interface.address_ipv6,
            "endpoint created"
        );
        Ok(response)
    }

    #[allow(clippy::too_many_arguments)]
    async fn provision_endpoint(
        &self,
        netlink: &mut Netlink,
        opts: &NetworkOptions,
        req: &CreateEndpointRequest,
        bridge_index: u32,
        host_index: u32,
        ctr_name: &str,
        echo_mac: bool,
        response: &mut CreateEndpointResponse,
    ) -> Result<()> {
        netlink.set_up(host_index).map_err(|e| {
            PluginError::Net(
                "failed to set host side link of veth pair up".to_string(),
                e,
            )
        })?;

        let ctr_link = netlink.link_by_name(ctr_name).map_err(|e| {
            PluginError::Net("failed to find container side of veth pair".to_string(), e)
        })?;
        netlink.set_up(ctr_link.index).map_err(|e| {
            PluginError::Net(
                "failed to set container side link of veth pair up".to_string(),
                e,
            )
        })?;

        if echo_mac {
            // The kernel often resets a randomly assigned MAC on actions
            // like set-master; pin it to the random value it chose.
            let mac = ctr_link.hwaddr.ok_or_else(|| {
                PluginError::Internal("failed to read container side MAC address".to_string())
            })?;
            netlink.set_hwaddr(ctr_link.index, mac).map_err(|e| {
                PluginError::Net(
                    "failed to set container side of veth pair's MAC address".to_string(),
                    e,
                )
            })?;
            response.interface.mac_address = format_mac(&mac);
        }

        netlink.set_master(host_index, bridge_index).map_err(|e| {
            PluginError::Net(
                "failed to attach host side link of veth pair to bridge".to_string(),
                e,
            )
        })?;

        let info = lease_once(ctr_name, DhcpClientOptions::default(), opts.lease_timeout)
            .await
            .map_err(|e| {
                PluginError::Dhcp("failed to get initial IP address via DHCP".to_string(), e)
            })?;
        let ip: IpNetwork = info.ip.parse().map_err(|e| {
            PluginError::Internal(format!("failed to parse initial IP address: {e}"))
        })?;
        self.state.update_hint(&req.endpoint_id, |hint| {
            hint.ipv4 = Some(ip);
            hint.gateway = info.gateway.clone();
        });
        response.interface.address = info.ip;

        if opts.ipv6 {
            let info = lease_once(
                ctr_name,
                DhcpClientOptions {
                    v6: true,
                    ..Default::default()
                },
                opts.lease_timeout,
            )
            .await
            .map_err(|e| {
                PluginError::Dhcp(
                    "failed to get initial IPv6 address via DHCPv6".to_string(),
                    e,
                )
            })?;
            let ip: IpNetwork = info.ip.parse().map_err(|e| {
                PluginError::Internal(format!("failed to parse initial IPv6 address: {e}"))
            })?;
            // No gateways in DHCPv6.
            self.state
                .update_hint(&req.endpoint_id, |hint| hint.ipv6 = Some(ip));
            response.interface.address_ipv6 = info.ip;
        }

        Ok(())
    }

    /// EndpointOperInfo: a few facts about the host side of the endpoint.
    ///
    /// # Errors
    ///
    /// Fails when the network or the host veth cannot be resolved.
    pub async fn endpoint_oper_info(&self, req: InfoRequest) -> Result<InfoResponse> {
        let opts = self.net_options(&req.network_id).await?;

        let (host_name, _) = veth_pair_names(&req.endpoint_id);
        let mut netlink = Netlink::new()
            .map_err(|e| PluginError::Net("failed to open netlink handle".to_string(), e))?;
        let host_link = netlink.link_by_name(&host_name).map_err(|e| {
            PluginError::Net("failed to find host side of veth pair".to_string(), e)
        })?;

        let mut value = HashMap::new();
        value.insert("bridge".to_string(), opts.bridge);
        value.insert("veth_host".to_string(), host_name);
        value.insert(
            "veth_host_mac".to_string(),
            host_link.hwaddr.map(|m| format_mac(&m)).unwrap_or_default(),
        );
        Ok(InfoResponse { value })
    }

    /// DeleteEndpoint: removes the veth pair by its deterministic name.
    ///
    /// # Errors
    ///
    /// Fails when the host veth cannot be found or deleted.
    pub fn delete_endpoint(&self, req: &DeleteEndpointRequest) -> Result<()> {
        let (host_name, _) = veth_pair_names(&req.endpoint_id);
        let mut netlink = Netlink::new()
            .map_err(|e| PluginError::Net("failed to open netlink handle".to_string(), e))?;
        let link = netlink.link_by_name(&host_name).map_err(|e| {
            PluginError::Net(format!("failed to lookup host veth interface {host_name}"), e)
        })?;
        netlink
            .del_link(link.index)
            .map_err(|e| PluginError::Net("failed to delete veth pair".to_string(), e))?;

        tracing::info!(
            network = %short_id(&req.network_id),
            endpoint = %short_id(&req.endpoint_id),
            "endpoint deleted"
        );
        Ok(())
    }

    /// Join: hands the interface name, gateway and mirrored routes to
    /// Docker, then starts the persistent manager in the background.
    ///
    /// # Errors
    ///
    /// Fails with NoHint when CreateEndpoint did not run for this endpoint.
    pub async fn join(&self, req: JoinRequest) -> Result<JoinResponse> {
        tracing::debug!(options = ?req.options, "Join options");

        let opts = self.net_options(&req.network_id).await?;
        let (_, ctr_name) = veth_pair_names(&req.endpoint_id);

        let mut res = JoinResponse {
            interface_name: InterfaceName {
                src_name: ctr_name,
                dst_prefix: opts.bridge.clone(),
            },
            ..Default::default()
        };

        let hint = self
            .state
            .take_hint(&req.endpoint_id)
            .ok_or(PluginError::NoHint)?;
        if !hint.gateway.is_empty() {
            tracing::info!(
                network = %short_id(&req.network_id),
                endpoint = %short_id(&req.endpoint_id),
                sandbox = %req.sandbox_key,
                gateway = %hint.gateway,
                "[Join] Setting IPv4 gateway retrieved from initial DHCP in CreateEndpoint"
            );
            res.gateway = hint.gateway.clone();
        }

        let mut netlink = Netlink::new()
            .map_err(|e| PluginError::Net("failed to open netlink handle".to_string(), e))?;
        let bridge = netlink
            .link_by_name(&opts.bridge)
            .map_err(|e| PluginError::Net("failed to get bridge interface".to_string(), e))?;

        let v4_routes = netlink
            .routes(Family::V4, bridge.index)
            .map_err(|e| PluginError::Net("failed to list routes".to_string(), e))?;
        mirror_routes(&opts, false, &v4_routes, &hint, &req, &mut res);
        if opts.ipv6 {
            let v6_routes = netlink
                .routes(Family::V6, bridge.index)
                .map_err(|e| PluginError::Net("failed to list routes".to_string(), e))?;
            mirror_routes(&opts, true, &v6_routes, &hint, &req, &mut res);
        }

        // Fire and forget: Join has to return before Docker moves the
        // interface, so manager startup failures can only be logged.
        let docker = Arc::clone(&self.docker);
        let state = Arc::clone(&self.state);
        let await_timeout = self.await_timeout;
        let spawn_req = req.clone();
        let spawn_opts = opts;
        let spawn_hint = hint;
        tokio::spawn(async move {
            match tokio::time::timeout(
                await_timeout,
                DhcpManager::start(&docker, &spawn_req, &spawn_opts, &spawn_hint),
            )
            .await
            {
                Ok(Ok(manager)) => state.register_manager(spawn_req.endpoint_id.clone(), manager),
                Ok(Err(e)) => tracing::error!(
                    network = %short_id(&spawn_req.network_id),
                    endpoint = %short_id(&spawn_req.endpoint_id),
                    sandbox = %spawn_req.sandbox_key,
                    "failed to start persistent DHCP client: {e}"
                ),
                Err(_) => tracing::error!(
                    network = %short_id(&spawn_req.network_id),
                    endpoint = %short_id(&spawn_req.endpoint_id),
                    sandbox = %spawn_req.sandbox_key,
                    "timed out starting persistent DHCP client"
                ),
            }
        });

        tracing::info!(
            network = %short_id(&req.network_id),
            endpoint = %short_id(&req.endpoint_id),
            sandbox = %req.sandbox_key,
            "joined sandbox to endpoint"
        );
        Ok(res)
    }

    /// Leave: stops and removes the endpoint's persistent manager.
    ///
    /// # Errors
    ///
    /// Fails with NoSandbox when no manager is registered, or surfaces the
    /// manager's shutdown error.
    pub async fn leave(&self, req: LeaveRequest) -> Result<()> {
        let manager = self
            .state
            .remove_manager(&req.endpoint_id)
            .ok_or(PluginError::NoSandbox)?;
        manager.stop().await?;

        tracing::info!(
            network = %short_id(&req.network_id),
            endpoint = %short_id(&req.endpoint_id),
            "sandbox left endpoint"
        );
        Ok(())
    }

    /// Re-reads a network's stored options through the inspect API.
    async fn net_options(&self, network_id: &str) -> Result<NetworkOptions> {
        let network = self.docker.network_inspect(network_id).await.map_err(|e| {
            PluginError::Docker("failed to get network info from Docker".to_string(), e)
        })?;
        decode_options_map(&network.options)
    }
}

/// Bidirectional containment check between a bridge address and a Docker
/// subnet.
fn subnets_overlap(bridge_addr: IpNetwork, docker_subnet: IpNetwork) -> bool {
    bridge_addr.contains(docker_subnet.ip()) || docker_subnet.contains(bridge_addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNetwork {
        s.parse().unwrap()
    }

    #[test]
    fn overlap_is_bidirectional() {
        // Bridge address inside the Docker subnet.
        assert!(subnets_overlap(net("10.0.0.1/24"), net("10.0.0.0/16")));
        // Docker subnet inside the bridge address's network.
        assert!(subnets_overlap(net("10.0.0.1/16"), net("10.0.5.0/24")));
        // Disjoint.
        assert!(!subnets_overlap(net("10.0.0.1/24"), net("192.168.0.0/24")));
        // Mixed families never overlap.
        assert!(!subnets_overlap(net("10.0.0.1/24"), net("2001:db8::/64")));
    }
}
