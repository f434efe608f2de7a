//! Mirroring of host bridge routes into Join responses.
//!
//! The sandbox only learns addressing from DHCP; any extra reachability the
//! host has via the bridge (other subnets, a default gateway) is copied as
//! static routes so containers see the same topology.

use netdhcp_net::{RouteEntry, RTPROT_KERNEL};

use crate::options::NetworkOptions;
use crate::protocol::{JoinRequest, JoinResponse, StaticRoute};
use crate::state::JoinHint;
use crate::util::short_id;

/// On-link route (no next hop).
const ROUTE_TYPE_CONNECTED: i32 = 1;
/// Route via a gateway.
const ROUTE_TYPE_NEXT_HOP: i32 = 0;

/// Applies one family's bridge routes to the Join response.
///
/// The first default route becomes the response gateway for the family.
/// Kernel-protocol routes and routes covering the leased address are left
/// out; the kernel installs those itself once the address is applied.
/// Ordering follows the kernel's listing order and nothing is deduplicated.
pub fn mirror_routes(
    opts: &NetworkOptions,
    v6: bool,
    routes: &[RouteEntry],
    hint: &JoinHint,
    req: &JoinRequest,
    res: &mut JoinResponse,
) {
    let leased = if v6 { hint.ipv6 } else { hint.ipv4 };

    for route in routes {
        let Some(dst) = route.dst else {
            // Default route; the first one per family wins.
            let gateway = route.gateway.map(|g| g.to_string()).unwrap_or_default();
            if v6 {
                if res.gateway_ipv6.is_empty() {
                    res.gateway_ipv6 = gateway;
                    tracing::info!(
                        network = %short_id(&req.network_id),
                        endpoint = %short_id(&req.endpoint_id),
                        sandbox = %req.sandbox_key,
                        gateway = %res.gateway_ipv6,
                        "[Join] Setting IPv6 gateway retrieved from bridge interface on host routing table"
                    );
                }
            } else if res.gateway.is_empty() {
                res.gateway = gateway;
                tracing::info!(
                    network = %short_id(&req.network_id),
                    endpoint = %short_id(&req.endpoint_id),
                    sandbox = %req.sandbox_key,
                    gateway = %res.gateway,
                    "[Join] Setting IPv4 gateway retrieved from bridge interface on host routing table"
                );
            }
            continue;
        };

        if opts.skip_routes {
            continue;
        }

        if route.protocol == RTPROT_KERNEL || leased.is_some_and(|ip| dst.contains(ip.ip())) {
            // The kernel will install the on-link route for the leased
            // address by itself.
            continue;
        }

        let mut static_route = StaticRoute {
            destination: dst.to_string(),
            route_type: ROUTE_TYPE_CONNECTED,
            next_hop: String::new(),
        };
        if let Some(gateway) = route.gateway {
            static_route.route_type = ROUTE_TYPE_NEXT_HOP;
            static_route.next_hop = gateway.to_string();
            tracing::info!(
                network = %short_id(&req.network_id),
                endpoint = %short_id(&req.endpoint_id),
                sandbox = %req.sandbox_key,
                route = %static_route.destination,
                gateway = %static_route.next_hop,
                "[Join] Adding route (via gateway) retrieved from bridge interface on host routing table"
            );
        } else {
            tracing::info!(
                network = %short_id(&req.network_id),
                endpoint = %short_id(&req.endpoint_id),
                sandbox = %req.sandbox_key,
                route = %static_route.destination,
                "[Join] Adding on-link route retrieved from bridge interface on host routing table"
            );
        }
        res.static_routes.push(static_route);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdhcp_net::{RTPROT_BOOT, RT_SCOPE_UNIVERSE, RT_TABLE_MAIN};
    use std::net::IpAddr;

    fn route(dst: Option<&str>, gateway: Option<&str>, protocol: u8) -> RouteEntry {
        RouteEntry {
            dst: dst.map(|d| d.parse().unwrap()),
            gateway: gateway.map(|g| g.parse::<IpAddr>().unwrap()),
            oif: Some(4),
            protocol,
            scope: RT_SCOPE_UNIVERSE,
            table: RT_TABLE_MAIN,
        }
    }

    fn hint() -> JoinHint {
        JoinHint {
            ipv4: Some("10.0.0.42/24".parse().unwrap()),
            ipv6: Some("2001:db8::42/64".parse().unwrap()),
            gateway: String::new(),
        }
    }

    fn apply(opts: &NetworkOptions, v6: bool, routes: &[RouteEntry]) -> JoinResponse {
        let mut res = JoinResponse::default();
        mirror_routes(opts, v6, routes, &hint(), &JoinRequest::default(), &mut res);
        res
    }

    #[test]
    fn first_default_route_becomes_the_gateway() {
        let routes = vec![
            route(None, Some("10.0.0.1"), RTPROT_BOOT),
            route(None, Some("10.0.0.254"), RTPROT_BOOT),
        ];
        let res = apply(&NetworkOptions::default(), false, &routes);
        assert_eq!(res.gateway, "10.0.0.1");
        assert!(res.static_routes.is_empty());
    }

    #[test]
    fn kernel_and_leased_subnet_routes_are_skipped() {
        let routes = vec![
            // On-link route the kernel created for the bridge address.
            route(Some("10.0.0.0/24"), None, RTPROT_KERNEL),
            // Covers the leased address; the sandbox kernel installs it.
            route(Some("10.0.0.0/16"), Some("10.0.0.9"), RTPROT_BOOT),
            // Genuinely extra reachability.
            route(Some("192.168.7.0/24"), Some("10.0.0.2"), RTPROT_BOOT),
        ];
        let res = apply(&NetworkOptions::default(), false, &routes);
        assert_eq!(res.static_routes.len(), 1);
        assert_eq!(res.static_routes[0].destination, "192.168.7.0/24");
        assert_eq!(res.static_routes[0].route_type, 0);
        assert_eq!(res.static_routes[0].next_hop, "10.0.0.2");
    }

    #[test]
    fn gatewayless_routes_are_emitted_on_link() {
        let routes = vec![route(Some("172.16.0.0/24"), None, RTPROT_BOOT)];
        let res = apply(&NetworkOptions::default(), false, &routes);
        assert_eq!(res.static_routes.len(), 1);
        assert_eq!(res.static_routes[0].route_type, 1);
        assert_eq!(res.static_routes[0].next_hop, "");
    }

    #[test]
    fn skip_routes_still_extracts_the_gateway() {
        let opts = NetworkOptions {
            skip_routes: true,
            ..Default::default()
        };
        let routes = vec![
            route(None, Some("10.0.0.1"), RTPROT_BOOT),
            route(Some("192.168.7.0/24"), Some("10.0.0.2"), RTPROT_BOOT),
        ];
        let res = apply(&opts, false, &routes);
        assert_eq!(res.gateway, "10.0.0.1");
        assert!(res.static_routes.is_empty());
    }

    #[test]
    fn v6_routes_only_touch_the_v6_gateway() {
        let routes = vec![
            route(None, Some("fe80::1"), RTPROT_BOOT),
            route(Some("2001:db8:1::/48"), Some("2001:db8::1"), RTPROT_BOOT),
        ];
        let res = apply(&NetworkOptions::default(), true, &routes);
        assert_eq!(res.gateway, "");
        assert_eq!(res.gateway_ipv6, "fe80::1");
        assert_eq!(res.static_routes.len(), 1);
        assert_eq!(res.static_routes[0].destination, "2001:db8:1::/48");
    }

    #[test]
    fn ordering_is_preserved_without_dedup() {
        let routes = vec![
            route(Some("192.168.7.0/24"), Some("10.0.0.2"), RTPROT_BOOT),
            route(Some("172.16.0.0/24"), None, RTPROT_BOOT),
            route(Some("192.168.7.0/24"), Some("10.0.0.2"), RTPROT_BOOT),
        ];
        let res = apply(&NetworkOptions::default(), false, &routes);
        let dests: Vec<_> = res
            .static_routes
            .iter()
            .map(|r| r.destination.as_str())
            .collect();
        assert_eq!(dests, ["192.168.7.0/24", "172.16.0.0/24", "192.168.7.0/24"]);
    }
}
