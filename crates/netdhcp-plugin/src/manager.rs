//! Persistent per-endpoint DHCP supervision.
//!
//! After Join returns, a manager locates the endpoint's container, enters
//! its network namespace, and keeps udhcpc(6) running there so the lease
//! acquired during CreateEndpoint stays valid for the container's lifetime.

use std::fs::File;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ipnetwork::IpNetwork;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use netdhcp_docker::DockerClient;
use netdhcp_net::{Family, Netlink};
use netdhcp_udhcpc::{DhcpClient, DhcpClientOptions, DhcpError, DhcpEvent, DhcpEventType, LeaseInfo};

use crate::error::{PluginError, Result};
use crate::options::NetworkOptions;
use crate::poll::{await_result, POLL_INTERVAL};
use crate::protocol::JoinRequest;
use crate::state::JoinHint;
use crate::util::{short_id, veth_pair_names};

/// Docker publishes the endpoint under this placeholder prefix until the
/// container is actually up.
const ENDPOINT_PLACEHOLDER_PREFIX: &str = "ep-";

/// How long Stop gives each client to exit after SIGTERM.
const FINISH_TIMEOUT: Duration = Duration::from_secs(5);

type StopResult = std::result::Result<(), DhcpError>;

#[derive(Clone)]
struct LogCtx {
    network: String,
    endpoint: String,
    sandbox: String,
}

/// A running persistent DHCP supervisor for one endpoint.
///
/// Owns the sandbox namespace handle, the namespaced netlink handle and one
/// event loop per DHCP client; all of them are released by [`Self::stop`].
pub struct DhcpManager {
    cancel: CancellationToken,
    result_v4: oneshot::Receiver<StopResult>,
    result_v6: Option<oneshot::Receiver<StopResult>>,
    ns_file: File,
    netlink: Arc<Mutex<Netlink>>,
    log: LogCtx,
}

impl DhcpManager {
    /// Brings the supervisor up inside the endpoint's sandbox.
    ///
    /// The caller bounds this with the plugin's await timeout; every wait in
    /// here polls until that deadline cancels the future.
    ///
    /// # Errors
    ///
    /// Returns an error if the sandbox cannot be resolved or a client
    /// cannot be spawned.
    pub async fn start(
        docker: &DockerClient,
        req: &JoinRequest,
        opts: &NetworkOptions,
        hint: &JoinHint,
    ) -> Result<Self> {
        let log = LogCtx {
            network: short_id(&req.network_id).to_string(),
            endpoint: short_id(&req.endpoint_id).to_string(),
            sandbox: req.sandbox_key.clone(),
        };

        // Wait for the endpoint to be claimed by a real container.
        let ctr_id = await_result(POLL_INTERVAL, || async move {
            let network = docker.network_inspect(&req.network_id).await.map_err(|e| {
                PluginError::Docker("failed to get Docker network info".to_string(), e)
            })?;
            let found = network
                .containers
                .into_iter()
                .find(|(_, c)| c.endpoint_id == req.endpoint_id)
                .map(|(id, _)| id);
            Ok(found.filter(|id| !id.starts_with(ENDPOINT_PLACEHOLDER_PREFIX)))
        })
        .await?;

        let container = {
            let ctr_id = ctr_id.as_str();
            await_result(POLL_INTERVAL, || async move {
                Ok::<_, PluginError>(docker.container_inspect(ctr_id).await.ok())
            })
            .await?
        };

        // The sandbox key is unreliable on some platforms; the procfs path
        // of the container's PID is not.
        let ns_path = PathBuf::from(format!("/proc/{}/ns/net", container.state.pid));
        let hostname = container.config.hostname;

        let ns_file = {
            let ns_path = ns_path.as_path();
            await_result(POLL_INTERVAL, || async move {
                Ok::<_, PluginError>(File::open(ns_path).ok())
            })
            .await?
        };

        let ns_netlink = Netlink::in_namespace(&ns_path).map_err(|e| {
            PluginError::Net(
                "failed to open netlink handle in sandbox namespace".to_string(),
                e,
            )
        })?;
        let ns_netlink = Arc::new(Mutex::new(ns_netlink));

        let (host_name, original_ctr_name) = veth_pair_names(&req.endpoint_id);
        let mut host_netlink = Netlink::new()
            .map_err(|e| PluginError::Net("failed to open netlink handle".to_string(), e))?;
        let host_link = host_netlink
            .link_by_name(&host_name)
            .map_err(|e| PluginError::Net("failed to find host side of veth pair".to_string(), e))?;
        if host_link.kind.as_deref() != Some("veth") {
            return Err(PluginError::NotVEth);
        }
        let peer_index = host_link.peer_index.ok_or_else(|| {
            PluginError::Internal("failed to get container side of veth's index".to_string())
        })?;

        // The rename by Docker is the signal that the interface has crossed
        // into the sandbox.
        let ctr_link = await_result(POLL_INTERVAL, || {
            let ns_netlink = Arc::clone(&ns_netlink);
            let original = original_ctr_name.clone();
            async move {
                let link = ns_netlink.lock().link_by_index(peer_index);
                Ok::<_, PluginError>(match link {
                    Ok(link) if link.name != original => Some(link),
                    _ => None,
                })
            }
        })
        .await?;

        // No awaits between the client spawns and the return below, so a
        // cancelled start cannot leak a running client.
        let cancel = CancellationToken::new();
        let hostname = (!hostname.is_empty()).then_some(hostname);

        tracing::info!(
            network = %log.network,
            endpoint = %log.endpoint,
            sandbox = %log.sandbox,
            is_ipv6 = false,
            "starting persistent DHCP client"
        );
        let v4_client = DhcpClient::spawn(
            &ctr_link.name,
            DhcpClientOptions {
                hostname: hostname.clone(),
                v6: false,
                once: false,
                namespace: Some(ns_path.clone()),
                handler_script: None,
            },
        )
        .map_err(|e| PluginError::Dhcp("failed to create DHCP client".to_string(), e))?;
        let result_v4 = spawn_event_loop(
            v4_client,
            false,
            cancel.clone(),
            Arc::clone(&ns_netlink),
            ctr_link.index,
            hint.ipv4,
            log.clone(),
        );

        let result_v6 = if opts.ipv6 {
            tracing::info!(
                network = %log.network,
                endpoint = %log.endpoint,
                sandbox = %log.sandbox,
                is_ipv6 = true,
                "starting persistent DHCP client"
            );
            match DhcpClient::spawn(
                &ctr_link.name,
                DhcpClientOptions {
                    hostname,
                    v6: true,
                    once: false,
                    namespace: Some(ns_path),
                    handler_script: None,
                },
            ) {
                Ok(client) => Some(spawn_event_loop(
                    client,
                    true,
                    cancel.clone(),
                    Arc::clone(&ns_netlink),
                    ctr_link.index,
                    hint.ipv6,
                    log.clone(),
                )),
                Err(e) => {
                    // Shut the v4 loop down again before bailing out.
                    cancel.cancel();
                    return Err(PluginError::Dhcp(
                        "failed to create DHCPv6 client".to_string(),
                        e,
                    ));
                }
            }
        } else {
            None
        };

        Ok(Self {
            cancel,
            result_v4,
            result_v6,
            ns_file,
            netlink: ns_netlink,
            log,
        })
    }

    /// Stops the clients, joins their event loops, and releases the sandbox
    /// handles.
    ///
    /// # Errors
    ///
    /// Surfaces the first client shutdown failure.
    pub async fn stop(self) -> Result<()> {
        let Self {
            cancel,
            result_v4,
            result_v6,
            ns_file,
            netlink,
            log,
        } = self;
        cancel.cancel();

        let mut result = join_client(result_v4).await;
        if let Some(rx) = result_v6 {
            let v6_result = join_client(rx).await;
            if result.is_ok() {
                result = v6_result;
            }
        }

        // Both loops have joined their clients; release the sandbox handles.
        drop(netlink);
        drop(ns_file);
        tracing::debug!(endpoint = %log.endpoint, "persistent DHCP manager stopped");
        result
    }
}

async fn join_client(rx: oneshot::Receiver<StopResult>) -> Result<()> {
    match rx.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(PluginError::Dhcp(
            "failed to shut down DHCP client".to_string(),
            e,
        )),
        Err(_) => Err(PluginError::Internal(
            "DHCP client loop terminated unexpectedly".to_string(),
        )),
    }
}

fn spawn_event_loop(
    mut client: DhcpClient,
    v6: bool,
    cancel: CancellationToken,
    netlink: Arc<Mutex<Netlink>>,
    ctr_index: u32,
    last_ip: Option<IpNetwork>,
    log: LogCtx,
) -> oneshot::Receiver<StopResult> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = client.next_event() => match event {
                    Some(event) => handle_event(&event, v6, &netlink, ctr_index, last_ip, &log),
                    // stdout closed; nothing left to do but await the stop
                    // signal and reap the child.
                    None => cancel.cancelled().await,
                },
            }
        }

        tracing::info!(
            network = %log.network,
            endpoint = %log.endpoint,
            sandbox = %log.sandbox,
            is_ipv6 = v6,
            "shutting down persistent DHCP client"
        );
        let _ = tx.send(client.finish(FINISH_TIMEOUT).await);
    });
    rx
}

fn handle_event(
    event: &DhcpEvent,
    v6: bool,
    netlink: &Mutex<Netlink>,
    ctr_index: u32,
    last_ip: Option<IpNetwork>,
    log: &LogCtx,
) {
    match event.event_type {
        DhcpEventType::Renew => {
            tracing::debug!(
                network = %log.network,
                endpoint = %log.endpoint,
                is_ipv6 = v6,
                "udhcpc renew"
            );
            if let Err(e) = renew(v6, &event.data, netlink, ctr_index, last_ip, log) {
                tracing::error!(
                    network = %log.network,
                    endpoint = %log.endpoint,
                    is_ipv6 = v6,
                    gateway = %event.data.gateway,
                    new_ip = %event.data.ip,
                    "failed to execute IP renewal: {e}"
                );
            }
        }
        DhcpEventType::Leasefail => tracing::warn!(
            network = %log.network,
            endpoint = %log.endpoint,
            is_ipv6 = v6,
            "udhcpc failed to get a lease"
        ),
        DhcpEventType::Nak => tracing::warn!(
            network = %log.network,
            endpoint = %log.endpoint,
            is_ipv6 = v6,
            "udhcpc client received NAK"
        ),
        // Bound was handled by the one-shot lease before this client
        // existed. Deconfig is ignored: removing the address would also
        // drop the routes installed at Join.
        DhcpEventType::Bound | DhcpEventType::Deconfig => {}
    }
}

fn renew(
    v6: bool,
    info: &LeaseInfo,
    netlink: &Mutex<Netlink>,
    ctr_index: u32,
    last_ip: Option<IpNetwork>,
    log: &LogCtx,
) -> Result<()> {
    let ip: IpNetwork = info
        .ip
        .parse()
        .map_err(|e| PluginError::Internal(format!("failed to parse IP address: {e}")))?;

    if last_ip != Some(ip) {
        // Re-addressing mid-flight would race Docker's view of the
        // endpoint; keep the old address and complain.
        tracing::warn!(
            network = %log.network,
            endpoint = %log.endpoint,
            is_ipv6 = v6,
            old_ip = ?last_ip,
            new_ip = %ip,
            "udhcpc renew with changed IP"
        );
    }

    if !v6 && !info.gateway.is_empty() {
        let gateway: IpAddr = info
            .gateway
            .parse()
            .map_err(|e| PluginError::Internal(format!("failed to parse gateway address: {e}")))?;

        let mut handle = netlink.lock();
        let defaults = handle
            .default_routes(Family::V4, ctr_index)
            .map_err(|e| PluginError::Net("failed to list routes".to_string(), e))?;

        match defaults.first() {
            None => {
                tracing::info!(
                    network = %log.network,
                    endpoint = %log.endpoint,
                    gateway = %gateway,
                    "udhcpc renew adding default route"
                );
                handle
                    .add_default_route(ctr_index, gateway)
                    .map_err(|e| PluginError::Net("failed to add default route".to_string(), e))?;
            }
            Some(current) if current.gateway != Some(gateway) => {
                tracing::info!(
                    network = %log.network,
                    endpoint = %log.endpoint,
                    old_gateway = ?current.gateway,
                    new_gateway = %gateway,
                    "udhcpc renew replacing default route"
                );
                let mut replacement = current.clone();
                replacement.gateway = Some(gateway);
                handle.replace_route(&replacement).map_err(|e| {
                    PluginError::Net("failed to replace default route".to_string(), e)
                })?;
            }
            Some(_) => {}
        }
    }

    Ok(())
}
