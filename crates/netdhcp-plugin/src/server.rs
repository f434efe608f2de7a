//! UNIX-socket HTTP dispatcher for the driver protocol.
//!
//! One POST route per driver operation; bodies are strict JSON, errors are
//! `{"Err": msg}` problem documents. Connections are served one task each
//! and drained on shutdown before the managers are stopped.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::Request;
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::net::UnixListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tower_http::trace::TraceLayer;

use crate::driver::NetworkDriver;
use crate::error::{PluginError, Result};
use crate::protocol::{
    CapabilitiesResponse, CreateEndpointRequest, CreateEndpointResponse, CreateNetworkRequest,
    DeleteEndpointRequest, DeleteNetworkRequest, InfoRequest, InfoResponse, JoinRequest,
    JoinResponse, LeaveRequest,
};

/// Default plugin socket path.
pub const DEFAULT_SOCKET: &str = "/run/docker/plugins/net-dhcp.sock";

/// Builds the driver router.
#[must_use]
pub fn router(driver: Arc<NetworkDriver>) -> Router {
    Router::new()
        .route("/NetworkDriver.GetCapabilities", post(get_capabilities))
        .route("/NetworkDriver.CreateNetwork", post(create_network))
        .route("/NetworkDriver.DeleteNetwork", post(delete_network))
        .route("/NetworkDriver.CreateEndpoint", post(create_endpoint))
        .route("/NetworkDriver.EndpointOperInfo", post(endpoint_oper_info))
        .route("/NetworkDriver.DeleteEndpoint", post(delete_endpoint))
        .route("/NetworkDriver.Join", post(join))
        .route("/NetworkDriver.Leave", post(leave))
        .layer(TraceLayer::new_for_http())
        .with_state(driver)
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| PluginError::BadRequest(format!("failed to parse request body: {e}")))
}

async fn get_capabilities(
    State(driver): State<Arc<NetworkDriver>>,
) -> Json<CapabilitiesResponse> {
    Json(driver.capabilities())
}

async fn create_network(
    State(driver): State<Arc<NetworkDriver>>,
    body: Bytes,
) -> Result<Json<Value>> {
    let req: CreateNetworkRequest = parse_body(&body)?;
    driver.create_network(req).await?;
    Ok(Json(json!({})))
}

async fn delete_network(
    State(driver): State<Arc<NetworkDriver>>,
    body: Bytes,
) -> Result<Json<Value>> {
    let req: DeleteNetworkRequest = parse_body(&body)?;
    driver.delete_network(&req);
    Ok(Json(json!({})))
}

async fn create_endpoint(
    State(driver): State<Arc<NetworkDriver>>,
    body: Bytes,
) -> Result<Json<CreateEndpointResponse>> {
    let req: CreateEndpointRequest = parse_body(&body)?;
    Ok(Json(driver.create_endpoint(req).await?))
}

async fn endpoint_oper_info(
    State(driver): State<Arc<NetworkDriver>>,
    body: Bytes,
) -> Result<Json<InfoResponse>> {
    let req: InfoRequest = parse_body(&body)?;
    Ok(Json(driver.endpoint_oper_info(req).await?))
}

async fn delete_endpoint(
    State(driver): State<Arc<NetworkDriver>>,
    body: Bytes,
) -> Result<Json<Value>> {
    let req: DeleteEndpointRequest = parse_body(&body)?;
    driver.delete_endpoint(&req)?;
    Ok(Json(json!({})))
}

async fn join(State(driver): State<Arc<NetworkDriver>>, body: Bytes) -> Result<Json<JoinResponse>> {
    let req: JoinRequest = parse_body(&body)?;
    Ok(Json(driver.join(req).await?))
}

async fn leave(State(driver): State<Arc<NetworkDriver>>, body: Bytes) -> Result<Json<Value>> {
    let req: LeaveRequest = parse_body(&body)?;
    driver.leave(req).await?;
    Ok(Json(json!({})))
}

/// Serves the router on a UNIX listener until `shutdown` fires, then drains
/// in-flight connections.
///
/// # Errors
///
/// Returns an error if accepting on the listener fails.
pub async fn serve(
    listener: UnixListener,
    app: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let tower_service = app.clone();
                connections.spawn(async move {
                    let hyper_service =
                        hyper::service::service_fn(move |request: Request<Incoming>| {
                            tower_service.clone().call(request)
                        });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), hyper_service)
                        .await
                    {
                        let err_str = err.to_string().to_lowercase();
                        if !err_str.contains("connection reset") && !err_str.contains("broken pipe")
                        {
                            tracing::error!("error serving connection: {err}");
                        }
                    }
                });
            }
        }
    }

    // Drain in-flight requests; managers are stopped by the caller after
    // this returns.
    while connections.join_next().await.is_some() {}
    Ok(())
}
