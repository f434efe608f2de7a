//! Integration tests for the driver protocol handlers.
//!
//! These drive the axum router directly and point the driver at a mock
//! Docker daemon on a temporary UNIX socket, so they exercise the HTTP
//! contract without touching the kernel.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Path;
use axum::http::{header, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use netdhcp_docker::DockerClient;
use netdhcp_plugin::{router, serve, NetworkDriver};

const ENDPOINT_ID: &str = "abcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789";

/// Mock Docker daemon: answers ping and returns a DHCP network whose
/// stored options name `brtest0`.
fn mock_docker_router() -> Router {
    async fn ping() -> impl IntoResponse {
        ([("Api-Version", "1.41")], "OK")
    }

    async fn inspect_network(Path(id): Path<String>) -> Json<Value> {
        Json(json!({
            "Id": id,
            "Name": "dhcptest",
            "Driver": "ghcr.io/devplayer0/docker-net-dhcp:latest",
            "Options": {"bridge": "brtest0"},
            "IPAM": {"Driver": "null", "Config": [{"Subnet": "0.0.0.0/0"}]},
            "Containers": {}
        }))
    }

    async fn list_networks() -> Json<Value> {
        Json(json!([]))
    }

    Router::new()
        .route("/_ping", get(ping))
        .route("/v1.41/networks", get(list_networks))
        .route("/v1.41/networks/{id}", get(inspect_network))
}

/// Spawns the mock daemon and returns a plugin router wired to it.
async fn test_router() -> (Router, TempDir, CancellationToken) {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let socket = tmp.path().join("docker.sock");

    let listener = UnixListener::bind(&socket).expect("failed to bind mock docker socket");
    let shutdown = CancellationToken::new();
    tokio::spawn(serve(listener, mock_docker_router(), shutdown.clone()));

    let docker = DockerClient::with_socket(socket);
    let driver = Arc::new(NetworkDriver::new(docker, Duration::from_secs(1)));
    (router(driver), tmp, shutdown)
}

async fn post(app: Router, path: &str, body: Value) -> (StatusCode, Option<String>, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, content_type, value)
}

#[tokio::test]
async fn get_capabilities_is_constant() {
    let (app, _tmp, _shutdown) = test_router().await;

    let (status, _, body) = post(app, "/NetworkDriver.GetCapabilities", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Scope"], "local");
    assert_eq!(body["ConnectivityScope"], "global");
}

#[tokio::test]
async fn create_network_requires_a_bridge() {
    let (app, _tmp, _shutdown) = test_router().await;

    let (status, content_type, body) = post(
        app,
        "/NetworkDriver.CreateNetwork",
        json!({"NetworkID": "n1", "Options": {}, "IPv4Data": [], "IPv6Data": []}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(content_type.as_deref(), Some("application/problem+json"));
    assert_eq!(body["Err"], "bridge required");
}

#[tokio::test]
async fn create_network_rejects_non_null_ipam() {
    let (app, _tmp, _shutdown) = test_router().await;

    let (status, _, body) = post(
        app,
        "/NetworkDriver.CreateNetwork",
        json!({
            "NetworkID": "n1",
            "Options": {"com.docker.network.generic": {"bridge": "br0"}},
            "IPv4Data": [{"AddressSpace": "default", "Pool": "10.0.0.0/24", "Gateway": "", "AuxAddresses": null}],
            "IPv6Data": []
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["Err"].as_str().unwrap().contains("IPAM"));
}

#[tokio::test]
async fn create_network_rejects_unknown_options() {
    let (app, _tmp, _shutdown) = test_router().await;

    let (status, _, body) = post(
        app,
        "/NetworkDriver.CreateNetwork",
        json!({
            "NetworkID": "n1",
            "Options": {"com.docker.network.generic": {"bridge": "br0", "mtu": "1500"}},
            "IPv4Data": [],
            "IPv6Data": []
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["Err"].as_str().unwrap().contains("mtu"));
}

#[tokio::test]
async fn delete_network_is_a_no_op() {
    let (app, _tmp, _shutdown) = test_router().await;

    let (status, _, body) = post(
        app,
        "/NetworkDriver.DeleteNetwork",
        json!({"NetworkID": "n1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn join_without_create_endpoint_reports_missing_hints() {
    let (app, _tmp, _shutdown) = test_router().await;

    let (status, content_type, body) = post(
        app,
        "/NetworkDriver.Join",
        json!({
            "NetworkID": "n1",
            "EndpointID": ENDPOINT_ID,
            "SandboxKey": "/var/run/docker/netns/abc123",
            "Options": {}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(content_type.as_deref(), Some("application/problem+json"));
    assert_eq!(body["Err"], "missing CreateEndpoint hints");
}

#[tokio::test]
async fn leave_without_manager_reports_missing_state() {
    let (app, _tmp, _shutdown) = test_router().await;

    let (status, _, body) = post(
        app,
        "/NetworkDriver.Leave",
        json!({"NetworkID": "n1", "EndpointID": ENDPOINT_ID}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["Err"], "missing joined endpoint state");
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let (app, _tmp, _shutdown) = test_router().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/NetworkDriver.CreateNetwork")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["Err"]
        .as_str()
        .unwrap()
        .contains("failed to parse request body"));
}

#[tokio::test]
async fn unknown_request_fields_are_rejected() {
    let (app, _tmp, _shutdown) = test_router().await;

    let (status, _, _) = post(
        app,
        "/NetworkDriver.Leave",
        json!({"NetworkID": "n1", "EndpointID": ENDPOINT_ID, "Extra": 1}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
