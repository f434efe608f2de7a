//! HTTP client for the Docker Engine API over a UNIX socket.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::{header, Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tokio::net::UnixStream;
use tokio::sync::OnceCell;

use crate::error::{DockerError, Result};
use crate::types::{ContainerInspect, NetworkResource};

/// Default daemon socket.
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// API version used when the daemon does not advertise one.
const DEFAULT_API_VERSION: &str = "1.41";

/// Per-request deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Docker Engine API client.
///
/// Opens one connection per request; the plugin's request rate is a handful
/// of lookups per endpoint lifecycle, so pooling buys nothing.
pub struct DockerClient {
    socket: PathBuf,
    version: OnceCell<String>,
}

impl DockerClient {
    /// Creates a client from the environment.
    ///
    /// `DOCKER_HOST` is honored when it names a `unix://` socket; otherwise
    /// the default daemon socket is used.
    ///
    /// # Errors
    ///
    /// Returns an error if `DOCKER_HOST` is set to a non-UNIX URL.
    pub fn from_env() -> Result<Self> {
        let socket = match std::env::var("DOCKER_HOST") {
            Ok(host) => match host.strip_prefix("unix://") {
                Some(path) => PathBuf::from(path),
                None => return Err(DockerError::UnsupportedHost(host)),
            },
            Err(_) => PathBuf::from(DEFAULT_SOCKET),
        };
        Ok(Self::with_socket(socket))
    }

    /// Creates a client for a specific daemon socket.
    #[must_use]
    pub fn with_socket(socket: PathBuf) -> Self {
        Self {
            socket,
            version: OnceCell::new(),
        }
    }

    /// Lists all networks.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or decoding fails.
    pub async fn network_list(&self) -> Result<Vec<NetworkResource>> {
        self.get_json("/networks").await
    }

    /// Inspects one network by ID or name.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or decoding fails.
    pub async fn network_inspect(&self, id: &str) -> Result<NetworkResource> {
        self.get_json(&format!("/networks/{id}")).await
    }

    /// Inspects one container by ID or name.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or decoding fails.
    pub async fn container_inspect(&self, id: &str) -> Result<ContainerInspect> {
        self.get_json(&format!("/containers/{id}/json")).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let version = self.negotiated_version().await?;
        let uri = format!("/v{version}{path}");

        let response = tokio::time::timeout(REQUEST_TIMEOUT, self.get(&uri))
            .await
            .map_err(|_| DockerError::Timeout)??;

        let status = response.status();
        let body = collect_body(response).await?;
        if !status.is_success() {
            return Err(DockerError::Api {
                status: status.as_u16(),
                message: api_message(&body),
            });
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Negotiates the API version once, from the ping endpoint's
    /// `Api-Version` header.
    async fn negotiated_version(&self) -> Result<&str> {
        self.version
            .get_or_try_init(|| async {
                let response = tokio::time::timeout(REQUEST_TIMEOUT, self.get("/_ping"))
                    .await
                    .map_err(|_| DockerError::Timeout)??;

                let version = response
                    .headers()
                    .get("Api-Version")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or(DEFAULT_API_VERSION)
                    .to_string();
                tracing::debug!(%version, "negotiated Docker API version");

                // Drain the body so the connection task can finish cleanly.
                let _ = collect_body(response).await;
                Ok(version)
            })
            .await
            .map(String::as_str)
    }

    async fn get(&self, uri: &str) -> Result<Response<Incoming>> {
        let stream = UnixStream::connect(&self.socket).await.map_err(|e| {
            DockerError::Transport(format!("connect {}: {e}", self.socket.display()))
        })?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| DockerError::Transport(format!("handshake: {e}")))?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("docker connection error: {e}");
            }
        });

        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::HOST, "docker")
            .body(Empty::<Bytes>::new())
            .map_err(|e| DockerError::Transport(format!("build request: {e}")))?;

        sender
            .send_request(request)
            .await
            .map_err(|e| DockerError::Transport(format!("send request: {e}")))
    }
}

async fn collect_body(response: Response<Incoming>) -> Result<Bytes> {
    Ok(response
        .into_body()
        .collect()
        .await
        .map_err(|e| DockerError::Transport(format!("read body: {e}")))?
        .to_bytes())
}

/// Extracts the daemon's `{"message": ...}` error body, if present.
fn api_message(body: &[u8]) -> String {
    #[derive(serde::Deserialize)]
    struct ApiError {
        message: String,
    }
    serde_json::from_slice::<ApiError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_message_prefers_structured_errors() {
        assert_eq!(
            api_message(br#"{"message": "No such container: foo"}"#),
            "No such container: foo"
        );
        assert_eq!(api_message(b"plain text\n"), "plain text");
    }

    #[test]
    fn with_socket_does_not_touch_the_filesystem() {
        let client = DockerClient::with_socket(PathBuf::from("/nonexistent/docker.sock"));
        assert_eq!(client.socket, PathBuf::from("/nonexistent/docker.sock"));
    }
}
