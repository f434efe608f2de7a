//! Driver-facing error taxonomy.
//!
//! Every error that crosses the driver protocol boundary is one of these;
//! libnetwork sees them as `{"Err": "<message>"}` bodies with a 400 for
//! validation failures and a 500 for everything else.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, PluginError>;

/// Errors surfaced at the driver protocol boundary.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A non-null IPAM pool or a static address was requested.
    #[error("only the null IPAM driver is supported")]
    Ipam,

    /// The bridge option was missing or empty.
    #[error("bridge required")]
    BridgeRequired,

    /// The named interface exists but is not a bridge.
    #[error("network interface is not a bridge")]
    NotBridge,

    /// The bridge is already claimed by another Docker network.
    #[error("bridge already in use by Docker")]
    BridgeUsed,

    /// The requested MAC address could not be parsed.
    #[error("invalid MAC address")]
    MacAddress,

    /// An option key outside the recognized set was supplied.
    #[error("unknown network option {0:?}")]
    UnknownOption(String),

    /// An option value could not be coerced.
    #[error("invalid value for network option {key}: {reason}")]
    OptionValue {
        key: &'static str,
        reason: String,
    },

    /// The request body was not valid JSON for the operation.
    #[error("failed to parse request body: {0}")]
    BadRequest(String),

    /// Join arrived without a preceding CreateEndpoint on this endpoint.
    #[error("missing CreateEndpoint hints")]
    NoHint,

    /// Leave arrived without an active persistent manager.
    #[error("missing joined endpoint state")]
    NoSandbox,

    /// The endpoint's container could not be found on the network.
    #[error("couldn't find container by endpoint on the network")]
    NoContainer,

    /// The deterministic host link is not a veth interface.
    #[error("host link is not a veth interface")]
    NotVEth,

    /// Kernel operation failure, with context.
    #[error("{0}: {1}")]
    Net(String, #[source] netdhcp_net::NetError),

    /// Docker daemon failure, with context.
    #[error("{0}: {1}")]
    Docker(String, #[source] netdhcp_docker::DockerError),

    /// DHCP client failure, with context.
    #[error("{0}: {1}")]
    Dhcp(String, #[source] netdhcp_udhcpc::DhcpError),

    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl PluginError {
    /// HTTP status for this error at the driver boundary.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Ipam
            | Self::BridgeRequired
            | Self::NotBridge
            | Self::BridgeUsed
            | Self::MacAddress
            | Self::UnknownOption(_)
            | Self::OptionValue { .. }
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PluginError {
    fn into_response(self) -> Response {
        tracing::error!("error while processing request: {self}");

        let body = serde_json::json!({ "Err": self.to_string() });
        let mut response = (self.status_code(), axum::Json(body)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_bad_requests() {
        for err in [
            PluginError::Ipam,
            PluginError::BridgeRequired,
            PluginError::NotBridge,
            PluginError::BridgeUsed,
            PluginError::MacAddress,
            PluginError::UnknownOption("foo".to_string()),
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn state_errors_are_server_errors() {
        for err in [
            PluginError::NoHint,
            PluginError::NoSandbox,
            PluginError::NoContainer,
            PluginError::NotVEth,
            PluginError::Internal("boom".to_string()),
        ] {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
