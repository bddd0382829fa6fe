//! Fingerprint engine abstraction.
//!
//! The forwarding pipeline only sees these traits. An engine turns
//! [`ClientOptions`] into a one-shot [`FingerprintClient`]; the client sends a
//! single [`OutboundRequest`] and hands back the unread response body.
//!
//! Header emission order travels next to the header map as an explicit list
//! and is applied by the engine right before serialisation, so the map's own
//! iteration order never decides what goes on the wire.

mod connect;
mod h2;
mod order;
mod pseudo;
mod rustls_engine;
mod tls;

pub use connect::HttpProxy;
pub use order::{apply_header_order, insert_transport_headers};
pub use pseudo::{PseudoHeader, PseudoOrder};
pub use rustls_engine::{RustlsEngine, MAX_REDIRECTS};
pub use tls::{build_tls_config, Alpn, NoVerifier};

use crate::error::ForwardError;
use crate::profile::ClientProfile;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use hyper::{HeaderMap, Method, StatusCode};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;

/// Response body as received from the target, still encoded.
pub type ResponseBody = BoxStream<'static, Result<Bytes, ForwardError>>;

/// Parameters for a freshly built client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub profile: Arc<ClientProfile>,
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub random_extension_order: bool,
    pub force_http1: bool,
    pub insecure_skip_verify: bool,
    pub proxy: Option<String>,
    /// Engines must not decode bodies themselves when set.
    pub disable_compression: bool,
}

/// Target request ready for the wire.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Header names in emission order
    pub header_order: Vec<String>,
    /// HTTP/2 pseudo-header names in emission order
    pub pseudo_header_order: Vec<String>,
}

/// Status, raw headers and unread body of a target response.
pub struct EngineResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

/// Builds clients configured with fingerprint parameters.
pub trait FingerprintEngine: Send + Sync {
    fn build_client(
        &self,
        options: &ClientOptions,
    ) -> Result<Box<dyn FingerprintClient>, ForwardError>;
}

/// A client bound to one set of fingerprint parameters.
#[async_trait]
pub trait FingerprintClient: Send + Sync {
    /// Send the request. Network, TLS and timeout failures are all transport errors.
    async fn send(&self, request: OutboundRequest) -> Result<EngineResponse, ForwardError>;
}
