//! Route dispatch for the inbound server.

use super::response::{build_response, error_response, json_response, method_not_allowed, not_found};
use crate::forward::Forwarder;
use crate::metrics;
use bytes::Bytes;
use futures::FutureExt;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Request handling shared by every connection.
#[derive(Clone)]
pub struct ForwardService {
    forwarder: Forwarder,
    forward_path: Arc<str>,
    max_body_bytes: usize,
}

impl ForwardService {
    pub fn new(forwarder: Forwarder, forward_path: &str, max_body_bytes: usize) -> Self {
        Self {
            forwarder,
            forward_path: Arc::from(forward_path),
            max_body_bytes,
        }
    }

    /// Route a request and write the access log line.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let response = self.route(&method, &path, req).await;

        info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "request"
        );
        response
    }

    async fn route<B>(&self, method: &Method, path: &str, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if path == &*self.forward_path {
            return if method == Method::POST {
                self.handle_forward(req).await
            } else {
                method_not_allowed()
            };
        }

        match (method, path) {
            (&Method::GET, "/health") => handle_health(),
            (&Method::GET, "/metrics") => handle_metrics(),
            _ => not_found(),
        }
    }

    async fn handle_forward<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();

        let body = match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                error!("Failed to read forward request body: {}", e);
                return error_response("error while reading request body");
            }
        };

        let forward = AssertUnwindSafe(self.forwarder.forward(&parts.headers, body));
        match forward.catch_unwind().await {
            Ok(Ok(envelope)) => envelope.into_response(),
            Ok(Err(e)) => {
                match e.field() {
                    Some(field) => error!(kind = e.kind(), field, "Forward failed: {}", e),
                    None => error!(kind = e.kind(), "Forward failed: {}", e),
                }
                error_response(e.public_message())
            }
            Err(_) => {
                error!("Forward handler panicked");
                metrics::record_outcome("panic");
                error_response("internal server error")
            }
        }
    }
}

/// GET /health
pub fn handle_health() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &serde_json::json!({"status": "ok"}))
}

/// GET /metrics - Prometheus metrics
pub fn handle_metrics() -> Response<Full<Bytes>> {
    match metrics::collect_metrics() {
        Ok(text) => build_response(StatusCode::OK, "text/plain; version=0.0.4", text),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            error_response("failed to encode metrics")
        }
    }
}
