//! Response helpers for the inbound server.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;

/// Body of every failed forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureBody {
    pub success: bool,
    pub message: String,
}

impl FailureBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Build an HTTP response with the given status, content type and body.
pub fn build_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    build_response(status, "application/json", json)
}

/// `{"success":false,"message":...}` with the given status.
pub fn failure_response(status: StatusCode, message: impl Into<String>) -> Response<Full<Bytes>> {
    json_response(status, &FailureBody::new(message))
}

/// Generic failure: always a 500.
pub fn error_response(message: impl Into<String>) -> Response<Full<Bytes>> {
    failure_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

pub fn not_found() -> Response<Full<Bytes>> {
    failure_response(StatusCode::NOT_FOUND, "not found")
}

pub fn method_not_allowed() -> Response<Full<Bytes>> {
    let mut response = failure_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    response
        .headers_mut()
        .insert(hyper::header::ALLOW, HeaderValue::from_static("POST"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_response_shape() {
        let response = error_response("error while doing request");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"success": false, "message": "error while doing request"})
        );
    }

    #[tokio::test]
    async fn test_method_not_allowed_advertises_post() {
        let response = method_not_allowed();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(hyper::header::ALLOW).unwrap(), "POST");
        assert_eq!(body_json(response).await["success"], false);
    }
}
