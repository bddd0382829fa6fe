//! The forwarding pipeline.
//!
//! Parse, build client, execute, decode, translate. Each stage runs once and
//! the first failure ends the forward.

pub mod decoder;
pub mod executor;
pub mod factory;
pub mod translator;

pub use decoder::{decode, ContentCoding};
pub use executor::{execute, RawResponse, ResponseHead};
pub use factory::ClientFactory;
pub use translator::{translate, CookieRecord, ResponseEnvelope, SameSite};

use crate::descriptor::{DescriptorBuilder, RequestDescriptor};
use crate::engine::FingerprintEngine;
use crate::error::ForwardError;
use crate::metrics;
use crate::profile::ProfileTable;
use bytes::Bytes;
use hyper::HeaderMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Runs one forward per call. Holds no per-request state.
#[derive(Clone)]
pub struct Forwarder {
    descriptors: DescriptorBuilder,
    factory: ClientFactory,
}

impl Forwarder {
    pub fn new(profiles: Arc<ProfileTable>, engine: Arc<dyn FingerprintEngine>) -> Self {
        Self {
            descriptors: DescriptorBuilder::new(profiles),
            factory: ClientFactory::new(engine),
        }
    }

    /// Forward the request described by `headers` and `body`.
    pub async fn forward(
        &self,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<ResponseEnvelope, ForwardError> {
        let start = Instant::now();

        let result = match self.descriptors.build(headers, body) {
            Ok(descriptor) => {
                let result = self.run(&descriptor).await;
                metrics::record_duration(
                    descriptor.method.as_str(),
                    start.elapsed().as_secs_f64() * 1000.0,
                );
                result
            }
            Err(e) => {
                metrics::record_duration(
                    metrics::UNKNOWN_METHOD,
                    start.elapsed().as_secs_f64() * 1000.0,
                );
                Err(e.into())
            }
        };

        match &result {
            Ok(envelope) => {
                metrics::record_outcome("ok");
                metrics::record_upstream_status(envelope.status.as_u16());
            }
            Err(e) => metrics::record_outcome(e.kind()),
        }

        result
    }

    async fn run(&self, descriptor: &RequestDescriptor) -> Result<ResponseEnvelope, ForwardError> {
        debug!(
            url = %descriptor.target_url,
            method = %descriptor.method,
            profile = %descriptor.client_profile.name,
            "Forwarding request"
        );

        let client = self.factory.build(descriptor)?;
        let RawResponse { head, body } = execute(descriptor, client.as_ref()).await?;

        debug!(
            status = head.status.as_u16(),
            encoding = head.content_encoding.as_deref().unwrap_or("identity"),
            cookies = head.cookies.len(),
            "Target responded"
        );

        let decoded = decode(body, head.content_encoding.as_deref()).await?;
        Ok(translate(head, decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::*;
    use crate::engine::{ClientOptions, EngineResponse, FingerprintClient, OutboundRequest};
    use async_trait::async_trait;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use futures::{stream, StreamExt};
    use hyper::header::{HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, SET_COOKIE};
    use hyper::{Method, StatusCode};
    use std::io::Write;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorded {
        options: Arc<Mutex<Vec<ClientOptions>>>,
        requests: Arc<Mutex<Vec<OutboundRequest>>>,
    }

    /// Records what it is asked to do and answers with a gzip body and a cookie.
    struct MockEngine {
        recorded: Recorded,
        payload: Vec<u8>,
    }

    struct MockClient {
        recorded: Recorded,
        payload: Vec<u8>,
    }

    impl FingerprintEngine for MockEngine {
        fn build_client(
            &self,
            options: &ClientOptions,
        ) -> Result<Box<dyn FingerprintClient>, ForwardError> {
            self.recorded.options.lock().unwrap().push(options.clone());
            Ok(Box::new(MockClient {
                recorded: self.recorded.clone(),
                payload: self.payload.clone(),
            }))
        }
    }

    #[async_trait]
    impl FingerprintClient for MockClient {
        async fn send(&self, request: OutboundRequest) -> Result<EngineResponse, ForwardError> {
            self.recorded.requests.lock().unwrap().push(request);
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            headers.insert(CONTENT_LENGTH, HeaderValue::from(self.payload.len()));
            headers.insert(SET_COOKIE, HeaderValue::from_static("sid=abc; SameSite=Lax"));
            Ok(EngineResponse {
                status: StatusCode::OK,
                headers,
                body: stream::iter(vec![Ok(Bytes::from(self.payload.clone()))]).boxed(),
            })
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn forwarder(payload: Vec<u8>) -> (Forwarder, Recorded) {
        let recorded = Recorded::default();
        let engine = MockEngine {
            recorded: recorded.clone(),
            payload,
        };
        (
            Forwarder::new(Arc::new(ProfileTable::builtin()), Arc::new(engine)),
            recorded,
        )
    }

    fn control_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(&X_TLS_URL, HeaderValue::from_static("https://example.test/api"));
        headers.insert(&X_TLS_METHOD, HeaderValue::from_static("POST"));
        headers.insert(&X_TLS_PROFILE, HeaderValue::from_static("chrome_120"));
        headers.insert(
            &X_TLS_HEADER_ORDER,
            HeaderValue::from_static("host,accept,user-agent"),
        );
        headers.insert(
            &X_TLS_PSEUDO_HEADER_ORDER,
            HeaderValue::from_static(":method,:authority,:scheme,:path"),
        );
        headers
    }

    #[tokio::test]
    async fn test_end_to_end_pipeline() {
        let plain = br#"{"ok":true}"#;
        let (forwarder, recorded) = forwarder(gzip(plain));

        let envelope = forwarder
            .forward(&control_headers(), Bytes::from_static(br#"{"a":1}"#))
            .await
            .unwrap();

        assert_eq!(envelope.status, StatusCode::OK);
        assert_eq!(&envelope.body[..], plain);
        assert!(envelope.headers.get(CONTENT_ENCODING).is_none());
        assert!(envelope.headers.get(CONTENT_LENGTH).is_none());
        assert_eq!(envelope.cookies.len(), 1);
        assert_eq!(envelope.cookies[0].name, "sid");
        assert_eq!(envelope.cookies[0].value, "abc");
        assert_eq!(envelope.cookies[0].same_site, SameSite::Lax);

        let options = recorded.options.lock().unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].profile.name, "chrome_120");
        assert!(options[0].disable_compression);

        let requests = recorded.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url.as_str(), "https://example.test/api");
        assert_eq!(request.body.as_deref(), Some(&br#"{"a":1}"#[..]));
        assert_eq!(request.header_order, vec!["host", "accept", "user-agent"]);
        assert_eq!(
            request.pseudo_header_order,
            vec![":method", ":authority", ":scheme", ":path"]
        );
    }

    #[tokio::test]
    async fn test_validation_failure_never_reaches_engine() {
        let (forwarder, recorded) = forwarder(Vec::new());
        let mut headers = control_headers();
        headers.insert(&X_TLS_PROFILE, HeaderValue::from_static("netscape_4"));

        let err = forwarder.forward(&headers, Bytes::new()).await.unwrap_err();
        assert!(matches!(err, ForwardError::Validation(_)));
        assert!(err.public_message().contains("x-tls-profile"));
        assert!(recorded.options.lock().unwrap().is_empty());
        assert!(recorded.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_timed_under_unknown_method() {
        let (forwarder, _) = forwarder(Vec::new());
        let mut headers = control_headers();
        headers.remove(&X_TLS_URL);

        let samples = || {
            metrics::FORWARD_DURATION_MS
                .with_label_values(&[metrics::UNKNOWN_METHOD])
                .get_sample_count()
        };
        let before = samples();
        assert!(forwarder.forward(&headers, Bytes::new()).await.is_err());
        assert!(samples() > before);
    }

    #[tokio::test]
    async fn test_decode_failure_reported() {
        let (forwarder, _) = forwarder(b"not gzip at all".to_vec());
        let err = forwarder
            .forward(&control_headers(), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Decode { .. }));
        assert_eq!(err.public_message(), "error while decoding response body");
    }

    #[tokio::test]
    async fn test_missing_flags_match_explicit_defaults() {
        let (forwarder, recorded) = forwarder(gzip(b"x"));

        forwarder
            .forward(&control_headers(), Bytes::new())
            .await
            .unwrap();

        let mut explicit = control_headers();
        explicit.insert(&X_TLS_FOLLOW_REDIRECTS, HeaderValue::from_static("true"));
        explicit.insert(&X_TLS_WITH_RANDOM_EXTENSION_ORDER, HeaderValue::from_static("true"));
        explicit.insert(&X_TLS_FORCE_HTTP1, HeaderValue::from_static("false"));
        explicit.insert(&X_TLS_INSECURE_SKIP_VERIFY, HeaderValue::from_static("false"));
        forwarder.forward(&explicit, Bytes::new()).await.unwrap();

        let options = recorded.options.lock().unwrap();
        let (a, b) = (&options[0], &options[1]);
        assert_eq!(a.follow_redirects, b.follow_redirects);
        assert_eq!(a.random_extension_order, b.random_extension_order);
        assert_eq!(a.force_http1, b.force_http1);
        assert_eq!(a.insecure_skip_verify, b.insecure_skip_verify);
        assert_eq!(a.timeout, b.timeout);
    }
}
