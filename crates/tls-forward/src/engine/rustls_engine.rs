//! Engine built on `rustls`, with its own HTTP/2 framing for TLS targets.
//!
//! HTTPS requests dial the target (or tunnel through the proxy), run the
//! profile's handshake and, when `h2` is negotiated, speak HTTP/2 directly so
//! SETTINGS, window sizes and pseudo-header order come from the profile. A
//! target that only offers `http/1.1` gets a hyper HTTP/1 connection over the
//! same TLS stream. Plain `http://` targets and forced HTTP/1.1 go through a
//! `reqwest` client configured from the same profile.
//!
//! Redirects and the overall deadline are handled here, above both paths.

use super::connect::{self, HttpProxy};
use super::h2::{self, H2Request};
use super::order::{apply_header_order, authority, insert_transport_headers, path_and_query};
use super::pseudo::PseudoOrder;
use super::tls::{build_tls_config, Alpn, ALPN_H2};
use super::{
    ClientOptions, EngineResponse, FingerprintClient, FingerprintEngine, OutboundRequest,
    ResponseBody,
};
use crate::error::ForwardError;
use crate::profile::ClientProfile;
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use http_body_util::{BodyExt, Full};
use hyper::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, LOCATION, PROXY_AUTHORIZATION,
};
use hyper::{HeaderMap, Method, StatusCode};
use hyper_util::rt::TokioIo;
use reqwest::redirect::Policy;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

/// Redirects followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// Builds a fresh client for every forward.
#[derive(Debug, Default, Clone)]
pub struct RustlsEngine;

impl RustlsEngine {
    pub fn new() -> Self {
        Self
    }
}

impl FingerprintEngine for RustlsEngine {
    fn build_client(
        &self,
        options: &ClientOptions,
    ) -> Result<Box<dyn FingerprintClient>, ForwardError> {
        let profile = &options.profile;

        if options.insecure_skip_verify {
            warn!(
                "TLS certificate verification DISABLED for this forward (profile {})",
                profile.name
            );
        }

        let proxy = options
            .proxy
            .as_deref()
            .map(HttpProxy::parse)
            .transpose()?;

        let tls = Arc::new(build_tls_config(
            profile,
            options.insecure_skip_verify,
            options.random_extension_order,
            Alpn::Http2,
        )?);
        let http1_tls = build_tls_config(
            profile,
            options.insecure_skip_verify,
            options.random_extension_order,
            Alpn::Http1,
        )?;

        let mut builder = reqwest::Client::builder()
            .use_preconfigured_tls(http1_tls)
            .http1_only()
            .pool_max_idle_per_host(0)
            .redirect(Policy::none());

        if options.disable_compression {
            builder = builder.no_gzip().no_brotli().no_deflate();
        }
        if profile.http1_title_case {
            builder = builder.http1_title_case_headers();
        }
        builder = match options.proxy {
            Some(ref proxy) => {
                builder.proxy(reqwest::Proxy::all(proxy).map_err(ForwardError::factory)?)
            }
            None => builder.no_proxy(),
        };

        let http1 = builder.build().map_err(ForwardError::factory)?;

        debug!(
            profile = %profile.name,
            timeout_secs = options.timeout.as_secs(),
            follow_redirects = options.follow_redirects,
            force_http1 = options.force_http1,
            random_extension_order = options.random_extension_order,
            proxied = proxy.is_some(),
            "Built fingerprint client"
        );

        Ok(Box::new(RustlsClient {
            profile: profile.clone(),
            tls: TlsConnector::from(tls),
            http1,
            proxy,
            timeout: options.timeout,
            follow_redirects: options.follow_redirects,
            force_http1: options.force_http1,
        }))
    }
}

struct RustlsClient {
    profile: Arc<ClientProfile>,
    tls: TlsConnector,
    /// Plain http and forced HTTP/1.1
    http1: reqwest::Client,
    proxy: Option<HttpProxy>,
    timeout: Duration,
    follow_redirects: bool,
    force_http1: bool,
}

#[async_trait]
impl FingerprintClient for RustlsClient {
    async fn send(&self, request: OutboundRequest) -> Result<EngineResponse, ForwardError> {
        let pseudo_order = PseudoOrder::parse(&request.pseudo_header_order)?;
        let deadline = Instant::now() + self.timeout;

        let response = timeout_at(deadline, self.execute(request, pseudo_order))
            .await
            .map_err(|_| {
                ForwardError::transport(format!(
                    "no response within {}s",
                    self.timeout.as_secs()
                ))
            })??;

        let EngineResponse {
            status,
            headers,
            body,
        } = response;
        Ok(EngineResponse {
            status,
            headers,
            body: body_with_deadline(body, deadline),
        })
    }
}

impl RustlsClient {
    async fn execute(
        &self,
        mut request: OutboundRequest,
        pseudo_order: PseudoOrder,
    ) -> Result<EngineResponse, ForwardError> {
        let mut redirects = 0;
        loop {
            let response = self.round_trip(&request, pseudo_order).await?;
            if !self.follow_redirects {
                return Ok(response);
            }
            let Some(next) = redirect_request(&request, response.status, &response.headers)? else {
                return Ok(response);
            };
            if redirects == MAX_REDIRECTS {
                return Err(ForwardError::transport(format!(
                    "stopped after {MAX_REDIRECTS} redirects"
                )));
            }
            redirects += 1;
            debug!(
                status = response.status.as_u16(),
                from = %request.url,
                to = %next.url,
                "Following redirect"
            );
            request = next;
        }
    }

    async fn round_trip(
        &self,
        request: &OutboundRequest,
        pseudo_order: PseudoOrder,
    ) -> Result<EngineResponse, ForwardError> {
        let mut headers = request.headers.clone();
        insert_transport_headers(
            &mut headers,
            &request.header_order,
            &request.url,
            request.body.as_ref(),
        );
        let headers = apply_header_order(&headers, &request.header_order);

        if request.url.scheme() == "https" && !self.force_http1 {
            self.send_tls(request, headers, pseudo_order).await
        } else {
            self.send_reqwest(request, headers).await
        }
    }

    async fn send_reqwest(
        &self,
        request: &OutboundRequest,
        headers: HeaderMap,
    ) -> Result<EngineResponse, ForwardError> {
        let mut builder = self
            .http1
            .request(request.method.clone(), request.url.clone())
            .headers(headers);
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(ForwardError::transport)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map_err(ForwardError::transport)
            .boxed();

        Ok(EngineResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_tls(
        &self,
        request: &OutboundRequest,
        headers: HeaderMap,
        pseudo_order: PseudoOrder,
    ) -> Result<EngineResponse, ForwardError> {
        let tcp = connect::dial(&request.url, self.proxy.as_ref()).await?;

        let host = request
            .url
            .host_str()
            .unwrap_or_default()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let server_name = ServerName::try_from(host).map_err(ForwardError::transport)?;
        let tls = self
            .tls
            .connect(server_name, tcp)
            .await
            .map_err(|e| ForwardError::transport(format!("TLS handshake failed: {e}")))?;

        let negotiated_h2 = tls.get_ref().1.alpn_protocol() == Some(ALPN_H2);
        debug!(
            profile = %self.profile.name,
            h2 = negotiated_h2,
            "TLS handshake complete"
        );

        if negotiated_h2 {
            let h2_request = H2Request {
                method: &request.method,
                url: &request.url,
                headers: &headers,
                body: request.body.clone(),
                pseudo_order,
            };
            h2::send(tls, &self.profile, h2_request).await
        } else {
            send_http1(
                TokioIo::new(tls),
                &self.profile,
                request,
                headers,
            )
            .await
        }
    }
}

/// HTTP/1.1 over an established stream, for targets that decline `h2`.
async fn send_http1<T>(
    io: T,
    profile: &ClientProfile,
    request: &OutboundRequest,
    headers: HeaderMap,
) -> Result<EngineResponse, ForwardError>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::Builder::new()
        .title_case_headers(profile.http1_title_case)
        .handshake(io)
        .await
        .map_err(ForwardError::transport)?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("HTTP/1.1 target connection ended: {}", e);
        }
    });

    // The connection-level client never adds Host on its own.
    let headers = if headers.contains_key(HOST) {
        headers
    } else {
        let mut with_host = HeaderMap::with_capacity(headers.len() + 1);
        if let Ok(value) = authority(&request.url).parse() {
            with_host.insert(HOST, value);
        }
        with_host.extend(headers);
        with_host
    };

    let mut outbound = hyper::Request::builder()
        .method(request.method.clone())
        .uri(path_and_query(&request.url))
        .body(Full::new(request.body.clone().unwrap_or_default()))
        .map_err(ForwardError::transport)?;
    *outbound.headers_mut() = headers;

    let response = sender
        .send_request(outbound)
        .await
        .map_err(ForwardError::transport)?;
    let (parts, body) = response.into_parts();

    Ok(EngineResponse {
        status: parts.status,
        headers: parts.headers,
        body: body
            .into_data_stream()
            .map_err(ForwardError::transport)
            .boxed(),
    })
}

/// Ends the body with a transport error once `deadline` passes.
fn body_with_deadline(body: ResponseBody, deadline: Instant) -> ResponseBody {
    stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        match timeout_at(deadline, body.next()).await {
            Ok(Some(item)) => Some((item, Some(body))),
            Ok(None) => None,
            Err(_) => Some((Err(ForwardError::transport("response body timed out")), None)),
        }
    })
    .boxed()
}

/// The request to issue after a redirect response, if it is one to follow.
///
/// 301, 302 and 303 turn anything but GET and HEAD into a bodiless GET; 307
/// and 308 repeat the request as is. Credentials and cookies are dropped when
/// the redirect leaves the original host.
fn redirect_request(
    request: &OutboundRequest,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<Option<OutboundRequest>, ForwardError> {
    let rewrites_method = match status {
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER => true,
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => false,
        _ => return Ok(None),
    };
    let Some(location) = headers.get(LOCATION) else {
        return Ok(None);
    };

    let location = location
        .to_str()
        .map_err(|e| ForwardError::transport(format!("bad Location header: {e}")))?;
    let url = request
        .url
        .join(location)
        .map_err(|e| ForwardError::transport(format!("bad Location header: {e}")))?;

    let mut next = request.clone();
    if rewrites_method {
        if next.method != Method::GET && next.method != Method::HEAD {
            next.method = Method::GET;
        }
        next.body = None;
        next.headers.remove(CONTENT_TYPE);
        next.headers.remove(CONTENT_LENGTH);
    }
    if url.host_str() != request.url.host_str() {
        for name in [AUTHORIZATION, PROXY_AUTHORIZATION, COOKIE, HOST] {
            next.headers.remove(name);
        }
    }
    next.url = url;

    Ok(Some(next))
}
