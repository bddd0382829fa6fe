//! Request executor.

use crate::descriptor::RequestDescriptor;
use crate::engine::{FingerprintClient, OutboundRequest, ResponseBody};
use crate::error::ForwardError;
use cookie::Cookie;
use hyper::header::{CONTENT_ENCODING, SET_COOKIE};
use hyper::{HeaderMap, StatusCode};
use tracing::{debug, warn};

/// Everything known about a target response before its body is read.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    /// Headers exactly as received, duplicates included
    pub headers: HeaderMap,
    pub cookies: Vec<Cookie<'static>>,
    pub content_encoding: Option<String>,
}

pub struct RawResponse {
    pub head: ResponseHead,
    pub body: ResponseBody,
}

/// Outbound request for a descriptor. Order hints ride alongside the header map.
pub fn outbound_request(descriptor: &RequestDescriptor) -> OutboundRequest {
    OutboundRequest {
        method: descriptor.method.to_http(),
        url: descriptor.target_url.clone(),
        headers: descriptor.passthrough_headers.clone(),
        body: descriptor.outbound_body(),
        header_order: descriptor.header_order.clone(),
        pseudo_header_order: descriptor.pseudo_header_order.clone(),
    }
}

/// Parse every `Set-Cookie` header. Unparseable cookies are dropped.
pub fn parse_set_cookies(headers: &HeaderMap) -> Vec<Cookie<'static>> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| {
            let raw = value.to_str().ok()?;
            match Cookie::parse(raw.to_owned()) {
                Ok(cookie) => Some(cookie),
                Err(e) => {
                    warn!("Skipping unparseable Set-Cookie header: {}", e);
                    None
                }
            }
        })
        .collect()
}

/// Send the descriptor's request through `client`. The body is left unread.
pub async fn execute(
    descriptor: &RequestDescriptor,
    client: &dyn FingerprintClient,
) -> Result<RawResponse, ForwardError> {
    let request = outbound_request(descriptor);
    debug!(
        method = %request.method,
        url = %request.url,
        headers = request.headers.len(),
        has_body = request.body.is_some(),
        "Sending target request"
    );

    let response = client.send(request).await?;

    let content_encoding = response
        .headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let cookies = parse_set_cookies(&response.headers);

    Ok(RawResponse {
        head: ResponseHead {
            status: response.status,
            headers: response.headers,
            cookies,
            content_encoding,
        },
        body: response.body,
    })
}
