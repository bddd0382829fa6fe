//! Control header protocol.
//!
//! Turns the inbound header set and body into a validated [`RequestDescriptor`].
//! Fields are checked in a fixed order and the first failure short-circuits.

mod headers;
mod parse;

pub use headers::*;
pub use parse::{format_proxy, parse_bool, parse_order, parse_target_url, parse_timeout};

use crate::error::ValidationError;
use crate::profile::{ClientProfile, ProfileTable};
use bytes::Bytes;
use hyper::header::{HeaderName, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use hyper::{HeaderMap, Method};
use reqwest::Url;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FOLLOW_REDIRECTS: bool = true;
pub const DEFAULT_FORCE_HTTP1: bool = false;
pub const DEFAULT_INSECURE_SKIP_VERIFY: bool = false;
pub const DEFAULT_RANDOM_EXTENSION_ORDER: bool = true;

/// Methods the target request may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Trace,
}

impl TargetMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetMethod::Get => "GET",
            TargetMethod::Head => "HEAD",
            TargetMethod::Post => "POST",
            TargetMethod::Put => "PUT",
            TargetMethod::Patch => "PATCH",
            TargetMethod::Delete => "DELETE",
            TargetMethod::Options => "OPTIONS",
            TargetMethod::Trace => "TRACE",
        }
    }

    /// Methods that conventionally carry no request body.
    pub fn is_bodyless(&self) -> bool {
        matches!(
            self,
            TargetMethod::Get | TargetMethod::Head | TargetMethod::Options | TargetMethod::Trace
        )
    }

    pub fn to_http(self) -> Method {
        match self {
            TargetMethod::Get => Method::GET,
            TargetMethod::Head => Method::HEAD,
            TargetMethod::Post => Method::POST,
            TargetMethod::Put => Method::PUT,
            TargetMethod::Patch => Method::PATCH,
            TargetMethod::Delete => Method::DELETE,
            TargetMethod::Options => Method::OPTIONS,
            TargetMethod::Trace => Method::TRACE,
        }
    }
}

impl FromStr for TargetMethod {
    type Err = ();

    /// Exact, case-sensitive match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(TargetMethod::Get),
            "HEAD" => Ok(TargetMethod::Head),
            "POST" => Ok(TargetMethod::Post),
            "PUT" => Ok(TargetMethod::Put),
            "PATCH" => Ok(TargetMethod::Patch),
            "DELETE" => Ok(TargetMethod::Delete),
            "OPTIONS" => Ok(TargetMethod::Options),
            "TRACE" => Ok(TargetMethod::Trace),
            _ => Err(()),
        }
    }
}

impl fmt::Display for TargetMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to issue one target request. Lives for a single forward.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub target_url: Url,
    pub method: TargetMethod,
    pub passthrough_headers: HeaderMap,
    pub body: Bytes,
    /// Normalised `http://[user:pass@]host:port`
    pub proxy: Option<String>,
    pub client_profile: Arc<ClientProfile>,
    pub timeout_secs: u64,
    pub follow_redirects: bool,
    pub force_http1: bool,
    pub insecure_skip_verify: bool,
    pub random_extension_order: bool,
    pub header_order: Vec<String>,
    pub pseudo_header_order: Vec<String>,
}

impl RequestDescriptor {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Body to send upstream. GET never carries one; empty bodies are never attached.
    pub fn outbound_body(&self) -> Option<Bytes> {
        if self.method != TargetMethod::Get && !self.body.is_empty() {
            Some(self.body.clone())
        } else {
            None
        }
    }
}

/// Builds descriptors against a read-only profile table.
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    profiles: Arc<ProfileTable>,
}

impl DescriptorBuilder {
    pub fn new(profiles: Arc<ProfileTable>) -> Self {
        Self { profiles }
    }

    pub fn build(
        &self,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<RequestDescriptor, ValidationError> {
        let raw_url = required(headers, &X_TLS_URL)?;
        let target_url = parse_target_url(X_TLS_URL.as_str(), raw_url)?;

        let raw_method = required(headers, &X_TLS_METHOD)?;
        let method = TargetMethod::from_str(raw_method)
            .map_err(|_| ValidationError::invalid(X_TLS_METHOD.as_str(), raw_method))?;

        let passthrough_headers = passthrough_headers(headers, method);

        let proxy = optional(headers, &X_TLS_PROXY)?
            .map(|raw| format_proxy(X_TLS_PROXY.as_str(), raw))
            .transpose()?;

        let profile_name = required(headers, &X_TLS_PROFILE)?;
        let client_profile = self
            .profiles
            .get(profile_name)
            .ok_or_else(|| ValidationError::invalid(X_TLS_PROFILE.as_str(), profile_name))?;

        let timeout_secs = match optional(headers, &X_TLS_CLIENT_TIMEOUT)? {
            Some(raw) => parse_timeout(X_TLS_CLIENT_TIMEOUT.as_str(), raw)?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        let follow_redirects = flag(headers, &X_TLS_FOLLOW_REDIRECTS, DEFAULT_FOLLOW_REDIRECTS)?;
        let force_http1 = flag(headers, &X_TLS_FORCE_HTTP1, DEFAULT_FORCE_HTTP1)?;
        let insecure_skip_verify = flag(
            headers,
            &X_TLS_INSECURE_SKIP_VERIFY,
            DEFAULT_INSECURE_SKIP_VERIFY,
        )?;
        let random_extension_order = flag(
            headers,
            &X_TLS_WITH_RANDOM_EXTENSION_ORDER,
            DEFAULT_RANDOM_EXTENSION_ORDER,
        )?;

        let header_order = parse_order(
            X_TLS_HEADER_ORDER.as_str(),
            required(headers, &X_TLS_HEADER_ORDER)?,
        )?;
        let pseudo_header_order = parse_order(
            X_TLS_PSEUDO_HEADER_ORDER.as_str(),
            required(headers, &X_TLS_PSEUDO_HEADER_ORDER)?,
        )?;

        Ok(RequestDescriptor {
            target_url,
            method,
            passthrough_headers,
            body,
            proxy,
            client_profile,
            timeout_secs,
            follow_redirects,
            force_http1,
            insecure_skip_verify,
            random_extension_order,
            header_order,
            pseudo_header_order,
        })
    }
}

/// Non-empty header value. Empty values count as absent.
fn optional<'a>(
    headers: &'a HeaderMap,
    name: &'static HeaderName,
) -> Result<Option<&'a str>, ValidationError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| ValidationError::invalid(name.as_str(), "<non-ascii value>"))?;
            Ok((!value.is_empty()).then_some(value))
        }
    }
}

fn required<'a>(
    headers: &'a HeaderMap,
    name: &'static HeaderName,
) -> Result<&'a str, ValidationError> {
    optional(headers, name)?.ok_or(ValidationError::Missing(name.as_str()))
}

fn flag(
    headers: &HeaderMap,
    name: &'static HeaderName,
    default: bool,
) -> Result<bool, ValidationError> {
    match optional(headers, name)? {
        Some(raw) => parse_bool(name.as_str(), raw),
        None => Ok(default),
    }
}

/// Framing headers the transport recomputes for the target request.
fn is_framing_header(name: &HeaderName) -> bool {
    name == CONTENT_LENGTH || name == TRANSFER_ENCODING || name == HOST
}

/// Inbound headers minus the control namespace and framing headers.
///
/// `Content-Type` is also dropped for body-less methods so a stale type is
/// never sent without a body.
pub fn passthrough_headers(inbound: &HeaderMap, method: TargetMethod) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound.iter() {
        if is_control_header(name) || is_framing_header(name) {
            continue;
        }
        if name == CONTENT_TYPE && method.is_bodyless() {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }
    forwarded
}
