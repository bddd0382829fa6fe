//! Response translation: target response in, caller-facing response out.

use super::executor::ResponseHead;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cookie::Cookie;
use http_body_util::Full;
use hyper::header::{HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, SET_COOKIE, TRANSFER_ENCODING};
use hyper::{HeaderMap, Response, StatusCode};
use std::fmt;
use tracing::warn;

/// Cookie `SameSite` policy. `Unset` means the attribute was absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
    Unset,
}

impl SameSite {
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            SameSite::Strict => Some("Strict"),
            SameSite::Lax => Some("Lax"),
            SameSite::None => Some("None"),
            SameSite::Unset => None,
        }
    }
}

impl From<Option<cookie::SameSite>> for SameSite {
    fn from(value: Option<cookie::SameSite>) -> Self {
        match value {
            Some(cookie::SameSite::Strict) => SameSite::Strict,
            Some(cookie::SameSite::Lax) => SameSite::Lax,
            Some(cookie::SameSite::None) => SameSite::None,
            None => SameSite::Unset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    /// Seconds
    pub max_age: Option<i64>,
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl From<&Cookie<'_>> for CookieRecord {
    fn from(cookie: &Cookie<'_>) -> Self {
        CookieRecord {
            name: cookie.name().to_string(),
            value: cookie.value().to_string(),
            path: cookie.path().map(str::to_string),
            domain: cookie.domain().map(str::to_string),
            max_age: cookie.max_age().map(|age| age.whole_seconds()),
            expires: cookie
                .expires_datetime()
                .and_then(|at| DateTime::from_timestamp(at.unix_timestamp(), 0)),
            secure: cookie.secure().unwrap_or(false),
            http_only: cookie.http_only().unwrap_or(false),
            same_site: SameSite::from(cookie.same_site()),
        }
    }
}

/// Serialises as a `Set-Cookie` header value.
impl fmt::Display for CookieRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(path) = &self.path {
            write!(f, "; Path={}", path)?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={}", domain)?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age.max(0))?;
        }
        if let Some(expires) = &self.expires {
            write!(f, "; Expires={}", expires.format("%a, %d %b %Y %H:%M:%S GMT"))?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(same_site) = self.same_site.as_str() {
            write!(f, "; SameSite={}", same_site)?;
        }
        Ok(())
    }
}

/// Response handed back to the caller.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub status: StatusCode,
    /// One value per name
    pub headers: HeaderMap,
    pub cookies: Vec<CookieRecord>,
    pub body: Bytes,
}

/// Headers describing the target's framing or carried as cookie records.
fn is_dropped_header(name: &HeaderName) -> bool {
    name == CONTENT_LENGTH
        || name == CONTENT_ENCODING
        || name == TRANSFER_ENCODING
        || name == SET_COOKIE
}

pub fn translate(head: ResponseHead, body: Bytes) -> ResponseEnvelope {
    let mut headers = HeaderMap::with_capacity(head.headers.keys_len());
    for (name, value) in head.headers.iter() {
        if is_dropped_header(name) {
            continue;
        }
        // Last occurrence wins.
        headers.insert(name.clone(), value.clone());
    }

    let cookies = head.cookies.iter().map(CookieRecord::from).collect();

    ResponseEnvelope {
        status: head.status,
        headers,
        cookies,
        body,
    }
}

impl ResponseEnvelope {
    /// Replace status, headers and body of `response` with this envelope.
    ///
    /// Headers already on `response` are cleared first.
    pub fn apply_to(self, response: &mut Response<Full<Bytes>>) {
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.clear();
        headers.extend(self.headers);
        for cookie in &self.cookies {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(_) => warn!("Dropping cookie '{}' with unencodable value", cookie.name),
            }
        }

        *response.body_mut() = Full::new(self.body);
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::new()));
        self.apply_to(&mut response);
        response
    }
}
