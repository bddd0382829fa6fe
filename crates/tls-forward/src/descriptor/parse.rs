//! Value parsers for individual control headers.

use crate::error::ValidationError;
use reqwest::Url;

/// Normalise `host:port` or `host:port:user:pass` into a proxy URL.
pub fn format_proxy(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let parts: Vec<&str> = raw.split(':').collect();

    let proxy = match parts.as_slice() {
        [host, port] => format!("http://{host}:{port}"),
        [host, port, user, pass] => format!("http://{user}:{pass}@{host}:{port}"),
        _ => return Err(ValidationError::invalid(field, raw)),
    };

    Url::parse(&proxy).map_err(|_| ValidationError::invalid(field, raw))?;
    Ok(proxy)
}

/// Boolean literals accepted by the control protocol.
pub fn parse_bool(field: &'static str, raw: &str) -> Result<bool, ValidationError> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(ValidationError::invalid(field, raw)),
    }
}

/// Strictly positive whole seconds.
pub fn parse_timeout(field: &'static str, raw: &str) -> Result<u64, ValidationError> {
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ValidationError::invalid(field, raw)),
    }
}

/// Comma separated name list. Whitespace is stripped first and empty items dropped.
pub fn parse_order(field: &'static str, raw: &str) -> Result<Vec<String>, ValidationError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let items: Vec<String> = compact
        .split(',')
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();

    if items.is_empty() {
        return Err(ValidationError::invalid(field, raw));
    }
    Ok(items)
}

/// Absolute http(s) URL.
pub fn parse_target_url(field: &'static str, raw: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(raw).map_err(|_| ValidationError::invalid(field, raw))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(ValidationError::invalid(field, raw)),
    }
}
