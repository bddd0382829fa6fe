//! Header emission ordering.

use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_LENGTH, HOST};
use hyper::HeaderMap;
use reqwest::Url;
use std::collections::HashSet;

/// `host[:port]`, with the port only when it differs from the scheme default.
pub fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Origin-form request target: path plus query.
pub fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Materialise the headers the HTTP/1.1 transport would otherwise append on
/// its own, so an order list naming them decides where they go.
///
/// Only names present in `order` and absent from `headers` are added:
/// `host` from the target URL, `accept` as `*/*` and `content-length` from
/// the body when there is one.
pub fn insert_transport_headers(
    headers: &mut HeaderMap,
    order: &[String],
    url: &Url,
    body: Option<&Bytes>,
) {
    let listed = |name: &HeaderName| order.iter().any(|raw| name.as_str().eq_ignore_ascii_case(raw));

    if listed(&HOST) && !headers.contains_key(HOST) {
        if let Ok(value) = HeaderValue::from_str(&authority(url)) {
            headers.insert(HOST, value);
        }
    }
    if listed(&ACCEPT) && !headers.contains_key(ACCEPT) {
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    }
    if let Some(body) = body {
        if listed(&CONTENT_LENGTH) && !headers.contains_key(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }
    }
}

/// Rebuild `headers` so names listed in `order` come first, in that order.
///
/// Names in `order` that are absent from `headers` are skipped. Headers not
/// mentioned keep their relative order and follow the ordered block. All values
/// of a multi-valued header stay together. Matching is case-insensitive.
pub fn apply_header_order(headers: &HeaderMap, order: &[String]) -> HeaderMap {
    let mut ordered = HeaderMap::with_capacity(headers.len());
    let mut placed: HashSet<HeaderName> = HashSet::with_capacity(order.len());

    for raw in order {
        // Pseudo-headers and malformed names never appear in the map.
        let Ok(name) = HeaderName::from_bytes(raw.as_bytes()) else {
            continue;
        };
        if placed.contains(&name) || !headers.contains_key(&name) {
            continue;
        }
        for value in headers.get_all(&name) {
            ordered.append(name.clone(), value.clone());
        }
        placed.insert(name);
    }

    for (name, value) in headers.iter() {
        if !placed.contains(name) {
            ordered.append(name.clone(), value.clone());
        }
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn names(headers: &HeaderMap) -> Vec<&str> {
        headers.keys().map(HeaderName::as_str).collect()
    }

    fn order(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_listed_names_emitted_first_in_order() {
        let mut headers = HeaderMap::new();
        headers.insert("x-extra", HeaderValue::from_static("1"));
        headers.insert("user-agent", HeaderValue::from_static("ua"));
        headers.insert("accept", HeaderValue::from_static("*/*"));
        headers.insert("accept-language", HeaderValue::from_static("en"));

        let ordered = apply_header_order(&headers, &order(&["accept", "user-agent"]));
        assert_eq!(
            names(&ordered),
            vec!["accept", "user-agent", "x-extra", "accept-language"]
        );
    }

    #[test]
    fn test_order_independent_of_insertion_order() {
        let wanted = order(&["sec-ch-ua", "user-agent", "accept", "cookie"]);

        let mut forward = HeaderMap::new();
        for name in ["sec-ch-ua", "user-agent", "accept", "cookie"] {
            forward.insert(HeaderName::from_static(name), HeaderValue::from_static("v"));
        }
        let mut reverse = HeaderMap::new();
        for name in ["cookie", "accept", "user-agent", "sec-ch-ua"] {
            reverse.insert(HeaderName::from_static(name), HeaderValue::from_static("v"));
        }

        let a = apply_header_order(&forward, &wanted);
        let b = apply_header_order(&reverse, &wanted);
        assert_eq!(names(&a), names(&b));
        assert_eq!(names(&a), vec!["sec-ch-ua", "user-agent", "accept", "cookie"]);
    }

    #[test]
    fn test_transport_headers_take_listed_position() {
        let url = Url::parse("http://127.0.0.1:8081/api").unwrap();
        let wanted = order(&["host", "accept", "user-agent", "content-length"]);
        let body = Bytes::from_static(b"{}");

        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("ua"));
        headers.insert("x-extra", HeaderValue::from_static("1"));
        insert_transport_headers(&mut headers, &wanted, &url, Some(&body));

        let ordered = apply_header_order(&headers, &wanted);
        assert_eq!(
            names(&ordered),
            vec!["host", "accept", "user-agent", "content-length", "x-extra"]
        );
        assert_eq!(ordered["host"], "127.0.0.1:8081");
        assert_eq!(ordered["accept"], "*/*");
        assert_eq!(ordered["content-length"], "2");
    }

    #[test]
    fn test_transport_headers_only_when_listed_and_absent() {
        let url = Url::parse("https://example.test:443/").unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("text/html"));
        insert_transport_headers(&mut headers, &order(&["Host", "accept"]), &url, None);
        assert_eq!(headers["host"], "example.test");
        assert_eq!(headers["accept"], "text/html");

        let mut headers = HeaderMap::new();
        insert_transport_headers(&mut headers, &order(&["content-length"]), &url, None);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_unknown_and_pseudo_names_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("*/*"));

        let ordered = apply_header_order(
            &headers,
            &order(&[":method", "host", "accept", "Accept", "bad name"]),
        );
        assert_eq!(names(&ordered), vec!["accept"]);
        assert_eq!(ordered.len(), 1);
    }

    #[test]
    fn test_case_insensitive_match() {
        let mut headers = HeaderMap::new();
        headers.insert("x-first", HeaderValue::from_static("1"));
        headers.insert("user-agent", HeaderValue::from_static("ua"));

        let ordered = apply_header_order(&headers, &order(&["User-Agent"]));
        assert_eq!(names(&ordered), vec!["user-agent", "x-first"]);
    }

    #[test]
    fn test_multi_values_kept_together() {
        let mut headers = HeaderMap::new();
        headers.append("cookie", HeaderValue::from_static("a=1"));
        headers.append("accept", HeaderValue::from_static("*/*"));
        headers.append("cookie", HeaderValue::from_static("b=2"));

        let ordered = apply_header_order(&headers, &order(&["accept", "cookie"]));
        let values: Vec<_> = ordered.get_all("cookie").iter().collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
        assert_eq!(names(&ordered), vec!["accept", "cookie"]);
        assert_eq!(ordered.len(), 3);
    }
}
