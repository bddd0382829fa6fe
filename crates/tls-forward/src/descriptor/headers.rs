//! Control header names.
//!
//! Every control header lives under the `x-tls-` namespace. Static names avoid
//! runtime parsing at each lookup.

use hyper::header::HeaderName;

/// Reserved prefix; matching headers are never forwarded.
pub const CONTROL_PREFIX: &str = "x-tls-";

pub static X_TLS_URL: HeaderName = HeaderName::from_static("x-tls-url");
pub static X_TLS_METHOD: HeaderName = HeaderName::from_static("x-tls-method");
pub static X_TLS_PROXY: HeaderName = HeaderName::from_static("x-tls-proxy");
pub static X_TLS_PROFILE: HeaderName = HeaderName::from_static("x-tls-profile");
pub static X_TLS_CLIENT_TIMEOUT: HeaderName = HeaderName::from_static("x-tls-client-timeout");
pub static X_TLS_FOLLOW_REDIRECTS: HeaderName = HeaderName::from_static("x-tls-follow-redirects");
pub static X_TLS_FORCE_HTTP1: HeaderName = HeaderName::from_static("x-tls-force-http1");
pub static X_TLS_INSECURE_SKIP_VERIFY: HeaderName =
    HeaderName::from_static("x-tls-insecure-skip-verify");
pub static X_TLS_WITH_RANDOM_EXTENSION_ORDER: HeaderName =
    HeaderName::from_static("x-tls-with-random-extension-order");
pub static X_TLS_HEADER_ORDER: HeaderName = HeaderName::from_static("x-tls-header-order");
pub static X_TLS_PSEUDO_HEADER_ORDER: HeaderName =
    HeaderName::from_static("x-tls-pseudo-header-order");

/// Whether a header belongs to the control namespace.
///
/// `HeaderName` is stored lowercase, so the check is case-insensitive with
/// respect to what the caller sent.
pub fn is_control_header(name: &HeaderName) -> bool {
    name.as_str().starts_with(CONTROL_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_header_names() {
        assert_eq!(X_TLS_URL.as_str(), "x-tls-url");
        assert_eq!(X_TLS_PSEUDO_HEADER_ORDER.as_str(), "x-tls-pseudo-header-order");
        assert_eq!(
            X_TLS_WITH_RANDOM_EXTENSION_ORDER.as_str(),
            "x-tls-with-random-extension-order"
        );
    }

    #[test]
    fn test_control_header_detection_ignores_case() {
        let upper = HeaderName::from_bytes(b"X-TLS-Url").unwrap();
        assert!(is_control_header(&upper));
        assert!(is_control_header(&X_TLS_PROFILE));

        let plain = HeaderName::from_static("x-tlsfoo");
        assert!(!is_control_header(&plain));
        let accept = HeaderName::from_static("accept");
        assert!(!is_control_header(&accept));
    }
}
