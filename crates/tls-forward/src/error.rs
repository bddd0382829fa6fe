//! Error taxonomy for the forwarding pipeline.
//!
//! Every stage fails fast with one of these variants. Only validation errors
//! carry caller-visible detail; the rest are logged and reported generically.

use thiserror::Error;

/// A malformed, missing or unknown control header value.
///
/// The message always names the offending control header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no {0}")]
    Missing(&'static str),
    #[error("invalid {field}: {value}")]
    Invalid { field: &'static str, value: String },
}

impl ValidationError {
    pub fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        ValidationError::Invalid {
            field,
            value: value.into(),
        }
    }

    /// Control header that caused the failure.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Missing(field) => field,
            ValidationError::Invalid { field, .. } => field,
        }
    }
}

/// Any failure that aborts a forward.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to build client: {0}")]
    Factory(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to decode {encoding} body: {source}")]
    Decode {
        encoding: String,
        #[source]
        source: std::io::Error,
    },
}

impl ForwardError {
    pub fn factory(err: impl std::fmt::Display) -> Self {
        ForwardError::Factory(err.to_string())
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        ForwardError::Transport(err.to_string())
    }

    /// Message returned to the caller. Transport, factory and decode details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ForwardError::Validation(err) => format!("error while extracting tls data: {err}"),
            ForwardError::Factory(_) => "error while building client".to_string(),
            ForwardError::Transport(_) => "error while doing request".to_string(),
            ForwardError::Decode { .. } => "error while decoding response body".to_string(),
        }
    }

    /// Offending control header, for validation failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ForwardError::Validation(err) => Some(err.field()),
            _ => None,
        }
    }

    /// Label used for the outcome metric.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Validation(_) => "validation",
            ForwardError::Factory(_) => "factory",
            ForwardError::Transport(_) => "transport",
            ForwardError::Decode { .. } => "decode",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_field() {
        let err = ForwardError::from(ValidationError::Missing("x-tls-url"));
        assert_eq!(
            err.public_message(),
            "error while extracting tls data: no x-tls-url"
        );

        let err = ForwardError::from(ValidationError::invalid("x-tls-method", "FETCH"));
        assert_eq!(
            err.public_message(),
            "error while extracting tls data: invalid x-tls-method: FETCH"
        );
    }

    #[test]
    fn test_transport_detail_not_leaked() {
        let err = ForwardError::transport("dns error: no such host upstream.internal");
        assert_eq!(err.public_message(), "error while doing request");
        assert!(err.to_string().contains("upstream.internal"));
    }

    #[test]
    fn test_decode_detail_not_leaked() {
        let err = ForwardError::Decode {
            encoding: "gzip".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "bad header"),
        };
        assert_eq!(err.public_message(), "error while decoding response body");
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn test_field_accessor() {
        assert_eq!(ValidationError::Missing("x-tls-profile").field(), "x-tls-profile");
        assert_eq!(
            ValidationError::invalid("x-tls-proxy", "a:b:c").field(),
            "x-tls-proxy"
        );

        let err = ForwardError::from(ValidationError::Missing("x-tls-url"));
        assert_eq!(err.field(), Some("x-tls-url"));
        assert_eq!(ForwardError::transport("reset").field(), None);
    }
}
