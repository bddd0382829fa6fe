//! Listener and forward endpoint configuration.

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_FORWARD_PATH: &str = "/tls/forward";
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// TLS configuration for an HTTPS listener
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to TLS certificate file (PEM format)
    pub cert_path: String,
    /// Path to TLS private key file (PEM format)
    pub key_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Serve HTTPS instead of plain HTTP when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: None,
        }
    }
}

impl ListenConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ForwardConfig {
    /// Path of the forward endpoint
    #[serde(default = "default_forward_path")]
    pub path: String,
    /// Largest inbound body accepted
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_forward_path() -> String {
    DEFAULT_FORWARD_PATH.to_string()
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            path: default_forward_path(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}
