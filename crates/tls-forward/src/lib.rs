//! Forwarding proxy that replays a caller-described request with a chosen
//! TLS/HTTP client fingerprint and mirrors the target's response back.

pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod forward;
pub mod metrics;
pub mod profile;
pub mod server;

pub use config::Config;
pub use error::{ForwardError, ValidationError};
pub use forward::Forwarder;
pub use server::ForwardServer;
