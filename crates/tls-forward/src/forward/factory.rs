//! Client factory: descriptor in, freshly configured fingerprint client out.
//!
//! Clients are never pooled or reused. Fingerprint parameters belong to a
//! single forward, so each one gets its own client.

use crate::descriptor::RequestDescriptor;
use crate::engine::{ClientOptions, FingerprintClient, FingerprintEngine};
use crate::error::ForwardError;
use std::sync::Arc;

#[derive(Clone)]
pub struct ClientFactory {
    engine: Arc<dyn FingerprintEngine>,
}

impl ClientFactory {
    pub fn new(engine: Arc<dyn FingerprintEngine>) -> Self {
        Self { engine }
    }

    /// One-to-one mapping of descriptor fields onto engine options.
    ///
    /// Engine-side decompression is always off; the response decoder owns it.
    pub fn options(descriptor: &RequestDescriptor) -> ClientOptions {
        ClientOptions {
            profile: Arc::clone(&descriptor.client_profile),
            timeout: descriptor.timeout(),
            follow_redirects: descriptor.follow_redirects,
            random_extension_order: descriptor.random_extension_order,
            force_http1: descriptor.force_http1,
            insecure_skip_verify: descriptor.insecure_skip_verify,
            proxy: descriptor.proxy.clone(),
            disable_compression: true,
        }
    }

    pub fn build(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<Box<dyn FingerprintClient>, ForwardError> {
        self.engine.build_client(&Self::options(descriptor))
    }
}
