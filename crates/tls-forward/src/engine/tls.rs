//! rustls client configuration derived from a fingerprint profile.

use crate::error::ForwardError;
use crate::profile::ClientProfile;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use lazy_static::lazy_static;
use rustls::crypto::{aws_lc_rs, ring, CryptoProvider, GetRandomFailed, SecureRandom, SupportedKxGroup};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    version, CipherSuite, DigitallySignedStruct, NamedGroup, RootCertStore, SupportedCipherSuite,
    SupportedProtocolVersion,
};
use std::sync::Arc;

pub(crate) const ALPN_H2: &[u8] = b"h2";
pub(crate) const ALPN_HTTP11: &[u8] = b"http/1.1";

/// Certificate verifier that accepts everything.
///
/// # Warning
/// Only used when a caller explicitly asks for `x-tls-insecure-skip-verify`.
#[derive(Debug)]
pub struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Cipher suites the provider implements, in the profile's preference order.
fn ordered_cipher_suites(
    profile: &ClientProfile,
    available: &[SupportedCipherSuite],
) -> Vec<SupportedCipherSuite> {
    profile
        .cipher_suites
        .iter()
        .filter_map(|code| {
            let wanted = CipherSuite::from(*code);
            available.iter().find(|suite| suite.suite() == wanted).copied()
        })
        .collect()
}

/// Groups an outbound handshake can offer: ring's, plus the hybrid
/// post-quantum share that only aws-lc-rs implements.
fn available_kx_groups() -> Vec<&'static dyn SupportedKxGroup> {
    let mut groups = ring::default_provider().kx_groups;
    groups.push(aws_lc_rs::kx_group::X25519MLKEM768);
    groups
}

/// Key exchange groups the provider implements, in the profile's preference order.
fn ordered_kx_groups(
    profile: &ClientProfile,
    available: &[&'static dyn SupportedKxGroup],
) -> Vec<&'static dyn SupportedKxGroup> {
    profile
        .kx_groups
        .iter()
        .filter_map(|code| {
            let wanted = NamedGroup::from(*code);
            available.iter().find(|group| group.name() == wanted).copied()
        })
        .collect()
}

/// Protocol versions with at least one offered suite, newest first.
fn protocol_versions(suites: &[SupportedCipherSuite]) -> Vec<&'static SupportedProtocolVersion> {
    [&version::TLS13, &version::TLS12]
        .into_iter()
        .filter(|v| suites.iter().any(|suite| suite.version().version == v.version))
        .collect()
}

lazy_static! {
    static ref RING_RANDOM: &'static dyn SecureRandom = ring::default_provider().secure_random;
}

/// rustls draws a two byte seed per handshake and shuffles the ClientHello
/// extensions with it. Every other draw is longer.
const EXTENSION_SEED_LEN: usize = 2;

/// Random source that pins the extension order seed and leaves every other
/// draw to ring.
#[derive(Debug)]
struct StableExtensionOrder;

static STABLE_EXTENSION_ORDER: StableExtensionOrder = StableExtensionOrder;

impl SecureRandom for StableExtensionOrder {
    fn fill(&self, buf: &mut [u8]) -> Result<(), GetRandomFailed> {
        if buf.len() == EXTENSION_SEED_LEN {
            buf.fill(0);
            return Ok(());
        }
        RING_RANDOM.fill(buf)
    }
}

/// Application protocols offered through ALPN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alpn {
    /// `http/1.1` only
    Http1,
    /// `h2`, then `http/1.1`
    Http2,
}

/// Build the TLS client configuration for one connection.
///
/// Codes the provider does not implement are dropped; a profile left with no
/// usable cipher suite or group is an error. Extensions are shuffled per
/// handshake when `random_extension_order` is set and sent in one stable
/// order otherwise.
pub fn build_tls_config(
    profile: &ClientProfile,
    insecure_skip_verify: bool,
    random_extension_order: bool,
    alpn: Alpn,
) -> Result<rustls::ClientConfig, ForwardError> {
    let base = ring::default_provider();

    let cipher_suites = ordered_cipher_suites(profile, &base.cipher_suites);
    if cipher_suites.is_empty() {
        return Err(ForwardError::factory(format!(
            "profile '{}' has no cipher suite supported by the TLS provider",
            profile.name
        )));
    }

    let kx_groups = ordered_kx_groups(profile, &available_kx_groups());
    if kx_groups.is_empty() {
        return Err(ForwardError::factory(format!(
            "profile '{}' has no key exchange group supported by the TLS provider",
            profile.name
        )));
    }

    let versions = protocol_versions(&cipher_suites);
    let secure_random: &'static dyn SecureRandom = if random_extension_order {
        base.secure_random
    } else {
        &STABLE_EXTENSION_ORDER
    };

    let provider = CryptoProvider {
        cipher_suites,
        kx_groups,
        secure_random,
        ..base
    };

    let builder = rustls::ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&versions)
        .map_err(ForwardError::factory)?;

    let mut config = if insecure_skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth()
    } else {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    config.alpn_protocols = match alpn {
        Alpn::Http1 => vec![ALPN_HTTP11.to_vec()],
        Alpn::Http2 => vec![ALPN_H2.to_vec(), ALPN_HTTP11.to_vec()],
    };

    Ok(config)
}
