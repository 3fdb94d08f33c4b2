//! Peer identity resolution for TLS connections.
//!
//! The resolver only labels connections. It does no chain or validity
//! checking; that is not an authorization control.

use crate::domain::PeerIdentity;
use rustls::pki_types::CertificateDer;
use tracing::debug;
use x509_parser::parse_x509_certificate;

pub const DEFAULT_PEER_NAME: &str = "unknown";

/// Derives a display name for the remote end of a TLS connection.
///
/// Called once per connection when the handshake completes; the result is
/// kept for the connection's lifetime.
pub trait PeerIdentityResolver: Send + Sync {
    fn resolve(&self, certificates: &[CertificateDer<'_>], fallback: &PeerIdentity) -> PeerIdentity;
}

/// Uses the subject common name of the leaf certificate, or the fallback
/// when there is no certificate or no readable CN.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommonNameResolver;

impl CommonNameResolver {
    pub fn new() -> Self {
        Self
    }

    fn common_name(certificate: &CertificateDer<'_>) -> Option<String> {
        let (_, parsed) = match parse_x509_certificate(certificate.as_ref()) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, "Peer certificate is not valid DER");
                return None;
            }
        };
        let cn = parsed
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::trim)
            .filter(|cn| !cn.is_empty())?;
        Some(cn.to_string())
    }
}

impl PeerIdentityResolver for CommonNameResolver {
    fn resolve(&self, certificates: &[CertificateDer<'_>], fallback: &PeerIdentity) -> PeerIdentity {
        certificates
            .first()
            .and_then(Self::common_name)
            .map(PeerIdentity::new)
            .unwrap_or_else(|| fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    fn certificate(common_name: Option<&str>) -> CertificateDer<'static> {
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params.distinguished_name = DistinguishedName::new();
        if let Some(cn) = common_name {
            params.distinguished_name.push(DnType::CommonName, cn);
        }
        params.distinguished_name.push(DnType::OrganizationName, "Acme");
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().clone()
    }

    #[test]
    fn test_resolves_leaf_common_name() {
        let leaf = certificate(Some("gateway-01"));
        let issuer = certificate(Some("intermediate"));
        let peer = CommonNameResolver.resolve(&[leaf, issuer], &PeerIdentity::new("fallback"));
        assert_eq!(peer.display_name(), "gateway-01");
    }

    #[test]
    fn test_no_certificate_uses_fallback() {
        let peer = CommonNameResolver.resolve(&[], &PeerIdentity::new("edge-router"));
        assert_eq!(peer.display_name(), "edge-router");
    }

    #[test]
    fn test_certificate_without_cn_uses_fallback() {
        let fallback = PeerIdentity::new(DEFAULT_PEER_NAME);
        let peer = CommonNameResolver::new().resolve(&[certificate(None)], &fallback);
        assert_eq!(peer, fallback);
    }

    #[test]
    fn test_garbage_der_uses_fallback() {
        let garbage = CertificateDer::from(vec![0x30, 0x03, 0x01, 0x02]);
        let peer = CommonNameResolver.resolve(&[garbage], &PeerIdentity::new("fallback"));
        assert_eq!(peer.display_name(), "fallback");
    }
}
