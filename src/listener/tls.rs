//! TLS server configuration.
//!
//! Clients are asked for a certificate but not required to present one.
//! Any presented chain is accepted: the certificate is used to name the
//! peer, not to authenticate it. Handshake signatures are still verified
//! so the peer must hold the key for the certificate it sends.

use super::ListenerError;
use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, ServerConfig, SignatureScheme};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
pub struct AcceptAnyClientCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyClientCert {
    pub fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ClientCertVerifier for AcceptAnyClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

async fn read_pem(path: &Path, what: &str) -> Result<Vec<u8>, ListenerError> {
    tokio::fs::read(path).await.map_err(|e| {
        ListenerError::CertificateLoad(format!("cannot read {what} {}: {e}", path.display()))
    })
}

pub async fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, ListenerError> {
    let pem = read_pem(path, "certificate").await?;
    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            ListenerError::CertificateLoad(format!("invalid certificate PEM {}: {e}", path.display()))
        })?;
    if certs.is_empty() {
        return Err(ListenerError::CertificateLoad(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

pub async fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ListenerError> {
    let pem = read_pem(path, "private key").await?;
    rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|e| ListenerError::CertificateLoad(format!("invalid key PEM {}: {e}", path.display())))?
        .ok_or_else(|| ListenerError::CertificateLoad(format!("no private key found in {}", path.display())))
}

/// Build the server configuration from a PEM certificate chain and key.
pub async fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, ListenerError> {
    let certs = load_certificates(cert_path).await?;
    let key = load_private_key(key_path).await?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let verifier = Arc::new(AcceptAnyClientCert::new(&provider));
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ListenerError::CertificateLoad(format!("unsupported TLS protocol set: {e}")))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| ListenerError::CertificateLoad(format!("rejected certificate or key: {e}")))?;
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, KeyPair};
    use tempfile::TempDir;

    fn write_pair(dir: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        let cert_path = dir.path().join("server.crt");
        let key_path = dir.path().join("server.key");
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key.serialize_pem()).unwrap();
        (cert_path, key_path)
    }

    #[tokio::test]
    async fn test_load_server_config() {
        let dir = TempDir::new().unwrap();
        let (cert_path, key_path) = write_pair(&dir);
        assert!(load_server_config(&cert_path, &key_path).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_files_are_certificate_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.pem");
        let err = load_server_config(&missing, &missing).await.unwrap_err();
        assert!(matches!(err, ListenerError::CertificateLoad(_)));
    }

    #[tokio::test]
    async fn test_empty_certificate_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (_, key_path) = write_pair(&dir);
        let empty = dir.path().join("empty.crt");
        std::fs::write(&empty, "").unwrap();

        let err = load_server_config(&empty, &key_path).await.unwrap_err();
        assert!(err.to_string().contains("no certificates"));
    }

    #[test]
    fn test_verifier_requests_but_does_not_require_certs() {
        let verifier = AcceptAnyClientCert::new(&rustls::crypto::aws_lc_rs::default_provider());
        assert!(verifier.offer_client_auth());
        assert!(!verifier.client_auth_mandatory());
        assert!(!verifier.supported_verify_schemes().is_empty());
    }
}
