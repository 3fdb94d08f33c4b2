#![allow(dead_code)]

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use syslog_ingest::app::{RunningService, ServiceConfig, ServiceManager};
use syslog_ingest::sink::DELIMITER_WIDTH;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

pub fn free_tcp_port() -> i64 {
    let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    i64::from(socket.local_addr().unwrap().port())
}

pub fn free_udp_port() -> i64 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    i64::from(socket.local_addr().unwrap().port())
}

/// Loopback config writing into `dir`, with no listeners configured.
pub fn base_config(dir: &TempDir) -> ServiceConfig {
    ServiceConfig {
        host: "127.0.0.1".to_string(),
        log_dir: dir.path().to_path_buf(),
        drain_timeout_secs: 2,
        ..ServiceConfig::default()
    }
}

pub async fn start(config: ServiceConfig) -> RunningService {
    let mut manager = ServiceManager::new(config).unwrap();
    manager.start().await.unwrap()
}

/// Wait until the pipeline has accepted `count` entries.
pub async fn wait_for_enqueued(service: &RunningService, count: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while service.pipeline_stats().enqueued < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "only {} of {count} entries enqueued",
            service.pipeline_stats().enqueued
        )
    });
}

/// One persisted record: its field lines in file order.
#[derive(Debug)]
pub struct Block {
    pub stamp: String,
    pub fields: Vec<(String, String)>,
}

impl Block {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn count(&self, name: &str) -> usize {
        self.fields.iter().filter(|(field, _)| field == name).count()
    }
}

/// Split a session log into the start line and its delimited blocks.
pub fn read_blocks(path: &Path) -> (String, Vec<Block>) {
    let contents = std::fs::read_to_string(path).unwrap();
    assert!(contents.ends_with("\r\n"), "log must end with CRLF");
    assert!(!contents.replace("\r\n", "").contains('\n'), "bare LF in log");

    let delimiter = "=".repeat(DELIMITER_WIDTH);
    let mut lines = contents.split_terminator("\r\n");
    let start = lines.next().unwrap().to_string();

    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;
    for line in lines {
        if line == delimiter {
            match current.take() {
                Some(block) => blocks.push(block),
                None => {
                    current = Some(Block {
                        stamp: String::new(),
                        fields: Vec::new(),
                    });
                }
            }
            continue;
        }
        let block = current.as_mut().expect("field line outside a block");
        let (stamp, rest) = line.split_at(19);
        let (name, value) = rest[1..].split_once(':').unwrap();
        block.stamp = stamp.to_string();
        block.fields.push((name.to_string(), value.to_string()));
    }
    assert!(current.is_none(), "unterminated block");
    (start, blocks)
}

pub fn session_log(dir: &TempDir) -> PathBuf {
    let mut logs: Vec<PathBuf> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "log"))
        .collect();
    assert_eq!(logs.len(), 1, "expected exactly one session log");
    logs.remove(0)
}

/// Self-signed certificate and its key.
pub struct TestCert {
    pub der: CertificateDer<'static>,
    pub cert_pem: String,
    pub key: KeyPair,
}

impl TestCert {
    pub fn generate(common_name: &str) -> Self {
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, common_name);
        params.distinguished_name = name;
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Self {
            der: cert.der().clone(),
            cert_pem: cert.pem(),
            key,
        }
    }

    /// Write `cert.pem` and `key.pem` into `dir`.
    pub fn write_pem(&self, dir: &Path) -> (PathBuf, PathBuf) {
        let cert_path = dir.join("cert.pem");
        let key_path = dir.join("key.pem");
        std::fs::write(&cert_path, &self.cert_pem).unwrap();
        std::fs::write(&key_path, self.key.serialize_pem()).unwrap();
        (cert_path, key_path)
    }

    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key.serialize_der()))
    }
}

/// Client-side verifier that trusts any server certificate.
#[derive(Debug)]
struct TrustAnyServer(Arc<CryptoProvider>);

impl ServerCertVerifier for TrustAnyServer {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Connect over TLS, optionally presenting `client_cert`.
pub async fn tls_connect(port: u16, client_cert: Option<&TestCert>) -> TlsStream<TcpStream> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .unwrap()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(TrustAnyServer(provider)));
    let config = match client_cert {
        Some(cert) => builder
            .with_client_auth_cert(vec![cert.der.clone()], cert.private_key())
            .unwrap(),
        None => builder.with_no_client_auth(),
    };

    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    TlsConnector::from(Arc::new(config))
        .connect(ServerName::try_from("localhost").unwrap(), stream)
        .await
        .unwrap()
}
