//! Network listeners.
//!
//! Each configured listener walks `Configured -> Bound -> Accepting -> Closed`.
//! A listener that cannot bind (bad port, bad TLS material, address in use)
//! is reported and skipped; the others still start.

pub mod ingest;
pub mod manager;
pub mod tcp;
pub mod tls;
pub mod udp;

pub use ingest::{ConnectionMeta, IngestContext};
pub use manager::{BoundListener, ListenerFailure, ListenerManager, StartReport};
pub use tls::{AcceptAnyClientCert, load_server_config};

use crate::domain::PeerIdentity;
use crate::parser::SyslogFormat;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Tcp,
    Udp,
    Tls,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
            Transport::Tls => "tls",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Configured,
    Bound,
    Accepting,
    Closed,
}

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("{transport} port {port} is outside 1-65535")]
    InvalidPort { transport: Transport, port: i64 },

    #[error("failed to load TLS key material: {0}")]
    CertificateLoad(String),

    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("TLS handshake with {client} failed: {source}")]
    Failed {
        client: String,
        #[source]
        source: io::Error,
    },

    #[error("TLS handshake with {client} timed out")]
    TimedOut { client: String },
}

/// Settings for one listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub transport: Transport,
    pub bind_host: String,
    /// Kept wide so out-of-range values surface as `InvalidPort`.
    pub port: i64,
    pub format: SyslogFormat,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub fallback_peer: PeerIdentity,
    pub max_message_size: usize,
}

impl ListenerConfig {
    pub fn new(transport: Transport, bind_host: impl Into<String>, port: i64, format: SyslogFormat) -> Self {
        Self {
            transport,
            bind_host: bind_host.into(),
            port,
            format,
            cert_path: None,
            key_path: None,
            fallback_peer: PeerIdentity::new(crate::peer::DEFAULT_PEER_NAME),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_tls_material(mut self, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        self.cert_path = Some(cert_path.into());
        self.key_path = Some(key_path.into());
        self
    }

    pub fn with_fallback_peer(mut self, name: impl Into<String>) -> Self {
        self.fallback_peer = PeerIdentity::new(name);
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn validate_port(&self) -> Result<u16, ListenerError> {
        u16::try_from(self.port)
            .ok()
            .filter(|port| *port != 0)
            .ok_or(ListenerError::InvalidPort {
                transport: self.transport,
                port: self.port,
            })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8192;

/// Some accept errors only affect the connection being accepted.
pub(crate) fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}
