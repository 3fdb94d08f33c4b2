use crate::app::ConfigError;
use crate::listener::{HandshakeError, ListenerError};
use crate::parser::ParseError;
use crate::pipeline::PipelineError;
use crate::sink::PersistenceError;
use thiserror::Error;

/// Top-level error taxonomy for the ingestion service.
///
/// Per-message and per-connection errors are contained where they occur;
/// per-listener errors disable one listener; only configuration and
/// persistence failures stop the process.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("TLS handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl IngestError {
    /// Component the error originated from, for operational logging.
    pub fn component(&self) -> &'static str {
        match self {
            IngestError::Config(_) => "config",
            IngestError::Listener(_) => "listener",
            IngestError::Parse(_) => "parser",
            IngestError::Handshake(_) => "tls",
            IngestError::Pipeline(_) => "pipeline",
            IngestError::Persistence(_) => "sink",
        }
    }
}
