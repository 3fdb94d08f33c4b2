use super::Transport;
use crate::domain::{Fields, IngestError, LogEntry, PeerIdentity};
use crate::parser::{ParseError, SyslogFormat};
use crate::peer::PeerIdentityResolver;
use crate::pipeline::{PipelineSender, SendOutcome};
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a listener task needs to turn bytes into pipeline entries.
#[derive(Clone)]
pub struct IngestContext {
    pub format: SyslogFormat,
    pub sender: PipelineSender,
    pub resolver: Arc<dyn PeerIdentityResolver>,
    pub fallback_peer: PeerIdentity,
    pub max_message_size: usize,
}

/// Per-connection (or per-datagram) metadata merged into every entry.
#[derive(Debug, Clone)]
pub struct ConnectionMeta {
    pub peer: PeerIdentity,
    pub client: String,
    pub transport: Transport,
}

impl IngestContext {
    /// Parse one framed message and enqueue the entry.
    ///
    /// A parse failure drops only this message. Returns `false` once the
    /// pipeline is closed and the caller should stop reading.
    pub async fn ingest(&self, meta: &ConnectionMeta, message: &[u8]) -> bool {
        let received_at = Local::now();
        self.admit(meta, received_at, self.format.parse(message)).await
    }

    /// Same as [`ingest`](Self::ingest) but for a whole UDP datagram.
    pub async fn ingest_datagram(&self, meta: &ConnectionMeta, datagram: &[u8]) -> bool {
        let received_at = Local::now();
        self.admit(meta, received_at, self.format.parse_datagram(datagram)).await
    }

    async fn admit(
        &self,
        meta: &ConnectionMeta,
        received_at: DateTime<Local>,
        parsed: Result<Fields, ParseError>,
    ) -> bool {
        match parsed {
            Ok(fields) => {
                let entry = LogEntry::ingest(
                    fields,
                    received_at,
                    &meta.peer,
                    &meta.client,
                    meta.transport.as_str(),
                );
                self.enqueue(meta, entry).await
            }
            Err(e) => {
                self.reject(meta, &e);
                true
            }
        }
    }

    pub fn reject(&self, meta: &ConnectionMeta, error: &ParseError) {
        let error = IngestError::from(error.clone());
        warn!(
            component = error.component(),
            transport = %meta.transport,
            client = %meta.client,
            peer = %meta.peer,
            format = %self.format.variant(),
            error = %error,
            "Dropping unparsable message"
        );
    }

    async fn enqueue(&self, meta: &ConnectionMeta, entry: LogEntry) -> bool {
        match self.sender.send(entry).await {
            Ok(SendOutcome::Enqueued) => true,
            Ok(outcome) => {
                debug!(
                    transport = %meta.transport,
                    client = %meta.client,
                    ?outcome,
                    "Ingestion pipeline full"
                );
                true
            }
            Err(e) => {
                debug!(transport = %meta.transport, client = %meta.client, error = %e, "Stopped enqueueing");
                false
            }
        }
    }
}
