//! Domain layer for syslog-ingest.
//!
//! Contains the canonical types shared across all modules:
//! - `LogEntry`: one parsed syslog message plus receipt metadata
//! - `Fields` / `FieldValue`: the ordered field mapping produced by parsing
//! - `PeerIdentity`: display name attributed to the remote endpoint
//! - `IngestError`: top-level error taxonomy

pub mod error;
pub mod field_value;
pub mod log_entry;
pub mod peer_identity;

pub use error::IngestError;
pub use field_value::FieldValue;
pub use log_entry::{Fields, LogEntry};
pub use peer_identity::PeerIdentity;
