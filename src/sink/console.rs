use super::block::{delimiter, escape_value};
use crate::domain::LogEntry;
use tracing::info;

/// Tracing target for mirrored entries, so they can be filtered apart from
/// the service's own diagnostics.
pub const ENTRY_TARGET: &str = "syslog_ingest::entry";

/// Mirrors persisted entries onto the operational log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleMirror;

impl ConsoleMirror {
    pub fn mirror(&self, entry: &LogEntry) {
        let delimiter = delimiter();
        let peer = entry.peer().unwrap_or("-");
        info!(target: ENTRY_TARGET, peer, "{delimiter}");
        for (name, value) in entry.fields().iter() {
            let value = value.to_string();
            info!(target: ENTRY_TARGET, peer, "{name}:{}", escape_value(&value));
        }
        info!(target: ENTRY_TARGET, peer, "{delimiter}");
    }
}
