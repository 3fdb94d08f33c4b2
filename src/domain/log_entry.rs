use super::field_value::FieldValue;
use super::peer_identity::PeerIdentity;
use chrono::{DateTime, Local};

/// Field name carrying the receipt timestamp.
pub const RECEIVED_AT_FIELD: &str = "received_at";
/// Field name carrying the peer identity.
pub const PEER_FIELD: &str = "peer";
/// Field name carrying the remote socket address.
pub const CLIENT_FIELD: &str = "client";
/// Field name carrying the transport the entry arrived on.
pub const TRANSPORT_FIELD: &str = "transport";

/// Ordered mapping from field name to value, as produced by a parser.
///
/// Insertion order is preserved. Inserting an existing name replaces the
/// value in place, so every name appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    entries: Vec<(String, FieldValue)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One parsed syslog message plus receipt metadata.
///
/// This is the unit that travels through the ingestion pipeline and is
/// persisted by the sink. The receipt timestamp is assigned at ingestion,
/// not at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    fields: Fields,
    received_at: DateTime<Local>,
}

impl LogEntry {
    pub fn new(fields: Fields, received_at: DateTime<Local>) -> Self {
        Self {
            fields,
            received_at,
        }
    }

    /// Build an entry from parser output, merging in ingestion metadata.
    pub fn ingest(
        mut fields: Fields,
        received_at: DateTime<Local>,
        peer: &PeerIdentity,
        client: &str,
        transport: &str,
    ) -> Self {
        fields.insert(RECEIVED_AT_FIELD, FieldValue::Timestamp(received_at.fixed_offset()));
        fields.insert(PEER_FIELD, peer.display_name());
        fields.insert(CLIENT_FIELD, client);
        fields.insert(TRANSPORT_FIELD, transport);
        Self::new(fields, received_at)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn received_at(&self) -> DateTime<Local> {
        self.received_at
    }

    pub fn peer(&self) -> Option<&str> {
        self.fields.get(PEER_FIELD).and_then(FieldValue::as_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_preserve_insertion_order() {
        let mut fields = Fields::new();
        fields.insert("priority", 34_i64);
        fields.insert("hostname", "mymachine");
        fields.insert("tag", "su");

        let names: Vec<&str> = fields.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["priority", "hostname", "tag"]);
    }

    #[test]
    fn test_fields_insert_replaces_in_place() {
        let mut fields = Fields::new();
        fields.insert("a", "1");
        fields.insert("b", "2");
        fields.insert("a", "3");

        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("a"), Some(&FieldValue::from("3")));
        assert_eq!(fields.iter().next().map(|(name, _)| name), Some("a"));
    }

    #[test]
    fn test_ingest_merges_metadata() {
        let mut fields = Fields::new();
        fields.insert("content", "hello");

        let now = Local::now();
        let entry = LogEntry::ingest(
            fields,
            now,
            &PeerIdentity::new("unknown"),
            "127.0.0.1:40000",
            "tcp",
        );

        assert_eq!(entry.peer(), Some("unknown"));
        assert_eq!(entry.get(CLIENT_FIELD), Some(&FieldValue::from("127.0.0.1:40000")));
        assert_eq!(entry.get(TRANSPORT_FIELD), Some(&FieldValue::from("tcp")));
        assert_eq!(
            entry.get(RECEIVED_AT_FIELD),
            Some(&FieldValue::Timestamp(now.fixed_offset()))
        );
        assert_eq!(entry.fields().len(), 5);
    }

    #[test]
    fn test_ingest_overrides_parsed_peer_field() {
        let mut fields = Fields::new();
        fields.insert(PEER_FIELD, "spoofed");

        let entry = LogEntry::ingest(
            fields,
            Local::now(),
            &PeerIdentity::new("gateway-01"),
            "10.0.0.1:514",
            "udp",
        );

        assert_eq!(entry.peer(), Some("gateway-01"));
        assert_eq!(entry.fields().iter().filter(|(n, _)| *n == PEER_FIELD).count(), 1);
    }
}
