//! BSD syslog (RFC 3164) message parser.

use super::registry::FormatVariant;
use super::{MessageParser, ParseError, decode_utf8, insert_priority, split_priority};
use crate::domain::{FieldValue, Fields};
use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, TimeZone};
use regex::Regex;
use std::sync::LazyLock;

static HEADER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(?P<ts>[A-Z][a-z]{2} [ 0-9]?\d \d{2}:\d{2}:\d{2}) (?P<host>\S+) ?(?P<rest>.*)$")
        .expect("RFC3164 header pattern is valid")
});

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(?P<tag>[^:\[\s]{1,32})(?:\[[^\]]*\])?: ?(?P<content>.*)$")
        .expect("RFC3164 tag pattern is valid")
});

/// Parser for RFC 3164 messages: `<PRI>Mmm dd hh:mm:ss HOST TAG: CONTENT`.
///
/// A missing header is tolerated (many devices omit it); the timestamp then
/// falls back to the local receive time and the hostname to `-`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rfc3164Parser;

impl Rfc3164Parser {
    pub fn new() -> Self {
        Self
    }

    fn parse_timestamp(raw: &str, now: DateTime<Local>) -> Result<DateTime<FixedOffset>, ParseError> {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let with_year = format!("{} {normalized}", now.year());
        let naive = NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M:%S")
            .map_err(|_| ParseError::InvalidTimestamp(raw.to_string()))?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|ts| ts.fixed_offset())
            .ok_or_else(|| ParseError::InvalidTimestamp(raw.to_string()))
    }
}

impl MessageParser for Rfc3164Parser {
    fn variant(&self) -> FormatVariant {
        FormatVariant::Rfc3164
    }

    fn parse(&self, message: &[u8]) -> Result<Fields, ParseError> {
        let text = decode_utf8(message)?;
        let (priority, rest) = split_priority(text)?;

        let mut fields = Fields::with_capacity(8);
        insert_priority(&mut fields, priority);

        let body = match HEADER_PATTERN.captures(rest) {
            Some(captures) => {
                let ts = Self::parse_timestamp(&captures["ts"], Local::now())?;
                fields.insert("timestamp", FieldValue::Timestamp(ts));
                fields.insert("hostname", &captures["host"]);
                captures.name("rest").map_or("", |m| m.as_str())
            }
            None => {
                fields.insert("timestamp", FieldValue::Timestamp(Local::now().fixed_offset()));
                fields.insert("hostname", "-");
                rest
            }
        };

        match TAG_PATTERN.captures(body) {
            Some(captures) => {
                fields.insert("tag", &captures["tag"]);
                fields.insert("content", &captures["content"]);
            }
            None => {
                fields.insert("tag", "");
                fields.insert("content", body);
            }
        }

        Ok(fields)
    }
}
