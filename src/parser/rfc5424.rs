//! IETF syslog (RFC 5424) message parser.
//!
//! `<PRI>VERSION SP TIMESTAMP SP HOSTNAME SP APP-NAME SP PROCID SP MSGID SP SD [SP MSG]`
//!
//! Also used for the body of RFC 6587 octet-counted frames.

use super::registry::FormatVariant;
use super::{MessageParser, ParseError, decode_utf8, insert_priority, split_priority};
use crate::domain::{FieldValue, Fields};
use chrono::DateTime;

const NIL: &str = "-";
const BOM: char = '\u{feff}';

#[derive(Debug, Clone, Copy)]
pub struct Rfc5424Parser {
    variant: FormatVariant,
}

impl Default for Rfc5424Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Rfc5424Parser {
    pub fn new() -> Self {
        Self {
            variant: FormatVariant::Rfc5424,
        }
    }

    /// Parser for the message body carried inside RFC 6587 frames.
    pub fn for_rfc6587() -> Self {
        Self {
            variant: FormatVariant::Rfc6587,
        }
    }
}

/// Split the next space-delimited header token.
fn next_token<'a>(input: &'a str, name: &str) -> Result<(&'a str, &'a str), ParseError> {
    if input.is_empty() {
        return Err(ParseError::Malformed(format!("missing {name}")));
    }
    match input.split_once(' ') {
        Some((token, rest)) if !token.is_empty() => Ok((token, rest)),
        Some(_) => Err(ParseError::Malformed(format!("empty {name}"))),
        None => Ok((input, "")),
    }
}

/// Split the STRUCTURED-DATA section off the remainder of the message.
///
/// Handles quoted parameter values containing `]` and escaped quotes.
fn split_structured_data(input: &str) -> Result<(&str, &str), ParseError> {
    if let Some(rest) = input.strip_prefix(NIL) {
        return Ok((NIL, rest));
    }
    if !input.starts_with('[') {
        return Err(ParseError::Malformed("invalid structured data".to_string()));
    }

    let bytes = input.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() && bytes[pos] == b'[' {
        let mut in_quotes = false;
        let mut escaped = false;
        let mut closed = false;
        pos += 1;
        while pos < bytes.len() {
            let byte = bytes[pos];
            pos += 1;
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_quotes = !in_quotes;
            } else if byte == b']' && !in_quotes {
                closed = true;
                break;
            }
        }
        if !closed {
            return Err(ParseError::Malformed("unterminated structured data".to_string()));
        }
    }

    Ok((&input[..pos], &input[pos..]))
}

impl MessageParser for Rfc5424Parser {
    fn variant(&self) -> FormatVariant {
        self.variant
    }

    fn parse(&self, message: &[u8]) -> Result<Fields, ParseError> {
        let text = decode_utf8(message)?;
        let (priority, rest) = split_priority(text)?;

        let (version, rest) = next_token(rest, "version")?;
        let version: i64 = version
            .parse()
            .ok()
            .filter(|v| (1..=999).contains(v))
            .ok_or_else(|| ParseError::Malformed(format!("invalid version '{version}'")))?;

        let (timestamp, rest) = next_token(rest, "timestamp")?;
        let timestamp = if timestamp == NIL {
            FieldValue::from(NIL)
        } else {
            DateTime::parse_from_rfc3339(timestamp)
                .map(FieldValue::Timestamp)
                .map_err(|_| ParseError::InvalidTimestamp(timestamp.to_string()))?
        };

        let (hostname, rest) = next_token(rest, "hostname")?;
        let (app_name, rest) = next_token(rest, "app name")?;
        let (proc_id, rest) = next_token(rest, "proc id")?;
        let (msg_id, rest) = next_token(rest, "msg id")?;
        let (structured_data, rest) = split_structured_data(rest)?;

        let message = match rest.strip_prefix(' ') {
            Some(msg) => msg.trim_start_matches(BOM),
            None if rest.is_empty() => "",
            None => {
                return Err(ParseError::Malformed(
                    "missing space after structured data".to_string(),
                ));
            }
        };

        let mut fields = Fields::with_capacity(11);
        insert_priority(&mut fields, priority);
        fields.insert("version", version);
        fields.insert("timestamp", timestamp);
        fields.insert("hostname", hostname);
        fields.insert("app_name", app_name);
        fields.insert("proc_id", proc_id);
        fields.insert("msg_id", msg_id);
        fields.insert("structured_data", structured_data);
        fields.insert("message", message);
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text<'a>(fields: &'a Fields, name: &str) -> &'a str {
        fields.get(name).and_then(FieldValue::as_text).unwrap()
    }

    #[test]
    fn test_parse_rfc_example() {
        let parser = Rfc5424Parser::new();
        let fields = parser
            .parse(
                b"<34>1 2003-10-11T22:14:15.003Z mymachine.example.com su - ID47 - 'su root' failed for lonvick on /dev/pts/8",
            )
            .unwrap();

        assert_eq!(fields.get("priority").and_then(FieldValue::as_integer), Some(34));
        assert_eq!(fields.get("version").and_then(FieldValue::as_integer), Some(1));
        assert_eq!(text(&fields, "hostname"), "mymachine.example.com");
        assert_eq!(text(&fields, "app_name"), "su");
        assert_eq!(text(&fields, "proc_id"), "-");
        assert_eq!(text(&fields, "msg_id"), "ID47");
        assert_eq!(text(&fields, "structured_data"), "-");
        assert_eq!(
            text(&fields, "message"),
            "'su root' failed for lonvick on /dev/pts/8"
        );
        assert_eq!(
            fields.get("timestamp"),
            Some(&FieldValue::Timestamp(
                DateTime::parse_from_rfc3339("2003-10-11T22:14:15.003Z").unwrap()
            ))
        );
    }

    #[test]
    fn test_parse_structured_data_with_escapes() {
        let parser = Rfc5424Parser::new();
        let fields = parser
            .parse(
                br#"<165>1 2003-10-11T22:14:15.003Z host evntslog - ID47 [exampleSDID@32473 iut="3" eventSource="Appl]ication"][meta note="say \"hi\""] An application event"#,
            )
            .unwrap();

        assert_eq!(
            text(&fields, "structured_data"),
            r#"[exampleSDID@32473 iut="3" eventSource="Appl]ication"][meta note="say \"hi\""]"#
        );
        assert_eq!(text(&fields, "message"), "An application event");
    }

    #[test]
    fn test_parse_without_message_and_nil_timestamp() {
        let parser = Rfc5424Parser::new();
        let fields = parser.parse(b"<14>1 - - - - - -").unwrap();

        assert_eq!(text(&fields, "timestamp"), "-");
        assert_eq!(text(&fields, "message"), "");
    }

    #[test]
    fn test_strips_bom() {
        let parser = Rfc5424Parser::new();
        let fields = parser
            .parse("<14>1 - host app 12 - - \u{feff}hello".as_bytes())
            .unwrap();
        assert_eq!(text(&fields, "message"), "hello");
        assert_eq!(text(&fields, "proc_id"), "12");
    }

    #[test]
    fn test_rejects_malformed_input() {
        let parser = Rfc5424Parser::new();
        assert!(matches!(parser.parse(b"<34>x - - - - - -"), Err(ParseError::Malformed(_))));
        assert!(matches!(parser.parse(b"<34>1 yesterday h a p m -"), Err(ParseError::InvalidTimestamp(_))));
        assert!(matches!(parser.parse(b"<34>1 - h a p"), Err(ParseError::Malformed(_))));
        assert!(matches!(parser.parse(b"<34>1 - h a p m [unterminated"), Err(ParseError::Malformed(_))));
        assert!(matches!(parser.parse(b"<34>1 - h a p m nope"), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_variant_tracks_constructor() {
        assert_eq!(Rfc5424Parser::new().variant(), FormatVariant::Rfc5424);
        assert_eq!(Rfc5424Parser::for_rfc6587().variant(), FormatVariant::Rfc6587);
    }
}
