//! Syslog wire-format parsing.
//!
//! The [`FormatRegistry`] maps a configured format name to a [`SyslogFormat`]:
//! a stream framing rule plus a [`MessageParser`] that turns one framed
//! message into an ordered [`Fields`](crate::domain::Fields) mapping.

pub mod error;
pub mod framing;
pub mod registry;
pub mod rfc3164;
pub mod rfc5424;

pub use error::ParseError;
pub use framing::{Frame, Framing, SyslogFrameCodec};
pub use registry::{FormatRegistry, FormatVariant, SyslogFormat, UnknownFormat};
pub use rfc3164::Rfc3164Parser;
pub use rfc5424::Rfc5424Parser;

use crate::domain::Fields;

/// Largest valid PRI value (facility 23, severity 7).
const MAX_PRIORITY: u8 = 191;

/// Turns a single framed syslog message into named fields.
pub trait MessageParser: Send + Sync {
    fn variant(&self) -> FormatVariant;
    fn parse(&self, message: &[u8]) -> Result<Fields, ParseError>;
}

/// Split the `<PRI>` prefix off a message.
pub(crate) fn split_priority(input: &str) -> Result<(u8, &str), ParseError> {
    let rest = input
        .strip_prefix('<')
        .ok_or_else(|| ParseError::InvalidPriority("missing '<'".to_string()))?;
    let end = rest
        .find('>')
        .ok_or_else(|| ParseError::InvalidPriority("missing '>'".to_string()))?;
    let digits = &rest[..end];
    if digits.is_empty() || digits.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidPriority(digits.to_string()));
    }
    let priority: u8 = digits
        .parse()
        .map_err(|_| ParseError::InvalidPriority(digits.to_string()))?;
    if priority > MAX_PRIORITY {
        return Err(ParseError::InvalidPriority(digits.to_string()));
    }
    Ok((priority, &rest[end + 1..]))
}

pub(crate) fn insert_priority(fields: &mut Fields, priority: u8) {
    fields.insert("priority", priority);
    fields.insert("facility", priority / 8);
    fields.insert("severity", priority % 8);
}

pub(crate) fn decode_utf8(message: &[u8]) -> Result<&str, ParseError> {
    if message.is_empty() {
        return Err(ParseError::Empty);
    }
    std::str::from_utf8(message).map_err(|_| ParseError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_priority() {
        assert_eq!(split_priority("<34>rest").unwrap(), (34, "rest"));
        assert_eq!(split_priority("<0>").unwrap(), (0, ""));
        assert_eq!(split_priority("<191>x").unwrap(), (191, "x"));
    }

    #[test]
    fn test_split_priority_rejects_bad_values() {
        for input in ["34>rest", "<34rest", "<>x", "<1234>x", "<192>x", "<a1>x"] {
            assert!(
                matches!(split_priority(input), Err(ParseError::InvalidPriority(_))),
                "should reject {input}"
            );
        }
    }

    #[test]
    fn test_insert_priority_derives_facility_and_severity() {
        let mut fields = Fields::new();
        insert_priority(&mut fields, 165);
        assert_eq!(fields.get("facility").and_then(|v| v.as_integer()), Some(20));
        assert_eq!(fields.get("severity").and_then(|v| v.as_integer()), Some(5));
    }
}
