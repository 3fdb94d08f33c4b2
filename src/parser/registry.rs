//! Format registry.
//!
//! Maps the configured format name to a [`SyslogFormat`]. Lookup is
//! case-insensitive; anything outside the known set is an error, never a
//! silent default.

use super::framing::{Framing, SyslogFrameCodec};
use super::rfc3164::Rfc3164Parser;
use super::rfc5424::Rfc5424Parser;
use super::{MessageParser, ParseError};
use crate::domain::Fields;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatVariant {
    Rfc3164,
    Rfc5424,
    Rfc6587,
}

impl FormatVariant {
    pub const ALL: [FormatVariant; 3] = [
        FormatVariant::Rfc3164,
        FormatVariant::Rfc5424,
        FormatVariant::Rfc6587,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatVariant::Rfc3164 => "RFC3164",
            FormatVariant::Rfc5424 => "RFC5424",
            FormatVariant::Rfc6587 => "RFC6587",
        }
    }

    pub fn framing(&self) -> Framing {
        match self {
            FormatVariant::Rfc6587 => Framing::OctetCounting,
            FormatVariant::Rfc3164 | FormatVariant::Rfc5424 => Framing::LineDelimited,
        }
    }
}

impl fmt::Display for FormatVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown syslog format '{name}' (expected one of RFC3164, RFC5424, RFC6587)")]
pub struct UnknownFormat {
    pub name: String,
}

impl FromStr for FormatVariant {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormatVariant::ALL
            .into_iter()
            .find(|variant| variant.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownFormat {
                name: s.to_string(),
            })
    }
}

/// A resolved wire format: framing rule plus message parser.
#[derive(Clone)]
pub struct SyslogFormat {
    variant: FormatVariant,
    parser: Arc<dyn MessageParser>,
}

impl fmt::Debug for SyslogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyslogFormat")
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

impl SyslogFormat {
    pub fn variant(&self) -> FormatVariant {
        self.variant
    }

    pub fn framing(&self) -> Framing {
        self.variant.framing()
    }

    pub fn parse(&self, message: &[u8]) -> Result<Fields, ParseError> {
        self.parser.parse(message)
    }

    /// Stream codec for TCP/TLS connections using this format.
    pub fn codec(&self, max_frame: usize) -> SyslogFrameCodec {
        SyslogFrameCodec::new(self.framing(), max_frame)
    }

    /// Strip framing from a UDP datagram and parse the payload.
    pub fn parse_datagram(&self, datagram: &[u8]) -> Result<Fields, ParseError> {
        self.parse(self.framing().unwrap_datagram(datagram))
    }
}

pub struct FormatRegistry {
    formats: HashMap<FormatVariant, SyslogFormat>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl FormatRegistry {
    /// Registry holding the three supported syslog formats.
    pub fn standard() -> Self {
        let mut registry = Self {
            formats: HashMap::with_capacity(FormatVariant::ALL.len()),
        };
        registry.register(Rfc3164Parser::new());
        registry.register(Rfc5424Parser::new());
        registry.register(Rfc5424Parser::for_rfc6587());
        registry
    }

    fn register<P: MessageParser + 'static>(&mut self, parser: P) {
        let variant = parser.variant();
        self.formats.insert(
            variant,
            SyslogFormat {
                variant,
                parser: Arc::new(parser),
            },
        );
        tracing::debug!(format = %variant, "Registered syslog format");
    }

    pub fn get(&self, variant: FormatVariant) -> Option<&SyslogFormat> {
        self.formats.get(&variant)
    }

    /// Resolve a configured format name.
    pub fn resolve(&self, name: &str) -> Result<SyslogFormat, UnknownFormat> {
        let variant: FormatVariant = name.parse()?;
        self.get(variant).cloned().ok_or_else(|| UnknownFormat {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldValue;

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = FormatRegistry::standard();
        assert_eq!(registry.resolve("rfc5424").unwrap().variant(), FormatVariant::Rfc5424);
        assert_eq!(registry.resolve("RFC3164").unwrap().variant(), FormatVariant::Rfc3164);
        assert_eq!(registry.resolve("Rfc6587").unwrap().variant(), FormatVariant::Rfc6587);
    }

    #[test]
    fn test_resolve_unknown_format_fails() {
        let registry = FormatRegistry::standard();
        let err = registry.resolve("CEF").unwrap_err();
        assert_eq!(err.name, "CEF");
        assert!(err.to_string().contains("CEF"));
        assert!(registry.resolve("").is_err());
    }

    #[test]
    fn test_framing_per_variant() {
        let registry = FormatRegistry::standard();
        assert_eq!(registry.resolve("RFC6587").unwrap().framing(), Framing::OctetCounting);
        assert_eq!(registry.resolve("RFC5424").unwrap().framing(), Framing::LineDelimited);
        assert_eq!(registry.resolve("RFC3164").unwrap().framing(), Framing::LineDelimited);
    }

    #[test]
    fn test_rfc6587_datagram_strips_octet_count() {
        let format = FormatRegistry::standard().resolve("RFC6587").unwrap();
        let fields = format
            .parse_datagram(b"25 <14>1 - host app - - - hi\n")
            .unwrap();
        assert_eq!(fields.get("hostname").and_then(FieldValue::as_text), Some("host"));
        assert_eq!(fields.get("message").and_then(FieldValue::as_text), Some("hi"));
    }
}
