//! On-disk record layout.
//!
//! ```text
//! ============================================================ (92 '=')
//! <YYYY-MM-DD HH:MM:SS> <field>:<value>
//! ...
//! ============================================================
//! ```
//!
//! Every line ends with CRLF; the timestamp on each field line is the
//! entry's receipt time. Control characters inside values are written as
//! escapes (`\r`, `\n`, `\u{1b}`), so a value never spans lines.

use crate::domain::LogEntry;
use chrono::{DateTime, Local};
use std::borrow::Cow;
use std::fmt::Write;

pub const DELIMITER_WIDTH: usize = 92;
pub const LINE_ENDING: &str = "\r\n";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn delimiter() -> String {
    "=".repeat(DELIMITER_WIDTH)
}

pub(crate) fn render_line(at: DateTime<Local>, text: &str) -> String {
    format!("{} {text}{LINE_ENDING}", at.format(TIMESTAMP_FORMAT))
}

/// Replaces control characters with their escaped form.
pub(crate) fn escape_value(value: &str) -> Cow<'_, str> {
    if !value.chars().any(char::is_control) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        if c.is_control() {
            escaped.extend(c.escape_default());
        } else {
            escaped.push(c);
        }
    }
    Cow::Owned(escaped)
}

pub fn render_block(entry: &LogEntry) -> String {
    let stamp = entry.received_at().format(TIMESTAMP_FORMAT).to_string();
    let delimiter = delimiter();

    let mut block = String::with_capacity(2 * (DELIMITER_WIDTH + 2) + entry.fields().len() * 48);
    block.push_str(&delimiter);
    block.push_str(LINE_ENDING);
    for (name, value) in entry.fields().iter() {
        let value = value.to_string();
        // Writing into a String cannot fail.
        let _ = write!(block, "{stamp} {name}:{}{LINE_ENDING}", escape_value(&value));
    }
    block.push_str(&delimiter);
    block.push_str(LINE_ENDING);
    block
}
