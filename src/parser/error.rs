use thiserror::Error;

/// Malformed message bytes. Drops that single message only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty message")]
    Empty,
    #[error("invalid priority: {0}")]
    InvalidPriority(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("message is not valid UTF-8")]
    InvalidUtf8,
    #[error("message size {size} exceeds limit {limit}")]
    TooLarge { size: usize, limit: usize },
}
