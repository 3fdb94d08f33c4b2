use std::fmt;

/// Display name attributed to a connection's remote endpoint.
///
/// Derived once when the connection is established and never re-derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    display_name: String,
}

impl PeerIdentity {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}
