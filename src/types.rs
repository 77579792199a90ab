//! Basic type definitions for the chat relay
//!
//! Provides the newtype wrapper used to key every table in the registry:
//! - `SessionId`: UUID-based stable session identifier

use uuid::Uuid;

/// Stable session identifier (newtype pattern)
///
/// Assigned once when a connection is accepted and used by the registry,
/// router and server loop instead of the connection handle itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
