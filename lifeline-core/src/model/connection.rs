use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one accepted signaling connection, assigned at accept time.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Hash, Eq, PartialEq)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a connection declares when joining a room.
///
/// `Viewer` is routed exactly like `Parent`; the distinction only matters to
/// clients.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Hash, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Child,
    Parent,
    Viewer,
}

impl Role {
    /// True for the subscribing side of a stream (parent or viewer).
    pub fn is_subscriber(&self) -> bool {
        matches!(self, Role::Parent | Role::Viewer)
    }
}
