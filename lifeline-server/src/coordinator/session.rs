use lifeline_core::{ConnectionId, Role};
use serde_json::Value;
use std::collections::HashSet;

/// What a connection last declared itself as. Both fields stay unset until
/// the first join-type message; a later join overwrites them (last write
/// wins).
#[derive(Debug, Default)]
pub struct ConnectionState {
    pub role: Option<Role>,
    pub room: Option<String>,
}

/// Publisher/subscriber state for the single broadcast of one room.
#[derive(Debug)]
pub struct StreamSession {
    /// The authoritative publisher. A second child join to the same room
    /// replaces this wholesale rather than duplicating the session.
    pub child: ConnectionId,

    /// Current subscribers.
    pub parents: HashSet<ConnectionId>,

    /// Last offer from the child, replayed to subscribers that join after it
    /// was first relayed.
    pub offer: Option<Value>,

    /// Every ICE candidate relayed this session, in relay order. Replayed in
    /// full to late joiners; append-only, duplicates included.
    pub candidates: Vec<Value>,

    /// Legacy stream token. While set, the session is reachable under this
    /// key as well as the room id.
    pub alias: Option<String>,
}

impl StreamSession {
    pub fn new(child: ConnectionId) -> Self {
        Self {
            child,
            parents: HashSet::new(),
            offer: None,
            candidates: Vec::new(),
            alias: None,
        }
    }
}
