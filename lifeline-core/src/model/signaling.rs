use crate::model::connection::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages accepted from clients over the signaling socket.
///
/// The wire format is a flat JSON object tagged by `type`. Field names are
/// camelCase because every known client is JavaScript. SDP and ICE payloads
/// are relayed opaquely and never inspected, hence `Value`.
///
/// Several tags exist twice: the `child_join_room` / `parent_join_room` /
/// `request_child_stream` / `parent_stream_answer` family is the legacy shape
/// still emitted by older device builds. Both generations must keep working
/// until every installed client is retired at once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    JoinRoom {
        room_id: String,
        role: Role,
    },
    ChildJoinRoom {
        room_id: String,
        stream_id: String,
        offer: Value,
    },
    ParentJoinRoom {
        room_id: Option<String>,
        stream_id: Option<String>,
    },
    RequestChildStream {
        stream_id: String,
    },
    Offer {
        room_id: String,
        offer: Value,
    },
    Answer {
        room_id: String,
        answer: Value,
    },
    ParentStreamAnswer {
        room_id: Option<String>,
        stream_id: Option<String>,
        answer: Value,
    },
    IceCandidate {
        room_id: Option<String>,
        stream_id: Option<String>,
        candidate: Value,
    },
    StartStream {
        room_id: String,
    },
    StopStream {
        room_id: String,
    },
    Ping,
    /// Any unrecognized `type`. Ignored so that independently-versioned
    /// clients can drift ahead of the server without breaking.
    #[serde(other)]
    Unknown,
}

/// Messages the coordinator sends to clients.
///
/// `ChildStreamOffer` and `ParentStreamAnswer` are the legacy twins of
/// `Offer` and `Answer`; both shapes are emitted on every relay so old and
/// new clients can share a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    RoomJoined {
        room_id: String,
        role: Role,
    },
    Offer {
        room_id: String,
        offer: Value,
    },
    ChildStreamOffer {
        stream_id: String,
        offer: Value,
    },
    Answer {
        room_id: String,
        answer: Value,
    },
    ParentStreamAnswer {
        stream_id: String,
        answer: Value,
    },
    IceCandidate {
        room_id: String,
        candidate: Value,
    },
    StreamStarted {
        room_id: String,
    },
    StreamStopped {
        room_id: String,
    },
    StreamEnded {
        room_id: String,
        reason: String,
    },
    Pong {
        timestamp: u64,
    },
    Error {
        message: String,
    },
}
