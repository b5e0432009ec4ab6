use crate::coordinator::command::CoordinatorCommand;
use crate::coordinator::session::{ConnectionState, StreamSession};
use crate::signaling::SignalSink;
use lifeline_core::{ClientMessage, ConnectionId, Role, ServerMessage};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Reason carried by `stream_ended` when the publisher's socket drops.
const REASON_CHILD_DISCONNECTED: &str = "child_disconnected";

const ERR_NO_SESSION: &str = "no active stream for this room";
const ERR_NOT_CHILD: &str = "only the stream child may control the stream";
const ERR_MISSING_TARGET: &str = "missing roomId or streamId";

/// The signaling coordinator.
///
/// Owns every registry (connections, rooms, sessions, alias index) and is
/// driven by a single command channel. One command is handled to completion
/// before the next, so registry mutation needs no locks; races between
/// clients resolve to whatever order their commands arrived in, and late
/// joiners recover anything they missed through the stored offer and
/// candidate-log replay.
pub struct Coordinator {
    connections: HashMap<ConnectionId, ConnectionState>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
    sessions: HashMap<String, StreamSession>,
    /// Legacy stream token -> canonical room id.
    aliases: HashMap<String, String>,
    command_rx: mpsc::Receiver<CoordinatorCommand>,
    sink: Arc<dyn SignalSink>,
}

impl Coordinator {
    pub fn new(command_rx: mpsc::Receiver<CoordinatorCommand>, sink: Arc<dyn SignalSink>) -> Self {
        Self {
            connections: HashMap::new(),
            rooms: HashMap::new(),
            sessions: HashMap::new(),
            aliases: HashMap::new(),
            command_rx,
            sink,
        }
    }

    pub async fn run(mut self) {
        info!("Signaling coordinator started");

        while let Some(cmd) = self.command_rx.recv().await {
            self.handle_command(cmd).await;
        }

        info!("Signaling coordinator stopped");
    }

    async fn handle_command(&mut self, cmd: CoordinatorCommand) {
        match cmd {
            CoordinatorCommand::Connected { conn_id } => {
                debug!("Connection {} registered", conn_id);
                self.connections.insert(conn_id, ConnectionState::default());
            }

            CoordinatorCommand::Message { conn_id, message } => {
                self.handle_message(conn_id, message).await;
            }

            CoordinatorCommand::Disconnected { conn_id } => {
                self.handle_disconnect(conn_id).await;
            }
        }
    }

    async fn handle_message(&mut self, conn_id: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::JoinRoom { room_id, role } => {
                self.handle_join_room(conn_id, room_id, role).await;
            }
            ClientMessage::ChildJoinRoom {
                room_id,
                stream_id,
                offer,
            } => {
                self.handle_child_join_room(conn_id, room_id, stream_id, offer)
                    .await;
            }
            ClientMessage::ParentJoinRoom { room_id, stream_id } => {
                self.handle_parent_join_room(conn_id, room_id, stream_id)
                    .await;
            }
            ClientMessage::RequestChildStream { stream_id } => {
                self.handle_request_child_stream(conn_id, stream_id).await;
            }
            ClientMessage::Offer { room_id, offer } => {
                self.handle_offer(conn_id, room_id, offer).await;
            }
            ClientMessage::Answer { room_id, answer } => {
                self.handle_answer(conn_id, room_id, answer).await;
            }
            ClientMessage::ParentStreamAnswer {
                room_id,
                stream_id,
                answer,
            } => {
                match self.resolve_room(stream_id.as_deref(), room_id.as_deref()) {
                    Some(room_id) => self.handle_answer(conn_id, room_id, answer).await,
                    None => self.reply_error(conn_id, ERR_MISSING_TARGET).await,
                }
            }
            ClientMessage::IceCandidate {
                room_id,
                stream_id,
                candidate,
            } => {
                self.handle_ice_candidate(conn_id, room_id, stream_id, candidate)
                    .await;
            }
            ClientMessage::StartStream { room_id } => {
                self.handle_start_stream(conn_id, room_id).await;
            }
            ClientMessage::StopStream { room_id } => {
                self.handle_stop_stream(conn_id, room_id).await;
            }
            ClientMessage::Ping => {
                self.handle_ping(conn_id).await;
            }
            ClientMessage::Unknown => {}
        }
    }

    async fn handle_join_room(&mut self, conn_id: ConnectionId, room_id: String, role: Role) {
        info!("Connection {} joining room {} as {:?}", conn_id, room_id, role);

        self.register_member(conn_id, &room_id, role);

        if role == Role::Child {
            self.claim_session_as_child(conn_id, &room_id);
        } else {
            self.subscribe_with_replay(conn_id, &room_id).await;
        }

        self.sink
            .send(conn_id, ServerMessage::RoomJoined { room_id, role })
            .await;
    }

    async fn handle_child_join_room(
        &mut self,
        conn_id: ConnectionId,
        room_id: String,
        stream_id: String,
        offer: Value,
    ) {
        info!(
            "Connection {} joining room {} as child (legacy, stream token {})",
            conn_id, room_id, stream_id
        );

        self.register_member(conn_id, &room_id, Role::Child);
        self.claim_session_as_child(conn_id, &room_id);

        // The session is reachable under both keys until teardown. A rejoin
        // with a fresh token retires the old alias in the same step.
        let old_alias = match self.sessions.get_mut(&room_id) {
            Some(session) => {
                session.offer = Some(offer.clone());
                session.alias.replace(stream_id.clone())
            }
            None => None,
        };
        if let Some(old_alias) = old_alias {
            if old_alias != stream_id {
                self.aliases.remove(&old_alias);
            }
        }
        self.aliases.insert(stream_id, room_id.clone());

        self.fan_out_offer(conn_id, &room_id, offer).await;

        self.sink
            .send(
                conn_id,
                ServerMessage::RoomJoined {
                    room_id,
                    role: Role::Child,
                },
            )
            .await;
    }

    async fn handle_parent_join_room(
        &mut self,
        conn_id: ConnectionId,
        room_id: Option<String>,
        stream_id: Option<String>,
    ) {
        let Some(room_id) = self.resolve_room(stream_id.as_deref(), room_id.as_deref()) else {
            self.reply_error(conn_id, ERR_MISSING_TARGET).await;
            return;
        };

        info!(
            "Connection {} joining room {} as parent (legacy)",
            conn_id, room_id
        );

        self.register_member(conn_id, &room_id, Role::Parent);
        self.subscribe_with_offer_replay(conn_id, &room_id).await;
    }

    async fn handle_request_child_stream(&mut self, conn_id: ConnectionId, stream_id: String) {
        let room_id = self
            .aliases
            .get(&stream_id)
            .cloned()
            .unwrap_or(stream_id);

        info!(
            "Connection {} requesting child stream for room {}",
            conn_id, room_id
        );

        self.register_member(conn_id, &room_id, Role::Parent);
        self.subscribe_with_offer_replay(conn_id, &room_id).await;
    }

    async fn handle_offer(&mut self, conn_id: ConnectionId, room_id: String, offer: Value) {
        if let Some(session) = self.sessions.get(&room_id) {
            if session.child != conn_id {
                warn!(
                    "Rejecting offer for room {} from non-child connection {}",
                    room_id, conn_id
                );
                self.reply_error(conn_id, ERR_NOT_CHILD).await;
                return;
            }
        } else {
            // The first offer for a room establishes its session with the
            // sender as child.
            self.claim_session_as_child(conn_id, &room_id);
        }

        if let Some(session) = self.sessions.get_mut(&room_id) {
            session.offer = Some(offer.clone());
        }

        self.fan_out_offer(conn_id, &room_id, offer).await;
    }

    async fn handle_answer(&mut self, conn_id: ConnectionId, room_id: String, answer: Value) {
        let Some(session) = self.sessions.get(&room_id) else {
            self.reply_error(conn_id, ERR_NO_SESSION).await;
            return;
        };

        let child = session.child;
        let alias = session.alias.clone();

        debug!(
            "Relaying answer from {} to child {} in room {}",
            conn_id, child, room_id
        );
        self.send_answer_shapes(child, &room_id, &alias, answer)
            .await;
    }

    async fn handle_ice_candidate(
        &mut self,
        conn_id: ConnectionId,
        room_id: Option<String>,
        stream_id: Option<String>,
        candidate: Value,
    ) {
        let Some(room_id) = self.resolve_room(stream_id.as_deref(), room_id.as_deref()) else {
            self.reply_error(conn_id, ERR_MISSING_TARGET).await;
            return;
        };

        let Some(session) = self.sessions.get_mut(&room_id) else {
            self.reply_error(conn_id, ERR_NO_SESSION).await;
            return;
        };

        // Logged unconditionally so late joiners replay the exact relay
        // history, duplicates included.
        session.candidates.push(candidate.clone());

        let child = session.child;
        let parents: Vec<ConnectionId> = session
            .parents
            .iter()
            .copied()
            .filter(|p| *p != conn_id)
            .collect();

        if conn_id == child {
            for parent in parents {
                self.sink
                    .send(
                        parent,
                        ServerMessage::IceCandidate {
                            room_id: room_id.clone(),
                            candidate: candidate.clone(),
                        },
                    )
                    .await;
            }
        } else {
            self.sink
                .send(
                    child,
                    ServerMessage::IceCandidate {
                        room_id: room_id.clone(),
                        candidate,
                    },
                )
                .await;
        }
    }

    async fn handle_start_stream(&mut self, conn_id: ConnectionId, room_id: String) {
        if !self.authorize_child(conn_id, &room_id).await {
            return;
        }

        info!("Stream started in room {}", room_id);
        self.broadcast_except(
            &room_id,
            conn_id,
            ServerMessage::StreamStarted {
                room_id: room_id.clone(),
            },
        )
        .await;
    }

    async fn handle_stop_stream(&mut self, conn_id: ConnectionId, room_id: String) {
        if !self.authorize_child(conn_id, &room_id).await {
            return;
        }

        info!("Stream stopped by child in room {}", room_id);
        self.broadcast_except(
            &room_id,
            conn_id,
            ServerMessage::StreamStopped {
                room_id: room_id.clone(),
            },
        )
        .await;

        self.tear_down_session(&room_id).await;
    }

    async fn handle_ping(&self, conn_id: ConnectionId) {
        self.sink
            .send(
                conn_id,
                ServerMessage::Pong {
                    timestamp: unix_millis(),
                },
            )
            .await;
    }

    async fn handle_disconnect(&mut self, conn_id: ConnectionId) {
        let Some(state) = self.connections.remove(&conn_id) else {
            return;
        };
        info!("Connection {} disconnected", conn_id);

        let Some(room_id) = state.room else {
            return;
        };
        self.remove_from_room(conn_id, &room_id);

        let was_child = self.sessions.get(&room_id).map(|s| s.child == conn_id);
        match was_child {
            Some(true) => {
                warn!("Child of room {} disconnected, ending stream", room_id);
                self.broadcast_except(
                    &room_id,
                    conn_id,
                    ServerMessage::StreamEnded {
                        room_id: room_id.clone(),
                        reason: REASON_CHILD_DISCONNECTED.to_string(),
                    },
                )
                .await;
                self.tear_down_session(&room_id).await;
            }
            Some(false) => {
                if let Some(session) = self.sessions.get_mut(&room_id) {
                    if session.parents.remove(&conn_id) {
                        debug!("Dropped parent {} from session in room {}", conn_id, room_id);
                    }
                }
            }
            None => {}
        }
    }

    /// Point the connection's bookkeeping at `room_id` with `role` and add it
    /// to the room's membership. A later join overwrites role and room; the
    /// old room's membership is repaired here so it cannot leak.
    fn register_member(&mut self, conn_id: ConnectionId, room_id: &str, role: Role) {
        let (prev_role, prev_room) = {
            let state = self.connections.entry(conn_id).or_default();
            (state.role, state.room.clone())
        };

        if let Some(previous) = prev_role {
            if previous != role {
                debug!(
                    "Connection {} switched role {:?} -> {:?}",
                    conn_id, previous, role
                );
            }
        }
        if let Some(prev_room) = prev_room {
            if prev_room != room_id {
                self.remove_from_room(conn_id, &prev_room);
            }
        }

        if let Some(state) = self.connections.get_mut(&conn_id) {
            state.role = Some(role);
            state.room = Some(room_id.to_string());
        }
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(conn_id);
    }

    fn remove_from_room(&mut self, conn_id: ConnectionId, room_id: &str) {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return;
        };
        members.remove(&conn_id);
        if members.is_empty() {
            self.rooms.remove(room_id);
            info!("Room {} is empty, dropping it", room_id);
        }
    }

    /// Create the room's session with `conn_id` as child, or take over an
    /// existing one. Members already waiting in the room as parent/viewer
    /// seed the new session's subscriber set.
    fn claim_session_as_child(&mut self, conn_id: ConnectionId, room_id: &str) {
        if let Some(session) = self.sessions.get_mut(room_id) {
            if session.child != conn_id {
                // Client-side reconnect race: a second child join replaces
                // the stale publisher rather than duplicating the session.
                warn!(
                    "Room {} already has child {}, replacing with {}",
                    room_id, session.child, conn_id
                );
                session.child = conn_id;
            }
            session.parents.remove(&conn_id);
            return;
        }

        info!("Creating streaming session for room {}", room_id);
        let mut session = StreamSession::new(conn_id);
        if let Some(members) = self.rooms.get(room_id) {
            for member in members {
                if *member == conn_id {
                    continue;
                }
                let subscribes = self
                    .connections
                    .get(member)
                    .and_then(|s| s.role)
                    .is_some_and(|r| r.is_subscriber());
                if subscribes {
                    session.parents.insert(*member);
                }
            }
        }
        self.sessions.insert(room_id.to_string(), session);
    }

    /// Track `conn_id` as a subscriber and catch it up on everything relayed
    /// so far: the stored offer, then the full candidate log in relay order.
    async fn subscribe_with_replay(&mut self, conn_id: ConnectionId, room_id: &str) {
        let Some(session) = self.sessions.get_mut(room_id) else {
            // No stream yet; the client waits for the offer fan-out.
            return;
        };
        session.parents.insert(conn_id);

        let offer = session.offer.clone();
        let candidates = session.candidates.clone();
        let alias = session.alias.clone();

        if let Some(offer) = offer {
            self.send_offer_shapes(conn_id, room_id, &alias, offer).await;
        }
        for candidate in candidates {
            self.sink
                .send(
                    conn_id,
                    ServerMessage::IceCandidate {
                        room_id: room_id.to_string(),
                        candidate,
                    },
                )
                .await;
        }
    }

    /// Legacy join paths replay the stored offer only.
    async fn subscribe_with_offer_replay(&mut self, conn_id: ConnectionId, room_id: &str) {
        let Some(session) = self.sessions.get_mut(room_id) else {
            return;
        };
        session.parents.insert(conn_id);

        let offer = session.offer.clone();
        let alias = session.alias.clone();

        if let Some(offer) = offer {
            self.send_offer_shapes(conn_id, room_id, &alias, offer).await;
        }
    }

    async fn fan_out_offer(&self, sender: ConnectionId, room_id: &str, offer: Value) {
        let alias = self.sessions.get(room_id).and_then(|s| s.alias.clone());
        for member in self.room_members_except(room_id, sender) {
            self.send_offer_shapes(member, room_id, &alias, offer.clone())
                .await;
        }
    }

    /// Every offer goes out in both generations: the current `offer` shape
    /// and the legacy `child_stream_offer` shape.
    async fn send_offer_shapes(
        &self,
        conn_id: ConnectionId,
        room_id: &str,
        alias: &Option<String>,
        offer: Value,
    ) {
        self.sink
            .send(
                conn_id,
                ServerMessage::Offer {
                    room_id: room_id.to_string(),
                    offer: offer.clone(),
                },
            )
            .await;

        let stream_id = alias.clone().unwrap_or_else(|| room_id.to_string());
        self.sink
            .send(conn_id, ServerMessage::ChildStreamOffer { stream_id, offer })
            .await;
    }

    /// Answers likewise go out in both the `answer` and legacy
    /// `parent_stream_answer` shapes.
    async fn send_answer_shapes(
        &self,
        conn_id: ConnectionId,
        room_id: &str,
        alias: &Option<String>,
        answer: Value,
    ) {
        self.sink
            .send(
                conn_id,
                ServerMessage::Answer {
                    room_id: room_id.to_string(),
                    answer: answer.clone(),
                },
            )
            .await;

        let stream_id = alias.clone().unwrap_or_else(|| room_id.to_string());
        self.sink
            .send(
                conn_id,
                ServerMessage::ParentStreamAnswer { stream_id, answer },
            )
            .await;
    }

    /// Mutating stream messages are only honored from the session's current
    /// child; everyone else gets an `error` reply and no state changes.
    async fn authorize_child(&mut self, conn_id: ConnectionId, room_id: &str) -> bool {
        match self.sessions.get(room_id) {
            Some(session) if session.child == conn_id => true,
            Some(session) => {
                warn!(
                    "Connection {} is not the child {} of room {}, rejecting",
                    conn_id, session.child, room_id
                );
                self.reply_error(conn_id, ERR_NOT_CHILD).await;
                false
            }
            None => {
                self.reply_error(conn_id, ERR_NO_SESSION).await;
                false
            }
        }
    }

    /// Send to every current member of the room except `excluded`. Members
    /// whose socket already went away are skipped by the sink; membership is
    /// repaired by the disconnect handler, not here.
    async fn broadcast_except(
        &self,
        room_id: &str,
        excluded: ConnectionId,
        message: ServerMessage,
    ) {
        for member in self.room_members_except(room_id, excluded) {
            self.sink.send(member, message.clone()).await;
        }
    }

    fn room_members_except(&self, room_id: &str, excluded: ConnectionId) -> Vec<ConnectionId> {
        let Some(members) = self.rooms.get(room_id) else {
            return Vec::new();
        };
        members.iter().copied().filter(|m| *m != excluded).collect()
    }

    /// Close everything attached to the room's session and drop it from both
    /// lookup keys within the same handler invocation, so no alias can point
    /// at a dead session.
    async fn tear_down_session(&mut self, room_id: &str) {
        let Some(session) = self.sessions.remove(room_id) else {
            return;
        };
        if let Some(alias) = &session.alias {
            self.aliases.remove(alias);
        }

        for parent in &session.parents {
            self.sink.close(*parent).await;
        }
        self.sink.close(session.child).await;

        info!("Streaming session for room {} removed", room_id);
    }

    /// A `streamId` is first tried as a registered alias; on miss it is used
    /// as the room id directly, which covers clients that join before any
    /// alias mapping exists.
    fn resolve_room(&self, stream_id: Option<&str>, room_id: Option<&str>) -> Option<String> {
        if let Some(stream_id) = stream_id {
            if let Some(canonical) = self.aliases.get(stream_id) {
                return Some(canonical.clone());
            }
            return Some(stream_id.to_string());
        }
        room_id.map(str::to_string)
    }

    async fn reply_error(&self, conn_id: ConnectionId, message: &str) {
        self.sink
            .send(
                conn_id,
                ServerMessage::Error {
                    message: message.to_string(),
                },
            )
            .await;
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
