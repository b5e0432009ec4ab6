use crate::coordinator::CoordinatorCommand;
use crate::signaling::SignalSink;
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, close_code};
use dashmap::DashMap;
use lifeline_core::{ConnectionId, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

struct ServiceInner {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
}

/// Registry of live sockets shared between the WebSocket tasks and the
/// coordinator. Outbound messages are queued on per-connection channels; the
/// socket's send task drains them.
#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<ServiceInner>,
    pub(crate) coordinator_tx: mpsc::Sender<CoordinatorCommand>,
}

impl SignalingService {
    pub fn new(coordinator_tx: mpsc::Sender<CoordinatorCommand>) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                connections: DashMap::new(),
            }),
            coordinator_tx,
        }
    }

    pub fn add_connection(&self, conn_id: ConnectionId, tx: mpsc::UnboundedSender<Message>) {
        self.inner.connections.insert(conn_id, tx);
    }

    pub fn remove_connection(&self, conn_id: &ConnectionId) {
        self.inner.connections.remove(conn_id);
    }

    fn push(&self, conn_id: ConnectionId, msg: Message) {
        if let Some(conn) = self.inner.connections.get(&conn_id) {
            if conn.send(msg).is_err() {
                debug!("Send task for {} already gone, dropping message", conn_id);
            }
        } else {
            debug!("Skipping send to disconnected connection {}", conn_id);
        }
    }
}

#[async_trait]
impl SignalSink for SignalingService {
    async fn send(&self, conn_id: ConnectionId, message: ServerMessage) {
        match serde_json::to_string(&message) {
            Ok(json) => self.push(conn_id, Message::Text(json.into())),
            Err(e) => error!("Failed to serialize signaling message: {}", e),
        }
    }

    async fn close(&self, conn_id: ConnectionId) {
        self.push(
            conn_id,
            Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: "stream ended".into(),
            })),
        );
    }
}
