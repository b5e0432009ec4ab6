use async_trait::async_trait;
use lifeline_core::{ConnectionId, ServerMessage};

/// Implemented by the transport layer (the WebSocket server) so the
/// coordinator can push messages and close sockets without owning them.
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Queue a message for one connection. Connections whose transport is
    /// already gone are skipped; the disconnect handler reconciles
    /// membership separately.
    async fn send(&self, conn_id: ConnectionId, message: ServerMessage);

    /// Close the connection with a normal-closure frame.
    async fn close(&self, conn_id: ConnectionId);
}
