use lifeline_core::{ClientMessage, ConnectionId};

/// Events feeding the coordinator from the WebSocket layer.
#[derive(Debug)]
pub enum CoordinatorCommand {
    /// A socket finished the upgrade and can receive messages.
    Connected { conn_id: ConnectionId },

    /// A decoded signaling message from a connected client.
    Message {
        conn_id: ConnectionId,
        message: ClientMessage,
    },

    /// The socket closed or errored.
    Disconnected { conn_id: ConnectionId },
}
