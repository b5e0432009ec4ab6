use crate::coordinator::CoordinatorCommand;
use crate::signaling::{SignalSink, SignalingService};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use lifeline_core::{ClientMessage, ConnectionId, ServerMessage};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(service): State<SignalingService>,
) -> impl IntoResponse {
    let conn_id = ConnectionId::new();

    ws.on_upgrade(move |socket| handle_socket(socket, conn_id, service))
}

async fn handle_socket(socket: WebSocket, conn_id: ConnectionId, service: SignalingService) {
    info!("New signaling connection: {}", conn_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    service.add_connection(conn_id, tx);

    if service
        .coordinator_tx
        .send(CoordinatorCommand::Connected { conn_id })
        .await
        .is_err()
    {
        error!("Coordinator is gone, dropping connection {}", conn_id);
        service.remove_connection(&conn_id);
        return;
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() {
                break;
            }
            // A queued close frame means the coordinator tore the session
            // down; stop draining so the socket actually closes.
            if closing {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let service = service.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => {
                        if !handle_frame(&service, conn_id, &text).await {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    service.remove_connection(&conn_id);
    let _ = service
        .coordinator_tx
        .send(CoordinatorCommand::Disconnected { conn_id })
        .await;

    info!("Signaling connection closed: {}", conn_id);
}

/// Decode one text frame and hand it to the coordinator. A frame that is not
/// JSON is logged and dropped; an unrecognized `type` is ignored so newer
/// clients keep working; a recognized `type` with bad fields earns the sender
/// an `error` reply. None of these close the connection.
///
/// Returns false only when the coordinator channel is gone.
async fn handle_frame(service: &SignalingService, conn_id: ConnectionId, text: &str) -> bool {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Undecodable frame from {}: {}", conn_id, e);
            return true;
        }
    };

    let message = match serde_json::from_value::<ClientMessage>(value) {
        Ok(ClientMessage::Unknown) => {
            debug!("Ignoring unrecognized message type from {}", conn_id);
            return true;
        }
        Ok(message) => message,
        Err(e) => {
            warn!("Invalid signaling message from {}: {}", conn_id, e);
            service
                .send(
                    conn_id,
                    ServerMessage::Error {
                        message: format!("invalid message: {e}"),
                    },
                )
                .await;
            return true;
        }
    };

    if let Err(e) = service
        .coordinator_tx
        .send(CoordinatorCommand::Message { conn_id, message })
        .await
    {
        error!("Coordinator is gone: {}", e);
        return false;
    }

    true
}
