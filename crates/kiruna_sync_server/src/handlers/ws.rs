use crate::sync::{ClientConnection, HubHandle};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info};

/// Shared state for WebSocket handler
#[derive(Clone)]
pub struct WsState {
    pub hub: HubHandle,
}

/// WebSocket upgrade handler
///
/// The channel is unauthenticated: any client that reaches this route may
/// move elements.
pub async fn ws_handler(State(state): State<WsState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, hub: HubHandle) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Registering queues the current configuration as the first frame.
    let mut connection = ClientConnection::open(hub);
    info!("WebSocket connected: connection={}", connection.id);

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = ws_rx.next() => {
                let Some(msg) = msg else {
                    debug!("Client stream ended");
                    break;
                };
                match msg {
                    Ok(Message::Text(text)) => {
                        connection.handle_message(text.as_str().to_owned());
                    }
                    Ok(Message::Ping(data)) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("Client requested close");
                        break;
                    }
                    Ok(Message::Binary(_)) => {
                        debug!("Ignoring binary frame from {}", connection.id);
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            // Forward snapshots queued by the hub
            frame = connection.recv_frame() => {
                let Some(frame) = frame else {
                    error!("Sync hub stopped, closing {}", connection.id);
                    break;
                };
                if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                    error!("Failed to send snapshot: {}", e);
                    break;
                }
            }
        }
    }

    info!("WebSocket disconnected: connection={}", connection.id);

    // Dropping the connection unregisters it from the hub
}
