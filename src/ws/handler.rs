//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::app::AppState;
use crate::duel::{ConnectionId, DuelHandle};
use crate::util::rate_limit::MoveRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Errors while writing to a socket
#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("socket write failed: {0}")]
    Socket(#[from] axum::Error),
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = ConnectionId::new();
    info!(connection_id = %connection_id, "New WebSocket connection");

    let outbound_rx = match state.duel.connect(connection_id).await {
        Ok(rx) => rx,
        Err(e) => {
            error!(connection_id = %connection_id, error = %e, "Failed to register connection");
            return;
        }
    };

    let (ws_sink, ws_stream) = socket.split();
    let limiter = MoveRateLimiter::new(state.config.move_rate_limit);

    run_session(
        connection_id,
        ws_sink,
        ws_stream,
        outbound_rx,
        &state.duel,
        limiter,
    )
    .await;

    // Cleanup on disconnect
    if state.duel.disconnect(connection_id).await.is_err() {
        debug!(connection_id = %connection_id, "Duel session already closed");
    }

    info!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    connection_id: ConnectionId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
    duel: &DuelHandle,
    limiter: MoveRateLimiter,
) {
    // Spawn writer task: duel messages -> WebSocket
    let mut writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                return;
            }
        }
        // Queue closed by the duel task: rejected join or shutdown
        let _ = ws_sink.send(Message::Close(None)).await;
    });

    // Reader loop: WebSocket -> duel task
    loop {
        let result = tokio::select! {
            _ = &mut writer_handle => {
                debug!(connection_id = %connection_id, "Writer finished");
                break;
            }
            next = ws_stream.next() => match next {
                Some(result) => result,
                None => break,
            },
        };

        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(ClientMsg::Move { .. }) if !limiter.check_move() => {
                    trace!(connection_id = %connection_id, "Move sample over rate cap");
                }
                Ok(msg) => {
                    if duel.message(connection_id, msg).await.is_err() {
                        debug!(connection_id = %connection_id, "Duel session closed");
                        break;
                    }
                }
                Err(e) => {
                    warn!(connection_id = %connection_id, error = %e, "Failed to parse client message");
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(connection_id = %connection_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(connection_id = %connection_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), SendError> {
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
