//! Relay transport for the client side

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::state::{ClientGameState, GameMode};

/// How long to wait for the relay before playing alone
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const OUTBOX_CAPACITY: usize = 64;
const INBOX_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("relay connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("relay did not answer within {0:?}")]
    Timeout(Duration),

    #[error("round length must be 1-300 seconds, got {0}")]
    InvalidRoundLength(u32),
}

/// An open connection to the duel relay.
///
/// Sends never wait for an answer; inbound messages queue up until the
/// frame loop drains them.
pub struct RelayConnection {
    outbox: mpsc::Sender<ClientMsg>,
    inbox: mpsc::Receiver<ServerMsg>,
}

impl RelayConnection {
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (socket, _response) = timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| ClientError::Timeout(CONNECT_TIMEOUT))??;
        let (mut sink, mut stream) = socket.split();

        let (outbox, mut outbox_rx) = mpsc::channel::<ClientMsg>(OUTBOX_CAPACITY);
        let (inbox_tx, inbox) = mpsc::channel(INBOX_CAPACITY);

        // Writer: outbox -> socket, closes the socket once the connection is dropped
        tokio::spawn(async move {
            while let Some(msg) = outbox_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize client message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json)).await {
                    debug!(error = %e, "Relay send failed");
                    return;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: socket -> inbox
        tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                match next {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMsg>(&text) {
                        Ok(msg) => {
                            if inbox_tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "Failed to parse server message"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "Relay read error");
                        break;
                    }
                }
            }
            debug!("Relay stream closed");
        });

        Ok(Self { outbox, inbox })
    }

    /// Queue a message for the relay. Dropped when the queue is full or closed.
    pub fn send(&self, msg: ClientMsg) {
        if let Err(e) = self.outbox.try_send(msg) {
            trace!(error = %e, "Dropping outbound message");
        }
    }

    pub fn send_all(&self, msgs: impl IntoIterator<Item = ClientMsg>) {
        for msg in msgs {
            self.send(msg);
        }
    }

    /// Latency probe, answered with `pong`
    pub fn ping(&self) {
        self.send(ClientMsg::Ping { t: unix_millis() });
    }

    /// Next inbound message; `None` once the relay has gone away
    pub async fn recv(&mut self) -> Option<ServerMsg> {
        self.inbox.recv().await
    }
}

/// Open a duel if a relay url is given and reachable, otherwise practice alone
pub async fn start_session(
    url: Option<&str>,
    mode: GameMode,
) -> (ClientGameState, Option<RelayConnection>) {
    let Some(url) = url else {
        return (ClientGameState::practice(mode), None);
    };

    match RelayConnection::connect(url).await {
        Ok(connection) => {
            info!(url, "Connected to duel relay");
            (ClientGameState::duel(mode), Some(connection))
        }
        Err(e) => {
            warn!(url, error = %e, "Relay unreachable, falling back to practice");
            (ClientGameState::practice(mode), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppState;
    use crate::client::state::GameType;
    use crate::config::Config;
    use crate::duel::{DuelSession, Position, Slot};
    use crate::http::build_router;
    use std::path::PathBuf;
    use tokio::net::TcpListener;
    use tokio_test::assert_ok;

    async fn spawn_relay() -> String {
        let (session, handle) = DuelSession::new();
        tokio::spawn(session.run());
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            log_json: false,
            static_dir: PathBuf::from("./public"),
            client_origins: Vec::new(),
            move_rate_limit: 30,
        };
        let router = build_router(AppState::new(config, handle));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("ws://{addr}/ws")
    }

    async fn next(connection: &mut RelayConnection) -> ServerMsg {
        timeout(Duration::from_secs(2), connection.recv())
            .await
            .expect("timed out waiting for relay")
            .expect("relay closed")
    }

    #[tokio::test]
    async fn unreachable_relay_falls_back_to_practice() {
        let (state, connection) = start_session(Some("ws://127.0.0.1:1/ws"), GameMode::Free).await;

        assert!(connection.is_none());
        assert_eq!(state.game_type, GameType::Practice);
    }

    #[tokio::test]
    async fn no_url_means_practice() {
        let (state, connection) = start_session(None, GameMode::Free).await;

        assert!(connection.is_none());
        assert_eq!(state.game_type, GameType::Practice);
    }

    #[tokio::test]
    async fn two_clients_duel_through_the_relay() {
        let url = spawn_relay().await;

        let mut a = assert_ok!(RelayConnection::connect(&url).await);
        let a_id = match next(&mut a).await {
            ServerMsg::SlotAssigned {
                slot: Slot::One,
                connection_id,
            } => connection_id,
            other => panic!("unexpected {other:?}"),
        };
        assert!(matches!(next(&mut a).await, ServerMsg::Roster { players } if players.len() == 1));

        let mut b = assert_ok!(RelayConnection::connect(&url).await);
        assert!(matches!(
            next(&mut b).await,
            ServerMsg::SlotAssigned { slot: Slot::Two, .. }
        ));
        assert!(matches!(next(&mut b).await, ServerMsg::Roster { players } if players.len() == 2));
        assert!(matches!(next(&mut a).await, ServerMsg::Roster { players } if players.len() == 2));

        a.send(ClientMsg::Move {
            x: 1.0,
            y: 0.0,
            z: -1.0,
        });
        assert_eq!(
            next(&mut b).await,
            ServerMsg::Moved {
                connection_id: a_id,
                position: Position::new(1.0, 0.0, -1.0),
            }
        );

        b.send(ClientMsg::HitIntent {
            target_connection_id: a_id,
        });
        assert_eq!(
            next(&mut b).await,
            ServerMsg::HealthUpdate {
                connection_id: a_id,
                health: 90,
            }
        );

        drop(a);
        assert_eq!(next(&mut b).await, ServerMsg::Left { connection_id: a_id });
    }

    #[tokio::test]
    async fn third_client_is_told_the_session_is_full() {
        let url = spawn_relay().await;
        let mut a = assert_ok!(RelayConnection::connect(&url).await);
        let mut b = assert_ok!(RelayConnection::connect(&url).await);
        // wait until both joins have been processed
        next(&mut a).await;
        next(&mut b).await;

        let mut c = assert_ok!(RelayConnection::connect(&url).await);

        assert_eq!(
            next(&mut c).await,
            ServerMsg::SessionFull {
                max_participants: 2
            }
        );
        let closed = timeout(Duration::from_secs(2), c.recv()).await.unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn ping_is_answered() {
        let url = spawn_relay().await;
        let mut a = assert_ok!(RelayConnection::connect(&url).await);
        next(&mut a).await;
        next(&mut a).await;

        a.ping();

        assert!(matches!(next(&mut a).await, ServerMsg::Pong { .. }));
    }
}
