//! Per-connection handling: the version handshake, the lobby dispatch and
//! the outbound frame pump.
//!
//! Each websocket gets one receive loop (this module) and one spawned send
//! pump. All outbound traffic for the connection goes through a bounded
//! queue, which keeps the per-player stream strictly FIFO.

use crate::game::GameCmd;
use crate::lobby::{AppState, Presence};
use axum::extract::ws::{Message, WebSocket};
use bytes::{Bytes, BytesMut};
use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, SplitStream, StreamExt};
use knights_protocol::{ClientMessage, PlayerId, SERVER_VERSION, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver, Sender};

/// Encodes one message into a websocket-ready frame.
pub fn frame(msg: &ServerMessage) -> Bytes {
    let mut buf = BytesMut::new();
    msg.encode(&mut buf);
    buf.freeze()
}

/// Drives a whole connection from accept to cleanup.
pub async fn websocket(stream: WebSocket, state: Arc<AppState>) {
    // By splitting, we can send and receive at the same time.
    let (sender, receiver) = stream.split();
    let (out_tx, out_rx) = mpsc::channel::<Bytes>(256);

    let send_task = tokio::spawn(send_pump(sender, out_rx));

    // Version negotiation comes before any other traffic.
    let _ = out_tx
        .send(frame(&ServerMessage::ConnectionAccepted {
            version: SERVER_VERSION,
        }))
        .await;

    let mut session = Session {
        player: None,
        game: None,
    };
    let reason = receive_loop(receiver, &out_tx, &state, &mut session).await;
    cleanup(&state, session).await;
    send_task.abort();
    tracing::info!(reason, "connection closed");
}

/// Forwards queued frames to the socket until either side goes away.
async fn send_pump(mut sender: SplitSink<WebSocket, Message>, mut out_rx: Receiver<Bytes>) {
    while let Some(bytes) = out_rx.recv().await {
        if sender.send(Message::Binary(bytes)).await.is_err() {
            return;
        }
    }
}

struct Session {
    player: Option<PlayerId>,
    game: Option<String>,
}

/// Reads and dispatches client messages until the connection dies. The
/// returned string is the close reason for the log.
async fn receive_loop(
    mut receiver: SplitStream<WebSocket>,
    out_tx: &Sender<Bytes>,
    state: &Arc<AppState>,
    session: &mut Session,
) -> &'static str {
    while let Some(incoming) = receiver.next().await {
        match incoming {
            Ok(Message::Binary(bytes)) => {
                let mut bytes = Bytes::from(bytes);
                let msg = match ClientMessage::decode(&mut bytes) {
                    Ok(msg) => msg,
                    Err(err) => {
                        // Any protocol error tears the connection down.
                        tracing::error!(?err, "undecodable client message");
                        return "Protocol error.";
                    }
                };
                if let Some(reason) = dispatch(msg, out_tx, state, session).await {
                    return reason;
                }
            }
            Ok(Message::Close(_)) => return "Client closed the connection.",
            Ok(_) => {} // We simply ignore ping/pong/text messages.
            Err(_) => return "Connection lost.",
        }
    }
    "Connection lost."
}

/// Handles one message. Returns `Some(reason)` to terminate the connection.
async fn dispatch(
    msg: ClientMessage,
    out_tx: &Sender<Bytes>,
    state: &Arc<AppState>,
    session: &mut Session,
) -> Option<&'static str> {
    // Everything except the introduction needs an established identity.
    if session.player.is_none() && !matches!(msg, ClientMessage::SetPlayerId { .. }) {
        tracing::warn!("message before set_player_id, ignoring");
        return None;
    }

    match msg {
        ClientMessage::SetPlayerId { id, .. } => {
            if session.player.is_some() {
                return None; // renaming mid-session is not a thing
            }
            if id.0.is_empty() {
                let _ = out_tx
                    .send(frame(&ServerMessage::ConnectionFailed {
                        reason: "empty_player_id".into(),
                    }))
                    .await;
                return Some("Empty player id.");
            }
            {
                let mut players = state.players.lock().await;
                if players.contains_key(&id) {
                    drop(players);
                    let _ = out_tx
                        .send(frame(&ServerMessage::ConnectionFailed {
                            reason: "player_id_in_use".into(),
                        }))
                        .await;
                    return Some("Player id already in use.");
                }
                players.insert(
                    id.clone(),
                    Presence {
                        out: out_tx.clone(),
                        game: None,
                    },
                );
            }
            session.player = Some(id.clone());
            state
                .broadcast_lobby(&ServerMessage::PlayerConnected { id })
                .await;
            state.send_game_list(out_tx).await;
        }

        ClientMessage::JoinGame { name } => {
            let player = session.player.clone().expect("checked above");
            if session.game.is_some() {
                return None; // leave first
            }
            let handle = {
                let games = state.games.lock().await;
                games.get(&name).cloned()
            };
            match handle {
                Some(handle) => {
                    let _ = handle
                        .cmd
                        .send(GameCmd::Join {
                            player: player.clone(),
                            out: out_tx.clone(),
                            observer: false,
                        })
                        .await;
                    session.game = Some(name.clone());
                    let mut players = state.players.lock().await;
                    if let Some(presence) = players.get_mut(&player) {
                        presence.game = Some(name);
                    }
                }
                None => {
                    let _ = out_tx
                        .send(frame(&ServerMessage::JoinDenied {
                            reason_key: "no_such_game".into(),
                        }))
                        .await;
                }
            }
        }

        ClientMessage::LeaveGame => {
            if let Some(cmd) = session_game_cmd(state, session).await {
                let player = session.player.clone().expect("checked above");
                let _ = cmd.send(GameCmd::Leave { player: player.clone() }).await;
                session.game = None;
                let mut players = state.players.lock().await;
                if let Some(presence) = players.get_mut(&player) {
                    presence.game = None;
                }
            }
        }

        ClientMessage::Chat { text } => {
            let player = session.player.clone().expect("checked above");
            match session_game_cmd(state, session).await {
                Some(cmd) => {
                    let _ = cmd.send(GameCmd::Chat { player, text }).await;
                }
                None => {
                    // Lobby chat goes to everyone.
                    state
                        .broadcast_lobby(&ServerMessage::Chat {
                            from: player,
                            observer: false,
                            team_only: false,
                            text,
                        })
                        .await;
                }
            }
        }

        ClientMessage::SetMenuSelection { item, choice } => {
            forward(state, session, |player| GameCmd::MenuSelection {
                player,
                item,
                choice,
            })
            .await;
        }
        ClientMessage::SetReady { ready } => {
            forward(state, session, |player| GameCmd::Ready { player, ready }).await;
        }
        ClientMessage::SetObsFlag { observer } => {
            forward(state, session, |player| GameCmd::ObsFlag { player, observer }).await;
        }
        ClientMessage::SetHouseColour { colour } => {
            forward(state, session, |player| GameCmd::HouseColour { player, colour }).await;
        }
        ClientMessage::VoteToRestart { vote } => {
            forward(state, session, |player| GameCmd::VoteRestart { player, vote }).await;
        }
        ClientMessage::ReadyToEnd => {
            forward(state, session, |player| GameCmd::ReadyToEnd { player }).await;
        }
        ClientMessage::GameInput { input } => {
            forward(state, session, |player| GameCmd::Input { player, input }).await;
        }
    }
    None
}

/// The command channel of the game this session is in, if any.
async fn session_game_cmd(
    state: &Arc<AppState>,
    session: &Session,
) -> Option<Sender<GameCmd>> {
    let name = session.game.as_ref()?;
    let games = state.games.lock().await;
    games.get(name).map(|h| h.cmd.clone())
}

/// Builds a command with the session's identity and sends it into the game.
/// No game, no effect: in-game messages from lobby state are just dropped.
async fn forward(
    state: &Arc<AppState>,
    session: &Session,
    make: impl FnOnce(PlayerId) -> GameCmd,
) {
    let Some(player) = session.player.clone() else {
        return;
    };
    if let Some(cmd) = session_game_cmd(state, session).await {
        let _ = cmd.send(make(player)).await;
    }
}

/// Disconnect surfacing: the game sees the player leave, the lobby sees the
/// departure.
async fn cleanup(state: &Arc<AppState>, session: Session) {
    let Some(player) = session.player else { return };
    if let Some(name) = &session.game {
        let cmd = {
            let games = state.games.lock().await;
            games.get(name).map(|h| h.cmd.clone())
        };
        if let Some(cmd) = cmd {
            let _ = cmd
                .send(GameCmd::Disconnect {
                    player: player.clone(),
                })
                .await;
        }
    }
    state.players.lock().await.remove(&player);
    state
        .broadcast_lobby(&ServerMessage::PlayerDisconnected { id: player })
        .await;
}
