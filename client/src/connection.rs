//! The connection state machine over the websocket transport.
//!
//! Polling-driven in the same heartbeat style as the rest of the client:
//! call [`KnightsClient::update`] once per frame. Incoming messages drive the
//! state transitions (lobby, quest menu, in game) and are dispatched to the
//! [`ClientCallbacks`] and to an optional [`GameDisplay`]. Errors collapse
//! into [`ClientState::Failed`] with a reason string.

use crate::callbacks::ClientCallbacks;
use crate::display::GameDisplay;
use bytes::{Bytes, BytesMut};
use ewebsock::WsEvent::{Closed, Error, Message};
use ewebsock::{WsMessage, WsReceiver, WsSender};
use knights_protocol::{ClientMessage, GameInput, PlayerId, SERVER_VERSION, ServerMessage};

/// The observable connection lifecycle.
#[derive(Clone, PartialEq, Debug)]
pub enum ClientState {
    /// Transport opened, waiting for the server's version announcement.
    Connecting,
    /// Connected and in the server lobby.
    InLobby,
    /// Inside a game, on the quest selection menu.
    InGameMenu,
    /// Inside a running game.
    InGame,
    /// The connection is gone; the reason tells why.
    Failed { error_string: Option<String> },
}

pub struct KnightsClient {
    sender: WsSender,
    receiver: WsReceiver,
    state: ClientState,
    player_id: PlayerId,
    introduced: bool,
}

impl KnightsClient {
    /// Opens the transport. The handshake completes asynchronously; poll
    /// with [`KnightsClient::update`].
    pub fn connect(url: &str, player_id: PlayerId) -> Result<KnightsClient, String> {
        let options = ewebsock::Options::default();
        let (sender, receiver) = ewebsock::connect(url, options)
            .map_err(|_| "Could not reach websocket api".to_string())?;
        Ok(KnightsClient {
            sender,
            receiver,
            state: ClientState::Connecting,
            player_id,
            introduced: false,
        })
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    fn mark_error(&mut self, error: String) {
        self.state = ClientState::Failed {
            error_string: Some(error),
        };
    }

    /// Sends one client message, silently dropped when not connected.
    pub fn send(&mut self, msg: &ClientMessage) {
        if matches!(self.state, ClientState::Failed { .. }) {
            return;
        }
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        self.sender.send(WsMessage::Binary(buf.to_vec()));
    }

    pub fn join_game(&mut self, name: &str) {
        self.send(&ClientMessage::JoinGame { name: name.into() });
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.send(&ClientMessage::SetReady { ready });
    }

    pub fn chat(&mut self, text: &str) {
        self.send(&ClientMessage::Chat { text: text.into() });
    }

    pub fn game_input(&mut self, input: GameInput) {
        self.send(&ClientMessage::GameInput { input });
    }

    pub fn leave_game(&mut self) {
        self.send(&ClientMessage::LeaveGame);
    }

    /// Drains the socket, updating state and dispatching everything that
    /// arrived. `now_us` stamps dungeon updates for interpolation.
    pub fn update(
        &mut self,
        callbacks: &mut dyn ClientCallbacks,
        display: Option<&mut GameDisplay>,
        now_us: i64,
    ) {
        if matches!(self.state, ClientState::Failed { .. }) {
            return;
        }
        let mut display = display;

        loop {
            let event = match self.receiver.try_recv() {
                Some(event) => event,
                None => return,
            };
            match event {
                Message(WsMessage::Binary(raw)) => {
                    let mut bytes = Bytes::from(raw);
                    let msg = match ServerMessage::decode(&mut bytes) {
                        Ok(msg) => msg,
                        Err(err) => {
                            self.mark_error(format!("Protocol error: {err}"));
                            callbacks.connection_lost();
                            return;
                        }
                    };
                    self.handle(msg, callbacks, display.as_deref_mut(), now_us);
                    if matches!(self.state, ClientState::Failed { .. }) {
                        return;
                    }
                }
                Message(_) => {} // Ignore other message types, keep checking
                Closed => {
                    self.mark_error("Connection closed by server".to_string());
                    callbacks.connection_lost();
                    return;
                }
                Error(context) => {
                    self.mark_error(context.to_string());
                    callbacks.connection_lost();
                    return;
                }
                _ => {}
            }
        }
    }

    fn handle(
        &mut self,
        msg: ServerMessage,
        callbacks: &mut dyn ClientCallbacks,
        display: Option<&mut GameDisplay>,
        now_us: i64,
    ) {
        use ServerMessage::*;

        if GameDisplay::wants(&msg) {
            if let Some(display) = display {
                display.apply(&msg, now_us);
            }
            return;
        }

        match msg {
            ConnectionAccepted { version } => {
                if version != SERVER_VERSION {
                    self.mark_error(format!("Server speaks protocol {version}, not ours"));
                    callbacks.connection_failed("version_mismatch");
                    return;
                }
                callbacks.connection_accepted(version);
                // Introduce ourselves exactly once, then we are in the lobby.
                if !self.introduced {
                    self.introduced = true;
                    let id = self.player_id.clone();
                    self.send(&ClientMessage::SetPlayerId {
                        id,
                        new_control_system: true,
                    });
                }
                self.state = ClientState::InLobby;
            }
            ConnectionFailed { reason } => {
                callbacks.connection_failed(&reason);
                self.mark_error(reason);
            }

            UpdateGame {
                name,
                num_players,
                num_observers,
                status,
            } => callbacks.update_game(&name, num_players, num_observers, status),
            DropGame { name } => callbacks.drop_game(&name),
            UpdatePlayer { id, game, obs_flag } => callbacks.update_player(&id, &game, obs_flag),
            PlayerConnected { id } => callbacks.player_connected(&id),
            PlayerDisconnected { id } => callbacks.player_disconnected(&id),
            Chat {
                from,
                observer,
                team_only,
                text,
            } => callbacks.chat(&from, observer, team_only, &text),
            Announcement { text, is_error } => callbacks.server_error(&text, is_error),
            PlayerList { players } => callbacks.player_list(&players),
            SetTimeRemaining { milliseconds } => callbacks.set_time_remaining(milliseconds),
            PlayerIsReadyToEnd { id } => callbacks.player_is_ready_to_end(&id),
            VotedToRestart {
                id,
                flags,
                votes_needed,
            } => callbacks.voted_to_restart(&id, flags, votes_needed),

            JoinAccepted {
                menu,
                my_house_colour,
                roster,
                observers,
                already_started,
            } => {
                self.state = if already_started {
                    ClientState::InGame
                } else {
                    ClientState::InGameMenu
                };
                callbacks.join_accepted(
                    &menu,
                    my_house_colour,
                    &roster,
                    &observers,
                    already_started,
                );
            }
            JoinDenied { reason_key } => callbacks.join_denied(&reason_key),
            LoadGraphic { id, contents } => callbacks.load_graphic(id, &contents),
            LoadSound { id, contents } => callbacks.load_sound(id, &contents),
            LeaveGame => {
                self.state = ClientState::InLobby;
                callbacks.leave_game();
            }
            GotoMenu => {
                self.state = ClientState::InGameMenu;
                callbacks.goto_menu();
            }

            SetMenuSelection {
                item,
                choice,
                allowed,
            } => callbacks.set_menu_selection(item, choice, &allowed),
            SetQuestDescription { paragraphs } => callbacks.set_quest_description(&paragraphs),

            StartGame {
                num_displays,
                deathmatch,
                players,
                ..
            } => {
                self.state = ClientState::InGame;
                callbacks.start_game(num_displays, deathmatch, &players);
            }

            // Dungeon view traffic is filtered out above.
            _ => {}
        }
    }
}
