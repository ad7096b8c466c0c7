//! Global server state: the connected players, the games they can join and
//! the hot-reloadable server settings.

use bytes::Bytes;
use knights_protocol::{GameStatus, PlayerId, ServerMessage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::mpsc::Sender;
use tokio::sync::{Mutex, RwLock};

use crate::game::GameCmd;

/// On-disk server settings, read from `ServerConfig.json`. Everything has a
/// default so a missing file just starts a plain LAN server.
#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    /// The name shown in LAN discovery replies.
    pub host_name: String,
    /// Games opened at startup.
    pub games: Vec<GameEntry>,
    /// TCP port for the websocket listener.
    pub port: u16,
    /// Set to 0 to disable the UDP discovery responder.
    pub discovery_port: u16,
}

/// One pre-opened game.
#[derive(Serialize, Deserialize, Clone)]
pub struct GameEntry {
    pub name: String,
    /// The maximum amount of players (0 = no limit)
    pub max_players: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host_name: "knights-server".into(),
            games: vec![GameEntry {
                name: "dungeon".into(),
                max_players: 8,
            }],
            port: 16399,
            discovery_port: knights_protocol::discovery::BROADCAST_PORT,
        }
    }
}

/// A connected player's presence, as the lobby sees it.
pub struct Presence {
    /// The connection's outbound frame queue.
    pub out: Sender<Bytes>,
    /// The game this player is currently inside, if any.
    pub game: Option<String>,
}

/// A running game's public face: the command channel into its task plus the
/// numbers the lobby list shows.
#[derive(Clone)]
pub struct GameHandle {
    pub cmd: Sender<GameCmd>,
    pub num_players: u32,
    pub num_observers: u32,
    pub status: GameStatus,
}

/// The application state.
#[derive(Default)]
pub struct AppState {
    pub games: Mutex<HashMap<String, GameHandle>>,
    pub players: Mutex<HashMap<PlayerId, Presence>>,
    pub settings: RwLock<ServerSettings>,
}

impl AppState {
    /// Sends a message to every connected player. Slow or gone receivers are
    /// skipped; their own pump task notices the closed socket.
    pub async fn broadcast_lobby(&self, msg: &ServerMessage) {
        let frame = crate::session::frame(msg);
        let players = self.players.lock().await;
        for presence in players.values() {
            let _ = presence.out.try_send(frame.clone());
        }
    }

    /// Sends one player the current game list.
    pub async fn send_game_list(&self, out: &Sender<Bytes>) {
        let games = self.games.lock().await;
        for (name, handle) in games.iter() {
            let msg = ServerMessage::UpdateGame {
                name: name.clone(),
                num_players: handle.num_players,
                num_observers: handle.num_observers,
                status: handle.status,
            };
            let _ = out.try_send(crate::session::frame(&msg));
        }
    }

    /// Updates the lobby-visible numbers of one game and tells everyone.
    pub async fn publish_game_info(
        &self,
        name: &str,
        num_players: u32,
        num_observers: u32,
        status: GameStatus,
    ) {
        {
            let mut games = self.games.lock().await;
            if let Some(handle) = games.get_mut(name) {
                handle.num_players = num_players;
                handle.num_observers = num_observers;
                handle.status = status;
            }
        }
        self.broadcast_lobby(&ServerMessage::UpdateGame {
            name: name.into(),
            num_players,
            num_observers,
            status,
        })
        .await;
    }

    /// How many players are on the server right now (for discovery pongs).
    pub async fn player_count(&self) -> u16 {
        self.players.lock().await.len() as u16
    }
}

/// Reloads the settings file. Missing file means defaults; a malformed file
/// is an error so a typo cannot silently wipe the game list.
pub async fn reload_settings(state: &Arc<AppState>) -> Result<(), String> {
    let settings = match fs::read_to_string("ServerConfig.json").await {
        Ok(text) => serde_json::from_str::<ServerSettings>(&text)
            .map_err(|e| format!("Failed to parse ServerConfig.json: {e}"))?,
        Err(_) => ServerSettings::default(),
    };
    let mut current = state.settings.write().await;
    *current = settings;
    Ok(())
}
