//! A headless test harness: connects to a server, joins the first game it
//! sees, marks itself ready and logs every callback until the connection
//! closes.
//!
//! Usage: `network_test <host> <port>`. Exits 0 on a graceful close, 1 on
//! bad arguments.

use knights_client::display::GameDisplay;
use knights_client::{ClientCallbacks, ClientState, KnightsClient};
use knights_protocol::messages::RosterEntry;
use knights_protocol::{ClientPlayerInfo, GameStatus, Menu, Paragraph, PlayerId};
use std::time::{Duration, Instant};

/// Logs everything and remembers the first game name it hears about.
#[derive(Default)]
struct Logger {
    first_game: Option<String>,
    joined: bool,
}

impl ClientCallbacks for Logger {
    fn connection_accepted(&mut self, server_version: i32) {
        println!("connection_accepted version={server_version}");
    }
    fn connection_failed(&mut self, reason: &str) {
        println!("connection_failed reason={reason}");
    }
    fn connection_lost(&mut self) {
        println!("connection_lost");
    }
    fn server_error(&mut self, error: &Paragraph, is_error: bool) {
        println!("announcement key={} is_error={is_error}", error.key);
    }
    fn update_game(&mut self, name: &str, players: u32, observers: u32, status: GameStatus) {
        println!("update_game name={name} players={players} observers={observers} status={status:?}");
        if self.first_game.is_none() {
            self.first_game = Some(name.to_string());
        }
    }
    fn drop_game(&mut self, name: &str) {
        println!("drop_game name={name}");
    }
    fn update_player(&mut self, player: &PlayerId, game: &str, obs: bool) {
        println!("update_player id={player} game={game} obs={obs}");
    }
    fn player_connected(&mut self, player: &PlayerId) {
        println!("player_connected id={player}");
    }
    fn player_disconnected(&mut self, player: &PlayerId) {
        println!("player_disconnected id={player}");
    }
    fn player_list(&mut self, players: &[ClientPlayerInfo]) {
        println!("player_list n={}", players.len());
    }
    fn chat(&mut self, from: &PlayerId, _obs: bool, _team: bool, text: &str) {
        println!("chat from={from}: {text}");
    }
    fn join_accepted(
        &mut self,
        menu: &Menu,
        my_house_colour: u32,
        roster: &[RosterEntry],
        observers: &[PlayerId],
        already_started: bool,
    ) {
        println!(
            "join_accepted menu_items={} colour={my_house_colour:06x} roster={} observers={} started={already_started}",
            menu.items.len(),
            roster.len(),
            observers.len(),
        );
        self.joined = true;
    }
    fn join_denied(&mut self, reason_key: &str) {
        println!("join_denied reason={reason_key}");
    }
    fn load_graphic(&mut self, id: u16, contents: &[u8]) {
        println!("load_graphic id={id} bytes={}", contents.len());
    }
    fn set_menu_selection(&mut self, item: u32, choice: i32, allowed: &[i32]) {
        println!("set_menu_selection item={item} choice={choice} allowed={allowed:?}");
    }
    fn set_quest_description(&mut self, paragraphs: &[Paragraph]) {
        println!("set_quest_description n={}", paragraphs.len());
    }
    fn start_game(&mut self, num_displays: u32, deathmatch: bool, players: &[PlayerId]) {
        println!("start_game displays={num_displays} deathmatch={deathmatch} players={}", players.len());
    }
    fn goto_menu(&mut self) {
        println!("goto_menu");
    }
    fn leave_game(&mut self) {
        println!("leave_game");
    }
    fn set_time_remaining(&mut self, ms: i32) {
        println!("set_time_remaining ms={ms}");
    }
    fn player_is_ready_to_end(&mut self, player: &PlayerId) {
        println!("player_is_ready_to_end id={player}");
    }
    fn voted_to_restart(&mut self, player: &PlayerId, flags: u8, needed: u32) {
        println!("voted_to_restart id={player} flags={flags:#04x} needed={needed}");
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let (host, port) = match (args.get(1), args.get(2).and_then(|p| p.parse::<u16>().ok())) {
        (Some(host), Some(port)) => (host.clone(), port),
        _ => {
            eprintln!("usage: network_test <host> <port>");
            std::process::exit(1);
        }
    };

    let url = format!("ws://{host}:{port}/ws");
    let mut client = match KnightsClient::connect(&url, PlayerId::new("network_test")) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("connect failed: {err}");
            std::process::exit(1);
        }
    };

    let mut callbacks = Logger::default();
    let mut display = GameDisplay::new(250, 100_000, Vec::new());
    let started = Instant::now();
    let mut sent_join = false;
    let mut sent_ready = false;

    loop {
        let now_us = started.elapsed().as_micros() as i64;
        client.update(&mut callbacks, Some(&mut display), now_us);

        let state = client.state().clone();
        match state {
            ClientState::Failed { error_string } => {
                match error_string.as_deref() {
                    Some("Connection closed by server") | None => {
                        println!("closed");
                        std::process::exit(0);
                    }
                    Some(other) => {
                        eprintln!("error: {other}");
                        std::process::exit(0);
                    }
                }
            }
            ClientState::InLobby => {
                if !sent_join
                    && let Some(game) = callbacks.first_game.clone()
                {
                    println!("joining {game}");
                    client.join_game(&game);
                    sent_join = true;
                }
            }
            ClientState::InGameMenu => {
                if !sent_ready {
                    println!("ready");
                    client.set_ready(true);
                    sent_ready = true;
                }
            }
            _ => {}
        }

        std::thread::sleep(Duration::from_millis(20));
    }
}
