//! The callback surface for lobby and game-lifecycle events.
//!
//! Dungeon/mini-map/status traffic goes to [`crate::display::GameDisplay`]
//! instead; this trait only carries the events a frontend reacts to
//! structurally (screens changing, lists updating, chat arriving). Every
//! method has a no-op default so implementors pick what they need.

use knights_protocol::messages::RosterEntry;
use knights_protocol::{ClientPlayerInfo, GameStatus, Menu, Paragraph, PlayerId};

#[allow(unused_variables)]
pub trait ClientCallbacks {
    // Any-time events.
    fn connection_accepted(&mut self, server_version: i32) {}
    fn connection_failed(&mut self, reason: &str) {}
    fn connection_lost(&mut self) {}
    fn server_error(&mut self, error: &Paragraph, is_error: bool) {}

    // Lobby events.
    fn update_game(
        &mut self,
        game_name: &str,
        num_players: u32,
        num_observers: u32,
        status: GameStatus,
    ) {
    }
    fn drop_game(&mut self, game_name: &str) {}
    fn update_player(&mut self, player: &PlayerId, game: &str, obs_flag: bool) {}
    fn player_connected(&mut self, player: &PlayerId) {}
    fn player_disconnected(&mut self, player: &PlayerId) {}
    fn player_list(&mut self, players: &[ClientPlayerInfo]) {}
    fn chat(&mut self, from: &PlayerId, observer: bool, team_only: bool, text: &str) {}

    // Join and menu events.
    fn join_accepted(
        &mut self,
        menu: &Menu,
        my_house_colour: u32,
        roster: &[RosterEntry],
        observers: &[PlayerId],
        already_started: bool,
    ) {
    }
    fn join_denied(&mut self, reason_key: &str) {}
    fn load_graphic(&mut self, id: u16, contents: &[u8]) {}
    fn load_sound(&mut self, id: u16, contents: &[u8]) {}
    fn set_menu_selection(&mut self, item: u32, choice: i32, allowed: &[i32]) {}
    fn set_quest_description(&mut self, paragraphs: &[Paragraph]) {}

    // Game lifecycle.
    fn start_game(&mut self, num_displays: u32, deathmatch: bool, players: &[PlayerId]) {}
    fn goto_menu(&mut self) {}
    fn leave_game(&mut self) {}
    fn set_time_remaining(&mut self, milliseconds: i32) {}
    fn player_is_ready_to_end(&mut self, player: &PlayerId) {}
    fn voted_to_restart(&mut self, player: &PlayerId, flags: u8, votes_needed: u32) {}
}

/// A callbacks sink that ignores everything.
pub struct NullCallbacks;

impl ClientCallbacks for NullCallbacks {}
