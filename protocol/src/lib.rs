//! The message tags and shared wire types used consistently across the server
//! and the client. Every message on the reliable stream starts with one of the
//! tag bytes defined here, followed by the type specific payload.
//!
//! Multi-byte integers are little-endian. Strings are varint-length-prefixed
//! UTF-8. The typed message enums in [`messages`] do the actual encoding and
//! decoding on top of the helpers in [`wire`].

pub mod discovery;
pub mod menu;
pub mod messages;
pub mod types;
pub mod wire;

pub use menu::{Menu, MenuItem};
pub use messages::{ClientMessage, GameInput, ServerMessage};
pub use types::{
    ClientPlayerInfo, ClientState, GameStatus, MiniMapColour, MotionKind, Paragraph, PlayerId,
    PotionMagic,
};
pub use wire::{WireError, WireRead, WireWrite};

/// The protocol version the server announces in `connection_accepted`.
/// A client that sees a different value should disconnect.
pub const SERVER_VERSION: i32 = 1;

/// The single version byte used in the LAN discovery datagrams.
pub const DISCOVERY_VERSION: u8 = 1;

// Server -> Client.

/// The first message on any accepted connection, followed by i32 server version.
pub const CONNECTION_ACCEPTED: u8 = 0x01;
/// The connection could not be serviced. Followed by a reason string.
pub const CONNECTION_FAILED: u8 = 0x02;

/// A game appeared or changed in the lobby list.
pub const UPDATE_GAME: u8 = 0x10;
/// A game disappeared from the lobby list. Followed by the game name.
pub const DROP_GAME: u8 = 0x11;
/// A player joined or left a game, or toggled the observer flag.
pub const UPDATE_PLAYER: u8 = 0x12;
/// A player connected to the server. Followed by the player id.
pub const PLAYER_CONNECTED: u8 = 0x13;
/// A player disconnected from the server. Followed by the player id.
pub const PLAYER_DISCONNECTED: u8 = 0x14;
/// A chat line. Carries sender, observer/team flags and the text.
pub const CHAT: u8 = 0x15;
/// A server announcement. Carries a localisation paragraph and an error flag.
pub const ANNOUNCEMENT: u8 = 0x16;
/// The full player list with per player statistics.
pub const PLAYER_LIST: u8 = 0x17;
/// Remaining game time in milliseconds.
pub const SET_TIME_REMAINING: u8 = 0x18;
/// A player has signalled they are ready to end the game.
pub const PLAYER_IS_READY_TO_END: u8 = 0x19;
/// A restart vote changed. Carries the voter, `VF_*` flags and votes still needed.
pub const VOTED_TO_RESTART: u8 = 0x1A;

/// We were admitted into a game. Carries the menu and the current player roster.
pub const JOIN_ACCEPTED: u8 = 0x20;
/// Our join request was refused. Followed by a reason localisation key.
pub const JOIN_DENIED: u8 = 0x21;
/// A graphic resource blob. Sent before `start_game` needs it.
pub const LOAD_GRAPHIC: u8 = 0x22;
/// A sound resource blob. Sent before `start_game` needs it.
pub const LOAD_SOUND: u8 = 0x23;
/// We have left the game and are back in the lobby.
pub const LEAVE_GAME: u8 = 0x24;
/// The game has ended; go back to the quest selection menu.
pub const GOTO_MENU: u8 = 0x25;

/// An authoritative menu selection, including the allowed values.
pub const SET_MENU_SELECTION: u8 = 0x30;
/// The localised quest description paragraphs.
pub const SET_QUEST_DESCRIPTION: u8 = 0x31;

/// The game starts. Carries display count, deathmatch flag and the player order.
pub const START_GAME: u8 = 0x40;

// Dungeon view updates (0x50 block).

pub const DVIEW_SET_CURRENT_ROOM: u8 = 0x50;
pub const DVIEW_ADD_ENTITY: u8 = 0x51;
pub const DVIEW_RM_ENTITY: u8 = 0x52;
pub const DVIEW_MOVE_ENTITY: u8 = 0x53;
pub const DVIEW_REPOSITION_ENTITY: u8 = 0x54;
pub const DVIEW_FLIP_ENTITY_MOTION: u8 = 0x55;
pub const DVIEW_SET_ANIM_DATA: u8 = 0x56;
pub const DVIEW_SET_FACING: u8 = 0x57;
pub const DVIEW_SET_SPEECH_BUBBLE: u8 = 0x58;
pub const DVIEW_CLEAR_TILES: u8 = 0x59;
pub const DVIEW_SET_TILE: u8 = 0x5A;
pub const DVIEW_SET_ITEM: u8 = 0x5B;
pub const DVIEW_PLACE_ICON: u8 = 0x5C;
pub const DVIEW_FLASH_MESSAGE: u8 = 0x5D;
pub const DVIEW_CANCEL_CONTINUOUS_MESSAGES: u8 = 0x5E;
pub const DVIEW_ADD_CONTINUOUS_MESSAGE: u8 = 0x5F;

// Mini map updates (0x60 block).

pub const MINIMAP_SET_SIZE: u8 = 0x60;
pub const MINIMAP_SET_COLOUR: u8 = 0x61;
pub const MINIMAP_WIPE: u8 = 0x62;
pub const MINIMAP_KNIGHT_LOCATION: u8 = 0x63;
pub const MINIMAP_ITEM_LOCATION: u8 = 0x64;

// Status display updates (0x70 block).

pub const STATUS_SET_BACKPACK: u8 = 0x70;
pub const STATUS_ADD_SKULL: u8 = 0x71;
pub const STATUS_SET_HEALTH: u8 = 0x72;
pub const STATUS_SET_POTION_MAGIC: u8 = 0x73;
pub const STATUS_SET_QUEST_HINTS: u8 = 0x74;

// Client -> Server.

/// Ask to join the named game.
pub const JOIN_GAME: u8 = 0x80;
/// Introduce ourselves. Carries the player id and the control system flag.
pub const SET_PLAYER_ID: u8 = 0x81;
/// Request a menu selection. The server validates and broadcasts the result.
pub const REQUEST_MENU_SELECTION: u8 = 0x82;
/// Toggle the ready-to-start flag.
pub const SET_READY: u8 = 0x83;
/// Toggle the observer flag.
pub const SET_OBS_FLAG: u8 = 0x84;
/// Pick a house colour.
pub const SET_HOUSE_COLOUR: u8 = 0x85;
/// A chat line from this client.
pub const SEND_CHAT: u8 = 0x86;
/// Vote for (or cancel a vote for) a restart.
pub const VOTE_TO_RESTART: u8 = 0x87;
/// Leave the current game and return to the lobby.
pub const REQUEST_LEAVE_GAME: u8 = 0x88;
/// Signal that this player is ready to end the game.
pub const READY_TO_END: u8 = 0x89;

/// An in-game input intent. The server validates before acting.
pub const GAME_INPUT: u8 = 0x90;
