//! The typed messages exchanged on the reliable ordered stream.
//!
//! [`ServerMessage`] flows server to client, [`ClientMessage`] the other way.
//! Both encode as a single tag byte followed by the payload fields in the
//! order they are declared here. Unknown tags and short reads fail decoding,
//! which terminates the connection.

use crate::menu::Menu;
use crate::types::{
    ClientPlayerInfo, ClientState, GameStatus, MiniMapColour, MotionKind, Paragraph, PlayerId,
    PotionMagic,
};
use crate::wire::{WireError, WireRead, WireWrite};
use crate::*;
use bytes::{Buf, BufMut};

/// Entity flag bit: the entity is invisible (shown semi-transparent to its
/// own player, hidden from others).
pub const EF_INVISIBLE: u8 = 1;
/// Entity flag bit: the entity is invulnerable.
pub const EF_INVULNERABLE: u8 = 2;
/// Anim-data flag bit: apply the change before the final queued move.
pub const EF_DURING_MOTION: u8 = 4;

/// One member of the roster sent in `join_accepted`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: PlayerId,
    pub ready: bool,
    pub house_colour: u32,
}

/// An in-game input intent. The server treats these as requests and checks
/// occupancy, range, stun and possession before acting.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GameInput {
    /// Ask to act in a direction (move, approach, open, pick up...).
    Direction(u8),
    /// Swing the held weapon.
    Swing,
    /// Use the item in hand.
    UseItem,
    /// An abstract control id from the new control system.
    Control(i32),
}

impl GameInput {
    fn encode(&self, buf: &mut impl BufMut) {
        match self {
            GameInput::Direction(dir) => {
                buf.write_u8(0);
                buf.write_u8(*dir);
            }
            GameInput::Swing => buf.write_u8(1),
            GameInput::UseItem => buf.write_u8(2),
            GameInput::Control(id) => {
                buf.write_u8(3);
                buf.write_i32(*id);
            }
        }
    }

    fn decode(buf: &mut impl Buf) -> Result<Self, WireError> {
        match buf.read_u8()? {
            0 => {
                let dir = buf.read_u8()?;
                if dir > 3 {
                    return Err(WireError::BadValue("direction"));
                }
                Ok(GameInput::Direction(dir))
            }
            1 => Ok(GameInput::Swing),
            2 => Ok(GameInput::UseItem),
            3 => Ok(GameInput::Control(buf.read_i32()?)),
            _ => Err(WireError::BadValue("game input kind")),
        }
    }
}

/// Everything the server can say to a client.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    ConnectionAccepted {
        version: i32,
    },
    ConnectionFailed {
        reason: String,
    },

    UpdateGame {
        name: String,
        num_players: u32,
        num_observers: u32,
        status: GameStatus,
    },
    DropGame {
        name: String,
    },
    UpdatePlayer {
        id: PlayerId,
        game: String,
        obs_flag: bool,
    },
    PlayerConnected {
        id: PlayerId,
    },
    PlayerDisconnected {
        id: PlayerId,
    },
    Chat {
        from: PlayerId,
        observer: bool,
        team_only: bool,
        text: String,
    },
    Announcement {
        text: Paragraph,
        is_error: bool,
    },
    PlayerList {
        players: Vec<ClientPlayerInfo>,
    },
    SetTimeRemaining {
        milliseconds: i32,
    },
    PlayerIsReadyToEnd {
        id: PlayerId,
    },
    VotedToRestart {
        id: PlayerId,
        flags: u8,
        votes_needed: u32,
    },

    JoinAccepted {
        menu: Menu,
        my_house_colour: u32,
        roster: Vec<RosterEntry>,
        observers: Vec<PlayerId>,
        already_started: bool,
    },
    JoinDenied {
        reason_key: String,
    },
    LoadGraphic {
        id: u16,
        contents: Vec<u8>,
    },
    LoadSound {
        id: u16,
        contents: Vec<u8>,
    },
    LeaveGame,
    GotoMenu,

    SetMenuSelection {
        item: u32,
        choice: i32,
        allowed: Vec<i32>,
    },
    SetQuestDescription {
        paragraphs: Vec<Paragraph>,
    },

    StartGame {
        num_displays: u32,
        deathmatch: bool,
        players: Vec<PlayerId>,
        already_started: bool,
    },

    // Dungeon view.
    SetCurrentRoom {
        room: u16,
        width: u16,
        height: u16,
    },
    AddEntity {
        id: u16,
        x: i16,
        y: i16,
        height: u8,
        facing: u8,
        anim: u16,
        overlay: u16,
        frame: u8,
        anim_zero_delta_ms: u32,
        flags: u8,
        cur_offset: i16,
        motion: MotionKind,
        motion_remaining_ms: u32,
        player: PlayerId,
    },
    RmEntity {
        id: u16,
    },
    MoveEntity {
        id: u16,
        motion: MotionKind,
        duration_ms: u32,
        missile_mode: bool,
    },
    RepositionEntity {
        id: u16,
        x: i16,
        y: i16,
    },
    FlipEntityMotion {
        id: u16,
        initial_delay_ms: u32,
        duration_ms: u32,
    },
    SetAnimData {
        id: u16,
        anim: u16,
        overlay: u16,
        frame: u8,
        anim_zero_delta_ms: u32,
        flags: u8,
    },
    SetFacing {
        id: u16,
        facing: u8,
    },
    SetSpeechBubble {
        id: u16,
        show: bool,
    },
    ClearTiles {
        x: i16,
        y: i16,
        force: bool,
    },
    SetTile {
        x: i16,
        y: i16,
        depth: u8,
        graphic: u16,
        /// Colour change id, 0 for none.
        colour_change: u16,
        force: bool,
    },
    SetItem {
        x: i16,
        y: i16,
        /// Item graphic, 0 for no item.
        graphic: u16,
        force: bool,
    },
    PlaceIcon {
        x: i16,
        y: i16,
        graphic: u16,
        duration_ms: u32,
    },
    FlashMessage {
        text: Paragraph,
        num_times: u32,
    },
    CancelContinuousMessages,
    AddContinuousMessage {
        text: Paragraph,
    },

    // Mini map.
    MiniMapSetSize {
        width: u16,
        height: u16,
    },
    MiniMapSetColour {
        x: u16,
        y: u16,
        colour: MiniMapColour,
    },
    MiniMapWipe,
    MapKnightLocation {
        slot: u8,
        /// (-1, -1) removes the marker.
        x: i16,
        y: i16,
    },
    MapItemLocation {
        x: i16,
        y: i16,
        on: bool,
    },

    // Status display.
    SetBackpack {
        slot: u8,
        graphic: u16,
        overdraw: u16,
        num_carried: u8,
        num_max: u8,
    },
    AddSkull,
    SetHealth {
        health: i16,
    },
    SetPotionMagic {
        magic: PotionMagic,
        poison_immune: bool,
    },
    SetQuestHints {
        hints: Vec<String>,
    },
}

impl ServerMessage {
    pub fn encode(&self, buf: &mut impl BufMut) {
        use ServerMessage::*;
        match self {
            ConnectionAccepted { version } => {
                buf.write_u8(CONNECTION_ACCEPTED);
                buf.write_i32(*version);
            }
            ConnectionFailed { reason } => {
                buf.write_u8(CONNECTION_FAILED);
                buf.write_string(reason);
            }
            UpdateGame {
                name,
                num_players,
                num_observers,
                status,
            } => {
                buf.write_u8(UPDATE_GAME);
                buf.write_string(name);
                buf.write_varint(u64::from(*num_players));
                buf.write_varint(u64::from(*num_observers));
                buf.write_u8(*status as u8);
            }
            DropGame { name } => {
                buf.write_u8(DROP_GAME);
                buf.write_string(name);
            }
            UpdatePlayer { id, game, obs_flag } => {
                buf.write_u8(UPDATE_PLAYER);
                id.encode(buf);
                buf.write_string(game);
                buf.write_bool(*obs_flag);
            }
            PlayerConnected { id } => {
                buf.write_u8(PLAYER_CONNECTED);
                id.encode(buf);
            }
            PlayerDisconnected { id } => {
                buf.write_u8(PLAYER_DISCONNECTED);
                id.encode(buf);
            }
            Chat {
                from,
                observer,
                team_only,
                text,
            } => {
                buf.write_u8(CHAT);
                from.encode(buf);
                buf.write_bool(*observer);
                buf.write_bool(*team_only);
                buf.write_string(text);
            }
            Announcement { text, is_error } => {
                buf.write_u8(ANNOUNCEMENT);
                text.encode(buf);
                buf.write_bool(*is_error);
            }
            PlayerList { players } => {
                buf.write_u8(PLAYER_LIST);
                buf.write_varint(players.len() as u64);
                for p in players {
                    p.encode(buf);
                }
            }
            SetTimeRemaining { milliseconds } => {
                buf.write_u8(SET_TIME_REMAINING);
                buf.write_i32(*milliseconds);
            }
            PlayerIsReadyToEnd { id } => {
                buf.write_u8(PLAYER_IS_READY_TO_END);
                id.encode(buf);
            }
            VotedToRestart {
                id,
                flags,
                votes_needed,
            } => {
                buf.write_u8(VOTED_TO_RESTART);
                id.encode(buf);
                buf.write_u8(*flags);
                buf.write_varint(u64::from(*votes_needed));
            }
            JoinAccepted {
                menu,
                my_house_colour,
                roster,
                observers,
                already_started,
            } => {
                buf.write_u8(JOIN_ACCEPTED);
                menu.serialize(buf);
                buf.write_i32(*my_house_colour as i32);
                buf.write_varint(roster.len() as u64);
                for entry in roster {
                    entry.id.encode(buf);
                }
                for entry in roster {
                    buf.write_bool(entry.ready);
                }
                for entry in roster {
                    buf.write_i32(entry.house_colour as i32);
                }
                buf.write_varint(observers.len() as u64);
                for obs in observers {
                    obs.encode(buf);
                }
                buf.write_bool(*already_started);
            }
            JoinDenied { reason_key } => {
                buf.write_u8(JOIN_DENIED);
                buf.write_string(reason_key);
            }
            LoadGraphic { id, contents } => {
                buf.write_u8(LOAD_GRAPHIC);
                buf.write_u16(*id);
                buf.write_blob(contents);
            }
            LoadSound { id, contents } => {
                buf.write_u8(LOAD_SOUND);
                buf.write_u16(*id);
                buf.write_blob(contents);
            }
            LeaveGame => buf.write_u8(LEAVE_GAME),
            GotoMenu => buf.write_u8(GOTO_MENU),
            SetMenuSelection {
                item,
                choice,
                allowed,
            } => {
                buf.write_u8(SET_MENU_SELECTION);
                buf.write_varint(u64::from(*item));
                buf.write_i32(*choice);
                buf.write_varint(allowed.len() as u64);
                for a in allowed {
                    buf.write_i32(*a);
                }
            }
            SetQuestDescription { paragraphs } => {
                buf.write_u8(SET_QUEST_DESCRIPTION);
                buf.write_varint(paragraphs.len() as u64);
                for p in paragraphs {
                    p.encode(buf);
                }
            }
            StartGame {
                num_displays,
                deathmatch,
                players,
                already_started,
            } => {
                buf.write_u8(START_GAME);
                buf.write_varint(u64::from(*num_displays));
                buf.write_bool(*deathmatch);
                buf.write_varint(players.len() as u64);
                for p in players {
                    p.encode(buf);
                }
                buf.write_bool(*already_started);
            }
            SetCurrentRoom {
                room,
                width,
                height,
            } => {
                buf.write_u8(DVIEW_SET_CURRENT_ROOM);
                buf.write_u16(*room);
                buf.write_u16(*width);
                buf.write_u16(*height);
            }
            AddEntity {
                id,
                x,
                y,
                height,
                facing,
                anim,
                overlay,
                frame,
                anim_zero_delta_ms,
                flags,
                cur_offset,
                motion,
                motion_remaining_ms,
                player,
            } => {
                buf.write_u8(DVIEW_ADD_ENTITY);
                buf.write_u16(*id);
                buf.write_i16(*x);
                buf.write_i16(*y);
                buf.write_u8(*height);
                buf.write_u8(*facing);
                buf.write_u16(*anim);
                buf.write_u16(*overlay);
                buf.write_u8(*frame);
                buf.write_varint(u64::from(*anim_zero_delta_ms));
                buf.write_u8(*flags);
                buf.write_i16(*cur_offset);
                buf.write_u8(*motion as u8);
                buf.write_varint(u64::from(*motion_remaining_ms));
                player.encode(buf);
            }
            RmEntity { id } => {
                buf.write_u8(DVIEW_RM_ENTITY);
                buf.write_u16(*id);
            }
            MoveEntity {
                id,
                motion,
                duration_ms,
                missile_mode,
            } => {
                buf.write_u8(DVIEW_MOVE_ENTITY);
                buf.write_u16(*id);
                buf.write_u8(*motion as u8);
                buf.write_varint(u64::from(*duration_ms));
                buf.write_bool(*missile_mode);
            }
            RepositionEntity { id, x, y } => {
                buf.write_u8(DVIEW_REPOSITION_ENTITY);
                buf.write_u16(*id);
                buf.write_i16(*x);
                buf.write_i16(*y);
            }
            FlipEntityMotion {
                id,
                initial_delay_ms,
                duration_ms,
            } => {
                buf.write_u8(DVIEW_FLIP_ENTITY_MOTION);
                buf.write_u16(*id);
                buf.write_varint(u64::from(*initial_delay_ms));
                buf.write_varint(u64::from(*duration_ms));
            }
            SetAnimData {
                id,
                anim,
                overlay,
                frame,
                anim_zero_delta_ms,
                flags,
            } => {
                buf.write_u8(DVIEW_SET_ANIM_DATA);
                buf.write_u16(*id);
                buf.write_u16(*anim);
                buf.write_u16(*overlay);
                buf.write_u8(*frame);
                buf.write_varint(u64::from(*anim_zero_delta_ms));
                buf.write_u8(*flags);
            }
            SetFacing { id, facing } => {
                buf.write_u8(DVIEW_SET_FACING);
                buf.write_u16(*id);
                buf.write_u8(*facing);
            }
            SetSpeechBubble { id, show } => {
                buf.write_u8(DVIEW_SET_SPEECH_BUBBLE);
                buf.write_u16(*id);
                buf.write_bool(*show);
            }
            ClearTiles { x, y, force } => {
                buf.write_u8(DVIEW_CLEAR_TILES);
                buf.write_i16(*x);
                buf.write_i16(*y);
                buf.write_bool(*force);
            }
            SetTile {
                x,
                y,
                depth,
                graphic,
                colour_change,
                force,
            } => {
                buf.write_u8(DVIEW_SET_TILE);
                buf.write_i16(*x);
                buf.write_i16(*y);
                buf.write_u8(*depth);
                buf.write_u16(*graphic);
                buf.write_u16(*colour_change);
                buf.write_bool(*force);
            }
            SetItem { x, y, graphic, force } => {
                buf.write_u8(DVIEW_SET_ITEM);
                buf.write_i16(*x);
                buf.write_i16(*y);
                buf.write_u16(*graphic);
                buf.write_bool(*force);
            }
            PlaceIcon {
                x,
                y,
                graphic,
                duration_ms,
            } => {
                buf.write_u8(DVIEW_PLACE_ICON);
                buf.write_i16(*x);
                buf.write_i16(*y);
                buf.write_u16(*graphic);
                buf.write_varint(u64::from(*duration_ms));
            }
            FlashMessage { text, num_times } => {
                buf.write_u8(DVIEW_FLASH_MESSAGE);
                text.encode(buf);
                buf.write_varint(u64::from(*num_times));
            }
            CancelContinuousMessages => buf.write_u8(DVIEW_CANCEL_CONTINUOUS_MESSAGES),
            AddContinuousMessage { text } => {
                buf.write_u8(DVIEW_ADD_CONTINUOUS_MESSAGE);
                text.encode(buf);
            }
            MiniMapSetSize { width, height } => {
                buf.write_u8(MINIMAP_SET_SIZE);
                buf.write_u16(*width);
                buf.write_u16(*height);
            }
            MiniMapSetColour { x, y, colour } => {
                buf.write_u8(MINIMAP_SET_COLOUR);
                buf.write_u16(*x);
                buf.write_u16(*y);
                buf.write_u8(*colour as u8);
            }
            MiniMapWipe => buf.write_u8(MINIMAP_WIPE),
            MapKnightLocation { slot, x, y } => {
                buf.write_u8(MINIMAP_KNIGHT_LOCATION);
                buf.write_u8(*slot);
                buf.write_i16(*x);
                buf.write_i16(*y);
            }
            MapItemLocation { x, y, on } => {
                buf.write_u8(MINIMAP_ITEM_LOCATION);
                buf.write_i16(*x);
                buf.write_i16(*y);
                buf.write_bool(*on);
            }
            SetBackpack {
                slot,
                graphic,
                overdraw,
                num_carried,
                num_max,
            } => {
                buf.write_u8(STATUS_SET_BACKPACK);
                buf.write_u8(*slot);
                buf.write_u16(*graphic);
                buf.write_u16(*overdraw);
                buf.write_u8(*num_carried);
                buf.write_u8(*num_max);
            }
            AddSkull => buf.write_u8(STATUS_ADD_SKULL),
            SetHealth { health } => {
                buf.write_u8(STATUS_SET_HEALTH);
                buf.write_i16(*health);
            }
            SetPotionMagic {
                magic,
                poison_immune,
            } => {
                buf.write_u8(STATUS_SET_POTION_MAGIC);
                buf.write_u8(*magic as u8);
                buf.write_bool(*poison_immune);
            }
            SetQuestHints { hints } => {
                buf.write_u8(STATUS_SET_QUEST_HINTS);
                buf.write_varint(hints.len() as u64);
                for h in hints {
                    buf.write_string(h);
                }
            }
        }
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, WireError> {
        use ServerMessage::*;
        let tag = buf.read_u8()?;
        let msg = match tag {
            CONNECTION_ACCEPTED => ConnectionAccepted {
                version: buf.read_i32()?,
            },
            CONNECTION_FAILED => ConnectionFailed {
                reason: buf.read_string()?,
            },
            UPDATE_GAME => UpdateGame {
                name: buf.read_string()?,
                num_players: buf.read_varint()? as u32,
                num_observers: buf.read_varint()? as u32,
                status: GameStatus::from_u8(buf.read_u8()?)?,
            },
            DROP_GAME => DropGame {
                name: buf.read_string()?,
            },
            UPDATE_PLAYER => UpdatePlayer {
                id: PlayerId::decode(buf)?,
                game: buf.read_string()?,
                obs_flag: buf.read_bool()?,
            },
            PLAYER_CONNECTED => PlayerConnected {
                id: PlayerId::decode(buf)?,
            },
            PLAYER_DISCONNECTED => PlayerDisconnected {
                id: PlayerId::decode(buf)?,
            },
            CHAT => Chat {
                from: PlayerId::decode(buf)?,
                observer: buf.read_bool()?,
                team_only: buf.read_bool()?,
                text: buf.read_string()?,
            },
            ANNOUNCEMENT => Announcement {
                text: Paragraph::decode(buf)?,
                is_error: buf.read_bool()?,
            },
            PLAYER_LIST => {
                let n = buf.read_varint()? as usize;
                let mut players = Vec::with_capacity(n.min(256));
                for _ in 0..n {
                    players.push(ClientPlayerInfo::decode(buf)?);
                }
                PlayerList { players }
            }
            SET_TIME_REMAINING => SetTimeRemaining {
                milliseconds: buf.read_i32()?,
            },
            PLAYER_IS_READY_TO_END => PlayerIsReadyToEnd {
                id: PlayerId::decode(buf)?,
            },
            VOTED_TO_RESTART => VotedToRestart {
                id: PlayerId::decode(buf)?,
                flags: buf.read_u8()?,
                votes_needed: buf.read_varint()? as u32,
            },
            JOIN_ACCEPTED => {
                let menu = Menu::deserialize(buf)?;
                let my_house_colour = buf.read_i32()? as u32 & 0xff_ff_ff;
                let n = buf.read_varint()? as usize;
                if n > 256 {
                    return Err(WireError::BadValue("roster size"));
                }
                let mut ids = Vec::with_capacity(n);
                for _ in 0..n {
                    ids.push(PlayerId::decode(buf)?);
                }
                let mut ready = Vec::with_capacity(n);
                for _ in 0..n {
                    ready.push(buf.read_bool()?);
                }
                let mut cols = Vec::with_capacity(n);
                for _ in 0..n {
                    cols.push(buf.read_i32()? as u32 & 0xff_ff_ff);
                }
                let roster = ids
                    .into_iter()
                    .zip(ready)
                    .zip(cols)
                    .map(|((id, ready), house_colour)| RosterEntry {
                        id,
                        ready,
                        house_colour,
                    })
                    .collect();
                let m = buf.read_varint()? as usize;
                if m > 256 {
                    return Err(WireError::BadValue("observer count"));
                }
                let mut observers = Vec::with_capacity(m);
                for _ in 0..m {
                    observers.push(PlayerId::decode(buf)?);
                }
                JoinAccepted {
                    menu,
                    my_house_colour,
                    roster,
                    observers,
                    already_started: buf.read_bool()?,
                }
            }
            JOIN_DENIED => JoinDenied {
                reason_key: buf.read_string()?,
            },
            LOAD_GRAPHIC => LoadGraphic {
                id: buf.read_u16()?,
                contents: buf.read_blob()?,
            },
            LOAD_SOUND => LoadSound {
                id: buf.read_u16()?,
                contents: buf.read_blob()?,
            },
            LEAVE_GAME => LeaveGame,
            GOTO_MENU => GotoMenu,
            SET_MENU_SELECTION => {
                let item = buf.read_varint()? as u32;
                let choice = buf.read_i32()?;
                let n = buf.read_varint()? as usize;
                if n > 10_000 {
                    return Err(WireError::BadValue("allowed value count"));
                }
                let mut allowed = Vec::with_capacity(n);
                for _ in 0..n {
                    allowed.push(buf.read_i32()?);
                }
                SetMenuSelection {
                    item,
                    choice,
                    allowed,
                }
            }
            SET_QUEST_DESCRIPTION => {
                let n = buf.read_varint()? as usize;
                if n > 1000 {
                    return Err(WireError::BadValue("paragraph count"));
                }
                let mut paragraphs = Vec::with_capacity(n);
                for _ in 0..n {
                    paragraphs.push(Paragraph::decode(buf)?);
                }
                SetQuestDescription { paragraphs }
            }
            START_GAME => {
                let num_displays = buf.read_varint()? as u32;
                let deathmatch = buf.read_bool()?;
                let n = buf.read_varint()? as usize;
                if n > 256 {
                    return Err(WireError::BadValue("player count"));
                }
                let mut players = Vec::with_capacity(n);
                for _ in 0..n {
                    players.push(PlayerId::decode(buf)?);
                }
                StartGame {
                    num_displays,
                    deathmatch,
                    players,
                    already_started: buf.read_bool()?,
                }
            }
            DVIEW_SET_CURRENT_ROOM => SetCurrentRoom {
                room: buf.read_u16()?,
                width: buf.read_u16()?,
                height: buf.read_u16()?,
            },
            DVIEW_ADD_ENTITY => AddEntity {
                id: buf.read_u16()?,
                x: buf.read_i16()?,
                y: buf.read_i16()?,
                height: buf.read_u8()?,
                facing: buf.read_u8()?,
                anim: buf.read_u16()?,
                overlay: buf.read_u16()?,
                frame: buf.read_u8()?,
                anim_zero_delta_ms: buf.read_varint()? as u32,
                flags: buf.read_u8()?,
                cur_offset: buf.read_i16()?,
                motion: MotionKind::from_u8(buf.read_u8()?)?,
                motion_remaining_ms: buf.read_varint()? as u32,
                player: PlayerId::decode(buf)?,
            },
            DVIEW_RM_ENTITY => RmEntity {
                id: buf.read_u16()?,
            },
            DVIEW_MOVE_ENTITY => MoveEntity {
                id: buf.read_u16()?,
                motion: MotionKind::from_u8(buf.read_u8()?)?,
                duration_ms: buf.read_varint()? as u32,
                missile_mode: buf.read_bool()?,
            },
            DVIEW_REPOSITION_ENTITY => RepositionEntity {
                id: buf.read_u16()?,
                x: buf.read_i16()?,
                y: buf.read_i16()?,
            },
            DVIEW_FLIP_ENTITY_MOTION => FlipEntityMotion {
                id: buf.read_u16()?,
                initial_delay_ms: buf.read_varint()? as u32,
                duration_ms: buf.read_varint()? as u32,
            },
            DVIEW_SET_ANIM_DATA => SetAnimData {
                id: buf.read_u16()?,
                anim: buf.read_u16()?,
                overlay: buf.read_u16()?,
                frame: buf.read_u8()?,
                anim_zero_delta_ms: buf.read_varint()? as u32,
                flags: buf.read_u8()?,
            },
            DVIEW_SET_FACING => SetFacing {
                id: buf.read_u16()?,
                facing: buf.read_u8()?,
            },
            DVIEW_SET_SPEECH_BUBBLE => SetSpeechBubble {
                id: buf.read_u16()?,
                show: buf.read_bool()?,
            },
            DVIEW_CLEAR_TILES => ClearTiles {
                x: buf.read_i16()?,
                y: buf.read_i16()?,
                force: buf.read_bool()?,
            },
            DVIEW_SET_TILE => SetTile {
                x: buf.read_i16()?,
                y: buf.read_i16()?,
                depth: buf.read_u8()?,
                graphic: buf.read_u16()?,
                colour_change: buf.read_u16()?,
                force: buf.read_bool()?,
            },
            DVIEW_SET_ITEM => SetItem {
                x: buf.read_i16()?,
                y: buf.read_i16()?,
                graphic: buf.read_u16()?,
                force: buf.read_bool()?,
            },
            DVIEW_PLACE_ICON => PlaceIcon {
                x: buf.read_i16()?,
                y: buf.read_i16()?,
                graphic: buf.read_u16()?,
                duration_ms: buf.read_varint()? as u32,
            },
            DVIEW_FLASH_MESSAGE => FlashMessage {
                text: Paragraph::decode(buf)?,
                num_times: buf.read_varint()? as u32,
            },
            DVIEW_CANCEL_CONTINUOUS_MESSAGES => CancelContinuousMessages,
            DVIEW_ADD_CONTINUOUS_MESSAGE => AddContinuousMessage {
                text: Paragraph::decode(buf)?,
            },
            MINIMAP_SET_SIZE => MiniMapSetSize {
                width: buf.read_u16()?,
                height: buf.read_u16()?,
            },
            MINIMAP_SET_COLOUR => MiniMapSetColour {
                x: buf.read_u16()?,
                y: buf.read_u16()?,
                colour: MiniMapColour::from_u8(buf.read_u8()?)?,
            },
            MINIMAP_WIPE => MiniMapWipe,
            MINIMAP_KNIGHT_LOCATION => MapKnightLocation {
                slot: buf.read_u8()?,
                x: buf.read_i16()?,
                y: buf.read_i16()?,
            },
            MINIMAP_ITEM_LOCATION => MapItemLocation {
                x: buf.read_i16()?,
                y: buf.read_i16()?,
                on: buf.read_bool()?,
            },
            STATUS_SET_BACKPACK => SetBackpack {
                slot: buf.read_u8()?,
                graphic: buf.read_u16()?,
                overdraw: buf.read_u16()?,
                num_carried: buf.read_u8()?,
                num_max: buf.read_u8()?,
            },
            STATUS_ADD_SKULL => AddSkull,
            STATUS_SET_HEALTH => SetHealth {
                health: buf.read_i16()?,
            },
            STATUS_SET_POTION_MAGIC => SetPotionMagic {
                magic: PotionMagic::from_u8(buf.read_u8()?)?,
                poison_immune: buf.read_bool()?,
            },
            STATUS_SET_QUEST_HINTS => {
                let n = buf.read_varint()? as usize;
                if n > 1000 {
                    return Err(WireError::BadValue("hint count"));
                }
                let mut hints = Vec::with_capacity(n);
                for _ in 0..n {
                    hints.push(buf.read_string()?);
                }
                SetQuestHints { hints }
            }
            other => return Err(WireError::UnknownTag(other)),
        };
        Ok(msg)
    }
}

/// Everything a client can say to the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    JoinGame { name: String },
    SetPlayerId { id: PlayerId, new_control_system: bool },
    SetMenuSelection { item: u32, choice: i32 },
    SetReady { ready: bool },
    SetObsFlag { observer: bool },
    SetHouseColour { colour: u32 },
    Chat { text: String },
    VoteToRestart { vote: bool },
    LeaveGame,
    ReadyToEnd,
    GameInput { input: GameInput },
}

impl ClientMessage {
    pub fn encode(&self, buf: &mut impl BufMut) {
        use ClientMessage::*;
        match self {
            JoinGame { name } => {
                buf.write_u8(JOIN_GAME);
                buf.write_string(name);
            }
            SetPlayerId {
                id,
                new_control_system,
            } => {
                buf.write_u8(SET_PLAYER_ID);
                id.encode(buf);
                buf.write_bool(*new_control_system);
            }
            SetMenuSelection { item, choice } => {
                buf.write_u8(REQUEST_MENU_SELECTION);
                buf.write_varint(u64::from(*item));
                buf.write_i32(*choice);
            }
            SetReady { ready } => {
                buf.write_u8(SET_READY);
                buf.write_bool(*ready);
            }
            SetObsFlag { observer } => {
                buf.write_u8(SET_OBS_FLAG);
                buf.write_bool(*observer);
            }
            SetHouseColour { colour } => {
                buf.write_u8(SET_HOUSE_COLOUR);
                buf.write_i32(*colour as i32);
            }
            Chat { text } => {
                buf.write_u8(SEND_CHAT);
                buf.write_string(text);
            }
            VoteToRestart { vote } => {
                buf.write_u8(VOTE_TO_RESTART);
                buf.write_bool(*vote);
            }
            LeaveGame => buf.write_u8(REQUEST_LEAVE_GAME),
            ReadyToEnd => buf.write_u8(READY_TO_END),
            GameInput { input } => {
                buf.write_u8(GAME_INPUT);
                input.encode(buf);
            }
        }
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, WireError> {
        use ClientMessage::*;
        let tag = buf.read_u8()?;
        let msg = match tag {
            JOIN_GAME => JoinGame {
                name: buf.read_string()?,
            },
            SET_PLAYER_ID => SetPlayerId {
                id: PlayerId::decode(buf)?,
                new_control_system: buf.read_bool()?,
            },
            REQUEST_MENU_SELECTION => SetMenuSelection {
                item: buf.read_varint()? as u32,
                choice: buf.read_i32()?,
            },
            SET_READY => SetReady {
                ready: buf.read_bool()?,
            },
            SET_OBS_FLAG => SetObsFlag {
                observer: buf.read_bool()?,
            },
            SET_HOUSE_COLOUR => SetHouseColour {
                colour: buf.read_i32()? as u32 & 0xff_ff_ff,
            },
            SEND_CHAT => Chat {
                text: buf.read_string()?,
            },
            VOTE_TO_RESTART => VoteToRestart {
                vote: buf.read_bool()?,
            },
            REQUEST_LEAVE_GAME => LeaveGame,
            READY_TO_END => ReadyToEnd,
            GAME_INPUT => GameInput {
                input: crate::messages::GameInput::decode(buf)?,
            },
            other => return Err(WireError::UnknownTag(other)),
        };
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::MenuItem;
    use bytes::{Bytes, BytesMut};

    fn round_trip_server(msg: ServerMessage) {
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        let mut bytes = Bytes::from(buf.to_vec());
        assert_eq!(ServerMessage::decode(&mut bytes).unwrap(), msg);
        assert_eq!(bytes.remaining(), 0, "trailing bytes after {msg:?}");
    }

    fn round_trip_client(msg: ClientMessage) {
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        let mut bytes = Bytes::from(buf.to_vec());
        assert_eq!(ClientMessage::decode(&mut bytes).unwrap(), msg);
        assert_eq!(bytes.remaining(), 0, "trailing bytes after {msg:?}");
    }

    #[test]
    fn lobby_messages_round_trip() {
        round_trip_server(ServerMessage::ConnectionAccepted { version: 1 });
        round_trip_server(ServerMessage::UpdateGame {
            name: "game#1".into(),
            num_players: 3,
            num_observers: 1,
            status: GameStatus::SelectingQuest,
        });
        round_trip_server(ServerMessage::VotedToRestart {
            id: PlayerId::new("olaf"),
            flags: crate::types::VF_VOTE | crate::types::VF_SHOW_MSG,
            votes_needed: 2,
        });
    }

    #[test]
    fn join_accepted_round_trips() {
        round_trip_server(ServerMessage::JoinAccepted {
            menu: Menu {
                title: "menu_quest".into(),
                items: vec![MenuItem::Dropdown {
                    title: "menu_mission".into(),
                    choices: vec!["a".into(), "b".into()],
                    space_after: false,
                }],
            },
            my_house_colour: 0xff0000,
            roster: vec![
                RosterEntry {
                    id: PlayerId::new("olaf"),
                    ready: true,
                    house_colour: 0xff0000,
                },
                RosterEntry {
                    id: PlayerId::new("sven"),
                    ready: false,
                    house_colour: 0x0000ff,
                },
            ],
            observers: vec![PlayerId::new("watcher")],
            already_started: false,
        });
    }

    #[test]
    fn view_messages_round_trip() {
        round_trip_server(ServerMessage::AddEntity {
            id: 7,
            x: 0,
            y: 0,
            height: 0,
            facing: 1,
            anim: 12,
            overlay: 0,
            frame: 0,
            anim_zero_delta_ms: 0,
            flags: EF_INVISIBLE,
            cur_offset: 0,
            motion: MotionKind::Move,
            motion_remaining_ms: 200,
            player: PlayerId::new("olaf"),
        });
        round_trip_server(ServerMessage::SetTile {
            x: 4,
            y: 9,
            depth: 3,
            graphic: 101,
            colour_change: 0,
            force: true,
        });
        round_trip_server(ServerMessage::SetQuestHints {
            hints: vec!["3 gems required".into(), "".into(), "--- OR ---".into()],
        });
    }

    #[test]
    fn client_messages_round_trip() {
        round_trip_client(ClientMessage::JoinGame {
            name: "dungeon".into(),
        });
        round_trip_client(ClientMessage::GameInput {
            input: GameInput::Direction(2),
        });
        round_trip_client(ClientMessage::GameInput {
            input: GameInput::Control(44),
        });
        round_trip_client(ClientMessage::SetMenuSelection { item: 2, choice: -1 });
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut bytes = Bytes::from_static(&[0xEE]);
        assert_eq!(
            ServerMessage::decode(&mut bytes),
            Err(WireError::UnknownTag(0xEE))
        );
    }

    #[test]
    fn bad_direction_is_rejected() {
        let mut buf = BytesMut::new();
        buf.write_u8(GAME_INPUT);
        buf.write_u8(0);
        buf.write_u8(9);
        let mut bytes = Bytes::from(buf.to_vec());
        assert_eq!(
            ClientMessage::decode(&mut bytes),
            Err(WireError::BadValue("direction"))
        );
    }
}
