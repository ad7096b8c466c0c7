//! Small shared vocabulary types that appear on the wire and in both the
//! engine and the client.

use crate::wire::{WireError, WireRead, WireWrite};
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A player identity as chosen by the player. Unique per server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(name: impl Into<String>) -> Self {
        PlayerId(name.into())
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.write_string(&self.0);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, WireError> {
        Ok(PlayerId(buf.read_string()?))
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a game is in its lifecycle, as shown in the lobby list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GameStatus {
    SelectingQuest = 0,
    WaitingToStart = 1,
    InProgress = 2,
}

impl GameStatus {
    pub fn from_u8(v: u8) -> Result<Self, WireError> {
        match v {
            0 => Ok(GameStatus::SelectingQuest),
            1 => Ok(GameStatus::WaitingToStart),
            2 => Ok(GameStatus::InProgress),
            _ => Err(WireError::BadValue("game status")),
        }
    }
}

/// How a player relates to a running game.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// Still in the game and playing normally.
    Normal = 0,
    /// Permanently died and became an observer.
    Eliminated = 1,
    /// Temporarily disconnected; may or may not return.
    Disconnected = 2,
    /// Joined as an observer.
    Observer = 3,
}

impl ClientState {
    pub fn from_u8(v: u8) -> Result<Self, WireError> {
        match v {
            0 => Ok(ClientState::Normal),
            1 => Ok(ClientState::Eliminated),
            2 => Ok(ClientState::Disconnected),
            3 => Ok(ClientState::Observer),
            _ => Err(WireError::BadValue("client state")),
        }
    }
}

/// One row of the player list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientPlayerInfo {
    pub id: PlayerId,
    /// 24-bit RGB house colour.
    pub house_colour: u32,
    pub kills: i32,
    pub deaths: i32,
    pub frags: i32,
    pub ping: u32,
    pub state: ClientState,
}

impl ClientPlayerInfo {
    pub fn encode(&self, buf: &mut impl BufMut) {
        self.id.encode(buf);
        buf.write_i32(self.house_colour as i32);
        buf.write_i32(self.kills);
        buf.write_i32(self.deaths);
        buf.write_i32(self.frags);
        buf.write_varint(self.ping as u64);
        buf.write_u8(self.state as u8);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, WireError> {
        Ok(ClientPlayerInfo {
            id: PlayerId::decode(buf)?,
            house_colour: buf.read_i32()? as u32 & 0xff_ff_ff,
            kills: buf.read_i32()?,
            deaths: buf.read_i32()?,
            frags: buf.read_i32()?,
            ping: buf.read_varint()? as u32,
            state: ClientState::from_u8(buf.read_u8()?)?,
        })
    }
}

/// A localised text block: a localisation key plus already-expanded
/// parameters. Clients never receive raw English from the server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Paragraph {
    pub key: String,
    pub params: Vec<String>,
}

impl Paragraph {
    pub fn new(key: impl Into<String>) -> Self {
        Paragraph {
            key: key.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.write_string(&self.key);
        buf.write_varint(self.params.len() as u64);
        for p in &self.params {
            buf.write_string(p);
        }
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, WireError> {
        let key = buf.read_string()?;
        let n = buf.read_varint()? as usize;
        let mut params = Vec::with_capacity(n.min(64));
        for _ in 0..n {
            params.push(buf.read_string()?);
        }
        Ok(Paragraph { key, params })
    }
}

/// Which magic a drunk potion currently applies. Controls the colour of the
/// health bottle on the status display.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PotionMagic {
    /// This should always come first.
    None = 0,
    Invisibility = 1,
    Strength = 2,
    Quickness = 3,
    SlowRegeneration = 4,
    FastRegeneration = 5,
    Paralyzation = 6,
    /// This should always come last.
    Super = 7,
}

impl PotionMagic {
    pub fn from_u8(v: u8) -> Result<Self, WireError> {
        use PotionMagic::*;
        match v {
            0 => Ok(None),
            1 => Ok(Invisibility),
            2 => Ok(Strength),
            3 => Ok(Quickness),
            4 => Ok(SlowRegeneration),
            5 => Ok(FastRegeneration),
            6 => Ok(Paralyzation),
            7 => Ok(Super),
            _ => Err(WireError::BadValue("potion magic")),
        }
    }
}

/// The four colour classes a mini-map square can take.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MiniMapColour {
    #[default]
    Unmapped = 0,
    Floor = 1,
    Wall = 2,
    Highlight = 3,
}

impl MiniMapColour {
    pub fn from_u8(v: u8) -> Result<Self, WireError> {
        match v {
            0 => Ok(MiniMapColour::Unmapped),
            1 => Ok(MiniMapColour::Floor),
            2 => Ok(MiniMapColour::Wall),
            3 => Ok(MiniMapColour::Highlight),
            _ => Err(WireError::BadValue("mini map colour")),
        }
    }
}

/// The motion kinds an entity can be in, as sent in view updates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MotionKind {
    NotMoving = 0,
    Move = 1,
    Approach = 2,
    Withdraw = 3,
}

impl MotionKind {
    pub fn from_u8(v: u8) -> Result<Self, WireError> {
        match v {
            0 => Ok(MotionKind::NotMoving),
            1 => Ok(MotionKind::Move),
            2 => Ok(MotionKind::Approach),
            3 => Ok(MotionKind::Withdraw),
            _ => Err(WireError::BadValue("motion kind")),
        }
    }
}

// Bit flags for VOTED_TO_RESTART.

/// Voting (set) or cancelling a vote (clear).
pub const VF_VOTE: u8 = 1;
/// Set if the player receiving the message is the voter.
pub const VF_IS_ME: u8 = 2;
/// Set if an announcement message should be printed.
pub const VF_SHOW_MSG: u8 = 4;
/// Set if the game is ending as a result of this vote.
pub const VF_GAME_ENDING: u8 = 8;

/// Formats a 24-bit colour as `#RRGGBB`.
pub fn col_to_text(col: u32) -> String {
    format!("#{:06X}", col & 0xff_ff_ff)
}

/// Parses a `#RRGGBB` string back into a 24-bit colour.
pub fn parse_col(text: &str) -> Option<u32> {
    let hex = text.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};

    #[test]
    fn colour_text_round_trip() {
        for col in [0x000000, 0xffffff, 0x123abc, 0x00ff00] {
            assert_eq!(parse_col(&col_to_text(col)), Some(col));
        }
        assert_eq!(parse_col("123abc"), None);
        assert_eq!(parse_col("#123ab"), None);
    }

    #[test]
    fn paragraph_round_trip() {
        let para = Paragraph::new("quest_gems").with_param("4").with_param("gems");
        let mut buf = BytesMut::new();
        para.encode(&mut buf);
        let mut bytes = Bytes::from(buf.to_vec());
        assert_eq!(Paragraph::decode(&mut bytes).unwrap(), para);
    }

    #[test]
    fn player_info_round_trip() {
        let info = ClientPlayerInfo {
            id: PlayerId::new("elsa"),
            house_colour: 0x4040ff,
            kills: 3,
            deaths: 1,
            frags: 2,
            ping: 48,
            state: ClientState::Normal,
        };
        let mut buf = BytesMut::new();
        info.encode(&mut buf);
        let mut bytes = Bytes::from(buf.to_vec());
        assert_eq!(ClientPlayerInfo::decode(&mut bytes).unwrap(), info);
    }
}
