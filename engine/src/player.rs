//! Per-player engine state: the knight, the home, the quests, the score.

use crate::creature::EntityId;
use crate::home::HomeLocation;
use crate::quest::Quest;
use crate::tile::ColourChangeId;
use knights_protocol::PlayerId;

/// How a player's home is re-rolled when their knight dies.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RespawnType {
    /// Keep the assigned home.
    Normal,
    /// Pick a fresh random home after every death.
    DifferentEveryTime,
}

pub struct Player {
    pub num: usize,
    pub id: PlayerId,
    /// Team number; cooperating players share one.
    pub team: u8,
    /// The knight currently alive for this player, if any.
    pub knight: Option<EntityId>,
    /// The entry square of the assigned home, if the player still has one.
    pub home: Option<HomeLocation>,
    pub respawn_type: RespawnType,
    /// Set on teleport; suppresses the room-reveal animation until the player
    /// next sees a room normally.
    pub teleport_flag: bool,
    /// Colour change applied to a home tile this player secures.
    pub secured_cc: ColourChangeId,
    pub quests: Vec<Quest>,
    pub skulls: i32,
    pub kills: i32,
    /// Player has permanently died and observes from the sidelines.
    pub eliminated: bool,
}

impl Player {
    pub fn new(num: usize, id: PlayerId, team: u8) -> Self {
        Player {
            num,
            id,
            team,
            knight: None,
            home: None,
            respawn_type: RespawnType::Normal,
            teleport_flag: false,
            secured_cc: 0,
            quests: Vec::new(),
            skulls: 0,
            kills: 0,
            eliminated: false,
        }
    }
}
