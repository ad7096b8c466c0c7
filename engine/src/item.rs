//! Items and item types.
//!
//! Item types are configuration flyweights; an [`Item`] on the ground or in a
//! backpack is just a type reference plus a stack count.

use serde::{Deserialize, Serialize};

/// Index into [`crate::config::GameConfig::items`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemTypeId(pub u16);

/// A graphic handle into the config graphic table. Zero means "none".
pub type GraphicId = u16;

/// Weapon behaviour of an item type, for melee swings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeaponStats {
    pub damage: i32,
    /// Stun applied to the victim, drawn uniformly from this range (ms).
    pub stun_min_ms: i32,
    pub stun_max_ms: i32,
    /// Damage done to tiles (doors, furniture) rather than creatures.
    pub tile_damage: i32,
}

/// The static description of an item kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemType {
    pub name: String,
    /// Fragile items shatter instead of dropping when their tile dies.
    pub fragile: bool,
    pub dungeon_graphic: GraphicId,
    pub backpack_graphic: GraphicId,
    /// Backpack slot convention: 11.. normal items, 20-22 keys, 23 lock
    /// picks, 30 gems.
    pub backpack_slot: u8,
    /// Largest stack a single square or backpack slot holds.
    pub max_stack: u32,
    /// Display maximum on the status bar, 0 for no maximum.
    pub max_carry: u32,
    pub weapon: Option<WeaponStats>,
}

impl ItemType {
    /// A plain non-weapon item, used heavily by the tests.
    pub fn simple(name: &str, slot: u8) -> ItemType {
        ItemType {
            name: name.into(),
            fragile: false,
            dungeon_graphic: 0,
            backpack_graphic: 0,
            backpack_slot: slot,
            max_stack: 10,
            max_carry: 0,
            weapon: None,
        }
    }
}

/// An item instance: what it is and how many are stacked together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub itype: ItemTypeId,
    pub count: u32,
}

impl Item {
    pub fn new(itype: ItemTypeId) -> Self {
        Item { itype, count: 1 }
    }

    pub fn with_count(itype: ItemTypeId, count: u32) -> Self {
        Item { itype, count }
    }
}
