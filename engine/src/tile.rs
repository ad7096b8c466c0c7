//! Tiles: the drawable, access-controlling occupants of dungeon squares.
//!
//! Tile definitions live in the config's tile table as flyweights. Placing a
//! tile clones the definition into a per-square instance, so doors and chests
//! can mutate their copy freely. Behaviour that needs the rest of the world
//! (opening doors, releasing chest contents) lives in [`crate::world`]; this
//! module only holds the data model and the pure state transitions.

use crate::config::Action;
use crate::geometry::{MapAccess, MapDirection, MapHeight};
use crate::item::{GraphicId, Item};
use serde::{Deserialize, Serialize};

/// Index into [`crate::config::GameConfig::tiles`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileTypeId(pub u16);

/// Colour change handle into the config table. Zero means "no colour change".
pub type ColourChangeId = u16;

/// What happens to items dropped on a square with this tile.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemsPolicy {
    /// Items may lie here.
    Allowed,
    /// Items may not be dropped here.
    Blocked,
    /// Items that end up here are destroyed (pits, fires).
    Destroyed,
}

/// A door or chest lock. `pick_only` locks have no matching key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub locked: bool,
    /// Key item type index that opens this lock, if any.
    pub key: Option<u16>,
    pub pick_only: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DoorState {
    pub open: bool,
    pub open_graphic: GraphicId,
    pub closed_graphic: GraphicId,
    /// Access per height while closed; open is always all-clear.
    pub closed_access: [MapAccess; MapHeight::COUNT],
    pub lock: Lock,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChestState {
    pub open: bool,
    pub open_graphic: GraphicId,
    pub closed_graphic: GraphicId,
    /// The side a knight must stand on to activate the chest.
    pub facing: MapDirection,
    pub trap_chance: f32,
    pub trap: Action,
    pub lock: Lock,
    #[serde(skip)]
    pub stored_item: Option<Item>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BarrelState {
    #[serde(skip)]
    pub stored_item: Option<Item>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HomeState {
    /// Points INTO the home: a knight on the entry square faces this way.
    pub facing: MapDirection,
    pub special_exit: bool,
    /// Colour change shown while nobody has secured this home.
    pub unsecured_cc: ColourChangeId,
}

/// The behavioural variant of a tile.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TileKind {
    Plain,
    Door(DoorState),
    Chest(ChestState),
    Barrel(BarrelState),
    Home(HomeState),
    Pentagram,
}

/// One tile instance, either a config flyweight or a per-square clone of one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tile {
    /// Which table entry this instance was cloned from.
    pub ttype: TileTypeId,
    pub graphic: GraphicId,
    pub colour_change: ColourChangeId,
    pub access: [MapAccess; MapHeight::COUNT],
    /// Draw order within a square; higher depth draws later (on top).
    pub depth: u8,
    pub items: ItemsPolicy,
    pub destructible: bool,
    pub targettable: bool,
    pub hit_points: i32,
    pub on_approach: Action,
    pub on_withdraw: Action,
    pub on_hit: Action,
    pub on_destroy: Action,
    pub kind: TileKind,
}

impl Tile {
    /// A plain floor tile, clear at every height.
    pub fn floor(ttype: TileTypeId, graphic: GraphicId) -> Tile {
        Tile {
            ttype,
            graphic,
            colour_change: 0,
            access: [MapAccess::Clear; MapHeight::COUNT],
            depth: 0,
            items: ItemsPolicy::Allowed,
            destructible: false,
            targettable: false,
            hit_points: 0,
            on_approach: Action::Nothing,
            on_withdraw: Action::Nothing,
            on_hit: Action::Nothing,
            on_destroy: Action::Nothing,
            kind: TileKind::Plain,
        }
    }

    /// A solid wall tile, blocked at every height.
    pub fn wall(ttype: TileTypeId, graphic: GraphicId) -> Tile {
        Tile {
            access: [MapAccess::Blocked; MapHeight::COUNT],
            items: ItemsPolicy::Blocked,
            depth: 10,
            ..Tile::floor(ttype, graphic)
        }
    }

    pub fn get_access(&self, height: MapHeight) -> MapAccess {
        self.access[height as usize]
    }

    /// Whether this tile blocks walking (used for mini-map colouring and the
    /// "topmost blocking tile" rule for items).
    pub fn is_blocking(&self) -> bool {
        self.access[MapHeight::Walking as usize] != MapAccess::Clear
    }

    /// Open doors cannot be targetted; everything else follows its flag.
    pub fn is_targettable(&self) -> bool {
        match &self.kind {
            TileKind::Door(door) if door.open => false,
            _ => self.targettable,
        }
    }

    /// Whether this tile reacts to activation (open/close) at all.
    pub fn is_activatable(&self) -> bool {
        matches!(self.kind, TileKind::Door(_) | TileKind::Chest(_))
    }

    /// The side an activation must come from, if constrained: the direction
    /// from the tile towards the square the actor has to stand on. Chests can
    /// only be opened from in front of their lid.
    pub fn activation_side(&self) -> Option<MapDirection> {
        match &self.kind {
            TileKind::Chest(chest) => Some(chest.facing),
            _ => None,
        }
    }

    /// Applies the open state to this instance's graphic/access/items fields.
    /// Returns the item released by an opening chest, if any.
    pub fn apply_open(&mut self) -> Option<Item> {
        match &mut self.kind {
            TileKind::Door(door) => {
                door.open = true;
                self.graphic = door.open_graphic;
                self.access = [MapAccess::Clear; MapHeight::COUNT];
                self.items = ItemsPolicy::Allowed;
                None
            }
            TileKind::Chest(chest) => {
                chest.open = true;
                self.graphic = chest.open_graphic;
                self.items = ItemsPolicy::Allowed;
                chest.stored_item.take()
            }
            _ => None,
        }
    }

    /// Applies the closed state. `absorbed` is the item that was lying on the
    /// square, which a closing chest swallows.
    pub fn apply_close(&mut self, absorbed: Option<Item>) -> Option<Item> {
        match &mut self.kind {
            TileKind::Door(door) => {
                door.open = false;
                self.graphic = door.closed_graphic;
                self.access = door.closed_access;
                self.items = ItemsPolicy::Blocked;
                absorbed
            }
            TileKind::Chest(chest) => {
                chest.open = false;
                self.graphic = chest.closed_graphic;
                self.items = ItemsPolicy::Blocked;
                chest.stored_item = absorbed;
                None
            }
            _ => absorbed,
        }
    }

    /// Whether damage and on-hit hooks apply right now. Open doors ignore
    /// both.
    pub fn reacts_to_hits(&self) -> bool {
        match &self.kind {
            TileKind::Door(door) => !door.open,
            _ => true,
        }
    }

    /// The item a container tile is storing, if any.
    pub fn stored_item(&self) -> Option<&Item> {
        match &self.kind {
            TileKind::Chest(chest) => chest.stored_item.as_ref(),
            TileKind::Barrel(barrel) => barrel.stored_item.as_ref(),
            _ => None,
        }
    }

    /// Stores an item into a container tile. Returns false if this tile
    /// cannot hold items.
    pub fn place_item(&mut self, item: Item) -> bool {
        match &mut self.kind {
            TileKind::Chest(chest) => {
                chest.stored_item = Some(item);
                true
            }
            TileKind::Barrel(barrel) => {
                barrel.stored_item = Some(item);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemTypeId;

    fn door() -> Tile {
        let closed_access = [MapAccess::Blocked, MapAccess::Blocked, MapAccess::Approach];
        Tile {
            depth: 5,
            access: closed_access,
            items: ItemsPolicy::Blocked,
            destructible: true,
            targettable: true,
            hit_points: 10,
            kind: TileKind::Door(DoorState {
                open: false,
                open_graphic: 21,
                closed_graphic: 20,
                closed_access,
                lock: Lock::default(),
            }),
            ..Tile::floor(TileTypeId(3), 20)
        }
    }

    #[test]
    fn door_open_close_round_trip() {
        let mut tile = door();
        assert!(tile.is_targettable());

        tile.apply_open();
        assert_eq!(tile.graphic, 21);
        assert_eq!(tile.access, [MapAccess::Clear; 3]);
        assert!(!tile.is_targettable());
        assert!(!tile.reacts_to_hits());

        tile.apply_close(None);
        assert_eq!(tile.graphic, 20);
        assert_eq!(tile.get_access(MapHeight::Walking), MapAccess::Blocked);
        assert_eq!(tile.get_access(MapHeight::Missiles), MapAccess::Approach);
        assert!(tile.reacts_to_hits());
    }

    #[test]
    fn chest_releases_and_absorbs_items() {
        let mut tile = Tile {
            kind: TileKind::Chest(ChestState {
                open: false,
                open_graphic: 31,
                closed_graphic: 30,
                facing: MapDirection::North,
                trap_chance: 0.0,
                trap: Action::Nothing,
                lock: Lock::default(),
                stored_item: Some(Item::new(ItemTypeId(2))),
            }),
            ..Tile::floor(TileTypeId(4), 30)
        };

        let released = tile.apply_open();
        assert_eq!(released, Some(Item::new(ItemTypeId(2))));
        assert!(tile.stored_item().is_none());

        let leftover = tile.apply_close(Some(Item::new(ItemTypeId(5))));
        assert_eq!(leftover, None);
        assert_eq!(tile.stored_item(), Some(&Item::new(ItemTypeId(5))));
    }

    #[test]
    fn chest_activation_side_is_its_facing() {
        let tile = Tile {
            kind: TileKind::Chest(ChestState {
                open: false,
                open_graphic: 31,
                closed_graphic: 30,
                facing: MapDirection::North,
                trap_chance: 0.0,
                trap: Action::Nothing,
                lock: Lock::default(),
                stored_item: None,
            }),
            ..Tile::floor(TileTypeId(4), 30)
        };
        assert_eq!(tile.activation_side(), Some(MapDirection::North));
    }
}
