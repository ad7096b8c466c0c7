//! The statically typed game configuration the engine consumes.
//!
//! The quest configuration language and its loader live outside the engine;
//! by the time a game starts, everything has been resolved into this plain
//! data structure. The engine validates it once at game creation and refuses
//! to start on any dangling reference.

use crate::item::{ItemType, ItemTypeId, WeaponStats};
use crate::tile::{Tile, TileTypeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration problems found at load time. Any of these prevents the game
/// session from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} refers to graphic {1} which does not exist")]
    MissingGraphic(String, u16),
    #[error("{0} refers to item type {1} which does not exist")]
    MissingItemType(String, u16),
    #[error("{0} refers to tile type {1} which does not exist")]
    MissingTileType(String, u16),
    #[error("wall tile {0} is out of range")]
    BadWallTile(u16),
    #[error("config has no tiles")]
    NoTiles,
}

/// An enumerated hook action. The original scripting callables are reduced to
/// this closed set plus an opaque fragment id for anything exotic; fragment
/// handlers are looked up in an engine-intrinsic table and unknown ids are
/// logged and skipped.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub enum Action {
    #[default]
    Nothing,
    /// Damage the triggering creature.
    Damage { amount: i32, stun_ms: i32 },
    /// Place an item on the square.
    AddItem { itype: ItemTypeId },
    /// Open or close a door/chest on the square.
    OpenDoor,
    CloseDoor,
    /// Flash a localised message to the originating player.
    FlashMessage { key: String, num_times: u32 },
    /// Teleport the triggering creature to a random clear square.
    TeleportToRandom,
    /// Show a transient icon on the square (blood splats, explosions).
    PlaceIcon { graphic: u16, duration_ms: u32 },
    /// Run several actions in order.
    Sequence(Vec<Action>),
    /// An opaque script fragment id, dispatched through the intrinsic table.
    ScriptFragment(u32),
}

/// A closed integer range for randomised config values (monster health,
/// weapon stun times).
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct RandomRange {
    pub lo: i32,
    pub hi: i32,
}

impl RandomRange {
    pub const fn fixed(v: i32) -> Self {
        RandomRange { lo: v, hi: v }
    }

    pub fn roll(&self, rng: &crate::rng::GameRng) -> i32 {
        if self.lo >= self.hi {
            self.lo
        } else {
            rng.get_int(self.lo, self.hi + 1)
        }
    }
}

/// Index into [`GameConfig::monsters`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonsterTypeId(pub u16);

/// Behaviour-specific parts of a monster type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MonsterBehaviour {
    /// Ground melee monster (zombies). Fears knights carrying `fear_items`,
    /// attacks `hit_items` lying on the floor, never walks onto
    /// `avoid_tiles`.
    Walking {
        weapon: ItemTypeId,
        fear_items: Vec<ItemTypeId>,
        hit_items: Vec<ItemTypeId>,
        avoid_tiles: Vec<TileTypeId>,
    },
    /// Airborne bite-and-retreat monster (vampire bats).
    Flying {
        attack_damage: i32,
        attack_stun_ms: RandomRange,
    },
}

/// The static description of a monster kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonsterType {
    pub name: String,
    pub health: RandomRange,
    /// Move duration scale in percent; 100 walks at the knight base speed.
    pub speed: i32,
    pub anim: u16,
    pub behaviour: MonsterBehaviour,
}

/// All the numeric knobs of the simulation, with the values games normally
/// run at. Loaded alongside the rest of the config so servers can override
/// individual entries.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    /// Sub-square offset reached by an approach half-move (out of 1000).
    pub approach_offset: i32,
    /// Base duration of a one-square walk at speed 100, in ms.
    pub walk_time_ms: i32,
    /// Delay before an idle monster reconsiders, in ms.
    pub monster_wait_time: i32,
    /// Chance an untargeted monster stays idle for a cycle.
    pub monster_wait_chance: f32,
    /// Max offset distance at which a flying monster can bite.
    pub flying_monster_targetting_offset: i32,
    /// Minimum ms between bites of the same flying monster.
    pub flying_monster_bite_wait: i32,
    /// Self-stun after any melee attack, in ms.
    pub melee_delay_time: i32,
    /// Recoil anim duration for walking monsters when hit without stun.
    pub walking_monster_damage_delay: i32,
    /// Interval between ticks of home healing, in ms.
    pub home_heal_interval_ms: i32,
    /// Health restored per home healing tick.
    pub home_heal_amount: i32,
    /// Timescale of the bat wing-flap animation, in ms.
    pub bat_anim_timescale_ms: i32,
    /// How long a knight counts as "recently dead" for respawn effects, ms.
    pub recent_death_window_ms: i32,
    /// Delay between a knight's death and its respawn at a home, ms.
    pub respawn_delay_ms: i32,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            approach_offset: 250,
            walk_time_ms: 420,
            monster_wait_time: 200,
            monster_wait_chance: 0.2,
            flying_monster_targetting_offset: 300,
            flying_monster_bite_wait: 1400,
            melee_delay_time: 140,
            walking_monster_damage_delay: 140,
            home_heal_interval_ms: 600,
            home_heal_amount: 1,
            bat_anim_timescale_ms: 100,
            recent_death_window_ms: 2000,
            respawn_delay_ms: 2000,
        }
    }
}

/// The complete pre-built configuration for one game.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameConfig {
    pub tunables: Tunables,
    /// Graphic names, indexed by `GraphicId`. Index 0 is reserved for "none".
    pub graphics: Vec<String>,
    /// Tile prototypes, cloned on placement.
    pub tiles: Vec<Tile>,
    pub items: Vec<ItemType>,
    pub monsters: Vec<MonsterType>,
    /// The tile a doubly-secured home is replaced with.
    pub wall_tile: TileTypeId,
    /// Starting health for knights.
    pub knight_health: i32,
    /// Knight anim handle.
    pub knight_anim: u16,
}

impl GameConfig {
    pub fn tile(&self, id: TileTypeId) -> &Tile {
        &self.tiles[id.0 as usize]
    }

    pub fn item_type(&self, id: ItemTypeId) -> &ItemType {
        &self.items[id.0 as usize]
    }

    pub fn monster_type(&self, id: MonsterTypeId) -> &MonsterType {
        &self.monsters[id.0 as usize]
    }

    /// Checks every cross reference. Called once before a game starts;
    /// failure refuses the whole session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tiles.is_empty() {
            return Err(ConfigError::NoTiles);
        }
        if self.wall_tile.0 as usize >= self.tiles.len() {
            return Err(ConfigError::BadWallTile(self.wall_tile.0));
        }

        let gfx_ok = |g: u16| g == 0 || (g as usize) < self.graphics.len();

        for (i, tile) in self.tiles.iter().enumerate() {
            if !gfx_ok(tile.graphic) {
                return Err(ConfigError::MissingGraphic(format!("tile {i}"), tile.graphic));
            }
        }
        for (i, item) in self.items.iter().enumerate() {
            if !gfx_ok(item.dungeon_graphic) {
                return Err(ConfigError::MissingGraphic(
                    format!("item {i}"),
                    item.dungeon_graphic,
                ));
            }
            if !gfx_ok(item.backpack_graphic) {
                return Err(ConfigError::MissingGraphic(
                    format!("item {i}"),
                    item.backpack_graphic,
                ));
            }
        }
        for (i, monster) in self.monsters.iter().enumerate() {
            if let MonsterBehaviour::Walking {
                weapon,
                fear_items,
                hit_items,
                avoid_tiles,
            } = &monster.behaviour
            {
                let items_ok = fear_items
                    .iter()
                    .chain(hit_items.iter())
                    .chain(std::iter::once(weapon))
                    .all(|it| (it.0 as usize) < self.items.len());
                if !items_ok {
                    return Err(ConfigError::MissingItemType(format!("monster {i}"), 0));
                }
                if let Some(bad) = avoid_tiles
                    .iter()
                    .find(|t| (t.0 as usize) >= self.tiles.len())
                {
                    return Err(ConfigError::MissingTileType(format!("monster {i}"), bad.0));
                }
            }
        }
        Ok(())
    }
}

impl GameConfig {
    /// A small but complete configuration: the standard tile set, the classic
    /// item roster and the two stock monsters. The server uses this until an
    /// external loader hands it something richer; the tests lean on it
    /// heavily.
    pub fn sample() -> GameConfig {
        use crate::geometry::{MapAccess, MapDirection, MapHeight};
        use crate::tile::{
            BarrelState, ChestState, DoorState, HomeState, ItemsPolicy, Lock, Tile, TileKind,
        };

        let graphics: Vec<String> = [
            "none",
            "floor",
            "wall",
            "door_closed",
            "door_open",
            "chest_closed",
            "chest_open",
            "home",
            "barrel",
            "pentagram",
            "sword",
            "gem",
            "potion",
            "wand",
            "book",
            "bear_trap",
            "knight_anim",
            "zombie_anim",
            "vbat_anim",
            "blood_splat",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        let gfx = |name: &str| graphics.iter().position(|g| g == name).unwrap() as u16;

        let sword = ItemType {
            name: "sword".into(),
            fragile: false,
            dungeon_graphic: gfx("sword"),
            backpack_graphic: gfx("sword"),
            backpack_slot: 11,
            max_stack: 1,
            max_carry: 1,
            weapon: Some(WeaponStats {
                damage: 2,
                stun_min_ms: 300,
                stun_max_ms: 600,
                tile_damage: 2,
            }),
        };
        let mut gem = ItemType::simple("gem", 30);
        gem.dungeon_graphic = gfx("gem");
        gem.backpack_graphic = gfx("gem");
        gem.max_stack = 6;
        gem.max_carry = 6;
        let mut potion = ItemType::simple("potion", 12);
        potion.fragile = true;
        potion.dungeon_graphic = gfx("potion");
        potion.backpack_graphic = gfx("potion");
        let mut wand = ItemType::simple("wand", 13);
        wand.dungeon_graphic = gfx("wand");
        wand.backpack_graphic = gfx("wand");
        wand.weapon = Some(WeaponStats {
            damage: 1,
            stun_min_ms: 200,
            stun_max_ms: 400,
            tile_damage: 1,
        });
        let mut book = ItemType::simple("book", 14);
        book.dungeon_graphic = gfx("book");
        book.backpack_graphic = gfx("book");
        let mut bear_trap = ItemType::simple("bear_trap", 15);
        bear_trap.dungeon_graphic = gfx("bear_trap");
        bear_trap.backpack_graphic = gfx("bear_trap");

        let closed_access = [MapAccess::Blocked, MapAccess::Blocked, MapAccess::Approach];
        let door = Tile {
            depth: 5,
            access: closed_access,
            items: ItemsPolicy::Blocked,
            destructible: true,
            targettable: true,
            hit_points: 8,
            kind: TileKind::Door(DoorState {
                open: false,
                open_graphic: gfx("door_open"),
                closed_graphic: gfx("door_closed"),
                closed_access,
                lock: Lock::default(),
            }),
            ..Tile::floor(TileTypeId(2), gfx("door_closed"))
        };
        let chest = Tile {
            depth: 5,
            access: [MapAccess::Approach, MapAccess::Clear, MapAccess::Approach],
            items: ItemsPolicy::Blocked,
            destructible: true,
            targettable: true,
            hit_points: 6,
            kind: TileKind::Chest(ChestState {
                open: false,
                open_graphic: gfx("chest_open"),
                closed_graphic: gfx("chest_closed"),
                facing: MapDirection::North,
                trap_chance: 0.2,
                trap: Action::Damage {
                    amount: 2,
                    stun_ms: 800,
                },
                lock: Lock::default(),
                stored_item: None,
            }),
            ..Tile::floor(TileTypeId(3), gfx("chest_closed"))
        };
        let home = Tile {
            depth: 5,
            access: [MapAccess::Approach; MapHeight::COUNT],
            items: ItemsPolicy::Blocked,
            kind: TileKind::Home(HomeState {
                facing: MapDirection::North,
                special_exit: false,
                unsecured_cc: 0,
            }),
            ..Tile::floor(TileTypeId(4), gfx("home"))
        };
        let barrel = Tile {
            depth: 5,
            access: [MapAccess::Approach, MapAccess::Clear, MapAccess::Blocked],
            items: ItemsPolicy::Blocked,
            destructible: true,
            targettable: true,
            hit_points: 4,
            kind: TileKind::Barrel(BarrelState::default()),
            ..Tile::floor(TileTypeId(5), gfx("barrel"))
        };
        let pentagram = Tile {
            depth: 1,
            on_approach: Action::Nothing,
            kind: TileKind::Pentagram,
            ..Tile::floor(TileTypeId(6), gfx("pentagram"))
        };

        let zombie = MonsterType {
            name: "zombie".into(),
            health: RandomRange { lo: 2, hi: 6 },
            speed: 70,
            anim: gfx("zombie_anim"),
            behaviour: MonsterBehaviour::Walking {
                weapon: ItemTypeId(0),
                fear_items: vec![ItemTypeId(3)],
                hit_items: vec![ItemTypeId(5)],
                avoid_tiles: vec![TileTypeId(6)],
            },
        };
        let vampire_bat = MonsterType {
            name: "vampire bat".into(),
            health: RandomRange { lo: 1, hi: 2 },
            speed: 120,
            anim: gfx("vbat_anim"),
            behaviour: MonsterBehaviour::Flying {
                attack_damage: 1,
                attack_stun_ms: RandomRange { lo: 400, hi: 900 },
            },
        };

        GameConfig {
            tunables: Tunables::default(),
            graphics,
            tiles: vec![
                Tile::floor(TileTypeId(0), 1),
                Tile::wall(TileTypeId(1), 2),
                door,
                chest,
                home,
                barrel,
                pentagram,
            ],
            items: vec![sword, gem, potion, wand, book, bear_trap],
            monsters: vec![zombie, vampire_bat],
            wall_tile: TileTypeId(1),
            knight_health: 12,
            knight_anim: 16,
        }
    }
}
