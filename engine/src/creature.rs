//! Creatures: knights and monsters, plus the shared motion model.
//!
//! Creatures live in an arena keyed by stable [`EntityId`]s. Everything else
//! (map squares, AI tasks, view streams) refers to them by id and tolerates
//! the id having disappeared, which is how cancelled work no-ops after a
//! death.

use crate::config::MonsterTypeId;
use crate::geometry::{MapCoord, MapDirection, MapHeight};
use crate::item::{Item, ItemTypeId};
use std::collections::BTreeMap;

/// Stable identity of a creature for its whole lifetime.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u32);

/// The resting anim frame.
pub const AF_NORMAL: u8 = 0;
/// The frame shown while striking.
pub const AF_IMPACT: u8 = 1;
/// The recoil frame shown after taking a hit.
pub const AF_PARRY: u8 = 2;

/// The motion kinds an entity can start.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MotionType {
    /// A full one-square move; final offset 1000.
    Move,
    /// A half-step into the square ahead; final offset `approach_offset`.
    Approach,
    /// The reverse half-step; final offset 0.
    Withdraw,
}

impl MotionType {
    pub fn final_offset(self, approach_offset: i32) -> i32 {
        match self {
            MotionType::Move => 1000,
            MotionType::Approach => approach_offset,
            MotionType::Withdraw => 0,
        }
    }
}

/// The motion state of an entity. Logical occupancy stays at the origin
/// square for the whole motion; the arrival task settles it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Motion {
    NotMoving {
        /// 0 normally, `approach_offset` while approached.
        offset: i32,
    },
    Moving {
        kind: MotionType,
        start_offset: i32,
        start_time: i32,
        arrival_time: i32,
        missile_mode: bool,
    },
}

impl Motion {
    pub const STILL: Motion = Motion::NotMoving { offset: 0 };

    pub fn is_moving(&self) -> bool {
        matches!(self, Motion::Moving { .. })
    }

    /// The observable sub-square offset at the given time: a linear
    /// interpolation from the start offset to the motion kind's final offset,
    /// clamped at arrival.
    pub fn offset_at(&self, gvt: i32, approach_offset: i32) -> i32 {
        match *self {
            Motion::NotMoving { offset } => offset,
            Motion::Moving {
                kind,
                start_offset,
                start_time,
                arrival_time,
                ..
            } => {
                let fo = kind.final_offset(approach_offset);
                let duration = i64::from(arrival_time - start_time);
                if duration <= 0 {
                    return fo;
                }
                let elapsed = i64::from(gvt - start_time).clamp(0, duration);
                start_offset + ((i64::from(fo - start_offset) * elapsed / duration) as i32)
            }
        }
    }
}

/// State shared by all creature kinds.
#[derive(Clone, Debug)]
pub struct EntityCore {
    /// Null while the creature is off the map.
    pub pos: MapCoord,
    pub facing: MapDirection,
    pub height: MapHeight,
    pub motion: Motion,
    pub stunned_until: Option<i32>,
    pub health: i32,
    pub max_health: i32,
    /// Move duration scale in percent of the base walk time.
    pub speed: i32,
    pub anim: u16,
    pub anim_frame: u8,
    /// GVT at which the anim frame reverts to the default.
    pub anim_zero_time: Option<i32>,
    pub invisible: bool,
    pub invulnerable: bool,
}

impl EntityCore {
    pub fn new(height: MapHeight, health: i32, speed: i32, anim: u16) -> Self {
        EntityCore {
            pos: MapCoord::null(),
            facing: MapDirection::North,
            height,
            motion: Motion::STILL,
            stunned_until: None,
            health,
            max_health: health,
            speed,
            anim,
            anim_frame: 0,
            anim_zero_time: None,
            invisible: false,
            invulnerable: false,
        }
    }

    pub fn on_map(&self) -> bool {
        !self.pos.is_null()
    }

    pub fn is_stunned(&self, gvt: i32) -> bool {
        self.stunned_until.is_some_and(|t| gvt < t)
    }

    pub fn is_moving(&self) -> bool {
        self.motion.is_moving()
    }

    /// Chains a new stun with any existing one; the later end wins.
    pub fn stun_until(&mut self, until: i32) {
        self.stunned_until = Some(self.stunned_until.map_or(until, |t| t.max(until)));
    }

    /// When the creature can next act: the later of stun end and arrival.
    /// `None` means it can act right now.
    pub fn cannot_act_until(&self, gvt: i32) -> Option<i32> {
        let stun = self.stunned_until.filter(|&t| t > gvt);
        let arrival = match self.motion {
            Motion::Moving { arrival_time, .. } if arrival_time > gvt => Some(arrival_time),
            _ => None,
        };
        match (stun, arrival) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(i32::MIN).max(b.unwrap_or(i32::MIN))),
        }
    }

    /// The square this creature's motion is aimed at (ahead of it), or its
    /// own square when still.
    pub fn destination(&self) -> MapCoord {
        match self.motion {
            Motion::Moving {
                kind: MotionType::Move,
                ..
            } => self.pos.displace(self.facing),
            _ => self.pos,
        }
    }

    /// Whether the entity stands half-stepped into the square ahead.
    pub fn is_approached(&self) -> bool {
        matches!(self.motion, Motion::NotMoving { offset } if offset != 0)
    }
}

/// Knight-only state.
#[derive(Clone, Debug, Default)]
pub struct KnightData {
    pub player_num: usize,
    pub item_in_hand: Option<ItemTypeId>,
    /// Ordered stacks; slot order is what the status display shows.
    pub backpack: Vec<Item>,
}

impl KnightData {
    /// Adds items to the backpack, stacking onto an existing slot of the same
    /// type first. Returns how many were actually added.
    pub fn add_to_backpack(&mut self, itype: ItemTypeId, count: u32, max_stack: u32) -> u32 {
        let cap = if max_stack == 0 { u32::MAX } else { max_stack };
        if let Some(stack) = self.backpack.iter_mut().find(|s| s.itype == itype) {
            let space = cap.saturating_sub(stack.count);
            let added = count.min(space);
            stack.count += added;
            added
        } else {
            let added = count.min(cap);
            if added > 0 {
                self.backpack.push(Item::with_count(itype, added));
            }
            added
        }
    }

    pub fn num_carried(&self, itype: ItemTypeId) -> u32 {
        self.backpack
            .iter()
            .filter(|s| s.itype == itype)
            .map(|s| s.count)
            .sum()
    }
}

/// Monster-only state shared by both behaviours.
#[derive(Clone, Debug)]
pub struct MonsterData {
    pub mtype: MonsterTypeId,
    /// Set by damage on flying monsters; makes them retreat before biting
    /// again.
    pub run_away: bool,
}

/// What a creature is.
#[derive(Clone, Debug)]
pub enum CreatureKind {
    Knight(KnightData),
    WalkingMonster(MonsterData),
    FlyingMonster(MonsterData),
}

/// A creature: shared core plus kind-specific state.
#[derive(Clone, Debug)]
pub struct Creature {
    pub core: EntityCore,
    pub kind: CreatureKind,
}

impl Creature {
    pub fn is_knight(&self) -> bool {
        matches!(self.kind, CreatureKind::Knight(_))
    }

    pub fn knight(&self) -> Option<&KnightData> {
        match &self.kind {
            CreatureKind::Knight(k) => Some(k),
            _ => None,
        }
    }

    pub fn knight_mut(&mut self) -> Option<&mut KnightData> {
        match &mut self.kind {
            CreatureKind::Knight(k) => Some(k),
            _ => None,
        }
    }

    pub fn monster(&self) -> Option<&MonsterData> {
        match &self.kind {
            CreatureKind::WalkingMonster(m) | CreatureKind::FlyingMonster(m) => Some(m),
            _ => None,
        }
    }

    pub fn monster_mut(&mut self) -> Option<&mut MonsterData> {
        match &mut self.kind {
            CreatureKind::WalkingMonster(m) | CreatureKind::FlyingMonster(m) => Some(m),
            _ => None,
        }
    }
}

/// The arena all creatures live in. Ids are never reused within a game, so a
/// stale id simply fails to resolve.
#[derive(Default)]
pub struct CreatureArena {
    creatures: BTreeMap<EntityId, Creature>,
    next_id: u32,
}

impl CreatureArena {
    pub fn insert(&mut self, creature: Creature) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.creatures.insert(id, creature);
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&Creature> {
        self.creatures.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Creature> {
        self.creatures.get_mut(&id)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Creature> {
        self.creatures.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Creature)> {
        self.creatures.iter().map(|(id, c)| (*id, c))
    }

    pub fn len(&self) -> usize {
        self.creatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creatures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APPROACH: i32 = 250;

    fn moving(kind: MotionType, so: i32, start: i32, arrive: i32) -> Motion {
        Motion::Moving {
            kind,
            start_offset: so,
            start_time: start,
            arrival_time: arrive,
            missile_mode: false,
        }
    }

    #[test]
    fn offset_interpolates_linearly() {
        let m = moving(MotionType::Move, 0, 0, 200);
        assert_eq!(m.offset_at(0, APPROACH), 0);
        assert_eq!(m.offset_at(100, APPROACH), 500);
        assert_eq!(m.offset_at(200, APPROACH), 1000);
        // Clamped past arrival.
        assert_eq!(m.offset_at(500, APPROACH), 1000);
    }

    #[test]
    fn offset_is_monotone_and_hits_final_exactly() {
        let m = moving(MotionType::Approach, 0, 100, 350);
        let mut last = -1;
        for t in 100..=350 {
            let o = m.offset_at(t, APPROACH);
            assert!(o >= last, "offset went backwards at t={t}");
            last = o;
        }
        assert_eq!(m.offset_at(350, APPROACH), APPROACH);
    }

    #[test]
    fn withdraw_runs_back_to_zero() {
        let m = moving(MotionType::Withdraw, APPROACH, 0, 100);
        assert_eq!(m.offset_at(0, APPROACH), APPROACH);
        assert_eq!(m.offset_at(100, APPROACH), 0);
    }

    #[test]
    fn stun_chains_by_max() {
        let mut core = EntityCore::new(MapHeight::Walking, 10, 100, 0);
        core.stun_until(500);
        core.stun_until(300);
        assert_eq!(core.stunned_until, Some(500));
        core.stun_until(800);
        assert_eq!(core.stunned_until, Some(800));
        assert!(core.is_stunned(799));
        assert!(!core.is_stunned(800));
    }

    #[test]
    fn cannot_act_until_takes_the_later_of_stun_and_motion() {
        let mut core = EntityCore::new(MapHeight::Walking, 10, 100, 0);
        assert_eq!(core.cannot_act_until(0), None);
        core.motion = moving(MotionType::Move, 0, 0, 400);
        core.stun_until(250);
        assert_eq!(core.cannot_act_until(0), Some(400));
        core.stun_until(900);
        assert_eq!(core.cannot_act_until(0), Some(900));
    }

    #[test]
    fn backpack_stacks_do_not_merge_across_slots() {
        let mut kt = KnightData::default();
        assert_eq!(kt.add_to_backpack(ItemTypeId(1), 3, 5), 3);
        assert_eq!(kt.add_to_backpack(ItemTypeId(1), 4, 5), 2); // capped at 5
        assert_eq!(kt.add_to_backpack(ItemTypeId(2), 1, 5), 1);
        assert_eq!(kt.backpack.len(), 2);
        assert_eq!(kt.num_carried(ItemTypeId(1)), 5);
    }

    #[test]
    fn arena_ids_are_stable_and_unique() {
        let mut arena = CreatureArena::default();
        let a = arena.insert(Creature {
            core: EntityCore::new(MapHeight::Walking, 5, 100, 0),
            kind: CreatureKind::Knight(KnightData::default()),
        });
        let b = arena.insert(Creature {
            core: EntityCore::new(MapHeight::Flying, 2, 100, 0),
            kind: CreatureKind::FlyingMonster(MonsterData {
                mtype: MonsterTypeId(0),
                run_away: false,
            }),
        });
        assert_ne!(a, b);
        arena.remove(a);
        assert!(arena.get(a).is_none());
        assert!(arena.get(b).is_some());
        let c = arena.insert(Creature {
            core: EntityCore::new(MapHeight::Walking, 5, 100, 0),
            kind: CreatureKind::Knight(KnightData::default()),
        });
        assert_ne!(a, c);
    }
}
