//! Monster AI: target finding, direction choice and the two behaviour tasks.
//!
//! Both monster kinds run the same loop: wake, check the monster still
//! exists, look for a target, pick one action, execute it, reschedule.
//! Rescheduling happens at Low priority so that motion arrivals and damage
//! (Normal priority) are settled before the monster thinks again.

use crate::config::{MonsterBehaviour, MonsterTypeId};
use crate::creature::{
    AF_IMPACT, Creature, CreatureKind, EntityCore, EntityId, Motion, MonsterData, MotionType,
};
use crate::dungeon::Originator;
use crate::geometry::{MapAccess, MapCoord, MapDirection, MapHeight, direction_from_to};
use crate::item::ItemTypeId;
use crate::tasks::{Task, TaskPriority, TaskScheduler};
use crate::tile::{TileKind, TileTypeId};
use crate::world::World;

/// Whether a knight stands on the square who is *not* holding one of the
/// feared items.
pub fn knight_at(world: &World, mc: MapCoord, fear: &[ItemTypeId]) -> bool {
    world
        .map
        .get_entities(mc)
        .iter()
        .filter_map(|id| world.creatures.get(*id))
        .any(|c| {
            c.knight()
                .is_some_and(|k| !k.item_in_hand.is_some_and(|held| fear.contains(&held)))
        })
}

/// The closest knight (Manhattan distance) in the same room as the entity,
/// satisfying the predicate. Equidistant candidates are picked uniformly.
pub fn find_closest_knight(
    world: &World,
    ent: EntityId,
    predicate: impl Fn(&Creature) -> bool,
) -> Option<EntityId> {
    let me = world.creatures.get(ent)?;
    if !me.core.on_map() {
        return None;
    }
    let my_pos = me.core.pos;

    let mut best: Vec<EntityId> = Vec::with_capacity(2);
    let mut dist = i32::MAX;
    for player in &world.players {
        let Some(kid) = player.knight else { continue };
        let Some(kt) = world.creatures.get(kid) else {
            continue;
        };
        if !kt.core.on_map() || !predicate(kt) {
            continue;
        }
        if world.rooms.num_rooms() > 0 && !world.rooms.in_same_room(my_pos, kt.core.pos) {
            continue;
        }
        let d = my_pos.manhattan(&kt.core.pos);
        if d < dist {
            dist = d;
            best.clear();
            best.push(kid);
        } else if d == dist {
            best.push(kid);
        }
    }

    if best.is_empty() {
        None
    } else {
        Some(best[world.rng.get_int(0, best.len() as i32) as usize])
    }
}

/// Chooses a direction for a monster to move in, biased towards the target
/// (or away from it when afraid). Axis order and perpendicular preference
/// are randomised; the first direction the predicate accepts wins.
pub fn choose_direction(
    world: &World,
    ent: EntityId,
    target_pos: Option<MapCoord>,
    afraid: bool,
    can_move: impl Fn(&World, MapCoord) -> bool,
) -> Option<MapDirection> {
    let me = world.creatures.get(ent)?;
    let pos = me.core.pos;

    // Vector to the target, reversed when running away.
    let mut d = match target_pos {
        Some(t) => [
            i32::from(t.x) - i32::from(pos.x),
            i32::from(t.y) - i32::from(pos.y),
        ],
        None => [0, 0],
    };
    let mut basedir = [MapDirection::East, MapDirection::South];
    if afraid {
        d[0] = -d[0];
        d[1] = -d[1];
    }

    // 50% chance to try the other axis first.
    if world.rng.get_bool(0.5) {
        d.swap(0, 1);
        basedir.swap(0, 1);
    }

    // Preferred directions first...
    let mut dirs: Vec<MapDirection> = Vec::with_capacity(4);
    for i in 0..2 {
        if d[i] > 0 {
            dirs.push(basedir[i]);
        } else if d[i] < 0 {
            dirs.push(basedir[i].opposite());
        }
    }
    // ...then the reverse directions (randomised order on the zero axes).
    for i in 0..2 {
        if d[i] == 0 {
            if world.rng.get_bool(0.5) {
                dirs.push(basedir[i]);
                dirs.push(basedir[i].opposite());
            } else {
                dirs.push(basedir[i].opposite());
                dirs.push(basedir[i]);
            }
        } else if d[i] > 0 {
            dirs.push(basedir[i].opposite());
        } else {
            dirs.push(basedir[i]);
        }
    }
    debug_assert_eq!(dirs.len(), 4);

    dirs.into_iter()
        .find(|dir| can_move(world, pos.displace(*dir)))
}

/// The shared rescheduling rule. An idle monster waits a preset delay; a
/// busy one waits until just after it can act again. A flying monster that
/// may bite mid-move wakes halfway through its current move instead.
pub fn replace_task(
    world: &World,
    sched: &mut TaskScheduler,
    id: EntityId,
    task: Box<dyn Task>,
    replace_halfway_through_move: bool,
) {
    let Some(creature) = world.creatures.get(id) else {
        return; // monster is gone; drop the task
    };
    let gvt = sched.gvt();
    let wait = world.config.tunables.monster_wait_time;
    let core = &creature.core;

    if !core.is_stunned(gvt) && !core.is_moving() {
        sched.add_task(task, TaskPriority::Low, gvt + wait);
        return;
    }

    let mut known = false;
    let mut until = i32::MIN;
    if let Some(stun) = core.stunned_until.filter(|&t| t > gvt) {
        known = true;
        until = stun;
    }
    if let Motion::Moving { arrival_time, .. } = core.motion
        && (!known || arrival_time > until)
    {
        known = true;
        until = if replace_halfway_through_move {
            gvt + (arrival_time - gvt) / 2
        } else {
            arrival_time
        };
    }

    if known {
        sched.add_task(task, TaskPriority::Low, until + 1);
    } else {
        sched.add_task(task, TaskPriority::Low, gvt + wait);
    }
}

fn bat_can_enter(world: &World, mc: MapCoord) -> bool {
    world.map.get_access(mc, MapHeight::Flying) == MapAccess::Clear
}

fn zombie_can_walk(world: &World, mc: MapCoord, avoid: &[TileTypeId]) -> bool {
    if world.map.get_access(mc, MapHeight::Walking) != MapAccess::Clear {
        return false;
    }
    !world
        .map
        .get_tiles(mc)
        .iter()
        .any(|t| avoid.contains(&t.ttype))
}

fn zombie_can_fight(
    world: &World,
    mc: MapCoord,
    fear: &[ItemTypeId],
    hit: &[ItemTypeId],
) -> bool {
    // A knight can always be attacked (unless protected by a feared item);
    // note this lets a zombie strike an invisible knight standing next to it
    // even though it would never target one from afar.
    if knight_at(world, mc, fear) {
        return true;
    }
    // A bear-trap-like item lying on the floor gets whacked too.
    if world
        .map
        .get_item(mc)
        .is_some_and(|item| hit.contains(&item.itype))
    {
        return true;
    }
    // And destructible furniture, as long as it is not a door.
    world
        .map
        .get_tiles(mc)
        .iter()
        .any(|t| t.destructible && !matches!(t.kind, TileKind::Door(_)))
}

/// The offset-aware "is the target under me" check for flying monsters. The
/// sign conventions depend on whether the two entities share a square and on
/// their relative facing.
fn target_underneath(world: &World, me: &EntityCore, target: &EntityCore, gvt: i32) -> bool {
    let approach = world.config.tunables.approach_offset;
    let threshold = world.config.tunables.flying_monster_targetting_offset;
    let my_ofs = me.motion.offset_at(gvt, approach);
    let t_ofs = target.motion.offset_at(gvt, approach);

    let dist = if target.pos == me.pos {
        if target.facing == me.facing {
            (t_ofs - my_ofs).abs()
        } else {
            t_ofs + my_ofs
        }
    } else if target.pos == me.pos.displace(me.facing) {
        if target.facing == me.facing.opposite() {
            (1000 - my_ofs - t_ofs).abs()
        } else {
            1000 - my_ofs + t_ofs
        }
    } else {
        return false;
    };

    dist < threshold
}

/// Spawns a walking monster if its feet accept the square. The AI task is
/// queued one tick out.
pub fn spawn_walking_monster(
    world: &mut World,
    sched: &mut TaskScheduler,
    mtype: MonsterTypeId,
    mc: MapCoord,
) -> Option<EntityId> {
    let mt = world.config.monster_type(mtype).clone();
    let MonsterBehaviour::Walking { ref avoid_tiles, .. } = mt.behaviour else {
        return None;
    };
    if !zombie_can_walk(world, mc, avoid_tiles) {
        return None;
    }
    let health = mt.health.roll(&world.rng).max(1);
    let id = world.creatures.insert(Creature {
        core: EntityCore::new(MapHeight::Walking, health, mt.speed, mt.anim),
        kind: CreatureKind::WalkingMonster(MonsterData {
            mtype,
            run_away: false,
        }),
    });
    let facing = MapDirection::from_u8(world.rng.get_int(0, 4) as u8).unwrap();
    world.place_creature(id, mc, facing, sched.gvt());
    sched.add_task(
        Box::new(WalkingMonsterAi { id }),
        TaskPriority::Low,
        sched.gvt() + 1,
    );
    Some(id)
}

/// Spawns a flying monster; it does not care what it spawns above.
pub fn spawn_flying_monster(
    world: &mut World,
    sched: &mut TaskScheduler,
    mtype: MonsterTypeId,
    mc: MapCoord,
) -> Option<EntityId> {
    let mt = world.config.monster_type(mtype).clone();
    if !matches!(mt.behaviour, MonsterBehaviour::Flying { .. }) {
        return None;
    }
    let health = mt.health.roll(&world.rng).max(1);
    let id = world.creatures.insert(Creature {
        core: EntityCore::new(MapHeight::Flying, health, mt.speed, mt.anim),
        kind: CreatureKind::FlyingMonster(MonsterData {
            mtype,
            run_away: false,
        }),
    });
    let facing = MapDirection::from_u8(world.rng.get_int(0, 4) as u8).unwrap();
    world.place_creature(id, mc, facing, sched.gvt());
    sched.add_task(
        Box::new(FlyingMonsterAi {
            id,
            next_bite_time: 0,
        }),
        TaskPriority::Low,
        sched.gvt() + 1,
    );
    Some(id)
}

/// The vampire-bat behaviour task.
pub struct FlyingMonsterAi {
    id: EntityId,
    next_bite_time: i32,
}

enum BatAction {
    Nothing,
    Move(MapDirection),
    Bite(EntityId),
}

impl Task for FlyingMonsterAi {
    fn execute(mut self: Box<Self>, world: &mut World, sched: &mut TaskScheduler) {
        let gvt = sched.gvt();
        let Some(bat) = world.creatures.get(self.id) else {
            return; // the bat has died
        };
        if !bat.core.on_map() {
            return;
        }
        let stunned = bat.core.is_stunned(gvt);
        let moving = bat.core.is_moving();
        let run_away = bat.monster().is_some_and(|m| m.run_away);
        let wait_chance = world.config.tunables.monster_wait_chance;
        let bite_wait = world.config.tunables.flying_monster_bite_wait;

        let target = find_closest_knight(world, self.id, |_| true);
        let bite_allowed = gvt >= self.next_bite_time
            && !run_away
            && target.is_some_and(|t| {
                let me = &world.creatures.get(self.id).unwrap().core;
                let tc = &world.creatures.get(t).unwrap().core;
                target_underneath(world, me, tc, gvt)
            });

        // Choose the action. `allow_bite_halfway` decides whether the next
        // wakeup lands halfway through our own move.
        let mut action = BatAction::Nothing;
        let mut allow_bite_halfway = true;
        if stunned {
            // Do nothing.
        } else if moving {
            // Halfway through a move: bite if we may, then wait the move out.
            if bite_allowed {
                action = BatAction::Bite(target.unwrap());
            }
            allow_bite_halfway = false;
        } else if run_away && let Some(t) = target {
            // Retreat along the direction the target is facing, or any
            // direction away from it.
            let t_facing = world.creatures.get(t).unwrap().core.facing;
            let t_pos = world.creatures.get(t).unwrap().core.pos;
            let bat_pos = world.creatures.get(self.id).unwrap().core.pos;
            if bat_can_enter(world, bat_pos.displace(t_facing)) {
                action = BatAction::Move(t_facing);
            } else if let Some(dir) =
                choose_direction(world, self.id, Some(t_pos), true, bat_can_enter)
            {
                action = BatAction::Move(dir);
            }
            allow_bite_halfway = false;
        } else if bite_allowed {
            action = BatAction::Bite(target.unwrap());
            allow_bite_halfway = false;
        } else if let Some(t) = target {
            let t_pos = world.creatures.get(t).unwrap().core.pos;
            if let Some(dir) = choose_direction(world, self.id, Some(t_pos), false, bat_can_enter) {
                action = BatAction::Move(dir);
            }
            allow_bite_halfway = true;
        } else if world.rng.get_bool(wait_chance) {
            // No target: sometimes just hang in the air.
            allow_bite_halfway = false;
        } else {
            if let Some(dir) = choose_direction(world, self.id, None, false, bat_can_enter) {
                action = BatAction::Move(dir);
            }
            allow_bite_halfway = false;
        }

        if !stunned {
            match action {
                BatAction::Move(dir) => {
                    world.set_facing(self.id, dir);
                    world.start_motion(sched, self.id, MotionType::Move, false);
                    if let Some(m) = world
                        .creatures
                        .get_mut(self.id)
                        .and_then(|c| c.monster_mut())
                    {
                        m.run_away = false;
                    }
                }
                BatAction::Bite(t) => {
                    self.next_bite_time = gvt + bite_wait;
                    bite(world, sched, self.id, t);
                }
                BatAction::Nothing => {}
            }
        }

        let halfway = allow_bite_halfway;
        let id = self.id;
        replace_task(world, sched, id, self, halfway);
    }
}

/// Strikes the target from the air, then stuns the attacker for the melee
/// delay with the impact frame showing.
fn bite(world: &mut World, sched: &mut TaskScheduler, bat: EntityId, target: EntityId) {
    let gvt = sched.gvt();
    let Some(b) = world.creatures.get(bat) else {
        return;
    };
    if b.core.is_stunned(gvt) {
        return;
    }
    let Some(mtype) = b.monster().map(|m| m.mtype) else {
        return;
    };
    let MonsterBehaviour::Flying {
        attack_damage,
        attack_stun_ms,
    } = world.config.monster_type(mtype).behaviour
    else {
        return;
    };

    let stun_until = gvt + attack_stun_ms.roll(&world.rng);
    world.damage_creature(sched, target, attack_damage, Originator::Monster, Some(stun_until));

    let wait_until = gvt + world.config.tunables.melee_delay_time;
    world.set_anim_frame(bat, AF_IMPACT, Some(wait_until), gvt);
    if let Some(b) = world.creatures.get_mut(bat) {
        b.core.stun_until(wait_until);
    }
}

/// The zombie behaviour task.
pub struct WalkingMonsterAi {
    id: EntityId,
}

enum ZombieAction {
    Nothing,
    Swing(MapDirection),
    Move(MapDirection),
    Face(MapDirection),
}

impl Task for WalkingMonsterAi {
    fn execute(self: Box<Self>, world: &mut World, sched: &mut TaskScheduler) {
        let gvt = sched.gvt();
        let Some(mon) = world.creatures.get(self.id) else {
            return; // our monster appears to have died
        };
        if !mon.core.on_map() {
            return;
        }
        let Some(mtype) = mon.monster().map(|m| m.mtype) else {
            return;
        };
        let MonsterBehaviour::Walking {
            fear_items,
            hit_items,
            avoid_tiles,
            ..
        } = world.config.monster_type(mtype).behaviour.clone()
        else {
            return;
        };

        // A knight flaunting a feared item is something to run from; any
        // other visible knight is prey.
        let feared = find_closest_knight(world, self.id, |c| {
            !c.core.invisible
                && c.knight()
                    .is_some_and(|k| k.item_in_hand.is_some_and(|h| fear_items.contains(&h)))
        });
        let (target, run_away) = match feared {
            Some(t) => (Some(t), true),
            None => (
                find_closest_knight(world, self.id, |c| !c.core.invisible),
                false,
            ),
        };

        let wait_chance = world.config.tunables.monster_wait_chance;
        let can_move =
            |w: &World, mc: MapCoord| {
                zombie_can_walk(w, mc, &avoid_tiles) || zombie_can_fight(w, mc, &fear_items, &hit_items)
            };
        let chosen = if target.is_none() && world.rng.get_bool(wait_chance) {
            None
        } else {
            let t_pos = target.map(|t| world.creatures.get(t).unwrap().core.pos);
            choose_direction(world, self.id, t_pos, run_away, can_move)
        };

        let mon = world.creatures.get(self.id).expect("checked above");
        let mut action = ZombieAction::Nothing;
        if !mon.core.is_stunned(gvt) && !mon.core.is_moving() {
            let pos = mon.core.pos;
            match chosen {
                Some(dir) => {
                    let ahead = pos.displace(dir);
                    if zombie_can_fight(world, ahead, &fear_items, &hit_items) {
                        action = ZombieAction::Swing(dir);
                    } else if zombie_can_walk(world, ahead, &avoid_tiles) {
                        action = ZombieAction::Move(dir);
                    } else {
                        action = ZombieAction::Face(dir);
                    }
                }
                None => {
                    // Staying put: at least turn to face the target, it looks
                    // a bit better.
                    let dir = match target {
                        Some(t) => direction_from_to(pos, world.creatures.get(t).unwrap().core.pos),
                        None => MapDirection::from_u8(world.rng.get_int(0, 4) as u8).unwrap(),
                    };
                    action = ZombieAction::Face(dir);
                }
            }
        }

        match action {
            ZombieAction::Swing(dir) => {
                world.set_facing(self.id, dir);
                swing(world, sched, self.id, &fear_items, &hit_items);
            }
            ZombieAction::Move(dir) => {
                world.set_facing(self.id, dir);
                world.start_motion(sched, self.id, MotionType::Move, false);
            }
            ZombieAction::Face(dir) => world.set_facing(self.id, dir),
            ZombieAction::Nothing => {}
        }

        let id = self.id;
        replace_task(world, sched, id, self, false);
    }
}

/// A melee swing at the square ahead: knights get the weapon, bear-trap
/// items get sprung, furniture gets smashed.
fn swing(
    world: &mut World,
    sched: &mut TaskScheduler,
    id: EntityId,
    fear_items: &[ItemTypeId],
    hit_items: &[ItemTypeId],
) {
    let gvt = sched.gvt();
    let Some(mon) = world.creatures.get(id) else {
        return;
    };
    if mon.core.is_stunned(gvt) {
        return;
    }
    let pos = mon.core.pos;
    let facing = mon.core.facing;
    let ahead = pos.displace(facing);
    let Some(mtype) = mon.monster().map(|m| m.mtype) else {
        return;
    };
    let MonsterBehaviour::Walking { weapon, .. } = world.config.monster_type(mtype).behaviour
    else {
        return;
    };
    let stats = world.config.item_type(weapon).weapon.clone();

    // Pick the victim: a knight without the feared item first.
    let victim = world
        .map
        .get_entities(ahead)
        .iter()
        .copied()
        .find(|v| {
            world.creatures.get(*v).is_some_and(|c| {
                c.knight()
                    .is_some_and(|k| !k.item_in_hand.is_some_and(|h| fear_items.contains(&h)))
            })
        });

    if let Some(victim) = victim {
        if let Some(stats) = &stats {
            let stun_until = gvt + world.rng.get_int(stats.stun_min_ms, stats.stun_max_ms + 1);
            world.damage_creature(sched, victim, stats.damage, Originator::Monster, Some(stun_until));
        }
    } else if world
        .map
        .get_item(ahead)
        .is_some_and(|i| hit_items.contains(&i.itype))
    {
        // Springing a bear trap destroys it and hurts the monster.
        world.remove_item(ahead, Originator::Monster);
        world.damage_creature(sched, id, 1, Originator::None, None);
    } else {
        let tile_damage = stats.as_ref().map(|s| s.tile_damage).unwrap_or(1);
        world.damage_tile(sched, ahead, tile_damage, Some(id), Originator::Monster);
    }

    // Impact frame plus the usual post-swing stun.
    let wait_until = gvt + world.config.tunables.melee_delay_time;
    world.set_anim_frame(id, AF_IMPACT, Some(wait_until), gvt);
    if let Some(mon) = world.creatures.get_mut(id) {
        mon.core.stun_until(wait_until);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::home::HomeLocation;
    use crate::world::World;

    fn arena_world(w: i16, h: i16, players: usize) -> (World, TaskScheduler) {
        let mut world = World::for_tests(w, h, players);
        for y in 0..h {
            for x in 0..w {
                let tile = world.config.tiles[0].clone();
                world.add_tile(MapCoord::new(x, y), tile, Originator::None);
            }
        }
        world.rooms.add_room(MapCoord::new(-1, -1), w + 2, h + 2);
        world.rooms.done_adding_rooms(&world.rng);
        (world, TaskScheduler::new())
    }

    fn spawn_knight_at(world: &mut World, sched: &mut TaskScheduler, n: usize, mc: MapCoord) -> EntityId {
        world.players[n].home = Some(HomeLocation {
            mc,
            facing: MapDirection::North,
        });
        world.spawn_knight(sched, n).unwrap()
    }

    #[test]
    fn closest_knight_prefers_distance_and_room() {
        let (mut world, mut sched) = arena_world(8, 8, 2);
        let zombie = spawn_walking_monster(
            &mut world,
            &mut sched,
            MonsterTypeId(0),
            MapCoord::new(4, 4),
        )
        .unwrap();
        let near = spawn_knight_at(&mut world, &mut sched, 0, MapCoord::new(4, 6));
        let _far = spawn_knight_at(&mut world, &mut sched, 1, MapCoord::new(0, 0));

        assert_eq!(find_closest_knight(&world, zombie, |_| true), Some(near));
    }

    #[test]
    fn knights_in_other_rooms_are_invisible_to_targeting() {
        let mut world = World::for_tests(10, 5, 1);
        for y in 0..5 {
            for x in 0..10 {
                let tile = world.config.tiles[0].clone();
                world.add_tile(MapCoord::new(x, y), tile, Originator::None);
            }
        }
        // Two separate rooms with no shared border.
        world.rooms.add_room(MapCoord::new(0, 0), 4, 5);
        world.rooms.add_room(MapCoord::new(6, 0), 4, 5);
        world.rooms.done_adding_rooms(&world.rng);
        let mut sched = TaskScheduler::new();

        let zombie = spawn_walking_monster(
            &mut world,
            &mut sched,
            MonsterTypeId(0),
            MapCoord::new(1, 1),
        )
        .unwrap();
        let _kt = spawn_knight_at(&mut world, &mut sched, 0, MapCoord::new(8, 1));
        assert_eq!(find_closest_knight(&world, zombie, |_| true), None);
    }

    #[test]
    fn choose_direction_respects_the_predicate() {
        let (mut world, mut sched) = arena_world(6, 6, 1);
        let zombie = spawn_walking_monster(
            &mut world,
            &mut sched,
            MonsterTypeId(0),
            MapCoord::new(2, 2),
        )
        .unwrap();

        // Only the eastern neighbour is allowed.
        let only_east =
            |_: &World, mc: MapCoord| mc == MapCoord::new(3, 2);
        for _ in 0..8 {
            assert_eq!(
                choose_direction(&world, zombie, Some(MapCoord::new(5, 2)), false, only_east),
                Some(MapDirection::East)
            );
        }
        // Nothing allowed at all: no direction comes back.
        let nothing = |_: &World, _: MapCoord| false;
        assert_eq!(
            choose_direction(&world, zombie, None, false, nothing),
            None
        );
    }

    #[test]
    fn zombie_walks_towards_its_prey() {
        let (mut world, mut sched) = arena_world(8, 8, 1);
        let zombie = spawn_walking_monster(
            &mut world,
            &mut sched,
            MonsterTypeId(0),
            MapCoord::new(1, 4),
        )
        .unwrap();
        let _kt = spawn_knight_at(&mut world, &mut sched, 0, MapCoord::new(6, 4));

        let before = world.creatures.get(zombie).unwrap().core.pos;
        sched.run_until(5_000, &mut world);
        let after = world.creatures.get(zombie).unwrap().core.pos;
        let target = MapCoord::new(6, 4);
        assert!(
            after.manhattan(&target) < before.manhattan(&target),
            "zombie did not close in: {before:?} -> {after:?}"
        );
    }

    #[test]
    fn zombie_swings_at_an_adjacent_knight() {
        let (mut world, mut sched) = arena_world(6, 6, 1);
        let _zombie = spawn_walking_monster(
            &mut world,
            &mut sched,
            MonsterTypeId(0),
            MapCoord::new(2, 2),
        )
        .unwrap();
        let kt = spawn_knight_at(&mut world, &mut sched, 0, MapCoord::new(3, 2));
        let start_health = world.creatures.get(kt).unwrap().core.health;

        // Short window: enough for a couple of swings, not enough to kill.
        sched.run_until(1_000, &mut world);
        let health = world.creatures.get(kt).unwrap().core.health;
        assert!(health < start_health, "knight was never hit");
    }

    #[test]
    fn bat_bites_the_knight_underneath() {
        let (mut world, mut sched) = arena_world(6, 6, 1);
        let kt = spawn_knight_at(&mut world, &mut sched, 0, MapCoord::new(3, 3));
        let _bat = spawn_flying_monster(
            &mut world,
            &mut sched,
            MonsterTypeId(1),
            MapCoord::new(3, 3),
        )
        .unwrap();
        let start_health = world.creatures.get(kt).unwrap().core.health;

        sched.run_until(3_000, &mut world);
        let health = world.creatures.get(kt).unwrap().core.health;
        assert!(health < start_health, "bat never bit");
    }

    #[test]
    fn damaged_bat_retreats_before_biting_again() {
        let (mut world, mut sched) = arena_world(6, 6, 1);
        let _kt = spawn_knight_at(&mut world, &mut sched, 0, MapCoord::new(3, 3));
        let bat = spawn_flying_monster(
            &mut world,
            &mut sched,
            MonsterTypeId(1),
            MapCoord::new(3, 3),
        )
        .unwrap();

        world.damage_creature(&mut sched, bat, 0, Originator::Player(0), Some(500));
        let data = world.creatures.get(bat).unwrap();
        assert!(data.monster().unwrap().run_away);
        // Impact stuns never stick to a flying monster.
        assert_eq!(data.core.stunned_until, None);
    }

    #[test]
    fn reschedule_waits_for_stun_to_end() {
        let (mut world, mut sched) = arena_world(6, 6, 1);
        let zombie = spawn_walking_monster(
            &mut world,
            &mut sched,
            MonsterTypeId(0),
            MapCoord::new(2, 2),
        )
        .unwrap();
        sched.run_until(10, &mut world);
        world.creatures.get_mut(zombie).unwrap().core.stun_until(400);

        // Drain the queue of the AI task by hand: we only check the timing
        // rule here.
        let before = sched.num_pending();
        replace_task(
            &world,
            &mut sched,
            zombie,
            Box::new(WalkingMonsterAi { id: zombie }),
            false,
        );
        assert_eq!(sched.num_pending(), before + 1);
    }
}
