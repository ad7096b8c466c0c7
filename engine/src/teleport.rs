//! Teleport helpers, plus the knight-finding routines used by attractor and
//! repulsor effects.

use crate::creature::EntityId;
use crate::geometry::{MapAccess, MapCoord, MapDirection, MapHeight};
use crate::world::World;

fn do_teleport(world: &mut World, id: EntityId, mc: MapCoord, new_facing: MapDirection, gvt: i32) {
    // A teleported knight does not get to see its new surroundings revealed
    // with the usual animation; the flag suppresses that once.
    if let Some(player_num) = world
        .creatures
        .get(id)
        .and_then(|c| c.knight())
        .map(|k| k.player_num)
    {
        world.players[player_num].teleport_flag = true;
    }

    world.remove_creature_from_map(id);
    world.place_creature(id, mc, new_facing, gvt);
    if let Some(player_num) = world
        .creatures
        .get(id)
        .and_then(|c| c.knight())
        .map(|k| k.player_num)
    {
        world.update_player_room(player_num, gvt);
    }
}

fn try_square(world: &mut World, id: EntityId, mc: MapCoord, gvt: i32) -> bool {
    if world.map.get_access(mc, MapHeight::Walking) == MapAccess::Clear
        && !world.square_occupied(mc, MapHeight::Walking)
    {
        let facing = world
            .creatures
            .get(id)
            .map(|c| c.core.facing)
            .unwrap_or(MapDirection::North);
        do_teleport(world, id, mc, facing, gvt);
        return true;
    }
    false
}

/// Teleports to the target square, or failing that one of the four
/// neighbours, tried front/back/clockwise/anticlockwise relative to the
/// entity's facing.
pub fn teleport_to_square(world: &mut World, id: EntityId, mc: MapCoord, gvt: i32) -> bool {
    let Some(creature) = world.creatures.get(id) else {
        return false;
    };
    if !creature.core.on_map() {
        return false;
    }
    let facing = creature.core.facing;

    try_square(world, id, mc, gvt)
        || try_square(world, id, mc.displace(facing), gvt)
        || try_square(world, id, mc.displace(facing.opposite()), gvt)
        || try_square(world, id, mc.displace(facing.clockwise()), gvt)
        || try_square(world, id, mc.displace(facing.anticlockwise()), gvt)
}

/// Fifty uniform draws over the interior of the map, then give up. A failed
/// teleport leaves the entity untouched.
pub fn teleport_to_random_square(world: &mut World, id: EntityId, gvt: i32) -> bool {
    if world.creatures.get(id).is_none_or(|c| !c.core.on_map()) {
        return false;
    }
    let (w, h) = (world.map.width(), world.map.height());
    for _ in 0..50 {
        let mc = MapCoord::new(
            world.rng.get_int(1, i32::from(w) - 1) as i16,
            world.rng.get_int(1, i32::from(h) - 1) as i16,
        );
        if try_square(world, id, mc, gvt) {
            return true;
        }
    }
    false
}

/// Teleports `from` into the room `to` is standing in (coin flip when `to`
/// straddles a border), landing on a random clear square with a random new
/// facing. Up to a hundred samples; silently gives up after that.
pub fn teleport_to_room(world: &mut World, from: EntityId, to: EntityId, gvt: i32) -> bool {
    let Some(target_pos) = world.creatures.get(to).map(|c| c.core.pos) else {
        return false;
    };
    if world.creatures.get(from).is_none_or(|c| !c.core.on_map()) {
        return false;
    }

    let (r1, r2) = world.rooms.rooms_at(target_pos);
    let room = match (r1, r2) {
        (Some(a), Some(b)) => {
            if world.rng.get_bool(0.5) {
                b
            } else {
                a
            }
        }
        (Some(a), None) => a,
        _ => return false,
    };
    let Some(rect) = world.rooms.room(room) else {
        return false;
    };

    let new_facing = MapDirection::from_u8(world.rng.get_int(0, 4) as u8).unwrap();
    for _ in 0..100 {
        let mc = MapCoord::new(
            rect.top_left.x + world.rng.get_int(0, i32::from(rect.w)) as i16,
            rect.top_left.y + world.rng.get_int(0, i32::from(rect.h)) as i16,
        );
        if world.map.get_access(mc, MapHeight::Walking) == MapAccess::Clear
            && !world.square_occupied(mc, MapHeight::Walking)
        {
            do_teleport(world, from, mc, new_facing, gvt);
            return true;
        }
    }
    false
}

/// The nearest other knight on the map by Manhattan distance, ties broken by
/// coin flip. Knights on the caller's own square do not count.
pub fn find_nearest_other_knight(world: &World, my_pos: MapCoord) -> Option<EntityId> {
    let mut dist = i32::MAX;
    let mut target = None;
    for player in &world.players {
        let Some(kid) = player.knight else { continue };
        let Some(kt) = world.creatures.get(kid) else {
            continue;
        };
        if !kt.core.on_map() {
            continue;
        }
        let d = my_pos.manhattan(&kt.core.pos);
        if (d > 0 && d < dist) || (d == dist && world.rng.get_bool(0.5)) {
            dist = d;
            target = Some(kid);
        }
    }
    target
}

/// A uniformly random knight other than `me`.
pub fn find_random_other_knight(world: &World, me: EntityId) -> Option<EntityId> {
    let mut order: Vec<usize> = (0..world.players.len()).collect();
    world.rng.shuffle(&mut order);
    for num in order {
        let Some(kid) = world.players[num].knight else {
            continue;
        };
        if kid != me && world.creatures.get(kid).is_some() {
            return Some(kid);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dungeon::Originator;
    use crate::home::HomeLocation;
    use crate::tasks::TaskScheduler;

    fn walled_world(players: usize) -> (World, TaskScheduler) {
        // Fully walled: no square is clear anywhere.
        let mut world = World::for_tests(8, 8, players);
        for y in 0..8 {
            for x in 0..8 {
                let tile = world.config.tiles[1].clone();
                world.add_tile(MapCoord::new(x, y), tile, Originator::None);
            }
        }
        (world, TaskScheduler::new())
    }

    fn open_world(players: usize) -> (World, TaskScheduler) {
        let mut world = World::for_tests(8, 8, players);
        for y in 0..8 {
            for x in 0..8 {
                let tile = world.config.tiles[0].clone();
                world.add_tile(MapCoord::new(x, y), tile, Originator::None);
            }
        }
        (world, TaskScheduler::new())
    }

    fn spawn(world: &mut World, sched: &mut TaskScheduler, n: usize, mc: MapCoord) -> EntityId {
        world.players[n].home = Some(HomeLocation {
            mc,
            facing: MapDirection::North,
        });
        world.spawn_knight(sched, n).unwrap()
    }

    #[test]
    fn teleport_prefers_the_exact_square() {
        let (mut world, mut sched) = open_world(1);
        let id = spawn(&mut world, &mut sched, 0, MapCoord::new(1, 1));
        assert!(teleport_to_square(&mut world, id, MapCoord::new(5, 5), 0));
        assert_eq!(world.creatures.get(id).unwrap().core.pos, MapCoord::new(5, 5));
    }

    #[test]
    fn teleport_falls_back_to_neighbours() {
        let (mut world, mut sched) = open_world(1);
        let id = spawn(&mut world, &mut sched, 0, MapCoord::new(1, 1));
        let wall = world.config.tiles[1].clone();
        world.add_tile(MapCoord::new(5, 5), wall, Originator::None);

        assert!(teleport_to_square(&mut world, id, MapCoord::new(5, 5), 0));
        let pos = world.creatures.get(id).unwrap().core.pos;
        assert_eq!(pos.manhattan(&MapCoord::new(5, 5)), 1);
    }

    #[test]
    fn random_teleport_gives_up_after_fifty_attempts() {
        let (mut world, _sched) = walled_world(1);
        // Spawn by hand: the map is walls, so place the knight directly.
        let id = {
            use crate::creature::{Creature, CreatureKind, EntityCore, KnightData};
            let id = world.creatures.insert(Creature {
                core: EntityCore::new(MapHeight::Walking, 10, 100, 0),
                kind: CreatureKind::Knight(KnightData::default()),
            });
            world.players[0].knight = Some(id);
            world.place_creature(id, MapCoord::new(2, 2), MapDirection::North, 0);
            id
        };

        assert!(!teleport_to_random_square(&mut world, id, 0));
        // The entity did not move.
        assert_eq!(world.creatures.get(id).unwrap().core.pos, MapCoord::new(2, 2));
    }

    #[test]
    fn teleport_to_room_lands_inside_the_target_room() {
        let (mut world, mut sched) = open_world(2);
        world.rooms.add_room(MapCoord::new(0, 0), 4, 4);
        world.rooms.add_room(MapCoord::new(3, 0), 5, 8);
        world.rooms.done_adding_rooms(&world.rng);

        let a = spawn(&mut world, &mut sched, 0, MapCoord::new(1, 1));
        let b = spawn(&mut world, &mut sched, 1, MapCoord::new(6, 5));

        assert!(teleport_to_room(&mut world, a, b, 0));
        let pos = world.creatures.get(a).unwrap().core.pos;
        assert!(world.rooms.in_same_room(pos, MapCoord::new(6, 5)));
    }

    #[test]
    fn nearest_knight_ignores_self_square() {
        let (mut world, mut sched) = open_world(3);
        let a = spawn(&mut world, &mut sched, 0, MapCoord::new(1, 1));
        let b = spawn(&mut world, &mut sched, 1, MapCoord::new(2, 1));
        let _c = spawn(&mut world, &mut sched, 2, MapCoord::new(7, 7));

        let my_pos = world.creatures.get(a).unwrap().core.pos;
        assert_eq!(find_nearest_other_knight(&world, my_pos), Some(b));
    }

    #[test]
    fn random_other_knight_never_returns_me() {
        let (mut world, mut sched) = open_world(2);
        let a = spawn(&mut world, &mut sched, 0, MapCoord::new(1, 1));
        let b = spawn(&mut world, &mut sched, 1, MapCoord::new(5, 5));
        for _ in 0..10 {
            assert_eq!(find_random_other_knight(&world, a), Some(b));
        }
    }
}
