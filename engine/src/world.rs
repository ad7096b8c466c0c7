//! The authoritative game world: map, creatures, players, homes and views,
//! plus every operation that touches more than one of them.
//!
//! There is no global singleton; whatever needs the world gets handed a
//! `&mut World` (tasks receive it through their `execute`). All mutation
//! happens on the engine thread between task boundaries.

use crate::config::{Action, GameConfig};
use crate::creature::{
    AF_PARRY, Creature, CreatureArena, CreatureKind, EntityCore, EntityId, KnightData, Motion,
    MotionType,
};
use crate::dungeon::{DropResult, DungeonMap, MapChangeListener, Originator};
use crate::geometry::{MapAccess, MapCoord, MapDirection, MapHeight};
use crate::home::{HomeLocation, HomeManager, SecureResult};
use crate::item::Item;
use crate::player::Player;
use crate::rng::GameRng;
use crate::room::RoomMap;
use crate::tasks::{Task, TaskPriority, TaskScheduler};
use crate::tile::{TileKind, TileTypeId};
use crate::view::ViewHub;
use knights_protocol::messages::{EF_DURING_MOTION, EF_INVISIBLE, EF_INVULNERABLE};
use knights_protocol::{MotionKind, Paragraph, PlayerId, ServerMessage};
use std::sync::Arc;

/// Adapter that turns raw map change notifications into per-player view
/// messages (resolving item graphics through the config on the way).
pub(crate) struct MapNotify<'a> {
    pub hub: &'a mut ViewHub,
    pub config: &'a GameConfig,
}

impl MapChangeListener for MapNotify<'_> {
    fn tiles_changed(&mut self, mc: MapCoord, tiles: &[crate::tile::Tile], _originator: Originator) {
        for num in 0..self.hub.num_players() {
            self.hub.send_square_tiles(num, mc, tiles, false);
        }
    }

    fn item_changed(&mut self, mc: MapCoord, item: Option<&Item>, _originator: Originator) {
        let graphic = item
            .map(|i| self.config.item_type(i.itype).dungeon_graphic)
            .unwrap_or(0);
        for num in 0..self.hub.num_players() {
            self.hub.send_square_item(num, mc, graphic, false);
        }
    }
}

pub struct World {
    pub config: Arc<GameConfig>,
    pub rng: GameRng,
    pub map: DungeonMap,
    pub rooms: RoomMap,
    pub creatures: CreatureArena,
    pub players: Vec<Player>,
    pub homes: HomeManager,
    pub views: ViewHub,
    /// Set when some player has completed their quest.
    pub winner: Option<usize>,
}

impl World {
    pub fn new(
        config: Arc<GameConfig>,
        rng: GameRng,
        width: i16,
        height: i16,
        player_ids: Vec<(PlayerId, u8)>,
    ) -> World {
        let players = player_ids
            .into_iter()
            .enumerate()
            .map(|(num, (id, team))| Player::new(num, id, team))
            .collect::<Vec<_>>();
        World {
            views: ViewHub::new(players.len()),
            config,
            rng,
            map: DungeonMap::new(width, height),
            rooms: RoomMap::new(),
            creatures: CreatureArena::default(),
            players,
            homes: HomeManager::default(),
            winner: None,
        }
    }

    /// A small deterministic world on the sample config; the unit tests'
    /// workhorse.
    pub fn for_tests(width: i16, height: i16, num_players: usize) -> World {
        let ids = (0..num_players)
            .map(|n| (PlayerId::new(format!("p{n}")), (n % 2) as u8))
            .collect();
        World::new(
            Arc::new(GameConfig::sample()),
            GameRng::from_seed_bytes(b"world-tests"),
            width,
            height,
            ids,
        )
    }

    // ------------------------------------------------------------------
    // Map mutation with view fan-out.
    // ------------------------------------------------------------------

    pub fn add_tile(&mut self, mc: MapCoord, tile: crate::tile::Tile, originator: Originator) {
        let mut notify = MapNotify {
            hub: &mut self.views,
            config: &*self.config,
        };
        self.map.add_tile(mc, tile, originator, &mut notify);
    }

    pub fn rm_tile(&mut self, mc: MapCoord, ttype: TileTypeId, originator: Originator) {
        let mut notify = MapNotify {
            hub: &mut self.views,
            config: &*self.config,
        };
        self.map.rm_tile(mc, ttype, originator, &mut notify);
    }

    pub fn place_item(&mut self, mc: MapCoord, item: Item, originator: Originator) {
        let mut notify = MapNotify {
            hub: &mut self.views,
            config: &*self.config,
        };
        self.map.add_item(mc, item, originator, &mut notify);
    }

    pub fn remove_item(&mut self, mc: MapCoord, originator: Originator) -> Option<Item> {
        let mut notify = MapNotify {
            hub: &mut self.views,
            config: &*self.config,
        };
        self.map.rm_item(mc, originator, &mut notify)
    }

    pub fn drop_item(
        &mut self,
        item: Item,
        mc: MapCoord,
        allow_nonlocal: bool,
        prefer_dir: MapDirection,
        originator: Originator,
    ) -> DropResult {
        let mut notify = MapNotify {
            hub: &mut self.views,
            config: &*self.config,
        };
        self.map.drop_item(
            &self.config,
            item,
            mc,
            allow_nonlocal,
            prefer_dir,
            originator,
            &mut notify,
        )
    }

    // ------------------------------------------------------------------
    // Creatures.
    // ------------------------------------------------------------------

    pub fn knight_of(&self, player_num: usize) -> Option<EntityId> {
        self.players.get(player_num).and_then(|p| p.knight)
    }

    /// Whether a walking-height square is already held by a blocking
    /// creature.
    pub fn square_occupied(&self, mc: MapCoord, height: MapHeight) -> bool {
        self.map
            .get_entities(mc)
            .iter()
            .filter_map(|id| self.creatures.get(*id))
            .any(|c| c.core.height == height)
    }

    fn add_entity_msg_parts(&self, id: EntityId) -> Option<(EntityCore, PlayerId)> {
        let creature = self.creatures.get(id)?;
        let player = creature
            .knight()
            .map(|k| self.players[k.player_num].id.clone())
            .unwrap_or_default();
        Some((creature.core.clone(), player))
    }

    /// Makes the entity visible to everyone whose current room shows its
    /// square.
    pub fn reveal_creature(&mut self, id: EntityId, gvt: i32) {
        let Some((core, player)) = self.add_entity_msg_parts(id) else {
            return;
        };
        let approach_offset = self.config.tunables.approach_offset;
        let (motion_kind, remaining) = match core.motion {
            Motion::NotMoving { .. } => (MotionKind::NotMoving, 0),
            Motion::Moving {
                kind, arrival_time, ..
            } => (
                match kind {
                    MotionType::Move => MotionKind::Move,
                    MotionType::Approach => MotionKind::Approach,
                    MotionType::Withdraw => MotionKind::Withdraw,
                },
                (arrival_time - gvt).max(0) as u32,
            ),
        };
        let mut flags = 0u8;
        if core.invisible {
            flags |= EF_INVISIBLE;
        }
        if core.invulnerable {
            flags |= EF_INVULNERABLE;
        }
        let pos = core.pos;
        self.views.ensure_entity_visible(id, pos, |wire| {
            ServerMessage::AddEntity {
                id: wire,
                x: pos.x,
                y: pos.y,
                height: core.height as u8,
                facing: core.facing as u8,
                anim: core.anim,
                overlay: 0,
                frame: core.anim_frame,
                anim_zero_delta_ms: core
                    .anim_zero_time
                    .map(|t| (t - gvt).max(0) as u32)
                    .unwrap_or(0),
                flags,
                cur_offset: core.motion.offset_at(gvt, approach_offset) as i16,
                motion: motion_kind,
                motion_remaining_ms: remaining,
                player: player.clone(),
            }
        });
    }

    /// Puts a creature onto the map at a square and reveals it.
    pub fn place_creature(&mut self, id: EntityId, mc: MapCoord, facing: MapDirection, gvt: i32) {
        if let Some(creature) = self.creatures.get_mut(id) {
            debug_assert!(!creature.core.on_map(), "creature placed twice");
            creature.core.pos = mc;
            creature.core.facing = facing;
            creature.core.motion = Motion::STILL;
            self.map.add_entity(mc, id);
            self.reveal_creature(id, gvt);
        }
    }

    /// Takes a creature off the map (death, teleport staging). The arena
    /// entry survives; pending tasks no-op through the id.
    pub fn remove_creature_from_map(&mut self, id: EntityId) {
        if let Some(creature) = self.creatures.get_mut(id) {
            let pos = creature.core.pos;
            creature.core.pos = MapCoord::null();
            creature.core.motion = Motion::STILL;
            self.map.rm_entity(pos, id);
            self.views.entity_removed(id);
        }
    }

    /// Spawns (or respawns) the knight of a player at their home, facing out
    /// of it.
    pub fn spawn_knight(&mut self, sched: &mut TaskScheduler, player_num: usize) -> Option<EntityId> {
        let home = self.players[player_num].home?;
        let core = EntityCore::new(
            MapHeight::Walking,
            self.config.knight_health,
            100,
            self.config.knight_anim,
        );
        let id = self.creatures.insert(Creature {
            core,
            kind: CreatureKind::Knight(KnightData {
                player_num,
                ..KnightData::default()
            }),
        });
        self.players[player_num].knight = Some(id);
        self.views.set_own_knight(player_num, id);
        self.place_creature(id, home.mc, home.facing.opposite(), sched.gvt());
        self.update_player_room(player_num, sched.gvt());
        self.sync_status(player_num);
        Some(id)
    }

    // ------------------------------------------------------------------
    // Motion.
    // ------------------------------------------------------------------

    fn motion_duration(&self, id: EntityId, kind: MotionType) -> i32 {
        let speed = self
            .creatures
            .get(id)
            .map(|c| c.core.speed.max(1))
            .unwrap_or(100);
        let full = self.config.tunables.walk_time_ms * 100 / speed;
        match kind {
            MotionType::Move => full,
            MotionType::Approach | MotionType::Withdraw => {
                (full * self.config.tunables.approach_offset / 1000).max(1)
            }
        }
    }

    /// Starts a motion if the creature can act and the target square allows
    /// it. Returns whether the motion began.
    pub fn start_motion(
        &mut self,
        sched: &mut TaskScheduler,
        id: EntityId,
        kind: MotionType,
        missile_mode: bool,
    ) -> bool {
        let gvt = sched.gvt();
        let Some(creature) = self.creatures.get(id) else {
            return false;
        };
        let core = &creature.core;
        if !core.on_map() || core.is_stunned(gvt) || core.is_moving() {
            return false;
        }
        let ahead = core.pos.displace(core.facing);
        let height = core.height;
        match kind {
            MotionType::Move => {
                if self.map.get_access(ahead, height) != MapAccess::Clear
                    || self.square_occupied(ahead, height)
                {
                    return false;
                }
            }
            MotionType::Approach => {
                if core.is_approached() {
                    return false;
                }
                if self.map.get_access(ahead, height) == MapAccess::Blocked {
                    return false;
                }
            }
            MotionType::Withdraw => {
                if !core.is_approached() {
                    return false;
                }
            }
        }

        let duration = self.motion_duration(id, kind);
        let arrival = gvt + duration;
        let start_offset = match kind {
            MotionType::Withdraw => self.config.tunables.approach_offset,
            _ => 0,
        };
        let creature = self.creatures.get_mut(id).expect("checked above");
        creature.core.motion = Motion::Moving {
            kind,
            start_offset,
            start_time: gvt,
            arrival_time: arrival,
            missile_mode,
        };

        let wire_kind = match kind {
            MotionType::Move => MotionKind::Move,
            MotionType::Approach => MotionKind::Approach,
            MotionType::Withdraw => MotionKind::Withdraw,
        };
        self.views.entity_event(id, |wire| ServerMessage::MoveEntity {
            id: wire,
            motion: wire_kind,
            duration_ms: duration as u32,
            missile_mode,
        });

        sched.add_task(
            Box::new(ArrivalTask {
                id,
                expected_arrival: arrival,
            }),
            TaskPriority::Normal,
            arrival,
        );
        true
    }

    /// Turns a creature on the spot. Ignored mid-move (clients queue facing
    /// changes behind motion themselves).
    pub fn set_facing(&mut self, id: EntityId, facing: MapDirection) {
        let Some(creature) = self.creatures.get_mut(id) else {
            return;
        };
        if creature.core.is_moving() || creature.core.facing == facing {
            return;
        }
        creature.core.facing = facing;
        self.views.entity_event(id, |wire| ServerMessage::SetFacing {
            id: wire,
            facing: facing as u8,
        });
    }

    /// Sets the anim frame, optionally with an auto-revert time, and streams
    /// it out.
    pub fn set_anim_frame(&mut self, id: EntityId, frame: u8, zero_time: Option<i32>, gvt: i32) {
        let Some(creature) = self.creatures.get_mut(id) else {
            return;
        };
        creature.core.anim_frame = frame;
        creature.core.anim_zero_time = zero_time;
        let (anim, invis, invuln, moving) = (
            creature.core.anim,
            creature.core.invisible,
            creature.core.invulnerable,
            creature.core.is_moving(),
        );
        let mut flags = 0u8;
        if invis {
            flags |= EF_INVISIBLE;
        }
        if invuln {
            flags |= EF_INVULNERABLE;
        }
        if moving {
            flags |= EF_DURING_MOTION;
        }
        let delta = zero_time.map(|t| (t - gvt).max(0) as u32).unwrap_or(0);
        self.views.entity_event(id, |wire| ServerMessage::SetAnimData {
            id: wire,
            anim,
            overlay: 0,
            frame,
            anim_zero_delta_ms: delta,
            flags,
        });
    }

    // ------------------------------------------------------------------
    // Damage and death.
    // ------------------------------------------------------------------

    /// Applies damage with an optional stun. Flying monsters shrug off
    /// impact stuns and flag themselves to run away; walking monsters show
    /// the recoil frame.
    pub fn damage_creature(
        &mut self,
        sched: &mut TaskScheduler,
        id: EntityId,
        amount: i32,
        originator: Originator,
        stun_until: Option<i32>,
    ) {
        let gvt = sched.gvt();
        let Some(creature) = self.creatures.get_mut(id) else {
            return;
        };
        if creature.core.invulnerable {
            return;
        }

        let mut stun_until = stun_until;
        let mut recoil_frame = None;
        match &mut creature.kind {
            CreatureKind::FlyingMonster(data) => {
                // Immune to impact stun; always retreats after a hit.
                stun_until = None;
                data.run_away = true;
            }
            CreatureKind::WalkingMonster(_) => {
                recoil_frame = Some(
                    stun_until.unwrap_or(gvt + self.config.tunables.walking_monster_damage_delay),
                );
            }
            CreatureKind::Knight(_) => {}
        }

        if let Some(until) = stun_until {
            creature.core.stun_until(until);
        }
        creature.core.health -= amount;
        let dead = creature.core.health <= 0;
        let knight_player = creature.knight().map(|k| k.player_num);

        if let Some(until) = recoil_frame {
            self.set_anim_frame(id, AF_PARRY, Some(until), gvt);
        }
        if let Some(player_num) = knight_player {
            let health = self.creatures.get(id).map(|c| c.core.health).unwrap_or(0);
            self.views.player(player_num).push(ServerMessage::SetHealth {
                health: health.max(0) as i16,
            });
        }

        if dead {
            self.kill_creature(sched, id, originator);
        }
    }

    /// Removes a dead creature. Knights drop their held item, score a skull
    /// and get a respawn scheduled; the home manager may re-roll their home.
    pub fn kill_creature(&mut self, sched: &mut TaskScheduler, id: EntityId, originator: Originator) {
        let gvt = sched.gvt();
        let Some(creature) = self.creatures.get(id) else {
            return;
        };
        let pos = creature.core.pos;
        let facing = creature.core.facing;
        let held = creature.knight().and_then(|k| k.item_in_hand);
        let knight_player = creature.knight().map(|k| k.player_num);

        if let Some(itype) = held {
            let _ = self.drop_item(Item::new(itype), pos, true, facing, originator);
        }

        self.remove_creature_from_map(id);
        self.creatures.remove(id);

        if let Some(player_num) = knight_player {
            self.players[player_num].knight = None;
            self.players[player_num].skulls += 1;
            if let Originator::Player(attacker) = originator
                && attacker != player_num
            {
                self.players[attacker].kills += 1;
            }
            self.views.player(player_num).push(ServerMessage::AddSkull);
            self.homes
                .on_knight_death(player_num, &mut self.players, &self.rng);
            if !self.players[player_num].eliminated {
                sched.add_task(
                    Box::new(RespawnTask { player_num }),
                    TaskPriority::Normal,
                    gvt + self.config.tunables.respawn_delay_ms,
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Tiles with behaviour.
    // ------------------------------------------------------------------

    /// Opens or closes the door/chest on a square. Chests only react when
    /// activated from their front. Returns false when nothing happened.
    pub fn activate_tile(
        &mut self,
        mc: MapCoord,
        from: MapCoord,
        originator: Originator,
    ) -> bool {
        let Some((idx, side, is_open)) = self
            .map
            .get_tiles(mc)
            .iter()
            .enumerate()
            .find_map(|(i, t)| {
                if !t.is_activatable() {
                    return None;
                }
                let is_open = match &t.kind {
                    TileKind::Door(d) => d.open,
                    TileKind::Chest(c) => c.open,
                    _ => false,
                };
                Some((i, t.activation_side(), is_open))
            })
        else {
            return false;
        };
        if let Some(side) = side
            && mc.displace(side) != from
        {
            return false;
        }

        if is_open {
            // Closing a chest swallows the item lying on the square.
            let absorbed = self.remove_item(mc, originator);
            let mut notify = MapNotify {
                hub: &mut self.views,
                config: &*self.config,
            };
            let leftover = self
                .map
                .modify_tile(mc, idx, originator, &mut notify, |tile| {
                    tile.apply_close(absorbed)
                })
                .flatten();
            if let Some(item) = leftover {
                // Doors don't store items; put it back.
                self.place_item(mc, item, originator);
            }
        } else {
            let mut notify = MapNotify {
                hub: &mut self.views,
                config: &*self.config,
            };
            let released = self
                .map
                .modify_tile(mc, idx, originator, &mut notify, |tile| tile.apply_open())
                .flatten();
            if let Some(item) = released {
                self.place_item(mc, item, originator);
            }
        }
        true
    }

    /// Rolls the chest trap on generation; when it triggers, the configured
    /// trap action runs with the chest's position and facing as context.
    pub fn generate_chest_trap(&mut self, sched: &mut TaskScheduler, mc: MapCoord) -> bool {
        let Some((chance, trap, facing)) = self.map.get_tiles(mc).iter().find_map(|t| match &t.kind
        {
            TileKind::Chest(c) => Some((c.trap_chance, c.trap.clone(), c.facing)),
            _ => None,
        }) else {
            return false;
        };
        if !self.rng.get_bool(chance) {
            return false;
        }
        let victim_square = mc.displace(facing);
        let victim = self
            .map
            .get_entities(victim_square)
            .first()
            .copied();
        self.run_action(sched, &trap, victim_square, victim, Originator::None);
        true
    }

    /// Damages the topmost targettable tile on a square. Destroyed tiles run
    /// their hook, spill non-fragile stored items and vanish.
    pub fn damage_tile(
        &mut self,
        sched: &mut TaskScheduler,
        mc: MapCoord,
        amount: i32,
        actor: Option<EntityId>,
        originator: Originator,
    ) {
        let Some((idx, on_hit)) = self
            .map
            .get_tiles(mc)
            .iter()
            .enumerate()
            .rev()
            .find(|(_, t)| t.is_targettable() && t.reacts_to_hits())
            .map(|(i, t)| (i, t.on_hit.clone()))
        else {
            return;
        };

        self.run_action(sched, &on_hit, mc, actor, originator);

        let mut destroyed: Option<(TileTypeId, Action, Option<Item>)> = None;
        {
            let mut notify = MapNotify {
                hub: &mut self.views,
                config: &*self.config,
            };
            self.map
                .modify_tile(mc, idx, originator, &mut notify, |tile| {
                    if tile.destructible {
                        tile.hit_points -= amount;
                        if tile.hit_points <= 0 {
                            destroyed = Some((
                                tile.ttype,
                                tile.on_destroy.clone(),
                                tile.stored_item().cloned(),
                            ));
                        }
                    }
                });
        }

        if let Some((ttype, on_destroy, stored)) = destroyed {
            self.run_action(sched, &on_destroy, mc, actor, originator);
            self.rm_tile(mc, ttype, originator);
            if let Some(item) = stored
                && !self.config.item_type(item.itype).fragile
            {
                let _ = self.drop_item(item, mc, false, MapDirection::North, originator);
            }
        }
    }

    /// Executes a hook action. Unknown script fragments log and fall
    /// through.
    pub fn run_action(
        &mut self,
        sched: &mut TaskScheduler,
        action: &Action,
        mc: MapCoord,
        actor: Option<EntityId>,
        originator: Originator,
    ) {
        match action {
            Action::Nothing => {}
            Action::Damage { amount, stun_ms } => {
                if let Some(id) = actor {
                    let stun_until = (*stun_ms > 0).then(|| sched.gvt() + stun_ms);
                    self.damage_creature(sched, id, *amount, originator, stun_until);
                }
            }
            Action::AddItem { itype } => {
                let _ = self.drop_item(
                    Item::new(*itype),
                    mc,
                    true,
                    MapDirection::North,
                    originator,
                );
            }
            Action::OpenDoor | Action::CloseDoor => {
                // The activation toggle already has the open/close logic;
                // direction constraint does not apply to scripted changes.
                let want_open = matches!(action, Action::OpenDoor);
                let is_open = self.map.get_tiles(mc).iter().any(|t| match &t.kind {
                    TileKind::Door(d) => d.open,
                    TileKind::Chest(c) => c.open,
                    _ => false,
                });
                if want_open != is_open {
                    let front = self
                        .map
                        .get_tiles(mc)
                        .iter()
                        .find_map(|t| t.activation_side())
                        .map(|side| mc.displace(side))
                        .unwrap_or(mc);
                    self.activate_tile(mc, front, originator);
                }
            }
            Action::FlashMessage { key, num_times } => {
                if let Originator::Player(num) = originator {
                    self.views.player(num).push(ServerMessage::FlashMessage {
                        text: Paragraph::new(key.clone()),
                        num_times: *num_times,
                    });
                }
            }
            Action::TeleportToRandom => {
                if let Some(id) = actor {
                    let _ = crate::teleport::teleport_to_random_square(self, id, sched.gvt());
                }
            }
            Action::PlaceIcon {
                graphic,
                duration_ms,
            } => {
                self.views.broadcast_at(
                    mc,
                    ServerMessage::PlaceIcon {
                        x: mc.x,
                        y: mc.y,
                        graphic: *graphic,
                        duration_ms: *duration_ms,
                    },
                );
            }
            Action::Sequence(actions) => {
                for a in actions {
                    self.run_action(sched, a, mc, actor, originator);
                }
            }
            Action::ScriptFragment(fragment) => {
                tracing::debug!(fragment, "unhandled script fragment");
            }
        }
    }

    // ------------------------------------------------------------------
    // Homes.
    // ------------------------------------------------------------------

    /// Split-borrow wrapper around [`HomeManager::secure_home`].
    pub fn try_secure_home(&mut self, player_num: usize, loc: HomeLocation) -> SecureResult {
        let World {
            homes,
            players,
            map,
            views,
            config,
            rng,
            ..
        } = self;
        let config: &GameConfig = &**config;
        let mut notify = MapNotify { hub: views, config };
        homes.secure_home(player_num, loc, players, map, config, rng, &mut notify)
    }

    // ------------------------------------------------------------------
    // Rooms, mini-map and status.
    // ------------------------------------------------------------------

    /// Re-derives which room the player's knight is in; on a change, streams
    /// the new room's tiles, items and entities, and maps it on the
    /// mini-map. A set teleport flag suppresses the mini-map reveal once.
    pub fn update_player_room(&mut self, player_num: usize, gvt: i32) {
        let Some(kid) = self.players[player_num].knight else {
            return;
        };
        let Some(pos) = self.creatures.get(kid).map(|c| c.core.pos) else {
            return;
        };
        let (r1, _) = self.rooms.rooms_at(pos);
        let Some(room_id) = r1 else { return };
        if self.views.player_ref(player_num).current_room() == Some(room_id) {
            return;
        }
        let Some(rect) = self.rooms.room(room_id) else {
            return;
        };

        self.views.player(player_num).set_current_room(room_id, rect);

        // Dump the room contents square by square.
        for y in rect.top_left.y..rect.top_left.y + rect.h {
            for x in rect.top_left.x..rect.top_left.x + rect.w {
                let mc = MapCoord::new(x, y);
                let tiles: Vec<crate::tile::Tile> = self.map.get_tiles(mc).to_vec();
                self.views
                    .send_square_tiles(player_num, mc, &tiles, false);
                if let Some(item) = self.map.get_item(mc) {
                    let graphic = self.config.item_type(item.itype).dungeon_graphic;
                    self.views.send_square_item(player_num, mc, graphic, false);
                }
            }
        }

        // Entities, including our own knight (wire id 0 for ourselves).
        let in_room: Vec<EntityId> = self
            .creatures
            .iter()
            .filter(|(_, c)| c.core.on_map() && self.views.player_ref(player_num).sees(c.core.pos))
            .map(|(id, _)| id)
            .collect();
        for id in in_room {
            self.reveal_creature(id, gvt);
        }

        // Mini-map reveal, skipped once after a teleport.
        if self.players[player_num].teleport_flag {
            self.players[player_num].teleport_flag = false;
        } else {
            self.map_room_on_minimap(player_num, rect);
        }
        self.views.player(player_num).push(ServerMessage::MapKnightLocation {
            slot: player_num as u8,
            x: pos.x,
            y: pos.y,
        });
    }

    /// Colours a room's squares on the player's mini-map. Mapping runs in
    /// horizontal strips (y outer, x inner).
    fn map_room_on_minimap(&mut self, player_num: usize, rect: crate::room::Rect) {
        for y in rect.top_left.y..rect.top_left.y + rect.h {
            for x in rect.top_left.x..rect.top_left.x + rect.w {
                let mc = MapCoord::new(x, y);
                let colour = if self.map.get_access(mc, MapHeight::Walking) == MapAccess::Blocked {
                    knights_protocol::MiniMapColour::Wall
                } else {
                    knights_protocol::MiniMapColour::Floor
                };
                self.views.player(player_num).push(ServerMessage::MiniMapSetColour {
                    x: x as u16,
                    y: y as u16,
                    colour,
                });
            }
        }
    }

    /// Pushes the full backpack and health state of a player's knight.
    pub fn sync_status(&mut self, player_num: usize) {
        let Some(kid) = self.players[player_num].knight else {
            return;
        };
        let Some(creature) = self.creatures.get(kid) else {
            return;
        };
        let health = creature.core.health.max(0) as i16;
        let stacks: Vec<(u8, u16, u32, u32)> = creature
            .knight()
            .map(|k| {
                k.backpack
                    .iter()
                    .map(|stack| {
                        let itype = self.config.item_type(stack.itype);
                        (
                            itype.backpack_slot,
                            itype.backpack_graphic,
                            stack.count,
                            itype.max_carry,
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        let view = self.views.player(player_num);
        view.push(ServerMessage::SetHealth { health });
        for (slot, graphic, count, max) in stacks {
            view.push(ServerMessage::SetBackpack {
                slot,
                graphic,
                overdraw: 0,
                num_carried: count.min(u8::MAX as u32) as u8,
                num_max: max.min(u8::MAX as u32) as u8,
            });
        }
    }

    /// Checks every quest of a player; true when all are fulfilled.
    pub fn check_quests(&self, player_num: usize) -> bool {
        let Some(kid) = self.players[player_num].knight else {
            return false;
        };
        let Some(creature) = self.creatures.get(kid) else {
            return false;
        };
        let Some(kt) = creature.knight() else {
            return false;
        };
        self.players[player_num]
            .quests
            .iter()
            .all(|q| q.check(kt, &creature.core, &self.map))
    }
}

/// Settles a motion at its arrival time: transfers occupancy for full moves
/// and fires approach/withdraw hooks. Runs at Normal priority so monster AI
/// (Low) sees the settled state.
struct ArrivalTask {
    id: EntityId,
    expected_arrival: i32,
}

impl Task for ArrivalTask {
    fn execute(self: Box<Self>, world: &mut World, sched: &mut TaskScheduler) {
        let gvt = sched.gvt();
        let Some(creature) = world.creatures.get(self.id) else {
            return; // creature died mid-move
        };
        let Motion::Moving {
            kind, arrival_time, ..
        } = creature.core.motion
        else {
            return;
        };
        if arrival_time != self.expected_arrival {
            return; // superseded by a newer motion
        }

        let old_pos = creature.core.pos;
        let facing = creature.core.facing;
        let approach_offset = world.config.tunables.approach_offset;
        let knight_player = creature.knight().map(|k| k.player_num);

        match kind {
            MotionType::Move => {
                let new_pos = old_pos.displace(facing);
                let creature = world.creatures.get_mut(self.id).expect("checked");
                creature.core.motion = Motion::STILL;
                creature.core.pos = new_pos;
                world.map.rm_entity(old_pos, self.id);
                world.map.add_entity(new_pos, self.id);
                if let Some(player_num) = knight_player {
                    world.update_player_room(player_num, gvt);
                    world.views.player(player_num).push(ServerMessage::MapKnightLocation {
                        slot: player_num as u8,
                        x: new_pos.x,
                        y: new_pos.y,
                    });
                }
                // Entities entering another player's room become visible.
                world.reveal_creature(self.id, gvt);
            }
            MotionType::Approach => {
                let creature = world.creatures.get_mut(self.id).expect("checked");
                creature.core.motion = Motion::NotMoving {
                    offset: approach_offset,
                };
                world.on_approach_complete(sched, self.id, old_pos, facing);
            }
            MotionType::Withdraw => {
                let creature = world.creatures.get_mut(self.id).expect("checked");
                creature.core.motion = Motion::STILL;
                world.on_withdraw_complete(sched, self.id, old_pos, facing);
            }
        }
    }
}

impl World {
    /// Fired when an approach half-move completes: tile hooks, home healing,
    /// home securing, quest checks.
    fn on_approach_complete(
        &mut self,
        sched: &mut TaskScheduler,
        id: EntityId,
        pos: MapCoord,
        facing: MapDirection,
    ) {
        let ahead = pos.displace(facing);
        let knight_player = self
            .creatures
            .get(id)
            .and_then(|c| c.knight())
            .map(|k| k.player_num);
        let originator = knight_player
            .map(Originator::Player)
            .unwrap_or(Originator::Monster);

        let hooks: Vec<Action> = self
            .map
            .get_tiles(ahead)
            .iter()
            .map(|t| t.on_approach.clone())
            .collect();
        for action in hooks {
            self.run_action(sched, &action, ahead, Some(id), originator);
        }

        let Some(player_num) = knight_player else {
            return;
        };
        let is_home = self
            .map
            .get_tiles(ahead)
            .iter()
            .any(|t| matches!(t.kind, TileKind::Home(_)));
        if !is_home {
            return;
        }

        let here = HomeLocation { mc: pos, facing };
        // Identity of a home ignores facing, but "standing at my own home"
        // requires facing into it too.
        let own_home = self.players[player_num]
            .home
            .is_some_and(|h| h.mc == pos && h.facing == facing);
        if own_home {
            // Start the recurring healing tick and see if the quest is done.
            sched.add_task(
                Box::new(HomeHealTask { id }),
                TaskPriority::Normal,
                sched.gvt() + self.config.tunables.home_heal_interval_ms,
            );
            if self.check_quests(player_num) {
                self.winner = Some(player_num);
            } else {
                let hints: Vec<String> = self.players[player_num]
                    .quests
                    .iter()
                    .map(|q| q.hint())
                    .collect();
                for hint in hints {
                    self.views.player(player_num).push(ServerMessage::FlashMessage {
                        text: Paragraph::new(hint),
                        num_times: 4,
                    });
                }
            }
        } else if self.homes.is_securable_home(player_num, here) {
            if self.try_secure_home(player_num, here) == SecureResult::Succeeded {
                self.views.player(player_num).push(ServerMessage::FlashMessage {
                    text: Paragraph::new("home_secured"),
                    num_times: 2,
                });
            }
        }
    }

    /// Fired when a withdraw completes: tile hooks plus the end of any home
    /// healing.
    fn on_withdraw_complete(
        &mut self,
        sched: &mut TaskScheduler,
        id: EntityId,
        pos: MapCoord,
        facing: MapDirection,
    ) {
        let ahead = pos.displace(facing);
        let knight_player = self
            .creatures
            .get(id)
            .and_then(|c| c.knight())
            .map(|k| k.player_num);
        let originator = knight_player
            .map(Originator::Player)
            .unwrap_or(Originator::Monster);

        let hooks: Vec<Action> = self
            .map
            .get_tiles(ahead)
            .iter()
            .map(|t| t.on_withdraw.clone())
            .collect();
        for action in hooks {
            self.run_action(sched, &action, ahead, Some(id), originator);
        }

        // Leaving a home tile also stops the continuous messages.
        if let Some(player_num) = knight_player
            && self
                .map
                .get_tiles(ahead)
                .iter()
                .any(|t| matches!(t.kind, TileKind::Home(_)))
        {
            self.views
                .player(player_num)
                .push(ServerMessage::CancelContinuousMessages);
        }
    }
}

/// The recurring home-healing tick. Stops silently once the knight moves,
/// dies or is back at full health.
struct HomeHealTask {
    id: EntityId,
}

impl Task for HomeHealTask {
    fn execute(self: Box<Self>, world: &mut World, sched: &mut TaskScheduler) {
        let Some(creature) = world.creatures.get(self.id) else {
            return;
        };
        let Some(kt) = creature.knight() else { return };
        let player_num = kt.player_num;
        let at_home = world.players[player_num].home.is_some_and(|h| {
            h.mc == creature.core.pos && h.facing == creature.core.facing
        }) && creature.core.is_approached();
        if !at_home {
            return;
        }
        if creature.core.health >= creature.core.max_health {
            return;
        }

        let heal = world.config.tunables.home_heal_amount;
        let creature = world.creatures.get_mut(self.id).expect("checked");
        creature.core.health = (creature.core.health + heal).min(creature.core.max_health);
        let health = creature.core.health.max(0) as i16;
        world
            .views
            .player(player_num)
            .push(ServerMessage::SetHealth { health });

        let next = sched.gvt() + world.config.tunables.home_heal_interval_ms;
        sched.add_task(self, TaskPriority::Normal, next);
    }
}

/// Respawns a player's knight at their home after the configured delay.
struct RespawnTask {
    player_num: usize,
}

impl Task for RespawnTask {
    fn execute(self: Box<Self>, world: &mut World, sched: &mut TaskScheduler) {
        let player = &world.players[self.player_num];
        if player.knight.is_some() || player.eliminated {
            return;
        }
        if player.home.is_none() {
            // No home left to respawn at: the player is out of the game.
            world.players[self.player_num].eliminated = true;
            return;
        }
        world.spawn_knight(sched, self.player_num);
    }
}
