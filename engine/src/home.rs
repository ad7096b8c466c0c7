//! The registry of knight homes and the securing rules.
//!
//! A home is identified by its entry square (the square the knight stands on)
//! plus the direction into the home tile itself. Securing a home against the
//! other team walls it off; if every team has secured it, it stops being a
//! home at all and becomes plain wall.

use crate::config::GameConfig;
use crate::dungeon::{DungeonMap, MapChangeListener, Originator};
use crate::geometry::{MapCoord, MapDirection};
use crate::player::{Player, RespawnType};
use crate::rng::GameRng;
use crate::tile::TileKind;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// A home's entry square plus the facing into the home tile. Homes are
/// unique per coordinate, so identity and ordering ignore the facing.
#[derive(Copy, Clone, Debug)]
pub struct HomeLocation {
    pub mc: MapCoord,
    pub facing: MapDirection,
}

impl HomeLocation {
    /// The square the home tile itself occupies.
    pub fn tile_square(&self) -> MapCoord {
        self.mc.displace(self.facing)
    }
}

impl PartialEq for HomeLocation {
    fn eq(&self, other: &Self) -> bool {
        self.mc == other.mc
    }
}

impl Eq for HomeLocation {}

impl PartialOrd for HomeLocation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HomeLocation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.mc.cmp(&other.mc)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SecureResult {
    Succeeded,
    FailedNotAHome,
    FailedSpecialExit,
    FailedAlreadySecure,
}

/// The home registry. A value of `None` means unsecured, `Some(player)` means
/// secured by that player; a home secured by both teams is *absent* (it has
/// been replaced by a wall).
#[derive(Default)]
pub struct HomeManager {
    homes: BTreeMap<HomeLocation, Option<usize>>,
    special_exits: BTreeSet<HomeLocation>,
    initial_home_count: usize,
}

impl HomeManager {
    pub fn add_home(&mut self, loc: HomeLocation, is_special_exit: bool) {
        debug_assert!(!loc.mc.is_null());
        if is_special_exit {
            self.special_exits.insert(loc);
        } else {
            self.homes.insert(loc, None);
            self.initial_home_count += 1;
        }
    }

    /// True iff `loc` is a home and is not already secured by this player.
    pub fn is_securable_home(&self, player_num: usize, loc: HomeLocation) -> bool {
        match self.homes.get(&loc) {
            None => false,
            Some(owner) => *owner != Some(player_num),
        }
    }

    pub fn owner_of(&self, loc: HomeLocation) -> Option<Option<usize>> {
        self.homes.get(&loc).copied()
    }

    /// Homes that have been secured by both teams (and walled off).
    pub fn num_secured_by_two_teams(&self) -> usize {
        self.initial_home_count - self.homes.len()
    }

    /// Secures a home for a player. On a both-teams double-secure the home
    /// tile is physically replaced with a clone of the configured wall tile.
    /// Afterwards every player whose own home is gone or enemy-held gets a
    /// fresh one.
    #[allow(clippy::too_many_arguments)]
    pub fn secure_home(
        &mut self,
        player_num: usize,
        loc: HomeLocation,
        players: &mut [Player],
        map: &mut DungeonMap,
        config: &GameConfig,
        rng: &GameRng,
        listener: &mut dyn MapChangeListener,
    ) -> SecureResult {
        let Some(&owner) = self.homes.get(&loc) else {
            if self.special_exits.contains(&loc) {
                return SecureResult::FailedSpecialExit;
            }
            return SecureResult::FailedNotAHome;
        };

        let my_team = players[player_num].team;
        if owner == Some(player_num) {
            return SecureResult::FailedAlreadySecure;
        }
        // Don't secure homes twice by different members of the same team.
        if let Some(other) = owner
            && players[other].team == my_team
        {
            return SecureResult::FailedAlreadySecure;
        }

        // Find the home tile itself, sitting one square into the wall.
        let home_mc = loc.tile_square();
        let home_tile_idx = map
            .get_tiles(home_mc)
            .iter()
            .position(|t| matches!(t.kind, TileKind::Home(_)));

        match owner {
            None => {
                // First secure: record it and repaint the tile.
                *self.homes.get_mut(&loc).expect("home vanished") = Some(player_num);
                if let Some(idx) = home_tile_idx {
                    let cc = players[player_num].secured_cc;
                    map.modify_tile(home_mc, idx, Originator::None, listener, |tile| {
                        tile.colour_change = cc;
                    });
                }
            }
            Some(_) => {
                // Secured by the other team already: both teams have now
                // claimed it, so it stops being a home.
                self.homes.remove(&loc);
                if let Some(idx) = home_tile_idx {
                    let ttype = map.get_tiles(home_mc)[idx].ttype;
                    map.rm_tile(home_mc, ttype, Originator::None, listener);
                    map.add_tile(
                        home_mc,
                        config.tile(config.wall_tile).clone(),
                        Originator::None,
                        listener,
                    );
                }
            }
        }

        // Reassign homes for anyone whose own home just stopped being theirs.
        for num in 0..players.len() {
            let Some(home) = players[num].home else {
                continue;
            };
            let my_home_secured = match self.homes.get(&home) {
                None => true, // secured by two teams
                Some(None) => false,
                Some(Some(owner)) => players[*owner].team != players[num].team,
            };
            if my_home_secured {
                let new_home = self.random_home_for(&players[num], players, rng);
                players[num].home = new_home;
            }
        }

        SecureResult::Succeeded
    }

    /// A uniformly random home that is unsecured or held by the player's own
    /// team. `None` when no such home remains.
    pub fn random_home_for(
        &self,
        player: &Player,
        players: &[Player],
        rng: &GameRng,
    ) -> Option<HomeLocation> {
        let candidates: Vec<HomeLocation> = self
            .homes
            .iter()
            .filter(|(_, owner)| match owner {
                None => true,
                Some(other) => players[*other].team == player.team,
            })
            .map(|(loc, _)| *loc)
            .collect();
        if candidates.is_empty() {
            None
        } else {
            Some(candidates[rng.get_int(0, candidates.len() as i32) as usize])
        }
    }

    /// Death hook: players configured to respawn somewhere fresh get their
    /// home re-rolled.
    pub fn on_knight_death(&self, player_num: usize, players: &mut [Player], rng: &GameRng) {
        if players[player_num].respawn_type == RespawnType::DifferentEveryTime {
            let new_home = self.random_home_for(&players[player_num], players, rng);
            players[player_num].home = new_home;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::MapDirection;
    use knights_protocol::PlayerId;

    fn loc(x: i16, y: i16) -> HomeLocation {
        HomeLocation {
            mc: MapCoord::new(x, y),
            facing: MapDirection::North,
        }
    }

    fn players() -> Vec<Player> {
        // Two teams of two.
        (0..4)
            .map(|n| Player::new(n, PlayerId::new(format!("p{n}")), (n % 2) as u8))
            .collect()
    }

    fn manager_with_homes(locs: &[HomeLocation]) -> HomeManager {
        let mut hm = HomeManager::default();
        for l in locs {
            hm.add_home(*l, false);
        }
        hm
    }

    fn world_bits() -> (DungeonMap, GameConfig, GameRng) {
        (
            DungeonMap::new(10, 10),
            GameConfig::sample(),
            GameRng::from_seed_bytes(b"homes"),
        )
    }

    #[test]
    fn securable_only_when_not_already_ours() {
        let hm = manager_with_homes(&[loc(1, 1)]);
        assert!(hm.is_securable_home(0, loc(1, 1)));
        assert!(!hm.is_securable_home(0, loc(5, 5)));
    }

    #[test]
    fn securing_twice_fails() {
        let mut hm = manager_with_homes(&[loc(1, 1), loc(3, 3)]);
        let mut pls = players();
        let (mut map, cfg, rng) = world_bits();

        let r = hm.secure_home(0, loc(1, 1), &mut pls, &mut map, &cfg, &rng, &mut ());
        assert_eq!(r, SecureResult::Succeeded);
        assert!(!hm.is_securable_home(0, loc(1, 1)));
        let r = hm.secure_home(0, loc(1, 1), &mut pls, &mut map, &cfg, &rng, &mut ());
        assert_eq!(r, SecureResult::FailedAlreadySecure);
        // A team-mate cannot re-secure it either.
        let r = hm.secure_home(2, loc(1, 1), &mut pls, &mut map, &cfg, &rng, &mut ());
        assert_eq!(r, SecureResult::FailedAlreadySecure);
    }

    #[test]
    fn double_secure_walls_the_home_and_rehomes_players() {
        let homes = [loc(1, 1), loc(3, 3), loc(5, 5), loc(7, 7)];
        let mut hm = manager_with_homes(&homes);
        let mut pls = players();
        let (mut map, cfg, rng) = world_bits();

        // Place the physical home tile for H1.
        let home_tile = cfg.tiles[4].clone();
        map.add_tile(loc(1, 1).tile_square(), home_tile, Originator::None, &mut ());
        for p in pls.iter_mut() {
            p.home = Some(loc(1, 1));
        }

        // Team-A player secures H1, then team-B player secures it again.
        assert_eq!(
            hm.secure_home(0, loc(1, 1), &mut pls, &mut map, &cfg, &rng, &mut ()),
            SecureResult::Succeeded
        );
        assert_eq!(
            hm.secure_home(1, loc(1, 1), &mut pls, &mut map, &cfg, &rng, &mut ()),
            SecureResult::Succeeded
        );

        // The home entry is gone from the registry...
        assert_eq!(hm.owner_of(loc(1, 1)), None);
        assert_eq!(hm.num_secured_by_two_teams(), 1);
        // ...the tile has physically become a wall...
        let tiles = map.get_tiles(loc(1, 1).tile_square());
        assert!(tiles.iter().any(|t| t.ttype == cfg.wall_tile));
        assert!(!tiles.iter().any(|t| matches!(t.kind, TileKind::Home(_))));
        // ...and everyone has been moved off the dead home.
        for p in &pls {
            assert_ne!(p.home, Some(loc(1, 1)));
            assert!(p.home.is_some());
        }
    }

    #[test]
    fn enemy_secured_homes_trigger_rehoming_too() {
        let mut hm = manager_with_homes(&[loc(1, 1), loc(3, 3)]);
        let mut pls = players();
        let (mut map, cfg, rng) = world_bits();
        pls[1].home = Some(loc(1, 1)); // team B player lives at H1

        // Team A secures H1: player 1's home is now enemy-held.
        assert_eq!(
            hm.secure_home(0, loc(1, 1), &mut pls, &mut map, &cfg, &rng, &mut ()),
            SecureResult::Succeeded
        );
        assert_eq!(pls[1].home, Some(loc(3, 3)));
    }

    #[test]
    fn special_exits_cannot_be_secured() {
        let mut hm = HomeManager::default();
        hm.add_home(loc(2, 2), true);
        let mut pls = players();
        let (mut map, cfg, rng) = world_bits();
        assert_eq!(
            hm.secure_home(0, loc(2, 2), &mut pls, &mut map, &cfg, &rng, &mut ()),
            SecureResult::FailedSpecialExit
        );
        assert_eq!(
            hm.secure_home(0, loc(9, 9), &mut pls, &mut map, &cfg, &rng, &mut ()),
            SecureResult::FailedNotAHome
        );
    }

    #[test]
    fn random_home_excludes_enemy_held_ones() {
        let mut hm = manager_with_homes(&[loc(1, 1), loc(3, 3)]);
        let mut pls = players();
        let (mut map, cfg, rng) = world_bits();
        // Team B (player 1) secures H1.
        hm.secure_home(1, loc(1, 1), &mut pls, &mut map, &cfg, &rng, &mut ());

        // Team A players can only ever draw H2.
        for _ in 0..20 {
            assert_eq!(hm.random_home_for(&pls[0], &pls, &rng), Some(loc(3, 3)));
        }
        // Team B players may draw either.
        let draw = hm.random_home_for(&pls[1], &pls, &rng);
        assert!(draw == Some(loc(1, 1)) || draw == Some(loc(3, 3)));
    }

    #[test]
    fn death_rerolls_home_only_for_different_every_time() {
        let hm = manager_with_homes(&[loc(1, 1), loc(3, 3)]);
        let mut pls = players();
        let rng = GameRng::from_seed_bytes(b"death");

        pls[0].home = Some(loc(1, 1));
        hm.on_knight_death(0, &mut pls, &rng);
        assert_eq!(pls[0].home, Some(loc(1, 1)));

        pls[0].respawn_type = RespawnType::DifferentEveryTime;
        hm.on_knight_death(0, &mut pls, &rng);
        assert!(pls[0].home.is_some());
    }
}
