//! The dungeon map: a 2-D grid of squares with stacked tiles, at most one
//! loose item per square, and the entities standing on it.
//!
//! Mutations are tagged with an [`Originator`] and reported to a
//! [`MapChangeListener`] so the per-player view streams can mirror them. The
//! map itself knows nothing about views or networking.

use crate::config::GameConfig;
use crate::creature::EntityId;
use crate::geometry::{MapAccess, MapCoord, MapDirection, MapHeight};
use crate::item::Item;
use crate::tile::{ItemsPolicy, Tile};

/// Who caused a state change. Forwarded to view updates so clients can
/// attribute sounds and messages.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Originator {
    None,
    Player(usize),
    Monster,
}

/// Receives map change notifications. The engine's view hub implements this;
/// tests mostly use `()`.
pub trait MapChangeListener {
    fn tiles_changed(&mut self, mc: MapCoord, tiles: &[Tile], originator: Originator);
    fn item_changed(&mut self, mc: MapCoord, item: Option<&Item>, originator: Originator);
}

/// The no-op listener.
impl MapChangeListener for () {
    fn tiles_changed(&mut self, _: MapCoord, _: &[Tile], _: Originator) {}
    fn item_changed(&mut self, _: MapCoord, _: Option<&Item>, _: Originator) {}
}

/// What happened to a dropped item.
#[derive(Debug, PartialEq, Eq)]
pub enum DropResult {
    Dropped(MapCoord),
    /// The item was fragile and had nowhere to go.
    Shattered,
    /// No space; the item is handed back.
    Failed(Item),
}

#[derive(Default)]
struct Square {
    /// Sorted by ascending depth; the last blocking tile wins disputes.
    tiles: Vec<Tile>,
    item: Option<Item>,
    entities: Vec<EntityId>,
    access: [MapAccess; MapHeight::COUNT],
}

impl Square {
    fn recompute_access(&mut self) {
        for h in MapHeight::ALL {
            self.access[h as usize] = self
                .tiles
                .iter()
                .map(|t| t.get_access(h))
                .min()
                .unwrap_or(MapAccess::Clear);
        }
    }

    fn items_policy(&self) -> ItemsPolicy {
        self.tiles
            .iter()
            .rev()
            .find(|t| t.is_blocking())
            .map(|t| t.items)
            .unwrap_or(ItemsPolicy::Allowed)
    }
}

pub struct DungeonMap {
    width: i16,
    height: i16,
    squares: Vec<Square>,
}

impl DungeonMap {
    pub fn new(width: i16, height: i16) -> Self {
        assert!(width > 0 && height > 0, "dungeon must not be empty");
        let mut squares = Vec::with_capacity(width as usize * height as usize);
        for _ in 0..(width as usize * height as usize) {
            let mut sq = Square::default();
            sq.recompute_access();
            squares.push(sq);
        }
        DungeonMap {
            width,
            height,
            squares,
        }
    }

    pub fn width(&self) -> i16 {
        self.width
    }

    pub fn height(&self) -> i16 {
        self.height
    }

    pub fn in_range(&self, mc: MapCoord) -> bool {
        !mc.is_null() && mc.x >= 0 && mc.x < self.width && mc.y >= 0 && mc.y < self.height
    }

    fn index(&self, mc: MapCoord) -> Option<usize> {
        if self.in_range(mc) {
            Some(mc.y as usize * self.width as usize + mc.x as usize)
        } else {
            None
        }
    }

    /// Inserts a tile, keeping the stack depth-sorted. Out-of-range
    /// coordinates are ignored.
    pub fn add_tile(
        &mut self,
        mc: MapCoord,
        tile: Tile,
        originator: Originator,
        listener: &mut dyn MapChangeListener,
    ) {
        let Some(idx) = self.index(mc) else { return };
        let sq = &mut self.squares[idx];
        let at = sq.tiles.partition_point(|t| t.depth <= tile.depth);
        sq.tiles.insert(at, tile);
        sq.recompute_access();
        listener.tiles_changed(mc, &sq.tiles, originator);
    }

    /// Removes the tile cloned from the given type, if present. Returns it.
    pub fn rm_tile(
        &mut self,
        mc: MapCoord,
        ttype: crate::tile::TileTypeId,
        originator: Originator,
        listener: &mut dyn MapChangeListener,
    ) -> Option<Tile> {
        let idx = self.index(mc)?;
        let sq = &mut self.squares[idx];
        let at = sq.tiles.iter().position(|t| t.ttype == ttype)?;
        let tile = sq.tiles.remove(at);
        sq.recompute_access();
        listener.tiles_changed(mc, &sq.tiles, originator);
        Some(tile)
    }

    pub fn clear_tiles(
        &mut self,
        mc: MapCoord,
        originator: Originator,
        listener: &mut dyn MapChangeListener,
    ) {
        let Some(idx) = self.index(mc) else { return };
        let sq = &mut self.squares[idx];
        sq.tiles.clear();
        sq.recompute_access();
        listener.tiles_changed(mc, &sq.tiles, originator);
    }

    pub fn get_tiles(&self, mc: MapCoord) -> &[Tile] {
        self.index(mc)
            .map(|i| self.squares[i].tiles.as_slice())
            .unwrap_or(&[])
    }

    /// Mutates the tile at `tile_index` in the square's stack, then
    /// recomputes the access cache and notifies. Used for door/chest state
    /// changes.
    pub fn modify_tile<R>(
        &mut self,
        mc: MapCoord,
        tile_index: usize,
        originator: Originator,
        listener: &mut dyn MapChangeListener,
        f: impl FnOnce(&mut Tile) -> R,
    ) -> Option<R> {
        let idx = self.index(mc)?;
        let sq = &mut self.squares[idx];
        let tile = sq.tiles.get_mut(tile_index)?;
        let result = f(tile);
        sq.recompute_access();
        listener.tiles_changed(mc, &sq.tiles, originator);
        Some(result)
    }

    /// Places an item directly, replacing any existing one. Use
    /// [`DungeonMap::drop_item`] for gameplay drops.
    pub fn add_item(
        &mut self,
        mc: MapCoord,
        item: Item,
        originator: Originator,
        listener: &mut dyn MapChangeListener,
    ) {
        let Some(idx) = self.index(mc) else { return };
        self.squares[idx].item = Some(item);
        listener.item_changed(mc, self.squares[idx].item.as_ref(), originator);
    }

    pub fn rm_item(
        &mut self,
        mc: MapCoord,
        originator: Originator,
        listener: &mut dyn MapChangeListener,
    ) -> Option<Item> {
        let idx = self.index(mc)?;
        let item = self.squares[idx].item.take();
        if item.is_some() {
            listener.item_changed(mc, None, originator);
        }
        item
    }

    pub fn get_item(&self, mc: MapCoord) -> Option<&Item> {
        self.index(mc).and_then(|i| self.squares[i].item.as_ref())
    }

    /// Whether loose items may lie on this square right now.
    pub fn items_allowed(&self, mc: MapCoord) -> ItemsPolicy {
        self.index(mc)
            .map(|i| self.squares[i].items_policy())
            .unwrap_or(ItemsPolicy::Blocked)
    }

    /// Tries to put an item down at `mc`, merging onto a same-type stack if
    /// there is room. With `allow_nonlocal`, rings of squares around `mc` are
    /// tried outwards (nearest the preferred direction first) up to radius 3.
    /// Fragile items that find no home shatter.
    pub fn drop_item(
        &mut self,
        config: &GameConfig,
        item: Item,
        mc: MapCoord,
        allow_nonlocal: bool,
        prefer_dir: MapDirection,
        originator: Originator,
        listener: &mut dyn MapChangeListener,
    ) -> DropResult {
        let radius = if allow_nonlocal { 3 } else { 0 };
        for ring in 0..=radius {
            for candidate in ring_squares(mc, ring, prefer_dir) {
                if self.try_place(config, &item, candidate, originator, listener) {
                    return DropResult::Dropped(candidate);
                }
            }
        }
        if config.item_type(item.itype).fragile {
            DropResult::Shattered
        } else {
            DropResult::Failed(item)
        }
    }

    fn try_place(
        &mut self,
        config: &GameConfig,
        item: &Item,
        mc: MapCoord,
        originator: Originator,
        listener: &mut dyn MapChangeListener,
    ) -> bool {
        let Some(idx) = self.index(mc) else {
            return false;
        };
        match self.squares[idx].items_policy() {
            ItemsPolicy::Allowed => {}
            ItemsPolicy::Blocked | ItemsPolicy::Destroyed => return false,
        }
        let sq = &mut self.squares[idx];
        match &mut sq.item {
            None => {
                sq.item = Some(item.clone());
            }
            Some(existing) if existing.itype == item.itype => {
                let max_stack = config.item_type(item.itype).max_stack;
                if existing.count + item.count > max_stack {
                    return false;
                }
                existing.count += item.count;
            }
            Some(_) => return false,
        }
        listener.item_changed(mc, sq.item.as_ref(), originator);
        true
    }

    pub fn add_entity(&mut self, mc: MapCoord, id: EntityId) {
        if let Some(idx) = self.index(mc) {
            self.squares[idx].entities.push(id);
        }
    }

    pub fn rm_entity(&mut self, mc: MapCoord, id: EntityId) {
        if let Some(idx) = self.index(mc) {
            self.squares[idx].entities.retain(|e| *e != id);
        }
    }

    pub fn get_entities(&self, mc: MapCoord) -> &[EntityId] {
        self.index(mc)
            .map(|i| self.squares[i].entities.as_slice())
            .unwrap_or(&[])
    }

    /// The cached access value for a height. Outside the grid everything is
    /// blocked.
    pub fn get_access(&self, mc: MapCoord, height: MapHeight) -> MapAccess {
        self.index(mc)
            .map(|i| self.squares[i].access[height as usize])
            .unwrap_or(MapAccess::Blocked)
    }
}

/// The squares of the ring at `ring` distance (Chebyshev) around `mc`,
/// ordered so the square towards `prefer_dir` comes first. Ring 0 is `mc`
/// itself.
fn ring_squares(mc: MapCoord, ring: i16, prefer_dir: MapDirection) -> Vec<MapCoord> {
    if ring == 0 {
        return vec![mc];
    }
    let mut out = Vec::new();
    for dx in -ring..=ring {
        for dy in -ring..=ring {
            if dx.abs().max(dy.abs()) == ring {
                out.push(MapCoord::new(mc.x + dx, mc.y + dy));
            }
        }
    }
    let anchor = {
        let mut a = mc;
        for _ in 0..ring {
            a = a.displace(prefer_dir);
        }
        a
    };
    out.sort_by_key(|c| (c.manhattan(&anchor), c.y, c.x));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GameConfig, Tunables};
    use crate::item::{ItemType, ItemTypeId};
    use crate::tile::TileTypeId;

    fn test_config() -> GameConfig {
        let mut gem = ItemType::simple("gem", 30);
        gem.max_stack = 3;
        let mut vial = ItemType::simple("vial", 11);
        vial.fragile = true;
        GameConfig {
            tunables: Tunables::default(),
            graphics: vec!["none".into(), "floor".into(), "wall".into()],
            tiles: vec![Tile::floor(TileTypeId(0), 1), Tile::wall(TileTypeId(1), 2)],
            items: vec![gem, vial],
            monsters: vec![],
            wall_tile: TileTypeId(1),
            knight_health: 12,
            knight_anim: 0,
        }
    }

    fn floor() -> Tile {
        Tile::floor(TileTypeId(0), 1)
    }

    fn wall() -> Tile {
        Tile::wall(TileTypeId(1), 2)
    }

    #[test]
    fn access_is_min_over_tiles() {
        let mut map = DungeonMap::new(4, 4);
        let mc = MapCoord::new(1, 1);
        map.add_tile(mc, floor(), Originator::None, &mut ());
        assert_eq!(map.get_access(mc, MapHeight::Walking), MapAccess::Clear);

        map.add_tile(mc, wall(), Originator::None, &mut ());
        for h in MapHeight::ALL {
            assert_eq!(map.get_access(mc, h), MapAccess::Blocked);
        }

        map.rm_tile(mc, TileTypeId(1), Originator::None, &mut ());
        assert_eq!(map.get_access(mc, MapHeight::Walking), MapAccess::Clear);
    }

    #[test]
    fn items_allowed_follows_top_blocking_tile() {
        let mut map = DungeonMap::new(4, 4);
        let mc = MapCoord::new(2, 2);
        map.add_tile(mc, floor(), Originator::None, &mut ());
        assert_eq!(map.items_allowed(mc), ItemsPolicy::Allowed);
        map.add_tile(mc, wall(), Originator::None, &mut ());
        assert_eq!(map.items_allowed(mc), ItemsPolicy::Blocked);
    }

    #[test]
    fn out_of_range_mutations_are_noops() {
        let mut map = DungeonMap::new(4, 4);
        let oob = MapCoord::new(-1, 2);
        map.add_tile(oob, floor(), Originator::None, &mut ());
        assert!(map.get_tiles(oob).is_empty());
        assert_eq!(map.get_access(oob, MapHeight::Walking), MapAccess::Blocked);
        map.add_item(oob, Item::new(ItemTypeId(0)), Originator::None, &mut ());
        assert!(map.get_item(oob).is_none());
        assert_eq!(
            map.get_access(MapCoord::null(), MapHeight::Flying),
            MapAccess::Blocked
        );
    }

    #[test]
    fn drop_merges_stacks_up_to_the_limit() {
        let cfg = test_config();
        let mut map = DungeonMap::new(4, 4);
        let mc = MapCoord::new(1, 1);
        map.add_tile(mc, floor(), Originator::None, &mut ());

        let gem = ItemTypeId(0);
        assert_eq!(
            map.drop_item(&cfg, Item::new(gem), mc, false, MapDirection::North, Originator::None, &mut ()),
            DropResult::Dropped(mc)
        );
        assert_eq!(
            map.drop_item(&cfg, Item::with_count(gem, 2), mc, false, MapDirection::North, Originator::None, &mut ()),
            DropResult::Dropped(mc)
        );
        assert_eq!(map.get_item(mc).unwrap().count, 3);
        // Stack is full now; a local-only drop fails and hands the item back.
        assert_eq!(
            map.drop_item(&cfg, Item::new(gem), mc, false, MapDirection::North, Originator::None, &mut ()),
            DropResult::Failed(Item::new(gem))
        );
    }

    #[test]
    fn nonlocal_drop_spirals_outwards() {
        let cfg = test_config();
        let mut map = DungeonMap::new(5, 5);
        for x in 0..5 {
            for y in 0..5 {
                map.add_tile(MapCoord::new(x, y), floor(), Originator::None, &mut ());
            }
        }
        let mc = MapCoord::new(2, 2);
        map.add_item(mc, Item::new(ItemTypeId(1)), Originator::None, &mut ());

        let result = map.drop_item(
            &cfg,
            Item::new(ItemTypeId(0)),
            mc,
            true,
            MapDirection::East,
            Originator::None,
            &mut (),
        );
        // Occupied centre, so the drop lands on the adjacent ring, preferring
        // the eastern side.
        assert_eq!(result, DropResult::Dropped(MapCoord::new(3, 2)));
    }

    #[test]
    fn fragile_items_shatter_when_there_is_no_room() {
        let cfg = test_config();
        let mut map = DungeonMap::new(3, 3);
        // All walls: nothing can be dropped anywhere.
        for x in 0..3 {
            for y in 0..3 {
                map.add_tile(MapCoord::new(x, y), wall(), Originator::None, &mut ());
            }
        }
        let result = map.drop_item(
            &cfg,
            Item::new(ItemTypeId(1)),
            MapCoord::new(1, 1),
            true,
            MapDirection::North,
            Originator::None,
            &mut (),
        );
        assert_eq!(result, DropResult::Shattered);
    }

    #[test]
    fn entities_are_tracked_per_square() {
        let mut map = DungeonMap::new(3, 3);
        let mc = MapCoord::new(0, 0);
        map.add_entity(mc, EntityId(4));
        map.add_entity(mc, EntityId(9));
        assert_eq!(map.get_entities(mc), &[EntityId(4), EntityId(9)]);
        map.rm_entity(mc, EntityId(4));
        assert_eq!(map.get_entities(mc), &[EntityId(9)]);
    }
}
