//! Rectangular rooms over the dungeon grid.
//!
//! Rooms share one-square borders, so a square can belong to up to two rooms;
//! the four corner squares of a room belong to none (this stops diagonal
//! "sight" through corners). Room ids are wire-visible, so the list is
//! shuffled once after construction to keep them from leaking the generation
//! order.

use crate::geometry::MapCoord;
use crate::rng::GameRng;

/// Index into the room list.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RoomId(pub u16);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rect {
    pub top_left: MapCoord,
    pub w: i16,
    pub h: i16,
}

impl Rect {
    fn contains(&self, mc: MapCoord) -> bool {
        mc.x >= self.top_left.x
            && mc.x < self.top_left.x + self.w
            && mc.y >= self.top_left.y
            && mc.y < self.top_left.y + self.h
    }

    fn is_corner(&self, mc: MapCoord) -> bool {
        let x_edge = mc.x == self.top_left.x || mc.x == self.top_left.x + self.w - 1;
        let y_edge = mc.y == self.top_left.y || mc.y == self.top_left.y + self.h - 1;
        x_edge && y_edge
    }
}

#[derive(Default)]
pub struct RoomMap {
    rooms: Vec<Rect>,
    ready: bool,
}

impl RoomMap {
    pub fn new() -> Self {
        RoomMap::default()
    }

    /// Registers a room. Must happen before [`RoomMap::done_adding_rooms`].
    pub fn add_room(&mut self, top_left: MapCoord, w: i16, h: i16) {
        assert!(!self.ready, "add_room after done_adding_rooms");
        self.rooms.push(Rect { top_left, w, h });
    }

    /// Freezes the room list and randomises its order, so the room numbers
    /// sent to clients give away no structural information.
    pub fn done_adding_rooms(&mut self, rng: &GameRng) {
        self.ready = true;
        rng.shuffle(&mut self.rooms);
    }

    /// The rooms containing this square, excluding squares that are corners
    /// of the room in question. At most two rooms can match.
    pub fn rooms_at(&self, mc: MapCoord) -> (Option<RoomId>, Option<RoomId>) {
        let mut first = None;
        for (i, room) in self.rooms.iter().enumerate() {
            if !room.contains(mc) || room.is_corner(mc) {
                continue;
            }
            let id = RoomId(i as u16);
            if first.is_none() {
                first = Some(id);
            } else {
                return (first, Some(id));
            }
        }
        (first, None)
    }

    /// Whether this square is the corner of any room.
    pub fn is_corner(&self, mc: MapCoord) -> bool {
        self.rooms.iter().any(|room| room.is_corner(mc))
    }

    /// True iff some room contains both squares (corners excluded).
    pub fn in_same_room(&self, a: MapCoord, b: MapCoord) -> bool {
        let (a1, a2) = self.rooms_at(a);
        let (b1, b2) = self.rooms_at(b);
        let matches = |x: Option<RoomId>| x.is_some() && (x == b1 || x == b2);
        matches(a1) || matches(a2)
    }

    pub fn room(&self, id: RoomId) -> Option<Rect> {
        self.rooms.get(id.0 as usize).copied()
    }

    pub fn num_rooms(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two 4x4 rooms sharing the x=3 border column.
    fn two_rooms() -> RoomMap {
        let mut rm = RoomMap::new();
        rm.add_room(MapCoord::new(0, 0), 4, 4);
        rm.add_room(MapCoord::new(3, 0), 4, 4);
        rm.done_adding_rooms(&GameRng::from_seed_bytes(b"rooms"));
        rm
    }

    #[test]
    fn interior_squares_have_one_room() {
        let rm = two_rooms();
        let (r1, r2) = rm.rooms_at(MapCoord::new(1, 1));
        assert!(r1.is_some());
        assert!(r2.is_none());
    }

    #[test]
    fn border_squares_have_two_rooms() {
        let rm = two_rooms();
        // (3,1) lies on the shared border, not on a corner of either room.
        let (r1, r2) = rm.rooms_at(MapCoord::new(3, 1));
        assert!(r1.is_some());
        assert!(r2.is_some());
        assert_ne!(r1, r2);
    }

    #[test]
    fn corners_belong_to_no_room() {
        let rm = two_rooms();
        for corner in [
            MapCoord::new(0, 0),
            MapCoord::new(3, 0),
            MapCoord::new(0, 3),
            MapCoord::new(3, 3),
            MapCoord::new(6, 0),
        ] {
            assert!(rm.is_corner(corner), "{corner:?} should be a corner");
        }
        let (r1, r2) = rm.rooms_at(MapCoord::new(3, 0));
        assert_eq!((r1, r2), (None, None));
    }

    #[test]
    fn same_room_via_shared_border() {
        let rm = two_rooms();
        // Both sides of the border are in the same room as the border square.
        assert!(rm.in_same_room(MapCoord::new(1, 1), MapCoord::new(3, 1)));
        assert!(rm.in_same_room(MapCoord::new(3, 1), MapCoord::new(5, 1)));
        // But opposite interiors are not.
        assert!(!rm.in_same_room(MapCoord::new(1, 1), MapCoord::new(5, 1)));
        // Nothing shares a room with the void.
        assert!(!rm.in_same_room(MapCoord::new(1, 1), MapCoord::new(40, 40)));
    }

    #[test]
    fn room_lookup_out_of_range_is_none() {
        let rm = two_rooms();
        assert!(rm.room(RoomId(99)).is_none());
        assert!(rm.room(RoomId(0)).is_some());
    }
}
