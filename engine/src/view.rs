//! Per-player view streams.
//!
//! The engine never talks to sockets. Instead every player owns a
//! [`PlayerView`]: a FIFO of typed [`ServerMessage`]s plus the little state
//! needed to produce them (the wire entity-id table and the current room).
//! The hosting runtime drains the queues after each tick and sends them out;
//! the order within one queue is exactly the order things happened.

use crate::creature::EntityId;
use crate::geometry::MapCoord;
use crate::room::{Rect, RoomId};
use crate::tile::Tile;
use knights_protocol::ServerMessage;
use std::collections::HashMap;

/// The view stream of a single player.
pub struct PlayerView {
    /// Wire ids are u16, stable per entity; 0 is reserved for the player's
    /// own knight so the client can suppress its own name label.
    wire_ids: HashMap<EntityId, u16>,
    next_wire_id: u16,
    own_knight: Option<EntityId>,
    current_room: Option<(RoomId, Rect)>,
    queue: Vec<ServerMessage>,
}

impl PlayerView {
    fn new() -> Self {
        PlayerView {
            wire_ids: HashMap::new(),
            next_wire_id: 1,
            own_knight: None,
            current_room: None,
            queue: Vec::new(),
        }
    }

    pub fn push(&mut self, msg: ServerMessage) {
        self.queue.push(msg);
    }

    pub fn drain(&mut self) -> Vec<ServerMessage> {
        std::mem::take(&mut self.queue)
    }

    /// Marks which entity is "me"; it gets wire id 0 in this stream.
    pub fn set_own_knight(&mut self, id: EntityId) {
        self.own_knight = Some(id);
        self.wire_ids.insert(id, 0);
    }

    pub fn wire_id(&self, id: EntityId) -> Option<u16> {
        self.wire_ids.get(&id).copied()
    }

    fn alloc_wire_id(&mut self, id: EntityId) -> u16 {
        if let Some(w) = self.wire_ids.get(&id) {
            return *w;
        }
        let w = if self.own_knight == Some(id) {
            0
        } else {
            let w = self.next_wire_id;
            self.next_wire_id = self.next_wire_id.wrapping_add(1).max(1);
            w
        };
        self.wire_ids.insert(id, w);
        w
    }

    pub fn current_room(&self) -> Option<RoomId> {
        self.current_room.map(|(id, _)| id)
    }

    pub fn set_current_room(&mut self, id: RoomId, rect: Rect) {
        self.current_room = Some((id, rect));
        self.push(ServerMessage::SetCurrentRoom {
            room: id.0,
            width: rect.w as u16,
            height: rect.h as u16,
        });
    }

    /// Whether a square is inside the room this player is currently shown.
    pub fn sees(&self, mc: MapCoord) -> bool {
        match self.current_room {
            Some((_, rect)) => {
                mc.x >= rect.top_left.x
                    && mc.x < rect.top_left.x + rect.w
                    && mc.y >= rect.top_left.y
                    && mc.y < rect.top_left.y + rect.h
            }
            None => false,
        }
    }
}

/// All the player views of one game, plus the map-change fan-out.
pub struct ViewHub {
    views: Vec<PlayerView>,
}

impl ViewHub {
    pub fn new(num_players: usize) -> Self {
        ViewHub {
            views: (0..num_players).map(|_| PlayerView::new()).collect(),
        }
    }

    pub fn num_players(&self) -> usize {
        self.views.len()
    }

    pub fn player(&mut self, num: usize) -> &mut PlayerView {
        &mut self.views[num]
    }

    pub fn player_ref(&self, num: usize) -> &PlayerView {
        &self.views[num]
    }

    pub fn broadcast(&mut self, msg: ServerMessage) {
        for view in &mut self.views {
            view.push(msg.clone());
        }
    }

    /// Pushes a message to every player whose current room shows `mc`.
    pub fn broadcast_at(&mut self, mc: MapCoord, msg: ServerMessage) {
        for view in &mut self.views {
            if view.sees(mc) {
                view.push(msg.clone());
            }
        }
    }

    /// Sends the full tile stack of a square to one player, bypassing the
    /// room filter when `force` is set.
    pub fn send_square_tiles(&mut self, num: usize, mc: MapCoord, tiles: &[Tile], force: bool) {
        let view = &mut self.views[num];
        if !force && !view.sees(mc) {
            return;
        }
        view.push(ServerMessage::ClearTiles {
            x: mc.x,
            y: mc.y,
            force,
        });
        for tile in tiles {
            view.push(ServerMessage::SetTile {
                x: mc.x,
                y: mc.y,
                depth: tile.depth,
                graphic: tile.graphic,
                colour_change: tile.colour_change,
                force,
            });
        }
    }

    pub fn send_square_item(&mut self, num: usize, mc: MapCoord, graphic: u16, force: bool) {
        let view = &mut self.views[num];
        if !force && !view.sees(mc) {
            return;
        }
        view.push(ServerMessage::SetItem {
            x: mc.x,
            y: mc.y,
            graphic,
            force,
        });
    }

    /// Pushes an entity event to every player that is tracking the entity.
    /// The closure gets the per-player wire id.
    pub fn entity_event(&mut self, id: EntityId, make: impl Fn(u16) -> ServerMessage) {
        for view in &mut self.views {
            if let Some(wire) = view.wire_id(id) {
                view.push(make(wire));
            }
        }
    }

    /// Makes an entity visible (if its square is on screen) to every player
    /// not yet tracking it. The closure builds the add-entity message for a
    /// given wire id.
    pub fn ensure_entity_visible(
        &mut self,
        id: EntityId,
        mc: MapCoord,
        make_add: impl Fn(u16) -> ServerMessage,
    ) {
        for view in &mut self.views {
            if view.wire_id(id).is_none() && view.sees(mc) {
                let wire = view.alloc_wire_id(id);
                view.push(make_add(wire));
            }
        }
    }

    /// Drops an entity from every stream that is tracking it.
    pub fn entity_removed(&mut self, id: EntityId) {
        for view in &mut self.views {
            if let Some(wire) = view.wire_ids.remove(&id) {
                view.push(ServerMessage::RmEntity { id: wire });
            }
        }
    }

    /// Registers a player's own knight, so it gets wire id 0.
    pub fn set_own_knight(&mut self, num: usize, id: EntityId) {
        self.views[num].set_own_knight(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::MapCoord;

    fn room_rect() -> Rect {
        Rect {
            top_left: MapCoord::new(0, 0),
            w: 4,
            h: 4,
        }
    }

    #[test]
    fn own_knight_gets_wire_id_zero() {
        let mut hub = ViewHub::new(2);
        hub.set_own_knight(0, EntityId(7));
        hub.player(0).set_current_room(RoomId(1), room_rect());
        hub.player(1).set_current_room(RoomId(1), room_rect());

        hub.ensure_entity_visible(EntityId(7), MapCoord::new(1, 1), |wire| {
            ServerMessage::RmEntity { id: wire } // shape is irrelevant here
        });
        assert_eq!(hub.player_ref(0).wire_id(EntityId(7)), Some(0));
        // The other player sees the same entity under a real id.
        assert_eq!(hub.player_ref(1).wire_id(EntityId(7)), Some(1));
    }

    #[test]
    fn entity_events_only_reach_trackers() {
        let mut hub = ViewHub::new(2);
        hub.player(0).set_current_room(RoomId(0), room_rect());
        // Player 1 is looking at nothing.
        hub.ensure_entity_visible(EntityId(3), MapCoord::new(2, 2), |wire| {
            ServerMessage::RmEntity { id: wire }
        });
        hub.entity_event(EntityId(3), |wire| ServerMessage::SetFacing {
            id: wire,
            facing: 2,
        });

        let p0: Vec<_> = hub.player(0).drain();
        let p1: Vec<_> = hub.player(1).drain();
        assert_eq!(p0.len(), 2);
        assert!(p1.is_empty());
    }

    #[test]
    fn removal_clears_the_wire_id_table() {
        let mut hub = ViewHub::new(1);
        hub.player(0).set_current_room(RoomId(0), room_rect());
        hub.ensure_entity_visible(EntityId(3), MapCoord::new(2, 2), |wire| {
            ServerMessage::RmEntity { id: wire }
        });
        hub.entity_removed(EntityId(3));
        assert_eq!(hub.player_ref(0).wire_id(EntityId(3)), None);
        let msgs = hub.player(0).drain();
        assert!(matches!(msgs.last(), Some(ServerMessage::RmEntity { .. })));
    }

    #[test]
    fn room_filter_gates_square_updates() {
        let mut hub = ViewHub::new(1);
        // No room set: filtered sends do nothing, forced sends go through.
        hub.send_square_tiles(0, MapCoord::new(1, 1), &[], false);
        assert!(hub.player(0).drain().is_empty());
        hub.send_square_tiles(0, MapCoord::new(1, 1), &[], true);
        assert_eq!(hub.player(0).drain().len(), 1);
    }
}
