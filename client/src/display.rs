//! The client-side dungeon display state, assembled from the per-player
//! update stream.
//!
//! [`GameDisplay::apply`] is the single entry point: every dungeon-view,
//! mini-map and status message lands here and updates the matching model.
//! The renderer only ever reads.

use crate::entity_map::EntityMap;
use crate::icons::IconQueue;
use crate::mini_map::MiniMap;
use crate::status_display::StatusDisplay;
use knights_protocol::messages::{EF_DURING_MOTION, EF_INVISIBLE, EF_INVULNERABLE};
use knights_protocol::{Paragraph, ServerMessage};
use std::collections::HashMap;

/// One tile layer on a square, as the client knows it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileGfx {
    pub depth: u8,
    pub graphic: u16,
    pub colour_change: u16,
}

/// A message to flash on screen a number of times.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashEntry {
    pub text: Paragraph,
    pub num_times: u32,
}

pub struct GameDisplay {
    pub entities: EntityMap,
    pub mini_map: MiniMap,
    pub status: StatusDisplay,
    pub icons: IconQueue,

    current_room: Option<(u16, u16, u16)>,
    tiles: HashMap<(i16, i16), Vec<TileGfx>>,
    items: HashMap<(i16, i16), u16>,
    flash_messages: Vec<FlashEntry>,
    continuous_messages: Vec<Paragraph>,
}

impl GameDisplay {
    pub fn new(approach_offset: i32, bat_anim_timescale_us: i64, vbat_anims: Vec<u16>) -> Self {
        GameDisplay {
            entities: EntityMap::new(approach_offset, bat_anim_timescale_us, vbat_anims),
            mini_map: MiniMap::new(),
            status: StatusDisplay::new(),
            icons: IconQueue::new(),
            current_room: None,
            tiles: HashMap::new(),
            items: HashMap::new(),
            flash_messages: Vec::new(),
            continuous_messages: Vec::new(),
        }
    }

    pub fn current_room(&self) -> Option<(u16, u16, u16)> {
        self.current_room
    }

    pub fn tiles_at(&self, x: i16, y: i16) -> &[TileGfx] {
        self.tiles
            .get(&(x, y))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn item_at(&self, x: i16, y: i16) -> Option<u16> {
        self.items.get(&(x, y)).copied()
    }

    pub fn flash_messages(&self) -> &[FlashEntry] {
        &self.flash_messages
    }

    pub fn continuous_messages(&self) -> &[Paragraph] {
        &self.continuous_messages
    }

    /// Whether the message is a dungeon/minimap/status update this display
    /// consumes (as opposed to a lobby-level message).
    pub fn wants(msg: &ServerMessage) -> bool {
        use ServerMessage::*;
        matches!(
            msg,
            SetCurrentRoom { .. }
                | AddEntity { .. }
                | RmEntity { .. }
                | MoveEntity { .. }
                | RepositionEntity { .. }
                | FlipEntityMotion { .. }
                | SetAnimData { .. }
                | SetFacing { .. }
                | SetSpeechBubble { .. }
                | ClearTiles { .. }
                | SetTile { .. }
                | SetItem { .. }
                | PlaceIcon { .. }
                | FlashMessage { .. }
                | CancelContinuousMessages
                | AddContinuousMessage { .. }
                | MiniMapSetSize { .. }
                | MiniMapSetColour { .. }
                | MiniMapWipe
                | MapKnightLocation { .. }
                | MapItemLocation { .. }
                | SetBackpack { .. }
                | AddSkull
                | SetHealth { .. }
                | SetPotionMagic { .. }
                | SetQuestHints { .. }
        )
    }

    /// Applies one update at local time `now_us`.
    pub fn apply(&mut self, msg: &ServerMessage, now_us: i64) {
        use ServerMessage::*;
        match msg {
            SetCurrentRoom {
                room,
                width,
                height,
            } => {
                self.current_room = Some((*room, *width, *height));
                // A new room means a fresh tile/item canvas. Entities stay:
                // the stream adds and removes them explicitly, and anything
                // left over sits outside the drawn rectangle.
                self.tiles.clear();
                self.items.clear();
            }
            AddEntity {
                id,
                x,
                y,
                height,
                facing,
                anim,
                overlay,
                frame,
                anim_zero_delta_ms,
                flags,
                cur_offset,
                motion,
                motion_remaining_ms,
                player,
            } => {
                self.entities.add_entity(
                    now_us,
                    *id,
                    *x,
                    *y,
                    *height,
                    *facing,
                    *anim,
                    *overlay,
                    *frame,
                    i64::from(*anim_zero_delta_ms) * 1000,
                    flags & EF_INVISIBLE != 0,
                    flags & EF_INVULNERABLE != 0,
                    i32::from(*cur_offset),
                    *motion,
                    i64::from(*motion_remaining_ms) * 1000,
                    player.to_string(),
                );
            }
            RmEntity { id } => self.entities.rm_entity(*id),
            MoveEntity {
                id,
                motion,
                duration_ms,
                missile_mode,
            } => self.entities.move_entity(
                now_us,
                *id,
                *motion,
                i64::from(*duration_ms) * 1000,
                *missile_mode,
            ),
            RepositionEntity { id, x, y } => self.entities.reposition_entity(*id, *x, *y),
            FlipEntityMotion {
                id,
                initial_delay_ms,
                duration_ms,
            } => self.entities.flip_entity_motion(
                now_us,
                *id,
                i64::from(*initial_delay_ms) * 1000,
                i64::from(*duration_ms) * 1000,
            ),
            SetAnimData {
                id,
                anim,
                overlay,
                frame,
                anim_zero_delta_ms,
                flags,
            } => self.entities.set_anim_data(
                now_us,
                *id,
                *anim,
                *overlay,
                *frame,
                i64::from(*anim_zero_delta_ms) * 1000,
                flags & EF_INVISIBLE != 0,
                flags & EF_INVULNERABLE != 0,
                flags & EF_DURING_MOTION != 0,
            ),
            SetFacing { id, facing } => self.entities.set_facing(*id, *facing),
            SetSpeechBubble { id, show } => self.entities.set_speech_bubble(*id, *show),

            ClearTiles { x, y, .. } => {
                self.tiles.remove(&(*x, *y));
            }
            SetTile {
                x,
                y,
                depth,
                graphic,
                colour_change,
                ..
            } => {
                let stack = self.tiles.entry((*x, *y)).or_default();
                stack.retain(|t| t.depth != *depth);
                stack.push(TileGfx {
                    depth: *depth,
                    graphic: *graphic,
                    colour_change: *colour_change,
                });
                stack.sort_by_key(|t| t.depth);
            }
            SetItem { x, y, graphic, .. } => {
                if *graphic == 0 {
                    self.items.remove(&(*x, *y));
                } else {
                    self.items.insert((*x, *y), *graphic);
                }
            }
            PlaceIcon {
                x,
                y,
                graphic,
                duration_ms,
            } => self.icons.place_icon(
                now_us,
                *x,
                *y,
                *graphic,
                i64::from(*duration_ms) * 1000,
            ),
            FlashMessage { text, num_times } => self.flash_messages.push(FlashEntry {
                text: text.clone(),
                num_times: *num_times,
            }),
            CancelContinuousMessages => self.continuous_messages.clear(),
            AddContinuousMessage { text } => self.continuous_messages.push(text.clone()),

            MiniMapSetSize { width, height } => self.mini_map.set_size(*width, *height),
            MiniMapSetColour { x, y, colour } => self.mini_map.set_colour(*x, *y, *colour),
            MiniMapWipe => self.mini_map.wipe_map(),
            MapKnightLocation { slot, x, y } => self.mini_map.map_knight_location(*slot, *x, *y),
            MapItemLocation { x, y, on } => self.mini_map.map_item_location(*x, *y, *on),

            SetBackpack {
                slot,
                graphic,
                overdraw,
                num_carried,
                num_max,
            } => self
                .status
                .set_backpack(*slot, *graphic, *overdraw, *num_carried, *num_max),
            AddSkull => self.status.add_skull(),
            SetHealth { health } => self.status.set_health(*health),
            SetPotionMagic {
                magic,
                poison_immune,
            } => self.status.set_potion_magic(*magic, *poison_immune),
            SetQuestHints { hints } => self.status.set_quest_hints(hints.clone()),

            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knights_protocol::MiniMapColour;

    fn display() -> GameDisplay {
        GameDisplay::new(250, 100_000, vec![])
    }

    #[test]
    fn tile_layers_replace_by_depth() {
        let mut d = display();
        d.apply(
            &ServerMessage::SetTile {
                x: 2,
                y: 2,
                depth: 0,
                graphic: 1,
                colour_change: 0,
                force: false,
            },
            0,
        );
        d.apply(
            &ServerMessage::SetTile {
                x: 2,
                y: 2,
                depth: 5,
                graphic: 3,
                colour_change: 0,
                force: false,
            },
            0,
        );
        d.apply(
            &ServerMessage::SetTile {
                x: 2,
                y: 2,
                depth: 5,
                graphic: 4,
                colour_change: 2,
                force: false,
            },
            0,
        );
        let tiles = d.tiles_at(2, 2);
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[1].graphic, 4);
        assert_eq!(tiles[1].colour_change, 2);

        d.apply(&ServerMessage::ClearTiles { x: 2, y: 2, force: false }, 0);
        assert!(d.tiles_at(2, 2).is_empty());
    }

    #[test]
    fn items_track_zero_as_removal() {
        let mut d = display();
        d.apply(
            &ServerMessage::SetItem { x: 1, y: 1, graphic: 11, force: false },
            0,
        );
        assert_eq!(d.item_at(1, 1), Some(11));
        d.apply(
            &ServerMessage::SetItem { x: 1, y: 1, graphic: 0, force: false },
            0,
        );
        assert_eq!(d.item_at(1, 1), None);
    }

    #[test]
    fn room_change_resets_the_canvas() {
        let mut d = display();
        d.apply(
            &ServerMessage::SetTile {
                x: 0,
                y: 0,
                depth: 0,
                graphic: 1,
                colour_change: 0,
                force: false,
            },
            0,
        );
        d.apply(
            &ServerMessage::SetCurrentRoom { room: 3, width: 6, height: 5 },
            0,
        );
        assert_eq!(d.current_room(), Some((3, 6, 5)));
        assert!(d.tiles_at(0, 0).is_empty());
    }

    #[test]
    fn messages_accumulate_and_cancel() {
        let mut d = display();
        d.apply(
            &ServerMessage::AddContinuousMessage {
                text: Paragraph::new("approaching_home"),
            },
            0,
        );
        d.apply(
            &ServerMessage::FlashMessage {
                text: Paragraph::new("3 gems required"),
                num_times: 4,
            },
            0,
        );
        assert_eq!(d.continuous_messages().len(), 1);
        assert_eq!(d.flash_messages().len(), 1);
        d.apply(&ServerMessage::CancelContinuousMessages, 0);
        assert!(d.continuous_messages().is_empty());
    }

    #[test]
    fn minimap_and_status_route_through() {
        let mut d = display();
        d.apply(&ServerMessage::MiniMapSetSize { width: 4, height: 4 }, 0);
        d.apply(
            &ServerMessage::MiniMapSetColour { x: 1, y: 1, colour: MiniMapColour::Floor },
            0,
        );
        assert_eq!(d.mini_map.colour_at(1, 1), MiniMapColour::Floor);

        d.apply(&ServerMessage::SetHealth { health: 7 }, 0);
        assert_eq!(d.status.health(), 7);
    }
}
