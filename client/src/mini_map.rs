//! The local mini-map model: a grid of colour classes plus knight and item
//! markers. Rendering reads this; the update stream writes it.

use knights_protocol::MiniMapColour;
use std::collections::HashMap;

pub struct MiniMap {
    width: u16,
    height: u16,
    squares: Vec<MiniMapColour>,
    /// Knight markers by player slot; absent means hidden.
    knights: HashMap<u8, (i16, i16)>,
    /// Squares with an item indicator lit (sense items).
    items: Vec<(i16, i16)>,
}

impl MiniMap {
    pub fn new() -> Self {
        MiniMap {
            width: 0,
            height: 0,
            squares: Vec::new(),
            knights: HashMap::new(),
            items: Vec::new(),
        }
    }

    /// Sets the size. Should be called first; it also wipes everything.
    pub fn set_size(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.squares = vec![MiniMapColour::Unmapped; width as usize * height as usize];
        self.knights.clear();
        self.items.clear();
    }

    pub fn set_colour(&mut self, x: u16, y: u16, colour: MiniMapColour) {
        if x < self.width && y < self.height {
            self.squares[y as usize * self.width as usize + x as usize] = colour;
        }
    }

    /// Back to all-unmapped, markers included.
    pub fn wipe_map(&mut self) {
        self.squares.fill(MiniMapColour::Unmapped);
        self.knights.clear();
        self.items.clear();
    }

    /// Shows a knight marker; (-1,-1) removes it.
    pub fn map_knight_location(&mut self, slot: u8, x: i16, y: i16) {
        if x < 0 || y < 0 {
            self.knights.remove(&slot);
        } else {
            self.knights.insert(slot, (x, y));
        }
    }

    pub fn map_item_location(&mut self, x: i16, y: i16, on: bool) {
        if on {
            if !self.items.contains(&(x, y)) {
                self.items.push((x, y));
            }
        } else {
            self.items.retain(|p| *p != (x, y));
        }
    }

    pub fn colour_at(&self, x: u16, y: u16) -> MiniMapColour {
        if x < self.width && y < self.height {
            self.squares[y as usize * self.width as usize + x as usize]
        } else {
            MiniMapColour::Unmapped
        }
    }

    pub fn knight_location(&self, slot: u8) -> Option<(i16, i16)> {
        self.knights.get(&slot).copied()
    }

    pub fn item_locations(&self) -> &[(i16, i16)] {
        &self.items
    }

    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }
}

impl Default for MiniMap {
    fn default() -> Self {
        MiniMap::new()
    }
}
