//! Transient dungeon icons (blood splats, explosion flashes) with timed
//! expiry through a priority queue.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Icon {
    pub x: i16,
    pub y: i16,
    pub graphic: u16,
}

pub struct IconQueue {
    /// Expiry times, smallest first.
    expiries: BinaryHeap<Reverse<(i64, u64)>>,
    icons: Vec<(u64, Icon)>,
    next_seq: u64,
}

impl IconQueue {
    pub fn new() -> Self {
        IconQueue {
            expiries: BinaryHeap::new(),
            icons: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn place_icon(&mut self, now_us: i64, x: i16, y: i16, graphic: u16, duration_us: i64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.expiries.push(Reverse((now_us + duration_us, seq)));
        self.icons.push((seq, Icon { x, y, graphic }));
    }

    /// Drops everything whose time is up, then returns what is left to draw.
    pub fn visible(&mut self, now_us: i64) -> Vec<Icon> {
        while let Some(Reverse((expiry, seq))) = self.expiries.peek().copied() {
            if expiry > now_us {
                break;
            }
            self.expiries.pop();
            self.icons.retain(|(s, _)| *s != seq);
        }
        self.icons.iter().map(|(_, icon)| *icon).collect()
    }

    pub fn clear(&mut self) {
        self.expiries.clear();
        self.icons.clear();
    }
}

impl Default for IconQueue {
    fn default() -> Self {
        IconQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icons_expire_in_order() {
        let mut q = IconQueue::new();
        q.place_icon(0, 1, 1, 10, 500_000);
        q.place_icon(0, 2, 2, 11, 1_000_000);

        assert_eq!(q.visible(100_000).len(), 2);
        let at_700 = q.visible(700_000);
        assert_eq!(at_700.len(), 1);
        assert_eq!(at_700[0].graphic, 11);
        assert!(q.visible(1_000_000).is_empty());
    }
}
