//! The local status display model: backpack slots, skulls, health, potion
//! magic and the quest requirement list.

use knights_protocol::PotionMagic;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackpackSlot {
    pub graphic: u16,
    pub overdraw: u16,
    pub num_carried: u8,
    pub num_max: u8,
}

pub struct StatusDisplay {
    /// Keyed by slot number: 11.. normal items, 20-22 keys, 23 lock picks,
    /// 30 gems.
    backpack: BTreeMap<u8, BackpackSlot>,
    skulls: u32,
    health: i16,
    potion_magic: PotionMagic,
    poison_immune: bool,
    quest_hints: Vec<String>,
}

impl StatusDisplay {
    pub fn new() -> Self {
        StatusDisplay {
            backpack: BTreeMap::new(),
            skulls: 0,
            health: 0,
            potion_magic: PotionMagic::None,
            poison_immune: false,
            quest_hints: Vec::new(),
        }
    }

    pub fn set_backpack(&mut self, slot: u8, graphic: u16, overdraw: u16, num_carried: u8, num_max: u8) {
        if num_carried == 0 {
            self.backpack.remove(&slot);
        } else {
            self.backpack.insert(
                slot,
                BackpackSlot {
                    graphic,
                    overdraw,
                    num_carried,
                    num_max,
                },
            );
        }
    }

    pub fn add_skull(&mut self) {
        self.skulls += 1;
    }

    pub fn set_health(&mut self, health: i16) {
        self.health = health;
    }

    pub fn set_potion_magic(&mut self, magic: PotionMagic, poison_immune: bool) {
        self.potion_magic = magic;
        self.poison_immune = poison_immune;
    }

    pub fn set_quest_hints(&mut self, hints: Vec<String>) {
        self.quest_hints = hints;
    }

    pub fn backpack_slot(&self, slot: u8) -> Option<&BackpackSlot> {
        self.backpack.get(&slot)
    }

    pub fn skulls(&self) -> u32 {
        self.skulls
    }

    pub fn health(&self) -> i16 {
        self.health
    }

    pub fn potion_magic(&self) -> (PotionMagic, bool) {
        (self.potion_magic, self.poison_immune)
    }

    pub fn quest_hints(&self) -> &[String] {
        &self.quest_hints
    }
}

impl Default for StatusDisplay {
    fn default() -> Self {
        StatusDisplay::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backpack_slots_update_and_clear() {
        let mut status = StatusDisplay::new();
        status.set_backpack(30, 11, 0, 3, 6);
        assert_eq!(status.backpack_slot(30).unwrap().num_carried, 3);
        status.set_backpack(30, 11, 0, 0, 6);
        assert!(status.backpack_slot(30).is_none());
    }

    #[test]
    fn scalar_state_sticks() {
        let mut status = StatusDisplay::new();
        status.set_health(9);
        status.add_skull();
        status.add_skull();
        status.set_potion_magic(PotionMagic::Quickness, true);
        status.set_quest_hints(vec!["3 gems required".into()]);

        assert_eq!(status.health(), 9);
        assert_eq!(status.skulls(), 2);
        assert_eq!(status.potion_magic(), (PotionMagic::Quickness, true));
        assert_eq!(status.quest_hints().len(), 1);
    }
}
