//! Quests and the quest-hint aggregation.
//!
//! A quest is checked when a knight whacks the pentagram or approaches their
//! own exit; the hint strings are what the status display shows under
//! "Quest Requirements".

use crate::creature::{EntityCore, KnightData};
use crate::dungeon::DungeonMap;
use crate::item::ItemTypeId;
use std::collections::BTreeMap;

/// Data for a quest-progress icon on the status display.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QuestIconInfo {
    pub num_held: u32,
    pub num_required: u32,
    pub gfx_missing: u16,
    pub gfx_held: u16,
}

/// The quest variants.
#[derive(Clone, Debug)]
pub enum Quest {
    /// Bring `n` of any acceptable item type to the exit.
    Retrieve {
        n: u32,
        itypes: Vec<ItemTypeId>,
        singular: String,
        plural: String,
    },
    /// Strike a book lying ahead while holding a wand.
    Destroy {
        books: Vec<ItemTypeId>,
        wands: Vec<ItemTypeId>,
    },
}

impl Quest {
    /// Whether the knight currently fulfils this quest.
    pub fn check(&self, kt: &KnightData, core: &EntityCore, map: &DungeonMap) -> bool {
        match self {
            Quest::Retrieve { n, itypes, .. } => {
                if kt.item_in_hand.is_some_and(|held| itypes.contains(&held)) {
                    return true;
                }
                // Only the first matching backpack stack counts; stacks of
                // different acceptable types are never summed.
                kt.backpack
                    .iter()
                    .find(|stack| itypes.contains(&stack.itype))
                    .is_some_and(|stack| stack.count >= *n)
            }
            Quest::Destroy { books, wands } => {
                if !kt.item_in_hand.is_some_and(|held| wands.contains(&held)) {
                    return false;
                }
                if !core.on_map() {
                    return false;
                }
                let ahead = core.pos.displace(core.facing);
                map.get_item(ahead)
                    .is_some_and(|item| books.contains(&item.itype))
            }
        }
    }

    /// The hint flashed when the knight reaches the exit unfulfilled.
    pub fn hint(&self) -> String {
        match self {
            Quest::Retrieve {
                n,
                singular,
                plural,
                ..
            } => {
                if *n == 1 {
                    format!("{singular} required")
                } else {
                    format!("{n} {plural} required")
                }
            }
            Quest::Destroy { .. } => "Destroy the book with the wand".into(),
        }
    }

    /// Whether "Sense Items" style magic should highlight this item type.
    pub fn is_item_interesting(&self, itype: ItemTypeId) -> bool {
        match self {
            Quest::Retrieve { itypes, .. } => itypes.contains(&itype),
            Quest::Destroy { books, wands } => books.contains(&itype) || wands.contains(&itype),
        }
    }

    /// Accumulates the items this quest needs. When a type is already in the
    /// map the larger requirement wins.
    pub fn required_items(&self, required: &mut BTreeMap<ItemTypeId, u32>) {
        let mut need = |itype: ItemTypeId, n: u32| {
            let entry = required.entry(itype).or_insert(0);
            *entry = (*entry).max(n);
        };
        match self {
            Quest::Retrieve { n, itypes, .. } => {
                for it in itypes {
                    need(*it, *n);
                }
            }
            Quest::Destroy { books, wands } => {
                for it in books.iter().chain(wands) {
                    need(*it, 1);
                }
            }
        }
    }

    /// A descriptive message for the quest, if it has one.
    pub fn quest_message(&self) -> Option<String> {
        match self {
            Quest::Retrieve { .. } => None,
            Quest::Destroy { .. } => Some("Destroy the book with the wand".into()),
        }
    }

    /// Appends a progress icon for retrieval quests. The held count comes
    /// from the hand first, then the first matching backpack stack.
    pub fn append_quest_icon(&self, kt: Option<&KnightData>, icons: &mut Vec<QuestIconInfo>) {
        let Quest::Retrieve { n, itypes, .. } = self else {
            return;
        };
        let mut info = QuestIconInfo {
            num_held: 0,
            num_required: *n,
            gfx_missing: 0,
            gfx_held: 0,
        };
        if let Some(kt) = kt {
            if kt.item_in_hand.is_some_and(|held| itypes.contains(&held)) {
                info.num_held = 1;
            } else if let Some(stack) = kt.backpack.iter().find(|s| itypes.contains(&s.itype)) {
                info.num_held = stack.count;
            }
        }
        icons.push(info);
    }
}

#[derive(Clone, Debug, PartialEq)]
struct QuestHint {
    msg: String,
    order: f64,
    group: f64,
}

/// Collects per-player quest hints and renders them, sorted, with
/// `--- OR ---` separators between alternative groups.
#[derive(Default)]
pub struct QuestHintManager {
    hints: Vec<QuestHint>,
}

impl QuestHintManager {
    pub fn add_hint(&mut self, msg: impl Into<String>, order: f64, group: f64) {
        self.hints.push(QuestHint {
            msg: msg.into(),
            order,
            group,
        });
    }

    pub fn clear_hints(&mut self) {
        self.hints.clear();
    }

    /// The display strings in (group, order, msg) order.
    pub fn hint_strings(&self) -> Vec<String> {
        let mut sorted = self.hints.clone();
        sorted.sort_by(|a, b| {
            a.group
                .partial_cmp(&b.group)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    a.order
                        .partial_cmp(&b.order)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.msg.cmp(&b.msg))
        });

        let mut out = Vec::new();
        for (i, hint) in sorted.iter().enumerate() {
            if i > 0 && hint.group != sorted[i - 1].group {
                out.push(String::new());
                out.push("--- OR ---".into());
                out.push(String::new());
            }
            out.push(hint.msg.clone());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{MapCoord, MapDirection, MapHeight};
    use crate::item::Item;

    const GEM: ItemTypeId = ItemTypeId(1);
    const WAND: ItemTypeId = ItemTypeId(3);
    const BOOK: ItemTypeId = ItemTypeId(4);

    fn retrieve(n: u32) -> Quest {
        Quest::Retrieve {
            n,
            itypes: vec![GEM],
            singular: "gem".into(),
            plural: "gems".into(),
        }
    }

    fn knight_core() -> EntityCore {
        let mut core = EntityCore::new(MapHeight::Walking, 12, 100, 0);
        core.pos = MapCoord::new(1, 1);
        core.facing = MapDirection::East;
        core
    }

    #[test]
    fn retrieve_counts_hand_or_single_backpack_stack() {
        let quest = retrieve(3);
        let map = DungeonMap::new(4, 4);
        let core = knight_core();

        // Two in hand, five in the backpack: the backpack stack carries it.
        let mut kt = KnightData::default();
        kt.item_in_hand = Some(GEM);
        kt.backpack.push(Item::with_count(GEM, 5));
        assert!(quest.check(&kt, &core, &map));

        // Holding an acceptable item in hand alone is enough.
        let mut kt = KnightData::default();
        kt.item_in_hand = Some(GEM);
        assert!(quest.check(&kt, &core, &map));

        // A short stack fails even if a later stack would qualify: stacks do
        // not sum and only the first match is examined.
        let mut kt = KnightData::default();
        kt.backpack.push(Item::with_count(GEM, 2));
        assert!(!quest.check(&kt, &core, &map));
    }

    #[test]
    fn destroy_needs_wand_in_hand_and_book_ahead() {
        let quest = Quest::Destroy {
            books: vec![BOOK],
            wands: vec![WAND],
        };
        let mut map = DungeonMap::new(4, 4);
        let core = knight_core();

        let mut kt = KnightData::default();
        kt.item_in_hand = Some(WAND);
        assert!(!quest.check(&kt, &core, &map));

        // Book directly ahead (facing east from (1,1)).
        map.add_item(
            MapCoord::new(2, 1),
            Item::new(BOOK),
            crate::dungeon::Originator::None,
            &mut (),
        );
        assert!(quest.check(&kt, &core, &map));

        // Without the wand the book alone does nothing.
        kt.item_in_hand = None;
        assert!(!quest.check(&kt, &core, &map));
    }

    #[test]
    fn hints_pluralise() {
        assert_eq!(retrieve(1).hint(), "gem required");
        assert_eq!(retrieve(4).hint(), "4 gems required");
    }

    #[test]
    fn required_items_take_the_max() {
        let mut required = BTreeMap::new();
        retrieve(2).required_items(&mut required);
        retrieve(5).required_items(&mut required);
        assert_eq!(required.get(&GEM), Some(&5));
    }

    #[test]
    fn quest_icons_report_held_counts() {
        let mut icons = Vec::new();
        let mut kt = KnightData::default();
        kt.backpack.push(Item::with_count(GEM, 4));
        retrieve(6).append_quest_icon(Some(&kt), &mut icons);
        assert_eq!(icons.len(), 1);
        assert_eq!(icons[0].num_held, 4);
        assert_eq!(icons[0].num_required, 6);
    }

    #[test]
    fn hint_groups_are_separated() {
        let mut mgr = QuestHintManager::default();
        mgr.add_hint("destroy the book", 1.0, 2.0);
        mgr.add_hint("3 gems required", 1.0, 1.0);
        mgr.add_hint("escape via your exit", 2.0, 1.0);

        assert_eq!(
            mgr.hint_strings(),
            vec![
                "3 gems required".to_string(),
                "escape via your exit".to_string(),
                String::new(),
                "--- OR ---".to_string(),
                String::new(),
                "destroy the book".to_string(),
            ]
        );

        mgr.clear_hints();
        assert!(mgr.hint_strings().is_empty());
    }
}
