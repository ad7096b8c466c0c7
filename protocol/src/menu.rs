//! The quest selection menu as synchronised between server and clients.
//!
//! The server is authoritative over the menu contents and the current
//! selections; clients only ever send selection *requests*. The wire format
//! is fixed so that serialise followed by deserialise is the identity.

use crate::wire::{WireError, WireRead, WireWrite};
use bytes::{Buf, BufMut};

/// A single configurable line of the quest menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MenuItem {
    /// A list of choices, displayed as a dropdown. Choices are either
    /// localisation keys or literal numbers rendered to text by the server.
    Dropdown {
        title: String,
        choices: Vec<String>,
        /// Render a vertical gap after this item.
        space_after: bool,
    },
    /// A free numeric field with a fixed digit count and a display suffix
    /// (for example "mins").
    Numeric {
        title: String,
        digits: u32,
        suffix: String,
        space_after: bool,
    },
}

impl MenuItem {
    pub fn title(&self) -> &str {
        match self {
            MenuItem::Dropdown { title, .. } | MenuItem::Numeric { title, .. } => title,
        }
    }

    /// The number of selectable choices; numeric fields report zero.
    pub fn num_choices(&self) -> usize {
        match self {
            MenuItem::Dropdown { choices, .. } => choices.len(),
            MenuItem::Numeric { .. } => 0,
        }
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        match self {
            MenuItem::Dropdown {
                title,
                choices,
                space_after,
            } => {
                buf.write_string(title);
                buf.write_u8(0);
                buf.write_varint(choices.len() as u64);
                for c in choices {
                    buf.write_string(c);
                }
                buf.write_u8(u8::from(*space_after));
            }
            MenuItem::Numeric {
                title,
                digits,
                suffix,
                space_after,
            } => {
                buf.write_string(title);
                buf.write_u8(1);
                buf.write_varint(u64::from(*digits));
                buf.write_string(suffix);
                buf.write_u8(u8::from(*space_after));
            }
        }
    }

    pub fn deserialize(buf: &mut impl Buf) -> Result<Self, WireError> {
        let title = buf.read_string()?;
        let numeric = buf.read_u8()? != 0;

        let item = if numeric {
            let digits = buf.read_varint()? as u32;
            let suffix = buf.read_string()?;
            let space_after = buf.read_u8()? != 0;
            MenuItem::Numeric {
                title,
                digits,
                suffix,
                space_after,
            }
        } else {
            let n = buf.read_varint()? as usize;
            if n > 10_000 {
                return Err(WireError::BadValue("menu item choice count"));
            }
            let mut choices = Vec::with_capacity(n);
            for _ in 0..n {
                choices.push(buf.read_string()?);
            }
            let space_after = buf.read_u8()? != 0;
            MenuItem::Dropdown {
                title,
                choices,
                space_after,
            }
        };
        Ok(item)
    }
}

/// The full menu: a localisation key for the title plus the ordered items.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Menu {
    pub title: String,
    pub items: Vec<MenuItem>,
}

impl Menu {
    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.write_string(&self.title);
        buf.write_varint(self.items.len() as u64);
        for item in &self.items {
            item.serialize(buf);
        }
    }

    pub fn deserialize(buf: &mut impl Buf) -> Result<Self, WireError> {
        let title = buf.read_string()?;
        let n = buf.read_varint()? as usize;
        if n > 10_000 {
            return Err(WireError::BadValue("menu item count"));
        }
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            items.push(MenuItem::deserialize(buf)?);
        }
        Ok(Menu { title, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};

    fn sample_menu() -> Menu {
        Menu {
            title: "menu_quest".into(),
            items: vec![
                MenuItem::Dropdown {
                    title: "menu_mission".into(),
                    choices: vec!["quest_gems".into(), "quest_book".into(), "quest_escape".into()],
                    space_after: true,
                },
                MenuItem::Numeric {
                    title: "menu_time_limit".into(),
                    digits: 3,
                    suffix: "mins".into(),
                    space_after: false,
                },
                MenuItem::Dropdown {
                    title: "menu_num_gems".into(),
                    choices: vec!["1".into(), "2".into(), "3".into(), "4".into()],
                    space_after: false,
                },
            ],
        }
    }

    #[test]
    fn menu_round_trip_is_identity() {
        let menu = sample_menu();
        let mut buf = BytesMut::new();
        menu.serialize(&mut buf);
        let mut bytes = Bytes::from(buf.to_vec());
        assert_eq!(Menu::deserialize(&mut bytes).unwrap(), menu);
        assert_eq!(bytes.remaining(), 0);
    }

    #[test]
    fn empty_menu_round_trip() {
        let menu = Menu::default();
        let mut buf = BytesMut::new();
        menu.serialize(&mut buf);
        let mut bytes = Bytes::from(buf.to_vec());
        assert_eq!(Menu::deserialize(&mut bytes).unwrap(), menu);
    }
}
