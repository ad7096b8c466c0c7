//! Persistent client options: key bindings, display mode, control system,
//! tooltips, player name. Stored as JSON next to the executable (or wherever
//! the caller points us).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMode {
    Windowed,
    Fullscreen,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Action name to key name.
    pub key_bindings: BTreeMap<String, String>,
    pub display_mode: DisplayMode,
    /// The newer control scheme (action bar) versus the classic one.
    pub new_control_system: bool,
    pub show_tooltips: bool,
    pub player_name: String,
}

impl Default for Options {
    fn default() -> Self {
        let mut key_bindings = BTreeMap::new();
        key_bindings.insert("up".into(), "W".into());
        key_bindings.insert("left".into(), "A".into());
        key_bindings.insert("down".into(), "S".into());
        key_bindings.insert("right".into(), "D".into());
        key_bindings.insert("action".into(), "Space".into());
        key_bindings.insert("suicide".into(), "Q".into());
        Options {
            key_bindings,
            display_mode: DisplayMode::Windowed,
            new_control_system: true,
            show_tooltips: true,
            player_name: String::new(),
        }
    }
}

impl Options {
    /// Loads the options file; a missing or unreadable file silently falls
    /// back to the defaults (first start, deleted config).
    pub fn load(path: &Path) -> Options {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
                tracing::warn!(?err, "options file unreadable, using defaults");
                Options::default()
            }),
            Err(_) => Options::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let text = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, text).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = std::env::temp_dir().join("knights-options-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("options.json");

        let mut options = Options::default();
        options.player_name = "olaf".into();
        options.display_mode = DisplayMode::Fullscreen;
        options.key_bindings.insert("action".into(), "Enter".into());
        options.save(&path).unwrap();

        let loaded = Options::load(&path);
        assert_eq!(loaded, options);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_gives_defaults() {
        let loaded = Options::load(Path::new("/definitely/not/here.json"));
        assert_eq!(loaded, Options::default());
        assert_eq!(loaded.key_bindings.get("action").unwrap(), "Space");
    }
}
