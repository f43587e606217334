//! Instrument key layouts
//!
//! A layout maps the MIDI pitches an instrument can produce to the keyboard
//! key that triggers each of them. Layouts are read-only configuration data:
//! the built-in table covers the 21-key lyre on common keyboard layouts plus
//! the vintage lyre, and extra layouts can be loaded from YAML.

use crate::error::LayoutError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Identifier of a key on the target application's keyboard (e.g. "q", ",")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub String);

impl KeyId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed pitch → key lookup for one instrument variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLayout {
    /// Stable identifier used in settings (e.g. "lyre-qwerty")
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Playable pitches and their keys
    pub keys: BTreeMap<i32, KeyId>,
}

impl KeyLayout {
    /// Build a layout from parallel pitch and key lists
    pub fn from_pairs(id: &str, name: &str, pitches: &[i32], keys: &[&str]) -> Self {
        let keys = pitches
            .iter()
            .zip(keys.iter())
            .map(|(&pitch, &key)| (pitch, KeyId::new(key)))
            .collect();

        Self {
            id: id.to_string(),
            name: name.to_string(),
            keys,
        }
    }

    /// Key bound to the pitch, if the instrument can play it
    pub fn key_for(&self, pitch: i32) -> Option<&KeyId> {
        self.keys.get(&pitch)
    }

    pub fn contains(&self, pitch: i32) -> bool {
        self.keys.contains_key(&pitch)
    }

    /// Lowest and highest playable pitch
    pub fn range(&self) -> Option<(i32, i32)> {
        let low = *self.keys.keys().next()?;
        let high = *self.keys.keys().next_back()?;
        Some((low, high))
    }
}

/// C major over three octaves, low row first
const LYRE_PITCHES: [i32; 21] = [
    48, 50, 52, 53, 55, 57, 59, //
    60, 62, 64, 65, 67, 69, 71, //
    72, 74, 76, 77, 79, 81, 83,
];

/// C Dorian over three octaves (C D Eb F G A Bb)
const VINTAGE_LYRE_PITCHES: [i32; 21] = [
    48, 50, 51, 53, 55, 57, 58, //
    60, 62, 63, 65, 67, 69, 70, //
    72, 74, 75, 77, 79, 81, 82,
];

const QWERTY_KEYS: [&str; 21] = [
    "z", "x", "c", "v", "b", "n", "m", //
    "a", "s", "d", "f", "g", "h", "j", //
    "q", "w", "e", "r", "t", "y", "u",
];

const QWERTZ_KEYS: [&str; 21] = [
    "y", "x", "c", "v", "b", "n", "m", //
    "a", "s", "d", "f", "g", "h", "j", //
    "q", "w", "e", "r", "t", "z", "u",
];

const AZERTY_KEYS: [&str; 21] = [
    "w", "x", "c", "v", "b", "n", ",", //
    "q", "s", "d", "f", "g", "h", "j", //
    "a", "z", "e", "r", "t", "y", "u",
];

const DVORAK_KEYS: [&str; 21] = [
    ";", "q", "j", "k", "x", "b", "m", //
    "a", "o", "e", "u", "i", "d", "h", //
    "'", ",", ".", "p", "y", "f", "g",
];

const COLEMAK_KEYS: [&str; 21] = [
    "z", "x", "c", "v", "b", "k", "m", //
    "a", "r", "s", "t", "d", "h", "n", //
    "q", "w", "f", "p", "g", "j", "l",
];

/// File format for extra layouts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct LayoutFile {
    layouts: Vec<KeyLayout>,
}

/// Table of selectable layouts, keyed by id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutTable {
    layouts: Vec<KeyLayout>,
}

impl LayoutTable {
    /// The built-in layouts
    pub fn builtin() -> Self {
        Self {
            layouts: vec![
                KeyLayout::from_pairs("lyre-qwerty", "Windsong Lyre (QWERTY)", &LYRE_PITCHES, &QWERTY_KEYS),
                KeyLayout::from_pairs("lyre-qwertz", "Windsong Lyre (QWERTZ)", &LYRE_PITCHES, &QWERTZ_KEYS),
                KeyLayout::from_pairs("lyre-azerty", "Windsong Lyre (AZERTY)", &LYRE_PITCHES, &AZERTY_KEYS),
                KeyLayout::from_pairs("lyre-dvorak", "Windsong Lyre (DVORAK)", &LYRE_PITCHES, &DVORAK_KEYS),
                KeyLayout::from_pairs("lyre-colemak", "Windsong Lyre (Colemak)", &LYRE_PITCHES, &COLEMAK_KEYS),
                KeyLayout::from_pairs("vintage-lyre", "Vintage Lyre (QWERTY)", &VINTAGE_LYRE_PITCHES, &QWERTY_KEYS),
            ],
        }
    }

    /// Parse a YAML layout table
    pub fn from_yaml(contents: &str) -> Result<Self, LayoutError> {
        let file: LayoutFile = serde_yaml::from_str(contents)?;
        for layout in &file.layouts {
            if layout.keys.is_empty() {
                return Err(LayoutError::EmptyLayout(layout.id.clone()));
            }
        }
        Ok(Self {
            layouts: file.layouts,
        })
    }

    /// Load a YAML layout table from disk
    pub fn load_yaml(path: &Path) -> Result<Self, LayoutError> {
        log::info!("LayoutTable: Loading layouts from {:?}", path);
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Add layouts from another table, replacing ones with the same id
    pub fn extend(&mut self, other: LayoutTable) {
        for layout in other.layouts {
            match self.layouts.iter_mut().find(|l| l.id == layout.id) {
                Some(existing) => {
                    log::debug!("LayoutTable: Replacing layout '{}'", layout.id);
                    *existing = layout;
                }
                None => self.layouts.push(layout),
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<&KeyLayout, LayoutError> {
        self.layouts
            .iter()
            .find(|l| l.id == id)
            .ok_or_else(|| LayoutError::UnknownLayout(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.layouts.iter().map(|l| l.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

impl Default for LayoutTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_layouts_have_21_keys() {
        let table = LayoutTable::builtin();
        for id in table.ids() {
            let layout = table.get(id).unwrap();
            assert_eq!(layout.keys.len(), 21, "layout {}", id);
        }
    }

    #[test]
    fn test_qwerty_lookup() {
        let table = LayoutTable::builtin();
        let layout = table.get("lyre-qwerty").unwrap();
        assert_eq!(layout.key_for(60), Some(&KeyId::new("a")));
        assert_eq!(layout.key_for(83), Some(&KeyId::new("u")));
        assert_eq!(layout.key_for(61), None);
        assert_eq!(layout.key_for(-5), None);
        assert_eq!(layout.range(), Some((48, 83)));
    }

    #[test]
    fn test_vintage_lyre_has_flats() {
        let table = LayoutTable::builtin();
        let layout = table.get("vintage-lyre").unwrap();
        assert!(layout.contains(63));
        assert!(!layout.contains(64));
    }

    #[test]
    fn test_unknown_layout() {
        let table = LayoutTable::builtin();
        assert!(matches!(
            table.get("harp"),
            Err(LayoutError::UnknownLayout(id)) if id == "harp"
        ));
    }

    #[test]
    fn test_yaml_layouts_extend_builtin() {
        let yaml = r#"
layouts:
  - id: "drum"
    name: "Drum"
    keys:
      36: "k"
      38: "l"
  - id: "lyre-qwerty"
    name: "Custom lyre"
    keys:
      60: "p"
"#;
        let mut table = LayoutTable::builtin();
        let before = table.len();
        table.extend(LayoutTable::from_yaml(yaml).unwrap());

        assert_eq!(table.len(), before + 1);
        assert_eq!(table.get("drum").unwrap().key_for(38), Some(&KeyId::new("l")));
        assert_eq!(table.get("lyre-qwerty").unwrap().name, "Custom lyre");
    }

    #[test]
    fn test_yaml_rejects_empty_layout() {
        let yaml = r#"
layouts:
  - id: "empty"
    name: "Empty"
    keys: {}
"#;
        assert!(matches!(
            LayoutTable::from_yaml(yaml),
            Err(LayoutError::EmptyLayout(_))
        ));
    }
}
