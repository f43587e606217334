//! Note transpose mapper
//!
//! Maps an arbitrary MIDI pitch onto the sparse key set of a layout. The
//! mapping is a pure function of its arguments.

use crate::layout::{KeyId, KeyLayout};
use crate::timeline::Note;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Upper bound on semitone probing for `Up`/`Down`
pub const MAX_PROBE_SEMITONES: i32 = 12;

/// What to do with pitches the layout cannot play
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransposePolicy {
    /// No decision made yet; direct lookup only
    #[default]
    None,
    /// Snap to the nearest playable semitone above
    Up,
    /// Snap to the nearest playable semitone below
    Down,
    /// Direct lookup only; unplayable notes are skipped
    Ignore,
}

impl TransposePolicy {
    /// True once a user decision has been recorded
    pub fn is_decided(&self) -> bool {
        !matches!(self, TransposePolicy::None)
    }
}

/// Result of mapping a single pitch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapped {
    Playable { pitch: i32, key: KeyId },
    Unplayable,
}

impl Mapped {
    pub fn key(&self) -> Option<&KeyId> {
        match self {
            Mapped::Playable { key, .. } => Some(key),
            Mapped::Unplayable => None,
        }
    }

    pub fn is_playable(&self) -> bool {
        matches!(self, Mapped::Playable { .. })
    }
}

/// Map a raw pitch to a playable key
pub fn map(pitch: i32, offset: i32, policy: TransposePolicy, layout: &KeyLayout) -> Mapped {
    let shifted = pitch - offset;

    if let Some(key) = layout.key_for(shifted) {
        return Mapped::Playable {
            pitch: shifted,
            key: key.clone(),
        };
    }

    let step = match policy {
        TransposePolicy::None | TransposePolicy::Ignore => return Mapped::Unplayable,
        TransposePolicy::Up => 1,
        TransposePolicy::Down => -1,
    };

    (1..=MAX_PROBE_SEMITONES)
        .map(|distance| shifted + step * distance)
        .find_map(|candidate| {
            layout.key_for(candidate).map(|key| Mapped::Playable {
                pitch: candidate,
                key: key.clone(),
            })
        })
        .unwrap_or(Mapped::Unplayable)
}

/// Offset + policy + layout bundled for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteMapping {
    pub layout: KeyLayout,
    pub offset: i32,
    pub policy: TransposePolicy,
}

impl NoteMapping {
    pub fn new(layout: KeyLayout, offset: i32, policy: TransposePolicy) -> Self {
        Self {
            layout,
            offset,
            policy,
        }
    }

    pub fn map(&self, pitch: u8) -> Mapped {
        map(pitch as i32, self.offset, self.policy, &self.layout)
    }
}

/// Distinct pitches among `notes` that the mapping cannot play
pub fn scan_unplayable<'a>(
    notes: impl IntoIterator<Item = &'a Note>,
    mapping: &NoteMapping,
) -> BTreeSet<u8> {
    notes
        .into_iter()
        .map(|n| n.pitch)
        .filter(|&p| !mapping.map(p).is_playable())
        .collect()
}
