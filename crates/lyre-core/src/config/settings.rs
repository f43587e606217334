//! Player settings consumed by the transport and dispatcher

use crate::playlist::LoopMode;
use crate::transpose::TransposePolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Slowest accepted playback speed
pub const MIN_SPEED: f64 = 0.1;
/// Fastest accepted playback speed
pub const MAX_SPEED: f64 = 4.0;

/// Options recognized by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    /// Collapse notes starting within `merge_tolerance_ms` into chords
    pub merge_notes: bool,
    pub merge_tolerance_ms: u64,
    /// Policy for pitches the layout cannot play
    pub transpose_policy: TransposePolicy,
    /// Semitones subtracted from every pitch before lookup
    pub key_offset: i32,
    /// Hold keys for the note's duration instead of tapping them
    pub hold_notes: bool,
    /// Send raw notes to the synthesizer instead of pressing keys
    pub use_synthesizer: bool,
    pub loop_mode: LoopMode,
    /// Playback speed multiplier
    pub speed: f64,
    /// Key layout id (see `LayoutTable`)
    pub layout: String,
    /// Wait after bringing the target window forward before checking focus
    pub focus_settle_ms: u64,
    /// Position-changed publishing interval
    pub clock_interval_ms: u64,
    /// Past this position "previous" restarts the current timeline
    pub restart_threshold_ms: u64,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            merge_notes: false,
            merge_tolerance_ms: 20,
            transpose_policy: TransposePolicy::None,
            key_offset: 0,
            hold_notes: false,
            use_synthesizer: false,
            loop_mode: LoopMode::None,
            speed: 1.0,
            layout: "lyre-qwerty".to_string(),
            focus_settle_ms: 100,
            clock_interval_ms: 50,
            restart_threshold_ms: 3000,
        }
    }
}

impl PlayerSettings {
    pub fn merge_tolerance(&self) -> Duration {
        Duration::from_millis(self.merge_tolerance_ms)
    }

    pub fn focus_settle(&self) -> Duration {
        Duration::from_millis(self.focus_settle_ms)
    }

    /// Never zero, so the clock thread cannot spin
    pub fn clock_interval(&self) -> Duration {
        Duration::from_millis(self.clock_interval_ms.max(1))
    }

    pub fn restart_threshold(&self) -> Duration {
        Duration::from_millis(self.restart_threshold_ms)
    }

    /// Speed limited to `MIN_SPEED..=MAX_SPEED`; NaN falls back to 1.0
    pub fn clamped_speed(&self) -> f64 {
        clamp_speed(self.speed)
    }
}

pub(crate) fn clamp_speed(speed: f64) -> f64 {
    if speed.is_nan() {
        1.0
    } else {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    }
}
