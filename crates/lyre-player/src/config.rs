//! Player configuration for lyre-player
//!
//! Stored as YAML in the user's config directory.
//! Default location: ~/.config/lyre-player/config.yaml

use lyre_core::config::default_config_path as config_file_path;
use lyre_core::PlayerSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const CONFIG_FILE: &str = "config.yaml";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Engine options (merge, transpose, output, loop, speed)
    pub settings: PlayerSettings,
    pub midi: MidiConfig,
}

/// MIDI device section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Substring of the synthesizer output port name
    pub synth_port: String,
    /// Substring of a MIDI input port whose notes are played live
    pub input_port: Option<String>,
    /// Extra key layouts (YAML) merged over the built-in ones
    pub layouts_path: Option<PathBuf>,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            // matches "FLUID Synth" and "Microsoft GS Wavetable Synth"
            synth_port: "synth".to_string(),
            input_port: None,
            layouts_path: None,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    config_file_path(CONFIG_FILE)
}
