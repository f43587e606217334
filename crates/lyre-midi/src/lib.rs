//! MIDI devices and files for the lyre player
//!
//! This crate provides:
//! - MIDI port discovery and connection via midir
//! - Synthesizer output backend (raw notes to a MIDI out port)
//! - Live MIDI input forwarding notes into the engine
//! - Standard MIDI file loading via midly, with tempo-map conversion
//!
//! # Architecture
//!
//! ```text
//! .mid file → midly → Timeline ─────────────► EngineHandle::open
//! MIDI keyboard → midir callback → NoteEvent ─► LiveInput::note
//! engine Dispatcher → SynthOutputHandler → midir → synthesizer
//! ```

mod connection;
mod input;
mod loader;
mod output;

pub use connection::{match_port, MidiConnection, MidiConnectionError};
pub use input::{parse_note, LiveInputHandler};
pub use loader::{load_midi_file, parse_midi, LoadError};
pub use output::{encode_note, SynthOutputHandler};
