//! Synthesizer output over a MIDI out port
//!
//! Notes are forwarded unchanged: the synthesizer is chromatic, so pitch and
//! velocity go out exactly as they were scheduled.

use crate::connection::{MidiConnection, MidiConnectionError};
use lyre_core::{NoteEvent, NoteEventKind, SinkError, SynthOutput};
use midir::MidiOutputConnection;

/// Controller number of "All Notes Off"
const ALL_NOTES_OFF: u8 = 123;

/// Raw bytes of a note event
pub fn encode_note(event: &NoteEvent) -> [u8; 3] {
    let channel = event.channel & 0x0F;
    let pitch = event.pitch & 0x7F;
    match event.kind {
        NoteEventKind::On => [0x90 | channel, pitch, event.velocity & 0x7F],
        NoteEventKind::Off => [0x80 | channel, pitch, 0],
    }
}

/// Synthesizer sink backend writing to a MIDI output connection
pub struct SynthOutputHandler {
    connection: MidiOutputConnection,
}

impl SynthOutputHandler {
    pub fn new(connection: MidiOutputConnection) -> Self {
        Self { connection }
    }

    /// Open the first output port whose name contains `port_match`
    pub fn connect(port_match: &str) -> Result<Self, MidiConnectionError> {
        MidiConnection::connect_output(port_match).map(Self::new)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.connection
            .send(bytes)
            .map_err(|e| SinkError::Synthesizer(e.to_string()))
    }
}

impl SynthOutput for SynthOutputHandler {
    fn send_note(&mut self, event: &NoteEvent) -> Result<(), SinkError> {
        log::trace!("MIDI: {:?} ch{} pitch {}", event.kind, event.channel, event.pitch);
        self.send(&encode_note(event))
    }
}

impl Drop for SynthOutputHandler {
    fn drop(&mut self) {
        for channel in 0..16u8 {
            if let Err(e) = self.send(&[0xB0 | channel, ALL_NOTES_OFF, 0]) {
                log::warn!("MIDI: All notes off failed: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_note_on() {
        assert_eq!(encode_note(&NoteEvent::on(2, 60, 100)), [0x92, 60, 100]);
    }

    #[test]
    fn test_encode_note_off() {
        assert_eq!(encode_note(&NoteEvent::off(15, 72)), [0x8F, 72, 0]);
    }

    #[test]
    fn test_encode_masks_out_of_range_values() {
        assert_eq!(encode_note(&NoteEvent::on(17, 200, 255)), [0x91, 72, 127]);
    }
}
