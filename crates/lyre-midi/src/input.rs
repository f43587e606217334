//! Live MIDI input
//!
//! Receives raw MIDI bytes from the midir callback and forwards note
//! messages as `NoteEvent`s. Everything else (CC, pitch bend, clock) is
//! ignored.

use crate::connection::{MidiConnection, MidiConnectionError};
use lyre_core::NoteEvent;
use midir::MidiInputConnection;

/// Parse a raw note message
///
/// - Note Off: 0x8n nn vv
/// - Note On:  0x9n nn vv (velocity 0 is a release)
pub fn parse_note(data: &[u8]) -> Option<NoteEvent> {
    let &[status, pitch, velocity, ..] = data else {
        return None;
    };
    let channel = status & 0x0F;

    match status & 0xF0 {
        0x80 => Some(NoteEvent::off(channel, pitch)),
        0x90 if velocity == 0 => Some(NoteEvent::off(channel, pitch)),
        0x90 => Some(NoteEvent::on(channel, pitch, velocity)),
        _ => None,
    }
}

type NoteCallback = Box<dyn FnMut(NoteEvent) + Send>;

/// Owns the midir input connection for its lifetime
pub struct LiveInputHandler {
    _connection: MidiInputConnection<NoteCallback>,
}

impl LiveInputHandler {
    /// Connect to the first input port matching `port_match`
    ///
    /// `on_note` runs on the MIDI driver thread and must not block.
    pub fn connect(
        port_match: &str,
        on_note: impl FnMut(NoteEvent) + Send + 'static,
    ) -> Result<Self, MidiConnectionError> {
        let (midi_in, port) = MidiConnection::find_input_port(port_match)?;

        let callback: NoteCallback = Box::new(on_note);
        let connection = midi_in
            .connect(&port, "lyre-live-input", Self::midi_callback, callback)
            .map_err(|e| MidiConnectionError::ConnectionError(e.to_string()))?;

        log::info!("MIDI: Live input connected");
        Ok(Self {
            _connection: connection,
        })
    }

    fn midi_callback(_timestamp: u64, data: &[u8], on_note: &mut NoteCallback) {
        if let Some(event) = parse_note(data) {
            on_note(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyre_core::NoteEventKind;

    #[test]
    fn test_parse_note_on() {
        let event = parse_note(&[0x90, 0x3C, 0x7F]).unwrap();
        assert_eq!(event, NoteEvent::on(0, 60, 127));
    }

    #[test]
    fn test_parse_note_off() {
        let event = parse_note(&[0x83, 0x3C, 0x40]).unwrap();
        assert_eq!(event.kind, NoteEventKind::Off);
        assert_eq!(event.channel, 3);
        assert_eq!(event.pitch, 60);
    }

    #[test]
    fn test_parse_note_on_zero_velocity() {
        let event = parse_note(&[0x91, 0x3C, 0x00]).unwrap();
        assert_eq!(event, NoteEvent::off(1, 60));
    }

    #[test]
    fn test_ignores_other_messages() {
        assert!(parse_note(&[0xB2, 0x07, 0x64]).is_none());
        assert!(parse_note(&[0xF8]).is_none());
        assert!(parse_note(&[0x90, 0x3C]).is_none());
    }
}
