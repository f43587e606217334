//! MIDI port discovery and connection
//!
//! Uses midir for cross-platform MIDI I/O (ALSA on Linux, CoreMIDI on macOS, WinMM on Windows).
//! Ports are selected by a case-insensitive substring of their name.

use midir::{MidiInput, MidiInputPort, MidiOutput, MidiOutputConnection};

/// Error type for MIDI connection operations
#[derive(Debug, thiserror::Error)]
pub enum MidiConnectionError {
    #[error("Failed to initialize MIDI input: {0}")]
    InputInitError(String),

    #[error("Failed to initialize MIDI output: {0}")]
    OutputInitError(String),

    #[error("No MIDI {0} ports available")]
    NoPorts(&'static str),

    #[error("No MIDI port found matching pattern: {0}")]
    PortNotFound(String),

    #[error("Failed to connect to MIDI port: {0}")]
    ConnectionError(String),
}

/// Index of the first name containing `pattern`, ignoring case
///
/// An empty pattern selects the first port.
pub fn match_port<S: AsRef<str>>(names: &[S], pattern: &str) -> Option<usize> {
    let pattern = pattern.to_lowercase();
    names
        .iter()
        .position(|name| name.as_ref().to_lowercase().contains(&pattern))
}

pub struct MidiConnection;

impl MidiConnection {
    /// Find an input port, returning the MidiInput so the caller can attach a callback
    pub fn find_input_port(port_match: &str) -> Result<(MidiInput, MidiInputPort), MidiConnectionError> {
        let midi_in = MidiInput::new("lyre-midi-in")
            .map_err(|e| MidiConnectionError::InputInitError(e.to_string()))?;

        let ports = midi_in.ports();
        if ports.is_empty() {
            return Err(MidiConnectionError::NoPorts("input"));
        }
        let names: Vec<String> = ports
            .iter()
            .map(|port| midi_in.port_name(port).unwrap_or_default())
            .collect();

        let index = match_port(&names, port_match)
            .ok_or_else(|| MidiConnectionError::PortNotFound(port_match.to_string()))?;
        log::info!("MIDI: Found input port: {}", names[index]);

        let port = ports[index].clone();
        Ok((midi_in, port))
    }

    /// Connect to the first output port matching `port_match`
    pub fn connect_output(port_match: &str) -> Result<MidiOutputConnection, MidiConnectionError> {
        let midi_out = MidiOutput::new("lyre-midi-out")
            .map_err(|e| MidiConnectionError::OutputInitError(e.to_string()))?;

        let ports = midi_out.ports();
        if ports.is_empty() {
            return Err(MidiConnectionError::NoPorts("output"));
        }
        let names: Vec<String> = ports
            .iter()
            .map(|port| midi_out.port_name(port).unwrap_or_default())
            .collect();

        let index = match_port(&names, port_match)
            .ok_or_else(|| MidiConnectionError::PortNotFound(port_match.to_string()))?;
        log::info!("MIDI: Found output port: {}", names[index]);

        let connection = midi_out
            .connect(&ports[index], "lyre-synth-output")
            .map_err(|e| MidiConnectionError::ConnectionError(e.to_string()))?;
        log::info!("MIDI: Connected to output port");
        Ok(connection)
    }

    /// List all available MIDI input ports
    pub fn list_input_ports() -> Result<Vec<String>, MidiConnectionError> {
        let midi_in = MidiInput::new("lyre-midi-list")
            .map_err(|e| MidiConnectionError::InputInitError(e.to_string()))?;

        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect())
    }

    /// List all available MIDI output ports
    pub fn list_output_ports() -> Result<Vec<String>, MidiConnectionError> {
        let midi_out = MidiOutput::new("lyre-midi-list")
            .map_err(|e| MidiConnectionError::OutputInitError(e.to_string()))?;

        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|port| midi_out.port_name(port).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_port_ignores_case() {
        let names = ["Midi Through Port-0", "Microsoft GS Wavetable Synth", "FLUID Synth (1234)"];
        assert_eq!(match_port(&names, "fluid"), Some(2));
        assert_eq!(match_port(&names, "wavetable"), Some(1));
        assert_eq!(match_port(&names, ""), Some(0));
        assert_eq!(match_port(&names, "loopMIDI"), None);
    }

    #[test]
    fn test_list_ports() {
        // Port availability depends on the system; enumeration must not panic
        let _input_ports = MidiConnection::list_input_ports();
        let _output_ports = MidiConnection::list_output_ports();
    }
}
