//! Console front end
//!
//! Key output goes to stdout instead of a game window, which makes the
//! player usable as a dry run of what would be pressed. Line commands on
//! stdin drive the transport.

use lyre_core::{ControlCommand, FocusTarget, KeyId, KeyInjector, LoopMode, SinkError, TransposePolicy};
use std::io::Write;
use std::time::Duration;

/// Prints key actions instead of injecting them
pub struct ConsoleKeys;

impl ConsoleKeys {
    fn emit(action: &str, key: &KeyId) -> Result<(), SinkError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{} {}", action, key).map_err(|e| SinkError::KeyInjection {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

impl KeyInjector for ConsoleKeys {
    fn press_key(&mut self, key: &KeyId) -> Result<(), SinkError> {
        Self::emit("press", key)
    }

    fn hold_key(&mut self, key: &KeyId) -> Result<(), SinkError> {
        Self::emit("hold", key)
    }

    fn release_key(&mut self, key: &KeyId) -> Result<(), SinkError> {
        Self::emit("release", key)
    }
}

/// The console is always in front
pub struct ConsoleFocus;

impl FocusTarget for ConsoleFocus {
    fn ensure_foreground(&mut self) -> bool {
        true
    }

    fn is_focused(&mut self) -> bool {
        true
    }
}

/// A parsed stdin line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Control(ControlCommand),
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  p | play          play / pause
  s | stop          stop and rewind
  n | next          next file
  b | prev          previous file (restarts after 3s)
  seek <seconds>    jump to a position
  speed <factor>    playback speed (0.1 - 4.0)
  loop none|list|track
  track <n> on|off  select or deselect a track (1-based)
  up | down | ignore  transpose policy for unplayable notes
  q | quit";

/// Parse one line of console input
pub fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let mut words = line.split_whitespace();
    let command = words.next()?.to_lowercase();
    let arg = words.next();

    let control = match (command.as_str(), arg) {
        ("p" | "play", None) => ControlCommand::PlayPause,
        ("s" | "stop", None) => ControlCommand::Stop,
        ("n" | "next", None) => ControlCommand::Next,
        ("b" | "prev" | "previous", None) => ControlCommand::Previous,
        ("seek", Some(secs)) => {
            let secs: f64 = secs.parse().ok()?;
            if !secs.is_finite() || secs < 0.0 {
                return None;
            }
            ControlCommand::Seek(Duration::from_secs_f64(secs))
        }
        ("speed", Some(speed)) => ControlCommand::SetSpeed(speed.parse().ok()?),
        ("loop", Some(mode)) => ControlCommand::SetLoopMode(match mode {
            "none" => LoopMode::None,
            "list" => LoopMode::List,
            "track" => LoopMode::Track,
            _ => return None,
        }),
        ("track", Some(index)) => {
            let index: usize = index.parse().ok()?;
            let selected = match words.next()? {
                "on" => true,
                "off" => false,
                _ => return None,
            };
            ControlCommand::SetTrackSelected {
                index: index.checked_sub(1)?,
                selected,
            }
        }
        ("up", None) => ControlCommand::ResolvePolicy(TransposePolicy::Up),
        ("down", None) => ControlCommand::ResolvePolicy(TransposePolicy::Down),
        ("ignore", None) => ControlCommand::ResolvePolicy(TransposePolicy::Ignore),
        ("h" | "help" | "?", None) => return Some(ConsoleCommand::Help),
        ("q" | "quit" | "exit", None) => return Some(ConsoleCommand::Quit),
        _ => return None,
    };
    Some(ConsoleCommand::Control(control))
}
