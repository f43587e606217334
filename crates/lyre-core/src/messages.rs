//! Messages in and out of the engine task
//!
//! ```text
//! EngineHandle ──ControlCommand──┐
//! ClockWatcher ──ClockTick───────┼──► engine task (owns Transport) ──PlayerEvent──► UI
//! PlaybackWorker ─NoteDue/Finished┘
//! ```
//!
//! Producers never call into the transport; they only send these values.

use crate::config::PlayerSettings;
use crate::playlist::LoopMode;
use crate::timeline::{NoteEvent, Timeline, TrackInfo};
use crate::transpose::TransposePolicy;
use crate::transport::TransportState;
use std::sync::Arc;
use std::time::Duration;

/// Everything the engine task consumes
#[derive(Debug)]
pub enum EngineMessage {
    /// A request from the control side; `ack` is signalled once handled
    Control {
        command: ControlCommand,
        ack: Option<flume::Sender<()>>,
    },
    /// Periodic tick from the clock watcher
    ClockTick { run: u64 },
    /// A scheduled note event from the playback worker
    NoteDue { run: u64, event: NoteEvent },
    /// The playback worker reached the end of the timeline
    Finished { run: u64 },
}

impl EngineMessage {
    pub fn control(command: ControlCommand) -> Self {
        Self::Control { command, ack: None }
    }
}

/// Control requests
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Append a timeline to the playlist without opening it
    Enqueue(Arc<Timeline>),
    /// Open a timeline (added to the playlist if missing)
    Open(Arc<Timeline>),
    /// Remove a timeline from the playlist, closing it if opened
    Remove(Arc<Timeline>),
    /// Close the opened timeline
    Close,
    /// Check or uncheck a track of the opened timeline
    SetTrackSelected { index: usize, selected: bool },
    /// Replace the settings; rebuilds the session
    UpdateSettings(PlayerSettings),
    /// Answer to `PlayerEvent::UnplayableNotes`
    ResolvePolicy(TransposePolicy),
    PlayPause,
    Play,
    Pause,
    Stop,
    /// Start if a session is ready and not running (play timer)
    PlayIfIdle,
    /// Move the play position; clamped to the timeline
    Seek(Duration),
    SetSpeed(f64),
    SetLoopMode(LoopMode),
    Next,
    Previous,
    /// A note from a live MIDI input
    LiveNote(NoteEvent),
    Shutdown,
}

/// Derived flags published on every transition
#[derive(Debug, Clone, PartialEq)]
pub struct TransportStatus {
    pub state: TransportState,
    pub position: Duration,
    pub duration: Duration,
    pub can_play: bool,
    pub can_next: bool,
    pub can_previous: bool,
    /// Title of the opened timeline
    pub title: Option<String>,
    /// e.g. "Playing 2/5 01:23"
    pub display: Option<String>,
}

/// Notifications for presentation layers
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    PositionChanged(Duration),
    StateChanged(TransportState),
    TrackListReady(Vec<TrackInfo>),
    /// The session waits for `ResolvePolicy`
    UnplayableNotes { pitches: Vec<u8> },
    /// The synthesizer cannot be used for the rest of the process
    SynthesizerUnavailable { reason: String },
    /// A sink call failed; the transport stopped
    DispatchFailed { reason: String },
    Status(TransportStatus),
}

/// Format a position as mm:ss
pub fn format_position(position: Duration) -> String {
    let secs = position.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(Duration::from_millis(83_900)), "01:23");
        assert_eq!(format_position(Duration::ZERO), "00:00");
        assert_eq!(format_position(Duration::from_secs(3600)), "60:00");
    }
}
