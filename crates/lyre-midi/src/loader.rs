//! Standard MIDI file loading
//!
//! Parses an SMF with midly and converts it to a `Timeline`: ticks become
//! wall-clock durations through the file's tempo map, NoteOn/NoteOff pairs
//! become notes, and every track with at least one note is kept.

use lyre_core::{Note, Timeline, Track};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::Duration;

/// Tempo until the first Set Tempo event (120 BPM)
const DEFAULT_TEMPO_US: u32 = 500_000;

/// Error type for MIDI file loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read MIDI file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse MIDI file: {0}")]
    Parse(#[from] midly::Error),
}

/// Tick → time conversion for one file
#[derive(Debug, Clone)]
enum TempoMap {
    /// (tick, elapsed microseconds at tick, microseconds per beat) segments
    Metrical {
        ticks_per_beat: u64,
        segments: Vec<(u64, f64, u32)>,
    },
    /// Fixed ticks per second
    Timecode { ticks_per_second: f64 },
}

impl TempoMap {
    fn new(timing: Timing, mut changes: Vec<(u64, u32)>) -> Self {
        match timing {
            Timing::Metrical(ticks_per_beat) => {
                let ticks_per_beat = u64::from(ticks_per_beat.as_int().max(1));
                changes.sort_by_key(|&(tick, _)| tick);

                let mut segments = vec![(0u64, 0.0f64, DEFAULT_TEMPO_US)];
                for (tick, tempo) in changes {
                    let &(last_tick, last_us, last_tempo) = segments.last().unwrap_or(&(0, 0.0, DEFAULT_TEMPO_US));
                    let elapsed = last_us
                        + (tick - last_tick) as f64 * f64::from(last_tempo) / ticks_per_beat as f64;
                    if tick == last_tick {
                        segments.pop();
                    }
                    segments.push((tick, elapsed, tempo));
                }
                Self::Metrical {
                    ticks_per_beat,
                    segments,
                }
            }
            Timing::Timecode(fps, subframes) => Self::Timecode {
                ticks_per_second: (f64::from(fps.as_f32()) * f64::from(subframes)).max(1.0),
            },
        }
    }

    fn to_duration(&self, tick: u64) -> Duration {
        match self {
            Self::Metrical {
                ticks_per_beat,
                segments,
            } => {
                let index = segments.partition_point(|&(t, _, _)| t <= tick).saturating_sub(1);
                let (seg_tick, seg_us, tempo) = segments
                    .get(index)
                    .copied()
                    .unwrap_or((0, 0.0, DEFAULT_TEMPO_US));
                let us = seg_us + (tick - seg_tick) as f64 * f64::from(tempo) / *ticks_per_beat as f64;
                Duration::from_secs_f64(us / 1_000_000.0)
            }
            Self::Timecode { ticks_per_second } => {
                Duration::from_secs_f64(tick as f64 / ticks_per_second)
            }
        }
    }
}

/// Note pairing state for one track
#[derive(Default)]
struct OpenNotes {
    /// (channel, pitch) → start ticks and velocities, oldest first
    open: HashMap<(u8, u8), VecDeque<(u64, u8)>>,
    /// (start tick, end tick, channel, pitch, velocity)
    closed: Vec<(u64, u64, u8, u8, u8)>,
}

impl OpenNotes {
    fn note_on(&mut self, tick: u64, channel: u8, pitch: u8, velocity: u8) {
        self.open
            .entry((channel, pitch))
            .or_default()
            .push_back((tick, velocity));
    }

    fn note_off(&mut self, tick: u64, channel: u8, pitch: u8) {
        let started = self
            .open
            .get_mut(&(channel, pitch))
            .and_then(VecDeque::pop_front);
        match started {
            Some((start, velocity)) => self.closed.push((start, tick, channel, pitch, velocity)),
            None => log::trace!("Loader: NoteOff without NoteOn (ch{} pitch {})", channel, pitch),
        }
    }

    /// Close whatever is still sounding at `end`
    fn finish(mut self, end: u64) -> Vec<(u64, u64, u8, u8, u8)> {
        for ((channel, pitch), starts) in self.open.drain() {
            for (start, velocity) in starts {
                self.closed.push((start, end, channel, pitch, velocity));
            }
        }
        self.closed.sort_by_key(|&(start, _, channel, pitch, _)| (start, pitch, channel));
        self.closed
    }
}

/// Parse SMF bytes into a timeline titled `title`
pub fn parse_midi(title: &str, bytes: &[u8]) -> Result<Timeline, LoadError> {
    let smf = Smf::parse(bytes)?;

    // tempo events may live on any track (usually the first)
    let mut tempo_changes = Vec::new();
    for events in &smf.tracks {
        let mut tick = 0u64;
        for event in events {
            tick += u64::from(event.delta.as_int());
            if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                tempo_changes.push((tick, tempo.as_int()));
            }
        }
    }
    let tempo = TempoMap::new(smf.header.timing, tempo_changes);

    let mut tracks = Vec::new();
    for (index, events) in smf.tracks.iter().enumerate() {
        let mut name = None;
        let mut notes = OpenNotes::default();
        let mut tick = 0u64;

        for event in events {
            tick += u64::from(event.delta.as_int());
            match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            notes.note_on(tick, channel, key.as_int(), vel.as_int())
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            notes.note_off(tick, channel, key.as_int())
                        }
                        _ => {}
                    }
                }
                TrackEventKind::Meta(MetaMessage::TrackName(raw)) if name.is_none() => {
                    let text = String::from_utf8_lossy(raw).trim().to_string();
                    if !text.is_empty() {
                        name = Some(text);
                    }
                }
                _ => {}
            }
        }

        let notes: Vec<Note> = notes
            .finish(tick)
            .into_iter()
            .map(|(start, end, channel, pitch, velocity)| {
                let start_time = tempo.to_duration(start);
                Note {
                    start: start_time,
                    length: tempo.to_duration(end).saturating_sub(start_time),
                    channel,
                    pitch,
                    velocity,
                }
            })
            .collect();

        if notes.is_empty() {
            continue;
        }
        let name = name.unwrap_or_else(|| format!("Track {}", index + 1));
        tracks.push(Track::new(name, notes));
    }

    let timeline = Timeline::new(title, tracks);
    log::info!(
        "Loader: '{}' has {} tracks, duration {:?}",
        timeline.title,
        timeline.tracks.len(),
        timeline.duration
    );
    Ok(timeline)
}

/// Load a MIDI file; the title is the file stem
pub fn load_midi_file(path: &Path) -> Result<Timeline, LoadError> {
    log::info!("Loader: Loading {:?}", path);
    let bytes = std::fs::read(path)?;
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse_midi(&title, &bytes)
}
