//! Timeline model
//!
//! A `Timeline` is the parsed form of a MIDI file: ordered tracks of notes
//! with metric (wall-clock) start times. Parsing itself lives outside this
//! crate; sessions only ever derive working copies from a loaded timeline
//! and never mutate it.

use std::time::Duration;

/// Kind of a note event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteEventKind {
    On,
    Off,
}

/// A single note-on or note-off message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteEvent {
    pub kind: NoteEventKind,
    /// MIDI channel (0-15)
    pub channel: u8,
    /// MIDI pitch (0-127)
    pub pitch: u8,
    pub velocity: u8,
}

impl NoteEvent {
    pub fn on(channel: u8, pitch: u8, velocity: u8) -> Self {
        Self {
            kind: NoteEventKind::On,
            channel,
            pitch,
            velocity,
        }
    }

    pub fn off(channel: u8, pitch: u8) -> Self {
        Self {
            kind: NoteEventKind::Off,
            channel,
            pitch,
            velocity: 0,
        }
    }

    /// Note On with velocity 0 counts as a release
    pub fn is_release(&self) -> bool {
        match self.kind {
            NoteEventKind::Off => true,
            NoteEventKind::On => self.velocity == 0,
        }
    }
}

/// A note with a start time and a length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub start: Duration,
    pub length: Duration,
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
}

impl Note {
    pub fn new(start: Duration, length: Duration, pitch: u8, velocity: u8) -> Self {
        Self {
            start,
            length,
            channel: 0,
            pitch,
            velocity,
        }
    }

    pub fn end(&self) -> Duration {
        self.start + self.length
    }
}

/// One track of a timeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub name: String,
    pub notes: Vec<Note>,
}

impl Track {
    pub fn new(name: impl Into<String>, notes: Vec<Note>) -> Self {
        Self {
            name: name.into(),
            notes,
        }
    }

    pub fn has_notes(&self) -> bool {
        !self.notes.is_empty()
    }
}

/// A loaded, immutable sequence of tracks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    /// Display title (usually the file stem)
    pub title: String,
    pub tracks: Vec<Track>,
    /// Total duration (end of the last note unless the source says otherwise)
    pub duration: Duration,
}

impl Timeline {
    /// Build a timeline whose duration is the end of its last note
    pub fn new(title: impl Into<String>, tracks: Vec<Track>) -> Self {
        let duration = tracks
            .iter()
            .flat_map(|t| t.notes.iter())
            .map(Note::end)
            .max()
            .unwrap_or_default();

        Self {
            title: title.into(),
            tracks,
            duration,
        }
    }

    /// Derive a working copy containing only the selected tracks
    pub fn select(&self, selection: &TrackSelection) -> Vec<Track> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(i, _)| selection.is_selected(*i))
            .map(|(_, t)| t.clone())
            .collect()
    }

    /// Per-track summaries for presentation layers
    pub fn track_infos(&self, selection: &TrackSelection) -> Vec<TrackInfo> {
        self.tracks
            .iter()
            .enumerate()
            .map(|(index, track)| TrackInfo {
                index,
                name: track.name.clone(),
                note_count: track.notes.len(),
                selected: selection.is_selected(index),
            })
            .collect()
    }
}

/// Checked/unchecked state of every track of the opened timeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackSelection {
    selected: Vec<bool>,
}

impl TrackSelection {
    /// All tracks checked
    pub fn all(track_count: usize) -> Self {
        Self {
            selected: vec![true; track_count],
        }
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.get(index).copied().unwrap_or(false)
    }

    /// Returns false if the index is out of range
    pub fn set(&mut self, index: usize, selected: bool) -> bool {
        match self.selected.get_mut(index) {
            Some(slot) => {
                *slot = selected;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Track summary published with track-list-ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub index: usize,
    pub name: String,
    pub note_count: usize,
    pub selected: bool,
}

/// A note event at an absolute timeline position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    pub time: Duration,
    /// Start of the note this event belongs to
    pub onset: Duration,
    pub event: NoteEvent,
}

impl TimedEvent {
    /// A note-off whose note-on lies before `from` and is not replayed
    pub fn is_orphaned_at(&self, from: Duration) -> bool {
        self.event.is_release() && self.onset < from
    }
}

/// Flatten tracks into a time-ordered event list
///
/// At equal times, releases of sounding notes come before new presses so a
/// repeated pitch is let go before it is struck again. A zero-length note
/// keeps its own NoteOff after its NoteOn.
pub fn flatten(tracks: &[Track]) -> Vec<TimedEvent> {
    // (time, rank, sequence) - rank 0: off of a real note, 1: on, 2: off of a zero-length note
    let mut keyed: Vec<(Duration, u8, usize, TimedEvent)> = Vec::new();

    for note in tracks.iter().flat_map(|t| t.notes.iter()) {
        let seq = keyed.len();
        keyed.push((
            note.start,
            1,
            seq,
            TimedEvent {
                time: note.start,
                onset: note.start,
                event: NoteEvent::on(note.channel, note.pitch, note.velocity),
            },
        ));
        let off_rank = if note.length.is_zero() { 2 } else { 0 };
        keyed.push((
            note.end(),
            off_rank,
            seq + 1,
            TimedEvent {
                time: note.end(),
                onset: note.start,
                event: NoteEvent::off(note.channel, note.pitch),
            },
        ));
    }

    keyed.sort_by_key(|(time, rank, seq, _)| (*time, *rank, *seq));
    keyed.into_iter().map(|(_, _, _, e)| e).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_duration_is_last_note_end() {
        let timeline = Timeline::new(
            "song",
            vec![
                Track::new("a", vec![Note::new(ms(0), ms(500), 60, 100)]),
                Track::new("b", vec![Note::new(ms(1000), ms(250), 64, 100)]),
            ],
        );
        assert_eq!(timeline.duration, ms(1250));
    }

    #[test]
    fn test_select_filters_tracks() {
        let timeline = Timeline::new(
            "song",
            vec![
                Track::new("a", vec![Note::new(ms(0), ms(10), 60, 100)]),
                Track::new("b", vec![Note::new(ms(0), ms(10), 62, 100)]),
            ],
        );
        let mut selection = TrackSelection::all(2);
        assert!(selection.set(0, false));
        assert!(!selection.set(5, false));

        let tracks = timeline.select(&selection);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].name, "b");

        let infos = timeline.track_infos(&selection);
        assert!(!infos[0].selected);
        assert!(infos[1].selected);
        assert_eq!(infos[1].note_count, 1);
    }

    #[test]
    fn test_flatten_orders_release_before_repeat() {
        let track = Track::new(
            "a",
            vec![
                Note::new(ms(0), ms(100), 60, 90),
                Note::new(ms(100), ms(100), 60, 90),
            ],
        );
        let events = flatten(&[track]);
        let kinds: Vec<_> = events.iter().map(|e| (e.time, e.event.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (ms(0), NoteEventKind::On),
                (ms(100), NoteEventKind::Off),
                (ms(100), NoteEventKind::On),
                (ms(200), NoteEventKind::Off),
            ]
        );
    }

    #[test]
    fn test_flatten_zero_length_note_keeps_on_first() {
        let track = Track::new("a", vec![Note::new(ms(50), Duration::ZERO, 72, 80)]);
        let events = flatten(&[track]);
        assert_eq!(events[0].event.kind, NoteEventKind::On);
        assert_eq!(events[1].event.kind, NoteEventKind::Off);
    }

    #[test]
    fn test_release_of_earlier_note_is_orphaned() {
        let track = Track::new(
            "a",
            vec![
                Note::new(ms(0), ms(100), 61, 90),
                Note::new(ms(50), ms(300), 62, 90),
            ],
        );
        let events = flatten(&[track]);
        let orphaned: Vec<_> = events
            .iter()
            .filter(|e| e.is_orphaned_at(ms(30)))
            .map(|e| (e.time, e.event.pitch))
            .collect();
        assert_eq!(orphaned, vec![(ms(100), 61)]);
        // a zero-length note at the start position keeps its release
        let zero = flatten(&[Track::new("b", vec![Note::new(ms(30), Duration::ZERO, 60, 90)])]);
        assert!(zero.iter().all(|e| !e.is_orphaned_at(ms(30))));
    }

    #[test]
    fn test_zero_velocity_note_on_is_release() {
        assert!(NoteEvent::on(0, 60, 0).is_release());
        assert!(NoteEvent::off(0, 60).is_release());
        assert!(!NoteEvent::on(0, 60, 1).is_release());
    }
}
