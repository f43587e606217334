//! Playback session
//!
//! One built instantiation of (timeline, track selection, settings). The
//! session owns the derived working copy, its flattened event list, the
//! playback clock and, while playing, the worker and clock-watcher threads.
//! Dropping a session joins those threads.

use crate::clock::{ClockWatcher, PlaybackClock};
use crate::config::PlayerSettings;
use crate::merge::merge_all;
use crate::messages::EngineMessage;
use crate::timeline::{flatten, TimedEvent, Timeline, Track, TrackSelection};
use crate::transpose::{scan_unplayable, NoteMapping};
use crate::worker::{PlaybackWorker, RunParams};
use flume::Sender;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Threads alive while the session plays
struct Running {
    run: u64,
    _worker: PlaybackWorker,
    _watcher: ClockWatcher,
}

pub struct PlaybackSession {
    timeline: Arc<Timeline>,
    tracks: Vec<Track>,
    events: Arc<[TimedEvent]>,
    mapping: NoteMapping,
    clock: PlaybackClock,
    loop_track: bool,
    running: Option<Running>,
}

/// A freshly built session and the pitches it cannot map
pub struct BuiltSession {
    pub session: PlaybackSession,
    pub unplayable: BTreeSet<u8>,
}

impl PlaybackSession {
    /// Derive the working copy and validate it against the mapping
    ///
    /// The loaded timeline is never modified: with merging disabled the
    /// working copy is simply the selected tracks again.
    pub fn build(
        timeline: Arc<Timeline>,
        selection: &TrackSelection,
        settings: &PlayerSettings,
        mapping: NoteMapping,
    ) -> BuiltSession {
        let selected = timeline.select(selection);
        let tracks = if settings.merge_notes {
            merge_all(&selected, settings.merge_tolerance())
        } else {
            selected
        };

        let unplayable = scan_unplayable(tracks.iter().flat_map(|t| t.notes.iter()), &mapping);
        let events: Arc<[TimedEvent]> = flatten(&tracks).into();

        log::info!(
            "Session: built '{}' ({} tracks, {} events, {} unplayable pitches)",
            timeline.title,
            tracks.len(),
            events.len(),
            unplayable.len()
        );

        BuiltSession {
            session: Self {
                timeline,
                tracks,
                events,
                mapping,
                clock: PlaybackClock::new(settings.clamped_speed()),
                loop_track: false,
                running: None,
            },
            unplayable,
        }
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn mapping(&self) -> &NoteMapping {
        &self.mapping
    }

    pub fn has_notes(&self) -> bool {
        self.tracks.iter().any(Track::has_notes)
    }

    pub fn duration(&self) -> Duration {
        self.timeline.duration
    }

    /// Current position, never past the end
    pub fn position(&self) -> Duration {
        self.clock.position().min(self.duration())
    }

    /// Move to a position, clamped to `[0, duration]`
    pub fn set_position(&mut self, position: Duration) -> Duration {
        let clamped = position.min(self.duration());
        self.clock.set_position(clamped);
        clamped
    }

    pub fn speed(&self) -> f64 {
        self.clock.speed()
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.clock.set_speed(speed);
    }

    pub fn loop_track(&self) -> bool {
        self.loop_track
    }

    pub fn set_loop_track(&mut self, loop_track: bool) {
        self.loop_track = loop_track;
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Run id of the active playback threads
    pub fn run(&self) -> Option<u64> {
        self.running.as_ref().map(|r| r.run)
    }

    /// Start emitting from the current position
    pub fn start(&mut self, run: u64, clock_interval: Duration, engine_tx: &Sender<EngineMessage>) {
        self.halt();

        let params = RunParams {
            run,
            from: self.position(),
            end: self.duration(),
            speed: self.clock.speed(),
        };
        let worker = PlaybackWorker::spawn(self.events.clone(), params, engine_tx.clone());
        let watcher = ClockWatcher::spawn(clock_interval, run, engine_tx.clone());

        self.clock.start();
        self.running = Some(Running {
            run,
            _worker: worker,
            _watcher: watcher,
        });
    }

    /// Stop the threads and freeze the clock
    ///
    /// Returns once both threads have exited, so nothing of this run is
    /// emitted afterwards.
    pub fn halt(&mut self) {
        self.clock.halt();
        self.running.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::KeyLayout;
    use crate::timeline::Note;
    use crate::transpose::TransposePolicy;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn timeline() -> Arc<Timeline> {
        Arc::new(Timeline::new(
            "song",
            vec![
                Track::new(
                    "melody",
                    vec![Note::new(ms(0), ms(100), 60, 100), Note::new(ms(10), ms(100), 64, 100)],
                ),
                Track::new("bass", vec![Note::new(ms(0), ms(200), 37, 100)]),
            ],
        ))
    }

    fn mapping() -> NoteMapping {
        let layout = KeyLayout::from_pairs("t", "T", &[60, 62, 64], &["a", "s", "d"]);
        NoteMapping::new(layout, 0, TransposePolicy::None)
    }

    #[test]
    fn test_build_reports_unplayable_of_selected_tracks() {
        let built = PlaybackSession::build(
            timeline(),
            &TrackSelection::all(2),
            &PlayerSettings::default(),
            mapping(),
        );
        assert_eq!(built.unplayable.into_iter().collect::<Vec<_>>(), vec![37]);

        let mut selection = TrackSelection::all(2);
        selection.set(1, false);
        let built =
            PlaybackSession::build(timeline(), &selection, &PlayerSettings::default(), mapping());
        assert!(built.unplayable.is_empty());
        assert_eq!(built.session.events().len(), 4);
    }

    #[test]
    fn test_build_merges_when_enabled() {
        let settings = PlayerSettings {
            merge_notes: true,
            merge_tolerance_ms: 50,
            ..PlayerSettings::default()
        };
        let loaded = timeline();
        let built = PlaybackSession::build(loaded.clone(), &TrackSelection::all(2), &settings, mapping());

        let melody = &built.session.tracks()[0];
        assert!(melody.notes.iter().all(|n| n.start == ms(0)));
        // the loaded timeline keeps its original start
        assert_eq!(loaded.tracks[0].notes[1].start, ms(10));
    }

    #[test]
    fn test_seek_is_clamped() {
        let mut built = PlaybackSession::build(
            timeline(),
            &TrackSelection::all(2),
            &PlayerSettings::default(),
            mapping(),
        );
        assert_eq!(built.session.set_position(ms(5000)), ms(200));
        assert_eq!(built.session.position(), ms(200));
    }
}
