//! Merge preprocessor
//!
//! Collapses notes that start within a tolerance of each other into one
//! simultaneous group. Each group is anchored at its earliest start; notes
//! join while `start - anchor <= tolerance`, so re-merging a merged track
//! changes nothing.

use crate::timeline::{Note, Track};
use std::time::Duration;

/// Merge near-simultaneous notes of a track
pub fn merge(track: &Track, tolerance: Duration) -> Track {
    let mut notes = track.notes.clone();
    notes.sort_by_key(|n| (n.start, n.pitch, n.channel));

    let mut merged: Vec<Note> = Vec::with_capacity(notes.len());
    let mut group_start = 0usize;

    for note in notes {
        let anchor = merged.get(group_start).map(|n| n.start);
        let joins = anchor.is_some_and(|a| note.start - a <= tolerance);

        if !joins {
            group_start = merged.len();
            merged.push(note);
            continue;
        }

        let anchor = merged[group_start].start;
        let end = note.end();

        match merged[group_start..]
            .iter_mut()
            .find(|n| n.pitch == note.pitch && n.channel == note.channel)
        {
            Some(existing) => {
                let new_end = existing.end().max(end);
                existing.length = new_end - existing.start;
                existing.velocity = existing.velocity.max(note.velocity);
            }
            None => merged.push(Note {
                start: anchor,
                length: end.saturating_sub(anchor),
                ..note
            }),
        }
    }

    merged.sort_by_key(|n| (n.start, n.pitch, n.channel));

    Track {
        name: track.name.clone(),
        notes: merged,
    }
}

/// Merge every track of a working copy
pub fn merge_all(tracks: &[Track], tolerance: Duration) -> Vec<Track> {
    tracks.iter().map(|t| merge(t, tolerance)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_two_close_notes_merge_into_one_group() {
        let track = Track::new(
            "t",
            vec![
                Note::new(ms(110), ms(100), 64, 100),
                Note::new(ms(100), ms(100), 60, 100),
            ],
        );
        let merged = merge(&track, ms(50));

        assert_eq!(merged.notes.len(), 2);
        assert!(merged.notes.iter().all(|n| n.start == ms(100)));
        let pitches: Vec<u8> = merged.notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 64]);
        // end of the later note is preserved
        assert_eq!(merged.notes[1].end(), ms(210));
    }

    #[test]
    fn test_duplicate_pitches_collapse() {
        let track = Track::new(
            "t",
            vec![
                Note::new(ms(0), ms(100), 60, 80),
                Note::new(ms(20), ms(200), 60, 110),
            ],
        );
        let merged = merge(&track, ms(50));

        assert_eq!(merged.notes.len(), 1);
        assert_eq!(merged.notes[0].start, ms(0));
        assert_eq!(merged.notes[0].end(), ms(220));
        assert_eq!(merged.notes[0].velocity, 110);
    }

    #[test]
    fn test_notes_outside_tolerance_stay_apart() {
        let track = Track::new(
            "t",
            vec![
                Note::new(ms(0), ms(10), 60, 100),
                Note::new(ms(40), ms(10), 62, 100),
                Note::new(ms(80), ms(10), 64, 100),
            ],
        );
        let merged = merge(&track, ms(50));
        let starts: Vec<Duration> = merged.notes.iter().map(|n| n.start).collect();
        // 80ms is 80 past the anchor at 0, so it starts a new group
        assert_eq!(starts, vec![ms(0), ms(0), ms(80)]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let track = Track::new(
            "t",
            vec![
                Note::new(ms(0), ms(30), 60, 100),
                Note::new(ms(15), ms(30), 62, 100),
                Note::new(ms(30), ms(30), 60, 90),
                Note::new(ms(55), ms(30), 64, 100),
                Note::new(ms(90), ms(30), 65, 100),
                Note::new(ms(100), ms(5), 67, 100),
            ],
        );
        let once = merge(&track, ms(30));
        let twice = merge(&once, ms(30));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_zero_tolerance_only_merges_identical_starts() {
        let track = Track::new(
            "t",
            vec![
                Note::new(ms(0), ms(10), 60, 100),
                Note::new(ms(0), ms(10), 60, 100),
                Note::new(ms(1), ms(10), 62, 100),
            ],
        );
        let merged = merge(&track, Duration::ZERO);
        assert_eq!(merged.notes.len(), 2);
    }
}
