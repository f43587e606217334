//! Playlist and loop controller
//!
//! Keeps the ordered list of loadable timelines, the history of opened ones
//! and the loop mode that decides what "next" and "previous" resolve to.
//! Entries are compared by identity (`Arc::ptr_eq`), so the same file added
//! twice is two entries.

use crate::timeline::Timeline;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Loop mode for playlist navigation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopMode {
    /// Stop at the list boundaries
    #[default]
    None,
    /// Wrap around the list
    List,
    /// Repeat the opened timeline
    Track,
}

/// Ordered timelines, history and loop mode
#[derive(Debug, Default)]
pub struct Playlist {
    entries: Vec<Arc<Timeline>>,
    history: Vec<Arc<Timeline>>,
    opened: Option<Arc<Timeline>>,
    loop_mode: LoopMode,
}

impl Playlist {
    pub fn new(loop_mode: LoopMode) -> Self {
        Self {
            loop_mode,
            ..Self::default()
        }
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
    }

    pub fn add(&mut self, timeline: Arc<Timeline>) {
        self.entries.push(timeline);
    }

    /// Remove an entry; history references to it are dropped too
    pub fn remove(&mut self, timeline: &Arc<Timeline>) -> bool {
        let Some(index) = self.position_of(timeline) else {
            return false;
        };
        self.entries.remove(index);
        self.history.retain(|t| !Arc::ptr_eq(t, timeline));
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.history.clear();
        self.opened = None;
    }

    pub fn entries(&self) -> &[Arc<Timeline>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn history(&self) -> &[Arc<Timeline>] {
        &self.history
    }

    pub fn opened(&self) -> Option<&Arc<Timeline>> {
        self.opened.as_ref()
    }

    pub fn position_of(&self, timeline: &Arc<Timeline>) -> Option<usize> {
        self.entries.iter().position(|t| Arc::ptr_eq(t, timeline))
    }

    /// 1-based position of the opened timeline, for display
    pub fn opened_position(&self) -> Option<usize> {
        self.opened
            .as_ref()
            .and_then(|t| self.position_of(t))
            .map(|i| i + 1)
    }

    pub fn is_opened(&self, timeline: &Arc<Timeline>) -> bool {
        self.opened.as_ref().is_some_and(|t| Arc::ptr_eq(t, timeline))
    }

    /// Open a timeline and record it in history
    pub fn open(&mut self, timeline: Arc<Timeline>) {
        self.history.push(timeline.clone());
        self.opened = Some(timeline);
    }

    /// Set the opened timeline without touching history
    pub(crate) fn reopen(&mut self, timeline: Arc<Timeline>) {
        self.opened = Some(timeline);
    }

    pub fn close(&mut self) {
        self.opened = None;
    }

    fn opened_index(&self) -> Option<usize> {
        self.opened.as_ref().and_then(|t| self.position_of(t))
    }

    /// Timeline to play after the opened one
    ///
    /// Under `Track` this is the opened timeline itself; callers restart it
    /// rather than reloading.
    pub fn next(&self) -> Option<Arc<Timeline>> {
        if self.loop_mode == LoopMode::Track {
            if let Some(opened) = &self.opened {
                return Some(opened.clone());
            }
        }

        let Some(index) = self.opened_index() else {
            return self.entries.first().cloned();
        };

        match self.entries.get(index + 1) {
            Some(next) => Some(next.clone()),
            None if self.loop_mode == LoopMode::List => self.entries.first().cloned(),
            None => None,
        }
    }

    /// Timeline to go back to
    ///
    /// With at least two history entries the current one is popped and the
    /// one before it returned. Otherwise the list is walked backwards
    /// according to the loop mode and the result replaces the history top.
    ///
    /// The returned timeline is already recorded; open it with `reopen`.
    pub fn previous(&mut self) -> Option<Arc<Timeline>> {
        if self.history.len() > 1 {
            self.history.pop();
            return self.history.last().cloned();
        }

        let previous = self.list_previous()?;
        self.history.pop();
        self.history.push(previous.clone());
        Some(previous)
    }

    fn list_previous(&self) -> Option<Arc<Timeline>> {
        if self.loop_mode == LoopMode::Track {
            if let Some(opened) = &self.opened {
                return Some(opened.clone());
            }
        }

        let index = self.opened_index()?;
        match index.checked_sub(1) {
            Some(prev) => self.entries.get(prev).cloned(),
            None if self.loop_mode == LoopMode::List => self.entries.last().cloned(),
            None => None,
        }
    }

    /// Whether "next" does anything
    pub fn can_next(&self) -> bool {
        match self.loop_mode {
            LoopMode::List | LoopMode::Track => !self.entries.is_empty() || self.opened.is_some(),
            LoopMode::None => match &self.opened {
                Some(opened) => self
                    .entries
                    .last()
                    .is_some_and(|last| !Arc::ptr_eq(last, opened)),
                None => !self.entries.is_empty(),
            },
        }
    }

    /// Whether "previous" resolves to a timeline (ignoring restart)
    pub fn can_previous(&self) -> bool {
        self.history.len() > 1 || self.list_previous().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(title: &str) -> Arc<Timeline> {
        Arc::new(Timeline::new(title, Vec::new()))
    }

    fn playlist(mode: LoopMode) -> (Playlist, Vec<Arc<Timeline>>) {
        let items = vec![timeline("A"), timeline("B"), timeline("C")];
        let mut playlist = Playlist::new(mode);
        for t in &items {
            playlist.add(t.clone());
        }
        (playlist, items)
    }

    #[test]
    fn test_none_mode_stops_at_boundaries() {
        let (mut playlist, items) = playlist(LoopMode::None);

        playlist.open(items[2].clone());
        assert!(playlist.next().is_none());
        assert!(!playlist.can_next());

        let (mut playlist, items) = self::playlist(LoopMode::None);
        playlist.open(items[0].clone());
        assert!(playlist.previous().is_none());
        assert!(!playlist.can_previous());
        assert!(playlist.can_next());
    }

    #[test]
    fn test_list_mode_wraps() {
        let (mut playlist, items) = playlist(LoopMode::List);

        playlist.open(items[2].clone());
        assert!(Arc::ptr_eq(&playlist.next().unwrap(), &items[0]));

        let (mut playlist, items) = self::playlist(LoopMode::List);
        playlist.open(items[0].clone());
        assert!(Arc::ptr_eq(&playlist.previous().unwrap(), &items[2]));
    }

    #[test]
    fn test_track_mode_returns_opened() {
        let (mut playlist, items) = playlist(LoopMode::Track);
        playlist.open(items[1].clone());
        assert!(Arc::ptr_eq(&playlist.next().unwrap(), &items[1]));
        assert!(playlist.can_next());
    }

    #[test]
    fn test_next_without_opened_is_first() {
        let (playlist, items) = playlist(LoopMode::None);
        assert!(Arc::ptr_eq(&playlist.next().unwrap(), &items[0]));
    }

    #[test]
    fn test_previous_pops_history() {
        let (mut playlist, items) = playlist(LoopMode::None);
        playlist.open(items[2].clone());
        playlist.open(items[0].clone());
        assert_eq!(playlist.history().len(), 2);

        let prev = playlist.previous().unwrap();
        assert!(Arc::ptr_eq(&prev, &items[2]));
        assert_eq!(playlist.history().len(), 1);
    }

    #[test]
    fn test_list_previous_replaces_history_top() {
        let (mut playlist, items) = playlist(LoopMode::None);
        playlist.open(items[2].clone());

        let prev = playlist.previous().unwrap();
        assert!(Arc::ptr_eq(&prev, &items[1]));
        playlist.reopen(prev);
        assert_eq!(playlist.history().len(), 1);

        let prev = playlist.previous().unwrap();
        assert!(Arc::ptr_eq(&prev, &items[0]));
    }

    #[test]
    fn test_remove_drops_history_references() {
        let (mut playlist, items) = playlist(LoopMode::None);
        playlist.open(items[1].clone());
        assert!(playlist.remove(&items[1]));
        assert!(playlist.history().is_empty());
        assert_eq!(playlist.len(), 2);
        assert!(!playlist.remove(&items[1]));
    }

    #[test]
    fn test_opened_position() {
        let (mut playlist, items) = playlist(LoopMode::None);
        assert_eq!(playlist.opened_position(), None);
        playlist.open(items[1].clone());
        assert_eq!(playlist.opened_position(), Some(2));
    }
}
