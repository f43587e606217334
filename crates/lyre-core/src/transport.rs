//! Transport state machine
//!
//! The single owner of playback state. Everything that can change it (user
//! commands, clock ticks, scheduled notes, end of timeline) arrives as an
//! `EngineMessage` and is handled here one at a time, so a seek can never
//! interleave with a stop and no note is dispatched for a superseded session.
//!
//! ```text
//! Idle ─open─► Built ─play─► Playing ⇄ Paused
//!   │            ▲              │
//!   │            └──── Stopped ◄┘ (stop / focus loss / sink error)
//!   └─open (unplayable, no policy)─► AwaitingPolicyChoice ─resolve─► Built
//! ```

use crate::config::{clamp_speed, PlayerSettings};
use crate::dispatch::{Backends, Dispatched, Dispatcher};
use crate::layout::{KeyLayout, LayoutTable};
use crate::messages::{format_position, ControlCommand, EngineMessage, PlayerEvent, TransportStatus};
use crate::playlist::{LoopMode, Playlist};
use crate::session::PlaybackSession;
use crate::timeline::{NoteEvent, Timeline, TrackSelection};
use crate::transpose::{NoteMapping, TransposePolicy};
use flume::{Sender, TrySendError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of the opened timeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransportState {
    /// Nothing opened
    #[default]
    Idle,
    /// Opened, but some notes are unplayable and no policy was chosen
    AwaitingPolicyChoice,
    /// Session built, never started
    Built,
    Playing,
    Paused,
    /// Interrupted or stopped; position kept unless stopped explicitly
    Stopped,
}

impl TransportState {
    /// A built session that accepts play
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Built | Self::Paused | Self::Stopped)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "Idle",
            Self::AwaitingPolicyChoice => "Waiting",
            Self::Built => "Ready",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
        };
        f.write_str(label)
    }
}

/// Mapping for the configured layout, offset and policy
fn mapping_for(settings: &PlayerSettings, layouts: &LayoutTable) -> NoteMapping {
    let layout = match layouts.get(&settings.layout) {
        Ok(layout) => layout.clone(),
        Err(e) => {
            log::warn!("Transport: {}, no key will be playable", e);
            KeyLayout::from_pairs(&settings.layout, "", &[], &[])
        }
    };
    NoteMapping::new(layout, settings.key_offset, settings.transpose_policy)
}

pub struct Transport {
    settings: PlayerSettings,
    layouts: LayoutTable,
    dispatcher: Dispatcher,
    /// Set once the synthesizer failed to open; never cleared
    synthesizer_disabled: bool,
    playlist: Playlist,
    selection: TrackSelection,
    session: Option<PlaybackSession>,
    state: TransportState,
    /// Play was requested while the session could not start yet
    pending_play: bool,
    /// Id of the latest playback run; messages of older runs are dropped
    run: u64,
    engine_tx: Sender<EngineMessage>,
    events: Sender<PlayerEvent>,
}

impl Transport {
    pub fn new(
        mut settings: PlayerSettings,
        layouts: LayoutTable,
        backends: Backends,
        engine_tx: Sender<EngineMessage>,
        events: Sender<PlayerEvent>,
    ) -> Self {
        if layouts.get(&settings.layout).is_err() {
            if let Some(fallback) = layouts.ids().next() {
                log::warn!(
                    "Transport: Unknown layout '{}', using '{}'",
                    settings.layout,
                    fallback
                );
                settings.layout = fallback.to_string();
            }
        }
        settings.speed = settings.clamped_speed();

        let mapping = mapping_for(&settings, &layouts);
        let (dispatcher, unavailable) = Dispatcher::new(backends, mapping.clone());

        let mut transport = Self {
            playlist: Playlist::new(settings.loop_mode),
            settings,
            layouts,
            dispatcher,
            synthesizer_disabled: false,
            selection: TrackSelection::default(),
            session: None,
            state: TransportState::Idle,
            pending_play: false,
            run: 0,
            engine_tx,
            events,
        };

        if let Some(e) = unavailable {
            log::warn!("Transport: Synthesizer disabled: {}", e);
            transport.synthesizer_disabled = true;
            transport.settings.use_synthesizer = false;
            transport.publish(PlayerEvent::SynthesizerUnavailable {
                reason: e.to_string(),
            });
        }
        transport.configure_dispatcher(mapping);
        transport
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn selection(&self) -> &TrackSelection {
        &self.selection
    }

    pub fn position(&self) -> Duration {
        self.session.as_ref().map_or(Duration::ZERO, |s| s.position())
    }

    /// Notes or keys currently held down by the dispatcher
    pub fn held_count(&self) -> usize {
        self.dispatcher.held_count()
    }

    /// Handle one message; false once the engine should shut down
    pub fn handle(&mut self, message: EngineMessage) -> bool {
        match message {
            EngineMessage::Control { command, ack } => {
                let keep_running = self.handle_command(command);
                self.publish_status();
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                keep_running
            }
            EngineMessage::ClockTick { run } => {
                if self.is_current(run) {
                    self.publish(PlayerEvent::PositionChanged(self.position()));
                    self.publish_status();
                }
                true
            }
            EngineMessage::NoteDue { run, event } => {
                if self.is_current(run) {
                    self.on_note_due(&event);
                }
                true
            }
            EngineMessage::Finished { run } => {
                if self.is_current(run) {
                    self.on_finished();
                    self.publish_status();
                }
                true
            }
        }
    }

    fn is_current(&self, run: u64) -> bool {
        self.state == TransportState::Playing
            && self.session.as_ref().and_then(|s| s.run()) == Some(run)
    }

    fn handle_command(&mut self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::Enqueue(timeline) => self.playlist.add(timeline),
            ControlCommand::Open(timeline) => self.open(timeline, false),
            ControlCommand::Remove(timeline) => {
                if self.playlist.is_opened(&timeline) {
                    self.close();
                }
                self.playlist.remove(&timeline);
            }
            ControlCommand::Close => self.close(),
            ControlCommand::SetTrackSelected { index, selected } => {
                if self.selection.set(index, selected) {
                    if let Some(timeline) = self.playlist.opened() {
                        self.publish(PlayerEvent::TrackListReady(
                            timeline.track_infos(&self.selection),
                        ));
                    }
                    self.rebuild();
                }
            }
            ControlCommand::UpdateSettings(settings) => self.update_settings(settings),
            ControlCommand::ResolvePolicy(policy) => self.resolve_policy(policy),
            ControlCommand::PlayPause => {
                if self.state == TransportState::Playing {
                    self.pause();
                } else {
                    self.play();
                }
            }
            ControlCommand::Play => self.play(),
            ControlCommand::Pause => self.pause(),
            ControlCommand::Stop => self.stop(),
            ControlCommand::PlayIfIdle => {
                if self.state.is_ready() || self.state == TransportState::Idle {
                    self.play();
                }
            }
            ControlCommand::Seek(position) => self.seek(position),
            ControlCommand::SetSpeed(speed) => self.set_speed(speed),
            ControlCommand::SetLoopMode(mode) => self.set_loop_mode(mode),
            ControlCommand::Next => self.next(),
            ControlCommand::Previous => self.previous(),
            ControlCommand::LiveNote(event) => self.on_live_note(&event),
            ControlCommand::Shutdown => {
                self.close();
                log::info!("Transport: Shut down");
                return false;
            }
        }
        true
    }

    // --- events out ---

    fn publish(&self, event: PlayerEvent) {
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            log::trace!("Transport: Event queue full, dropping {:?}", event);
        }
    }

    fn set_state(&mut self, state: TransportState) {
        if self.state != state {
            log::info!("Transport: {:?} -> {:?}", self.state, state);
            self.state = state;
            self.publish(PlayerEvent::StateChanged(state));
        }
    }

    /// Derived flags for presentation layers
    pub fn status(&self) -> TransportStatus {
        let position = self.position();
        let has_notes = self.session.as_ref().is_some_and(|s| s.has_notes());
        let can_play = match self.state {
            TransportState::Idle => !self.playlist.is_empty(),
            TransportState::AwaitingPolicyChoice => false,
            TransportState::Playing => true,
            _ => has_notes,
        };
        let display = self.playlist.opened_position().map(|n| {
            format!(
                "Playing {}/{} {}",
                n,
                self.playlist.len(),
                format_position(position)
            )
        });

        TransportStatus {
            state: self.state,
            position,
            duration: self.session.as_ref().map_or(Duration::ZERO, |s| s.duration()),
            can_play,
            can_next: self.playlist.can_next(),
            can_previous: self.playlist.can_previous()
                || (self.session.is_some() && position > self.settings.restart_threshold()),
            title: self.playlist.opened().map(|t| t.title.clone()),
            display,
        }
    }

    fn publish_status(&self) {
        self.publish(PlayerEvent::Status(self.status()));
    }

    // --- session lifecycle ---

    fn configure_dispatcher(&mut self, mapping: NoteMapping) {
        let use_synthesizer = self.settings.use_synthesizer && !self.synthesizer_disabled;
        match self
            .dispatcher
            .configure(use_synthesizer, mapping, self.settings.hold_notes)
        {
            Ok(kind) => log::debug!("Transport: Output {:?}", kind),
            Err(e) => self.report_sink_error(&e.to_string()),
        }
    }

    /// Open a timeline, adding it to the playlist when missing
    fn open(&mut self, timeline: Arc<Timeline>, autoplay: bool) {
        if self.playlist.position_of(&timeline).is_none() {
            self.playlist.add(timeline.clone());
        }
        self.playlist.open(timeline.clone());
        self.load(timeline, autoplay);
    }

    /// Build a fresh session at position zero with every track selected
    fn load(&mut self, timeline: Arc<Timeline>, autoplay: bool) {
        self.halt();
        log::info!("Transport: Loading '{}'", timeline.title);

        self.selection = TrackSelection::all(timeline.tracks.len());
        self.publish(PlayerEvent::TrackListReady(
            timeline.track_infos(&self.selection),
        ));
        self.pending_play = autoplay;
        self.build(timeline, Duration::ZERO);
    }

    /// Rebuild the opened timeline after a selection or settings change
    ///
    /// Position is kept; playback resumes if it was running.
    fn rebuild(&mut self) {
        let Some(timeline) = self.playlist.opened().cloned() else {
            return;
        };
        let position = self.position();
        if self.state == TransportState::Playing {
            self.pending_play = true;
        }
        self.halt();
        self.build(timeline, position);
    }

    fn build(&mut self, timeline: Arc<Timeline>, position: Duration) {
        let mapping = mapping_for(&self.settings, &self.layouts);
        let built = PlaybackSession::build(timeline, &self.selection, &self.settings, mapping.clone());

        let mut session = built.session;
        session.set_position(position);
        session.set_loop_track(self.settings.loop_mode == LoopMode::Track);
        self.session = Some(session);
        self.configure_dispatcher(mapping);

        if !built.unplayable.is_empty() && !self.settings.transpose_policy.is_decided() {
            log::info!(
                "Transport: {} unplayable pitches, waiting for a transpose policy",
                built.unplayable.len()
            );
            self.set_state(TransportState::AwaitingPolicyChoice);
            self.publish(PlayerEvent::UnplayableNotes {
                pitches: built.unplayable.into_iter().collect(),
            });
            return;
        }

        self.set_state(TransportState::Built);
        if std::mem::take(&mut self.pending_play) {
            self.play();
        }
    }

    fn close(&mut self) {
        self.halt();
        self.session = None;
        self.pending_play = false;
        self.selection = TrackSelection::default();
        self.playlist.close();
        self.set_state(TransportState::Idle);
    }

    /// Stop emission and release everything held
    ///
    /// Returns after the playback threads have been joined and the
    /// compensating releases were sent.
    fn halt(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.halt();
        }
        if let Err(e) = self.dispatcher.release_all() {
            self.report_sink_error(&e.to_string());
        }
    }

    fn start(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.position() >= session.duration() {
            session.set_position(Duration::ZERO);
        }
        self.run += 1;
        session.start(self.run, self.settings.clock_interval(), &self.engine_tx);
        self.set_state(TransportState::Playing);
        true
    }

    // --- transport commands ---

    fn play(&mut self) {
        match self.state {
            TransportState::Playing => return,
            TransportState::AwaitingPolicyChoice => {
                self.pending_play = true;
                return;
            }
            TransportState::Idle => {
                let Some(first) = self.playlist.next() else {
                    return;
                };
                self.open(first, true);
                return;
            }
            _ => {}
        }

        if !self.session.as_ref().is_some_and(|s| s.has_notes()) {
            log::info!("Transport: Nothing to play");
            return;
        }

        if self.dispatcher.requires_focus() {
            self.dispatcher.ensure_foreground();
            std::thread::sleep(self.settings.focus_settle());
            if !self.dispatcher.is_focused() {
                log::debug!("Transport: Target not focused, play aborted");
                return;
            }
        }

        self.start();
    }

    fn pause(&mut self) {
        if self.state == TransportState::Playing {
            self.halt();
            self.set_state(TransportState::Paused);
        }
    }

    fn stop(&mut self) {
        self.pending_play = false;
        if self.state == TransportState::Idle || self.state == TransportState::AwaitingPolicyChoice {
            return;
        }
        self.halt();
        if let Some(session) = self.session.as_mut() {
            session.set_position(Duration::ZERO);
        }
        self.publish(PlayerEvent::PositionChanged(Duration::ZERO));
        self.set_state(TransportState::Stopped);
    }

    /// Focus loss or sink failure: stop but keep the position
    fn interrupt(&mut self) {
        self.pending_play = false;
        self.halt();
        self.set_state(TransportState::Stopped);
    }

    fn seek(&mut self, position: Duration) {
        if self.session.is_none() {
            return;
        }
        let was_playing = self.state == TransportState::Playing;
        if was_playing {
            self.halt();
        }

        let position = match self.session.as_mut() {
            Some(session) => session.set_position(position),
            None => return,
        };
        self.publish(PlayerEvent::PositionChanged(position));

        if was_playing {
            if self.dispatcher.requires_focus() && !self.dispatcher.is_focused() {
                log::debug!("Transport: Seek without focus, pausing");
                self.set_state(TransportState::Paused);
            } else {
                self.start();
            }
        }
    }

    fn set_speed(&mut self, speed: f64) {
        self.settings.speed = clamp_speed(speed);
        let speed = self.settings.speed;
        let was_playing = self.state == TransportState::Playing;
        if was_playing {
            // offs still queued for the old run are dropped as stale
            self.halt();
        }
        if let Some(session) = self.session.as_mut() {
            session.set_speed(speed);
        }
        if was_playing {
            self.start();
        }
    }

    fn set_loop_mode(&mut self, mode: LoopMode) {
        self.settings.loop_mode = mode;
        self.playlist.set_loop_mode(mode);
        if let Some(session) = self.session.as_mut() {
            session.set_loop_track(mode == LoopMode::Track);
        }
    }

    fn update_settings(&mut self, mut settings: PlayerSettings) {
        if self.synthesizer_disabled && settings.use_synthesizer {
            log::warn!("Transport: Synthesizer unavailable, ignoring use_synthesizer");
            settings.use_synthesizer = false;
        }
        if self.layouts.get(&settings.layout).is_err() {
            log::warn!(
                "Transport: Unknown layout '{}', keeping '{}'",
                settings.layout,
                self.settings.layout
            );
            settings.layout = self.settings.layout.clone();
        }
        settings.speed = settings.clamped_speed();

        if settings == self.settings {
            return;
        }
        self.playlist.set_loop_mode(settings.loop_mode);
        self.settings = settings;

        if self.session.is_some() {
            self.rebuild();
        } else {
            self.configure_dispatcher(mapping_for(&self.settings, &self.layouts));
        }
    }

    fn resolve_policy(&mut self, policy: TransposePolicy) {
        log::info!("Transport: Transpose policy {:?}", policy);
        self.settings.transpose_policy = policy;
        if self.session.is_some() {
            self.rebuild();
        }
    }

    /// Restart the opened timeline at zero
    fn restart(&mut self, play: bool) {
        self.halt();
        if let Some(session) = self.session.as_mut() {
            session.set_position(Duration::ZERO);
        }
        self.publish(PlayerEvent::PositionChanged(Duration::ZERO));
        if play {
            self.start();
        }
    }

    fn next(&mut self) {
        let was_playing = self.state == TransportState::Playing;
        let Some(next) = self.playlist.next() else {
            return;
        };
        if self.playlist.is_opened(&next) {
            self.restart(was_playing);
        } else {
            self.open(next, was_playing);
        }
    }

    fn previous(&mut self) {
        let was_playing = self.state == TransportState::Playing;
        if self.session.is_some() && self.position() > self.settings.restart_threshold() {
            self.restart(was_playing);
            return;
        }

        let Some(previous) = self.playlist.previous() else {
            return;
        };
        if self.playlist.is_opened(&previous) {
            self.restart(was_playing);
        } else {
            self.playlist.reopen(previous.clone());
            self.load(previous, was_playing);
        }
    }

    // --- producer messages ---

    fn on_note_due(&mut self, event: &NoteEvent) {
        match self.dispatcher.on_note_event(event) {
            Ok(Dispatched::Sent) | Ok(Dispatched::Skipped) => {}
            Ok(Dispatched::FocusLost) => {
                log::debug!("Transport: Target lost focus, stopping");
                self.interrupt();
                self.publish_status();
            }
            Err(e) => {
                self.report_sink_error(&e.to_string());
                self.interrupt();
                self.publish_status();
            }
        }
    }

    fn on_live_note(&mut self, event: &NoteEvent) {
        match self.dispatcher.on_note_event(event) {
            Ok(Dispatched::Sent) | Ok(Dispatched::Skipped) => {}
            Ok(Dispatched::FocusLost) => {
                if self.state == TransportState::Playing {
                    log::debug!("Transport: Target lost focus, stopping");
                    self.interrupt();
                }
            }
            Err(e) => {
                self.report_sink_error(&e.to_string());
                if self.state == TransportState::Playing {
                    self.interrupt();
                }
            }
        }
    }

    fn on_finished(&mut self) {
        self.halt();
        let loop_track = self.session.as_ref().is_some_and(|s| s.loop_track());
        if loop_track {
            self.restart(true);
            return;
        }

        match self.playlist.next() {
            Some(next) if self.playlist.is_opened(&next) => self.restart(true),
            Some(next) => self.open(next, true),
            None => {
                log::info!("Transport: End of playlist");
                if let Some(session) = self.session.as_mut() {
                    session.set_position(Duration::ZERO);
                }
                self.publish(PlayerEvent::PositionChanged(Duration::ZERO));
                self.set_state(TransportState::Stopped);
            }
        }
    }

    fn report_sink_error(&self, reason: &str) {
        log::warn!("Transport: Output failed: {}", reason);
        self.publish(PlayerEvent::DispatchFailed {
            reason: reason.to_string(),
        });
    }
}
