//! Event dispatcher
//!
//! Routes note events from the running session (or a live MIDI input) to
//! exactly one sink:
//!
//! ```text
//! NoteEvent → Dispatcher ─┬─ SynthesizerSink  → SynthOutput (raw notes, chromatic)
//!                         └─ KeyInjectionSink → transpose → KeyInjector (press/hold/release)
//!                                ↑ gated by FocusTarget
//! ```
//!
//! Both sinks remember what is currently sounding or held so that
//! `release_all` can emit compensating releases on stop.

use crate::error::SinkError;
use crate::layout::KeyId;
use crate::timeline::{NoteEvent, NoteEventKind};
use crate::transpose::{Mapped, NoteMapping};
use std::collections::HashMap;

/// Raw note output (software synthesizer, MIDI out port)
pub trait SynthOutput: Send {
    fn send_note(&mut self, event: &NoteEvent) -> Result<(), SinkError>;
}

/// Simulated key presses on the target application
pub trait KeyInjector: Send {
    /// Key down immediately followed by key up
    fn press_key(&mut self, key: &KeyId) -> Result<(), SinkError>;
    fn hold_key(&mut self, key: &KeyId) -> Result<(), SinkError>;
    fn release_key(&mut self, key: &KeyId) -> Result<(), SinkError>;
}

/// Foreground window queries for the key-injection target
pub trait FocusTarget: Send {
    /// Try to bring the target window to the foreground
    fn ensure_foreground(&mut self) -> bool;
    /// Whether the target currently has input focus
    fn is_focused(&mut self) -> bool;
}

/// Which sink is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Synthesizer,
    KeyInjection,
}

/// Outcome of dispatching one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// Forwarded to the sink
    Sent,
    /// Nothing to do (unplayable pitch, release of an idle key)
    Skipped,
    /// Key-injection target lost focus; nothing was sent
    FocusLost,
}

/// A destination for note events
pub trait NoteSink: Send {
    fn kind(&self) -> SinkKind;

    fn dispatch(&mut self, event: &NoteEvent) -> Result<Dispatched, SinkError>;

    /// Release everything still sounding or held
    fn release_all(&mut self) -> Result<(), SinkError>;

    /// Number of notes/keys currently considered down
    fn held_count(&self) -> usize;

    /// Whether dispatch must be gated on the target's focus
    fn requires_focus(&self) -> bool {
        false
    }
}

/// Forwards raw note events to a synthesizer
pub struct SynthesizerSink {
    output: Box<dyn SynthOutput>,
    /// (channel, pitch) → number of note-ons without a matching off
    sounding: HashMap<(u8, u8), usize>,
}

impl SynthesizerSink {
    pub fn new(output: Box<dyn SynthOutput>) -> Self {
        Self {
            output,
            sounding: HashMap::new(),
        }
    }
}

impl NoteSink for SynthesizerSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Synthesizer
    }

    fn dispatch(&mut self, event: &NoteEvent) -> Result<Dispatched, SinkError> {
        self.output.send_note(event)?;

        let slot = (event.channel, event.pitch);
        if event.is_release() {
            if let Some(count) = self.sounding.get_mut(&slot) {
                *count -= 1;
                if *count == 0 {
                    self.sounding.remove(&slot);
                }
            }
        } else {
            *self.sounding.entry(slot).or_insert(0) += 1;
        }
        Ok(Dispatched::Sent)
    }

    fn release_all(&mut self) -> Result<(), SinkError> {
        let mut first_error = None;
        for ((channel, pitch), count) in self.sounding.drain() {
            for _ in 0..count {
                if let Err(e) = self.output.send_note(&NoteEvent::off(channel, pitch)) {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn held_count(&self) -> usize {
        self.sounding.values().sum()
    }
}

/// Turns note events into key presses for a limited-range instrument
pub struct KeyInjectionSink {
    injector: Box<dyn KeyInjector>,
    mapping: NoteMapping,
    hold_notes: bool,
    /// Held key → number of sounding notes mapped onto it
    held: HashMap<KeyId, usize>,
}

impl KeyInjectionSink {
    pub fn new(injector: Box<dyn KeyInjector>, mapping: NoteMapping, hold_notes: bool) -> Self {
        Self {
            injector,
            mapping,
            hold_notes,
            held: HashMap::new(),
        }
    }

    pub fn mapping(&self) -> &NoteMapping {
        &self.mapping
    }

    /// Replace mapping and hold mode; held keys must be released first
    pub fn reconfigure(&mut self, mapping: NoteMapping, hold_notes: bool) {
        debug_assert!(self.held.is_empty(), "reconfigure with held keys");
        self.mapping = mapping;
        self.hold_notes = hold_notes;
    }

    fn key_up(&mut self, key: KeyId) -> Result<Dispatched, SinkError> {
        match self.held.get_mut(&key) {
            Some(count) if *count > 1 => {
                // another note still holds this key
                *count -= 1;
                Ok(Dispatched::Skipped)
            }
            Some(_) => {
                self.held.remove(&key);
                self.injector.release_key(&key)?;
                Ok(Dispatched::Sent)
            }
            None => {
                self.injector.release_key(&key)?;
                Ok(Dispatched::Sent)
            }
        }
    }
}

impl NoteSink for KeyInjectionSink {
    fn kind(&self) -> SinkKind {
        SinkKind::KeyInjection
    }

    fn dispatch(&mut self, event: &NoteEvent) -> Result<Dispatched, SinkError> {
        let key = match self.mapping.map(event.pitch) {
            Mapped::Playable { key, .. } => key,
            Mapped::Unplayable => {
                log::trace!("Dispatch: pitch {} has no key, skipping", event.pitch);
                return Ok(Dispatched::Skipped);
            }
        };

        match event.kind {
            NoteEventKind::Off => self.key_up(key),
            NoteEventKind::On if event.velocity == 0 => self.key_up(key),
            NoteEventKind::On if self.hold_notes => {
                let count = self.held.entry(key.clone()).or_insert(0);
                *count += 1;
                if *count == 1 {
                    self.injector.hold_key(&key)?;
                }
                Ok(Dispatched::Sent)
            }
            NoteEventKind::On => {
                self.injector.press_key(&key)?;
                Ok(Dispatched::Sent)
            }
        }
    }

    fn release_all(&mut self) -> Result<(), SinkError> {
        let mut first_error = None;
        for (key, _) in self.held.drain() {
            log::trace!("Dispatch: releasing held key '{}'", key);
            if let Err(e) = self.injector.release_key(&key) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn held_count(&self) -> usize {
        self.held.len()
    }

    fn requires_focus(&self) -> bool {
        true
    }
}

/// Device backends handed to the engine at spawn
pub struct Backends {
    /// Synthesizer output, or why it could not be acquired
    pub synthesizer: Result<Box<dyn SynthOutput>, SinkError>,
    pub keyboard: Box<dyn KeyInjector>,
    pub focus: Box<dyn FocusTarget>,
}

/// Owns both sinks and routes every event to the active one
pub struct Dispatcher {
    synthesizer: Option<SynthesizerSink>,
    keyboard: KeyInjectionSink,
    focus: Box<dyn FocusTarget>,
    active: SinkKind,
}

impl Dispatcher {
    /// Build a dispatcher; returns the synthesizer error if it was unavailable
    pub fn new(backends: Backends, mapping: NoteMapping) -> (Self, Option<SinkError>) {
        let (synthesizer, unavailable) = match backends.synthesizer {
            Ok(output) => (Some(SynthesizerSink::new(output)), None),
            Err(e) => (None, Some(e)),
        };

        let dispatcher = Self {
            synthesizer,
            keyboard: KeyInjectionSink::new(backends.keyboard, mapping, false),
            focus: backends.focus,
            active: SinkKind::KeyInjection,
        };
        (dispatcher, unavailable)
    }

    pub fn synthesizer_available(&self) -> bool {
        self.synthesizer.is_some()
    }

    pub fn active(&self) -> SinkKind {
        self.active
    }

    /// Select the sink for a new session
    ///
    /// Anything still held on the previous sink is released first.
    pub fn configure(
        &mut self,
        use_synthesizer: bool,
        mapping: NoteMapping,
        hold_notes: bool,
    ) -> Result<SinkKind, SinkError> {
        let released = self.release_all();

        self.keyboard.reconfigure(mapping, hold_notes);
        self.active = if use_synthesizer && self.synthesizer.is_some() {
            SinkKind::Synthesizer
        } else {
            SinkKind::KeyInjection
        };

        released.map(|_| self.active)
    }

    fn sink_mut(&mut self) -> &mut dyn NoteSink {
        match (self.active, self.synthesizer.as_mut()) {
            (SinkKind::Synthesizer, Some(synth)) => synth,
            _ => &mut self.keyboard,
        }
    }

    fn sink(&self) -> &dyn NoteSink {
        match (self.active, self.synthesizer.as_ref()) {
            (SinkKind::Synthesizer, Some(synth)) => synth,
            _ => &self.keyboard,
        }
    }

    /// Dispatch one event to the active sink
    pub fn on_note_event(&mut self, event: &NoteEvent) -> Result<Dispatched, SinkError> {
        if self.sink().requires_focus() && !self.focus.is_focused() {
            return Ok(Dispatched::FocusLost);
        }
        self.sink_mut().dispatch(event)
    }

    /// Release every held note on both sinks
    pub fn release_all(&mut self) -> Result<(), SinkError> {
        let keyboard = self.keyboard.release_all();
        let synth = match self.synthesizer.as_mut() {
            Some(synth) => synth.release_all(),
            None => Ok(()),
        };
        keyboard.and(synth)
    }

    pub fn held_count(&self) -> usize {
        self.keyboard.held_count()
            + self.synthesizer.as_ref().map_or(0, |s| s.held_count())
    }

    pub fn requires_focus(&self) -> bool {
        self.sink().requires_focus()
    }

    pub fn ensure_foreground(&mut self) -> bool {
        self.focus.ensure_foreground()
    }

    pub fn is_focused(&mut self) -> bool {
        self.focus.is_focused()
    }
}

/// Recording backends for tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Action {
        Note(NoteEvent),
        Press(String),
        Hold(String),
        Release(String),
    }

    #[derive(Clone, Default)]
    pub struct Recorder {
        actions: Arc<Mutex<Vec<Action>>>,
        fail: Arc<AtomicBool>,
    }

    impl Recorder {
        pub fn actions(&self) -> Vec<Action> {
            self.actions.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.actions.lock().unwrap().clear();
        }

        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn record(&self, action: Action) -> Result<(), SinkError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SinkError::Synthesizer("injected failure".into()));
            }
            self.actions.lock().unwrap().push(action);
            Ok(())
        }
    }

    impl SynthOutput for Recorder {
        fn send_note(&mut self, event: &NoteEvent) -> Result<(), SinkError> {
            self.record(Action::Note(*event))
        }
    }

    impl KeyInjector for Recorder {
        fn press_key(&mut self, key: &KeyId) -> Result<(), SinkError> {
            self.record(Action::Press(key.0.clone()))
        }

        fn hold_key(&mut self, key: &KeyId) -> Result<(), SinkError> {
            self.record(Action::Hold(key.0.clone()))
        }

        fn release_key(&mut self, key: &KeyId) -> Result<(), SinkError> {
            self.record(Action::Release(key.0.clone()))
        }
    }

    /// Focus flag shared with the test body
    #[derive(Clone)]
    pub struct Focus {
        pub focused: Arc<AtomicBool>,
        /// Value `focused` takes after `ensure_foreground`
        pub gains_focus: Arc<AtomicBool>,
    }

    impl Focus {
        pub fn new(focused: bool) -> Self {
            Self {
                focused: Arc::new(AtomicBool::new(focused)),
                gains_focus: Arc::new(AtomicBool::new(true)),
            }
        }

        pub fn set(&self, focused: bool) {
            self.focused.store(focused, Ordering::SeqCst);
        }
    }

    impl FocusTarget for Focus {
        fn ensure_foreground(&mut self) -> bool {
            let gains = self.gains_focus.load(Ordering::SeqCst);
            if gains {
                self.focused.store(true, Ordering::SeqCst);
            }
            gains
        }

        fn is_focused(&mut self) -> bool {
            self.focused.load(Ordering::SeqCst)
        }
    }

    /// Backends that record into `synth` and `keys`
    pub fn backends(synth: &Recorder, keys: &Recorder, focus: &Focus) -> Backends {
        Backends {
            synthesizer: Ok(Box::new(synth.clone())),
            keyboard: Box::new(keys.clone()),
            focus: Box::new(focus.clone()),
        }
    }
}
