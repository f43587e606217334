//! Engine task
//!
//! Runs the `Transport` on its own thread and exposes it through
//! `EngineHandle`. Transport-changing requests wait for an acknowledgement,
//! so when `stop()` returns every compensating release has been sent.

use crate::config::PlayerSettings;
use crate::dispatch::Backends;
use crate::error::EngineError;
use crate::layout::LayoutTable;
use crate::messages::{ControlCommand, EngineMessage, PlayerEvent};
use crate::playlist::LoopMode;
use crate::timeline::{NoteEvent, Timeline};
use crate::transport::Transport;
use crate::transpose::TransposePolicy;
use flume::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Capacity of the notification channel; older events are dropped when full
pub const EVENT_CAPACITY: usize = 1024;

pub struct Engine;

impl Engine {
    /// Start the engine thread
    ///
    /// Returns the control handle and the notification stream.
    pub fn spawn(
        settings: PlayerSettings,
        layouts: LayoutTable,
        backends: Backends,
    ) -> (EngineHandle, Receiver<PlayerEvent>) {
        let (tx, rx) = flume::unbounded::<EngineMessage>();
        let (events_tx, events_rx) = flume::bounded(EVENT_CAPACITY);
        let engine_tx = tx.clone();

        let thread = std::thread::Builder::new()
            .name("lyre-engine".into())
            .spawn(move || {
                log::info!("Engine: started");
                let mut transport = Transport::new(settings, layouts, backends, engine_tx, events_tx);
                while let Ok(message) = rx.recv() {
                    if !transport.handle(message) {
                        break;
                    }
                }
                log::info!("Engine: stopped");
            })
            .expect("Failed to spawn engine thread");

        (
            EngineHandle {
                tx,
                thread: Some(thread),
            },
            events_rx,
        )
    }
}

/// Control side of a running engine
///
/// Dropping the handle shuts the engine down.
pub struct EngineHandle {
    tx: Sender<EngineMessage>,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Send a command and wait until the engine has handled it
    pub fn request(&self, command: ControlCommand) -> Result<(), EngineError> {
        let (ack_tx, ack_rx) = flume::bounded(1);
        self.tx
            .send(EngineMessage::Control {
                command,
                ack: Some(ack_tx),
            })
            .map_err(|_| EngineError::Disconnected)?;
        ack_rx.recv().map_err(|_| EngineError::NoAcknowledgement)
    }

    /// Send a command without waiting
    pub fn post(&self, command: ControlCommand) -> Result<(), EngineError> {
        self.tx
            .send(EngineMessage::control(command))
            .map_err(|_| EngineError::Disconnected)
    }

    /// Cloneable sender for live MIDI input callbacks
    pub fn live_input(&self) -> LiveInput {
        LiveInput {
            tx: self.tx.clone(),
        }
    }

    pub fn enqueue(&self, timeline: Arc<Timeline>) -> Result<(), EngineError> {
        self.request(ControlCommand::Enqueue(timeline))
    }

    pub fn open(&self, timeline: Arc<Timeline>) -> Result<(), EngineError> {
        self.request(ControlCommand::Open(timeline))
    }

    pub fn remove(&self, timeline: Arc<Timeline>) -> Result<(), EngineError> {
        self.request(ControlCommand::Remove(timeline))
    }

    pub fn close(&self) -> Result<(), EngineError> {
        self.request(ControlCommand::Close)
    }

    pub fn set_track_selected(&self, index: usize, selected: bool) -> Result<(), EngineError> {
        self.request(ControlCommand::SetTrackSelected { index, selected })
    }

    pub fn update_settings(&self, settings: PlayerSettings) -> Result<(), EngineError> {
        self.request(ControlCommand::UpdateSettings(settings))
    }

    pub fn resolve_policy(&self, policy: TransposePolicy) -> Result<(), EngineError> {
        self.request(ControlCommand::ResolvePolicy(policy))
    }

    pub fn play_pause(&self) -> Result<(), EngineError> {
        self.request(ControlCommand::PlayPause)
    }

    pub fn play(&self) -> Result<(), EngineError> {
        self.request(ControlCommand::Play)
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        self.request(ControlCommand::Pause)
    }

    /// Returns after playback stopped and held notes were released
    pub fn stop(&self) -> Result<(), EngineError> {
        self.request(ControlCommand::Stop)
    }

    pub fn play_if_idle(&self) -> Result<(), EngineError> {
        self.request(ControlCommand::PlayIfIdle)
    }

    pub fn seek(&self, position: Duration) -> Result<(), EngineError> {
        self.request(ControlCommand::Seek(position))
    }

    pub fn set_speed(&self, speed: f64) -> Result<(), EngineError> {
        self.request(ControlCommand::SetSpeed(speed))
    }

    pub fn set_loop_mode(&self, mode: LoopMode) -> Result<(), EngineError> {
        self.request(ControlCommand::SetLoopMode(mode))
    }

    pub fn next(&self) -> Result<(), EngineError> {
        self.request(ControlCommand::Next)
    }

    pub fn previous(&self) -> Result<(), EngineError> {
        self.request(ControlCommand::Previous)
    }

    /// Stop playback, release held notes and join the engine thread
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.tx.send(EngineMessage::control(ControlCommand::Shutdown));
            if thread.join().is_err() {
                log::error!("Engine: thread panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

/// Forwards notes from a live MIDI input to the engine
#[derive(Clone)]
pub struct LiveInput {
    tx: Sender<EngineMessage>,
}

impl LiveInput {
    pub fn note(&self, event: NoteEvent) {
        let _ = self
            .tx
            .send(EngineMessage::control(ControlCommand::LiveNote(event)));
    }
}
