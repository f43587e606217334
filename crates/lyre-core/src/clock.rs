//! Playback clock and timeline watcher
//!
//! `PlaybackClock` turns wall-clock time into a timeline position for the
//! running session. `ClockWatcher` is the periodic producer: a dedicated
//! thread that sends `EngineMessage::ClockTick` at a fixed interval so the
//! engine task can publish position changes. It never reads transport state
//! itself.

use crate::messages::EngineMessage;
use flume::{Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Position of a session on its timeline
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    /// Position when `started` was taken (or the frozen position)
    origin: Duration,
    /// Set while running
    started: Option<Instant>,
    speed: f64,
}

impl PlaybackClock {
    pub fn new(speed: f64) -> Self {
        Self {
            origin: Duration::ZERO,
            started: None,
            speed,
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Current position
    pub fn position(&self) -> Duration {
        match self.started {
            Some(started) => self.origin + started.elapsed().mul_f64(self.speed),
            None => self.origin,
        }
    }

    /// Start advancing from the current position
    pub fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    /// Freeze at the current position
    pub fn halt(&mut self) {
        self.origin = self.position();
        self.started = None;
    }

    /// Jump to a position (keeps running if running)
    pub fn set_position(&mut self, position: Duration) {
        self.origin = position;
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }

    /// Change speed without a position jump
    pub fn set_speed(&mut self, speed: f64) {
        self.origin = self.position();
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
        self.speed = speed;
    }
}

/// Periodic position tick producer
///
/// Dropping the watcher stops the thread and waits for it.
pub struct ClockWatcher {
    /// Dropping this sender wakes and stops the thread
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ClockWatcher {
    /// Start ticking for the playback run `run`
    pub fn spawn(interval: Duration, run: u64, engine_tx: Sender<EngineMessage>) -> Self {
        let (cancel_tx, cancel_rx) = flume::bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("lyre-clock".into())
            .spawn(move || Self::run(interval, run, engine_tx, cancel_rx))
            .expect("Failed to spawn clock watcher thread");

        Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        }
    }

    fn run(interval: Duration, run: u64, engine_tx: Sender<EngineMessage>, cancel: Receiver<()>) {
        log::debug!("Clock: watcher started (run {}, every {:?})", run, interval);

        loop {
            match cancel.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if engine_tx.send(EngineMessage::ClockTick { run }).is_err() {
                        break;
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        log::debug!("Clock: watcher stopped (run {})", run);
    }
}

impl Drop for ClockWatcher {
    fn drop(&mut self) {
        self.cancel.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_frozen_until_started() {
        let mut clock = PlaybackClock::new(1.0);
        clock.set_position(Duration::from_secs(2));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.position(), Duration::from_secs(2));
        assert!(!clock.is_running());
    }

    #[test]
    fn test_clock_advances_with_speed() {
        let mut clock = PlaybackClock::new(2.0);
        clock.start();
        std::thread::sleep(Duration::from_millis(20));
        clock.halt();
        let frozen = clock.position();
        assert!(frozen >= Duration::from_millis(40), "position {:?}", frozen);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.position(), frozen);
    }

    #[test]
    fn test_watcher_ticks_and_stops() {
        let (tx, rx) = flume::unbounded();
        let watcher = ClockWatcher::spawn(Duration::from_millis(2), 7, tx);

        match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(EngineMessage::ClockTick { run }) => assert_eq!(run, 7),
            other => panic!("expected a tick, got {:?}", other.is_ok()),
        }

        drop(watcher);
        // drain whatever was sent before the join
        while rx.try_recv().is_ok() {}
        std::thread::sleep(Duration::from_millis(10));
        assert!(rx.try_recv().is_err());
    }
}
