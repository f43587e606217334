//! Playback worker
//!
//! Emits the session's note events at their scheduled times on a dedicated
//! thread. The worker only sends typed messages to the engine task; the
//! engine decides whether an event still belongs to the current run.
//!
//! Waiting is done on the cancel channel, so dropping the worker wakes the
//! thread immediately and the join in `Drop` returns without delay.

use crate::messages::EngineMessage;
use crate::timeline::TimedEvent;
use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Where and how fast a run starts
#[derive(Debug, Clone, Copy)]
pub struct RunParams {
    /// Playback run id stamped on every message
    pub run: u64,
    /// Timeline position to start from
    pub from: Duration,
    /// Timeline end; `Finished` is sent once it is reached
    pub end: Duration,
    pub speed: f64,
}

/// Scheduled note emission for one playback run
pub struct PlaybackWorker {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackWorker {
    pub fn spawn(
        events: Arc<[TimedEvent]>,
        params: RunParams,
        engine_tx: Sender<EngineMessage>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = flume::bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("lyre-playback".into())
            .spawn(move || Self::run(&events, params, &engine_tx, &cancel_rx))
            .expect("Failed to spawn playback worker thread");

        Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        }
    }

    /// Sleep until `due` (relative to `started`); false if cancelled
    fn wait_until(started: Instant, due: Duration, cancel: &Receiver<()>) -> bool {
        let elapsed = started.elapsed();
        if due > elapsed {
            matches!(
                cancel.recv_timeout(due - elapsed),
                Err(RecvTimeoutError::Timeout)
            )
        } else {
            matches!(cancel.try_recv(), Err(TryRecvError::Empty))
        }
    }

    fn run(
        events: &[TimedEvent],
        params: RunParams,
        engine_tx: &Sender<EngineMessage>,
        cancel: &Receiver<()>,
    ) {
        let RunParams { run, from, end, speed } = params;
        let started = Instant::now();
        let first = events.partition_point(|e| e.time < from);

        log::debug!(
            "Playback: run {} from {:?} ({} events pending, speed {})",
            run,
            from,
            events.len() - first,
            speed
        );

        for timed in &events[first..] {
            if timed.is_orphaned_at(from) {
                continue;
            }
            let due = (timed.time - from).div_f64(speed);
            if !Self::wait_until(started, due, cancel) {
                log::debug!("Playback: run {} cancelled", run);
                return;
            }
            let message = EngineMessage::NoteDue {
                run,
                event: timed.event,
            };
            if engine_tx.send(message).is_err() {
                return;
            }
        }

        let due = end.saturating_sub(from).div_f64(speed);
        if Self::wait_until(started, due, cancel) {
            log::debug!("Playback: run {} reached the end", run);
            let _ = engine_tx.send(EngineMessage::Finished { run });
        }
    }
}

impl Drop for PlaybackWorker {
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
    use crate::timeline::NoteEvent;

    fn timed(time_ms: u64, onset_ms: u64, event: NoteEvent) -> TimedEvent {
        TimedEvent {
            time: Duration::from_millis(time_ms),
            onset: Duration::from_millis(onset_ms),
            event,
        }
    }

    fn events() -> Arc<[TimedEvent]> {
        vec![
            timed(0, 0, NoteEvent::on(0, 60, 100)),
            timed(10, 0, NoteEvent::off(0, 60)),
            timed(20, 20, NoteEvent::on(0, 62, 100)),
            timed(30, 20, NoteEvent::off(0, 62)),
        ]
        .into()
    }

    fn params(from_ms: u64) -> RunParams {
        RunParams {
            run: 3,
            from: Duration::from_millis(from_ms),
            end: Duration::from_millis(30),
            speed: 4.0,
        }
    }

    #[test]
    fn test_emits_in_order_then_finishes() {
        let (tx, rx) = flume::unbounded();
        let _worker = PlaybackWorker::spawn(events(), params(0), tx);

        let mut pitches = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                EngineMessage::NoteDue { run, event } => {
                    assert_eq!(run, 3);
                    pitches.push((event.pitch, event.is_release()));
                }
                EngineMessage::Finished { run } => {
                    assert_eq!(run, 3);
                    break;
                }
                _ => panic!("unexpected message"),
            }
        }
        assert_eq!(pitches, vec![(60, false), (60, true), (62, false), (62, true)]);
    }

    #[test]
    fn test_starts_from_position() {
        let (tx, rx) = flume::unbounded();
        let _worker = PlaybackWorker::spawn(events(), params(20), tx);

        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            EngineMessage::NoteDue { event, .. } => assert_eq!(event.pitch, 62),
            _ => panic!("expected a note"),
        }
    }

    #[test]
    fn test_skips_release_of_note_started_before_position() {
        let (tx, rx) = flume::unbounded();
        // 60 sounds from 0 to 10; starting at 5 must not release it
        let _worker = PlaybackWorker::spawn(events(), params(5), tx);

        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            EngineMessage::NoteDue { event, .. } => assert_eq!(event, NoteEvent::on(0, 62, 100)),
            _ => panic!("expected a note"),
        }
    }

    #[test]
    fn test_drop_cancels_pending_events() {
        let (tx, rx) = flume::unbounded();
        let late: Arc<[TimedEvent]> = vec![timed(30_000, 30_000, NoteEvent::on(0, 60, 100))].into();
        let worker = PlaybackWorker::spawn(
            late,
            RunParams { run: 1, from: Duration::ZERO, end: Duration::from_secs(31), speed: 1.0 },
            tx,
        );

        let started = Instant::now();
        drop(worker);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(rx.try_recv().is_err());
    }
}
