//! Lyre Core - note dispatch engine for the lyre MIDI player
//!
//! This crate provides:
//! - Timeline model and key layouts
//! - Transpose mapper and merge preprocessor
//! - Playlist and loop controller
//! - Transport state machine driven by typed messages
//! - Event dispatcher with synthesizer and key-injection sinks
//! - Clock watcher and playback worker threads
//!
//! # Architecture
//!
//! ```text
//! EngineHandle ─┐
//! ClockWatcher ─┼─ flume ─► engine thread (Transport) ─► Dispatcher ─► sink
//! PlaybackWorker┘                  │
//!                                  └─► PlayerEvent (flume) ─► UI
//! ```
//!
//! Device access is injected through the `SynthOutput`, `KeyInjector` and
//! `FocusTarget` traits; this crate does no I/O of its own.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod layout;
pub mod merge;
pub mod messages;
pub mod playlist;
pub mod session;
pub mod timeline;
pub mod transport;
pub mod transpose;
pub mod worker;

pub use config::PlayerSettings;
pub use dispatch::{Backends, FocusTarget, KeyInjector, SinkKind, SynthOutput};
pub use engine::{Engine, EngineHandle, LiveInput};
pub use error::{EngineError, LayoutError, SinkError};
pub use layout::{KeyId, KeyLayout, LayoutTable};
pub use messages::{ControlCommand, PlayerEvent, TransportStatus};
pub use playlist::LoopMode;
pub use timeline::{Note, NoteEvent, NoteEventKind, Timeline, Track, TrackInfo};
pub use transport::TransportState;
pub use transpose::TransposePolicy;
