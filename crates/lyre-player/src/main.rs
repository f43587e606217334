//! Lyre Player - plays MIDI files on a synthesizer or as instrument key presses
//!
//! This is the console entry point. It:
//! 1. Loads the config and key layouts
//! 2. Opens the synthesizer port (optional) and a live MIDI input (optional)
//! 3. Spawns the engine, queues the given files and starts playback
//! 4. Reads transport commands from stdin until `quit` or EOF
//!
//! ## Command line flags
//!
//! - `--config <path>`: use another config file
//! - `--list-ports`: print MIDI ports and exit
//! - `--keys`: print key presses instead of using the synthesizer
//! - `--synth`: send notes to the synthesizer port

mod config;
mod console;

use anyhow::{bail, Context, Result};
use config::PlayerConfig;
use console::{parse_command, ConsoleCommand, ConsoleFocus, ConsoleKeys, HELP};
use lyre_core::config::{load_config, save_config};
use lyre_core::{
    Backends, Engine, LayoutTable, PlayerEvent, SinkError, SynthOutput, TransportState,
};
use lyre_midi::{load_midi_file, LiveInputHandler, MidiConnection, SynthOutputHandler};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

/// Parsed command line
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    list_ports: bool,
    use_synthesizer: Option<bool>,
    files: Vec<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--list-ports" => args.list_ports = true,
            "--keys" => args.use_synthesizer = Some(false),
            "--synth" => args.use_synthesizer = Some(true),
            flag if flag.starts_with("--") => bail!("Unknown flag: {}", flag),
            file => args.files.push(PathBuf::from(file)),
        }
    }
    Ok(args)
}

fn list_ports() -> Result<()> {
    println!("MIDI outputs:");
    for name in MidiConnection::list_output_ports()? {
        println!("  {}", name);
    }
    println!("MIDI inputs:");
    for name in MidiConnection::list_input_ports()? {
        println!("  {}", name);
    }
    Ok(())
}

fn load_layouts(config: &PlayerConfig) -> LayoutTable {
    let mut layouts = LayoutTable::builtin();
    if let Some(path) = &config.midi.layouts_path {
        match LayoutTable::load_yaml(path) {
            Ok(extra) => layouts.extend(extra),
            Err(e) => log::warn!("Failed to load layouts from {:?}: {}", path, e),
        }
    }
    layouts
}

/// Print engine notifications until the engine goes away
fn print_events(events: flume::Receiver<PlayerEvent>) {
    let mut last_display = None;
    for event in events.iter() {
        match event {
            PlayerEvent::StateChanged(TransportState::AwaitingPolicyChoice) => {}
            PlayerEvent::StateChanged(state) => println!("[{}]", state),
            PlayerEvent::TrackListReady(tracks) => {
                for track in tracks {
                    let mark = if track.selected { 'x' } else { ' ' };
                    println!("  [{}] {}: {} ({} notes)", mark, track.index + 1, track.name, track.note_count);
                }
            }
            PlayerEvent::UnplayableNotes { pitches } => {
                println!("{} pitches cannot be played: {:?}", pitches.len(), pitches);
                println!("choose a transpose policy: up | down | ignore");
            }
            PlayerEvent::SynthesizerUnavailable { reason } => {
                println!("Synthesizer unavailable ({}), using key output", reason);
            }
            PlayerEvent::DispatchFailed { reason } => println!("Output failed: {}", reason),
            PlayerEvent::Status(status) => {
                if status.display != last_display {
                    if let Some(display) = &status.display {
                        println!("{}", display);
                    }
                    last_display = status.display;
                }
            }
            PlayerEvent::PositionChanged(_) => {}
        }
    }
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    if args.list_ports {
        return list_ports();
    }

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut config: PlayerConfig = load_config(&config_path);
    if !config_path.exists() {
        if let Err(e) = save_config(&config, &config_path) {
            log::warn!("Could not write default config: {:#}", e);
        }
    }
    if let Some(use_synthesizer) = args.use_synthesizer {
        config.settings.use_synthesizer = use_synthesizer;
    }

    let synthesizer = SynthOutputHandler::connect(&config.midi.synth_port)
        .map(|output| Box::new(output) as Box<dyn SynthOutput>)
        .map_err(|e| SinkError::Unavailable(e.to_string()));
    let backends = Backends {
        synthesizer,
        keyboard: Box::new(ConsoleKeys),
        focus: Box::new(ConsoleFocus),
    };

    let layouts = load_layouts(&config);
    let (engine, events) = Engine::spawn(config.settings.clone(), layouts, backends);
    let printer = std::thread::Builder::new()
        .name("lyre-console".into())
        .spawn(move || print_events(events))
        .context("Failed to spawn console thread")?;

    let live_input = match &config.midi.input_port {
        Some(port) => {
            let live = engine.live_input();
            match LiveInputHandler::connect(port, move |note| live.note(note)) {
                Ok(handler) => Some(handler),
                Err(e) => {
                    log::warn!("Live input disabled: {}", e);
                    None
                }
            }
        }
        None => None,
    };

    let mut queued = 0;
    for path in &args.files {
        match load_midi_file(path) {
            Ok(timeline) => {
                engine.enqueue(Arc::new(timeline))?;
                queued += 1;
            }
            Err(e) => log::error!("Skipping {:?}: {}", path, e),
        }
    }
    if queued == 0 && live_input.is_none() {
        bail!("Nothing to play: pass MIDI files or configure midi.input_port");
    }
    if queued > 0 {
        engine.play()?;
    }

    println!("{}", HELP);
    for line in std::io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        match parse_command(&line) {
            Some(ConsoleCommand::Control(command)) => engine.request(command)?,
            Some(ConsoleCommand::Help) => println!("{}", HELP),
            Some(ConsoleCommand::Quit) => break,
            None if line.trim().is_empty() => {}
            None => println!("unknown command, type 'help'"),
        }
    }

    engine.shutdown();
    let _ = printer.join();
    Ok(())
}
