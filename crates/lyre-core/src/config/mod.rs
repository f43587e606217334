//! Configuration for the lyre player
//!
//! - `PlayerSettings`: every option the transport and dispatcher consume,
//!   injected into the engine at spawn and replaced with `UpdateSettings`
//! - Generic YAML load/save helpers
//! - Default config locations

mod io;
mod paths;
mod settings;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};
pub use settings::{PlayerSettings, MAX_SPEED, MIN_SPEED};
pub(crate) use settings::clamp_speed;
