//! Default locations of lyre-player configuration files

use std::path::PathBuf;

const APP_DIR: &str = "lyre-player";

/// Per-user configuration directory
///
/// Returns: `<config_dir>/lyre-player` (e.g. `~/.config/lyre-player` on Linux),
/// falling back to `./lyre-player` when no config dir is known.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Path of a named config file inside the default config directory
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_app_dir() {
        assert!(default_config_dir().ends_with("lyre-player"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        let path = default_config_path("config.yaml");
        assert!(path.ends_with("lyre-player/config.yaml"));
    }
}
