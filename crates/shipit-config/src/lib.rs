//! Configuration for shipit.
//!
//! This crate handles:
//! - The KDL settings file (build service endpoint, timeouts, build command)
//! - The persisted git state (provider, token, owner, login)
//! - Locating the shipit home directory

pub mod error;
pub mod settings;
pub mod store;

pub use error::{ConfigError, ConfigResult};
pub use settings::{BuildSettings, CloudBuildSettings, Settings, load_settings, parse_settings};
pub use store::GitStateStore;

use std::path::PathBuf;

/// Environment variable overriding the shipit home directory.
pub const HOME_ENV: &str = "SHIPIT_HOME";

/// Settings file name inside the home directory.
pub const SETTINGS_FILE: &str = "settings.kdl";

/// Resolve the shipit home directory (`$SHIPIT_HOME` or `~/.shipit`).
pub fn shipit_home() -> ConfigResult<PathBuf> {
    if let Ok(dir) = std::env::var(HOME_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    dirs::home_dir()
        .map(|home| home.join(".shipit"))
        .ok_or(ConfigError::NoHomeDir)
}
