//! Robot configuration – reads/writes `~/.pirobot/config.toml`.
//!
//! ```toml
//! auto_enable = false
//! log_format = "compact"
//!
//! [profile]
//! main_scheduler_threads = 10
//! periodic_function_rate_ms = 50
//! max_gamepad_data_age_ms = 100
//! action_function_period_ms = 50
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use pirobot_types::{LogFormat, RobotError, RobotProfile};
use serde::{Deserialize, Serialize};

/// Persisted configuration of the `pirobot` binary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Enable the robot as soon as it has started, without waiting for a
    /// driver station.
    #[serde(default)]
    pub auto_enable: bool,

    /// Console log format.  `PIROBOT_LOG_FORMAT` takes precedence.
    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub profile: RobotProfile,
}

/// Return the path to `~/.pirobot/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".pirobot").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, RobotError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, RobotError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| RobotError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| RobotError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `PIROBOT_*` environment variable overrides to `cfg`.  Values that
/// do not parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `PIROBOT_SCHEDULER_THREADS` | `profile.main_scheduler_threads` |
/// | `PIROBOT_PERIODIC_RATE_MS` | `profile.periodic_function_rate_ms` |
/// | `PIROBOT_ACTION_PERIOD_MS` | `profile.action_function_period_ms` |
/// | `PIROBOT_MAX_GAMEPAD_AGE_MS` | `profile.max_gamepad_data_age_ms` |
/// | `PIROBOT_AUTO_ENABLE` | `auto_enable` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(v) = env_parse("PIROBOT_SCHEDULER_THREADS") {
        cfg.profile.main_scheduler_threads = v;
    }
    if let Some(v) = env_parse("PIROBOT_PERIODIC_RATE_MS") {
        cfg.profile.periodic_function_rate_ms = v;
    }
    if let Some(v) = env_parse("PIROBOT_ACTION_PERIOD_MS") {
        cfg.profile.action_function_period_ms = v;
    }
    if let Some(v) = env_parse("PIROBOT_MAX_GAMEPAD_AGE_MS") {
        cfg.profile.max_gamepad_data_age_ms = v;
    }
    if let Ok(v) = std::env::var("PIROBOT_AUTO_ENABLE") {
        match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => cfg.auto_enable = true,
            "0" | "false" | "no" | "off" => cfg.auto_enable = false,
            _ => {}
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Save the config to disk, creating `~/.pirobot/` if necessary.
pub fn save(cfg: &Config) -> Result<(), RobotError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), RobotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RobotError::Config(format!("failed to create config directory: {e}")))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| RobotError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| RobotError::Config(format!("failed to write {}: {e}", path.display())))
}
