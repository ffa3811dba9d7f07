use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Multiplier applied to the periodic rate when no explicit watchdog timeout
/// is configured.
pub const WATCHDOG_TIMEOUT_FACTOR: u64 = 3;

/// Number of watchdog polls per periodic interval.
const WATCHDOG_POLLS_PER_PERIOD: u32 = 10;

/// Upper bound for every period and timeout in a [`RobotProfile`] (one
/// hour), keeping deadline arithmetic far from overflow.
pub const MAX_PERIOD_MS: u64 = 60 * 60 * 1000;

// ────────────────────────────────────────────────────────────────────────────
// Identifiers
// ────────────────────────────────────────────────────────────────────────────

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a device.  Used as the key of the action
/// lock table and of the device registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(u64);

impl DeviceId {
    /// Allocate a fresh identifier.
    pub fn next() -> Self {
        Self(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Process-unique identifier of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(u64);

impl ActionId {
    /// Allocate a fresh identifier.
    pub fn next() -> Self {
        Self(NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action#{}", self.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Robot mode
// ────────────────────────────────────────────────────────────────────────────

/// Robot-wide operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RobotMode {
    Enabled,
    #[default]
    Disabled,
}

impl RobotMode {
    pub fn is_enabled(self) -> bool {
        matches!(self, RobotMode::Enabled)
    }
}

impl fmt::Display for RobotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RobotMode::Enabled => write!(f, "ENABLED"),
            RobotMode::Disabled => write!(f, "DISABLED"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Robot profile
// ────────────────────────────────────────────────────────────────────────────

/// Settings that configure general robot behaviour.
///
/// Fixed once the robot is created.  Every field has a default so a partial
/// `[profile]` table in a TOML file is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotProfile {
    /// Number of worker threads on the main scheduler.
    pub main_scheduler_threads: usize,
    /// Rate of the robot periodic functions, in milliseconds.
    pub periodic_function_rate_ms: u64,
    /// Maximum age of gamepad data before it is considered invalid, in
    /// milliseconds.
    pub max_gamepad_data_age_ms: u64,
    /// Rate of the action and trigger ticks, in milliseconds.
    pub action_function_period_ms: u64,
    /// Explicit watchdog timeout.  When absent the timeout is
    /// [`WATCHDOG_TIMEOUT_FACTOR`] times the periodic rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watchdog_timeout_ms: Option<u64>,
}

impl Default for RobotProfile {
    fn default() -> Self {
        Self {
            main_scheduler_threads: 10,
            periodic_function_rate_ms: 50,
            max_gamepad_data_age_ms: 100,
            action_function_period_ms: 50,
            watchdog_timeout_ms: None,
        }
    }
}

impl RobotProfile {
    /// Check every field, returning the first problem found.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::InvalidProfile`] naming the offending field.
    pub fn validate(&self) -> Result<(), RobotError> {
        if self.main_scheduler_threads == 0 {
            return Err(invalid("main_scheduler_threads", "must be at least 1"));
        }
        for (field, ms) in [
            ("periodic_function_rate_ms", self.periodic_function_rate_ms),
            ("max_gamepad_data_age_ms", self.max_gamepad_data_age_ms),
            ("action_function_period_ms", self.action_function_period_ms),
        ] {
            check_period(field, ms)?;
        }
        if let Some(timeout) = self.watchdog_timeout_ms {
            check_period("watchdog_timeout_ms", timeout)?;
        } else if self.periodic_function_rate_ms * WATCHDOG_TIMEOUT_FACTOR > MAX_PERIOD_MS {
            return Err(invalid(
                "periodic_function_rate_ms",
                &format!("derived watchdog timeout must not exceed {MAX_PERIOD_MS} ms"),
            ));
        }
        if let Some(timeout) = self.watchdog_timeout_ms
            && timeout <= self.periodic_function_rate_ms
        {
            return Err(invalid(
                "watchdog_timeout_ms",
                &format!(
                    "{timeout} ms must be larger than the periodic rate ({} ms)",
                    self.periodic_function_rate_ms
                ),
            ));
        }
        Ok(())
    }

    pub fn periodic_rate(&self) -> Duration {
        Duration::from_millis(self.periodic_function_rate_ms)
    }

    pub fn action_period(&self) -> Duration {
        Duration::from_millis(self.action_function_period_ms)
    }

    pub fn max_gamepad_data_age(&self) -> Duration {
        Duration::from_millis(self.max_gamepad_data_age_ms)
    }

    /// Time without a feed after which the watchdog trips.
    pub fn watchdog_timeout(&self) -> Duration {
        let ms = self
            .watchdog_timeout_ms
            .unwrap_or(self.periodic_function_rate_ms.saturating_mul(WATCHDOG_TIMEOUT_FACTOR));
        Duration::from_millis(ms)
    }

    /// How often the watchdog monitor checks the last feed time.
    pub fn watchdog_poll_interval(&self) -> Duration {
        (self.periodic_rate() / WATCHDOG_POLLS_PER_PERIOD).max(Duration::from_millis(1))
    }
}

/// Console log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    /// Newline-delimited JSON, for log aggregators.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = RobotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(RobotError::Config(format!("unknown log format {other:?}"))),
        }
    }
}

fn check_period(field: &str, ms: u64) -> Result<(), RobotError> {
    if ms == 0 {
        return Err(invalid(field, "must be at least 1 ms"));
    }
    if ms > MAX_PERIOD_MS {
        return Err(invalid(field, &format!("must not exceed {MAX_PERIOD_MS} ms")));
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> RobotError {
    RobotError::InvalidProfile {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Telemetry
// ────────────────────────────────────────────────────────────────────────────

/// Unified wrapper for everything the robot sends to the outside world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "pirobot-runtime::robot"
    pub source: String,
    pub payload: TelemetryPayload,
}

impl TelemetryEvent {
    pub fn new(source: impl Into<String>, payload: TelemetryPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data carried by a [`TelemetryEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryPayload {
    /// One formatted log line.
    Log(String),
    /// A network-table entry written by the robot.
    TableEntry { key: String, value: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every PiRobot crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RobotError {
    #[error("Invalid robot profile: {field} {reason}")]
    InvalidProfile { field: String, reason: String },

    #[error("Robot already started")]
    AlreadyStarted,

    #[error("Robot not started")]
    NotStarted,

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Action {action} failed: {details}")]
    Action { action: String, details: String },

    #[error("Robot hook {hook} failed: {details}")]
    Hook { hook: String, details: String },

    #[error("Telemetry Error: {0}")]
    Telemetry(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl RobotError {
    /// Shorthand for [`RobotError::HardwareFault`].
    pub fn hardware(component: impl Into<String>, details: impl Into<String>) -> Self {
        RobotError::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }

    /// Shorthand for [`RobotError::Action`].
    pub fn action(action: impl Into<String>, details: impl Into<String>) -> Self {
        RobotError::Action {
            action: action.into(),
            details: details.into(),
        }
    }
}
