//! [`Watchdog`] – forces actuators off when the control loop stops feeding
//! it.
//!
//! Whatever owns the link to the operator (a driver-station connection, or
//! the application itself) calls [`Watchdog::feed`] each time it hears
//! from the other side.  A monitor thread polls the feed age; once it
//! exceeds the timeout the watchdog *trips* and disables every device that
//! asks to be disabled with the watchdog, whatever the robot mode.  The trip is repeated on
//! every poll while the loop stays starved, so a device re-enabled behind
//! the watchdog's back is silenced again.
//!
//! A trip is a recoverable state: the next feed while the robot is enabled
//! clears it and brings the affected devices back.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pirobot_kernel::registry::DeviceRegistry;
//! use pirobot_kernel::watchdog::Watchdog;
//!
//! let registry = Arc::new(DeviceRegistry::new());
//! let wd = Watchdog::new(Duration::from_millis(150), registry);
//! wd.feed(true);
//!
//! assert!(!wd.check());
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pirobot_types::RobotError;
use tracing::{debug, info, warn};

use crate::registry::DeviceRegistry;
use crate::stop::StopSignal;

struct WatchdogState {
    last_feed: Instant,
    tripped: bool,
}

pub struct Watchdog {
    timeout: Duration,
    state: Mutex<WatchdogState>,
    registry: Arc<DeviceRegistry>,
}

impl Watchdog {
    /// Create an armed watchdog.  The feed clock starts now.
    pub fn new(timeout: Duration, registry: Arc<DeviceRegistry>) -> Self {
        Self {
            timeout,
            state: Mutex::new(WatchdogState {
                last_feed: Instant::now(),
                tripped: false,
            }),
            registry,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record that the control loop is alive.
    ///
    /// If the watchdog had tripped and `robot_enabled` is set, the trip is
    /// cleared and watchdog-sensitive devices are re-enabled: all of them
    /// except mode-matching ones while the robot is disabled.  Feeding a
    /// disabled robot keeps the trip.
    pub fn feed(&self, robot_enabled: bool) {
        let mut state = self.state.lock();
        state.last_feed = Instant::now();
        if state.tripped && robot_enabled {
            state.tripped = false;
            self.registry.enable_watchdog_sensitive(robot_enabled);
            info!("watchdog fed again, outputs restored");
        }
    }

    /// Trip if the last feed is older than the timeout.  Returns whether
    /// the watchdog is tripped after the check.
    pub fn check(&self) -> bool {
        let mut state = self.state.lock();
        let age = state.last_feed.elapsed();
        if age <= self.timeout {
            return state.tripped;
        }

        if !state.tripped {
            state.tripped = true;
            warn!(
                age_ms = age.as_millis() as u64,
                timeout_ms = self.timeout.as_millis() as u64,
                "watchdog timed out"
            );
        }
        for device in self.registry.disable_watchdog_sensitive() {
            warn!(device = %device, "watchdog tripped, disabling device");
        }
        true
    }

    pub fn is_tripped(&self) -> bool {
        self.state.lock().tripped
    }

    /// Run `f` while holding the watchdog lock, only if the watchdog is not
    /// tripped.  Used to enable devices without racing a trip.
    pub fn while_armed<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let state = self.state.lock();
        if state.tripped {
            return None;
        }
        let result = f();
        drop(state);
        Some(result)
    }

    /// Spawn the monitor thread, which calls [`check`][Self::check] every
    /// `poll` until `stop` is triggered.
    ///
    /// # Errors
    ///
    /// [`RobotError::HardwareFault`] if the thread cannot be spawned.
    pub fn spawn_monitor(
        self: &Arc<Self>,
        poll: Duration,
        stop: StopSignal,
    ) -> Result<JoinHandle<()>, RobotError> {
        let watchdog = Arc::clone(self);
        thread::Builder::new()
            .name("pirobot-watchdog".into())
            .spawn(move || {
                debug!(poll_ms = poll.as_millis() as u64, "watchdog monitor running");
                while !stop.wait_timeout(poll) {
                    watchdog.check();
                }
                debug!("watchdog monitor stopped");
            })
            .map_err(|e| RobotError::hardware("watchdog", format!("failed to spawn monitor: {e}")))
    }
}
