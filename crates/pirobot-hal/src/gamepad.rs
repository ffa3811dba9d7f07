//! [`Gamepad`] – a [`Device`] reading controller input fed in from outside
//! the robot (driver station, Bluetooth bridge, tests).
//!
//! Input arrives through a shared [`ControllerHub`]; every reading carries
//! the instant it was received and readings older than the configured
//! maximum age are ignored, so a dropped connection cannot leave a stick
//! stuck at full throttle.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use pirobot_hal::gamepad::{ControllerHub, Gamepad};
//!
//! let hub = ControllerHub::new();
//! let pad = Gamepad::new(0, hub.clone(), Duration::from_millis(100));
//!
//! hub.update(0, vec![0.5, -1.0], vec![false, true], vec![0]);
//! assert_eq!(pad.button(1), Some(true));
//! assert!((pad.axis(0, 0.0) - 0.5).abs() < 1e-9);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use pirobot_types::{DeviceId, RobotError};

use crate::axis::AxisTransform;
use crate::device::Device;

// ────────────────────────────────────────────────────────────────────────────
// ControllerHub
// ────────────────────────────────────────────────────────────────────────────

/// One snapshot of a controller's inputs.
#[derive(Debug, Clone)]
pub struct ControllerData {
    pub axes: Vec<f64>,
    pub buttons: Vec<bool>,
    pub dpads: Vec<i32>,
    pub last_update: Instant,
}

/// Latest input of every connected controller, keyed by controller number.
///
/// Cheap to clone; clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct ControllerHub {
    inner: Arc<RwLock<HashMap<u8, ControllerData>>>,
}

impl ControllerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the inputs of `controller`, stamped with the current instant.
    pub fn update(&self, controller: u8, axes: Vec<f64>, buttons: Vec<bool>, dpads: Vec<i32>) {
        self.update_at(controller, axes, buttons, dpads, Instant::now());
    }

    /// Like [`update`][Self::update] with an explicit receive instant.
    pub fn update_at(
        &self,
        controller: u8,
        axes: Vec<f64>,
        buttons: Vec<bool>,
        dpads: Vec<i32>,
        received: Instant,
    ) {
        self.inner.write().insert(
            controller,
            ControllerData {
                axes,
                buttons,
                dpads,
                last_update: received,
            },
        );
    }

    /// Forget a controller, e.g. after the driver station disconnects.
    pub fn remove(&self, controller: u8) {
        self.inner.write().remove(&controller);
    }

    /// Read the inputs of `controller` if they are younger than `max_age`.
    pub fn read<R>(
        &self,
        controller: u8,
        max_age: Duration,
        f: impl FnOnce(&ControllerData) -> R,
    ) -> Option<R> {
        let store = self.inner.read();
        let data = store.get(&controller)?;
        if data.last_update.elapsed() > max_age {
            return None;
        }
        Some(f(data))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Gamepad
// ────────────────────────────────────────────────────────────────────────────

/// A gamepad identified by its controller number.
///
/// Never matches the robot mode and is ignored by the watchdog: input must
/// stay readable while the robot is disabled.
pub struct Gamepad {
    id: DeviceId,
    controller: u8,
    hub: ControllerHub,
    max_age: Duration,
    transforms: Mutex<HashMap<usize, Arc<dyn AxisTransform>>>,
}

impl Gamepad {
    pub fn new(controller: u8, hub: ControllerHub, max_age: Duration) -> Self {
        Self {
            id: DeviceId::next(),
            controller,
            hub,
            max_age,
            transforms: Mutex::new(HashMap::new()),
        }
    }

    pub fn controller(&self) -> u8 {
        self.controller
    }

    /// State of button `n`, or `None` when the controller has not reported,
    /// its data is stale, or the button does not exist.
    pub fn button(&self, n: usize) -> Option<bool> {
        self.hub
            .read(self.controller, self.max_age, |d| d.buttons.get(n).copied())
            .flatten()
    }

    /// State of button `n`, `false` when unavailable.
    pub fn get_button(&self, n: usize) -> bool {
        self.button(n).unwrap_or(false)
    }

    /// Value of axis `n` after the deadband and any axis transform.
    ///
    /// Values inside `deadband` read as zero; the rest of the range is
    /// rescaled linearly so the output still spans `[-1, 1]`.  A deadband
    /// of 1 or more swallows the whole range.  Unavailable axes read as
    /// zero.
    pub fn axis(&self, n: usize, deadband: f64) -> f64 {
        let Some(mut value) = self
            .hub
            .read(self.controller, self.max_age, |d| d.axes.get(n).copied())
            .flatten()
        else {
            return 0.0;
        };

        let deadband = if deadband.is_nan() { 0.0 } else { deadband.abs() };
        if deadband >= 1.0 || value.abs() < deadband {
            return 0.0;
        }
        if deadband != 0.0 {
            value = (value - deadband.copysign(value)) / (1.0 - deadband);
        }

        match self.transforms.lock().get(&n) {
            Some(transform) => transform.apply(value),
            None => value,
        }
    }

    /// Position of dpad `n` (0 = centred), zero when unavailable.
    pub fn dpad(&self, n: usize) -> i32 {
        self.hub
            .read(self.controller, self.max_age, |d| d.dpads.get(n).copied())
            .flatten()
            .unwrap_or(0)
    }

    pub fn set_axis_transform(&self, n: usize, transform: Arc<dyn AxisTransform>) {
        self.transforms.lock().insert(n, transform);
    }

    pub fn clear_axis_transform(&self, n: usize) {
        self.transforms.lock().remove(&n);
    }
}

impl Device for Gamepad {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn device_name(&self) -> String {
        format!("Gamepad({})", self.controller)
    }

    fn begin(&self) -> Result<(), RobotError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn enable(&self) {}

    fn disable(&self) {}

    fn should_match_robot_state(&self) -> bool {
        false
    }

    fn should_disable_with_watchdog(&self) -> bool {
        false
    }
}
