//! In-process simulated adapters for CI/CD testing without physical hardware.
//!
//! [`SimMotorOutput`] records every command it receives into a shared
//! [`SimProbe`] so tests (and the demo binary) can observe what would have
//! been written to a motor driver.
//!
//! # Example
//!
//! ```rust
//! use pirobot_hal::device::Device;
//! use pirobot_hal::motor::MotorController;
//! use pirobot_hal::sim::SimMotorOutput;
//!
//! let output = SimMotorOutput::new("right");
//! let probe = output.probe();
//! let motor = MotorController::new("right_motor", output);
//! motor.begin().expect("sim motor must initialise");
//!
//! assert_eq!(probe.snapshot().init_calls, 1);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use pirobot_types::RobotError;

use crate::motor::MotorOutput;

// ────────────────────────────────────────────────────────────────────────────
// Probe
// ────────────────────────────────────────────────────────────────────────────

/// Last state written to a simulated motor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimOutputState {
    pub init_calls: usize,
    pub writes: usize,
    pub speed: f64,
    pub brake_mode: bool,
}

/// Cheaply cloneable view into a [`SimMotorOutput`].
#[derive(Debug, Clone, Default)]
pub struct SimProbe(Arc<Mutex<SimOutputState>>);

impl SimProbe {
    pub fn snapshot(&self) -> SimOutputState {
        *self.0.lock()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stub motor output
// ────────────────────────────────────────────────────────────────────────────

/// A simulated motor driver that records the most recent command.
pub struct SimMotorOutput {
    label: String,
    probe: SimProbe,
    fail_init: bool,
}

impl SimMotorOutput {
    /// Create a simulated output that always succeeds.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            probe: SimProbe::default(),
            fail_init: false,
        }
    }

    /// Create a simulated output whose initialisation fails, as if the
    /// driver chip were missing.
    pub fn failing(label: impl Into<String>) -> Self {
        Self {
            fail_init: true,
            ..Self::new(label)
        }
    }

    pub fn probe(&self) -> SimProbe {
        self.probe.clone()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl MotorOutput for SimMotorOutput {
    fn init(&mut self) -> Result<(), RobotError> {
        if self.fail_init {
            return Err(RobotError::hardware(
                self.label.clone(),
                "simulated driver not present",
            ));
        }
        self.probe.0.lock().init_calls += 1;
        Ok(())
    }

    fn apply(&mut self, speed: f64, brake_mode: bool) -> Result<(), RobotError> {
        let mut state = self.probe.0.lock();
        state.writes += 1;
        state.speed = speed;
        state.brake_mode = brake_mode;
        Ok(())
    }
}
