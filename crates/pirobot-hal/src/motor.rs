//! [`MotorController`] – a [`Device`] that drives a single motor at a signed
//! speed in `[-1, 1]`.
//!
//! The chip-specific part (PWM duty cycle, direction pins, brake wiring) is
//! supplied by a [`MotorOutput`] adapter.  The controller owns the shared
//! state machine: enable/disable, inversion, brake mode and clamping, all
//! guarded by a lock private to the controller.
//!
//! # Example
//!
//! ```rust
//! use pirobot_hal::device::Device;
//! use pirobot_hal::motor::MotorController;
//! use pirobot_hal::sim::SimMotorOutput;
//!
//! let output = SimMotorOutput::new("left");
//! let probe = output.probe();
//! let motor = MotorController::new("left_motor", output);
//!
//! motor.begin().unwrap();
//! motor.enable();
//! motor.set_speed(0.6);
//! motor.set_inverted(true);
//!
//! assert!((motor.effective_speed() + 0.6).abs() < 1e-9);
//! assert!((probe.snapshot().speed + 0.6).abs() < 1e-9);
//! ```

use parking_lot::Mutex;
use pirobot_types::{DeviceId, RobotError};
use tracing::{debug, warn};

use crate::device::Device;

/// Hardware backend of a [`MotorController`].
///
/// Implemented by motor-driver adapters (L298N, TB6612, DRV8833, motor HATs,
/// …) and by the simulated [`SimMotorOutput`][crate::sim::SimMotorOutput].
pub trait MotorOutput: Send {
    /// One-time hardware initialisation (pin modes, PWM setup).
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::HardwareFault`] if the hardware is unavailable.
    fn init(&mut self) -> Result<(), RobotError>;

    /// Drive the hardware at `speed` (already inverted, in `[-1, 1]`).  A
    /// speed of zero must brake when `brake_mode` is set and coast
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::HardwareFault`] if the write fails.
    fn apply(&mut self, speed: f64, brake_mode: bool) -> Result<(), RobotError>;
}

/// Anything that accepts a signed speed command.  Drive helpers talk to
/// motors through this trait so they can mix different adapters.
pub trait SpeedController: Send + Sync {
    fn set_speed(&self, speed: f64);
    fn speed(&self) -> f64;
}

struct MotorState<O> {
    output: O,
    initialized: bool,
    enabled: bool,
    /// Output speed with inversion already applied.
    speed: f64,
    inverted: bool,
    brake_mode: bool,
}

impl<O: MotorOutput> MotorState<O> {
    fn factor(&self) -> f64 {
        if self.inverted { -1.0 } else { 1.0 }
    }

    // Push the current speed/brake state to the hardware.  Write failures
    // are logged and otherwise ignored.
    fn run(&mut self, name: &str) {
        if let Err(e) = self.output.apply(self.speed, self.brake_mode) {
            warn!(device = %name, error = %e, "motor output write failed");
        }
    }
}

/// A motor driven at a signed speed through a [`MotorOutput`] adapter.
///
/// Speed commands are ignored while the controller is disabled, and
/// disabling always zeroes the output.  Matches the robot mode and is
/// forced off by the watchdog.
pub struct MotorController<O: MotorOutput> {
    id: DeviceId,
    name: String,
    state: Mutex<MotorState<O>>,
}

impl<O: MotorOutput> MotorController<O> {
    pub fn new(name: impl Into<String>, output: O) -> Self {
        Self {
            id: DeviceId::next(),
            name: name.into(),
            state: Mutex::new(MotorState {
                output,
                initialized: false,
                enabled: false,
                speed: 0.0,
                inverted: false,
                brake_mode: false,
            }),
        }
    }

    /// Set the requested speed, clamped to `[-1, 1]`.  No-op while disabled.
    pub fn set_speed(&self, speed: f64) {
        let mut state = self.state.lock();
        if !state.enabled {
            return;
        }
        let speed = if speed.is_nan() { 0.0 } else { speed.clamp(-1.0, 1.0) };
        state.speed = speed * state.factor();
        state.run(&self.name);
    }

    /// The last requested speed as the caller set it (inversion removed).
    /// Zero while disabled.
    pub fn speed(&self) -> f64 {
        let state = self.state.lock();
        if !state.enabled {
            return 0.0;
        }
        state.speed * state.factor()
    }

    /// The signed speed actually sent to the hardware.
    pub fn effective_speed(&self) -> f64 {
        self.state.lock().speed
    }

    pub fn is_inverted(&self) -> bool {
        self.state.lock().inverted
    }

    /// Flip the motor direction.  The requested speed is preserved, so the
    /// output changes sign immediately.
    pub fn set_inverted(&self, inverted: bool) {
        let mut state = self.state.lock();
        let requested = state.speed * state.factor();
        state.inverted = inverted;
        state.speed = requested * state.factor();
        if state.enabled {
            state.run(&self.name);
        }
    }

    pub fn is_brake_mode(&self) -> bool {
        self.state.lock().brake_mode
    }

    /// When set, a motor at zero speed resists motion instead of coasting.
    pub fn set_brake_mode(&self, brake_mode: bool) {
        let mut state = self.state.lock();
        state.brake_mode = brake_mode;
        if state.enabled {
            state.run(&self.name);
        }
    }

    /// Run `f` against the adapter, e.g. to read adapter-specific status.
    pub fn with_output<R>(&self, f: impl FnOnce(&O) -> R) -> R {
        f(&self.state.lock().output)
    }
}

impl<O: MotorOutput> Device for MotorController<O> {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn device_name(&self) -> String {
        self.name.clone()
    }

    fn begin(&self) -> Result<(), RobotError> {
        let mut state = self.state.lock();
        if state.initialized {
            return Ok(());
        }
        state.output.init()?;
        state.initialized = true;
        state.speed = 0.0;
        state.run(&self.name);
        debug!(device = %self.name, "motor initialised");
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    fn enable(&self) {
        let mut state = self.state.lock();
        if !state.initialized {
            return;
        }
        state.enabled = true;
    }

    fn disable(&self) {
        let mut state = self.state.lock();
        if !state.initialized {
            return;
        }
        state.enabled = false;
        state.speed = 0.0;
        state.run(&self.name);
    }

    fn should_match_robot_state(&self) -> bool {
        true
    }

    fn should_disable_with_watchdog(&self) -> bool {
        true
    }
}

impl<O: MotorOutput> SpeedController for MotorController<O> {
    fn set_speed(&self, speed: f64) {
        MotorController::set_speed(self, speed);
    }

    fn speed(&self) -> f64 {
        MotorController::speed(self)
    }
}

impl<O: MotorOutput> Drop for MotorController<O> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.initialized {
            state.speed = 0.0;
            state.enabled = false;
            if let Err(e) = state.output.apply(0.0, state.brake_mode) {
                warn!(device = %self.name, error = %e, "motor output write failed on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimMotorOutput;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn enabled_motor() -> (MotorController<SimMotorOutput>, crate::sim::SimProbe) {
        let output = SimMotorOutput::new("test");
        let probe = output.probe();
        let motor = MotorController::new("test_motor", output);
        motor.begin().unwrap();
        motor.enable();
        (motor, probe)
    }

    #[test]
    fn inversion_applies_to_output_not_requested_speed() {
        let (motor, probe) = enabled_motor();
        motor.set_speed(0.6);
        motor.set_inverted(true);

        assert!((motor.effective_speed() - (-0.6)).abs() < 1e-9);
        assert!((motor.speed() - 0.6).abs() < 1e-9);
        assert!((probe.snapshot().speed - (-0.6)).abs() < 1e-9);
        assert!(motor.is_inverted());
    }

    #[test]
    fn speed_set_after_inversion_is_negated_at_output() {
        let (motor, probe) = enabled_motor();
        motor.set_inverted(true);
        motor.set_speed(0.25);
        assert!((probe.snapshot().speed + 0.25).abs() < 1e-9);

        motor.set_inverted(false);
        assert!((probe.snapshot().speed - 0.25).abs() < 1e-9);
    }

    #[test]
    fn speed_is_clamped() {
        let (motor, _) = enabled_motor();
        motor.set_speed(3.0);
        assert!((motor.speed() - 1.0).abs() < 1e-9);
        motor.set_speed(-7.5);
        assert!((motor.speed() + 1.0).abs() < 1e-9);
        motor.set_speed(f64::NAN);
        assert_eq!(motor.speed(), 0.0);
    }

    #[test]
    fn set_speed_is_ignored_while_disabled() {
        let output = SimMotorOutput::new("test");
        let probe = output.probe();
        let motor = MotorController::new("test_motor", output);
        motor.begin().unwrap();

        motor.set_speed(0.8);
        assert_eq!(motor.speed(), 0.0);
        assert_eq!(probe.snapshot().speed, 0.0);
    }

    #[test]
    fn disable_zeroes_output() {
        let (motor, probe) = enabled_motor();
        motor.set_speed(-0.4);
        motor.disable();

        assert!(!motor.is_enabled());
        assert_eq!(motor.effective_speed(), 0.0);
        assert_eq!(probe.snapshot().speed, 0.0);

        // Repeated disables are harmless.
        motor.disable();
        assert_eq!(probe.snapshot().speed, 0.0);
    }

    #[test]
    fn enable_before_begin_is_ignored() {
        let motor = MotorController::new("cold", SimMotorOutput::new("cold"));
        motor.enable();
        assert!(!motor.is_enabled());
    }

    #[test]
    fn begin_initialises_once() {
        let output = SimMotorOutput::new("test");
        let probe = output.probe();
        let motor = MotorController::new("test_motor", output);
        motor.begin().unwrap();
        motor.begin().unwrap();
        assert_eq!(probe.snapshot().init_calls, 1);
    }

    #[test]
    fn failed_init_leaves_motor_uninitialised() {
        let motor = MotorController::new("broken", SimMotorOutput::failing("broken"));
        assert!(matches!(motor.begin(), Err(RobotError::HardwareFault { .. })));
        motor.enable();
        assert!(!motor.is_enabled());
    }

    #[test]
    fn brake_mode_is_forwarded_to_output() {
        let (motor, probe) = enabled_motor();
        motor.set_brake_mode(true);
        assert!(motor.is_brake_mode());
        assert!(probe.snapshot().brake_mode);
    }

    #[test]
    fn drop_zeroes_output() {
        let (motor, probe) = enabled_motor();
        motor.set_speed(0.9);
        drop(motor);
        assert_eq!(probe.snapshot().speed, 0.0);
    }

    struct FailingOutput {
        writes: Arc<AtomicUsize>,
    }

    impl MotorOutput for FailingOutput {
        fn init(&mut self) -> Result<(), RobotError> {
            Ok(())
        }

        fn apply(&mut self, _speed: f64, _brake_mode: bool) -> Result<(), RobotError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(RobotError::hardware("failing", "bus unplugged"))
        }
    }

    #[test]
    fn drop_survives_a_failing_output_write() {
        let writes = Arc::new(AtomicUsize::new(0));
        let motor = MotorController::new("flaky", FailingOutput { writes: writes.clone() });
        motor.begin().unwrap();
        motor.enable();
        motor.set_speed(0.5);
        let before = writes.load(Ordering::SeqCst);

        drop(motor);
        assert_eq!(writes.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn usable_through_speed_controller_trait() {
        let (motor, _) = enabled_motor();
        let controller: &dyn SpeedController = &motor;
        controller.set_speed(0.3);
        assert!((controller.speed() - 0.3).abs() < 1e-9);
    }
}
