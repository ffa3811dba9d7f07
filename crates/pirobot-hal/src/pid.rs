//! Discrete PID (Proportional–Integral–Derivative) controller with
//! feed-forward.
//!
//! The controller is meant to be stepped once per control-loop tick: the
//! integral is a running sum of errors and the derivative is the change in
//! error since the previous step, so the gains already include the tick
//! period.  It is hardware-agnostic: the caller supplies the measured
//! process variable and applies the output to any actuator.
//!
//! # Example
//!
//! ```rust
//! use pirobot_hal::pid::Pid;
//!
//! let mut pid = Pid::new(0.05, 0.0, 0.0);
//! pid.set_setpoint(90.0); // target heading in degrees
//!
//! let output = pid.output(0.0);
//! assert!(output > 0.0);
//! assert!(output <= 1.0); // clamped to [-1, 1] by default
//! ```

/// A tunable PID controller for closed-loop feedback control.
///
/// Output is clamped to `[min, max]`, which defaults to `[-1, 1]` so it can
/// be passed straight to a motor speed.
#[derive(Debug, Clone)]
pub struct Pid {
    kp: f64,
    ki: f64,
    kd: f64,
    kf: f64,
    min: f64,
    max: f64,
    setpoint: f64,
    integral: f64,
    last_error: f64,
}

impl Pid {
    /// Create a controller with the given gains, no feed-forward and output
    /// limits of `[-1, 1]`.
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self::with_limits(kp, ki, kd, 0.0, -1.0, 1.0)
    }

    pub fn with_limits(kp: f64, ki: f64, kd: f64, kf: f64, min: f64, max: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            kf,
            min,
            max,
            setpoint: 0.0,
            integral: 0.0,
            last_error: 0.0,
        }
    }

    pub fn kp(&self) -> f64 {
        self.kp
    }

    pub fn ki(&self) -> f64 {
        self.ki
    }

    pub fn kd(&self) -> f64 {
        self.kd
    }

    pub fn kf(&self) -> f64 {
        self.kf
    }

    /// Update the proportional, integral and derivative gains.
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
    }

    /// Feed-forward gain, multiplied by the set-point.
    pub fn set_kf(&mut self, kf: f64) {
        self.kf = kf;
    }

    pub fn limits(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    pub fn set_limits(&mut self, min: f64, max: f64) {
        self.min = min;
        self.max = max;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    /// Clear the integral accumulator and derivative memory.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
    }

    /// Compute the next output for the measured process variable `pv`.
    pub fn output(&mut self, pv: f64) -> f64 {
        let error = self.setpoint - pv;
        self.integral += error;

        let output = self.kf * self.setpoint
            + self.kp * error
            + self.ki * self.integral
            + self.kd * (error - self.last_error);
        self.last_error = error;

        output.max(self.min).min(self.max)
    }
}
