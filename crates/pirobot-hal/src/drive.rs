//! Differential-drive helpers: turn driver input into left/right motor
//! speeds for any number of motors per side.
//!
//! - [`ArcadeDriveHelper`] – one speed and one rotation input.
//! - [`TankDriveHelper`] – one speed per side.
//!
//! Inputs are clamped to `[-1, 1]` before they reach the motors.

use std::sync::Arc;

use crate::motor::SpeedController;

/// Left/right output speeds for arcade input, without clamping.
///
/// Positive rotation turns clockwise (right side slows down).
pub fn calculate_arcade_speeds(speed: f64, rotation: f64) -> (f64, f64) {
    // Normalise negative zero so the quadrant test below is symmetric.
    let speed = speed + 0.0;
    let rotation = rotation + 0.0;

    let max_input = speed.abs().max(rotation.abs()).copysign(speed);

    if (rotation >= 0.0 && speed >= 0.0) || (rotation < 0.0 && speed < 0.0) {
        (max_input, speed - rotation)
    } else {
        (speed + rotation, max_input)
    }
}

fn clamp_input(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) }
}

/// Drives two groups of motors from a speed and a rotation.
pub struct ArcadeDriveHelper {
    left: Vec<Arc<dyn SpeedController>>,
    right: Vec<Arc<dyn SpeedController>>,
    speed: f64,
    rotation: f64,
}

impl ArcadeDriveHelper {
    pub fn new(left: Vec<Arc<dyn SpeedController>>, right: Vec<Arc<dyn SpeedController>>) -> Self {
        Self {
            left,
            right,
            speed: 0.0,
            rotation: 0.0,
        }
    }

    pub fn update_speed(&mut self, speed: f64) {
        self.speed = clamp_input(speed);
        self.apply();
    }

    pub fn update_rotation(&mut self, rotation: f64) {
        self.rotation = clamp_input(rotation);
        self.apply();
    }

    pub fn update(&mut self, speed: f64, rotation: f64) {
        self.speed = clamp_input(speed);
        self.rotation = clamp_input(rotation);
        self.apply();
    }

    fn apply(&self) {
        let (left, right) = calculate_arcade_speeds(self.speed, self.rotation);
        for motor in &self.left {
            motor.set_speed(left);
        }
        for motor in &self.right {
            motor.set_speed(right);
        }
    }
}

/// Drives two groups of motors from independent left and right speeds.
pub struct TankDriveHelper {
    left: Vec<Arc<dyn SpeedController>>,
    right: Vec<Arc<dyn SpeedController>>,
    left_speed: f64,
    right_speed: f64,
}

impl TankDriveHelper {
    pub fn new(left: Vec<Arc<dyn SpeedController>>, right: Vec<Arc<dyn SpeedController>>) -> Self {
        Self {
            left,
            right,
            left_speed: 0.0,
            right_speed: 0.0,
        }
    }

    pub fn update_left_speed(&mut self, speed: f64) {
        self.left_speed = clamp_input(speed);
        self.apply();
    }

    pub fn update_right_speed(&mut self, speed: f64) {
        self.right_speed = clamp_input(speed);
        self.apply();
    }

    pub fn update(&mut self, left: f64, right: f64) {
        self.left_speed = clamp_input(left);
        self.right_speed = clamp_input(right);
        self.apply();
    }

    fn apply(&self) {
        for motor in &self.left {
            motor.set_speed(self.left_speed);
        }
        for motor in &self.right {
            motor.set_speed(self.right_speed);
        }
    }
}
