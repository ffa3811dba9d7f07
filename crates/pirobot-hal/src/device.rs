//! Generic `Device` trait for every actuator or sensor that takes part in
//! the enable/disable and watchdog lifecycle.
//!
//! Drivers implement this trait and register themselves with the runtime's
//! device registry.  The runtime only ever talks to the trait, so drivers can
//! be swapped without touching application logic.

use pirobot_types::{DeviceId, RobotError};

/// An actuator or sensor connected to the robot controller.
///
/// Every method takes `&self`: a device is shared between the application,
/// the runtime, the watchdog thread and running actions, so its mutable state
/// lives behind a lock private to the implementation.
///
/// `enable` and `disable` are driven by the runtime.  Application code
/// should not call them directly.
pub trait Device: Send + Sync {
    /// Process-unique identifier, stable for the lifetime of the device.
    fn id(&self) -> DeviceId;

    /// Human-readable name used in diagnostics, e.g. `"L298NMotor(3)"`.
    fn device_name(&self) -> String;

    /// One-time hardware initialisation.
    ///
    /// The runtime calls this exactly once, after the robot has started.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::HardwareFault`] when the hardware cannot be
    /// initialised.  The device then stays uninitialised and ignores
    /// enable requests.
    fn begin(&self) -> Result<(), RobotError>;

    fn is_enabled(&self) -> bool;

    /// Apply hardware output.
    fn enable(&self);

    /// Withdraw hardware output and bring it to a neutral state.  Must be
    /// safe to call repeatedly and from the watchdog thread.
    fn disable(&self);

    /// `true` when the device should follow the robot's enabled/disabled
    /// mode.
    fn should_match_robot_state(&self) -> bool;

    /// `true` when the device must be forced off by a watchdog trip.
    fn should_disable_with_watchdog(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Minimal in-process device used only for tests.
    struct MockRelay {
        id: DeviceId,
        enabled: Mutex<bool>,
    }

    impl Device for MockRelay {
        fn id(&self) -> DeviceId {
            self.id
        }

        fn device_name(&self) -> String {
            "MockRelay".to_string()
        }

        fn begin(&self) -> Result<(), RobotError> {
            Ok(())
        }

        fn is_enabled(&self) -> bool {
            *self.enabled.lock()
        }

        fn enable(&self) {
            *self.enabled.lock() = true;
        }

        fn disable(&self) {
            *self.enabled.lock() = false;
        }

        fn should_match_robot_state(&self) -> bool {
            true
        }

        fn should_disable_with_watchdog(&self) -> bool {
            true
        }
    }

    #[test]
    fn device_is_usable_as_trait_object() {
        let relay = MockRelay {
            id: DeviceId::next(),
            enabled: Mutex::new(false),
        };
        let device: &dyn Device = &relay;
        assert_eq!(device.device_name(), "MockRelay");
        assert!(!device.is_enabled());

        device.enable();
        assert!(device.is_enabled());

        device.disable();
        device.disable();
        assert!(!device.is_enabled());
    }
}
