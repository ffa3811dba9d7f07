//! `pirobot-hal` – Hardware Abstraction Layer
//!
//! Everything the runtime knows about hardware goes through the traits in
//! this crate.  Chip-specific drivers live outside and implement the small
//! adapter traits; the simulated adapters in [`sim`] run the whole stack
//! without a Raspberry Pi.
//!
//! # Modules
//!
//! - [`device`] – [`Device`][device::Device]: the enable/disable and
//!   watchdog lifecycle shared by every actuator and sensor.
//! - [`motor`] – [`MotorController`][motor::MotorController] and the
//!   [`MotorOutput`][motor::MotorOutput] adapter trait.
//! - [`sim`] – [`SimMotorOutput`][sim::SimMotorOutput] for tests and demos.
//! - [`gamepad`] – [`Gamepad`][gamepad::Gamepad] reading controller input
//!   from a shared [`ControllerHub`][gamepad::ControllerHub].
//! - [`axis`] – stick response curves.
//! - [`drive`] – arcade and tank drive helpers.
//! - [`pid`] – [`Pid`][pid::Pid] feedback controller.

pub mod axis;
pub mod device;
pub mod drive;
pub mod gamepad;
pub mod motor;
pub mod pid;
pub mod sim;

pub use axis::{AxisTransform, CubicAxisTransform, SquareRootAxisTransform};
pub use device::Device;
pub use drive::{ArcadeDriveHelper, TankDriveHelper, calculate_arcade_speeds};
pub use gamepad::{ControllerData, ControllerHub, Gamepad};
pub use motor::{MotorController, MotorOutput, SpeedController};
pub use pid::Pid;
pub use sim::{SimMotorOutput, SimOutputState, SimProbe};
