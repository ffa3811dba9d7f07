//! `pirobot-runtime` – the robot control loop.
//!
//! Ties the device layer, the scheduler, the watchdog and the telemetry
//! plumbing together into a [`Robot`] that an application drives through
//! the [`RobotApp`] hooks.
//!
//! # Modules
//!
//! - [`robot`] – [`Robot`]: lifecycle (`start`, `run`, `shutdown`) and the
//!   periodic jobs that call the application hooks.
//! - [`context`] – [`RobotContext`]: the shared handle passed to every hook,
//!   giving access to the mode, the watchdog feed, devices, actions, the
//!   network table and job scheduling.
//! - [`action`] / [`action_manager`] – [`Action`], [`ActionHandle`] and the
//!   [`ActionManager`] that runs actions and arbitrates device locks.
//! - [`series`] – [`ActionSeries`]: sequential composition of actions.
//! - [`trigger`] – [`ActionTrigger`] with gamepad button edge triggers.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   `tracing` subscriber, optional OTLP export and driver-station log
//!   forwarding.

pub mod action;
pub mod action_manager;
pub mod context;
pub mod robot;
pub mod series;
pub mod telemetry;
pub mod trigger;

pub use action::{Action, ActionHandle, ActionState, WeakActionHandle};
pub use action_manager::ActionManager;
pub use context::{RobotApp, RobotContext};
pub use robot::Robot;
pub use series::ActionSeries;
pub use telemetry::{TracerProviderGuard, init_tracing, init_tracing_with};
pub use trigger::{ActionTrigger, ButtonPressedTrigger, ButtonReleasedTrigger, TriggerId};
