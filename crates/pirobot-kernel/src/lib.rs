//! `pirobot-kernel` – Timing & Safety
//!
//! The part of the runtime that keeps time and keeps actuators safe.  It
//! does not know about robot applications or actions; it runs jobs, tracks
//! devices and silences them when the loop stalls.
//!
//! # Modules
//!
//! - [`scheduler`] – [`Scheduler`][scheduler::Scheduler]: periodic and
//!   one-shot jobs on a fixed worker pool, with overrun skipping.
//! - [`registry`] – [`DeviceRegistry`][registry::DeviceRegistry]: weak
//!   device list, deferred `begin()` queue and batch enable/disable passes.
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]: disables
//!   watchdog-sensitive devices when the feed goes stale.
//! - [`stop`] – [`StopSignal`][stop::StopSignal]: cancellation token shared
//!   with the signal handler.

pub mod registry;
pub mod scheduler;
pub mod stop;
pub mod watchdog;

pub use registry::DeviceRegistry;
pub use scheduler::{Job, JobHandle, Scheduler, panic_message};
pub use stop::StopSignal;
pub use watchdog::Watchdog;
