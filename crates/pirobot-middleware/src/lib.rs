//! `pirobot-middleware` – Telemetry egress
//!
//! Everything the robot reports to the outside world (log lines, network
//! table writes, battery voltage) leaves through this crate without the
//! control loop ever waiting on a consumer.
//!
//! # Modules
//!
//! - [`sink`] – [`TelemetrySink`]: best-effort destination trait, plus
//!   [`NullSink`].
//! - [`bus`] – [`TelemetryBus`]: topic-based broadcast bus built on Tokio
//!   broadcast channels.
//! - [`network_table`] – [`NetworkTable`]: key/value store shared with the
//!   driver station.
//! - [`vmon`] – [`MainVmon`]: main battery voltage reporting.
//! - [`log_layer`] – [`SinkLayer`]: forwards `tracing` events to a sink.

pub mod bus;
pub mod log_layer;
pub mod network_table;
pub mod sink;
pub mod vmon;

pub use bus::{TelemetryBus, Topic, TopicReceiver};
pub use log_layer::SinkLayer;
pub use network_table::{NetworkTable, ROBOT_STATE_KEY};
pub use sink::{NullSink, TelemetrySink};
pub use vmon::{MAIN_BATTERY_KEY, MainVmon};
