//! [`TelemetrySink`] – where log lines and network-table entries leave the
//! robot.
//!
//! Sinks are best-effort: a failed send returns `false` and the caller moves
//! on.  Nothing on the control path ever waits for a driver station.

/// Destination for outgoing telemetry.
pub trait TelemetrySink: Send + Sync {
    /// Send one formatted log line.  Returns `true` if it was handed to at
    /// least one consumer.
    fn send(&self, line: &str) -> bool;

    /// Send one network-table entry.
    ///
    /// The default implementation forwards `key=value` as a plain line.
    fn send_entry(&self, key: &str, value: &str) -> bool {
        self.send(&format!("{key}={value}"))
    }
}

/// A sink that drops everything.  Used when no driver station is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn send(&self, _line: &str) -> bool {
        false
    }
}
