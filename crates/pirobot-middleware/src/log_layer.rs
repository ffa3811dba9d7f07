//! [`SinkLayer`] – a `tracing-subscriber` layer that forwards every log
//! event to a [`TelemetrySink`] as one line:
//!
//! ```text
//! [WARNING]: pirobot_kernel::watchdog - watchdog tripped, disabling device device="left_motor"
//! ```

use std::fmt::{self, Write as _};
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::sink::TelemetrySink;

pub struct SinkLayer {
    sink: Arc<dyn TelemetrySink>,
}

impl SinkLayer {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }
}

fn level_label(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

/// Collects the `message` field and renders the remaining fields as
/// `key=value` pairs.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Render `event` in the driver-station log format.
pub fn format_line(event: &Event<'_>) -> String {
    let meta = event.metadata();
    let mut visitor = LineVisitor::default();
    event.record(&mut visitor);
    format!(
        "[{}]: {} - {}{}",
        level_label(meta.level()),
        meta.target(),
        visitor.message,
        visitor.fields
    )
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        // Delivery failures are expected while no driver station listens.
        let _ = self.sink.send(&format_line(event));
    }
}
