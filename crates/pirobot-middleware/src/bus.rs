//! Headless, topic-based publish/subscribe bus for outgoing telemetry.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber (driver-station bridge, dashboard, test) receives every
//! message without any single subscriber blocking the control loop.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Log`] | Formatted log lines, one event per line |
//! | [`Topic::NetworkTable`] | Network-table writes (`robotstate`, `vbat0`, …) |

use pirobot_types::{RobotError, TelemetryEvent, TelemetryPayload};
use tokio::sync::broadcast;
use tracing::warn;

use crate::sink::TelemetrySink;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Source tag stamped on events published through [`TelemetrySink`].
const SINK_SOURCE: &str = "pirobot-middleware::bus";

/// Routing lanes of the [`TelemetryBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Log,
    NetworkTable,
}

/// Shared telemetry bus. Clone it cheaply – all clones share the same
/// underlying broadcast channels.
#[derive(Clone, Debug)]
pub struct TelemetryBus {
    log: broadcast::Sender<TelemetryEvent>,
    network_table: broadcast::Sender<TelemetryEvent>,
}

impl TelemetryBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (log, _) = broadcast::channel(capacity);
        let (network_table, _) = broadcast::channel(capacity);
        Self { log, network_table }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::Telemetry`] when nobody is subscribed to the
    /// topic.
    pub fn publish_to(&self, topic: Topic, event: TelemetryEvent) -> Result<usize, RobotError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| RobotError::Telemetry(format!("No subscribers for topic {topic:?}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<TelemetryEvent> {
        match topic {
            Topic::Log => &self.log,
            Topic::NetworkTable => &self.network_table,
        }
    }
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TelemetrySink for TelemetryBus {
    fn send(&self, line: &str) -> bool {
        let event = TelemetryEvent::new(SINK_SOURCE, TelemetryPayload::Log(line.to_string()));
        self.publish_to(Topic::Log, event).is_ok()
    }

    fn send_entry(&self, key: &str, value: &str) -> bool {
        let event = TelemetryEvent::new(
            SINK_SOURCE,
            TelemetryPayload::TableEntry {
                key: key.to_string(),
                value: value.to_string(),
            },
        );
        self.publish_to(Topic::NetworkTable, event).is_ok()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Topic-based receiver
// ────────────────────────────────────────────────────────────────────────────

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`TelemetryBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<TelemetryEvent>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<TelemetryEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Like [`recv`][Self::recv] but skips over lag, logging how many
    /// events were lost.  Returns `None` once the bus is closed.
    pub async fn next(&mut self) -> Option<TelemetryEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "telemetry subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive, for synchronous consumers.
    pub fn try_recv(&mut self) -> Result<TelemetryEvent, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
