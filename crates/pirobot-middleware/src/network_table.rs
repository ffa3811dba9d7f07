//! [`NetworkTable`] – string key/value store shared between the robot and
//! the driver station.
//!
//! Writes from the robot are stored locally and published to the
//! [`TelemetrySink`]; writes coming back from the driver station only update
//! the local copy.  Publishing is best-effort.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pirobot_middleware::{NetworkTable, NullSink};
//!
//! let table = NetworkTable::new(Arc::new(NullSink));
//! table.set("robotstate", "DISABLED");
//! assert_eq!(table.get("robotstate").as_deref(), Some("DISABLED"));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::sink::TelemetrySink;

/// Key holding the robot mode (`ENABLED` / `DISABLED`).
pub const ROBOT_STATE_KEY: &str = "robotstate";

/// Cheaply cloneable handle; clones share the same entries.
#[derive(Clone)]
pub struct NetworkTable {
    entries: Arc<RwLock<HashMap<String, String>>>,
    sink: Arc<dyn TelemetrySink>,
}

impl NetworkTable {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            sink,
        }
    }

    /// Store `value` under `key` and publish it.  Line breaks in the key
    /// are removed since the wire format is line-based.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let key: String = key.into().chars().filter(|c| *c != '\n').collect();
        let value = value.into();
        self.entries.write().insert(key.clone(), value.clone());
        if !self.sink.send_entry(&key, &value) {
            trace!(key = %key, "network table entry not delivered");
        }
    }

    /// Store a value received from the driver station without echoing it
    /// back.
    pub fn set_from_remote(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Copy of every entry, e.g. to resync a reconnecting driver station.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.read().clone()
    }
}

impl std::fmt::Debug for NetworkTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkTable")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}
