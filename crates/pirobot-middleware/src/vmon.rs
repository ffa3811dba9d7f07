//! [`MainVmon`] – reports the main battery voltage to the driver station.
//!
//! A robot may carry several voltage monitors; exactly one of them is the
//! *main* monitor, and only its readings are published as `vbat0`.

use parking_lot::Mutex;
use pirobot_types::DeviceId;

use crate::network_table::NetworkTable;

/// Network-table key holding the main battery voltage.
pub const MAIN_BATTERY_KEY: &str = "vbat0";

pub struct MainVmon {
    main: Mutex<Option<DeviceId>>,
    table: NetworkTable,
}

impl MainVmon {
    pub fn new(table: NetworkTable) -> Self {
        Self {
            main: Mutex::new(None),
            table,
        }
    }

    /// Designate `device` as the main voltage monitor, replacing any
    /// previous one.
    pub fn make_main(&self, device: DeviceId) {
        *self.main.lock() = Some(device);
    }

    pub fn is_main(&self, device: DeviceId) -> bool {
        *self.main.lock() == Some(device)
    }

    /// Publish `voltage` if `device` is the main monitor.  Returns whether
    /// the reading was published.
    pub fn send_main_battery_voltage(&self, device: DeviceId, voltage: f64) -> bool {
        if !self.is_main(device) {
            return false;
        }
        self.table.set(MAIN_BATTERY_KEY, format!("{voltage:.2}"));
        true
    }
}
