//! [`DeviceRegistry`] – every device taking part in the enable/disable and
//! watchdog lifecycle.
//!
//! The registry only holds [`Weak`] references: the application owns its
//! devices and dropping one removes it from the lifecycle.  Devices
//! registered before the robot starts are queued and begun at start;
//! later registrations are begun immediately.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pirobot_hal::device::Device;
use pirobot_types::DeviceId;
use tracing::{debug, warn};

#[derive(Default)]
struct RegistryState {
    devices: Vec<Weak<dyn Device>>,
    pending: Vec<Weak<dyn Device>>,
    begun: HashSet<DeviceId>,
    started: bool,
}

#[derive(Default)]
pub struct DeviceRegistry {
    state: Mutex<RegistryState>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `device` to the lifecycle.  Registering the same device twice
    /// has no effect.
    pub fn register<D: Device + 'static>(&self, device: &Arc<D>) {
        let weak: Weak<dyn Device> = Arc::downgrade(device) as Weak<dyn Device>;
        let id = device.id();

        let begin_now = {
            let mut state = self.state.lock();
            let known = state
                .devices
                .iter()
                .filter_map(Weak::upgrade)
                .any(|d| d.id() == id);
            if known {
                return;
            }
            state.devices.push(weak.clone());
            if state.started {
                state.begun.insert(id);
                true
            } else {
                state.pending.push(weak);
                false
            }
        };

        if begin_now {
            begin_device(device.as_ref());
        }
    }

    /// Begin every queued device, then disable everything.  Called once by
    /// the runtime at start; later calls only begin newly queued devices.
    pub fn start(&self) {
        let pending: Vec<Arc<dyn Device>> = {
            let mut state = self.state.lock();
            state.started = true;
            let pending: Vec<_> = state.pending.drain(..).filter_map(|w| w.upgrade()).collect();
            pending
                .into_iter()
                .filter(|d| state.begun.insert(d.id()))
                .collect()
        };

        for device in &pending {
            begin_device(device.as_ref());
        }
        self.disable_all();
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Live devices, pruning the ones the application dropped.
    pub fn snapshot(&self) -> Vec<Arc<dyn Device>> {
        let mut state = self.state.lock();
        let mut live = Vec::with_capacity(state.devices.len());
        state.devices.retain(|w| match w.upgrade() {
            Some(device) => {
                live.push(device);
                true
            }
            None => false,
        });
        live
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn enable_mode_matching(&self) {
        for device in self.snapshot() {
            if device.should_match_robot_state() && !device.is_enabled() {
                device.enable();
            }
        }
    }

    pub fn disable_mode_matching(&self) {
        for device in self.snapshot() {
            if device.should_match_robot_state() && device.is_enabled() {
                device.disable();
            }
        }
    }

    /// Force off every watchdog-sensitive device, regardless of mode.
    /// Returns the names of the devices that were enabled.
    pub fn disable_watchdog_sensitive(&self) -> Vec<String> {
        let mut was_enabled = Vec::new();
        for device in self.snapshot() {
            if !device.should_disable_with_watchdog() {
                continue;
            }
            if device.is_enabled() {
                was_enabled.push(device.device_name());
            }
            device.disable();
        }
        was_enabled
    }

    /// Re-enable watchdog-sensitive devices after a trip clears.  Devices
    /// that follow the robot mode only come back when `robot_enabled`.
    pub fn enable_watchdog_sensitive(&self, robot_enabled: bool) {
        for device in self.snapshot() {
            if device.should_disable_with_watchdog()
                && (!device.should_match_robot_state() || robot_enabled)
            {
                device.enable();
            }
        }
    }

    pub fn disable_all(&self) {
        for device in self.snapshot() {
            device.disable();
        }
    }
}

fn begin_device(device: &dyn Device) {
    match device.begin() {
        Ok(()) => debug!(device = %device.device_name(), "device begun"),
        Err(e) => warn!(device = %device.device_name(), error = %e, "device failed to begin"),
    }
}
