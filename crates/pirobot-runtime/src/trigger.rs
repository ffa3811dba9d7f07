//! [`ActionTrigger`] – edge detectors that start an action when a polled
//! condition becomes true.
//!
//! Triggers are registered with [`ActionManager::add_trigger`] and polled
//! on every trigger tick.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pirobot_hal::gamepad::{ControllerHub, Gamepad};
//! use pirobot_runtime::trigger::{ActionTrigger, ButtonPressedTrigger};
//!
//! let hub = ControllerHub::new();
//! let pad = Arc::new(Gamepad::new(0, hub.clone(), Duration::from_millis(100)));
//! let mut trigger = ButtonPressedTrigger::new(pad, 0);
//!
//! hub.update(0, vec![], vec![false], vec![]);
//! assert!(!trigger.should_run());
//! hub.update(0, vec![], vec![true], vec![]);
//! assert!(trigger.should_run());
//! assert!(!trigger.should_run());
//! ```
//!
//! [`ActionManager::add_trigger`]: crate::action_manager::ActionManager::add_trigger

use std::sync::Arc;

use pirobot_hal::gamepad::Gamepad;

/// Identifier returned by `add_trigger`, used to remove the trigger again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerId(pub(crate) u64);

/// A polled condition.  Returning `true` starts the bound action.
pub trait ActionTrigger: Send {
    fn should_run(&mut self) -> bool;
}

/// Any `FnMut() -> bool` closure is a trigger.
impl<F> ActionTrigger for F
where
    F: FnMut() -> bool + Send,
{
    fn should_run(&mut self) -> bool {
        self()
    }
}

/// Fires once each time a gamepad button goes from released to pressed.
///
/// Stale or missing controller data counts as "no change": the trigger does
/// not fire and remembers the last value it saw.
pub struct ButtonPressedTrigger {
    gamepad: Arc<Gamepad>,
    button: usize,
    last_value: bool,
}

impl ButtonPressedTrigger {
    pub fn new(gamepad: Arc<Gamepad>, button: usize) -> Self {
        Self {
            gamepad,
            button,
            last_value: false,
        }
    }
}

impl ActionTrigger for ButtonPressedTrigger {
    fn should_run(&mut self) -> bool {
        let Some(value) = self.gamepad.button(self.button) else {
            return false;
        };
        let fire = value && !self.last_value;
        self.last_value = value;
        fire
    }
}

/// Fires once each time a gamepad button goes from pressed to released.
pub struct ButtonReleasedTrigger {
    gamepad: Arc<Gamepad>,
    button: usize,
    last_value: bool,
}

impl ButtonReleasedTrigger {
    pub fn new(gamepad: Arc<Gamepad>, button: usize) -> Self {
        Self {
            gamepad,
            button,
            last_value: false,
        }
    }
}

impl ActionTrigger for ButtonReleasedTrigger {
    fn should_run(&mut self) -> bool {
        let Some(value) = self.gamepad.button(self.button) else {
            return false;
        };
        let fire = !value && self.last_value;
        self.last_value = value;
        fire
    }
}
