//! [`Action`] – a short-lived, interruptible behaviour that may claim
//! exclusive control of devices.
//!
//! Actions are run by the [`ActionManager`]: `begin` once when started,
//! `process` on every action tick while [`Action::should_continue`] holds,
//! and `finish` once when the action completes or is interrupted by another
//! action that needs one of its devices.
//!
//! # Example
//!
//! ```rust
//! use pirobot_runtime::action::{Action, ActionHandle, ActionState};
//! use pirobot_runtime::action_manager::ActionManager;
//! use pirobot_types::RobotError;
//!
//! struct CountTo3(u32);
//!
//! impl Action for CountTo3 {
//!     fn name(&self) -> &str {
//!         "count_to_3"
//!     }
//!
//!     fn process(&mut self, _actions: &ActionManager) -> Result<(), RobotError> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//!
//!     fn should_continue(&mut self) -> bool {
//!         self.0 < 3
//!     }
//! }
//!
//! let manager = ActionManager::new();
//! let action = ActionHandle::new(CountTo3(0));
//! manager.start(&action);
//! for _ in 0..3 {
//!     manager.process_tick();
//! }
//! assert_eq!(action.state(), ActionState::Finished);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pirobot_types::{ActionId, DeviceId, RobotError};

use crate::action_manager::ActionManager;

/// Lifecycle of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionState {
    /// Never started.
    #[default]
    Idle,
    Running,
    /// Completed or interrupted.  Terminal until started again.
    Finished,
}

/// User-defined behaviour run by the [`ActionManager`].
///
/// Callbacks receive the manager so they can start or stop other actions
/// (or stop themselves).  Returning `Err` from `begin` or `process` ends
/// the action: it is marked finished and `finish(true)` is still called so
/// actuators can be neutralised.
pub trait Action: Send {
    fn name(&self) -> &str;

    /// Devices this action needs exclusive control over.  Read once each
    /// time the action is started.
    fn required_devices(&self) -> Vec<DeviceId> {
        Vec::new()
    }

    fn begin(&mut self, _actions: &ActionManager) -> Result<(), RobotError> {
        Ok(())
    }

    fn process(&mut self, actions: &ActionManager) -> Result<(), RobotError>;

    fn finish(&mut self, _actions: &ActionManager, _was_interrupted: bool) -> Result<(), RobotError> {
        Ok(())
    }

    /// Polled after every `process`; `false` completes the action.
    fn should_continue(&mut self) -> bool;
}

/// A callback invocation, queued when the action is busy on this thread.
#[derive(Debug, Clone)]
pub(crate) enum Op {
    Begin,
    Process,
    Finish { interrupted: bool },
    /// Queued behind an interrupted holder's `Finish`: once `waiting`
    /// holders have finished, `next` begins.
    Handoff {
        next: ActionHandle,
        waiting: Arc<AtomicUsize>,
    },
}

pub(crate) struct ActionCell {
    pub(crate) id: ActionId,
    pub(crate) name: String,
    /// Only written while the manager's table lock is held.
    pub(crate) state: Mutex<ActionState>,
    /// Devices read at the last start.
    pub(crate) devices: Mutex<Vec<DeviceId>>,
    pub(crate) behavior: Mutex<Box<dyn Action>>,
    pub(crate) pending: Mutex<VecDeque<Op>>,
}

/// Shared handle to an action.  Clones refer to the same action.
#[derive(Clone)]
pub struct ActionHandle {
    pub(crate) cell: Arc<ActionCell>,
}

impl ActionHandle {
    pub fn new(action: impl Action + 'static) -> Self {
        let name = action.name().to_string();
        Self {
            cell: Arc::new(ActionCell {
                id: ActionId::next(),
                name,
                state: Mutex::new(ActionState::Idle),
                devices: Mutex::new(Vec::new()),
                behavior: Mutex::new(Box::new(action)),
                pending: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn id(&self) -> ActionId {
        self.cell.id
    }

    pub fn name(&self) -> &str {
        &self.cell.name
    }

    pub fn state(&self) -> ActionState {
        *self.cell.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ActionState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state() == ActionState::Finished
    }

    /// `true` once the action has been started at least once.
    pub fn is_started(&self) -> bool {
        self.state() != ActionState::Idle
    }

    /// Devices claimed at the most recent start.
    pub fn locked_devices(&self) -> Vec<DeviceId> {
        self.cell.devices.lock().clone()
    }

    pub fn downgrade(&self) -> WeakActionHandle {
        WeakActionHandle(Arc::downgrade(&self.cell))
    }

    pub(crate) fn set_state(&self, state: ActionState) {
        *self.cell.state.lock() = state;
    }
}

impl PartialEq for ActionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for ActionHandle {}

impl std::fmt::Debug for ActionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionHandle")
            .field("id", &self.cell.id)
            .field("name", &self.cell.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Non-owning reference to an action, held by triggers.
#[derive(Clone, Debug)]
pub struct WeakActionHandle(Weak<ActionCell>);

impl WeakActionHandle {
    pub fn upgrade(&self) -> Option<ActionHandle> {
        self.0.upgrade().map(|cell| ActionHandle { cell })
    }
}
