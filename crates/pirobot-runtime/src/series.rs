//! [`ActionSeries`] – runs a list of actions one after another.
//!
//! The series itself claims no devices; each child locks its own when it
//! starts.  Interrupting the series stops the child that is currently
//! running.  When the last child completes normally the optional follow-up
//! action is started.

use pirobot_types::RobotError;

use crate::action::{Action, ActionHandle};
use crate::action_manager::ActionManager;

pub struct ActionSeries {
    name: String,
    actions: Vec<ActionHandle>,
    index: usize,
    finished_action: Option<ActionHandle>,
}

impl ActionSeries {
    pub fn new(name: impl Into<String>, actions: Vec<ActionHandle>) -> Self {
        Self {
            name: name.into(),
            actions,
            index: 0,
            finished_action: None,
        }
    }

    /// Start `action` when the series completes without being interrupted.
    pub fn then(mut self, action: ActionHandle) -> Self {
        self.finished_action = Some(action);
        self
    }
}

impl Action for ActionSeries {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&mut self, actions: &ActionManager) -> Result<(), RobotError> {
        self.index = 0;
        if let Some(first) = self.actions.first() {
            actions.start(first);
        }
        Ok(())
    }

    fn process(&mut self, actions: &ActionManager) -> Result<(), RobotError> {
        let Some(current) = self.actions.get(self.index) else {
            return Ok(());
        };
        if current.is_finished() {
            self.index += 1;
            if let Some(next) = self.actions.get(self.index) {
                actions.start(next);
            }
        }
        Ok(())
    }

    fn finish(&mut self, actions: &ActionManager, was_interrupted: bool) -> Result<(), RobotError> {
        if was_interrupted {
            if let Some(current) = self.actions.get(self.index) {
                actions.stop(current);
            }
        } else if let Some(next) = &self.finished_action {
            actions.start(next);
        }
        Ok(())
    }

    fn should_continue(&mut self) -> bool {
        self.index < self.actions.len()
    }
}
