//! [`ActionManager`] – starts, stops and ticks [`Action`]s and arbitrates
//! device ownership between them.
//!
//! # Device locks
//!
//! Each running action holds a lock on every device it listed in
//! [`Action::required_devices`].  Starting an action that needs a locked
//! device interrupts the holder first: in a single table update the holder
//! is marked finished and loses its locks while the new action takes them;
//! then the holders' `finish(true)` callbacks run (in the order their
//! devices appear in the new action's list), and only then does the new
//! action `begin`.  A holder interrupted from inside one of its own
//! callbacks finishes when that callback returns, and the new action's
//! `begin` is held back until then.
//!
//! # Re-entrancy
//!
//! Callbacks may call back into the manager.  Callbacks are serialised by a
//! re-entrant execution lock; a callback aimed at an action that is already
//! inside one of its own callbacks on this thread is queued and runs as
//! soon as that callback returns.  The lock table is never held while user
//! code runs.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use pirobot_kernel::panic_message;
use pirobot_types::{ActionId, DeviceId, RobotError};
use tracing::{debug, error};

use crate::action::{Action, ActionHandle, ActionState, Op, WeakActionHandle};
use crate::trigger::{ActionTrigger, TriggerId};

#[derive(Default)]
struct ActionTable {
    /// Running actions in start order.
    running: Vec<ActionHandle>,
    locks: HashMap<DeviceId, ActionId>,
}

impl ActionTable {
    /// Mark `action` finished and drop its locks.  Returns `false` if it was
    /// not running.
    fn retire(&mut self, action: &ActionHandle) -> bool {
        if action.state() != ActionState::Running {
            return false;
        }
        action.set_state(ActionState::Finished);
        let id = action.id();
        self.locks.retain(|_, owner| *owner != id);
        self.running.retain(|a| a.id() != id);
        true
    }
}

struct TriggerBinding {
    id: TriggerId,
    trigger: Box<dyn ActionTrigger>,
    target: WeakActionHandle,
    do_restart: bool,
}

static NEXT_TRIGGER_ID: AtomicU64 = AtomicU64::new(1);

/// Registry of running actions, the device lock table and the trigger
/// list.
pub struct ActionManager {
    exec: ReentrantMutex<()>,
    table: Mutex<ActionTable>,
    triggers: Mutex<Vec<TriggerBinding>>,
}

impl Default for ActionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionManager {
    pub fn new() -> Self {
        Self {
            exec: ReentrantMutex::new(()),
            table: Mutex::new(ActionTable::default()),
            triggers: Mutex::new(Vec::new()),
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Start / stop
    // ────────────────────────────────────────────────────────────────────────

    /// Start `action`.  No-op returning `false` if it is already running.
    pub fn start(&self, action: &ActionHandle) -> bool {
        self.start_with_restart(action, false)
    }

    /// Start `action`.  When it is already running it is either left alone
    /// (`do_restart == false`, returns `false`) or finished as interrupted
    /// and started again.
    pub fn start_with_restart(&self, action: &ActionHandle, do_restart: bool) -> bool {
        let _exec = self.exec.lock();

        if action.is_running() {
            if !do_restart {
                return false;
            }
            self.stop(action);
        }

        let required = self.read_required_devices(action);

        let interrupted = {
            let mut table = self.table.lock();

            let mut holders: Vec<ActionHandle> = Vec::new();
            for device in &required {
                let Some(owner) = table.locks.get(device).copied() else {
                    continue;
                };
                if owner == action.id() || holders.iter().any(|h| h.id() == owner) {
                    continue;
                }
                if let Some(holder) = table.running.iter().find(|a| a.id() == owner) {
                    holders.push(holder.clone());
                }
            }

            for holder in &holders {
                table.retire(holder);
            }
            action.set_state(ActionState::Running);
            for device in &required {
                table.locks.insert(*device, action.id());
            }
            table.running.push(action.clone());
            holders
        };

        let mut deferred = Vec::new();
        for holder in &interrupted {
            debug!(action = %holder.name(), by = %action.name(), "action interrupted");
            if !self.invoke(holder, Op::Finish { interrupted: true }) {
                deferred.push(holder);
            }
        }
        debug!(action = %action.name(), "action started");
        if deferred.is_empty() {
            self.invoke(action, Op::Begin);
        } else {
            // A holder interrupted from inside its own callback finishes
            // when that callback returns; `begin` has to wait for it.
            let waiting = Arc::new(AtomicUsize::new(deferred.len()));
            for holder in deferred {
                holder.cell.pending.lock().push_back(Op::Handoff {
                    next: action.clone(),
                    waiting: waiting.clone(),
                });
            }
        }
        true
    }

    /// Stop `action` as interrupted.  Returns `false` if it was not running.
    pub fn stop(&self, action: &ActionHandle) -> bool {
        let _exec = self.exec.lock();
        if !self.table.lock().retire(action) {
            return false;
        }
        debug!(action = %action.name(), "action stopped");
        self.invoke(action, Op::Finish { interrupted: true });
        true
    }

    /// Interrupt every running action, most recently started first.
    pub fn stop_all(&self) {
        let _exec = self.exec.lock();
        let stopped: Vec<ActionHandle> = {
            let mut table = self.table.lock();
            let running: Vec<_> = table.running.iter().rev().cloned().collect();
            running.into_iter().filter(|a| table.retire(a)).collect()
        };
        for action in &stopped {
            self.invoke(action, Op::Finish { interrupted: true });
        }
    }

    /// Run one action tick: `process` every running action in start order,
    /// completing the ones whose `should_continue` turns false.
    pub fn process_tick(&self) {
        let _exec = self.exec.lock();
        let running = self.table.lock().running.clone();
        for action in &running {
            if action.is_running() {
                self.invoke(action, Op::Process);
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Queries
    // ────────────────────────────────────────────────────────────────────────

    /// The running action holding a lock on `device`, if any.
    pub fn lock_owner(&self, device: DeviceId) -> Option<ActionId> {
        self.table.lock().locks.get(&device).copied()
    }

    /// Running actions in start order.
    pub fn running(&self) -> Vec<ActionHandle> {
        self.table.lock().running.clone()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Triggers
    // ────────────────────────────────────────────────────────────────────────

    /// Start `target` (with `do_restart`) whenever `trigger` fires.  The
    /// binding holds only a weak reference to the target.
    pub fn add_trigger(
        &self,
        trigger: impl ActionTrigger + 'static,
        target: &ActionHandle,
        do_restart: bool,
    ) -> TriggerId {
        let id = TriggerId(NEXT_TRIGGER_ID.fetch_add(1, Ordering::Relaxed));
        self.triggers.lock().push(TriggerBinding {
            id,
            trigger: Box::new(trigger),
            target: target.downgrade(),
            do_restart,
        });
        id
    }

    /// Returns `false` if no trigger with `id` was registered.
    pub fn remove_trigger(&self, id: TriggerId) -> bool {
        let mut triggers = self.triggers.lock();
        let before = triggers.len();
        triggers.retain(|b| b.id != id);
        triggers.len() != before
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.lock().len()
    }

    /// Poll every trigger once and start the targets of those that fire.
    /// Triggers whose target has been dropped are discarded.
    pub fn check_triggers(&self) {
        let fired: Vec<(ActionHandle, bool)> = {
            let mut triggers = self.triggers.lock();
            triggers.retain(|b| b.target.upgrade().is_some());

            let mut fired = Vec::new();
            for binding in triggers.iter_mut() {
                let Some(target) = binding.target.upgrade() else {
                    continue;
                };
                match catch_unwind(AssertUnwindSafe(|| binding.trigger.should_run())) {
                    Ok(true) => fired.push((target, binding.do_restart)),
                    Ok(false) => {}
                    Err(panic) => error!(
                        action = %target.name(),
                        panic = %panic_message(&*panic),
                        "action trigger panicked"
                    ),
                }
            }
            fired
        };

        for (target, do_restart) in fired {
            self.start_with_restart(&target, do_restart);
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Callback execution
    // ────────────────────────────────────────────────────────────────────────

    fn read_required_devices(&self, action: &ActionHandle) -> Vec<DeviceId> {
        // The behaviour is only busy when this thread is inside one of the
        // action's own callbacks; reuse the devices from the previous start.
        let Some(behavior) = action.cell.behavior.try_lock() else {
            return action.locked_devices();
        };
        let mut devices = Vec::new();
        for device in behavior.required_devices() {
            if !devices.contains(&device) {
                devices.push(device);
            }
        }
        drop(behavior);
        *action.cell.devices.lock() = devices.clone();
        devices
    }

    /// Run `op` on `action` now, or queue it if the action is already inside
    /// a callback on this thread.  Returns `false` when queued.
    fn invoke(&self, action: &ActionHandle, op: Op) -> bool {
        let Some(mut behavior) = action.cell.behavior.try_lock() else {
            action.cell.pending.lock().push_back(op);
            return false;
        };

        self.run_op(action, behavior.as_mut(), op);
        loop {
            let next = action.cell.pending.lock().pop_front();
            match next {
                Some(op) => self.run_op(action, behavior.as_mut(), op),
                None => break,
            }
        }
        true
    }

    fn run_op(&self, action: &ActionHandle, behavior: &mut dyn Action, op: Op) {
        match op {
            Op::Begin => {
                if let Err(details) = guarded(|| behavior.begin(self)) {
                    error!(action = %action.name(), error = %details, "action begin failed");
                    self.abort(action, behavior);
                }
            }
            Op::Process => {
                if !action.is_running() {
                    return;
                }
                if let Err(details) = guarded(|| behavior.process(self)) {
                    error!(action = %action.name(), error = %details, "action process failed");
                    self.abort(action, behavior);
                    return;
                }
                if !action.is_running() {
                    // Stopped itself from inside `process`.
                    return;
                }
                let keep_going = match catch_unwind(AssertUnwindSafe(|| behavior.should_continue())) {
                    Ok(keep_going) => keep_going,
                    Err(panic) => {
                        error!(
                            action = %action.name(),
                            panic = %panic_message(&*panic),
                            "action should_continue panicked"
                        );
                        self.abort(action, behavior);
                        return;
                    }
                };
                if !keep_going && self.table.lock().retire(action) {
                    debug!(action = %action.name(), "action completed");
                    self.call_finish(action, behavior, false);
                }
            }
            Op::Finish { interrupted } => self.call_finish(action, behavior, interrupted),
            Op::Handoff { next, waiting } => {
                // Skipped when `next` was stopped before its turn came.
                if waiting.fetch_sub(1, Ordering::SeqCst) == 1 && next.is_running() {
                    self.invoke(&next, Op::Begin);
                }
            }
        }
    }

    /// Force a failed action to finished and give it a chance to neutralise
    /// its actuators.
    fn abort(&self, action: &ActionHandle, behavior: &mut dyn Action) {
        if self.table.lock().retire(action) {
            self.call_finish(action, behavior, true);
        }
    }

    fn call_finish(&self, action: &ActionHandle, behavior: &mut dyn Action, interrupted: bool) {
        if let Err(details) = guarded(|| behavior.finish(self, interrupted)) {
            error!(action = %action.name(), error = %details, "action finish failed");
        }
    }
}

/// Run an action callback, turning both `Err` and panics into a message.
fn guarded(f: impl FnOnce() -> Result<(), RobotError>) -> Result<(), String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(format!("panicked: {}", panic_message(&*panic))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Action double that records its callbacks into a shared log.
    struct Probe {
        name: String,
        devices: Vec<DeviceId>,
        log: Log,
        ticks_left: Option<u32>,
        fail_begin: bool,
        panic_in_process: bool,
    }

    impl Probe {
        fn new(name: &str, devices: &[DeviceId], log: &Log) -> Self {
            Self {
                name: name.to_string(),
                devices: devices.to_vec(),
                log: log.clone(),
                ticks_left: None,
                fail_begin: false,
                panic_in_process: false,
            }
        }

        fn record(&self, what: &str) {
            self.log.lock().push(format!("{}:{what}", self.name));
        }
    }

    impl Action for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        fn required_devices(&self) -> Vec<DeviceId> {
            self.devices.clone()
        }

        fn begin(&mut self, _actions: &ActionManager) -> Result<(), RobotError> {
            self.record("begin");
            if self.fail_begin {
                return Err(RobotError::action(&self.name, "refused to begin"));
            }
            Ok(())
        }

        fn process(&mut self, _actions: &ActionManager) -> Result<(), RobotError> {
            self.record("process");
            if self.panic_in_process {
                panic!("process blew up");
            }
            if let Some(left) = self.ticks_left.as_mut() {
                *left = left.saturating_sub(1);
            }
            Ok(())
        }

        fn finish(&mut self, _actions: &ActionManager, was_interrupted: bool) -> Result<(), RobotError> {
            self.record(if was_interrupted { "finish(interrupted)" } else { "finish" });
            Ok(())
        }

        fn should_continue(&mut self) -> bool {
            self.ticks_left != Some(0)
        }
    }

    fn new_log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().clone()
    }

    #[test]
    fn start_locks_devices_and_begins() {
        let manager = ActionManager::new();
        let log = new_log();
        let motor = DeviceId::next();
        let action = ActionHandle::new(Probe::new("drive", &[motor], &log));

        assert!(manager.start(&action));
        assert!(action.is_running());
        assert_eq!(manager.lock_owner(motor), Some(action.id()));
        assert_eq!(entries(&log), ["drive:begin"]);
    }

    #[test]
    fn starting_a_running_action_without_restart_is_a_noop() {
        let manager = ActionManager::new();
        let log = new_log();
        let action = ActionHandle::new(Probe::new("a", &[], &log));

        assert!(manager.start(&action));
        assert!(!manager.start(&action));
        assert_eq!(entries(&log), ["a:begin"]);
        assert_eq!(manager.running().len(), 1);
    }

    #[test]
    fn restart_finishes_then_begins_again() {
        let manager = ActionManager::new();
        let log = new_log();
        let action = ActionHandle::new(Probe::new("a", &[], &log));

        manager.start(&action);
        assert!(manager.start_with_restart(&action, true));
        assert_eq!(entries(&log), ["a:begin", "a:finish(interrupted)", "a:begin"]);
        assert!(action.is_running());
    }

    #[test]
    fn contested_device_interrupts_holder_before_new_action_begins() {
        let manager = ActionManager::new();
        let log = new_log();
        let motor = DeviceId::next();
        let b = ActionHandle::new(Probe::new("b", &[motor], &log));
        let a = ActionHandle::new(Probe::new("a", &[motor], &log));

        manager.start(&b);
        manager.start(&a);

        assert_eq!(entries(&log), ["b:begin", "b:finish(interrupted)", "a:begin"]);
        assert_eq!(manager.lock_owner(motor), Some(a.id()));
        assert!(b.is_finished());
        assert_eq!(manager.running(), vec![a]);
    }

    #[test]
    fn multiple_holders_are_interrupted_in_device_order() {
        let manager = ActionManager::new();
        let log = new_log();
        let left = DeviceId::next();
        let right = DeviceId::next();
        let arm = DeviceId::next();

        let holds_left = ActionHandle::new(Probe::new("left", &[left, arm], &log));
        let holds_right = ActionHandle::new(Probe::new("right", &[right], &log));
        manager.start(&holds_left);
        manager.start(&holds_right);
        log.lock().clear();

        let both = ActionHandle::new(Probe::new("both", &[right, left, arm], &log));
        manager.start(&both);

        assert_eq!(
            entries(&log),
            ["right:finish(interrupted)", "left:finish(interrupted)", "both:begin"]
        );
        for device in [left, right, arm] {
            assert_eq!(manager.lock_owner(device), Some(both.id()));
        }
    }

    #[test]
    fn uncontested_actions_run_side_by_side() {
        let manager = ActionManager::new();
        let log = new_log();
        let a = ActionHandle::new(Probe::new("a", &[DeviceId::next()], &log));
        let b = ActionHandle::new(Probe::new("b", &[DeviceId::next()], &log));
        manager.start(&a);
        manager.start(&b);
        assert!(a.is_running() && b.is_running());
    }

    #[test]
    fn stop_twice_finishes_once() {
        let manager = ActionManager::new();
        let log = new_log();
        let motor = DeviceId::next();
        let action = ActionHandle::new(Probe::new("a", &[motor], &log));

        manager.start(&action);
        assert!(manager.stop(&action));
        assert!(!manager.stop(&action));

        assert_eq!(entries(&log), ["a:begin", "a:finish(interrupted)"]);
        assert_eq!(manager.lock_owner(motor), None);
        assert!(action.is_finished());
    }

    #[test]
    fn stop_on_idle_action_is_a_noop() {
        let manager = ActionManager::new();
        let action = ActionHandle::new(Probe::new("idle", &[], &new_log()));
        assert!(!manager.stop(&action));
        assert_eq!(action.state(), ActionState::Idle);
    }

    #[test]
    fn process_tick_completes_action_when_should_continue_turns_false() {
        let manager = ActionManager::new();
        let log = new_log();
        let motor = DeviceId::next();
        let mut probe = Probe::new("timed", &[motor], &log);
        probe.ticks_left = Some(2);
        let action = ActionHandle::new(probe);

        manager.start(&action);
        manager.process_tick();
        assert!(action.is_running());
        manager.process_tick();
        assert!(action.is_finished());
        manager.process_tick();

        assert_eq!(
            entries(&log),
            ["timed:begin", "timed:process", "timed:process", "timed:finish"]
        );
        assert_eq!(manager.lock_owner(motor), None);
    }

    #[test]
    fn process_tick_runs_in_start_order() {
        let manager = ActionManager::new();
        let log = new_log();
        let first = ActionHandle::new(Probe::new("first", &[], &log));
        let second = ActionHandle::new(Probe::new("second", &[], &log));
        manager.start(&first);
        manager.start(&second);
        log.lock().clear();

        manager.process_tick();
        assert_eq!(entries(&log), ["first:process", "second:process"]);
    }

    #[test]
    fn failing_begin_forces_finished_and_releases_locks() {
        let manager = ActionManager::new();
        let log = new_log();
        let motor = DeviceId::next();
        let mut probe = Probe::new("broken", &[motor], &log);
        probe.fail_begin = true;
        let action = ActionHandle::new(probe);

        assert!(manager.start(&action));
        assert!(action.is_finished());
        assert_eq!(manager.lock_owner(motor), None);
        assert_eq!(entries(&log), ["broken:begin", "broken:finish(interrupted)"]);
    }

    #[test]
    fn panicking_process_is_contained() {
        let manager = ActionManager::new();
        let log = new_log();
        let mut probe = Probe::new("panicky", &[], &log);
        probe.panic_in_process = true;
        let panicky = ActionHandle::new(probe);
        let steady = ActionHandle::new(Probe::new("steady", &[], &log));

        manager.start(&panicky);
        manager.start(&steady);
        manager.process_tick();

        assert!(panicky.is_finished());
        assert!(steady.is_running());
        assert!(entries(&log).contains(&"panicky:finish(interrupted)".to_string()));
        assert!(entries(&log).contains(&"steady:process".to_string()));
    }

    #[test]
    fn stop_all_interrupts_everything() {
        let manager = ActionManager::new();
        let log = new_log();
        let a = ActionHandle::new(Probe::new("a", &[DeviceId::next()], &log));
        let b = ActionHandle::new(Probe::new("b", &[DeviceId::next()], &log));
        manager.start(&a);
        manager.start(&b);

        manager.stop_all();
        assert!(a.is_finished() && b.is_finished());
        assert!(manager.running().is_empty());
    }

    // ────────────────────────────────────────────────────────────────────────
    // Re-entrancy
    // ────────────────────────────────────────────────────────────────────────

    /// Stops itself from inside `process`.
    struct SelfStopper {
        me: Arc<Mutex<Option<WeakActionHandle>>>,
        log: Log,
    }

    impl Action for SelfStopper {
        fn name(&self) -> &str {
            "self_stopper"
        }

        fn process(&mut self, actions: &ActionManager) -> Result<(), RobotError> {
            self.log.lock().push("process".into());
            let me = self.me.lock().as_ref().and_then(WeakActionHandle::upgrade);
            if let Some(me) = me {
                assert!(actions.stop(&me));
            }
            self.log.lock().push("process returned".into());
            Ok(())
        }

        fn finish(&mut self, _actions: &ActionManager, was_interrupted: bool) -> Result<(), RobotError> {
            self.log.lock().push(format!("finish({was_interrupted})"));
            Ok(())
        }

        fn should_continue(&mut self) -> bool {
            true
        }
    }

    #[test]
    fn self_stop_defers_finish_until_callback_returns() {
        let manager = ActionManager::new();
        let log = new_log();
        let slot = Arc::new(Mutex::new(None));
        let action = ActionHandle::new(SelfStopper {
            me: slot.clone(),
            log: log.clone(),
        });
        *slot.lock() = Some(action.downgrade());

        manager.start(&action);
        manager.process_tick();

        assert_eq!(entries(&log), ["process", "process returned", "finish(true)"]);
        assert!(action.is_finished());
    }

    /// Starts `next` from inside `process` while still holding its devices.
    struct HandOver {
        devices: Vec<DeviceId>,
        next: ActionHandle,
        log: Log,
    }

    impl Action for HandOver {
        fn name(&self) -> &str {
            "hand_over"
        }

        fn required_devices(&self) -> Vec<DeviceId> {
            self.devices.clone()
        }

        fn process(&mut self, actions: &ActionManager) -> Result<(), RobotError> {
            self.log.lock().push("hand_over:process".into());
            actions.start(&self.next);
            Ok(())
        }

        fn finish(&mut self, _actions: &ActionManager, was_interrupted: bool) -> Result<(), RobotError> {
            self.log.lock().push(format!("hand_over:finish({was_interrupted})"));
            Ok(())
        }

        fn should_continue(&mut self) -> bool {
            true
        }
    }

    #[test]
    fn holder_interrupted_from_its_own_process_finishes_before_new_action_begins() {
        let manager = ActionManager::new();
        let log = new_log();
        let motor = DeviceId::next();
        let next = ActionHandle::new(Probe::new("next", &[motor], &log));
        let holder = ActionHandle::new(HandOver {
            devices: vec![motor],
            next: next.clone(),
            log: log.clone(),
        });

        manager.start(&holder);
        manager.process_tick();

        assert_eq!(
            entries(&log),
            ["hand_over:process", "hand_over:finish(true)", "next:begin"]
        );
        assert!(holder.is_finished());
        assert!(next.is_running());
        assert_eq!(manager.lock_owner(motor), Some(next.id()));
    }

    /// Starts a follow-up action from inside `finish`.
    struct Chain {
        next: ActionHandle,
        log: Log,
    }

    impl Action for Chain {
        fn name(&self) -> &str {
            "chain"
        }

        fn process(&mut self, _actions: &ActionManager) -> Result<(), RobotError> {
            Ok(())
        }

        fn finish(&mut self, actions: &ActionManager, _was_interrupted: bool) -> Result<(), RobotError> {
            self.log.lock().push("chain:finish".into());
            actions.start(&self.next);
            Ok(())
        }

        fn should_continue(&mut self) -> bool {
            false
        }
    }

    #[test]
    fn callbacks_may_start_other_actions() {
        let manager = ActionManager::new();
        let log = new_log();
        let next = ActionHandle::new(Probe::new("next", &[], &log));
        let chain = ActionHandle::new(Chain {
            next: next.clone(),
            log: log.clone(),
        });

        manager.start(&chain);
        manager.process_tick();

        assert!(chain.is_finished());
        assert!(next.is_running());
        assert_eq!(entries(&log), ["chain:finish", "next:begin"]);
    }
}
