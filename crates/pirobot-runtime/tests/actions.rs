//! Actions and triggers running on a robot context.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use pirobot_hal::device::Device;
use pirobot_hal::motor::MotorController;
use pirobot_hal::sim::SimMotorOutput;
use pirobot_runtime::{
    Action, ActionHandle, ActionManager, ActionState, ButtonPressedTrigger, Robot, RobotApp,
};
use pirobot_types::{DeviceId, RobotError, RobotProfile};

struct Idle;

impl RobotApp for Idle {}

/// Holds its devices until stopped, recording its callbacks.
struct Hold {
    name: String,
    devices: Vec<DeviceId>,
    log: Arc<Mutex<Vec<String>>>,
    begins: Arc<AtomicUsize>,
}

impl Hold {
    fn handle(name: &str, devices: Vec<DeviceId>, log: &Arc<Mutex<Vec<String>>>) -> (ActionHandle, Arc<AtomicUsize>) {
        let begins = Arc::new(AtomicUsize::new(0));
        let handle = ActionHandle::new(Hold {
            name: name.to_string(),
            devices,
            log: log.clone(),
            begins: begins.clone(),
        });
        (handle, begins)
    }
}

impl Action for Hold {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_devices(&self) -> Vec<DeviceId> {
        self.devices.clone()
    }

    fn begin(&mut self, _actions: &ActionManager) -> Result<(), RobotError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(format!("{}:begin", self.name));
        Ok(())
    }

    fn process(&mut self, _actions: &ActionManager) -> Result<(), RobotError> {
        Ok(())
    }

    fn finish(&mut self, _actions: &ActionManager, was_interrupted: bool) -> Result<(), RobotError> {
        self.log
            .lock()
            .push(format!("{}:finish({was_interrupted})", self.name));
        Ok(())
    }

    fn should_continue(&mut self) -> bool {
        true
    }
}

fn motor(name: &str) -> Arc<MotorController<SimMotorOutput>> {
    Arc::new(MotorController::new(name, SimMotorOutput::new(name)))
}

#[test]
fn interrupted_holder_finishes_before_new_action_begins() {
    let robot = Robot::new(RobotProfile::default(), Idle).unwrap();
    let actions = robot.context().actions();
    let arm = motor("arm");
    let log = Arc::new(Mutex::new(Vec::new()));
    let (b, _) = Hold::handle("b", vec![arm.id()], &log);
    let (a, _) = Hold::handle("a", vec![arm.id()], &log);

    assert!(actions.start(&b));
    assert!(actions.start(&a));

    assert_eq!(log.lock().as_slice(), ["b:begin", "b:finish(true)", "a:begin"]);
    assert_eq!(actions.lock_owner(arm.id()), Some(a.id()));
    assert_eq!(b.state(), ActionState::Finished);
}

#[test]
fn start_without_restart_and_double_stop_are_noops() {
    let robot = Robot::new(RobotProfile::default(), Idle).unwrap();
    let actions = robot.context().actions();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (a, begins) = Hold::handle("a", Vec::new(), &log);

    assert!(actions.start(&a));
    assert!(!actions.start(&a));
    assert_eq!(begins.load(Ordering::SeqCst), 1);

    assert!(actions.stop(&a));
    assert!(!actions.stop(&a));
    assert_eq!(log.lock().as_slice(), ["a:begin", "a:finish(true)"]);
}

#[test]
fn button_press_sequence_starts_action_exactly_once() {
    for do_restart in [false, true] {
        let robot = Robot::new(RobotProfile::default(), Idle).unwrap();
        let ctx = robot.context();
        let pad = ctx.gamepad(0);
        let log = Arc::new(Mutex::new(Vec::new()));
        let (target, begins) = Hold::handle("target", Vec::new(), &log);
        ctx.actions()
            .add_trigger(ButtonPressedTrigger::new(pad, 3), &target, do_restart);

        for pressed in [false, false, true, true, false] {
            let mut buttons = vec![false; 4];
            buttons[3] = pressed;
            ctx.controllers().update(0, vec![], buttons, vec![]);
            ctx.actions().check_triggers();
        }
        assert_eq!(begins.load(Ordering::SeqCst), 1, "do_restart = {do_restart}");
        assert!(target.is_running());
        assert!(log.lock().iter().all(|entry| !entry.contains("finish")));
    }
}

#[test]
fn running_robot_ticks_actions_and_triggers() {
    let profile = RobotProfile {
        main_scheduler_threads: 4,
        periodic_function_rate_ms: 10,
        action_function_period_ms: 10,
        ..RobotProfile::default()
    };
    let robot = Robot::new(profile, Idle).unwrap();
    let ctx = robot.context().clone();
    let pad = ctx.gamepad(0);
    let log = Arc::new(Mutex::new(Vec::new()));
    let (target, begins) = Hold::handle("target", Vec::new(), &log);
    ctx.actions()
        .add_trigger(ButtonPressedTrigger::new(pad, 0), &target, false);

    robot.start().unwrap();
    ctx.controllers().update(0, vec![], vec![true], vec![]);
    thread::sleep(Duration::from_millis(60));
    assert_eq!(begins.load(Ordering::SeqCst), 1);
    assert!(target.is_running());

    // Shutdown interrupts whatever is still running.
    robot.shutdown();
    assert!(target.is_finished());
    assert_eq!(log.lock().last().map(String::as_str), Some("target:finish(true)"));
}
