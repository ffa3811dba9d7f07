//! Demo robot driven entirely by simulated hardware.
//!
//! Two simulated drive motors are controlled by an arcade-drive action that
//! reads gamepad 0.  Button 0 starts driving, button 1 starts a short brake
//! action that takes the motors away from the drive action.  A simulated
//! driver station feeds the watchdog and plays a scripted stick pattern.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pirobot_hal::axis::SquareRootAxisTransform;
use pirobot_hal::device::Device;
use pirobot_hal::drive::ArcadeDriveHelper;
use pirobot_hal::gamepad::Gamepad;
use pirobot_hal::motor::{MotorController, SpeedController};
use pirobot_hal::sim::SimMotorOutput;
use pirobot_runtime::{
    Action, ActionHandle, ActionManager, ButtonPressedTrigger, RobotApp, RobotContext,
};
use pirobot_types::{DeviceId, RobotError};
use tracing::{debug, info};

pub type SimMotor = MotorController<SimMotorOutput>;

const DEADBAND: f64 = 0.1;
const DRIVER_STATION_PERIOD: Duration = Duration::from_millis(20);

// ────────────────────────────────────────────────────────────────────────────
// Actions
// ────────────────────────────────────────────────────────────────────────────

/// Drives the robot from the left stick (axis 1 speed, axis 0 rotation)
/// until interrupted.
struct ArcadeDrive {
    gamepad: Arc<Gamepad>,
    devices: Vec<DeviceId>,
    drive: ArcadeDriveHelper,
}

impl Action for ArcadeDrive {
    fn name(&self) -> &str {
        "arcade_drive"
    }

    fn required_devices(&self) -> Vec<DeviceId> {
        self.devices.clone()
    }

    fn process(&mut self, _actions: &ActionManager) -> Result<(), RobotError> {
        let speed = -self.gamepad.axis(1, DEADBAND);
        let rotation = self.gamepad.axis(0, DEADBAND);
        self.drive.update(speed, rotation);
        Ok(())
    }

    fn finish(&mut self, _actions: &ActionManager, _was_interrupted: bool) -> Result<(), RobotError> {
        self.drive.update(0.0, 0.0);
        Ok(())
    }

    fn should_continue(&mut self) -> bool {
        true
    }
}

/// Holds the drive motors at zero in brake mode for a fixed time.
struct Brake {
    motors: Vec<Arc<SimMotor>>,
    duration: Duration,
    started: Option<Instant>,
}

impl Action for Brake {
    fn name(&self) -> &str {
        "brake"
    }

    fn required_devices(&self) -> Vec<DeviceId> {
        self.motors.iter().map(|m| m.id()).collect()
    }

    fn begin(&mut self, _actions: &ActionManager) -> Result<(), RobotError> {
        self.started = Some(Instant::now());
        for motor in &self.motors {
            motor.set_brake_mode(true);
            motor.set_speed(0.0);
        }
        Ok(())
    }

    fn process(&mut self, _actions: &ActionManager) -> Result<(), RobotError> {
        Ok(())
    }

    fn finish(&mut self, _actions: &ActionManager, _was_interrupted: bool) -> Result<(), RobotError> {
        for motor in &self.motors {
            motor.set_brake_mode(false);
        }
        Ok(())
    }

    fn should_continue(&mut self) -> bool {
        self.started.is_some_and(|t| t.elapsed() < self.duration)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Application
// ────────────────────────────────────────────────────────────────────────────

pub struct DemoRobot {
    left: Arc<SimMotor>,
    right: Arc<SimMotor>,
    battery_monitor: DeviceId,
    battery: Mutex<f64>,
    auto_enable: bool,
    /// Triggers only hold weak references to their actions.
    actions: Mutex<Vec<ActionHandle>>,
}

impl DemoRobot {
    pub fn new(auto_enable: bool) -> Self {
        let right = MotorController::new("right_drive", SimMotorOutput::new("right"));
        right.set_inverted(true);
        Self {
            left: Arc::new(MotorController::new("left_drive", SimMotorOutput::new("left"))),
            right: Arc::new(right),
            battery_monitor: DeviceId::next(),
            battery: Mutex::new(8.4),
            auto_enable,
            actions: Mutex::new(Vec::new()),
        }
    }
}

impl RobotApp for DemoRobot {
    fn robot_started(&self, ctx: &RobotContext) -> Result<(), RobotError> {
        ctx.register_device(&self.left);
        ctx.register_device(&self.right);
        ctx.main_vmon().make_main(self.battery_monitor);

        let gamepad = ctx.gamepad(0);
        gamepad.set_axis_transform(0, Arc::new(SquareRootAxisTransform));

        let left: Arc<dyn SpeedController> = self.left.clone();
        let right: Arc<dyn SpeedController> = self.right.clone();
        let drive = ActionHandle::new(ArcadeDrive {
            gamepad: gamepad.clone(),
            devices: vec![self.left.id(), self.right.id()],
            drive: ArcadeDriveHelper::new(vec![left], vec![right]),
        });
        let brake = ActionHandle::new(Brake {
            motors: vec![self.left.clone(), self.right.clone()],
            duration: Duration::from_millis(500),
            started: None,
        });

        ctx.actions()
            .add_trigger(ButtonPressedTrigger::new(gamepad.clone(), 0), &drive, false);
        ctx.actions()
            .add_trigger(ButtonPressedTrigger::new(gamepad, 1), &brake, true);
        self.actions.lock().extend([drive, brake]);

        spawn_driver_station(ctx);
        if self.auto_enable {
            ctx.run_once_soon("auto-enable", |ctx| ctx.set_enabled(true));
        }
        info!("demo robot ready: button 0 drives, button 1 brakes");
        Ok(())
    }

    fn robot_enabled(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
        info!("demo robot enabled");
        Ok(())
    }

    fn robot_disabled(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
        info!("demo robot disabled");
        Ok(())
    }

    fn periodic(&self, ctx: &RobotContext) -> Result<(), RobotError> {
        let voltage = {
            let mut battery = self.battery.lock();
            *battery = (*battery - 0.0005).max(6.0);
            *battery
        };
        ctx.main_vmon()
            .send_main_battery_voltage(self.battery_monitor, voltage);
        debug!(
            left = self.left.effective_speed(),
            right = self.right.effective_speed(),
            "drive output"
        );
        Ok(())
    }
}

/// Simulated driver station: feeds the watchdog and replays a 6 s loop of
/// controller input.
fn spawn_driver_station(ctx: &RobotContext) {
    let epoch = Instant::now();
    ctx.schedule_repeated("driver-station", DRIVER_STATION_PERIOD, move |ctx| {
        let t = epoch.elapsed().as_secs_f64() % 6.0;
        let axes = vec![(t * 1.3).sin() * 0.5, -(t * 0.7).sin() * 0.8];
        let buttons = vec![(0.5..0.7).contains(&t), (4.5..4.7).contains(&t)];
        ctx.controllers().update(0, axes, buttons, Vec::new());
        ctx.feed_watchdog();
        Ok(())
    });
}
