//! [`RobotContext`] – shared handle to everything a running robot owns.
//!
//! One context is created per [`Robot`][crate::robot::Robot].  Clones are
//! cheap and refer to the same robot; the application receives a reference
//! in every [`RobotApp`] hook and may keep clones around.  Jobs scheduled
//! through the context only hold a weak reference to it, so a context is
//! torn down once the robot and the application drop their clones.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use pirobot_hal::device::Device;
use pirobot_hal::gamepad::{ControllerHub, Gamepad};
use pirobot_kernel::{DeviceRegistry, JobHandle, Scheduler, StopSignal, Watchdog, panic_message};
use pirobot_middleware::{MainVmon, NetworkTable, ROBOT_STATE_KEY, TelemetrySink};
use pirobot_types::{RobotError, RobotMode, RobotProfile};
use tracing::{error, info};

use crate::action_manager::ActionManager;

// ────────────────────────────────────────────────────────────────────────────
// Application surface
// ────────────────────────────────────────────────────────────────────────────

/// User code driven by the runtime.
///
/// Every hook has an empty default.  Hooks run on scheduler workers and the
/// periodic ones may overlap each other, so implementations keep their
/// state behind interior mutability.  An `Err` or a panic from a hook is
/// logged and the loop carries on.
pub trait RobotApp: Send + Sync + 'static {
    /// Once, after the devices have begun and before the first periodic run.
    fn robot_started(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
        Ok(())
    }

    fn robot_enabled(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
        Ok(())
    }

    fn robot_disabled(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
        Ok(())
    }

    fn enabled_periodic(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
        Ok(())
    }

    fn disabled_periodic(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
        Ok(())
    }

    /// Runs at the periodic rate whatever the mode.
    fn periodic(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Context
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Created,
    Started,
    Stopped,
}

pub(crate) struct ContextInner {
    pub(crate) profile: RobotProfile,
    enabled: AtomicBool,
    /// Serialises mode changes with the device pass of the mode dispatcher.
    mode_lock: Mutex<()>,
    pub(crate) lifecycle: Mutex<Lifecycle>,
    pub(crate) scheduler: Scheduler,
    pub(crate) registry: Arc<DeviceRegistry>,
    pub(crate) watchdog: Arc<Watchdog>,
    actions: ActionManager,
    network_table: NetworkTable,
    main_vmon: MainVmon,
    controllers: ControllerHub,
    pub(crate) stop: StopSignal,
    app: Arc<dyn RobotApp>,
}

#[derive(Clone)]
pub struct RobotContext {
    pub(crate) inner: Arc<ContextInner>,
}

impl RobotContext {
    pub(crate) fn new(profile: RobotProfile, app: Arc<dyn RobotApp>, sink: Arc<dyn TelemetrySink>) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let watchdog = Arc::new(Watchdog::new(profile.watchdog_timeout(), Arc::clone(&registry)));
        let network_table = NetworkTable::new(sink);
        Self {
            inner: Arc::new(ContextInner {
                scheduler: Scheduler::new(profile.main_scheduler_threads),
                enabled: AtomicBool::new(false),
                mode_lock: Mutex::new(()),
                lifecycle: Mutex::new(Lifecycle::Created),
                registry,
                watchdog,
                actions: ActionManager::new(),
                main_vmon: MainVmon::new(network_table.clone()),
                network_table,
                controllers: ControllerHub::new(),
                stop: StopSignal::new(),
                app,
                profile,
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<ContextInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ContextInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn profile(&self) -> &RobotProfile {
        &self.inner.profile
    }

    pub fn mode(&self) -> RobotMode {
        if self.is_enabled() {
            RobotMode::Enabled
        } else {
            RobotMode::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Tell the watchdog the operator link is alive.  Waits for a mode
    /// change in progress so a trip is never cleared for a robot that is
    /// being disabled.
    pub fn feed_watchdog(&self) {
        let _mode = self.inner.mode_lock.lock();
        self.inner.watchdog.feed(self.is_enabled());
    }

    pub fn is_watchdog_tripped(&self) -> bool {
        self.inner.watchdog.is_tripped()
    }

    /// Add a device to the enable/disable and watchdog lifecycle.  Devices
    /// registered before the robot starts are begun at start, later ones
    /// immediately.
    pub fn register_device<D: Device + 'static>(&self, device: &Arc<D>) {
        self.inner.registry.register(device);
    }

    pub fn actions(&self) -> &ActionManager {
        &self.inner.actions
    }

    pub fn network_table(&self) -> &NetworkTable {
        &self.inner.network_table
    }

    pub fn main_vmon(&self) -> &MainVmon {
        &self.inner.main_vmon
    }

    /// Latest controller data received from the driver station.
    pub fn controllers(&self) -> &ControllerHub {
        &self.inner.controllers
    }

    /// Create and register a gamepad reading `controller` from the hub.
    pub fn gamepad(&self, controller: u8) -> Arc<Gamepad> {
        let pad = Arc::new(Gamepad::new(
            controller,
            self.inner.controllers.clone(),
            self.inner.profile.max_gamepad_data_age(),
        ));
        self.register_device(&pad);
        pad
    }

    /// Run `job` every `interval` on the robot's scheduler.  The first run
    /// happens as soon as the scheduler is running.
    pub fn schedule_repeated<F>(&self, name: impl Into<String>, interval: Duration, mut job: F) -> JobHandle
    where
        F: FnMut(&RobotContext) -> Result<(), RobotError> + Send + 'static,
    {
        let weak = self.downgrade();
        self.inner.scheduler.schedule_repeated(name, interval, move || {
            match Self::upgrade(&weak) {
                Some(ctx) => job(&ctx),
                None => Ok(()),
            }
        })
    }

    /// Run `job` once, as soon as a scheduler worker is free.
    pub fn run_once_soon<F>(&self, name: impl Into<String>, job: F) -> JobHandle
    where
        F: FnOnce(&RobotContext) -> Result<(), RobotError> + Send + 'static,
    {
        let weak = self.downgrade();
        self.inner.scheduler.schedule_once(name, Duration::ZERO, move || {
            match Self::upgrade(&weak) {
                Some(ctx) => job(&ctx),
                None => Ok(()),
            }
        })
    }

    /// Ask the robot to shut down.  [`Robot::run`][crate::robot::Robot::run]
    /// returns once the shutdown is complete.
    pub fn request_stop(&self) {
        self.inner.stop.trigger();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.inner.stop.clone()
    }

    /// Switch between enabled and disabled, as requested by the driver
    /// station.  Switching to the current mode does nothing.
    ///
    /// # Errors
    ///
    /// [`RobotError::NotStarted`] unless the robot is running.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), RobotError> {
        if *self.inner.lifecycle.lock() != Lifecycle::Started {
            return Err(RobotError::NotStarted);
        }

        {
            let _mode = self.inner.mode_lock.lock();
            if self.is_enabled() == enabled {
                return Ok(());
            }
            self.inner.enabled.store(enabled, Ordering::SeqCst);
            let mode = self.mode();
            self.inner.network_table.set(ROBOT_STATE_KEY, mode.to_string());
            self.apply_mode_to_devices(enabled);
            info!(mode = %mode, "robot mode changed");
        }

        if enabled {
            self.call_hook("robot_enabled", |app, ctx| app.robot_enabled(ctx));
        } else {
            self.call_hook("robot_disabled", |app, ctx| app.robot_disabled(ctx));
        }
        Ok(())
    }

    /// One run of the mode dispatcher: the mode's periodic hook, then the
    /// mode-matching devices are brought in line with the mode.
    pub(crate) fn dispatch_mode(&self) {
        if self.is_enabled() {
            self.call_hook("enabled_periodic", |app, ctx| app.enabled_periodic(ctx));
        } else {
            self.call_hook("disabled_periodic", |app, ctx| app.disabled_periodic(ctx));
        }

        let _mode = self.inner.mode_lock.lock();
        self.apply_mode_to_devices(self.is_enabled());
    }

    /// Enabling goes through the watchdog so a tripped robot stays silent.
    fn apply_mode_to_devices(&self, enabled: bool) {
        if enabled {
            let registry = &self.inner.registry;
            self.inner.watchdog.while_armed(|| registry.enable_mode_matching());
        } else {
            self.inner.registry.disable_mode_matching();
        }
    }

    pub(crate) fn force_disabled(&self) {
        let _mode = self.inner.mode_lock.lock();
        self.inner.enabled.store(false, Ordering::SeqCst);
        self.inner
            .network_table
            .set(ROBOT_STATE_KEY, RobotMode::Disabled.to_string());
    }

    pub(crate) fn call_hook<F>(&self, hook: &'static str, f: F)
    where
        F: FnOnce(&dyn RobotApp, &RobotContext) -> Result<(), RobotError>,
    {
        let app = Arc::clone(&self.inner.app);
        let details = match catch_unwind(AssertUnwindSafe(|| f(app.as_ref(), self))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };
        let err = RobotError::Hook {
            hook: hook.to_string(),
            details,
        };
        error!(hook, "{err}");
    }
}

impl std::fmt::Debug for RobotContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotContext")
            .field("mode", &self.mode())
            .field("lifecycle", &*self.inner.lifecycle.lock())
            .field("devices", &self.inner.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pirobot_hal::motor::MotorController;
    use pirobot_hal::sim::SimMotorOutput;
    use pirobot_middleware::NullSink;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[derive(Default)]
    struct Counting {
        enabled: AtomicUsize,
        disabled: AtomicUsize,
    }

    impl RobotApp for Counting {
        fn robot_enabled(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
            self.enabled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn robot_disabled(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
            self.disabled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn periodic(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
            Err(RobotError::Config("broken".into()))
        }

        fn enabled_periodic(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
            panic!("boom");
        }
    }

    fn context(app: Arc<Counting>) -> RobotContext {
        RobotContext::new(RobotProfile::default(), app, Arc::new(NullSink))
    }

    #[test]
    fn new_context_is_disabled_and_not_started() {
        let ctx = context(Arc::new(Counting::default()));
        assert_eq!(ctx.mode(), RobotMode::Disabled);
        assert_eq!(ctx.set_enabled(true), Err(RobotError::NotStarted));
        assert!(!ctx.network_table().has(ROBOT_STATE_KEY));
    }

    #[test]
    fn set_enabled_updates_table_and_calls_hook_once() {
        let app = Arc::new(Counting::default());
        let ctx = context(app.clone());
        *ctx.inner.lifecycle.lock() = Lifecycle::Started;

        ctx.set_enabled(true).unwrap();
        ctx.set_enabled(true).unwrap();
        assert!(ctx.is_enabled());
        assert_eq!(ctx.network_table().get(ROBOT_STATE_KEY).as_deref(), Some("ENABLED"));
        assert_eq!(app.enabled.load(Ordering::SeqCst), 1);

        ctx.set_enabled(false).unwrap();
        assert_eq!(ctx.network_table().get(ROBOT_STATE_KEY).as_deref(), Some("DISABLED"));
        assert_eq!(app.disabled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_hooks_are_contained() {
        let ctx = context(Arc::new(Counting::default()));
        ctx.call_hook("periodic", |app, ctx| app.periodic(ctx));
        ctx.call_hook("enabled_periodic", |app, ctx| app.enabled_periodic(ctx));
    }

    #[test]
    fn gamepad_is_registered() {
        let ctx = context(Arc::new(Counting::default()));
        let pad = ctx.gamepad(2);
        assert_eq!(pad.controller(), 2);
        assert_eq!(ctx.inner.registry.len(), 1);
    }

    type SimMotor = MotorController<SimMotorOutput>;

    fn started_with_motor(profile: RobotProfile, app: Arc<dyn RobotApp>) -> (RobotContext, Arc<SimMotor>) {
        let ctx = RobotContext::new(profile, app, Arc::new(NullSink));
        *ctx.inner.lifecycle.lock() = Lifecycle::Started;
        let motor = Arc::new(MotorController::new("drive", SimMotorOutput::new("drive")));
        ctx.register_device(&motor);
        ctx.inner.registry.start();
        ctx.feed_watchdog();
        (ctx, motor)
    }

    #[test]
    fn feed_waits_for_a_mode_change_in_progress() {
        let profile = RobotProfile {
            periodic_function_rate_ms: 5,
            ..RobotProfile::default()
        };
        let (ctx, motor) = started_with_motor(profile, Arc::new(Counting::default()));
        ctx.set_enabled(true).unwrap();
        assert!(motor.is_enabled());

        thread::sleep(Duration::from_millis(40));
        assert!(ctx.inner.watchdog.check());
        assert!(!motor.is_enabled());

        // A disable holds the mode lock while it turns the devices off.
        let disabling = ctx.inner.mode_lock.lock();
        let feeder = {
            let ctx = ctx.clone();
            thread::spawn(move || ctx.feed_watchdog())
        };
        thread::sleep(Duration::from_millis(30));
        assert!(ctx.is_watchdog_tripped(), "feed went ahead of the mode change");
        ctx.inner.enabled.store(false, Ordering::SeqCst);
        ctx.inner.registry.disable_mode_matching();
        drop(disabling);
        feeder.join().unwrap();

        assert!(ctx.is_watchdog_tripped());
        assert!(!motor.is_enabled());
    }

    /// Records the drive motor's state as seen by the per-mode hooks.
    #[derive(Default)]
    struct ModeObserver {
        motor: Mutex<Option<Arc<SimMotor>>>,
        seen: Mutex<Vec<(&'static str, bool)>>,
    }

    impl ModeObserver {
        fn record(&self, hook: &'static str) {
            let enabled = self.motor.lock().as_ref().is_some_and(|m| m.is_enabled());
            self.seen.lock().push((hook, enabled));
        }
    }

    impl RobotApp for Arc<ModeObserver> {
        fn enabled_periodic(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
            self.record("enabled_periodic");
            Ok(())
        }

        fn disabled_periodic(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
            self.record("disabled_periodic");
            Ok(())
        }
    }

    #[test]
    fn mode_hook_runs_before_the_device_pass() {
        let observer = Arc::new(ModeObserver::default());
        let (ctx, motor) = started_with_motor(RobotProfile::default(), Arc::new(observer.clone()));
        *observer.motor.lock() = Some(motor.clone());

        // Mode flips without its own device pass, leaving it to the
        // dispatcher.
        ctx.inner.enabled.store(true, Ordering::SeqCst);
        ctx.dispatch_mode();
        assert!(motor.is_enabled());

        ctx.inner.enabled.store(false, Ordering::SeqCst);
        ctx.dispatch_mode();
        assert!(!motor.is_enabled());

        assert_eq!(
            observer.seen.lock().as_slice(),
            [("enabled_periodic", false), ("disabled_periodic", true)]
        );
    }

    #[test]
    fn jobs_do_not_keep_the_context_alive() {
        let ctx = context(Arc::new(Counting::default()));
        let _job = ctx.schedule_repeated("noop", Duration::from_millis(10), |_| Ok(()));
        let weak = ctx.downgrade();
        drop(ctx);
        assert!(weak.upgrade().is_none());
    }
}
