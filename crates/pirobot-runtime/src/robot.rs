//! [`Robot`] – owns a [`RobotContext`] and drives it through its lifecycle.
//!
//! ```text
//! Created ──start()──▶ Started (Disabled ⇄ Enabled) ──shutdown()──▶ Stopped
//! ```
//!
//! Starting the robot begins every registered device, arms the watchdog and
//! schedules four repeating jobs:
//!
//! | Job | Interval | Work |
//! |---|---|---|
//! | `mode-dispatch` | periodic rate | `enabled_periodic` / `disabled_periodic`, then mode-matching devices follow the mode |
//! | `periodic` | periodic rate | `periodic` |
//! | `action-tick` | action period | [`ActionManager::process_tick`] |
//! | `trigger-tick` | action period | [`ActionManager::check_triggers`] |
//!
//! # Example
//!
//! ```rust,no_run
//! use pirobot_runtime::{Robot, RobotApp};
//! use pirobot_types::RobotProfile;
//!
//! struct Idle;
//! impl RobotApp for Idle {}
//!
//! let robot = Robot::new(RobotProfile::default(), Idle).expect("valid profile");
//! // Blocks until Ctrl-C.
//! robot.run().expect("robot failed");
//! ```
//!
//! [`ActionManager::process_tick`]: crate::action_manager::ActionManager::process_tick
//! [`ActionManager::check_triggers`]: crate::action_manager::ActionManager::check_triggers

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use pirobot_middleware::{NullSink, ROBOT_STATE_KEY, TelemetrySink};
use pirobot_types::{RobotError, RobotMode, RobotProfile};
use tracing::{debug, info, warn};

use crate::context::{Lifecycle, RobotApp, RobotContext};

pub struct Robot {
    ctx: RobotContext,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl Robot {
    /// Create a robot that publishes its network table nowhere.
    ///
    /// # Errors
    ///
    /// [`RobotError::InvalidProfile`] if the profile does not validate.
    pub fn new(profile: RobotProfile, app: impl RobotApp) -> Result<Self, RobotError> {
        Self::with_sink(profile, app, Arc::new(NullSink))
    }

    /// Create a robot whose network-table updates go to `sink`.
    ///
    /// # Errors
    ///
    /// [`RobotError::InvalidProfile`] if the profile does not validate.
    pub fn with_sink(
        profile: RobotProfile,
        app: impl RobotApp,
        sink: Arc<dyn TelemetrySink>,
    ) -> Result<Self, RobotError> {
        profile.validate()?;
        Ok(Self {
            ctx: RobotContext::new(profile, Arc::new(app), sink),
            monitor: Mutex::new(None),
        })
    }

    pub fn context(&self) -> &RobotContext {
        &self.ctx
    }

    /// Bring the robot up in disabled mode.
    ///
    /// # Errors
    ///
    /// - [`RobotError::AlreadyStarted`] if `start` was called before.
    /// - [`RobotError::HardwareFault`] if a runtime thread cannot be spawned.
    pub fn start(&self) -> Result<(), RobotError> {
        let inner = &self.ctx.inner;
        {
            let mut lifecycle = inner.lifecycle.lock();
            if *lifecycle != Lifecycle::Created {
                return Err(RobotError::AlreadyStarted);
            }

            inner.scheduler.start()?;
            inner.registry.start();
            self.ctx
                .network_table()
                .set(ROBOT_STATE_KEY, RobotMode::Disabled.to_string());

            inner.watchdog.feed(false);
            let poll = inner.profile.watchdog_poll_interval();
            match inner.watchdog.spawn_monitor(poll, inner.stop.clone()) {
                Ok(handle) => *self.monitor.lock() = Some(handle),
                Err(e) => {
                    inner.scheduler.shutdown();
                    *lifecycle = Lifecycle::Stopped;
                    return Err(e);
                }
            }
            *lifecycle = Lifecycle::Started;
        }

        info!(
            devices = inner.registry.len(),
            rate_ms = inner.profile.periodic_function_rate_ms,
            watchdog_ms = inner.watchdog.timeout().as_millis() as u64,
            "robot started"
        );
        self.ctx.call_hook("robot_started", |app, ctx| app.robot_started(ctx));
        self.ctx.call_hook("robot_disabled", |app, ctx| app.robot_disabled(ctx));
        self.schedule_loops();
        Ok(())
    }

    fn schedule_loops(&self) {
        let rate = self.ctx.profile().periodic_rate();
        let action_period = self.ctx.profile().action_period();

        self.ctx.schedule_repeated("mode-dispatch", rate, |ctx| {
            ctx.dispatch_mode();
            Ok(())
        });
        self.ctx.schedule_repeated("periodic", rate, |ctx| {
            ctx.call_hook("periodic", |app, ctx| app.periodic(ctx));
            Ok(())
        });
        self.ctx.schedule_repeated("action-tick", action_period, |ctx| {
            ctx.actions().process_tick();
            Ok(())
        });
        self.ctx.schedule_repeated("trigger-tick", action_period, |ctx| {
            ctx.actions().check_triggers();
            Ok(())
        });
    }

    /// Start the robot and block until a stop is requested, either through
    /// [`RobotContext::request_stop`] or by Ctrl-C / SIGTERM, then shut down.
    ///
    /// # Errors
    ///
    /// Any error from [`start`][Self::start].
    pub fn run(&self) -> Result<(), RobotError> {
        let stop = self.ctx.stop_signal();
        if let Err(e) = ctrlc::set_handler(move || stop.trigger()) {
            warn!(error = %e, "could not install signal handler, stop with request_stop()");
        }

        self.start()?;
        self.ctx.stop_signal().wait();
        info!("stop requested");
        self.shutdown();
        Ok(())
    }

    /// Stop every job and thread, interrupt running actions and disable all
    /// devices.  Safe to call more than once.
    pub fn shutdown(&self) {
        let inner = &self.ctx.inner;
        {
            let mut lifecycle = inner.lifecycle.lock();
            let was = *lifecycle;
            *lifecycle = Lifecycle::Stopped;
            match was {
                Lifecycle::Stopped => return,
                Lifecycle::Created => {
                    inner.stop.trigger();
                    return;
                }
                Lifecycle::Started => {}
            }
        }

        inner.stop.trigger();
        if let Some(handle) = self.monitor.lock().take()
            && handle.join().is_err()
        {
            warn!("watchdog monitor panicked");
        }
        debug!("watchdog monitor joined");

        inner.scheduler.shutdown();
        self.ctx.actions().stop_all();
        self.ctx.force_disabled();
        inner.registry.disable_all();
        info!("robot stopped");
    }

    /// See [`RobotContext::set_enabled`].
    pub fn set_enabled(&self, enabled: bool) -> Result<(), RobotError> {
        self.ctx.set_enabled(enabled)
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct Hooks {
        started: AtomicUsize,
        disabled: AtomicUsize,
        periodic: AtomicUsize,
        disabled_periodic: AtomicUsize,
    }

    impl RobotApp for Arc<Hooks> {
        fn robot_started(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn robot_disabled(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
            self.disabled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn periodic(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
            self.periodic.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn disabled_periodic(&self, _ctx: &RobotContext) -> Result<(), RobotError> {
            self.disabled_periodic.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast_profile() -> RobotProfile {
        RobotProfile {
            main_scheduler_threads: 4,
            periodic_function_rate_ms: 10,
            action_function_period_ms: 10,
            ..RobotProfile::default()
        }
    }

    #[test]
    fn invalid_profile_is_rejected() {
        let profile = RobotProfile {
            main_scheduler_threads: 0,
            ..RobotProfile::default()
        };
        assert!(matches!(
            Robot::new(profile, Arc::new(Hooks::default())),
            Err(RobotError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn start_runs_hooks_and_periodic_jobs() {
        let hooks = Arc::new(Hooks::default());
        let robot = Robot::new(fast_profile(), hooks.clone()).unwrap();
        robot.start().unwrap();
        thread::sleep(Duration::from_millis(60));

        assert_eq!(hooks.started.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.disabled.load(Ordering::SeqCst), 1);
        assert!(hooks.periodic.load(Ordering::SeqCst) >= 2);
        assert!(hooks.disabled_periodic.load(Ordering::SeqCst) >= 2);
        assert_eq!(
            robot.context().network_table().get(ROBOT_STATE_KEY).as_deref(),
            Some("DISABLED")
        );
        robot.shutdown();
    }

    #[test]
    fn start_twice_fails() {
        let robot = Robot::new(fast_profile(), Arc::new(Hooks::default())).unwrap();
        robot.start().unwrap();
        assert_eq!(robot.start(), Err(RobotError::AlreadyStarted));
        robot.shutdown();
        assert_eq!(robot.start(), Err(RobotError::AlreadyStarted));
    }

    #[test]
    fn shutdown_stops_periodic_work_and_is_idempotent() {
        let hooks = Arc::new(Hooks::default());
        let robot = Robot::new(fast_profile(), hooks.clone()).unwrap();
        robot.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        robot.shutdown();
        robot.shutdown();

        let after = hooks.periodic.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(hooks.periodic.load(Ordering::SeqCst), after);
        assert!(robot.context().stop_signal().is_triggered());
        assert_eq!(robot.set_enabled(true), Err(RobotError::NotStarted));
    }

    #[test]
    fn run_returns_after_request_stop() {
        let robot = Robot::new(fast_profile(), Arc::new(Hooks::default())).unwrap();
        let ctx = robot.context().clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            ctx.request_stop();
        });
        robot.run().unwrap();
        stopper.join().unwrap();
        assert_eq!(robot.set_enabled(true), Err(RobotError::NotStarted));
    }
}
