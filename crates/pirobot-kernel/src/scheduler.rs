//! [`Scheduler`] – runs periodic and one-shot jobs on a fixed worker pool.
//!
//! One dispatcher thread keeps the timer list and hands due jobs to
//! `threads` workers over a `crossbeam-channel` queue.
//!
//! Guarantees:
//!
//! - A job never overlaps itself.  When a run comes due while the previous
//!   run is still queued or executing, the new run is skipped (logged at
//!   debug) instead of piling up behind it.
//! - Missed periods are not replayed: the next due time is advanced past
//!   "now" in whole intervals.
//! - A job returning `Err` or panicking is logged with its name and keeps
//!   its schedule.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//! use pirobot_kernel::scheduler::Scheduler;
//!
//! let scheduler = Scheduler::new(2);
//! let ticks = Arc::new(AtomicUsize::new(0));
//! let counter = ticks.clone();
//! scheduler.schedule_repeated("tick", Duration::from_millis(5), move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//!     Ok(())
//! });
//!
//! scheduler.start().unwrap();
//! std::thread::sleep(Duration::from_millis(50));
//! scheduler.shutdown();
//! assert!(ticks.load(Ordering::SeqCst) > 0);
//! ```

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use pirobot_types::RobotError;
use tracing::{debug, error};

/// A unit of work run by the [`Scheduler`].
pub type Job = Box<dyn FnMut() -> Result<(), RobotError> + Send>;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

// ────────────────────────────────────────────────────────────────────────────
// Job bookkeeping
// ────────────────────────────────────────────────────────────────────────────

struct JobEntry {
    name: String,
    job: Mutex<Job>,
    /// Set from the moment a run is queued until it returns.
    running: AtomicBool,
    cancelled: AtomicBool,
}

struct Timer {
    due: Instant,
    interval: Option<Duration>,
    entry: Arc<JobEntry>,
}

/// Handle to a scheduled job.  Dropping the handle does not cancel the job.
#[derive(Clone)]
pub struct JobHandle {
    entry: Arc<JobEntry>,
}

impl JobHandle {
    /// Stop future runs.  A run already in progress completes.
    pub fn cancel(&self) {
        self.entry.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.entry.cancelled.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("name", &self.entry.name)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scheduler
// ────────────────────────────────────────────────────────────────────────────

struct TimerQueue {
    timers: Vec<Timer>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<TimerQueue>,
    wake: Condvar,
    stopped: AtomicBool,
}

/// Fixed-size pool running periodic jobs.
pub struct Scheduler {
    threads: usize,
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Scheduler {
    /// Create a stopped scheduler with `threads` workers (at least one).
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            shared: Arc::new(Shared {
                queue: Mutex::new(TimerQueue {
                    timers: Vec::new(),
                    shutdown: false,
                }),
                wake: Condvar::new(),
                stopped: AtomicBool::new(false),
            }),
            handles: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Run `job` every `interval`, starting as soon as the scheduler runs.
    pub fn schedule_repeated<F>(&self, name: impl Into<String>, interval: Duration, job: F) -> JobHandle
    where
        F: FnMut() -> Result<(), RobotError> + Send + 'static,
    {
        self.insert(name.into(), Instant::now(), Some(interval.max(MIN_INTERVAL)), Box::new(job))
    }

    /// Run `job` once, `delay` from now.
    pub fn schedule_once<F>(&self, name: impl Into<String>, delay: Duration, job: F) -> JobHandle
    where
        F: FnOnce() -> Result<(), RobotError> + Send + 'static,
    {
        let mut job = Some(job);
        let job: Job = Box::new(move || match job.take() {
            Some(f) => f(),
            None => Ok(()),
        });
        self.insert(name.into(), Instant::now() + delay, None, job)
    }

    fn insert(&self, name: String, due: Instant, interval: Option<Duration>, job: Job) -> JobHandle {
        let entry = Arc::new(JobEntry {
            name,
            job: Mutex::new(job),
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        });
        let handle = JobHandle {
            entry: entry.clone(),
        };

        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            handle.cancel();
            return handle;
        }
        queue.timers.push(Timer { due, interval, entry });
        self.shared.wake.notify_one();
        handle
    }

    /// Spawn the dispatcher and worker threads.
    ///
    /// # Errors
    ///
    /// [`RobotError::AlreadyStarted`] on a second call, or
    /// [`RobotError::HardwareFault`] if the OS refuses to spawn a thread.
    pub fn start(&self) -> Result<(), RobotError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RobotError::AlreadyStarted);
        }

        let (tx, rx) = crossbeam_channel::unbounded::<Arc<JobEntry>>();
        let mut handles = self.handles.lock();

        for i in 0..self.threads {
            let rx = rx.clone();
            let shared = self.shared.clone();
            let handle = thread::Builder::new()
                .name(format!("pirobot-worker-{i}"))
                .spawn(move || worker_loop(&shared, &rx))
                .map_err(|e| RobotError::hardware("scheduler", format!("failed to spawn worker: {e}")))?;
            handles.push(handle);
        }

        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("pirobot-dispatcher".into())
            .spawn(move || dispatcher_loop(&shared, tx))
            .map_err(|e| RobotError::hardware("scheduler", format!("failed to spawn dispatcher: {e}")))?;
        handles.push(handle);

        debug!(threads = self.threads, "scheduler started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Cancel every job and join all threads.  Runs already executing
    /// finish first.  Repeated calls are no-ops, and a call from one of the
    /// scheduler's own workers does not join that worker.
    pub fn shutdown(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            for timer in queue.timers.drain(..) {
                timer.entry.cancelled.store(true, Ordering::SeqCst);
            }
            self.shared.wake.notify_all();
        }

        let current = thread::current().id();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("scheduler thread panicked during shutdown");
            }
        }
        debug!("scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Threads
// ────────────────────────────────────────────────────────────────────────────

fn dispatcher_loop(shared: &Shared, tx: Sender<Arc<JobEntry>>) {
    let mut queue = shared.queue.lock();
    loop {
        if queue.shutdown {
            return;
        }
        queue
            .timers
            .retain(|t| !t.entry.cancelled.load(Ordering::SeqCst));

        let Some(next_due) = queue.timers.iter().map(|t| t.due).min() else {
            shared.wake.wait(&mut queue);
            continue;
        };

        let now = Instant::now();
        if next_due > now {
            shared.wake.wait_until(&mut queue, next_due);
            continue;
        }

        let mut rescheduled = Vec::with_capacity(queue.timers.len());
        for mut timer in queue.timers.drain(..) {
            if timer.due > now {
                rescheduled.push(timer);
                continue;
            }

            if timer
                .entry
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                if tx.send(timer.entry.clone()).is_err() {
                    return;
                }
            } else {
                debug!(job = %timer.entry.name, "previous run still active, skipping");
            }

            if let Some(interval) = timer.interval {
                timer.due += interval;
                while timer.due <= now {
                    timer.due += interval;
                }
                rescheduled.push(timer);
            }
        }
        queue.timers = rescheduled;
    }
}

fn worker_loop(shared: &Shared, rx: &Receiver<Arc<JobEntry>>) {
    while let Ok(entry) = rx.recv() {
        if !shared.stopped.load(Ordering::SeqCst) && !entry.cancelled.load(Ordering::SeqCst) {
            run_job(&entry);
        }
        entry.running.store(false, Ordering::SeqCst);
    }
}

fn run_job(entry: &JobEntry) {
    let mut job = entry.job.lock();
    match catch_unwind(AssertUnwindSafe(|| (*job)())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(job = %entry.name, error = %e, "scheduled job failed"),
        Err(panic) => error!(job = %entry.name, panic = %panic_message(&*panic), "scheduled job panicked"),
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
