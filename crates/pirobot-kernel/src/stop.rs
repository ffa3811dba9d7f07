//! [`StopSignal`] – one-shot cancellation token shared by the runtime, the
//! watchdog monitor and the Ctrl-C handler.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Cloneable stop flag.  Once triggered it stays triggered.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every waiter.  Safe to call from a signal
    /// handler thread and more than once.
    pub fn trigger(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock() = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block until the signal is triggered.
    pub fn wait(&self) {
        let (flag, cvar) = &*self.inner;
        let mut stopped = flag.lock();
        while !*stopped {
            cvar.wait(&mut stopped);
        }
    }

    /// Block for at most `timeout`.  Returns `true` if the signal was
    /// triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let mut stopped = flag.lock();
        if !*stopped {
            cvar.wait_for(&mut stopped, timeout);
        }
        *stopped
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}
