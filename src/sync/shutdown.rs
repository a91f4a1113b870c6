//! One-shot cancellation signal shared by the server, the controller and
//! its workers.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    cvar: Condvar,
}

/// Cloneable cancellation flag with blocking waits.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        *self.inner.cancelled.lock() = true;
        self.inner.cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Block until cancelled.
    pub fn wait(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            self.inner.cvar.wait(&mut cancelled);
        }
    }

    /// Block until cancelled or `timeout` elapses. Returns whether cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self.inner.cvar.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}
