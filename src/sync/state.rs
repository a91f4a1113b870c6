//! Observable lifecycle of the controller.

use std::{fmt, sync::Arc};

use parking_lot::{Condvar, Mutex};

/// ```text
/// Initializing ──(both streams synced)──► Synced ──► Running
/// ```
///
/// Readers may query the store in any state. Before `Synced` they see a
/// partial, growing view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Initializing,
    Synced,
    Running,
}

impl SyncState {
    /// Whether the initial listing of every stream has been applied.
    pub const fn is_synced(self) -> bool {
        !matches!(self, Self::Initializing)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initializing => "initializing",
            Self::Synced => "synced",
            Self::Running => "running",
        })
    }
}

/// Shared view of a controller's state. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<(Mutex<SyncState>, Condvar)>,
}

impl StateHandle {
    pub fn get(&self) -> SyncState {
        *self.inner.0.lock()
    }

    pub(super) fn set(&self, state: SyncState) {
        let (lock, cvar) = &*self.inner;
        *lock.lock() = state;
        cvar.notify_all();
    }

    /// Block until the controller has synced, at most `timeout`.
    ///
    /// Returns whether it synced.
    #[cfg(test)]
    pub fn wait_synced(&self, timeout: std::time::Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock();
        while !state.is_synced() {
            if cvar.wait_until(&mut state, deadline).timed_out() {
                return state.is_synced();
            }
        }
        true
    }
}
