use tokio::sync::{Mutex, MutexGuard, Notify};

use crate::payload::Payload;

/// Per-record identity: at most one live `Holder` exists for a given
/// `(index, key)` pair within a process. The `state` mutex is the
/// Holder's monitor — every reading or mutating operation on the record
/// serialises on it, and `notify` stands in for the monitor's condition
/// variable (lease waiters, shutdown drain).
pub struct Holder {
    index: String,
    key: String,
    state: Mutex<HolderState>,
    notify: Notify,
}

/// State guarded by the Holder's monitor.
pub struct HolderState {
    /// `None` until the record has been loaded from the driver or created
    /// in memory for the first time.
    pub payload: Option<Payload>,
    /// Set once the record has been removed; further schedule attempts
    /// return the (empty) payload without scheduling a save.
    pub removed: bool,
}

impl Holder {
    pub fn new(index: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            key: key.into(),
            state: Mutex::new(HolderState { payload: None, removed: false }),
            notify: Notify::new(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn lock(&self) -> MutexGuard<'_, HolderState> {
        self.state.lock().await
    }

    pub fn notify(&self) -> &Notify {
        &self.notify
    }

    pub fn notify_waiters(&self) {
        self.notify.notify_waiters();
    }
}

impl std::fmt::Debug for Holder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Holder").field("index", &self.index).field("key", &self.key).finish()
    }
}
