use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use super::backoff::Backoff;
use super::queue::{OutboundQueue, RemoteOp};
use crate::model::{Profile, ProfileEvent};
use crate::notify::NotificationHub;
use crate::remote::ProfileRemote;
use crate::storage::LocalProfileStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Anonymous,
    Authenticated { identity: String },
}

impl SyncState {
    pub fn identity(&self) -> Option<&str> {
        match self {
            SyncState::Anonymous => None,
            SyncState::Authenticated { identity } => Some(identity),
        }
    }
}

/// Collaborators shared by the orchestrator, its tasks and the favorite
/// toggle service.
pub struct SyncContext {
    pub(crate) store: Arc<LocalProfileStore>,
    pub(crate) remote: Arc<dyn ProfileRemote>,
    pub(crate) hub: Arc<NotificationHub>,
    pub(crate) backoff: Backoff,
    pub(crate) outbound: OutboundQueue,
    state: Mutex<SyncState>,
    // Parked here whenever the worker is not running.
    pending: Mutex<Option<mpsc::UnboundedReceiver<RemoteOp>>>,
}

impl SyncContext {
    pub fn new(
        store: Arc<LocalProfileStore>,
        remote: Arc<dyn ProfileRemote>,
        hub: Arc<NotificationHub>,
    ) -> Self {
        let (outbound, rx) = OutboundQueue::new();
        Self {
            store,
            remote,
            hub,
            backoff: Backoff::default(),
            outbound,
            state: Mutex::new(SyncState::Anonymous),
            pending: Mutex::new(Some(rx)),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> SyncState {
        lock(&self.state).clone()
    }

    pub(crate) fn set_state(&self, state: SyncState) {
        *lock(&self.state) = state;
    }

    pub(crate) fn authenticated_identity(&self) -> Option<String> {
        lock(&self.state).identity().map(str::to_string)
    }

    pub(crate) fn publish_profile(&self, profile: Profile) {
        self.hub.publish(&ProfileEvent::ProfileChanged { profile });
    }

    pub(crate) fn enqueue(&self, op: RemoteOp) {
        self.outbound.enqueue(op);
    }

    pub(crate) fn take_pending(&self) -> Option<mpsc::UnboundedReceiver<RemoteOp>> {
        lock(&self.pending).take()
    }

    pub(crate) fn park_pending(&self, rx: mpsc::UnboundedReceiver<RemoteOp>) {
        *lock(&self.pending) = Some(rx);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
