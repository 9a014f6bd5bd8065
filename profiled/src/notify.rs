use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use crate::model::ProfileEvent;

/// Receives profile change events. Called synchronously on the publishing
/// thread, so implementations must not block.
pub trait ProfileObserver: Send + Sync {
    fn notify(&self, event: &ProfileEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// In-process fan-out of [`ProfileEvent`]s. Delivery is at most once and
/// there is no replay for late subscribers.
#[derive(Default)]
pub struct NotificationHub {
    next_id: AtomicU64,
    observers: Mutex<Vec<(SubscriptionId, Arc<dyn ProfileObserver>)>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn ProfileObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, observer));
        id
    }

    /// Returns whether `id` was subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn publish(&self, event: &ProfileEvent) {
        // Snapshot so observers may (un)subscribe from inside `notify`.
        let observers: Vec<Arc<dyn ProfileObserver>> = self
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer.notify(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Arc<dyn ProfileObserver>)>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Forwards events into an unbounded channel for async consumers.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ProfileEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ProfileEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ProfileObserver for ChannelObserver {
    fn notify(&self, event: &ProfileEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!("profile event receiver dropped");
        }
    }
}
