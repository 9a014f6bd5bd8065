use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::context::{SyncContext, SyncState};
use super::favorites::FavoriteToggleService;
use super::queue::{RemoteOp, RemoteWorker};
use crate::identity::{IdentityResolver, IdentityTransition};
use crate::merge;
use crate::model::{Profile, ProfileEdit};
use crate::storage::LocalStoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync orchestrator is already running")]
    AlreadyStarted,
    #[error("outbound queue was lost by a previous run")]
    QueueUnavailable,
    #[error("local store error: {0}")]
    Local(#[from] LocalStoreError),
}

enum Control {
    Flush(oneshot::Sender<()>),
}

struct Running {
    cancel: CancellationToken,
    control: mpsc::UnboundedSender<Control>,
    listener: JoinHandle<()>,
    worker: JoinHandle<mpsc::UnboundedReceiver<RemoteOp>>,
}

/// Two-state machine (`Anonymous`, `Authenticated`) driven by identity
/// transitions. On sign-in the device profile is merged with the remote
/// document; edits and toggles always land locally first and are mirrored
/// remotely only while authenticated.
pub struct SyncOrchestrator {
    context: Arc<SyncContext>,
    resolver: Arc<IdentityResolver>,
    running: Mutex<Option<Running>>,
}

impl SyncOrchestrator {
    pub fn new(context: SyncContext, resolver: Arc<IdentityResolver>) -> Self {
        let state = match resolver.authenticated_identity() {
            Some(identity) => SyncState::Authenticated { identity },
            None => SyncState::Anonymous,
        };
        context.set_state(state);
        Self {
            context: Arc::new(context),
            resolver,
            running: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SyncState {
        self.context.state()
    }

    pub fn profile(&self) -> Profile {
        self.context.store.read()
    }

    pub fn favorites(&self) -> FavoriteToggleService {
        FavoriteToggleService::new(Arc::clone(&self.context))
    }

    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    /// Subscribes to the resolver and spawns the transition listener and the
    /// remote worker. A session restored from a previous run is synced right
    /// away.
    pub fn start(&self) -> Result<(), SyncError> {
        let mut running = self.lock_running();
        if running.is_some() {
            return Err(SyncError::AlreadyStarted);
        }
        let rx = self
            .context
            .take_pending()
            .ok_or(SyncError::QueueUnavailable)?;

        let cancel = CancellationToken::new();
        let transitions = self.resolver.subscribe();
        // Read after subscribing: a sign-in from here on arrives as a
        // transition and is not also treated as a restored session.
        let restored = self.resolver.authenticated_identity();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let worker = RemoteWorker::new(
            Arc::clone(&self.context.remote),
            Arc::clone(&self.context.store),
            self.context.backoff,
        );
        let worker = tokio::spawn(worker.run(rx, cancel.clone()));
        let listener = tokio::spawn(listen(
            Arc::clone(&self.context),
            Arc::clone(&self.resolver),
            restored,
            transitions,
            control_rx,
            cancel.clone(),
        ));

        *running = Some(Running {
            cancel,
            control: control_tx,
            listener,
            worker,
        });
        info!("sync orchestrator started");
        Ok(())
    }

    /// Cancels both tasks and waits for them. Remote writes still queued are
    /// kept for the next `start`.
    pub async fn stop(&self) {
        let Some(running) = self.lock_running().take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(err) = running.listener.await {
            warn!(error = %err, "transition listener ended abnormally");
        }
        match running.worker.await {
            Ok(rx) => self.context.park_pending(rx),
            Err(err) => warn!(error = %err, "remote worker ended abnormally"),
        }
        info!("sync orchestrator stopped");
    }

    /// Waits until every transition emitted and every remote write queued
    /// before this call has been attempted. Returns at once when stopped.
    pub async fn flush(&self) {
        let (control, cancel) = match self.lock_running().as_ref() {
            Some(running) => (running.control.clone(), running.cancel.clone()),
            None => return,
        };
        let (done_tx, done_rx) = oneshot::channel();
        if control.send(Control::Flush(done_tx)).is_err() {
            return;
        }
        tokio::select! {
            _ = done_rx => {}
            _ = cancel.cancelled() => {}
        }
    }

    pub async fn handle_transition(&self, transition: IdentityTransition) {
        apply_transition(&self.context, transition).await;
    }

    /// Applies `edit` locally, notifies, and upserts the profile remotely
    /// when authenticated. The upsert never removes remote favorites.
    pub fn edit(&self, edit: ProfileEdit) -> Result<Profile, LocalStoreError> {
        if edit.is_empty() {
            return Ok(self.context.store.read());
        }
        let profile = self.context.store.update(|profile| edit.apply(profile))?;
        self.context.publish_profile(profile.clone());
        if let Some(identity) = self.context.authenticated_identity() {
            self.context.enqueue(RemoteOp::Upsert {
                identity,
                profile: Box::new(profile.clone()),
            });
        }
        Ok(profile)
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn listen(
    context: Arc<SyncContext>,
    resolver: Arc<IdentityResolver>,
    restored: Option<String>,
    mut transitions: broadcast::Receiver<IdentityTransition>,
    mut control: mpsc::UnboundedReceiver<Control>,
    cancel: CancellationToken,
) {
    if let Some(identity) = restored {
        apply_transition(&context, IdentityTransition::Authenticated { identity }).await;
    }

    loop {
        // Transitions before control so a flush observes every transition
        // emitted ahead of it.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = transitions.recv() => match received {
                Ok(transition) => apply_transition(&context, transition).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "missed identity transitions, resyncing from resolver");
                    let transition = match resolver.authenticated_identity() {
                        Some(identity) => IdentityTransition::Authenticated { identity },
                        None => IdentityTransition::SignedOut,
                    };
                    apply_transition(&context, transition).await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            Some(Control::Flush(done)) = control.recv() => {
                context.enqueue(RemoteOp::Barrier(done));
            }
        }
    }
    debug!("transition listener stopped");
}

async fn apply_transition(context: &SyncContext, transition: IdentityTransition) {
    match transition {
        IdentityTransition::Authenticated { identity } => sign_in(context, identity).await,
        IdentityTransition::SignedOut => {
            context.set_state(SyncState::Anonymous);
            info!("signed out, local profile kept");
        }
    }
}

async fn sign_in(context: &SyncContext, identity: String) {
    let remote = match context.remote.fetch(&identity).await {
        Ok(remote) => remote,
        Err(err) => {
            warn!(identity = %identity, error = %err, "remote profile unavailable, promoting local profile");
            None
        }
    };

    // Merge under the store lock so a concurrent local mutation is either in
    // the merge input or applied on top of its result.
    let merged = match context
        .store
        .update(|local| *local = merge::merge(local, remote.as_ref(), &identity))
    {
        Ok(merged) => merged,
        Err(err) => {
            warn!(identity = %identity, error = %err, "failed to store merged profile");
            return;
        }
    };

    context.set_state(SyncState::Authenticated {
        identity: identity.clone(),
    });
    info!(identity = %identity, remote_found = remote.is_some(), "profile synced on sign-in");
    context.publish_profile(merged);

    // Upserts only union favorites in, so this holds even when the fetch
    // failed. Read after the state switch so an edit racing the merge is
    // either mirrored on its own or already in this snapshot.
    let latest = context.store.read();
    context.enqueue(RemoteOp::Upsert {
        identity,
        profile: Box::new(latest),
    });
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
