use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use crate::model::{FavoriteKind, Profile};
use crate::remote::{ProfileRemote, RemoteError};
use crate::storage::LocalProfileStore;

/// Best-effort remote write, applied in the order it was queued.
#[derive(Debug)]
pub enum RemoteOp {
    Upsert {
        identity: String,
        profile: Box<Profile>,
    },
    PatchFavorite {
        identity: String,
        kind: FavoriteKind,
        id: String,
        add: bool,
    },
    /// Resolved once every op queued before it has been attempted.
    Barrier(oneshot::Sender<()>),
}

impl RemoteOp {
    fn identity(&self) -> Option<&str> {
        match self {
            RemoteOp::Upsert { identity, .. } | RemoteOp::PatchFavorite { identity, .. } => {
                Some(identity)
            }
            RemoteOp::Barrier(_) => None,
        }
    }
}

/// Sending half of the outbound FIFO. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<RemoteOp>,
}

impl OutboundQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteOp>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, op: RemoteOp) {
        if let Err(err) = self.tx.send(op) {
            warn!(identity = ?err.0.identity(), "outbound queue closed, dropping remote write");
        }
    }

    /// Queues a barrier and returns the receiver that fires when it is
    /// reached, or `None` if the queue is closed.
    pub fn barrier(&self) -> Option<oneshot::Receiver<()>> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx.send(RemoteOp::Barrier(done_tx)).ok()?;
        Some(done_rx)
    }
}

/// Drains the outbound queue one op at a time. A failed write is retried
/// once after the retry delay: a favorite patch is sent again as is, an
/// upsert is resent with the latest local profile. If the retry fails too
/// the write is dropped.
pub struct RemoteWorker {
    remote: Arc<dyn ProfileRemote>,
    store: Arc<LocalProfileStore>,
    backoff: Backoff,
}

impl RemoteWorker {
    pub fn new(
        remote: Arc<dyn ProfileRemote>,
        store: Arc<LocalProfileStore>,
        backoff: Backoff,
    ) -> Self {
        Self {
            remote,
            store,
            backoff,
        }
    }

    /// Runs until cancelled or until every sender is gone, then hands the
    /// receiver back so a later run can continue with anything still queued.
    pub async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<RemoteOp>,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<RemoteOp> {
        debug!("remote worker started");
        loop {
            let op = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                op = rx.recv() => match op {
                    Some(op) => op,
                    None => break,
                },
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("remote worker stopped with a write in flight");
                    break;
                }
                _ = self.process(op) => {}
            }
        }
        debug!("remote worker stopped");
        rx
    }

    async fn process(&self, op: RemoteOp) {
        match op {
            RemoteOp::Barrier(done) => {
                let _ = done.send(());
            }
            RemoteOp::Upsert { identity, profile } => {
                if let Err(err) = self.remote.upsert(&identity, &profile).await {
                    self.retry_upsert(&identity, &err).await;
                }
            }
            RemoteOp::PatchFavorite {
                identity,
                kind,
                id,
                add,
            } => {
                if let Err(err) = self.remote.patch_favorite(&identity, kind, &id, add).await {
                    self.retry_patch(&identity, kind, &id, add, &err).await;
                }
            }
        }
    }

    async fn retry_patch(
        &self,
        identity: &str,
        kind: FavoriteKind,
        id: &str,
        add: bool,
        cause: &RemoteError,
    ) {
        self.pause_before_retry(identity, cause).await;
        match self.remote.patch_favorite(identity, kind, id, add).await {
            Ok(()) => debug!(identity, %kind, id, "favorite patch retry succeeded"),
            Err(err) => warn!(
                identity,
                %kind,
                id,
                error = %err,
                "favorite patch retry failed, dropping remote write"
            ),
        }
    }

    async fn retry_upsert(&self, identity: &str, cause: &RemoteError) {
        self.pause_before_retry(identity, cause).await;
        let latest = self.store.read();
        if latest.id != identity {
            info!(
                identity,
                local = %latest.id,
                "local profile now belongs to another identity, dropping remote write"
            );
            return;
        }
        match self.remote.upsert(identity, &latest).await {
            Ok(()) => debug!(identity, "upsert retry succeeded"),
            Err(err) => warn!(identity, error = %err, "upsert retry failed, dropping remote write"),
        }
    }

    async fn pause_before_retry(&self, identity: &str, cause: &RemoteError) {
        warn!(
            identity,
            error = %cause,
            retryable = cause.is_retryable(),
            "remote write failed, retrying once"
        );
        tokio::time::sleep(self.backoff.delay()).await;
    }
}
