mod backoff;
mod context;
mod favorites;
mod orchestrator;
mod queue;

pub use backoff::Backoff;
pub use context::{SyncContext, SyncState};
pub use favorites::FavoriteToggleService;
pub use orchestrator::{SyncError, SyncOrchestrator};
pub use queue::{OutboundQueue, RemoteOp, RemoteWorker};
