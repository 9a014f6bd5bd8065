mod gateway;
mod memory;
mod normalize;

use std::time::Duration;

use async_trait::async_trait;
use profile_core::DocumentError;
use thiserror::Error;

use crate::model::{FavoriteKind, Profile};

pub use gateway::RemoteProfileGateway;
pub use memory::{MemoryRemote, RemoteCall};
pub use normalize::{normalize_timestamp, profile_from_document, profile_to_document};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("document store error: {0}")]
    Document(#[from] DocumentError),
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote store is offline")]
    Offline,
    #[error("profile encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Document(err) => err.is_retryable(),
            RemoteError::Timeout(_) | RemoteError::Offline => true,
            RemoteError::Encode(_) => false,
        }
    }
}

/// Canonical per-identity copy of the profile.
///
/// `patch_favorite` must be a server-side set add/remove so concurrent
/// toggles from different devices both survive.
#[async_trait]
pub trait ProfileRemote: Send + Sync {
    /// `Ok(None)` when no document was ever written for `identity`.
    async fn fetch(&self, identity: &str) -> Result<Option<Profile>, RemoteError>;

    async fn upsert(&self, identity: &str, profile: &Profile) -> Result<(), RemoteError>;

    async fn patch_favorite(
        &self,
        identity: &str,
        kind: FavoriteKind,
        id: &str,
        add: bool,
    ) -> Result<(), RemoteError>;
}
