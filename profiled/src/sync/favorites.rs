use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::context::SyncContext;
use super::queue::RemoteOp;
use crate::model::{FavoriteKind, ProfileEvent};
use crate::storage::LocalStoreError;

/// Optimistic favorite toggles: the local flip and its notification happen
/// before any remote call, which is a set add/remove so repeated or
/// interleaved toggles converge.
#[derive(Clone)]
pub struct FavoriteToggleService {
    context: Arc<SyncContext>,
}

impl FavoriteToggleService {
    pub fn new(context: Arc<SyncContext>) -> Self {
        Self { context }
    }

    /// Flips membership of `id` and returns the new membership. A failed
    /// local write leaves state untouched and sends nothing remote.
    pub fn toggle(&self, kind: FavoriteKind, id: &str) -> Result<bool, LocalStoreError> {
        let member = self.context.store.toggle_favorite_local(kind, id)?;
        self.context.hub.publish(&ProfileEvent::FavoriteChanged {
            kind,
            id: id.to_string(),
            member,
        });

        match self.context.authenticated_identity() {
            Some(identity) => self.context.enqueue(RemoteOp::PatchFavorite {
                identity,
                kind,
                id: id.to_string(),
                add: member,
            }),
            None => debug!(%kind, id, member, "anonymous, favorite kept local"),
        }
        Ok(member)
    }

    pub fn is_favorite(&self, kind: FavoriteKind, id: &str) -> bool {
        self.context.store.is_favorite(kind, id)
    }

    pub fn list(&self, kind: FavoriteKind) -> BTreeSet<String> {
        self.context.store.read_favorites(kind)
    }
}
