use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;

use super::{ProfileRemote, RemoteError};
use crate::model::{FavoriteKind, Profile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Fetch {
        identity: String,
    },
    Upsert {
        identity: String,
    },
    PatchFavorite {
        identity: String,
        kind: FavoriteKind,
        id: String,
        add: bool,
    },
}

/// In-process document store with the same write semantics as the HTTP
/// gateway: upserts replace scalars and union favorites, patches are set
/// operations. Calls can be held back with [`MemoryRemote::pause`] to model
/// requests that are still in flight, and failed with
/// [`MemoryRemote::set_offline`].
pub struct MemoryRemote {
    documents: Mutex<HashMap<String, Profile>>,
    calls: Mutex<Vec<RemoteCall>>,
    offline: AtomicBool,
    paused: watch::Sender<bool>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            documents: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            paused,
        }
    }

    pub fn insert(&self, identity: &str, profile: Profile) {
        lock(&self.documents).insert(identity.to_string(), profile);
    }

    pub fn document(&self, identity: &str) -> Option<Profile> {
        lock(&self.documents).get(identity).cloned()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).clone()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    async fn enter(&self, call: RemoteCall) -> Result<(), RemoteError> {
        let mut paused = self.paused.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = paused.wait_for(|paused| !*paused).await;
        lock(&self.calls).push(call);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Offline);
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileRemote for MemoryRemote {
    async fn fetch(&self, identity: &str) -> Result<Option<Profile>, RemoteError> {
        self.enter(RemoteCall::Fetch {
            identity: identity.to_string(),
        })
        .await?;
        Ok(self.document(identity))
    }

    async fn upsert(&self, identity: &str, profile: &Profile) -> Result<(), RemoteError> {
        self.enter(RemoteCall::Upsert {
            identity: identity.to_string(),
        })
        .await?;
        let mut documents = lock(&self.documents);
        let favorites = match documents.get(identity) {
            Some(existing) => existing.favorites.union(&profile.favorites),
            None => profile.favorites.clone(),
        };
        documents.insert(
            identity.to_string(),
            Profile {
                id: identity.to_string(),
                favorites,
                ..profile.clone()
            },
        );
        Ok(())
    }

    async fn patch_favorite(
        &self,
        identity: &str,
        kind: FavoriteKind,
        id: &str,
        add: bool,
    ) -> Result<(), RemoteError> {
        self.enter(RemoteCall::PatchFavorite {
            identity: identity.to_string(),
            kind,
            id: id.to_string(),
            add,
        })
        .await?;
        let mut documents = lock(&self.documents);
        let doc = documents
            .entry(identity.to_string())
            .or_insert_with(|| Profile {
                id: identity.to_string(),
                ..Profile::default()
            });
        let set = doc.favorites.get_mut(kind);
        if add {
            set.insert(id.to_string());
        } else {
            set.remove(id);
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn patches_are_set_operations() {
        let remote = MemoryRemote::new();
        remote
            .patch_favorite("u1", FavoriteKind::Retreat, "r1", true)
            .await
            .unwrap();
        remote
            .patch_favorite("u1", FavoriteKind::Retreat, "r1", true)
            .await
            .unwrap();
        remote
            .patch_favorite("u1", FavoriteKind::Retreat, "r2", true)
            .await
            .unwrap();
        remote
            .patch_favorite("u1", FavoriteKind::Retreat, "r1", false)
            .await
            .unwrap();
        remote
            .patch_favorite("u1", FavoriteKind::Retreat, "r1", false)
            .await
            .unwrap();

        let doc = remote.document("u1").unwrap();
        assert_eq!(doc.favorites.retreats.len(), 1);
        assert!(doc.is_favorite(FavoriteKind::Retreat, "r2"));
    }

    #[tokio::test]
    async fn upsert_keeps_favorites_it_does_not_carry() {
        let remote = MemoryRemote::new();
        remote
            .patch_favorite("u1", FavoriteKind::Retreat, "r5", true)
            .await
            .unwrap();

        let mut profile = Profile::default();
        profile.display_name = "Ana".into();
        profile.favorites.retreats.insert("r1".into());
        remote.upsert("u1", &profile).await.unwrap();

        let doc = remote.document("u1").unwrap();
        assert_eq!(doc.display_name, "Ana");
        assert!(doc.is_favorite(FavoriteKind::Retreat, "r1"));
        assert!(doc.is_favorite(FavoriteKind::Retreat, "r5"));
    }

    #[tokio::test]
    async fn offline_calls_fail_but_are_recorded() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let err = remote.fetch("u1").await.unwrap_err();
        assert!(matches!(err, RemoteError::Offline));
        assert_eq!(
            remote.calls(),
            vec![RemoteCall::Fetch {
                identity: "u1".into()
            }]
        );
    }

    #[tokio::test]
    async fn paused_calls_wait_for_resume() {
        let remote = Arc::new(MemoryRemote::new());
        remote.pause();
        let pending = {
            let remote = Arc::clone(&remote);
            tokio::spawn(async move { remote.upsert("u1", &Profile::default()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(remote.document("u1").is_none());

        remote.resume();
        pending.await.unwrap().unwrap();
        assert_eq!(remote.document("u1").unwrap().id, "u1");
    }
}
