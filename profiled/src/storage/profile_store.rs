use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use profile_integrations::ids::KEY_PROFILE;
use thiserror::Error;
use tracing::{debug, warn};

use super::kv::{KvBackend, KvError};
use crate::model::{FavoriteKind, Profile};
use crate::timestamp::Timestamp;

#[derive(Debug, Error)]
pub enum LocalStoreError {
    #[error("local storage error: {0}")]
    Kv(#[from] KvError),
    #[error("profile encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Device copy of the profile. Reads are served from memory; every write goes
/// to the backend first and only replaces the in-memory copy once the backend
/// accepted it.
pub struct LocalProfileStore {
    kv: Arc<dyn KvBackend>,
    current: Mutex<Profile>,
}

impl LocalProfileStore {
    pub fn open(kv: Arc<dyn KvBackend>, device_id: &str) -> Self {
        let current = match kv.get(KEY_PROFILE) {
            Ok(Some(raw)) => match serde_json::from_str::<Profile>(&raw) {
                Ok(mut profile) => {
                    if profile.id.trim().is_empty() {
                        profile.id = device_id.to_string();
                    }
                    profile
                }
                Err(err) => {
                    warn!(error = %err, "stored profile is malformed, starting from defaults");
                    Self::create_default(kv.as_ref(), device_id)
                }
            },
            Ok(None) => Self::create_default(kv.as_ref(), device_id),
            Err(err) => {
                warn!(error = %err, "local storage unavailable, using in-memory profile");
                Profile::new_anonymous(device_id, Timestamp::now())
            }
        };

        Self {
            kv,
            current: Mutex::new(current),
        }
    }

    fn create_default(kv: &dyn KvBackend, device_id: &str) -> Profile {
        let profile = Profile::new_anonymous(device_id, Timestamp::now());
        match serde_json::to_string(&profile) {
            Ok(raw) => {
                if let Err(err) = kv.set(KEY_PROFILE, &raw) {
                    warn!(error = %err, "failed to persist fresh profile");
                }
            }
            Err(err) => warn!(error = %err, "failed to encode fresh profile"),
        }
        debug!(id = %profile.id, "created anonymous profile");
        profile
    }

    pub fn read(&self) -> Profile {
        self.lock().clone()
    }

    /// Overwrites the stored record. `updated_at` is advanced unless the
    /// caller already moved it past the stored value.
    pub fn write(&self, profile: Profile) -> Result<Profile, LocalStoreError> {
        let mut current = self.lock();
        self.persist(&mut current, profile)
    }

    /// Read-modify-write under a single lock.
    pub fn update<F>(&self, mutate: F) -> Result<Profile, LocalStoreError>
    where
        F: FnOnce(&mut Profile),
    {
        let mut current = self.lock();
        let mut next = current.clone();
        mutate(&mut next);
        self.persist(&mut current, next)
    }

    pub fn read_favorites(&self, kind: FavoriteKind) -> BTreeSet<String> {
        self.lock().favorites.get(kind).clone()
    }

    pub fn is_favorite(&self, kind: FavoriteKind, id: &str) -> bool {
        self.lock().is_favorite(kind, id)
    }

    /// Flips membership of `id` and returns the new membership.
    pub fn toggle_favorite_local(
        &self,
        kind: FavoriteKind,
        id: &str,
    ) -> Result<bool, LocalStoreError> {
        let mut current = self.lock();
        let member = !current.is_favorite(kind, id);
        let mut next = current.clone();
        set_membership(&mut next, kind, id, member);
        self.persist(&mut current, next)?;
        Ok(member)
    }

    fn persist(
        &self,
        current: &mut MutexGuard<'_, Profile>,
        mut next: Profile,
    ) -> Result<Profile, LocalStoreError> {
        if next.id.trim().is_empty() {
            next.id = current.id.clone();
        }
        let advanced = match (next.updated_at, current.updated_at) {
            (Some(next_at), Some(previous)) => next_at > previous,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !advanced {
            next.updated_at = Some(Timestamp::now().at_least_after(current.updated_at));
        }

        let raw = serde_json::to_string(&next)?;
        self.kv.set(KEY_PROFILE, &raw)?;
        **current = next.clone();
        Ok(next)
    }

    fn lock(&self) -> MutexGuard<'_, Profile> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn set_membership(profile: &mut Profile, kind: FavoriteKind, id: &str, member: bool) {
    let set = profile.favorites.get_mut(kind);
    if member {
        set.insert(id.to_string());
    } else {
        set.remove(id);
    }
}
