use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use profile_integrations::ids::{KEY_DEVICE_ID, KEY_SESSION_IDENTITY};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::storage::{KvBackend, KvError};

const TRANSITION_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("device id storage error: {0}")]
    Storage(#[from] KvError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityTransition {
    Authenticated { identity: String },
    SignedOut,
}

/// Supplies the identity the profile is addressed by: a generated device id
/// while anonymous, the provider's identity once signed in.
pub struct IdentityResolver {
    kv: Arc<dyn KvBackend>,
    device_id: String,
    authenticated: Mutex<Option<String>>,
    transitions: broadcast::Sender<IdentityTransition>,
}

impl IdentityResolver {
    /// Loads the device id (generating and persisting one on first use) and
    /// any session that survived a restart. Only a failure to read the device
    /// id is an error; session problems degrade to anonymous.
    pub fn open(kv: Arc<dyn KvBackend>) -> Result<Self, IdentityError> {
        let device_id = match kv.get(KEY_DEVICE_ID)? {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => {
                let id = Uuid::new_v4().to_string();
                if let Err(err) = kv.set(KEY_DEVICE_ID, &id) {
                    warn!(error = %err, "failed to persist device id, it will change on restart");
                }
                info!(device_id = %id, "generated device id");
                id
            }
        };

        let authenticated = match kv.get(KEY_SESSION_IDENTITY) {
            Ok(Some(identity)) if !identity.trim().is_empty() => Some(identity.trim().to_string()),
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "failed to restore session, continuing anonymous");
                None
            }
        };

        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Ok(Self {
            kv,
            device_id,
            authenticated: Mutex::new(authenticated),
            transitions,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn authenticated_identity(&self) -> Option<String> {
        self.lock().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().is_some()
    }

    pub fn current_identity(&self) -> String {
        self.lock()
            .clone()
            .unwrap_or_else(|| self.device_id.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IdentityTransition> {
        self.transitions.subscribe()
    }

    /// Records a successful provider sign-in. An unusable identity is treated
    /// like an unavailable provider: the resolver stays as it is.
    pub fn sign_in(&self, identity: &str) {
        let identity = identity.trim();
        if identity.is_empty() {
            warn!("identity provider returned an empty identity, staying anonymous");
            return;
        }

        let mut current = self.lock();
        if current.as_deref() == Some(identity) {
            return;
        }
        if current.is_some() {
            *current = None;
            self.emit(IdentityTransition::SignedOut);
        }
        *current = Some(identity.to_string());
        if let Err(err) = self.kv.set(KEY_SESSION_IDENTITY, identity) {
            warn!(error = %err, "failed to persist session, it will not survive a restart");
        }
        info!(identity, "signed in");
        self.emit(IdentityTransition::Authenticated {
            identity: identity.to_string(),
        });
    }

    /// Reverts to the device id. The device id itself is never cleared.
    pub fn sign_out(&self) {
        let mut current = self.lock();
        let Some(previous) = current.take() else {
            return;
        };
        if let Err(err) = self.kv.remove(KEY_SESSION_IDENTITY) {
            warn!(error = %err, "failed to clear persisted session");
        }
        info!(identity = %previous, "signed out");
        self.emit(IdentityTransition::SignedOut);
    }

    fn emit(&self, transition: IdentityTransition) {
        // No receivers is fine: nothing is listening yet.
        let _ = self.transitions.send(transition);
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.authenticated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;
    use tokio::sync::broadcast::error::TryRecvError;

    fn resolver() -> (Arc<MemoryKv>, IdentityResolver) {
        let kv = Arc::new(MemoryKv::new());
        let resolver = IdentityResolver::open(kv.clone()).unwrap();
        (kv, resolver)
    }

    #[test]
    fn generates_and_reuses_device_id() {
        let kv = Arc::new(MemoryKv::new());
        let first = IdentityResolver::open(kv.clone()).unwrap();
        let second = IdentityResolver::open(kv).unwrap();

        assert!(!first.device_id().is_empty());
        assert_eq!(first.device_id(), second.device_id());
        assert_eq!(first.current_identity(), first.device_id());
    }

    #[test]
    fn sign_in_emits_exactly_one_transition() {
        let (_kv, resolver) = resolver();
        let mut rx = resolver.subscribe();

        resolver.sign_in("u42");
        resolver.sign_in("u42");

        assert_eq!(
            rx.try_recv().unwrap(),
            IdentityTransition::Authenticated {
                identity: "u42".into()
            }
        );
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(resolver.current_identity(), "u42");
    }

    #[test]
    fn sign_out_reverts_to_device_id() {
        let (_kv, resolver) = resolver();
        let device_id = resolver.device_id().to_string();
        resolver.sign_in("u42");
        let mut rx = resolver.subscribe();

        resolver.sign_out();
        resolver.sign_out();

        assert_eq!(rx.try_recv().unwrap(), IdentityTransition::SignedOut);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(resolver.current_identity(), device_id);
        assert!(!resolver.is_authenticated());
    }

    #[test]
    fn empty_identity_keeps_resolver_anonymous() {
        let (_kv, resolver) = resolver();
        let mut rx = resolver.subscribe();
        resolver.sign_in("   ");
        assert!(!resolver.is_authenticated());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn switching_identity_signs_out_first() {
        let (_kv, resolver) = resolver();
        resolver.sign_in("u1");
        let mut rx = resolver.subscribe();
        resolver.sign_in("u2");

        assert_eq!(rx.try_recv().unwrap(), IdentityTransition::SignedOut);
        assert_eq!(
            rx.try_recv().unwrap(),
            IdentityTransition::Authenticated {
                identity: "u2".into()
            }
        );
    }

    #[test]
    fn session_survives_restart() {
        let (kv, resolver) = resolver();
        resolver.sign_in("u42");
        drop(resolver);

        let restored = IdentityResolver::open(kv.clone()).unwrap();
        assert_eq!(restored.authenticated_identity().as_deref(), Some("u42"));
        restored.sign_out();

        let again = IdentityResolver::open(kv).unwrap();
        assert!(!again.is_authenticated());
    }

    #[test]
    fn session_persistence_failure_still_signs_in() {
        let (kv, resolver) = resolver();
        kv.set_unavailable(true);
        resolver.sign_in("u42");
        assert!(resolver.is_authenticated());
    }

    #[test]
    fn unreadable_device_id_is_an_error() {
        let kv = Arc::new(MemoryKv::new());
        kv.set_unavailable(true);
        assert!(matches!(
            IdentityResolver::open(kv),
            Err(IdentityError::Storage(KvError::Unavailable))
        ));
    }
}
