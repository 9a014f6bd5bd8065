use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use profile_core::{DocumentClient, DocumentError, FieldTransform};
use profile_integrations::ids::REMOTE_COLLECTION_PROFILES;
use serde_json::Value;
use tracing::debug;

use super::normalize::{profile_from_document, profile_to_document};
use super::{ProfileRemote, RemoteError};
use crate::model::{FavoriteKind, Profile};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`ProfileRemote`] backed by the HTTP document store. This is the only
/// place that sees the store's own document encoding.
#[derive(Clone)]
pub struct RemoteProfileGateway {
    client: DocumentClient,
    timeout: Duration,
}

impl RemoteProfileGateway {
    pub fn new(client: DocumentClient) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, DocumentError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RemoteError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl ProfileRemote for RemoteProfileGateway {
    async fn fetch(&self, identity: &str) -> Result<Option<Profile>, RemoteError> {
        let doc = self
            .bounded(self.client.get_document(REMOTE_COLLECTION_PROFILES, identity))
            .await?;
        debug!(identity, found = doc.is_some(), "fetched remote profile");
        Ok(doc.map(|doc| profile_from_document(&doc)))
    }

    /// Scalars are replaced, favorites are only ever unioned in. Removals
    /// reach the store through [`ProfileRemote::patch_favorite`] alone, so an
    /// upsert from one device cannot drop an item another device added.
    async fn upsert(&self, identity: &str, profile: &Profile) -> Result<(), RemoteError> {
        let mut doc = profile_to_document(profile)?;
        if let Some(fields) = doc.as_object_mut() {
            fields.remove("favorites");
            fields.insert("id".to_string(), Value::String(identity.to_string()));
        }
        let transforms = favorite_unions(profile);
        self.bounded(self.client.merge_document(
            REMOTE_COLLECTION_PROFILES,
            identity,
            &doc,
            &transforms,
        ))
        .await?;
        debug!(identity, unions = transforms.len(), "upserted remote profile");
        Ok(())
    }

    async fn patch_favorite(
        &self,
        identity: &str,
        kind: FavoriteKind,
        id: &str,
        add: bool,
    ) -> Result<(), RemoteError> {
        let values = vec![Value::String(id.to_string())];
        let transform = if add {
            FieldTransform::array_union(kind.field_path(), values)
        } else {
            FieldTransform::array_remove(kind.field_path(), values)
        };
        self.bounded(
            self.client
                .apply_transforms(REMOTE_COLLECTION_PROFILES, identity, &[transform]),
        )
        .await?;
        debug!(identity, %kind, id, add, "patched remote favorite");
        Ok(())
    }
}

fn favorite_unions(profile: &Profile) -> Vec<FieldTransform> {
    FavoriteKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let ids = profile.favorites.get(kind);
            if ids.is_empty() {
                return None;
            }
            let values = ids.iter().cloned().map(Value::String).collect();
            Some(FieldTransform::array_union(kind.field_path(), values))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::timestamp::Timestamp;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> RemoteProfileGateway {
        let client = DocumentClient::with_base_url(&server.uri()).unwrap();
        RemoteProfileGateway::new(client)
    }

    #[tokio::test]
    async fn fetch_normalizes_server_timestamps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/documents/profiles/u42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "fields": {
                    "id": "u42",
                    "displayName": "Ana",
                    "role": "instructor",
                    "joinedAt": {"_seconds": 1_700_000_000, "_nanoseconds": 0},
                    "updatedAt": {"seconds": 1_704_067_200, "nanos": 5_000_000},
                    "favorites": {"retreats": ["r2"]}
                }
            })))
            .mount(&server)
            .await;

        let profile = gateway(&server).fetch("u42").await.unwrap().unwrap();

        assert_eq!(profile.display_name, "Ana");
        assert_eq!(profile.role, Role::Instructor);
        assert_eq!(
            profile.joined_at,
            Some(Timestamp::from_millis(1_700_000_000_000))
        );
        assert_eq!(
            profile.updated_at,
            Some(Timestamp::from_millis(1_704_067_200_005))
        );
        assert!(profile.is_favorite(FavoriteKind::Retreat, "r2"));
    }

    #[tokio::test]
    async fn fetch_absent_document_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/documents/profiles/new-user"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(gateway(&server).fetch("new-user").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_writes_portable_timestamps_and_identity() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/documents/profiles/u42"))
            .and(body_partial_json(json!({
                "fields": {
                    "id": "u42",
                    "joinedAt": "2024-01-01T00:00:00.000Z"
                },
                "transforms": []
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let profile = Profile::new_anonymous("dev1", Timestamp::from_millis(1_704_067_200_000));
        gateway(&server).upsert("u42", &profile).await.unwrap();
    }

    #[tokio::test]
    async fn upsert_unions_favorites_instead_of_writing_them() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/documents/profiles/u42"))
            .and(body_partial_json(json!({
                "transforms": [
                    {"field": "favorites.retreats", "op": "arrayUnion", "values": ["r1", "r2"]}
                ]
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut profile = Profile::new_anonymous("u42", Timestamp::from_millis(1_704_067_200_000));
        profile.favorites.retreats.insert("r2".into());
        profile.favorites.retreats.insert("r1".into());
        gateway(&server).upsert("u42", &profile).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["fields"].get("favorites").is_none());
    }

    #[tokio::test]
    async fn patch_favorite_sends_set_transform() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/documents/profiles/u42"))
            .and(body_json(json!({
                "transforms": [
                    {"field": "favorites.instructors", "op": "arrayRemove", "values": ["i7"]}
                ]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        gateway(&server)
            .patch_favorite("u42", FavoriteKind::Instructor, "i7", false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/documents/profiles/u42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(json!({"fields": {}})),
            )
            .mount(&server)
            .await;

        let err = gateway(&server)
            .with_timeout(Duration::from_millis(50))
            .fetch("u42")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Timeout(_)));
        assert!(err.is_retryable());
    }
}
