use profile_core::{ApiErrorClass, DocumentClient, DocumentError, FieldTransform};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn get_document_returns_fields_with_bearer_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/documents/profiles/u42"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "fields": {
                "id": "u42",
                "displayName": "Ana"
            }
        })))
        .mount(&server)
        .await;

    let client = DocumentClient::with_base_url(&server.uri())
        .unwrap()
        .with_bearer_token("test-token");
    let doc = client.get_document("profiles", "u42").await.unwrap();

    assert_eq!(doc, Some(json!({"id": "u42", "displayName": "Ana"})));
}

#[tokio::test]
async fn get_document_maps_not_found_to_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/documents/profiles/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = DocumentClient::with_base_url(&server.uri()).unwrap();
    let doc = client.get_document("profiles", "missing").await.unwrap();

    assert!(doc.is_none());
}

#[tokio::test]
async fn merge_document_patches_fields_and_transforms_together() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/v1/documents/profiles/u42"))
        .and(body_json(json!({
            "fields": {"id": "u42", "location": "Lisbon"},
            "transforms": [
                {"field": "favorites.retreats", "op": "arrayUnion", "values": ["r1", "r2"]}
            ]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = DocumentClient::with_base_url(&server.uri()).unwrap();
    client
        .merge_document(
            "profiles",
            "u42",
            &json!({"id": "u42", "location": "Lisbon"}),
            &[FieldTransform::array_union(
                "favorites.retreats",
                vec![json!("r1"), json!("r2")],
            )],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn apply_transforms_patches_with_array_union() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/v1/documents/profiles/u42"))
        .and(body_json(json!({
            "transforms": [
                {"field": "favorites.retreats", "op": "arrayUnion", "values": ["r1"]}
            ]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = DocumentClient::with_base_url(&server.uri()).unwrap();
    client
        .apply_transforms(
            "profiles",
            "u42",
            &[FieldTransform::array_union(
                "favorites.retreats",
                vec![json!("r1")],
            )],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/v1/documents/profiles/u42"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let client = DocumentClient::with_base_url(&server.uri()).unwrap();
    let err = client
        .merge_document("profiles", "u42", &json!({}), &[])
        .await
        .expect_err("expected api error");

    match &err {
        DocumentError::Api { status, body } => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(body, "busy");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.classification(), Some(ApiErrorClass::Transient));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn forbidden_is_auth_class() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/documents/profiles/u42"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = DocumentClient::with_base_url(&server.uri()).unwrap();
    let err = client.get_document("profiles", "u42").await.unwrap_err();

    assert_eq!(err.classification(), Some(ApiErrorClass::Auth));
    assert!(!err.is_retryable());
}
