use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::transform::FieldTransform;

const DOCUMENTS_PREFIX: &str = "/v1/documents/";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("base url cannot carry document paths: {0}")]
    CannotBeABase(String),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// Thin client for a key-value document service addressed by
/// `collection/id`, with field-level merge writes and server-side set
/// transforms on array fields.
#[derive(Clone)]
pub struct DocumentClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl DocumentClient {
    pub fn with_base_url(base_url: &str) -> Result<Self, DocumentError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Reads a document. A document that was never written is `Ok(None)`.
    pub async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Value>, DocumentError> {
        let url = self.document_url(collection, id)?;
        let response = self.authorize(self.http.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let payload: DocumentEnvelope = Self::handle_response(response).await?;
        Ok(payload.fields)
    }

    /// Replaces the given top-level fields and applies `transforms` in one
    /// atomic write. Fields not named are left as stored. The document is
    /// created if it does not exist yet.
    pub async fn merge_document(
        &self,
        collection: &str,
        id: &str,
        fields: &Value,
        transforms: &[FieldTransform],
    ) -> Result<(), DocumentError> {
        let body = PatchRequest {
            fields: Some(fields),
            transforms,
        };
        self.patch(collection, id, &body).await
    }

    /// Applies array transforms atomically on the server. The document is
    /// created if it does not exist yet.
    pub async fn apply_transforms(
        &self,
        collection: &str,
        id: &str,
        transforms: &[FieldTransform],
    ) -> Result<(), DocumentError> {
        let body = PatchRequest {
            fields: None,
            transforms,
        };
        self.patch(collection, id, &body).await
    }

    async fn patch(
        &self,
        collection: &str,
        id: &str,
        body: &PatchRequest<'_>,
    ) -> Result<(), DocumentError> {
        let url = self.document_url(collection, id)?;
        let response = self
            .authorize(self.http.patch(url))
            .json(body)
            .send()
            .await?;
        Self::handle_empty_response(response).await
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn document_url(&self, collection: &str, id: &str) -> Result<Url, DocumentError> {
        let mut url = self.base_url.join(DOCUMENTS_PREFIX)?;
        url.path_segments_mut()
            .map_err(|_| DocumentError::CannotBeABase(self.base_url.to_string()))?
            .pop_if_empty()
            .push(collection)
            .push(id);
        Ok(url)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DocumentError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DocumentError::Api { status, body })
        }
    }

    async fn handle_empty_response(response: reqwest::Response) -> Result<(), DocumentError> {
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DocumentError::Api { status, body })
        }
    }
}

impl DocumentError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DocumentError::Api { status, .. } => Some(classify_api_status(*status)),
            DocumentError::Request(err) if err.is_timeout() || err.is_connect() => {
                Some(ApiErrorClass::Transient)
            }
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Deserialize)]
struct DocumentEnvelope {
    #[serde(default)]
    fields: Option<Value>,
}

#[derive(Debug, Serialize)]
struct PatchRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a Value>,
    transforms: &'a [FieldTransform],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_url_encodes_identity_segment() {
        let client = DocumentClient::with_base_url("https://store.example").unwrap();
        let url = client.document_url("profiles", "user/42 a").unwrap();
        assert_eq!(
            url.as_str(),
            "https://store.example/v1/documents/profiles/user%2F42%20a"
        );
    }

    #[test]
    fn classifies_statuses() {
        assert_eq!(
            classify_api_status(StatusCode::UNAUTHORIZED),
            ApiErrorClass::Auth
        );
        assert_eq!(
            classify_api_status(StatusCode::TOO_MANY_REQUESTS),
            ApiErrorClass::RateLimit
        );
        assert_eq!(
            classify_api_status(StatusCode::SERVICE_UNAVAILABLE),
            ApiErrorClass::Transient
        );
        assert_eq!(
            classify_api_status(StatusCode::BAD_REQUEST),
            ApiErrorClass::Permanent
        );
    }

    #[test]
    fn api_errors_report_retryability() {
        let err = DocumentError::Api {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        assert!(err.is_retryable());
        let err = DocumentError::Api {
            status: StatusCode::FORBIDDEN,
            body: String::new(),
        };
        assert!(!err.is_retryable());
    }
}
