//! REST transport for a JSON collection server.
//!
//! Collections live under a common base URL:
//!
//! - `GET    {base}/{collection}`      every record
//! - `POST   {base}/{collection}`      create, returns the stored record
//! - `PUT    {base}/{collection}`      replace by the id in the body
//! - `DELETE {base}/{collection}/{id}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::Value;
use tracing::debug;

use super::{Transport, TransportError};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// REST transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    fn record_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, id)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(TransportError::from_status(status, &body))
        }
    }

    async fn read_json(response: reqwest::Response, url: &str) -> Result<Value, TransportError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            TransportError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Value>, TransportError> {
        let url = self.collection_url(collection);
        debug!(url = %url, "GET collection");

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        match Self::read_json(response, &url).await? {
            Value::Array(records) => Ok(records),
            other => Err(TransportError::InvalidResponse(format!(
                "Expected an array from {}, got {}",
                url,
                json_kind(&other)
            ))),
        }
    }

    async fn create(&self, collection: &str, draft: Value) -> Result<Value, TransportError> {
        let url = self.collection_url(collection);
        debug!(url = %url, "POST record");

        let response = self.client.post(&url).json(&draft).send().await?;
        let response = Self::check_response(response).await?;
        Self::read_json(response, &url).await
    }

    async fn replace(&self, collection: &str, entity: Value) -> Result<Value, TransportError> {
        let url = self.collection_url(collection);
        debug!(url = %url, "PUT record");

        let response = self.client.put(&url).json(&entity).send().await?;
        let response = Self::check_response(response).await?;
        Self::read_json(response, &url).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), TransportError> {
        let url = self.record_url(collection, id);
        debug!(url = %url, "DELETE record");

        let response = self.client.delete(&url).send().await?;
        Self::check_response(response).await?;
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
