//! Content client for downloading definition tables.
//!
//! Each catalog entry points at one JSON document on the content origin.
//! The document is an object keyed by definition hash; its values, in
//! document order, are the table's definitions.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use reqwest::{header, Client};
use serde_json::{Map, Value};
use tracing::debug;

use super::FetchError;

// ============================================================================
// Constants
// ============================================================================

/// Default origin that serves the definition tables.
pub const DEFAULT_ORIGIN: &str = "https://www.bungie.net";

/// Default HTTP request timeout in seconds.
/// The largest tables are tens of megabytes, so this is generous.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// A decoded table document: definition hash -> definition, in document order.
pub type DefinitionMap = Map<String, Value>;

/// Anything that can produce the decoded document for a catalog path.
///
/// The population engine only talks to this trait, so tests can feed it
/// canned tables without a network.
pub trait TableSource: Send + Sync {
    fn fetch_table(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<DefinitionMap, FetchError>> + Send;
}

/// Client for the content origin.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ContentClient {
    client: Client,
    origin: String,
}

impl ContentClient {
    /// Create a client for the given origin
    pub fn new(origin: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            origin: origin.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Build the absolute URL for a catalog path
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.origin, path)
        } else {
            format!("{}/{}", self.origin, path)
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(FetchError::from_status(status, &body))
        }
    }

    /// Download and decode one table document
    pub async fn get_table(&self, path: &str) -> Result<DefinitionMap, FetchError> {
        let url = self.url_for(path);
        debug!(url = %url, "Fetching table");

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let body = response.text().await?;

        debug!(url = %url, bytes = body.len(), "Parsing table");
        decode_table(&body)
    }
}

impl TableSource for ContentClient {
    async fn fetch_table(&self, path: &str) -> Result<DefinitionMap, FetchError> {
        self.get_table(path).await
    }
}

/// Decode a table document. Anything other than a JSON object is rejected.
pub fn decode_table(body: &str) -> Result<DefinitionMap, FetchError> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(map) => Ok(map),
        Value::Array(_) => Err(FetchError::NotAnObject("an array")),
        Value::String(_) => Err(FetchError::NotAnObject("a string")),
        Value::Number(_) => Err(FetchError::NotAnObject("a number")),
        Value::Bool(_) => Err(FetchError::NotAnObject("a boolean")),
        Value::Null => Err(FetchError::NotAnObject("null")),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_table_keeps_document_order() {
        let body = r#"{"30": {"hash": 30}, "10": {"hash": 10}, "20": {"hash": 20}}"#;
        let map = decode_table(body).unwrap();
        let hashes: Vec<i64> = map
            .values()
            .map(|v| v["hash"].as_i64().unwrap())
            .collect();
        assert_eq!(hashes, vec![30, 10, 20]);
    }

    #[test]
    fn test_decode_table_rejects_non_objects() {
        assert!(matches!(
            decode_table("[1, 2, 3]"),
            Err(FetchError::NotAnObject("an array"))
        ));
        assert!(matches!(decode_table("null"), Err(FetchError::NotAnObject("null"))));
    }

    #[test]
    fn test_decode_table_rejects_invalid_json() {
        assert!(matches!(decode_table("<html>"), Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_url_for_joins_paths() {
        let client = ContentClient::new("https://example.test/", 5).unwrap();
        assert_eq!(client.origin(), "https://example.test");
        assert_eq!(
            client.url_for("/common/a.json"),
            "https://example.test/common/a.json"
        );
        assert_eq!(client.url_for("b.json"), "https://example.test/b.json");
    }
}
