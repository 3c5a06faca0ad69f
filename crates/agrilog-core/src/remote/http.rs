//! HTTP client for the remote document store.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Document, DocumentStore, MAX_BATCH_WRITES};
use crate::models::Collection;
use crate::util::{compact_text, is_http_url};
use crate::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct DocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    writes: &'a [Document],
}

/// Document store reached over HTTP with a bearer API key.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpDocumentStore {
    /// Builds a client for an explicit base URL.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        Self::with_timeout(base_url, api_key, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = normalize_base_url(&base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Remote(format!("Failed to construct HTTP client: {error}")))?;
        Ok(Self {
            base_url,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            client,
        })
    }

    /// Returns the base URL this client was configured with.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: Collection, route: &str) -> String {
        format!(
            "{}/v1/collections/{}/{route}",
            self.base_url,
            urlencoding::encode(collection.as_str())
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn fetch_all(&self, collection: Collection) -> Result<Vec<Document>> {
        let response = self
            .authorize(self.client.get(self.collection_url(collection, "documents")))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|error| Error::Remote(format!("Fetch of {collection} failed: {error}")))?;
        let response = ensure_success(response, "Fetch", collection).await?;

        let payload = response
            .json::<DocumentsResponse>()
            .await
            .map_err(|error| {
                Error::Remote(format!("Failed to parse {collection} documents: {error}"))
            })?;
        Ok(payload.documents)
    }

    async fn commit_batch(&self, collection: Collection, documents: Vec<Document>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        if documents.len() > MAX_BATCH_WRITES {
            return Err(Error::InvalidInput(format!(
                "Batch of {} writes exceeds the {MAX_BATCH_WRITES} write limit",
                documents.len()
            )));
        }

        let response = self
            .authorize(self.client.post(self.collection_url(collection, "batch")))
            .header("Accept", "application/json")
            .json(&BatchRequest { writes: &documents })
            .send()
            .await
            .map_err(|error| Error::Remote(format!("Commit to {collection} failed: {error}")))?;
        ensure_success(response, "Commit", collection).await?;
        Ok(())
    }
}

async fn ensure_success(
    response: reqwest::Response,
    operation: &str,
    collection: Collection,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Remote(format!(
        "{operation} of {collection} failed with HTTP {status}: {}",
        compact_text(&body)
    )))
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(Error::Config("Remote base URL is empty".to_string()));
    }
    if !is_http_url(value) {
        return Err(Error::Config(
            "Remote base URL must include http:// or https://".to_string(),
        ));
    }
    Ok(value.trim_end_matches('/').to_string())
}
