//! Search-index sink (Meilisearch document API).
//!
//! Batches are posted as a JSON array to `/indexes/{index}/documents` with
//! primary key `id`; documents with an existing key are replaced.

use obograph_obo::Document;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;

use super::{check_response, payload_preview, BulkSink, SinkError};
use crate::config::SearchConfig;

pub const PRIMARY_KEY: &str = "id";
pub const FILTERABLE_ATTRIBUTES: [&str; 3] = ["ontology", "label", "id"];

/// Acknowledgement for an accepted write. The server applies the write
/// later; a task that fails afterwards is only visible under this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct EnqueuedTask {
    #[serde(rename = "taskUid")]
    pub task_uid: u64,
}

#[derive(Debug, Clone)]
pub struct SearchIndexSink {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl SearchIndexSink {
    pub fn new(config: &SearchConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SinkError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.url.as_str().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn documents_url(&self, index: &str) -> String {
        format!("{}/indexes/{}/documents", self.base_url, index)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn send(&self, url: &str, request: RequestBuilder, payload: Option<String>) -> Result<Response, SinkError> {
        let preview = payload.as_deref().map(payload_preview).unwrap_or_default();
        let request = match payload {
            Some(body) => request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body),
            None => request,
        };
        let response = self
            .authorize(request)
            .send()
            .map_err(|source| SinkError::Transport {
                url: url.to_string(),
                source,
            })?;
        check_response(url, response, || preview)
    }

    /// Create `index` with primary key `id` and set its filterable attributes.
    ///
    /// Creating an index that already exists is rejected asynchronously by the
    /// server, so only transport and status failures surface here.
    pub fn configure_index(&self, index: &str) -> Result<(), SinkError> {
        let url = format!("{}/indexes", self.base_url);
        let body = json!({ "uid": index, "primaryKey": PRIMARY_KEY });
        self.send(&url, self.client.post(&url), Some(body.to_string()))?;

        let url = format!("{}/indexes/{}/settings/filterable-attributes", self.base_url, index);
        let body = serde_json::to_string(&FILTERABLE_ATTRIBUTES)?;
        self.send(&url, self.client.put(&url), Some(body))?;

        tracing::info!(index, "search index configured");
        Ok(())
    }

    /// Post `documents` to `index`. Returns the server's task id when the
    /// answer carries one.
    pub fn add_documents(&self, index: &str, documents: &[Document]) -> Result<Option<EnqueuedTask>, SinkError> {
        let url = format!("{}?primaryKey={}", self.documents_url(index), PRIMARY_KEY);
        let payload = serde_json::to_string(documents)?;
        let response = self.send(&url, self.client.post(&url), Some(payload))?;
        Ok(response.json::<EnqueuedTask>().ok())
    }
}

impl BulkSink for SearchIndexSink {
    type Item = Document;

    fn name(&self) -> &str {
        "search"
    }

    fn clear(&self, destination: &str) -> Result<(), SinkError> {
        let url = self.documents_url(destination);
        self.send(&url, self.client.delete(&url), None)?;
        Ok(())
    }

    fn write_batch(&self, destination: &str, items: &[Document]) -> Result<(), SinkError> {
        match self.add_documents(destination, items)? {
            Some(task) => tracing::debug!(
                index = destination,
                documents = items.len(),
                task_uid = task.task_uid,
                "documents enqueued"
            ),
            None => tracing::debug!(
                index = destination,
                documents = items.len(),
                "documents accepted without a task id"
            ),
        }
        Ok(())
    }
}
