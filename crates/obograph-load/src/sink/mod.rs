//! Bulk-write sinks.
//!
//! A sink accepts whole batches and answers success or failure per request.
//! Two HTTP implementations are provided:
//!
//! - [`SparqlUpdateSink`]: SPARQL 1.1 Update endpoint (Fuseki-style), one
//!   `INSERT DATA` statement per batch, named graph per ontology.
//! - [`SearchIndexSink`]: Meilisearch-style document index, one JSON array per
//!   batch, primary key `id`.

pub mod search;
pub mod sparql;

pub use search::{EnqueuedTask, SearchIndexSink};
pub use sparql::SparqlUpdateSink;

/// Maximum number of payload characters carried in an error.
pub const PAYLOAD_PREVIEW_CHARS: usize = 500;

/// Destination-addressed bulk writer.
pub trait BulkSink {
    type Item;

    /// Short name used in logs (`sparql`, `search`, ...).
    fn name(&self) -> &str;

    /// Remove everything previously loaded into `destination`.
    fn clear(&self, destination: &str) -> Result<(), SinkError>;

    /// Write one batch. Blocks until the sink answers or the timeout elapses.
    fn write_batch(&self, destination: &str, items: &[Self::Item]) -> Result<(), SinkError>;
}

impl<S: BulkSink + ?Sized> BulkSink for &S {
    type Item = S::Item;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn clear(&self, destination: &str) -> Result<(), SinkError> {
        (**self).clear(destination)
    }

    fn write_batch(&self, destination: &str, items: &[Self::Item]) -> Result<(), SinkError> {
        (**self).write_batch(destination, items)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered HTTP {status}: {body} (payload starts: {payload_preview})")]
    Status {
        url: String,
        status: u16,
        body: String,
        payload_preview: String,
    },
    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{url} not ready after {attempts} attempts")]
    NotReady { url: String, attempts: u32 },
    #[error("invalid sink configuration: {0}")]
    Config(String),
}

/// First [`PAYLOAD_PREVIEW_CHARS`] characters of `payload`.
pub fn payload_preview(payload: &str) -> String {
    match payload.char_indices().nth(PAYLOAD_PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &payload[..end]),
        None => payload.to_string(),
    }
}

/// Pass a 2xx response through; anything else becomes a [`SinkError::Status`].
pub(crate) fn check_response(
    url: &str,
    response: reqwest::blocking::Response,
    preview: impl FnOnce() -> String,
) -> Result<reqwest::blocking::Response, SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(SinkError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body: body.trim().to_string(),
        payload_preview: preview(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(PAYLOAD_PREVIEW_CHARS + 10);
        let preview = payload_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PAYLOAD_PREVIEW_CHARS + 3);
        assert_eq!(payload_preview("short"), "short");
    }
}
