//! SPARQL 1.1 Update sink.
//!
//! Each batch becomes one `INSERT DATA { GRAPH <g> { ... } }` statement posted
//! as `application/sparql-update` to the configured update endpoint. Clearing
//! a destination is `CLEAR GRAPH <g>` over the same transport.

use std::time::Duration;

use obograph_obo::Triple;
use reqwest::blocking::{Client, RequestBuilder};

use super::{check_response, payload_preview, BulkSink, SinkError};
use crate::config::SparqlConfig;
use crate::retry::RetryPolicy;

pub const SPARQL_UPDATE_CONTENT_TYPE: &str = "application/sparql-update";

/// `INSERT DATA` statement for `triples` in named graph `graph`.
pub fn insert_data_query(graph: &str, triples: &[Triple]) -> String {
    let mut body = String::with_capacity(64 + triples.len() * 120);
    body.push_str("INSERT DATA { GRAPH <");
    body.push_str(graph);
    body.push_str("> {\n");
    for triple in triples {
        body.push_str(&triple.to_string());
        body.push('\n');
    }
    body.push_str("} }");
    body
}

pub fn clear_graph_query(graph: &str) -> String {
    format!("CLEAR GRAPH <{graph}>")
}

#[derive(Debug, Clone)]
pub struct SparqlUpdateSink {
    client: Client,
    update_url: String,
    server_root: String,
    username: Option<String>,
    password: String,
}

impl SparqlUpdateSink {
    pub fn new(config: &SparqlConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SinkError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            update_url: config.update_url.to_string(),
            server_root: config.server_root().to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn update_url(&self) -> &str {
        &self.update_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, Some(&self.password)),
            None => request,
        }
    }

    /// Post one update statement.
    pub fn execute(&self, statement: String) -> Result<(), SinkError> {
        let request = self
            .client
            .post(&self.update_url)
            .header(reqwest::header::CONTENT_TYPE, SPARQL_UPDATE_CONTENT_TYPE);
        let preview = payload_preview(&statement);
        let response = self
            .authorize(request)
            .body(statement)
            .send()
            .map_err(|source| SinkError::Transport {
                url: self.update_url.clone(),
                source,
            })?;
        check_response(&self.update_url, response, || preview)?;
        Ok(())
    }

    /// Poll the server root until it answers 2xx.
    pub fn wait_until_ready(&self, attempts: u32, delay: Duration) -> Result<(), SinkError> {
        let policy = RetryPolicy::new(attempts, delay);
        policy
            .run("sparql readiness probe", |_| {
                let response = self
                    .authorize(self.client.get(&self.server_root))
                    .send()
                    .map_err(|source| SinkError::Transport {
                        url: self.server_root.clone(),
                        source,
                    })?;
                check_response(&self.server_root, response, String::new).map(drop)
            })
            .map_err(|_| SinkError::NotReady {
                url: self.server_root.clone(),
                attempts: policy.attempts.max(1),
            })?;
        tracing::info!(url = %self.server_root, "triple store is ready");
        Ok(())
    }
}

impl BulkSink for SparqlUpdateSink {
    type Item = Triple;

    fn name(&self) -> &str {
        "sparql"
    }

    fn clear(&self, destination: &str) -> Result<(), SinkError> {
        self.execute(clear_graph_query(destination))
    }

    fn write_batch(&self, destination: &str, items: &[Triple]) -> Result<(), SinkError> {
        self.execute(insert_data_query(destination, items))
    }
}
