//! Remote SPARQL 1.1 protocol backend.
//!
//! Queries are sent as `POST` with a form-encoded `query` field. SELECT
//! results are requested as `application/sparql-results+json`; CONSTRUCT
//! results as N-Triples, although any RDF syntax named by the response
//! `Content-Type` is accepted.
//!
//! Connection failures, timeouts and 5xx responses are retried a bounded
//! number of times with exponential backoff. Every other failure is
//! reported immediately. Whatever the cause, callers only ever see
//! [`StoreError::Backend`] or [`StoreError::Query`], never a transport error.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::{Graph, Triple};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::warn;

use super::sparql::{SolutionRow, SparqlBackend};
use super::StoreError;
use crate::query::PreparedQuery;

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";
const N_TRIPLES: &str = "application/n-triples";

// ---------------------------------------------------------------------------
// EndpointError
// ---------------------------------------------------------------------------

/// A single failed exchange with the endpoint.
#[derive(Debug, thiserror::Error)]
enum EndpointError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned status {status}: {body}")]
    BadStatus { status: StatusCode, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl EndpointError {
    fn is_transient(&self) -> bool {
        match self {
            EndpointError::Http(e) => e.is_connect() || e.is_timeout(),
            EndpointError::BadStatus { status, .. } => status.is_server_error(),
            EndpointError::InvalidResponse(_) => false,
        }
    }

    fn into_store_error(self, query: &PreparedQuery) -> StoreError {
        match self {
            // The endpoint understood the request and refused the query.
            EndpointError::BadStatus { status, body } if status == StatusCode::BAD_REQUEST => {
                StoreError::Query {
                    template: query.template.clone(),
                    message: body,
                }
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// SPARQL JSON results
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SparqlJson {
    results: SparqlJsonResults,
}

#[derive(Debug, Deserialize)]
struct SparqlJsonResults {
    bindings: Vec<HashMap<String, SparqlJsonTerm>>,
}

/// Only the lexical value matters for header columns.
#[derive(Debug, Deserialize)]
struct SparqlJsonTerm {
    value: String,
}

// ---------------------------------------------------------------------------
// RemoteEndpoint
// ---------------------------------------------------------------------------

/// A SPARQL endpoint reached over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    client: Client,
    url: String,
    retries: u32,
    backoff: Duration,
}

impl RemoteEndpoint {
    /// `timeout` bounds each HTTP exchange; `retries` bounds how often a
    /// transient failure is retried.
    pub fn new(url: impl Into<String>, timeout: Duration, retries: u32) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Load(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            retries,
            backoff: Duration::from_millis(200),
        })
    }

    /// Delay before the first retry; doubled for each further one.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, query: &PreparedQuery, accept: &str) -> Result<Response, StoreError> {
        let mut attempt = 0u32;
        loop {
            match self.post_once(query, accept).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    let delay = self.backoff * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        endpoint = %self.url,
                        template = %query.template,
                        attempt,
                        "transient SPARQL failure, retrying in {delay:?}: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(endpoint = %self.url, template = %query.template, "SPARQL request failed: {e}");
                    return Err(e.into_store_error(query));
                }
            }
        }
    }

    async fn post_once(
        &self,
        query: &PreparedQuery,
        accept: &str,
    ) -> Result<Response, EndpointError> {
        let response = self
            .client
            .post(&self.url)
            .header(ACCEPT, accept)
            .form(&[("query", query.text.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EndpointError::BadStatus { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl SparqlBackend for RemoteEndpoint {
    async fn select(&self, query: &PreparedQuery) -> Result<Vec<SolutionRow>, StoreError> {
        let response = self.post(query, SPARQL_RESULTS_JSON).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| EndpointError::from(e).into_store_error(query))?;
        let results: SparqlJson = serde_json::from_slice(&body).map_err(|e| {
            EndpointError::InvalidResponse(format!("malformed SPARQL JSON results: {e}"))
                .into_store_error(query)
        })?;
        Ok(results
            .results
            .bindings
            .into_iter()
            .map(|binding| binding.into_iter().map(|(k, v)| (k, v.value)).collect())
            .collect())
    }

    async fn construct(&self, query: &PreparedQuery) -> Result<Graph, StoreError> {
        let response = self.post(query, N_TRIPLES).await?;
        let format = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .and_then(|media_type| RdfFormat::from_media_type(media_type.trim()))
            .unwrap_or(RdfFormat::NTriples);
        let body = response
            .bytes()
            .await
            .map_err(|e| EndpointError::from(e).into_store_error(query))?;

        let mut graph = Graph::new();
        for quad in RdfParser::from_format(format).for_reader(body.as_ref()) {
            let quad = quad.map_err(|e| {
                EndpointError::InvalidResponse(e.to_string()).into_store_error(query)
            })?;
            graph.insert(&Triple::from(quad));
        }
        Ok(graph)
    }
}
