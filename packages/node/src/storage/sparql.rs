//! Query-backed store.
//!
//! [`SparqlStore`] turns a [`RecordFilter`] into one of the three header
//! selection templates, then runs `recordConstruct` once per live record to
//! extract its metadata graph. Where the queries run is up to the
//! [`SparqlBackend`]: an in-process graph ([`LocalGraph`]) or a remote
//! endpoint ([`RemoteEndpoint`]).
//!
//! Selection templates must project `?identifier` and `?datestamp`. Two
//! optional columns are understood as well:
//!
//! - `?setSpec`: one set per row; rows sharing an identifier are merged.
//! - `?deleted`: `true`/`1` marks a tombstone, for which no construct query
//!   is run.
//!
//! The store re-checks every row against the filter, so a template that
//! over-selects cannot break the identifier or date-range guarantees.
//!
//! [`LocalGraph`]: super::local::LocalGraph
//! [`RemoteEndpoint`]: super::remote::RemoteEndpoint

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use oaipmh::DateRange;
use oxigraph::model::vocab::xsd;
use oxigraph::model::{Graph, Literal};

use super::{HeaderRow, MetadataStore, RecordFilter, StoreError, StoredRecord};
use crate::graph::{MetadataGraph, Namespaces};
use crate::query::{
    Bindings, PreparedQuery, QueryTemplates, ALL_HEADERS_SELECT, DATE_RANGE_HEADERS_SELECT,
    IDENTIFIED_HEADER_SELECT, RECORD_CONSTRUCT, REQUIRED_TEMPLATES,
};

/// One solution of a SELECT query: variable name → lexical value.
pub type SolutionRow = HashMap<String, String>;

/// Executes prepared queries somewhere.
#[async_trait]
pub trait SparqlBackend: Send + Sync + 'static {
    async fn select(&self, query: &PreparedQuery) -> Result<Vec<SolutionRow>, StoreError>;

    async fn construct(&self, query: &PreparedQuery) -> Result<Graph, StoreError>;
}

/// A [`MetadataStore`] answering from SPARQL query templates.
pub struct SparqlStore<B> {
    backend: B,
    templates: QueryTemplates,
    namespaces: Arc<Namespaces>,
}

impl<B: SparqlBackend> SparqlStore<B> {
    /// Fails when one of the four required templates is missing.
    pub fn new(
        backend: B,
        templates: QueryTemplates,
        namespaces: Arc<Namespaces>,
    ) -> Result<Self, StoreError> {
        templates.require(&REQUIRED_TEMPLATES)?;
        Ok(Self {
            backend,
            templates,
            namespaces,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn headers(&self, filter: &RecordFilter) -> Result<Vec<HeaderRow>, StoreError> {
        let (name, bindings) = match &filter.identifier {
            Some(id) => (
                IDENTIFIED_HEADER_SELECT,
                Bindings::new().with("identifier", Literal::new_simple_literal(id)),
            ),
            None if !filter.range.is_unbounded() => {
                (DATE_RANGE_HEADERS_SELECT, range_bindings(&filter.range))
            }
            None => (ALL_HEADERS_SELECT, Bindings::new()),
        };

        let query = self.templates.get(name)?.bind(&bindings)?;
        let solutions = self.backend.select(&query).await?;
        tracing::debug!(template = name, solutions = solutions.len(), "header selection");

        let mut headers = merge_solutions(name, solutions)?;
        headers.retain(|h| filter.admits(h));
        if filter.identifier.is_some() {
            headers.truncate(1);
        }
        Ok(headers)
    }

    async fn metadata(&self, identifier: &str) -> Result<MetadataGraph, StoreError> {
        let query = self
            .templates
            .get(RECORD_CONSTRUCT)?
            .bind(&Bindings::new().with("identifier", Literal::new_simple_literal(identifier)))?;
        let graph = self.backend.construct(&query).await?;
        // Prefix bindings belong to the store, not to the constructed triples.
        Ok(MetadataGraph::new(graph).with_namespaces(Arc::clone(&self.namespaces)))
    }
}

#[async_trait]
impl<B: SparqlBackend> MetadataStore for SparqlStore<B> {
    async fn list_identifiers(&self, filter: &RecordFilter) -> Result<Vec<HeaderRow>, StoreError> {
        self.headers(filter).await
    }

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
        let headers = self.headers(filter).await?;
        let mut records = Vec::with_capacity(headers.len());
        for header in headers {
            let metadata = if header.deleted {
                None
            } else {
                Some(self.metadata(&header.identifier).await?)
            };
            records.push(StoredRecord { header, metadata });
        }
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `?from` at the first instant of its datestamp, `?until` at the last.
fn range_bindings(range: &DateRange) -> Bindings {
    let mut bindings = Bindings::new();
    if let Some(from) = range.from {
        bindings = bindings.with("from", date_time(from.start()));
    }
    if let Some(until) = range.until {
        bindings = bindings.with("until", date_time(until.end()));
    }
    bindings
}

fn date_time(instant: DateTime<Utc>) -> Literal {
    Literal::new_typed_literal(
        instant.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        xsd::DATE_TIME,
    )
}

/// Fold solutions into one header per identifier, in first-seen order.
fn merge_solutions(template: &str, solutions: Vec<SolutionRow>) -> Result<Vec<HeaderRow>, StoreError> {
    let mut headers: Vec<HeaderRow> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for mut row in solutions {
        let missing = |column: &str| StoreError::Query {
            template: template.to_string(),
            message: format!("solution without ?{column}"),
        };
        let identifier = row.remove("identifier").ok_or_else(|| missing("identifier"))?;
        let datestamp = row.remove("datestamp").ok_or_else(|| missing("datestamp"))?;
        let deleted = row
            .get("deleted")
            .is_some_and(|v| matches!(v.trim(), "true" | "1"));
        let set_spec = row.remove("setSpec");

        let header = match index.get(&identifier) {
            Some(&i) => &mut headers[i],
            None => {
                index.insert(identifier.clone(), headers.len());
                headers.push(HeaderRow::new(identifier, datestamp));
                let last = headers.len() - 1;
                &mut headers[last]
            }
        };
        header.deleted |= deleted;
        if let Some(spec) = set_spec {
            if !header.set_specs.contains(&spec) {
                header.set_specs.push(spec);
            }
        }
    }
    Ok(headers)
}
