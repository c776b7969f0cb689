//! Record sources for the OAI-PMH endpoint.
//!
//! The [`MetadataStore`] trait is the contract between the dispatcher and
//! wherever records live. Stores apply the selection policy (identifier,
//! date range); the dispatcher decides which protocol error an empty result
//! means.
//!
//! # Implementations
//!
//! | Type | When to use |
//! |------|-------------|
//! | [`MemoryStore`] | Tests, conformance suite, the built-in sample |
//! | [`SparqlStore`] over [`LocalGraph`] | An RDF file loaded into an in-process graph |
//! | [`SparqlStore`] over [`RemoteEndpoint`] | A SPARQL 1.1 protocol endpoint |
//! | [`DeadlineStore`] | Wraps any of the above with a per-call timeout |
//!
//! [`MemoryStore`]: memory::MemoryStore
//! [`SparqlStore`]: sparql::SparqlStore
//! [`LocalGraph`]: local::LocalGraph
//! [`RemoteEndpoint`]: remote::RemoteEndpoint
//! [`DeadlineStore`]: deadline::DeadlineStore

pub mod deadline;
pub mod local;
pub mod memory;
pub mod remote;
pub mod sparql;

use async_trait::async_trait;
use oaipmh::DateRange;

use crate::graph::MetadataGraph;
use crate::query::TemplateError;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors that store operations can return.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend failed or did not answer in time. Transport details are
    /// flattened into the message.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A template could not be bound or the backend rejected the query.
    #[error("query error in {template}: {message}")]
    Query { template: String, message: String },

    /// A required template is not registered.
    #[error("missing query template {0:?}")]
    MissingTemplate(String),

    /// The store could not be built (unreadable graph file, bad templates).
    #[error("failed to load store: {0}")]
    Load(String),
}

impl From<TemplateError> for StoreError {
    fn from(e: TemplateError) -> Self {
        match e {
            TemplateError::Unknown(name) => StoreError::MissingTemplate(name),
            TemplateError::Malformed { template, message } => {
                StoreError::Query { template, message }
            }
            other => StoreError::Load(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordFilter
// ---------------------------------------------------------------------------

/// Selection criteria for [`MetadataStore`] calls.
///
/// - `identifier` set: exact lookup, at most one result, `range` ignored.
/// - otherwise `range` bounds the datestamps (inclusive on both ends).
/// - `set` is accepted and ignored by every store.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub identifier: Option<String>,
    pub range: DateRange,
    pub set: Option<String>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn identifier(identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            ..Default::default()
        }
    }

    pub fn range(range: DateRange) -> Self {
        Self {
            range,
            ..Default::default()
        }
    }

    /// Whether a row belongs to the result. Used by stores that cannot trust
    /// their backend to enforce the policy on its own.
    pub fn admits(&self, row: &HeaderRow) -> bool {
        match &self.identifier {
            Some(id) => row.identifier == *id,
            None => self.range.admits(&row.datestamp),
        }
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Header fields of one record as the store reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRow {
    pub identifier: String,
    /// Datestamp as stored; normalized to the repository granularity later.
    pub datestamp: String,
    pub set_specs: Vec<String>,
    pub deleted: bool,
}

impl HeaderRow {
    pub fn new(identifier: impl Into<String>, datestamp: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            datestamp: datestamp.into(),
            set_specs: Vec::new(),
            deleted: false,
        }
    }
}

/// A header row plus its metadata graph. `metadata` is `None` for deleted
/// records.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub header: HeaderRow,
    pub metadata: Option<MetadataGraph>,
}

// ---------------------------------------------------------------------------
// MetadataStore trait
// ---------------------------------------------------------------------------

/// Read-only access to records.
///
/// Results are fully materialized and ordered stably: two identical calls
/// return the same rows in the same order.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Headers matching `filter`.
    async fn list_identifiers(&self, filter: &RecordFilter) -> Result<Vec<HeaderRow>, StoreError>;

    /// Headers and metadata graphs matching `filter`.
    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError>;
}
