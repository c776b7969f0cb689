//! In-memory store.
//!
//! Records are held in insertion order and never change once the store is
//! shared, so no locking is needed. Each record's metadata is a one-triple
//! graph synthesized from its title:
//!
//! ```text
//! <urn:id:{identifier}> dc:title "{title}" .
//! ```
//!
//! Use this for tests, the conformance suite, and the built-in sample.

use std::sync::Arc;

use async_trait::async_trait;
use oxigraph::model::{Literal, NamedNode, NamedNodeRef, Triple};

use super::{HeaderRow, MetadataStore, RecordFilter, StoreError, StoredRecord};
use crate::graph::{MetadataGraph, Namespaces};

const DC_TITLE: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/elements/1.1/title");

/// One record of a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecord {
    pub identifier: String,
    pub datestamp: String,
    pub title: String,
    pub set_specs: Vec<String>,
    pub deleted: bool,
}

impl MemoryRecord {
    pub fn new(
        identifier: impl Into<String>,
        datestamp: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            datestamp: datestamp.into(),
            title: title.into(),
            set_specs: Vec::new(),
            deleted: false,
        }
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    fn header(&self) -> HeaderRow {
        HeaderRow {
            identifier: self.identifier.clone(),
            datestamp: self.datestamp.clone(),
            set_specs: self.set_specs.clone(),
            deleted: self.deleted,
        }
    }

    fn graph(&self) -> Result<MetadataGraph, StoreError> {
        let subject = NamedNode::new(format!("urn:id:{}", self.identifier)).map_err(|e| {
            StoreError::Backend(format!("record {:?} has no valid IRI: {e}", self.identifier))
        })?;
        let triple = Triple::new(subject, DC_TITLE, Literal::new_simple_literal(&self.title));
        Ok(MetadataGraph::from_triples([triple]))
    }
}

/// Thread-safe, in-memory implementation of [`MetadataStore`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    records: Vec<MemoryRecord>,
    namespaces: Arc<Namespaces>,
}

impl MemoryStore {
    /// An empty store with the `rdf` and `dc` namespace bindings.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            namespaces: Arc::new(Namespaces::standard()),
        }
    }

    /// The two-record sample served when no graph or endpoint is configured.
    pub fn sample() -> Self {
        Self::new()
            .with_record(MemoryRecord::new("record1", "2025-08-14", "Record 1"))
            .with_record(MemoryRecord::new("record2", "2025-08-10", "Record 2"))
    }

    pub fn with_record(mut self, record: MemoryRecord) -> Self {
        self.records.push(record);
        self
    }

    fn select(&self, filter: &RecordFilter) -> Vec<&MemoryRecord> {
        let mut matching = self.records.iter().filter(|r| filter.admits(&r.header()));
        match filter.identifier {
            Some(_) => matching.next().into_iter().collect(),
            None => matching.collect(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn list_identifiers(&self, filter: &RecordFilter) -> Result<Vec<HeaderRow>, StoreError> {
        Ok(self.select(filter).into_iter().map(MemoryRecord::header).collect())
    }

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
        self.select(filter)
            .into_iter()
            .map(|record| {
                let metadata = if record.deleted {
                    None
                } else {
                    Some(record.graph()?.with_namespaces(Arc::clone(&self.namespaces)))
                };
                Ok(StoredRecord {
                    header: record.header(),
                    metadata,
                })
            })
            .collect()
    }
}
