//! From store rows to protocol records.
//!
//! A [`MetadataFormatter`] turns a record's [`MetadataGraph`] into the XML
//! payload for one `metadataPrefix`; the [`FormatRegistry`] knows which
//! formatter serves which prefix. [`MetadataAdapter`] ties a store to one
//! formatter and produces [`Record`]s and [`Header`]s ready for the envelope.

use std::sync::Arc;

use oaipmh::{Datestamp, Granularity, Header, MetadataFormat, Record, XmlElement, XmlError};
use oxigraph::io::{RdfFormat, RdfSerializer};
use tracing::warn;

use crate::error::AppError;
use crate::graph::{MetadataGraph, RDF_NAMESPACE};
use crate::storage::{HeaderRow, MetadataStore, RecordFilter, StoredRecord};

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("cannot serialize metadata graph: {0}")]
    Serialize(String),

    #[error("serialized metadata is not well-formed XML: {0}")]
    Xml(#[from] XmlError),
}

// ---------------------------------------------------------------------------
// Formatters
// ---------------------------------------------------------------------------

/// Serializes metadata graphs for one metadata format.
pub trait MetadataFormatter: Send + Sync {
    fn format(&self) -> &MetadataFormat;

    /// The element placed inside `<metadata>`.
    fn metadata(&self, graph: &MetadataGraph) -> Result<XmlElement, FormatError>;
}

/// Writes the graph as RDF/XML and parses it back into an element tree.
///
/// The round trip through bytes is what guarantees the payload is well-formed
/// before it is embedded in a response.
pub struct RdfXmlFormatter {
    format: MetadataFormat,
}

impl RdfXmlFormatter {
    pub fn new(format: MetadataFormat) -> Self {
        Self { format }
    }

    /// Serialize to an RDF/XML document, declaring the graph's namespaces.
    pub fn to_rdf_xml(graph: &MetadataGraph) -> Result<Vec<u8>, FormatError> {
        let mut serializer = RdfSerializer::from_format(RdfFormat::RdfXml);
        for (prefix, iri) in graph.namespaces.iter() {
            // RDF/XML has no syntax for an empty prefix on element names
            if prefix.is_empty() {
                continue;
            }
            serializer = serializer
                .with_prefix(prefix, iri)
                .map_err(|e| FormatError::Serialize(format!("namespace {prefix}: {e}")))?;
        }

        let mut writer = serializer.for_writer(Vec::new());
        for triple in graph.graph.iter() {
            writer
                .serialize_triple(triple)
                .map_err(|e| FormatError::Serialize(e.to_string()))?;
        }
        writer
            .finish()
            .map_err(|e| FormatError::Serialize(e.to_string()))
    }
}

impl MetadataFormatter for RdfXmlFormatter {
    fn format(&self) -> &MetadataFormat {
        &self.format
    }

    fn metadata(&self, graph: &MetadataGraph) -> Result<XmlElement, FormatError> {
        let bytes = Self::to_rdf_xml(graph)?;
        Ok(XmlElement::parse(&bytes)?)
    }
}

// ---------------------------------------------------------------------------
// FormatRegistry
// ---------------------------------------------------------------------------

/// Metadata formats this repository can disseminate, keyed by prefix.
#[derive(Clone, Default)]
pub struct FormatRegistry {
    formatters: Vec<Arc<dyn MetadataFormatter>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `oai_dc` and `rdf`, both served as RDF/XML.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RdfXmlFormatter::new(MetadataFormat::new(
            "oai_dc",
            "http://www.openarchives.org/OAI/2.0/oai_dc.xsd",
            "http://www.openarchives.org/OAI/2.0/oai_dc/",
        ))));
        registry.register(Arc::new(RdfXmlFormatter::new(MetadataFormat::new(
            "rdf",
            "http://www.openarchives.org/OAI/2.0/rdf.xsd",
            RDF_NAMESPACE,
        ))));
        registry
    }

    /// Add a formatter, replacing any with the same prefix.
    pub fn register(&mut self, formatter: Arc<dyn MetadataFormatter>) {
        let prefix = formatter.format().prefix.clone();
        self.formatters.retain(|f| f.format().prefix != prefix);
        self.formatters.push(formatter);
    }

    pub fn get(&self, prefix: &str) -> Option<Arc<dyn MetadataFormatter>> {
        self.formatters
            .iter()
            .find(|f| f.format().prefix == prefix)
            .cloned()
    }

    /// Every registered format, in registration order.
    pub fn formats(&self) -> Vec<MetadataFormat> {
        self.formatters.iter().map(|f| f.format().clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// MetadataAdapter
// ---------------------------------------------------------------------------

/// A store viewed through one metadata format.
pub struct MetadataAdapter<'a> {
    store: &'a dyn MetadataStore,
    formatter: &'a dyn MetadataFormatter,
    granularity: Granularity,
}

impl<'a> MetadataAdapter<'a> {
    pub fn new(
        store: &'a dyn MetadataStore,
        formatter: &'a dyn MetadataFormatter,
        granularity: Granularity,
    ) -> Self {
        Self {
            store,
            formatter,
            granularity,
        }
    }

    /// The first record matching `filter`.
    pub async fn record(&self, filter: &RecordFilter) -> Result<Option<Record>, AppError> {
        Ok(self.records(filter).await?.into_iter().next())
    }

    pub async fn records(&self, filter: &RecordFilter) -> Result<Vec<Record>, AppError> {
        let stored = self.store.list_records(filter).await?;
        let mut records = Vec::with_capacity(stored.len());
        for StoredRecord { header, metadata } in stored {
            let Some(header) = self.header(header) else {
                continue;
            };
            records.push(match metadata {
                Some(graph) if !header.deleted => Record::new(header, self.metadata(&graph)?),
                _ => Record::tombstone(header),
            });
        }
        Ok(records)
    }

    pub async fn headers(&self, filter: &RecordFilter) -> Result<Vec<Header>, AppError> {
        let rows = self.store.list_identifiers(filter).await?;
        Ok(rows.into_iter().filter_map(|row| self.header(row)).collect())
    }

    pub fn metadata(&self, graph: &MetadataGraph) -> Result<XmlElement, FormatError> {
        self.formatter.metadata(graph)
    }

    /// Store datestamps are normalized to the repository granularity. A row
    /// whose datestamp cannot be read has no valid header and is skipped.
    fn header(&self, row: HeaderRow) -> Option<Header> {
        let Some(datestamp) = Datestamp::parse_lenient(&row.datestamp) else {
            warn!(
                identifier = %row.identifier,
                datestamp = %row.datestamp,
                "skipping record with unreadable datestamp"
            );
            return None;
        };
        Some(Header {
            identifier: row.identifier,
            datestamp: datestamp.to_wire(self.granularity),
            set_specs: row.set_specs,
            deleted: row.deleted,
        })
    }
}
