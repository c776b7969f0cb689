//! Metadata payloads and the namespace table that travels with them.
//!
//! Prefix bindings are a property of the store, not of the triples a
//! construct query returns. Every store therefore attaches its
//! [`Namespaces`] to each extracted graph via [`MetadataGraph::with_namespaces`]
//! before the graph leaves the store, so serializers can emit readable
//! prefixed names.

use std::fmt;
use std::sync::{Arc, LazyLock};

use oxigraph::model::{Graph, Triple};
use regex::Regex;

pub const RDF_NAMESPACE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

/// Ordered `prefix → namespace IRI` bindings. A prefix is bound at most once;
/// the first binding wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespaces {
    bindings: Vec<(String, String)>,
}

impl Namespaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// `rdf` and `dc`, the bindings every payload in this repository uses.
    pub fn standard() -> Self {
        let mut ns = Self::new();
        ns.bind("rdf", RDF_NAMESPACE);
        ns.bind("dc", DC_NAMESPACE);
        ns
    }

    /// Add a binding unless the prefix is already bound. Returns whether it
    /// was added.
    pub fn bind(&mut self, prefix: impl Into<String>, iri: impl Into<String>) -> bool {
        let prefix = prefix.into();
        if self.get(&prefix).is_some() {
            return false;
        }
        self.bindings.push((prefix, iri.into()));
        true
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, iri)| iri.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(p, i)| (p.as_str(), i.as_str()))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bind everything from `other` that is not bound here yet.
    pub fn extend(&mut self, other: &Namespaces) {
        for (p, i) in other.iter() {
            self.bind(p, i);
        }
    }

    /// Collect the `@prefix`/`PREFIX` declarations of a Turtle, TriG or
    /// SPARQL document.
    pub fn scan_declarations(text: &str) -> Self {
        let mut ns = Self::new();
        for cap in PREFIX_DECL_RE.captures_iter(text) {
            ns.bind(&cap[1], &cap[2]);
        }
        ns
    }
}

impl<P: Into<String>, I: Into<String>> FromIterator<(P, I)> for Namespaces {
    fn from_iter<T: IntoIterator<Item = (P, I)>>(iter: T) -> Self {
        let mut ns = Self::new();
        for (p, i) in iter {
            ns.bind(p, i);
        }
        ns
    }
}

// Matches `@prefix dc: <...> .` and `PREFIX dc: <...>` (case-insensitive keyword).
static PREFIX_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*@?prefix\s+([A-Za-z][\w.\-]*|)\s*:\s*<([^>\s]*)>")
        .expect("invalid prefix declaration regex")
});

/// The metadata graph of one record together with the store's namespace
/// table.
#[derive(Clone)]
pub struct MetadataGraph {
    pub graph: Graph,
    pub namespaces: Arc<Namespaces>,
}

impl MetadataGraph {
    /// A graph with no namespace bindings yet.
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            namespaces: Arc::new(Namespaces::new()),
        }
    }

    pub fn from_triples(triples: impl IntoIterator<Item = Triple>) -> Self {
        let mut graph = Graph::new();
        for t in triples {
            graph.insert(&t);
        }
        Self::new(graph)
    }

    /// Propagate the store's namespace table onto this graph.
    pub fn with_namespaces(mut self, namespaces: Arc<Namespaces>) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }
}

impl fmt::Debug for MetadataGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataGraph")
            .field("triples", &self.graph.len())
            .field("namespaces", &self.namespaces.len())
            .finish()
    }
}
