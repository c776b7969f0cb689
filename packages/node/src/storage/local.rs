//! In-process graph backend.
//!
//! The RDF file is parsed once at startup into an oxigraph [`Store`]. Query
//! evaluation is synchronous, so each query runs on tokio's blocking pool and
//! never stalls the request executor.

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::{Graph, Term};
use oxigraph::sparql::{QueryResults, SparqlEvaluator};
use oxigraph::store::Store;
use regex::Regex;

use super::sparql::{SolutionRow, SparqlBackend};
use super::StoreError;
use crate::graph::Namespaces;
use crate::query::PreparedQuery;

/// An RDF graph held in memory and queried in process.
#[derive(Clone)]
pub struct LocalGraph {
    store: Store,
    namespaces: Namespaces,
}

impl LocalGraph {
    /// Load a graph file. The syntax is chosen by file extension
    /// (`.ttl`, `.nt`, `.rdf`, `.trig`, ...).
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(RdfFormat::from_extension)
            .ok_or_else(|| {
                StoreError::Load(format!("cannot tell the RDF syntax of {}", path.display()))
            })?;
        let data = std::fs::read(path)
            .map_err(|e| StoreError::Load(format!("{}: {e}", path.display())))?;
        let graph = Self::parse(&data, format)?;
        tracing::info!(
            path = %path.display(),
            format = format.name(),
            prefixes = graph.namespaces.len(),
            "graph loaded"
        );
        Ok(graph)
    }

    /// Parse an in-memory document.
    pub fn parse(data: &[u8], format: RdfFormat) -> Result<Self, StoreError> {
        let store = Store::new().map_err(|e| StoreError::Load(e.to_string()))?;
        for quad in RdfParser::from_format(format).for_reader(data) {
            let quad = quad.map_err(|e| StoreError::Load(e.to_string()))?;
            store
                .insert(&quad)
                .map_err(|e| StoreError::Load(e.to_string()))?;
        }

        let namespaces = match std::str::from_utf8(data) {
            Ok(text) if format == RdfFormat::RdfXml => XMLNS_RE
                .captures_iter(text)
                .map(|c| (c[1].to_string(), c[2].to_string()))
                .collect(),
            Ok(text) => Namespaces::scan_declarations(text),
            Err(_) => Namespaces::new(),
        };
        Ok(Self { store, namespaces })
    }

    /// Prefixes declared by the loaded document.
    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    async fn evaluate(&self, query: &PreparedQuery) -> Result<QueryOutcome, StoreError> {
        let store = self.store.clone();
        let query = query.clone();
        tokio::task::spawn_blocking(move || evaluate_blocking(&store, &query))
            .await
            .map_err(|e| StoreError::Backend(format!("query task failed: {e}")))?
    }
}

static XMLNS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"xmlns:([A-Za-z_][\w.\-]*)\s*=\s*["']([^"']*)["']"#)
        .expect("invalid xmlns regex")
});

enum QueryOutcome {
    Solutions(Vec<SolutionRow>),
    Graph(Graph),
}

fn evaluate_blocking(store: &Store, query: &PreparedQuery) -> Result<QueryOutcome, StoreError> {
    let query_err = |message: String| StoreError::Query {
        template: query.template.clone(),
        message,
    };

    let results = SparqlEvaluator::new()
        .parse_query(&query.text)
        .map_err(|e| query_err(e.to_string()))?
        .on_store(store)
        .execute()
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    match results {
        QueryResults::Solutions(solutions) => {
            let mut rows = Vec::new();
            for solution in solutions {
                let solution = solution.map_err(|e| StoreError::Backend(e.to_string()))?;
                rows.push(
                    solution
                        .iter()
                        .map(|(var, term)| (var.as_str().to_string(), lexical(term)))
                        .collect(),
                );
            }
            Ok(QueryOutcome::Solutions(rows))
        }
        QueryResults::Graph(triples) => {
            let mut graph = Graph::new();
            for triple in triples {
                let triple = triple.map_err(|e| StoreError::Backend(e.to_string()))?;
                graph.insert(&triple);
            }
            Ok(QueryOutcome::Graph(graph))
        }
        QueryResults::Boolean(_) => Err(query_err("ASK queries are not supported".into())),
    }
}

/// Lexical form of a term: IRI text, blank node id, or literal value.
fn lexical(term: &Term) -> String {
    match term {
        Term::NamedNode(n) => n.as_str().to_string(),
        Term::BlankNode(b) => b.as_str().to_string(),
        Term::Literal(l) => l.value().to_string(),
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}

#[async_trait]
impl SparqlBackend for LocalGraph {
    async fn select(&self, query: &PreparedQuery) -> Result<Vec<SolutionRow>, StoreError> {
        match self.evaluate(query).await? {
            QueryOutcome::Solutions(rows) => Ok(rows),
            QueryOutcome::Graph(_) => Err(StoreError::Query {
                template: query.template.clone(),
                message: "expected a SELECT query".into(),
            }),
        }
    }

    async fn construct(&self, query: &PreparedQuery) -> Result<Graph, StoreError> {
        match self.evaluate(query).await? {
            QueryOutcome::Graph(graph) => Ok(graph),
            QueryOutcome::Solutions(_) => Err(StoreError::Query {
                template: query.template.clone(),
                message: "expected a CONSTRUCT query".into(),
            }),
        }
    }
}
