//! Public surface for the `oaipmh-node` crate.
//!
//! Exposes the router builder, config and store types so that external
//! crates (e.g. the conformance test suite) can spin up an in-process node
//! without spawning a subprocess.

pub mod adapter;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod graph;
pub mod handlers;
pub mod query;
pub mod router;
pub mod storage;

use std::sync::Arc;

pub use adapter::{FormatRegistry, MetadataAdapter, MetadataFormatter, RdfXmlFormatter};
pub use config::{NodeConfig, StoreSource};
pub use handlers::AppState;
pub use router::{build_router, router_with_state};
pub use storage::{memory::MemoryStore, MetadataStore, RecordFilter, StoreError};

use graph::Namespaces;
use query::QueryTemplates;
use storage::{
    deadline::DeadlineStore, local::LocalGraph, remote::RemoteEndpoint, sparql::SparqlStore,
};

/// Open the store described by `config`, wrapped in the per-call deadline.
///
/// Namespace bindings from the configuration take precedence over the
/// standard `rdf`/`dc` bindings, which take precedence over prefixes
/// declared by a loaded graph file.
pub fn build_store(config: &NodeConfig) -> Result<Arc<dyn MetadataStore>, StoreError> {
    let mut namespaces: Namespaces = config.namespaces.iter().cloned().collect();
    namespaces.extend(&Namespaces::standard());

    let store: Arc<dyn MetadataStore> = match &config.source {
        config::StoreSource::Sample => {
            tracing::info!("store: built-in sample records");
            Arc::new(DeadlineStore::new(MemoryStore::sample(), config.backend_timeout))
        }
        config::StoreSource::GraphFile { graph, queries } => {
            let local = LocalGraph::load(graph)?;
            namespaces.extend(local.namespaces());
            let namespaces = Arc::new(namespaces);
            let templates = QueryTemplates::load_dir(queries, Arc::clone(&namespaces))?;
            tracing::info!(
                graph = %graph.display(),
                templates = templates.len(),
                "store: local graph"
            );
            let store = SparqlStore::new(local, templates, namespaces)?;
            Arc::new(DeadlineStore::new(store, config.backend_timeout))
        }
        config::StoreSource::SparqlEndpoint { endpoint, queries } => {
            let remote =
                RemoteEndpoint::new(endpoint, config.backend_timeout, config.backend_retries)?;
            let namespaces = Arc::new(namespaces);
            let templates = QueryTemplates::load_dir(queries, Arc::clone(&namespaces))?;
            tracing::info!(
                endpoint = %endpoint,
                templates = templates.len(),
                "store: SPARQL endpoint"
            );
            let store = SparqlStore::new(remote, templates, namespaces)?;
            Arc::new(DeadlineStore::new(store, config.backend_timeout))
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::storage::RecordFilter;

    fn config(vars: &[(&str, String)]) -> NodeConfig {
        let vars = vars.to_vec();
        NodeConfig::from_lookup(move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    fn bundled(path: &str) -> String {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join(path)
            .display()
            .to_string()
    }

    #[tokio::test]
    async fn sample_store_by_default() {
        let store = build_store(&config(&[])).unwrap();
        let rows = store.list_identifiers(&RecordFilter::all()).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn graph_file_store_uses_bundled_queries() {
        let store = build_store(&config(&[
            ("OAI_GRAPH_PATH", bundled("data/webarchive.ttl")),
            ("OAI_QUERY_PATH", bundled("queries")),
        ]))
        .unwrap();
        let rows = store.list_identifiers(&RecordFilter::all()).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, ["(DE-101)1334427879", "(DE-101)1352272679"]);
    }

    #[test]
    fn missing_template_directory_fails() {
        let result = build_store(&config(&[
            ("OAI_GRAPH_PATH", bundled("data/webarchive.ttl")),
            ("OAI_QUERY_PATH", bundled("no-such-dir")),
        ]));
        assert!(result.is_err());
    }
}
