//! Shared helpers for the OAI-PMH conformance test suite.
//!
//! Provides [`spawn_node`], which binds a `TcpListener` on an ephemeral
//! port, wires up an in-process node around the given store, and returns the
//! base URL harvesters should use. [`harvest`] fetches and parses one
//! response.

use std::path::PathBuf;
use std::sync::Arc;

use oaipmh::XmlElement;
use oaipmh_node::{build_router, build_store, MemoryStore, MetadataStore, NodeConfig};

/// Start an ephemeral in-process node serving `store` and return its base
/// URL, e.g. `http://127.0.0.1:51234/`.
///
/// # Panics
///
/// Panics if the TCP listener cannot be bound or the node fails to start.
pub async fn spawn_node(store: Arc<dyn MetadataStore>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("get local addr");
    let base_url = format!("http://{addr}/");

    let config = config_for(&base_url, &[]);
    let router = build_router(store, config);

    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("conformance node error");
    });

    base_url
}

/// A node over the built-in two-record sample.
pub async fn spawn_sample_node() -> String {
    spawn_node(Arc::new(MemoryStore::sample())).await
}

/// A node over the bundled web-archive graph, queried through the bundled
/// SPARQL templates.
pub async fn spawn_graph_node() -> String {
    let node_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../node");
    let graph = node_dir.join("data/webarchive.ttl").display().to_string();
    let queries = node_dir.join("queries").display().to_string();
    let config = config_for(
        "http://127.0.0.1/",
        &[("OAI_GRAPH_PATH", graph), ("OAI_QUERY_PATH", queries)],
    );
    let store = build_store(&config).expect("open bundled graph");
    spawn_node(store).await
}

fn config_for(base_url: &str, extra: &[(&str, String)]) -> NodeConfig {
    let mut vars = extra.to_vec();
    vars.push(("OAI_BASE_URL", base_url.to_string()));
    NodeConfig::from_lookup(move |key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
    })
    .expect("conformance node config")
}

/// A parsed response.
pub struct Harvest {
    pub status: reqwest::StatusCode,
    pub content_type: String,
    pub root: XmlElement,
}

impl Harvest {
    /// The `code` attribute of the `<error>` element, if any.
    pub fn error_code(&self) -> Option<&str> {
        self.root.child("error").and_then(|e| e.attribute("code"))
    }

    /// The `<request>` echo.
    pub fn request(&self) -> &XmlElement {
        self.root.child("request").expect("response has a <request> echo")
    }
}

/// `GET {base_url}?{query}` and parse the body.
pub async fn harvest(base_url: &str, query: &str) -> Harvest {
    let response = reqwest::get(format!("{base_url}?{query}"))
        .await
        .expect("request reaches the node");
    let status = response.status();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response.bytes().await.expect("read body");
    let root = XmlElement::parse(&body).expect("response is well-formed XML");
    Harvest {
        status,
        content_type,
        root,
    }
}
