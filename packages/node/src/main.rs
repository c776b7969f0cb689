//! `oai-node`: OAI-PMH 2.0 endpoint over an RDF graph or SPARQL endpoint.
//!
//! # Quick start
//!
//! ```sh
//! # Built-in sample records on the default port:
//! oai-node
//!
//! # A local Turtle file queried with the bundled templates:
//! OAI_GRAPH_PATH=data/webarchive.ttl OAI_QUERY_PATH=queries oai-node
//!
//! # A remote SPARQL endpoint:
//! OAI_SPARQL_ENDPOINT=https://sparql.example.org/query OAI_QUERY_PATH=queries oai-node
//! ```
//!
//! # Environment variables
//!
//! See [`oaipmh_node::NodeConfig`] for the full list.

use std::process::ExitCode;

use oaipmh_node::{build_router, build_store, NodeConfig};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oaipmh_node=info,tower_http=debug".into()),
        )
        .init();

    let config = match NodeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let store = match build_store(&config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("failed to open store: {e}");
            return ExitCode::FAILURE;
        }
    };

    let app = build_router(store, config.clone());

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {}: {e}", config.bind_addr);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(base_url = %config.base_url, "listening on {}", config.bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {e}");
        return ExitCode::FAILURE;
    }
    tracing::info!("shut down");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
