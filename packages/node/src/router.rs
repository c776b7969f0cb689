//! Assembles the Axum [`Router`].

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::{
    config::NodeConfig,
    handlers::{oai, AppState},
    storage::MetadataStore,
};

/// Build the complete application router with shared state.
pub fn build_router(store: Arc<dyn MetadataStore>, config: NodeConfig) -> Router {
    router_with_state(AppState::new(store, config))
}

/// Build the router around prepared state, e.g. with extra metadata formats.
pub fn router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/", get(oai::harvest).post(oai::harvest_form))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
