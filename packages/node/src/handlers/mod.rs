//! HTTP request handlers.
//!
//! OAI-PMH has a single endpoint; everything about the request lives in its
//! arguments, sent as a query string ([`oai::harvest`]) or a form body
//! ([`oai::harvest_form`]).

pub mod oai;

use std::sync::Arc;

use crate::adapter::FormatRegistry;
use crate::config::NodeConfig;
use crate::storage::MetadataStore;

/// Shared application state threaded through all Axum handlers via [`axum::extract::State`].
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    /// Metadata formats offered by `ListMetadataFormats` and accepted as
    /// `metadataPrefix`.
    pub formats: Arc<FormatRegistry>,
    pub config: NodeConfig,
}

impl AppState {
    /// State with the standard `oai_dc` and `rdf` formats.
    pub fn new(store: Arc<dyn MetadataStore>, config: NodeConfig) -> Self {
        Self::with_formats(store, FormatRegistry::standard(), config)
    }

    pub fn with_formats(
        store: Arc<dyn MetadataStore>,
        formats: FormatRegistry,
        config: NodeConfig,
    ) -> Self {
        Self {
            store,
            formats: Arc::new(formats),
            config,
        }
    }
}
