use crate::{
    config::GatewayConfig,
    services::{
        backend::ResourceCreator, dispatcher::Dispatcher, sqlite_backend::SqliteBackend,
    },
};
use std::sync::Arc;

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub creator: Arc<dyn ResourceCreator>,
    /// Used by `/readyz`.
    pub backend: SqliteBackend,
}

impl AppState {
    /// Wire every collaborator to the same SQLite backend.
    pub fn new(backend: SqliteBackend, config: GatewayConfig) -> Self {
        let shared = Arc::new(backend.clone());
        Self {
            dispatcher: Dispatcher::new(shared.clone(), shared.clone(), config),
            creator: shared,
            backend,
        }
    }
}
