use std::sync::Arc;

use crate::hub::Hub;
use crate::solver::{handlers, BacktrackingOracle, BuildingCatalog, SearchEngine, SolveLimits};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Method registry and connection counter. One per process.
    pub hub: Arc<Hub>,
    pub catalog: Arc<BuildingCatalog>,
}

impl AppState {
    /// Wires the search engine into a fresh hub. Call once at startup.
    pub fn new(catalog: BuildingCatalog, limits: SolveLimits) -> Self {
        let catalog = Arc::new(catalog);
        let engine = SearchEngine::new(Arc::clone(&catalog), Arc::new(BacktrackingOracle));

        let mut hub = Hub::new();
        handlers::register(&mut hub, engine, limits);

        Self {
            hub: Arc::new(hub),
            catalog,
        }
    }
}
