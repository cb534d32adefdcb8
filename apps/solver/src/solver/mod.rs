// Placement Search Engine.
// Formulates each attempt as a constraint model and drives bounds expansion.
// Oracle calls are CPU-bound and run inside tokio::task::spawn_blocking.

pub mod catalog;
pub mod constraints;
pub mod engine;
pub mod handlers;
pub mod models;
pub mod oracle;

// Re-export the public API consumed by the hub wiring and routes.
pub use catalog::{BuildingCatalog, BuildingDef};
pub use engine::SearchEngine;
pub use handlers::SolveLimits;
pub use oracle::BacktrackingOracle;
