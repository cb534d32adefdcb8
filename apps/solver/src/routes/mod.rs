pub mod buildings;
pub mod health;
pub mod ws;

use axum::{routing::get, Router};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Catalog
        .route("/api/v1/buildings", get(buildings::handle_list_buildings))
        .route(
            "/api/v1/buildings/:kind",
            get(buildings::handle_get_building),
        )
        // Hub endpoint
        .route("/solver", get(ws::handle_solver_socket))
        .with_state(state)
}
