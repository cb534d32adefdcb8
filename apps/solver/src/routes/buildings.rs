use axum::{
    extract::{Path, State},
    Json,
};

use crate::errors::AppError;
use crate::solver::BuildingDef;
use crate::state::AppState;

/// GET /api/v1/buildings
pub async fn handle_list_buildings(State(state): State<AppState>) -> Json<Vec<BuildingDef>> {
    Json(state.catalog.all())
}

/// GET /api/v1/buildings/:kind
pub async fn handle_get_building(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<BuildingDef>, AppError> {
    state
        .catalog
        .get(&kind)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Building type '{kind}' not found")))
}
