//! Container inventory endpoint

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::debug;

use crate::inventory::InventoryResult;
use crate::{ApiResult, AppState};

/// GET /containers/:container_id/inventory
///
/// Per-entity problems come back inside `report`; only a container with no
/// usable source at all is an error.
pub async fn get_inventory(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> ApiResult<Json<InventoryResult>> {
    debug!(container_id = %container_id, "Inventory requested");
    let result = state.materializer.get_inventory_rows(&container_id).await?;
    Ok(Json(result))
}

pub fn inventory_routes() -> Router<AppState> {
    Router::new().route("/containers/:container_id/inventory", get(get_inventory))
}
