//! Matching pass trigger
//!
//! One pass at a time; a second request while a pass holds the lock gets 409.

use axum::{extract::State, routing::post, Json, Router};
use tracing::{info, warn};

use crate::matching::MatchReport;
use crate::{ApiError, ApiResult, AppState};

/// POST /matching/run
pub async fn run_matching(State(state): State<AppState>) -> ApiResult<Json<MatchReport>> {
    let Ok(_guard) = state.matching_lock.try_lock() else {
        warn!("Matching pass requested while one is running");
        return Err(ApiError::Conflict("matching pass already running".to_string()));
    };

    info!("Matching pass triggered over HTTP");
    let report = state.matching.run_matching_pass().await?;
    Ok(Json(report))
}

pub fn matching_routes() -> Router<AppState> {
    Router::new().route("/matching/run", post(run_matching))
}
