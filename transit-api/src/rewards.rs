use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use transit_core::PointsEntry;

use crate::error::AppError;
use crate::extract::PathParams;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/users/{user_id}/points-history", get(points_history))
}

/// Newest entries first.
async fn points_history(
    State(state): State<AppState>,
    PathParams(user_id): PathParams<Uuid>,
) -> Result<Json<Vec<PointsEntry>>, AppError> {
    Ok(Json(state.rewards.history(user_id).await?))
}
