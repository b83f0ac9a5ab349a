use axum::{
    extract::{Path, State},
    Json,
};

use crate::{error::AppResult, models::RecommendedBook, state::AppState};

/// Handler for the per-user recommendations endpoint
pub async fn recommend(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<RecommendedBook>>> {
    let result = state.recommendations.recommend(&user_id.into()).await?;
    Ok(Json(result.items))
}
