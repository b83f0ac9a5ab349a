use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{error::AppResult, models::SearchHistoryEntry, state::AppState};

#[derive(Debug, Deserialize)]
pub struct RecordSearchRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteSearchParams {
    q: String,
}

/// The user's ten most recent searches, newest first
pub async fn list(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<SearchHistoryEntry>>> {
    let entries = state.search_history.recent(&user_id.into()).await?;
    Ok(Json(entries))
}

pub async fn record(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<RecordSearchRequest>,
) -> AppResult<(StatusCode, Json<SearchHistoryEntry>)> {
    let entry = state
        .search_history
        .record(&user_id.into(), &request.query)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<DeleteSearchParams>,
) -> AppResult<StatusCode> {
    state
        .search_history
        .delete(&user_id.into(), &params.q)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
