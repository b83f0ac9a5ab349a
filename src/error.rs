use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::{BookId, UserId};

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Conditions raised inside the recommendation engine.
///
/// None of these are ever returned to a caller of `recommend`: each one is
/// recovered locally by degrading to fallback output.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RecommendError {
    /// Fewer than two users have any interaction, so correlation is meaningless.
    #[error("insufficient interaction data: {active_users} active user(s)")]
    InsufficientData { active_users: usize },

    #[error("unknown user: {0}")]
    UnknownUser(UserId),

    /// An item id that no longer resolves in the catalog.
    #[error("catalog lookup failed for book {0}")]
    CatalogLookup(BookId),
}
