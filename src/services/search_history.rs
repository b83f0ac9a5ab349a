use std::sync::Arc;

use crate::{
    db::SearchHistoryStore,
    error::{AppError, AppResult},
    models::{SearchHistoryEntry, UserId},
};

use super::recommendations::RecommendationService;

/// Number of queries returned by [`SearchHistoryService::recent`]
pub const RECENT_SEARCH_LIMIT: usize = 10;

/// Search-history bookkeeping. Every change evicts the user's cached recommendations.
#[derive(Clone)]
pub struct SearchHistoryService {
    store: Arc<dyn SearchHistoryStore>,
    recommendations: RecommendationService,
}

fn validated(query: &str) -> AppResult<&str> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::InvalidInput(
            "Search query must not be blank".to_string(),
        ));
    }
    Ok(query)
}

impl SearchHistoryService {
    pub fn new(store: Arc<dyn SearchHistoryStore>, recommendations: RecommendationService) -> Self {
        Self {
            store,
            recommendations,
        }
    }

    /// Stores a query, or refreshes its date if the user already ran it
    pub async fn record(&self, user_id: &UserId, query: &str) -> AppResult<SearchHistoryEntry> {
        let query = validated(query)?;
        let entry = self.store.upsert_search(user_id, query).await?;
        self.recommendations.invalidate(user_id).await;

        tracing::debug!(user_id = %user_id, query = %entry.search_query, "Search recorded");
        Ok(entry)
    }

    /// The user's most recent queries, newest first
    pub async fn recent(&self, user_id: &UserId) -> AppResult<Vec<SearchHistoryEntry>> {
        self.store.recent_searches(user_id, RECENT_SEARCH_LIMIT).await
    }

    pub async fn delete(&self, user_id: &UserId, query: &str) -> AppResult<()> {
        let query = validated(query)?;
        if !self.store.delete_search(user_id, query).await? {
            return Err(AppError::NotFound(format!(
                "No search history entry for query: {}",
                query
            )));
        }
        self.recommendations.invalidate(user_id).await;

        tracing::debug!(user_id = %user_id, query = %query, "Search deleted");
        Ok(())
    }
}
