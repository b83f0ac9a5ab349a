use std::sync::Arc;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::AppResult,
    models::{RecommendationResult, UserId},
    services::recommendation::RecommendationOrchestrator,
};

/// Serves recommendations, optionally through the Redis result cache
#[derive(Clone)]
pub struct RecommendationService {
    orchestrator: Arc<RecommendationOrchestrator>,
    cache: Option<Cache>,
    cache_ttl: u64,
}

impl RecommendationService {
    pub fn new(orchestrator: Arc<RecommendationOrchestrator>) -> Self {
        Self {
            orchestrator,
            cache: None,
            cache_ttl: 0,
        }
    }

    /// Caches final results for `ttl` seconds
    pub fn with_cache(mut self, cache: Cache, ttl: u64) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    pub async fn recommend(&self, user_id: &UserId) -> AppResult<RecommendationResult> {
        let Some(cache) = &self.cache else {
            return self.orchestrator.recommend(user_id).await;
        };

        let key = CacheKey::Recommendations(user_id.clone());
        cached!(cache, key, self.cache_ttl, self.orchestrator.recommend(user_id))
    }

    /// Drops a user's cached result after their behavior changed.
    ///
    /// A failed eviction is logged rather than failing the write that caused
    /// it; the entry still expires with its TTL.
    pub async fn invalidate(&self, user_id: &UserId) {
        let Some(cache) = &self.cache else {
            return;
        };

        let key = CacheKey::Recommendations(user_id.clone());
        match cache.invalidate(&key).await {
            Ok(()) => tracing::debug!(user_id = %user_id, "Cached recommendations evicted"),
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "Failed to evict cached recommendations")
            }
        }
    }
}
