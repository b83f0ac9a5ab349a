use std::sync::Arc;

use crate::{
    db::{Catalog, Stores},
    services::{RecommendationService, SearchHistoryService},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn Catalog>,
    pub recommendations: RecommendationService,
    pub search_history: SearchHistoryService,
}

impl AppState {
    pub fn new(stores: Stores, recommendations: RecommendationService) -> Self {
        let search_history =
            SearchHistoryService::new(stores.searches.clone(), recommendations.clone());

        Self {
            catalog: stores.catalog,
            recommendations,
            search_history,
        }
    }
}
