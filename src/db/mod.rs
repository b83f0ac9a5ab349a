//! Collaborator stores consumed by the recommendation engine.
//!
//! The engine only ever reads through these traits. Writes exist for the
//! search-history endpoints and for seeding the in-memory backend.
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{Book, BookId, Order, SearchHistoryEntry, UserId},
};

pub mod memory;
pub mod postgres;
pub mod cache;

pub use memory::{InMemoryStore, Seed};
pub use postgres::{create_pool, run_migrations, PgStore};
pub use cache::create_redis_client;
pub use cache::Cache;
pub use cache::CacheKey;

/// Source of the known customer accounts
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Every known user, in ascending id order
    async fn list_user_ids(&self) -> AppResult<Vec<UserId>>;
}

/// Order history
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait OrderStore: Send + Sync {
    /// All orders placed by one user, oldest first
    async fn orders_for_user(&self, user_id: &UserId) -> AppResult<Vec<Order>>;

    /// The `limit` most recent orders system-wide, newest first
    async fn recent_orders(&self, limit: usize) -> AppResult<Vec<Order>>;
}

/// Per-user catalog search history
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SearchHistoryStore: Send + Sync {
    /// Every recorded query of one user
    async fn searches_for_user(&self, user_id: &UserId) -> AppResult<Vec<SearchHistoryEntry>>;

    /// The `limit` most recent queries of one user, newest first
    async fn recent_searches(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> AppResult<Vec<SearchHistoryEntry>>;

    /// Records a query, refreshing its date if the user already searched for it
    async fn upsert_search(&self, user_id: &UserId, query: &str)
        -> AppResult<SearchHistoryEntry>;

    /// Removes a query; returns false when the user never searched for it
    async fn delete_search(&self, user_id: &UserId, query: &str) -> AppResult<bool>;
}

/// Book catalog. Soft-deleted books never resolve through any of these methods.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    async fn find_book(&self, book_id: &BookId) -> AppResult<Option<Book>>;

    /// Case-insensitive substring match on title, ascending id order
    async fn search_by_title(&self, query: &str) -> AppResult<Vec<Book>>;

    /// Books by sold quantity descending, ties by ascending id
    async fn best_sellers(&self, limit: usize) -> AppResult<Vec<Book>>;

    /// Books tagged with a category, ascending id order
    async fn books_in_category(&self, category: &str) -> AppResult<Vec<Book>>;

    /// Books written by an author, ascending id order
    async fn books_by_author(&self, author: &str) -> AppResult<Vec<Book>>;
}

/// Handles to every collaborator, cheap to clone into tasks
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserDirectory>,
    pub orders: Arc<dyn OrderStore>,
    pub searches: Arc<dyn SearchHistoryStore>,
    pub catalog: Arc<dyn Catalog>,
}

impl Stores {
    /// Uses one backend for every collaborator role
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: UserDirectory + OrderStore + SearchHistoryStore + Catalog + 'static,
    {
        Self {
            users: backend.clone(),
            orders: backend.clone(),
            searches: backend.clone(),
            catalog: backend,
        }
    }
}
