use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::{
    db::{Catalog, OrderStore, SearchHistoryStore, UserDirectory},
    error::AppResult,
    models::{Book, BookId, Order, SearchHistoryEntry, UserId},
};

/// Initial contents of an [`InMemoryStore`], usually loaded from a JSON file
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<UserId>,
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub searches: Vec<SearchHistoryEntry>,
}

#[derive(Default)]
struct StoreData {
    users: BTreeSet<UserId>,
    books: BTreeMap<BookId, Book>,
    orders: Vec<Order>,
    /// Insertion order is meaningful: later entries win date ties
    searches: Vec<SearchHistoryEntry>,
}

/// Process-local backend implementing every collaborator trait
///
/// Used when no `DATABASE_URL` is configured and by the test suites.
#[derive(Default)]
pub struct InMemoryStore {
    data: RwLock<StoreData>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a seed. Sold quantities are taken as given.
    pub fn from_seed(seed: Seed) -> Self {
        let data = StoreData {
            users: seed.users.into_iter().collect(),
            books: seed
                .books
                .into_iter()
                .map(|book| (book.id.clone(), book))
                .collect(),
            orders: seed.orders,
            searches: seed.searches,
        };

        Self {
            data: RwLock::new(data),
        }
    }

    /// Loads a JSON seed file
    pub fn load_seed(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read seed {}: {}", path.display(), e))?;
        let seed: Seed = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Failed to parse seed {}: {}", path.display(), e))?;

        tracing::info!(
            path = %path.display(),
            users = seed.users.len(),
            books = seed.books.len(),
            orders = seed.orders.len(),
            searches = seed.searches.len(),
            "Loaded in-memory seed"
        );

        Ok(Self::from_seed(seed))
    }

    pub async fn add_user(&self, user_id: impl Into<UserId>) {
        self.data.write().await.users.insert(user_id.into());
    }

    pub async fn add_book(&self, book: Book) {
        self.data.write().await.books.insert(book.id.clone(), book);
    }

    /// Records an order and bumps the sold quantity of every live book in it
    pub async fn add_order(&self, order: Order) {
        let mut data = self.data.write().await;
        for item in &order.items {
            if let Some(book) = data.books.get_mut(&item.book_id) {
                book.sold_quantity += u64::from(item.quantity);
            }
        }
        data.orders.push(order);
    }
}

fn live_books<'a>(
    data: &'a StoreData,
    filter: impl Fn(&Book) -> bool + 'a,
) -> impl Iterator<Item = &'a Book> + 'a {
    data.books
        .values()
        .filter(move |book| !book.is_deleted && filter(book))
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryStore {
    async fn list_user_ids(&self) -> AppResult<Vec<UserId>> {
        Ok(self.data.read().await.users.iter().cloned().collect())
    }
}

#[async_trait::async_trait]
impl OrderStore for InMemoryStore {
    async fn orders_for_user(&self, user_id: &UserId) -> AppResult<Vec<Order>> {
        let data = self.data.read().await;
        let mut orders: Vec<Order> = data
            .orders
            .iter()
            .filter(|order| &order.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.order_date.cmp(&b.order_date).then_with(|| a.id.cmp(&b.id)));
        Ok(orders)
    }

    async fn recent_orders(&self, limit: usize) -> AppResult<Vec<Order>> {
        let data = self.data.read().await;
        let mut orders: Vec<Order> = data.orders.clone();
        orders.sort_by(|a, b| b.order_date.cmp(&a.order_date).then_with(|| a.id.cmp(&b.id)));
        orders.truncate(limit);
        Ok(orders)
    }
}

#[async_trait::async_trait]
impl SearchHistoryStore for InMemoryStore {
    async fn searches_for_user(&self, user_id: &UserId) -> AppResult<Vec<SearchHistoryEntry>> {
        let data = self.data.read().await;
        Ok(data
            .searches
            .iter()
            .filter(|entry| &entry.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn recent_searches(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> AppResult<Vec<SearchHistoryEntry>> {
        let data = self.data.read().await;
        let mut entries: Vec<SearchHistoryEntry> = data
            .searches
            .iter()
            .rev()
            .filter(|entry| &entry.user_id == user_id)
            .cloned()
            .collect();
        // Stable sort over reversed insertion order keeps the latest write first on ties
        entries.sort_by(|a, b| b.search_date.cmp(&a.search_date));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn upsert_search(
        &self,
        user_id: &UserId,
        query: &str,
    ) -> AppResult<SearchHistoryEntry> {
        let mut data = self.data.write().await;
        data.searches
            .retain(|entry| !(&entry.user_id == user_id && entry.search_query == query));

        let entry = SearchHistoryEntry {
            user_id: user_id.clone(),
            search_query: query.to_string(),
            search_date: Utc::now(),
        };
        data.searches.push(entry.clone());
        Ok(entry)
    }

    async fn delete_search(&self, user_id: &UserId, query: &str) -> AppResult<bool> {
        let mut data = self.data.write().await;
        let before = data.searches.len();
        data.searches
            .retain(|entry| !(&entry.user_id == user_id && entry.search_query == query));
        Ok(data.searches.len() != before)
    }
}

#[async_trait::async_trait]
impl Catalog for InMemoryStore {
    async fn find_book(&self, book_id: &BookId) -> AppResult<Option<Book>> {
        let data = self.data.read().await;
        Ok(data
            .books
            .get(book_id)
            .filter(|book| !book.is_deleted)
            .cloned())
    }

    async fn search_by_title(&self, query: &str) -> AppResult<Vec<Book>> {
        let data = self.data.read().await;
        Ok(live_books(&data, |book| book.title_matches(query))
            .cloned()
            .collect())
    }

    async fn best_sellers(&self, limit: usize) -> AppResult<Vec<Book>> {
        let data = self.data.read().await;
        let mut books: Vec<Book> = live_books(&data, |_| true).cloned().collect();
        books.sort_by(|a, b| {
            b.sold_quantity
                .cmp(&a.sold_quantity)
                .then_with(|| a.id.cmp(&b.id))
        });
        books.truncate(limit);
        Ok(books)
    }

    async fn books_in_category(&self, category: &str) -> AppResult<Vec<Book>> {
        let data = self.data.read().await;
        Ok(
            live_books(&data, |book| book.categories.iter().any(|c| c == category))
                .cloned()
                .collect(),
        )
    }

    async fn books_by_author(&self, author: &str) -> AppResult<Vec<Book>> {
        let data = self.data.read().await;
        Ok(live_books(&data, |book| book.authors.iter().any(|a| a == author))
            .cloned()
            .collect())
    }
}
