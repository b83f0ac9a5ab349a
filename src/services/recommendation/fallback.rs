use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::{
    db::{Catalog, OrderStore, Stores},
    error::{AppResult, RecommendError},
    models::{Book, BookId, RecommendationSource, RecommendedBook, UserId},
};

/// What the fallback strategies know about the target user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProfile {
    pub user_id: UserId,
    /// Books the user interacted with and the accumulated weight of each
    pub touched: Vec<(BookId, f64)>,
}

impl UserProfile {
    /// A profile with no history
    pub fn anonymous(user_id: UserId) -> Self {
        Self {
            user_id,
            touched: Vec::new(),
        }
    }

    /// Builds a profile from the user's interaction row, if there is one
    pub fn from_row(user_id: UserId, row: Option<&BTreeMap<BookId, f64>>) -> Self {
        let touched = row
            .map(|row| {
                row.iter()
                    .map(|(book_id, weight)| (book_id.clone(), *weight))
                    .collect()
            })
            .unwrap_or_default();

        Self { user_id, touched }
    }

    pub fn has_history(&self) -> bool {
        !self.touched.is_empty()
    }
}

/// One stage of the fallback cascade
///
/// Implementations return at most `remaining` live books, none of them in
/// `exclude`, best first.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FallbackStrategy: Send + Sync {
    fn source(&self) -> RecommendationSource;

    async fn supply(
        &self,
        profile: &UserProfile,
        remaining: usize,
        exclude: &HashSet<BookId>,
    ) -> AppResult<Vec<Book>>;
}

fn skip_unresolved(book_id: &BookId) {
    let reason = RecommendError::CatalogLookup(book_id.clone());
    tracing::debug!(book_id = %book_id, reason = %reason, "Skipping unresolvable book");
}

/// Resolves ids through the catalog in the given order.
///
/// Ids that no longer resolve, excluded ids and repeats are skipped. Stops
/// once `limit` books are collected.
pub(crate) async fn resolve_in_order<I>(
    catalog: &dyn Catalog,
    ids: I,
    limit: usize,
    exclude: &HashSet<BookId>,
) -> AppResult<Vec<Book>>
where
    I: IntoIterator<Item = BookId>,
{
    let mut seen: HashSet<BookId> = HashSet::new();
    let mut books = Vec::new();

    for book_id in ids {
        if books.len() >= limit {
            break;
        }
        if exclude.contains(&book_id) || seen.contains(&book_id) {
            continue;
        }

        match catalog.find_book(&book_id).await? {
            Some(book) => {
                seen.insert(book_id);
                books.push(book);
            }
            None => skip_unresolved(&book_id),
        }
    }

    Ok(books)
}

/// Keeps the first `limit` books not in `exclude`, dropping repeats
fn take_fresh(books: Vec<Book>, limit: usize, exclude: &HashSet<BookId>) -> Vec<Book> {
    let mut seen: HashSet<BookId> = HashSet::new();
    books
        .into_iter()
        .filter(|book| !exclude.contains(&book.id) && seen.insert(book.id.clone()))
        .take(limit)
        .collect()
}

/// Books from the most recent orders system-wide, newest order first
pub struct RecentlyOrdered {
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn Catalog>,
    window: usize,
}

impl RecentlyOrdered {
    pub fn new(orders: Arc<dyn OrderStore>, catalog: Arc<dyn Catalog>, window: usize) -> Self {
        Self {
            orders,
            catalog,
            window,
        }
    }
}

#[async_trait::async_trait]
impl FallbackStrategy for RecentlyOrdered {
    fn source(&self) -> RecommendationSource {
        RecommendationSource::Recent
    }

    async fn supply(
        &self,
        _profile: &UserProfile,
        remaining: usize,
        exclude: &HashSet<BookId>,
    ) -> AppResult<Vec<Book>> {
        let orders = self.orders.recent_orders(self.window).await?;
        let ids: Vec<BookId> = orders.iter().flat_map(|order| order.book_ids()).collect();
        resolve_in_order(self.catalog.as_ref(), ids, remaining, exclude).await
    }
}

/// Books by cumulative sold quantity
pub struct BestSelling {
    catalog: Arc<dyn Catalog>,
}

impl BestSelling {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait::async_trait]
impl FallbackStrategy for BestSelling {
    fn source(&self) -> RecommendationSource {
        RecommendationSource::BestSelling
    }

    async fn supply(
        &self,
        _profile: &UserProfile,
        remaining: usize,
        exclude: &HashSet<BookId>,
    ) -> AppResult<Vec<Book>> {
        // Over-fetch so excluded books cannot starve the page
        let books = self
            .catalog
            .best_sellers(remaining.saturating_add(exclude.len()))
            .await?;
        Ok(take_fresh(books, remaining, exclude))
    }
}

/// Book attribute a user can have a favorite value of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Category,
    Author,
}

impl Affinity {
    pub(crate) fn keys_of(self, book: &Book) -> &[String] {
        match self {
            Affinity::Category => &book.categories,
            Affinity::Author => &book.authors,
        }
    }

    pub(crate) async fn books_with(
        self,
        catalog: &dyn Catalog,
        key: &str,
    ) -> AppResult<Vec<Book>> {
        match self {
            Affinity::Category => catalog.books_in_category(key).await,
            Affinity::Author => catalog.books_by_author(key).await,
        }
    }
}

/// Books sharing a category or author with what the user already touched
pub struct FavoriteAffinity {
    catalog: Arc<dyn Catalog>,
    affinity: Affinity,
}

impl FavoriteAffinity {
    pub fn categories(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            affinity: Affinity::Category,
        }
    }

    pub fn authors(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            affinity: Affinity::Author,
        }
    }

    /// Attribute values of the user's books, heaviest first, ties by ascending value
    async fn favorites(&self, profile: &UserProfile) -> AppResult<Vec<String>> {
        let mut tally: HashMap<String, f64> = HashMap::new();

        for (book_id, weight) in &profile.touched {
            match self.catalog.find_book(book_id).await? {
                Some(book) => {
                    for key in self.affinity.keys_of(&book) {
                        *tally.entry(key.clone()).or_insert(0.0) += weight;
                    }
                }
                None => skip_unresolved(book_id),
            }
        }

        let mut favorites: Vec<(String, f64)> = tally.into_iter().collect();
        favorites.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(favorites.into_iter().map(|(key, _)| key).collect())
    }
}

#[async_trait::async_trait]
impl FallbackStrategy for FavoriteAffinity {
    fn source(&self) -> RecommendationSource {
        match self.affinity {
            Affinity::Category => RecommendationSource::FavoriteCategory,
            Affinity::Author => RecommendationSource::FavoriteAuthor,
        }
    }

    async fn supply(
        &self,
        profile: &UserProfile,
        remaining: usize,
        exclude: &HashSet<BookId>,
    ) -> AppResult<Vec<Book>> {
        if !profile.has_history() {
            return Ok(Vec::new());
        }

        let mut taken: HashSet<BookId> = exclude.clone();
        let mut books = Vec::new();

        for key in self.favorites(profile).await? {
            if books.len() >= remaining {
                break;
            }
            let matches = self.affinity.books_with(self.catalog.as_ref(), &key).await?;
            for book in take_fresh(matches, remaining - books.len(), &taken) {
                taken.insert(book.id.clone());
                books.push(book);
            }
        }

        Ok(books)
    }
}

/// Pads a short recommendation list through an ordered strategy cascade
pub struct FallbackSupplier {
    strategies: Vec<Box<dyn FallbackStrategy>>,
}

impl FallbackSupplier {
    pub fn new(strategies: Vec<Box<dyn FallbackStrategy>>) -> Self {
        Self { strategies }
    }

    /// Recent orders, then best sellers, then favorite categories, then favorite authors
    pub fn standard(stores: &Stores, recent_window: usize) -> Self {
        Self::new(vec![
            Box::new(RecentlyOrdered::new(
                stores.orders.clone(),
                stores.catalog.clone(),
                recent_window,
            )),
            Box::new(BestSelling::new(stores.catalog.clone())),
            Box::new(FavoriteAffinity::categories(stores.catalog.clone())),
            Box::new(FavoriteAffinity::authors(stores.catalog.clone())),
        ])
    }

    /// Fills up to `remaining` slots with books not in `chosen`.
    ///
    /// Each strategy is asked only for the slots still open and sees every id
    /// accepted so far. Its output is deduplicated again on append.
    pub async fn top_up(
        &self,
        profile: &UserProfile,
        remaining: usize,
        chosen: &[BookId],
    ) -> AppResult<Vec<RecommendedBook>> {
        let mut exclude: HashSet<BookId> = chosen.iter().cloned().collect();
        let mut acquired: Vec<RecommendedBook> = Vec::with_capacity(remaining);

        for strategy in &self.strategies {
            let open = remaining.saturating_sub(acquired.len());
            if open == 0 {
                break;
            }

            let source = strategy.source();
            let books = strategy.supply(profile, open, &exclude).await?;
            let before = acquired.len();

            for book in books {
                if acquired.len() >= remaining {
                    break;
                }
                if exclude.insert(book.id.clone()) {
                    acquired.push(RecommendedBook::from_book(&book, source));
                }
            }

            tracing::debug!(
                user_id = %profile.user_id,
                source = %source,
                requested = open,
                contributed = acquired.len() - before,
                "Fallback strategy applied"
            );
        }

        Ok(acquired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryStore, Seed};
    use crate::models::Order;
    use chrono::{Duration, TimeZone, Utc};

    fn day(n: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + Duration::days(n)
    }

    fn ids(items: &[RecommendedBook]) -> Vec<&str> {
        items.iter().map(|item| item.book_id.as_str()).collect()
    }

    fn stores(seed: Seed) -> Stores {
        Stores::from_backend(Arc::new(InMemoryStore::from_seed(seed)))
    }

    fn library() -> Seed {
        Seed {
            users: vec!["reader".into(), "other".into()],
            books: vec![
                Book::new("b1", "Dune")
                    .with_categories(["scifi"])
                    .with_authors(["herbert"])
                    .with_sold_quantity(3),
                Book::new("b2", "Emma")
                    .with_categories(["classic"])
                    .with_authors(["austen"])
                    .with_sold_quantity(8),
                Book::new("b3", "Hyperion")
                    .with_categories(["scifi"])
                    .with_sold_quantity(1),
                Book::new("b4", "Persuasion")
                    .with_categories(["classic"])
                    .with_authors(["austen"]),
                Book::new("b5", "Solaris").with_categories(["scifi"]),
                Book::new("b6", "Gone").deleted().with_sold_quantity(50),
            ],
            orders: vec![
                Order::new("o1", "other", day(1), ["b6", "b1"]),
                Order::new("o2", "other", day(2), ["b2"]),
            ],
            searches: vec![],
        }
    }

    #[tokio::test]
    async fn test_cascade_runs_in_priority_order() {
        let stores = stores(library());
        let supplier = FallbackSupplier::standard(&stores, 10);
        let profile = UserProfile::anonymous("reader".into());

        let items = supplier.top_up(&profile, 4, &[]).await.unwrap();

        // recent: o2 (b2) then o1 (b6 is deleted, b1); best sellers fill the rest
        assert_eq!(ids(&items), vec!["b2", "b1", "b3", "b4"]);
        assert_eq!(items[0].source, RecommendationSource::Recent);
        assert_eq!(items[1].source, RecommendationSource::Recent);
        assert_eq!(items[2].source, RecommendationSource::BestSelling);
    }

    #[tokio::test]
    async fn test_chosen_books_are_never_repeated() {
        let stores = stores(library());
        let supplier = FallbackSupplier::standard(&stores, 10);
        let profile = UserProfile::anonymous("reader".into());
        let chosen = vec![BookId::from("b2"), BookId::from("b3")];

        let items = supplier.top_up(&profile, 10, &chosen).await.unwrap();
        let got = ids(&items);

        assert!(!got.contains(&"b2"));
        assert!(!got.contains(&"b3"));
        assert!(!got.contains(&"b6"));
        let unique: HashSet<&&str> = got.iter().collect();
        assert_eq!(unique.len(), got.len());
        // the live catalog holds five books, two of them already chosen
        assert_eq!(got.len(), 3);
    }

    #[tokio::test]
    async fn test_favorite_categories_follow_heaviest_interest() {
        let mut seed = library();
        seed.orders.clear();
        let stores = stores(seed);
        let strategy = FavoriteAffinity::categories(stores.catalog.clone());
        let profile = UserProfile {
            user_id: "reader".into(),
            touched: vec![("b1".into(), 3.0), ("b2".into(), 1.0)],
        };

        let books = strategy.supply(&profile, 10, &HashSet::new()).await.unwrap();
        let got: Vec<&str> = books.iter().map(|b| b.id.as_str()).collect();

        assert_eq!(got, vec!["b1", "b3", "b5", "b2", "b4"]);
        assert_eq!(strategy.source(), RecommendationSource::FavoriteCategory);
    }

    #[tokio::test]
    async fn test_favorite_authors_skip_excluded() {
        let stores = stores(library());
        let strategy = FavoriteAffinity::authors(stores.catalog.clone());
        let profile = UserProfile {
            user_id: "reader".into(),
            touched: vec![("b2".into(), 1.0)],
        };
        let exclude: HashSet<BookId> = [BookId::from("b2")].into_iter().collect();

        let books = strategy.supply(&profile, 10, &exclude).await.unwrap();
        let got: Vec<&str> = books.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(got, vec!["b4"]);
    }

    #[tokio::test]
    async fn test_no_history_means_no_affinity() {
        let stores = stores(library());
        let profile = UserProfile::anonymous("reader".into());

        let by_category = FavoriteAffinity::categories(stores.catalog.clone());
        let by_author = FavoriteAffinity::authors(stores.catalog.clone());

        assert!(by_category.supply(&profile, 5, &HashSet::new()).await.unwrap().is_empty());
        assert!(by_author.supply(&profile, 5, &HashSet::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_window_limits_orders_considered() {
        let stores = stores(library());
        let strategy = RecentlyOrdered::new(stores.orders.clone(), stores.catalog.clone(), 1);
        let profile = UserProfile::anonymous("reader".into());

        let books = strategy.supply(&profile, 10, &HashSet::new()).await.unwrap();
        let got: Vec<&str> = books.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(got, vec!["b2"]);
    }

    #[tokio::test]
    async fn test_strategies_are_asked_only_for_open_slots() {
        let mut first = MockFallbackStrategy::new();
        first.expect_source().return_const(RecommendationSource::Recent);
        first
            .expect_supply()
            .withf(|_, remaining, exclude| *remaining == 3 && exclude.len() == 7)
            .times(1)
            .returning(|_, _, _| {
                // a misbehaving strategy repeating a chosen id
                Ok(vec![Book::new("c1", "Chosen"), Book::new("n1", "New")])
            });

        let mut second = MockFallbackStrategy::new();
        second.expect_source().return_const(RecommendationSource::BestSelling);
        second
            .expect_supply()
            .withf(|_, remaining, exclude| {
                *remaining == 2 && exclude.contains(&BookId::from("n1"))
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(vec![
                    Book::new("n2", "Two"),
                    Book::new("n3", "Three"),
                    Book::new("n4", "Four"),
                ])
            });

        let mut third = MockFallbackStrategy::new();
        third.expect_source().return_const(RecommendationSource::FavoriteAuthor);
        third.expect_supply().never();

        let supplier =
            FallbackSupplier::new(vec![Box::new(first), Box::new(second), Box::new(third)]);
        let chosen: Vec<BookId> = (1..=7).map(|i| BookId::from(format!("c{}", i))).collect();
        let profile = UserProfile::anonymous("reader".into());

        let items = supplier.top_up(&profile, 3, &chosen).await.unwrap();
        assert_eq!(ids(&items), vec!["n1", "n2", "n3"]);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut strategy = MockFallbackStrategy::new();
        strategy.expect_source().return_const(RecommendationSource::Recent);
        strategy
            .expect_supply()
            .returning(|_, _, _| Err(crate::error::AppError::Internal("boom".to_string())));

        let supplier = FallbackSupplier::new(vec![Box::new(strategy)]);
        let profile = UserProfile::anonymous("reader".into());

        assert!(supplier.top_up(&profile, 5, &[]).await.is_err());
    }

    #[test]
    fn test_profile_from_missing_row_is_empty() {
        let profile = UserProfile::from_row("ghost".into(), None);
        assert!(!profile.has_history());
    }

    #[test]
    fn test_default_profile_is_anonymous() {
        let profile = UserProfile::default();
        assert_eq!(profile, UserProfile::anonymous(UserId::default()));
        assert_eq!(profile.user_id.as_str(), "");
    }

    #[tokio::test]
    async fn test_recent_orders_walk_newest_first_skipping_deleted() {
        let stores = stores(library());
        let strategy = RecentlyOrdered::new(stores.orders.clone(), stores.catalog.clone(), 2);
        let profile = UserProfile::anonymous("reader".into());

        let books = strategy.supply(&profile, 10, &HashSet::new()).await.unwrap();
        let got: Vec<&str> = books.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(got, vec!["b2", "b1"]);
    }
}
