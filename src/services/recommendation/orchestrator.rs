use std::collections::HashSet;

use tokio::task::JoinSet;
use tracing::instrument;

use crate::{
    db::Stores,
    error::{AppError, AppResult, RecommendError},
    models::{RecommendationResult, RecommendationSource, RecommendedBook, UserId},
};

use super::fallback::{resolve_in_order, FallbackSupplier, UserProfile};
use super::matrix::{
    normalize_query, InteractionMatrix, InteractionMatrixBuilder, QueryMatches, UserActivity,
};
use super::ranker::{CandidateRanker, CandidateScore};
use super::similarity::SimilarityEngine;

/// Tunables of one recommendation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendationSettings {
    /// Maximum number of books returned (K)
    pub result_size: usize,
    /// Neighbors consulted per target user (N)
    pub neighbor_count: usize,
    /// Most recent orders scanned by the recency fallback
    pub recent_order_window: usize,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            result_size: 10,
            neighbor_count: 10,
            recent_order_window: 10,
        }
    }
}

/// Correlates users and ranks the target's candidates.
///
/// Pure and synchronous; runs on the blocking pool.
pub fn score_candidates(
    matrix: &InteractionMatrix,
    target: &UserId,
    ranker: CandidateRanker,
) -> Result<Vec<CandidateScore>, RecommendError> {
    matrix.ensure_sufficient()?;

    let users = matrix.user_index();
    let books = matrix.book_index();
    let similarity = SimilarityEngine::compute(matrix, &users, &books);

    Ok(ranker.rank(users.position(target), &similarity, matrix, &users))
}

/// Single entry point of the recommendation engine
pub struct RecommendationOrchestrator {
    stores: Stores,
    fallback: FallbackSupplier,
    settings: RecommendationSettings,
}

impl RecommendationOrchestrator {
    /// Uses the standard fallback cascade over the same stores
    pub fn new(stores: Stores, settings: RecommendationSettings) -> Self {
        let fallback = FallbackSupplier::standard(&stores, settings.recent_order_window);
        Self::with_fallback(stores, fallback, settings)
    }

    pub fn with_fallback(
        stores: Stores,
        fallback: FallbackSupplier,
        settings: RecommendationSettings,
    ) -> Self {
        Self {
            stores,
            fallback,
            settings,
        }
    }

    /// Up to `result_size` distinct books for `user_id`, best first.
    ///
    /// Sparse data and unknown users degrade to fallback-only output. Only
    /// collaborator store failures are returned as errors.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn recommend(&self, user_id: &UserId) -> AppResult<RecommendationResult> {
        let users = self.stores.users.list_user_ids().await?;

        if !users.contains(user_id) {
            let reason = RecommendError::UnknownUser(user_id.clone());
            tracing::warn!(reason = %reason, "No personalization possible, serving fallback only");
            return self
                .complete(UserProfile::anonymous(user_id.clone()), Vec::new())
                .await;
        }

        let activities = self.load_activity(&users).await?;
        let matches = self.resolve_queries(&activities).await?;
        let matrix = InteractionMatrixBuilder::from_activity(&activities, &matches);
        let profile = UserProfile::from_row(user_id.clone(), matrix.row(user_id));

        let ranker = CandidateRanker::new(self.settings.neighbor_count, self.settings.result_size);
        let target = user_id.clone();
        let scored = tokio::task::spawn_blocking(move || score_candidates(&matrix, &target, ranker))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Scoring task failed");
                AppError::Internal(e.to_string())
            })?;

        let candidates = match scored {
            Ok(candidates) => candidates,
            Err(reason) => {
                tracing::info!(reason = %reason, "Collaborative filtering skipped");
                Vec::new()
            }
        };

        let ranked: Vec<_> = candidates.into_iter().map(|candidate| candidate.book_id).collect();
        let books = resolve_in_order(
            self.stores.catalog.as_ref(),
            ranked,
            self.settings.result_size,
            &HashSet::new(),
        )
        .await?;

        let items = books
            .iter()
            .map(|book| RecommendedBook::from_book(book, RecommendationSource::Collaborative))
            .collect();

        self.complete(profile, items).await
    }

    /// Pads `items` through the fallback cascade and caps the list
    async fn complete(
        &self,
        profile: UserProfile,
        mut items: Vec<RecommendedBook>,
    ) -> AppResult<RecommendationResult> {
        let size = self.settings.result_size;
        let collaborative = items.len();

        if items.len() < size {
            let chosen: Vec<_> = items.iter().map(|item| item.book_id.clone()).collect();
            let padding = self
                .fallback
                .top_up(&profile, size - items.len(), &chosen)
                .await?;
            items.extend(padding);
        }
        items.truncate(size);

        tracing::info!(
            collaborative,
            total = items.len(),
            "Recommendations computed"
        );

        Ok(RecommendationResult {
            user_id: profile.user_id,
            items,
        })
    }

    /// Loads every user's orders and searches, one task per user.
    ///
    /// The first failure aborts the tasks still running.
    async fn load_activity(&self, users: &[UserId]) -> AppResult<Vec<UserActivity>> {
        let mut tasks = JoinSet::new();

        for user_id in users {
            let orders = self.stores.orders.clone();
            let searches = self.stores.searches.clone();
            let user_id = user_id.clone();

            tasks.spawn(async move {
                let (orders, searches) = tokio::try_join!(
                    orders.orders_for_user(&user_id),
                    searches.searches_for_user(&user_id)
                )?;
                Ok::<_, AppError>(UserActivity {
                    user_id,
                    orders,
                    searches,
                })
            });
        }

        let mut activities = Vec::with_capacity(users.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(activity) => activities.push(activity?),
                Err(e) => {
                    tracing::error!(error = %e, "Task join error");
                    return Err(AppError::Internal(e.to_string()));
                }
            }
        }
        activities.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        Ok(activities)
    }

    /// Looks up each distinct query once against the catalog
    async fn resolve_queries(&self, activities: &[UserActivity]) -> AppResult<QueryMatches> {
        let queries: HashSet<String> = activities
            .iter()
            .flat_map(|activity| &activity.searches)
            .map(|entry| normalize_query(&entry.search_query))
            .filter(|query| !query.trim().is_empty())
            .collect();

        let mut matches = QueryMatches::with_capacity(queries.len());
        for query in queries {
            let books = self.stores.catalog.search_by_title(&query).await?;
            matches.insert(query, books.into_iter().map(|book| book.id).collect());
        }

        tracing::debug!(queries = matches.len(), "Search queries resolved");
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryStore, MockOrderStore, MockUserDirectory, OrderStore, Seed};
    use crate::models::{Book, BookId, Order, SearchHistoryEntry};
    use crate::services::recommendation::fallback::MockFallbackStrategy;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap() + Duration::days(n)
    }

    fn numbered_books(count: usize) -> Vec<Book> {
        (1..=count)
            .map(|i| Book::new(format!("b{:02}", i), format!("Book {}", i)))
            .collect()
    }

    fn stores(seed: Seed) -> Stores {
        Stores::from_backend(Arc::new(InMemoryStore::from_seed(seed)))
    }

    fn orchestrator(seed: Seed) -> RecommendationOrchestrator {
        RecommendationOrchestrator::new(stores(seed), RecommendationSettings::default())
    }

    fn ids(result: &RecommendationResult) -> Vec<&str> {
        result.items.iter().map(|item| item.book_id.as_str()).collect()
    }

    fn assert_distinct(result: &RecommendationResult) {
        let unique: HashSet<&BookId> = result.items.iter().map(|item| &item.book_id).collect();
        assert_eq!(unique.len(), result.items.len());
    }

    /// a and b share {1,2}, c bought {3,4}, t never did anything
    fn three_buyers_and_a_newcomer() -> Seed {
        Seed {
            users: vec!["a".into(), "b".into(), "c".into(), "t".into()],
            books: numbered_books(12),
            orders: vec![
                Order::new("o1", "a", day(1), ["b01", "b02"]),
                Order::new("o2", "b", day(2), ["b01", "b02"]),
                Order::new("o3", "c", day(3), ["b03", "b04"]),
            ],
            searches: vec![],
        }
    }

    #[tokio::test]
    async fn test_user_without_history_gets_fallback_only() {
        let engine = orchestrator(three_buyers_and_a_newcomer());
        let result = engine.recommend(&"t".into()).await.unwrap();

        assert_eq!(result.len(), 10);
        assert_distinct(&result);
        assert!(result
            .items
            .iter()
            .all(|item| item.source != RecommendationSource::Collaborative));
        assert_eq!(
            ids(&result),
            vec!["b03", "b04", "b01", "b02", "b05", "b06", "b07", "b08", "b09", "b10"]
        );
    }

    #[tokio::test]
    async fn test_every_user_gets_at_most_k_distinct_books() {
        let engine = orchestrator(three_buyers_and_a_newcomer());
        for user in ["a", "b", "c", "t"] {
            let result = engine.recommend(&user.into()).await.unwrap();
            assert!(result.len() <= 10);
            assert_distinct(&result);
        }
    }

    #[tokio::test]
    async fn test_close_neighbor_items_rank_first() {
        // y shares nothing with t and its only book sorts first
        let seed = Seed {
            users: vec!["t".into(), "x".into(), "y".into()],
            books: vec![
                Book::new("a9", "Nine"),
                Book::new("b1", "One"),
                Book::new("b2", "Two"),
                Book::new("b3", "Three"),
            ],
            orders: vec![
                Order::new("o1", "t", day(1), ["b1", "b2"]),
                Order::new("o2", "x", day(1), ["b1", "b2", "b3"]),
                Order::new("o3", "y", day(2), ["a9"]),
            ],
            searches: vec![],
        };
        let result = orchestrator(seed).recommend(&"t".into()).await.unwrap();

        assert_eq!(ids(&result), vec!["b1", "b2", "b3", "a9"]);
        assert!(result.items[..3]
            .iter()
            .all(|item| item.source == RecommendationSource::Collaborative));
        assert_eq!(result.items[3].source, RecommendationSource::Recent);
    }

    #[tokio::test]
    async fn test_fallback_asked_for_exactly_the_open_slots() {
        let seed = Seed {
            users: vec!["t".into(), "n".into(), "z".into()],
            books: (1..=8).map(|i| Book::new(format!("b{}", i), "Title")).collect(),
            orders: vec![
                Order::new("o1", "t", day(1), ["b1"]),
                Order::new("o2", "n", day(1), ["b1", "b2", "b3", "b4", "b5", "b6", "b7"]),
                Order::new("o3", "z", day(1), ["b8"]),
            ],
            searches: vec![],
        };

        let mut strategy = MockFallbackStrategy::new();
        strategy.expect_source().return_const(RecommendationSource::Recent);
        strategy
            .expect_supply()
            .withf(|_, remaining, exclude| {
                *remaining == 3
                    && exclude.len() == 7
                    && (1..=7).all(|i| exclude.contains(&BookId::from(format!("b{}", i))))
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(vec![
                    Book::new("b1", "Repeat"),
                    Book::new("f1", "Fresh 1"),
                    Book::new("f2", "Fresh 2"),
                    Book::new("f3", "Fresh 3"),
                ])
            });

        let engine = RecommendationOrchestrator::with_fallback(
            stores(seed),
            FallbackSupplier::new(vec![Box::new(strategy)]),
            RecommendationSettings::default(),
        );
        let result = engine.recommend(&"t".into()).await.unwrap();

        assert_eq!(
            ids(&result),
            vec!["b1", "b2", "b3", "b4", "b5", "b6", "b7", "f1", "f2", "f3"]
        );
        assert_distinct(&result);
    }

    #[tokio::test]
    async fn test_small_catalog_caps_result() {
        let seed = Seed {
            users: vec!["u1".into(), "u2".into(), "u3".into()],
            books: numbered_books(5),
            orders: vec![
                Order::new("o1", "u1", day(1), ["b01", "b02"]),
                Order::new("o2", "u2", day(2), ["b02", "b03"]),
            ],
            searches: vec![],
        };
        let result = orchestrator(seed).recommend(&"u1".into()).await.unwrap();

        assert_eq!(result.len(), 5);
        assert_distinct(&result);
        let catalog: HashSet<String> = (1..=5).map(|i| format!("b{:02}", i)).collect();
        assert!(ids(&result).iter().all(|id| catalog.contains(*id)));
    }

    #[tokio::test]
    async fn test_unknown_user_degrades_to_fallback() {
        let engine = orchestrator(three_buyers_and_a_newcomer());
        let result = engine.recommend(&"ghost".into()).await.unwrap();

        assert_eq!(result.user_id, UserId::from("ghost"));
        assert_eq!(result.len(), 10);
        assert!(result
            .items
            .iter()
            .all(|item| item.source != RecommendationSource::Collaborative));
    }

    #[tokio::test]
    async fn test_single_active_user_degrades_to_fallback() {
        let seed = Seed {
            users: vec!["solo".into(), "idle".into()],
            books: numbered_books(3),
            orders: vec![Order::new("o1", "solo", day(1), ["b01"])],
            searches: vec![],
        };
        let result = orchestrator(seed).recommend(&"solo".into()).await.unwrap();

        assert_eq!(ids(&result), vec!["b01", "b02", "b03"]);
        assert_eq!(result.items[0].source, RecommendationSource::Recent);
    }

    #[tokio::test]
    async fn test_searches_feed_the_matrix() {
        let seed = Seed {
            users: vec!["t".into(), "x".into(), "z".into()],
            books: vec![
                Book::new("b1", "Dune"),
                Book::new("b2", "Emma"),
                Book::new("b3", "Solaris"),
            ],
            orders: vec![
                Order::new("o1", "x", day(1), ["b1", "b2"]),
                Order::new("o2", "z", day(2), ["b3"]),
            ],
            searches: vec![SearchHistoryEntry::new("t", "DUNE")],
        };
        let result = orchestrator(seed).recommend(&"t".into()).await.unwrap();

        assert_eq!(ids(&result), vec!["b1", "b2", "b3"]);
        assert!(result.items[..2]
            .iter()
            .all(|item| item.source == RecommendationSource::Collaborative));
        assert_eq!(result.items[2].source, RecommendationSource::Recent);
    }

    #[tokio::test]
    async fn test_deleted_books_are_never_recommended() {
        let seed = Seed {
            users: vec!["t".into(), "n".into(), "z".into()],
            books: vec![
                Book::new("b1", "One"),
                Book::new("b2", "Two").deleted(),
                Book::new("b3", "Three"),
                Book::new("b4", "Four"),
            ],
            orders: vec![
                Order::new("o1", "t", day(1), ["b1"]),
                Order::new("o2", "n", day(2), ["b1", "b2", "b3"]),
                Order::new("o3", "z", day(1), ["b4"]),
            ],
            searches: vec![],
        };
        let result = orchestrator(seed).recommend(&"t".into()).await.unwrap();

        assert_eq!(ids(&result), vec!["b1", "b3", "b4"]);
        assert_eq!(result.items[1].source, RecommendationSource::Collaborative);
    }

    #[tokio::test]
    async fn test_repeated_calls_are_identical() {
        let engine = orchestrator(three_buyers_and_a_newcomer());
        let first = engine.recommend(&"a".into()).await.unwrap();
        let second = engine.recommend(&"a".into()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_result_size_is_configurable() {
        let settings = RecommendationSettings {
            result_size: 3,
            ..Default::default()
        };
        let engine = RecommendationOrchestrator::new(stores(three_buyers_and_a_newcomer()), settings);
        let result = engine.recommend(&"t".into()).await.unwrap();
        assert_eq!(ids(&result), vec!["b03", "b04", "b01"]);
    }

    #[tokio::test]
    async fn test_user_directory_failure_propagates() {
        let backend = Arc::new(InMemoryStore::new());
        let mut users = MockUserDirectory::new();
        users
            .expect_list_user_ids()
            .returning(|| Err(AppError::Internal("directory offline".to_string())));

        let stores = Stores {
            users: Arc::new(users),
            orders: backend.clone(),
            searches: backend.clone(),
            catalog: backend,
        };
        let engine = RecommendationOrchestrator::new(stores, RecommendationSettings::default());

        tokio_test::assert_err!(engine.recommend(&"t".into()).await);
    }

    #[tokio::test]
    async fn test_order_store_failure_propagates() {
        let backend = Arc::new(InMemoryStore::new());
        backend.add_user("t").await;
        let mut orders = MockOrderStore::new();
        orders
            .expect_orders_for_user()
            .returning(|_| Err(AppError::Internal("orders offline".to_string())));

        let stores = Stores {
            users: backend.clone(),
            orders: Arc::new(orders),
            searches: backend.clone(),
            catalog: backend,
        };
        let engine = RecommendationOrchestrator::new(stores, RecommendationSettings::default());

        let err = engine.recommend(&"t".into()).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    /// Fails for "bad" and never answers for anyone else
    struct StalledOrders {
        stalled_dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl OrderStore for StalledOrders {
        async fn orders_for_user(&self, user_id: &UserId) -> AppResult<Vec<Order>> {
            if user_id.as_str() == "bad" {
                return Err(AppError::Internal("orders offline".to_string()));
            }
            let _flag = DropFlag(self.stalled_dropped.clone());
            std::future::pending::<()>().await;
            Ok(Vec::new())
        }

        async fn recent_orders(&self, _limit: usize) -> AppResult<Vec<Order>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_failed_load_aborts_pending_loads() {
        let backend = Arc::new(InMemoryStore::new());
        backend.add_user("a-slow").await;
        backend.add_user("bad").await;
        let stalled_dropped = Arc::new(AtomicBool::new(false));

        let stores = Stores {
            users: backend.clone(),
            orders: Arc::new(StalledOrders {
                stalled_dropped: stalled_dropped.clone(),
            }),
            searches: backend.clone(),
            catalog: backend,
        };
        let engine = RecommendationOrchestrator::new(stores, RecommendationSettings::default());

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            engine.recommend(&"bad".into()),
        )
        .await
        .expect("a failed load must not wait on the stalled one");
        tokio_test::assert_err!(outcome);

        for _ in 0..100 {
            if stalled_dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(stalled_dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_score_candidates_reports_insufficient_data() {
        let seed_matrix = InteractionMatrixBuilder::from_activity(
            &[UserActivity {
                user_id: "solo".into(),
                orders: vec![Order::new("o1", "solo", day(1), ["b1"])],
                searches: vec![],
            }],
            &QueryMatches::new(),
        );
        let outcome = score_candidates(&seed_matrix, &"solo".into(), CandidateRanker::new(10, 10));
        assert_eq!(
            outcome,
            Err(RecommendError::InsufficientData { active_users: 1 })
        );
    }
}
