use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    error::RecommendError,
    models::{BookId, Order, SearchHistoryEntry, UserId},
};

use super::index::IndexMap;

/// Catalog matches of each search query, keyed by [`normalize_query`]
pub type QueryMatches = HashMap<String, Vec<BookId>>;

/// Key under which a query's catalog matches are stored.
///
/// Matching is case-insensitive, so queries differing only in case share one
/// catalog lookup. Whitespace is part of the query.
pub fn normalize_query(query: &str) -> String {
    query.to_lowercase()
}

/// Evidence that a user is interested in a book
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRecord {
    pub user_id: UserId,
    pub book_id: BookId,
    pub weight: f64,
}

impl InteractionRecord {
    pub fn new(user_id: UserId, book_id: BookId, weight: f64) -> Self {
        Self {
            user_id,
            book_id,
            weight,
        }
    }
}

/// Everything one user did that feeds the interaction matrix
#[derive(Debug, Clone, Default)]
pub struct UserActivity {
    pub user_id: UserId,
    pub orders: Vec<Order>,
    pub searches: Vec<SearchHistoryEntry>,
}

/// One record per order line, weighted by the number of units bought
pub fn purchase_records<'a>(
    user_id: &'a UserId,
    orders: &'a [Order],
) -> impl Iterator<Item = InteractionRecord> + 'a {
    orders.iter().flat_map(move |order| {
        order.items.iter().map(move |item| {
            InteractionRecord::new(user_id.clone(), item.book_id.clone(), f64::from(item.quantity))
        })
    })
}

/// Weight 1.0 for every catalog book matched by every historical query
pub fn search_records<'a>(
    user_id: &'a UserId,
    searches: &'a [SearchHistoryEntry],
    matches: &'a QueryMatches,
) -> impl Iterator<Item = InteractionRecord> + 'a {
    searches.iter().flat_map(move |entry| {
        matches
            .get(&normalize_query(&entry.search_query))
            .into_iter()
            .flatten()
            .map(move |book_id| InteractionRecord::new(user_id.clone(), book_id.clone(), 1.0))
    })
}

/// Sparse user × book weight matrix
///
/// Every stored weight is strictly positive and finite. Users with no
/// interactions keep an empty row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionMatrix {
    rows: BTreeMap<UserId, BTreeMap<BookId, f64>>,
}

impl InteractionMatrix {
    pub fn row(&self, user_id: &UserId) -> Option<&BTreeMap<BookId, f64>> {
        self.rows.get(user_id)
    }

    pub fn weight(&self, user_id: &UserId, book_id: &BookId) -> f64 {
        self.rows
            .get(user_id)
            .and_then(|row| row.get(book_id))
            .copied()
            .unwrap_or(0.0)
    }

    /// Number of rows, including empty ones
    pub fn user_count(&self) -> usize {
        self.rows.len()
    }

    /// Users with at least one interaction, ascending
    pub fn active_users(&self) -> impl Iterator<Item = &UserId> {
        self.rows
            .iter()
            .filter(|(_, row)| !row.is_empty())
            .map(|(user_id, _)| user_id)
    }

    pub fn active_user_count(&self) -> usize {
        self.active_users().count()
    }

    /// Distinct books with any interaction
    pub fn book_ids(&self) -> BTreeSet<&BookId> {
        self.rows.values().flat_map(|row| row.keys()).collect()
    }

    /// Fails when fewer than two users have any interaction
    pub fn ensure_sufficient(&self) -> Result<(), RecommendError> {
        let active_users = self.active_user_count();
        if active_users < 2 {
            return Err(RecommendError::InsufficientData { active_users });
        }
        Ok(())
    }

    /// Index over active users only
    pub fn user_index(&self) -> IndexMap<UserId> {
        IndexMap::from_ids(self.active_users().cloned())
    }

    pub fn book_index(&self) -> IndexMap<BookId> {
        IndexMap::from_ids(self.book_ids().into_iter().cloned())
    }

    /// Zero-filled dense row of every indexed user over the indexed book space
    pub fn dense_rows(&self, users: &IndexMap<UserId>, books: &IndexMap<BookId>) -> Vec<Vec<f64>> {
        users
            .iter()
            .map(|(_, user_id)| {
                let mut dense = vec![0.0; books.len()];
                if let Some(row) = self.rows.get(user_id) {
                    for (book_id, weight) in row {
                        if let Some(column) = books.position(book_id) {
                            dense[column] = *weight;
                        }
                    }
                }
                dense
            })
            .collect()
    }
}

/// Accumulates [`InteractionRecord`]s into an [`InteractionMatrix`]
#[derive(Debug, Default)]
pub struct InteractionMatrixBuilder {
    rows: BTreeMap<UserId, BTreeMap<BookId, f64>>,
}

impl InteractionMatrixBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user so they get a row even without interactions
    pub fn add_user(&mut self, user_id: &UserId) -> &mut Self {
        self.rows.entry(user_id.clone()).or_default();
        self
    }

    /// Adds a record's weight to its cell. Non-positive and non-finite weights are dropped.
    pub fn record(&mut self, record: InteractionRecord) -> &mut Self {
        if !(record.weight.is_finite() && record.weight > 0.0) {
            tracing::trace!(
                user_id = %record.user_id,
                book_id = %record.book_id,
                weight = record.weight,
                "Dropping non-positive interaction"
            );
            return self;
        }

        *self
            .rows
            .entry(record.user_id)
            .or_default()
            .entry(record.book_id)
            .or_insert(0.0) += record.weight;
        self
    }

    pub fn extend<I>(&mut self, records: I) -> &mut Self
    where
        I: IntoIterator<Item = InteractionRecord>,
    {
        for record in records {
            self.record(record);
        }
        self
    }

    /// Folds in one user's purchases and resolved searches
    pub fn add_activity(&mut self, activity: &UserActivity, matches: &QueryMatches) -> &mut Self {
        self.add_user(&activity.user_id);
        self.extend(purchase_records(&activity.user_id, &activity.orders));
        self.extend(search_records(&activity.user_id, &activity.searches, matches));
        self
    }

    pub fn build(self) -> InteractionMatrix {
        InteractionMatrix { rows: self.rows }
    }

    /// Builds the matrix for a whole user population
    pub fn from_activity(activities: &[UserActivity], matches: &QueryMatches) -> InteractionMatrix {
        let mut builder = Self::new();
        for activity in activities {
            builder.add_activity(activity, matches);
        }
        let matrix = builder.build();

        tracing::debug!(
            users = matrix.user_count(),
            active_users = matrix.active_user_count(),
            books = matrix.book_ids().len(),
            "Interaction matrix built"
        );

        matrix
    }
}
