use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::{Book, BookId, UserId};

/// Which stage of the pipeline produced a recommended book
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    /// Neighbor aggregation over the similarity matrix
    Collaborative,
    /// Items from the most recent orders system-wide
    Recent,
    /// Items by cumulative sold quantity
    BestSelling,
    /// Items in the user's favorite categories
    FavoriteCategory,
    /// Items by the user's favorite authors
    FavoriteAuthor,
}

impl Display for RecommendationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecommendationSource::Collaborative => "collaborative",
            RecommendationSource::Recent => "recent",
            RecommendationSource::BestSelling => "best_selling",
            RecommendationSource::FavoriteCategory => "favorite_category",
            RecommendationSource::FavoriteAuthor => "favorite_author",
        };
        write!(f, "{}", name)
    }
}

/// One entry of a recommendation list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendedBook {
    pub book_id: BookId,
    pub title: String,
    pub source: RecommendationSource,
}

impl RecommendedBook {
    pub fn from_book(book: &Book, source: RecommendationSource) -> Self {
        Self {
            book_id: book.id.clone(),
            title: book.title.clone(),
            source,
        }
    }
}

/// Ordered, duplicate-free recommendations for one user, best first
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationResult {
    pub user_id: UserId,
    pub items: Vec<RecommendedBook>,
}

impl RecommendationResult {
    pub fn book_ids(&self) -> Vec<BookId> {
        self.items.iter().map(|item| item.book_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
