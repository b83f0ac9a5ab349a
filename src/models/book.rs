use serde::{Deserialize, Serialize};

use super::BookId;

/// A catalog book as seen by the recommendation engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    /// Author identifiers
    #[serde(default)]
    pub authors: Vec<String>,
    /// Category identifiers
    #[serde(default)]
    pub categories: Vec<String>,
    /// Cumulative units sold across all orders
    #[serde(default)]
    pub sold_quantity: u64,
    /// Soft-deleted books stay in storage but never resolve through the catalog
    #[serde(default)]
    pub is_deleted: bool,
}

impl Book {
    /// Creates a live book with no authors, categories or sales
    pub fn new(id: impl Into<BookId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            authors: Vec::new(),
            categories: Vec::new(),
            sold_quantity: 0,
            is_deleted: false,
        }
    }

    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sold_quantity(mut self, sold_quantity: u64) -> Self {
        self.sold_quantity = sold_quantity;
        self
    }

    pub fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    /// Case-insensitive substring match of `query` against the title.
    ///
    /// Blank queries match nothing. Whitespace inside `query` must match too.
    pub fn title_matches(&self, query: &str) -> bool {
        if query.trim().is_empty() {
            return false;
        }
        self.title.to_lowercase().contains(&query.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_matches_ignores_case() {
        let book = Book::new("b1", "The Rust Programming Language");
        assert!(book.title_matches("rust"));
        assert!(book.title_matches("PROGRAMMING lang"));
        assert!(!book.title_matches("python"));
    }

    #[test]
    fn test_blank_query_matches_nothing() {
        let book = Book::new("b1", "Dune");
        assert!(!book.title_matches(""));
        assert!(!book.title_matches("   "));
    }

    #[test]
    fn test_surrounding_whitespace_is_matched_literally() {
        let book = Book::new("b1", "Dune");
        assert!(!book.title_matches(" Dune"));
        assert!(!book.title_matches("dune "));
        assert!(Book::new("b2", "Children of Dune").title_matches(" dune"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let book: Book = serde_json::from_str(r#"{"id": "b7", "title": "Emma"}"#).unwrap();
        assert_eq!(book.id, BookId::from("b7"));
        assert!(book.authors.is_empty());
        assert_eq!(book.sold_quantity, 0);
        assert!(!book.is_deleted);
    }
}
