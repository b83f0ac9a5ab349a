use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod book;
pub mod order;
pub mod recommendation;
pub mod search_history;

pub use book::Book;
pub use order::{Order, OrderItem};
pub use recommendation::{RecommendationResult, RecommendationSource, RecommendedBook};
pub use search_history::SearchHistoryEntry;

/// Declares an opaque, externally issued string identifier.
///
/// Identifiers order lexicographically; ranking tie-breaks rely on that order.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a customer account
    UserId
);

string_id!(
    /// Identifier of a catalog book
    BookId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_id_display() {
        let id = BookId::from("64f1c0ffee");
        assert_eq!(format!("{}", id), "64f1c0ffee");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = UserId::from("u-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""u-1""#);

        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_book_ids_order_lexicographically() {
        let mut ids = vec![BookId::from("b10"), BookId::from("b02"), BookId::from("a99")];
        ids.sort();
        assert_eq!(
            ids,
            vec![BookId::from("a99"), BookId::from("b02"), BookId::from("b10")]
        );
    }
}
