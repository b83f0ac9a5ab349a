use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BookId, UserId};

/// A completed customer order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub user_id: UserId,
    pub order_date: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// One line of an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub book_id: BookId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl OrderItem {
    pub fn new(book_id: impl Into<BookId>, quantity: u32) -> Self {
        Self {
            book_id: book_id.into(),
            quantity,
        }
    }
}

impl Order {
    /// Creates an order with one unit of each listed book
    pub fn new<I, B>(
        id: impl Into<String>,
        user_id: impl Into<UserId>,
        order_date: DateTime<Utc>,
        books: I,
    ) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<BookId>,
    {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            order_date,
            items: books.into_iter().map(|b| OrderItem::new(b, 1)).collect(),
        }
    }

    /// Book ids in line-item order, without repeats
    pub fn book_ids(&self) -> Vec<BookId> {
        let mut ids: Vec<BookId> = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if !ids.contains(&item.book_id) {
                ids.push(item.book_id.clone());
            }
        }
        ids
    }
}
