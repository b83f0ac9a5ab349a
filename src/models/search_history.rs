use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// A query the user typed into catalog search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHistoryEntry {
    pub user_id: UserId,
    pub search_query: String,
    pub search_date: DateTime<Utc>,
}

impl SearchHistoryEntry {
    pub fn new(user_id: impl Into<UserId>, search_query: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            search_query: search_query.into(),
            search_date: Utc::now(),
        }
    }
}
