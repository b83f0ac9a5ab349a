pub mod recommendation;
pub mod recommendations;
pub mod related_books;
pub mod search_history;
pub mod title_search;

pub use recommendations::RecommendationService;
pub use search_history::SearchHistoryService;
