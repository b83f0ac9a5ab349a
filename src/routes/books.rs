use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    models::{Book, BookId},
    services::{related_books, title_search},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: String,
}

#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub id: BookId,
    pub title: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
}

impl From<&Book> for BookResponse {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id.clone(),
            title: book.title.clone(),
            authors: book.authors.clone(),
            categories: book.categories.clone(),
        }
    }
}

/// Handler for book title search
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<Vec<BookResponse>>> {
    let books = title_search::search_books(state.catalog.as_ref(), &params.q).await?;
    Ok(Json(books.iter().map(BookResponse::from).collect()))
}

/// Handler for live books sharing an author or category with a book
pub async fn related(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> AppResult<Json<Vec<BookResponse>>> {
    let book_id = BookId::from(book_id);
    let books = related_books::related_books(state.catalog.as_ref(), &book_id).await?;
    Ok(Json(books.iter().map(BookResponse::from).collect()))
}
