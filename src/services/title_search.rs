use crate::{
    db::Catalog,
    error::{AppError, AppResult},
    models::Book,
};

/// Case-insensitive title search over live books
pub async fn search_books(catalog: &dyn Catalog, query: &str) -> AppResult<Vec<Book>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::InvalidInput(
            "Search query must not be blank".to_string(),
        ));
    }

    let books = catalog.search_by_title(query).await?;
    tracing::debug!(query = %query, hits = books.len(), "Title search");
    Ok(books)
}
