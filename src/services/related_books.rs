use std::collections::BTreeMap;

use crate::{
    db::Catalog,
    error::{AppError, AppResult},
    models::{Book, BookId},
    services::recommendation::Affinity,
};

/// Live books sharing an author or a category with `book_id`.
///
/// Books sharing both come first, then author matches, then category
/// matches, each group by ascending id. The book itself is never included.
pub async fn related_books(catalog: &dyn Catalog, book_id: &BookId) -> AppResult<Vec<Book>> {
    let book = catalog
        .find_book(book_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))?;

    let by_author = sharing(catalog, Affinity::Author, &book).await?;
    let mut by_category = sharing(catalog, Affinity::Category, &book).await?;

    let mut related = Vec::with_capacity(by_author.len() + by_category.len());
    let mut author_only = Vec::new();
    for (id, other) in by_author {
        if by_category.remove(&id).is_some() {
            related.push(other);
        } else {
            author_only.push(other);
        }
    }
    related.extend(author_only);
    related.extend(by_category.into_values());

    tracing::debug!(book_id = %book_id, related = related.len(), "Related books");
    Ok(related)
}

async fn sharing(
    catalog: &dyn Catalog,
    affinity: Affinity,
    book: &Book,
) -> AppResult<BTreeMap<BookId, Book>> {
    let mut found = BTreeMap::new();
    for key in affinity.keys_of(book) {
        for other in affinity.books_with(catalog, key).await? {
            if other.id != book.id && !other.is_deleted {
                found.insert(other.id.clone(), other);
            }
        }
    }
    Ok(found)
}
