use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{Catalog, OrderStore, SearchHistoryStore, UserDirectory},
    error::AppResult,
    models::{Book, BookId, Order, OrderItem, SearchHistoryEntry, UserId},
};

/// Creates a PostgreSQL connection pool
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the bundled schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

#[derive(sqlx::FromRow)]
struct BookRow {
    id: String,
    title: String,
    authors: Vec<String>,
    categories: Vec<String>,
    sold_quantity: i64,
    is_deleted: bool,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Book {
            id: BookId(row.id),
            title: row.title,
            authors: row.authors,
            categories: row.categories,
            sold_quantity: row.sold_quantity.max(0) as u64,
            is_deleted: row.is_deleted,
        }
    }
}

/// One joined `orders` × `order_items` row
#[derive(sqlx::FromRow)]
struct OrderLineRow {
    id: String,
    user_id: String,
    order_date: DateTime<Utc>,
    book_id: String,
    quantity: i32,
}

/// Folds joined order lines back into orders. Rows must arrive grouped by order id.
fn group_order_lines(rows: Vec<OrderLineRow>) -> Vec<Order> {
    let mut orders: Vec<Order> = Vec::new();

    for row in rows {
        let item = OrderItem::new(row.book_id, row.quantity.max(0) as u32);
        match orders.last_mut() {
            Some(order) if order.id == row.id => order.items.push(item),
            _ => orders.push(Order {
                id: row.id,
                user_id: UserId(row.user_id),
                order_date: row.order_date,
                items: vec![item],
            }),
        }
    }

    orders
}

/// Escapes LIKE wildcards so a user query only ever matches literally
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn to_entries(user_id: &UserId, rows: Vec<(String, DateTime<Utc>)>) -> Vec<SearchHistoryEntry> {
    rows.into_iter()
        .map(|(search_query, search_date)| SearchHistoryEntry {
            user_id: user_id.clone(),
            search_query,
            search_date,
        })
        .collect()
}

const BOOK_COLUMNS: &str = "id, title, authors, categories, sold_quantity, is_deleted";

/// Postgres-backed implementation of every collaborator trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_books(&self, sql: &str, bind: &str) -> AppResult<Vec<Book>> {
        let rows = sqlx::query_as::<_, BookRow>(sql)
            .bind(bind)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Book::from).collect())
    }
}

#[async_trait::async_trait]
impl UserDirectory for PgStore {
    async fn list_user_ids(&self) -> AppResult<Vec<UserId>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| UserId(id)).collect())
    }
}

#[async_trait::async_trait]
impl OrderStore for PgStore {
    async fn orders_for_user(&self, user_id: &UserId) -> AppResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderLineRow>(
            r#"
            SELECT o.id, o.user_id, o.order_date, i.book_id, i.quantity
            FROM orders o
            JOIN order_items i ON i.order_id = o.id
            WHERE o.user_id = $1
            ORDER BY o.order_date, o.id, i.position
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(group_order_lines(rows))
    }

    async fn recent_orders(&self, limit: usize) -> AppResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderLineRow>(
            r#"
            WITH recent AS (
                SELECT id, user_id, order_date
                FROM orders
                ORDER BY order_date DESC, id
                LIMIT $1
            )
            SELECT r.id, r.user_id, r.order_date, i.book_id, i.quantity
            FROM recent r
            JOIN order_items i ON i.order_id = r.id
            ORDER BY r.order_date DESC, r.id, i.position
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(group_order_lines(rows))
    }
}

#[async_trait::async_trait]
impl SearchHistoryStore for PgStore {
    async fn searches_for_user(&self, user_id: &UserId) -> AppResult<Vec<SearchHistoryEntry>> {
        let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT search_query, search_date FROM search_histories WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(to_entries(user_id, rows))
    }

    async fn recent_searches(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> AppResult<Vec<SearchHistoryEntry>> {
        let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT search_query, search_date
            FROM search_histories
            WHERE user_id = $1
            ORDER BY search_date DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(to_entries(user_id, rows))
    }

    async fn upsert_search(
        &self,
        user_id: &UserId,
        query: &str,
    ) -> AppResult<SearchHistoryEntry> {
        let (search_query, search_date): (String, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO search_histories (user_id, search_query, search_date)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, search_query)
            DO UPDATE SET search_date = EXCLUDED.search_date
            RETURNING search_query, search_date
            "#,
        )
        .bind(user_id.as_str())
        .bind(query)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(SearchHistoryEntry {
            user_id: user_id.clone(),
            search_query,
            search_date,
        })
    }

    async fn delete_search(&self, user_id: &UserId, query: &str) -> AppResult<bool> {
        let result =
            sqlx::query("DELETE FROM search_histories WHERE user_id = $1 AND search_query = $2")
                .bind(user_id.as_str())
                .bind(query)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl Catalog for PgStore {
    async fn find_book(&self, book_id: &BookId) -> AppResult<Option<Book>> {
        let sql = format!(
            "SELECT {} FROM books WHERE id = $1 AND NOT is_deleted",
            BOOK_COLUMNS
        );
        let row = sqlx::query_as::<_, BookRow>(&sql)
            .bind(book_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Book::from))
    }

    async fn search_by_title(&self, query: &str) -> AppResult<Vec<Book>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM books WHERE NOT is_deleted AND title ILIKE $1 ORDER BY id",
            BOOK_COLUMNS
        );
        self.fetch_books(&sql, &like_pattern(query)).await
    }

    async fn best_sellers(&self, limit: usize) -> AppResult<Vec<Book>> {
        let sql = format!(
            "SELECT {} FROM books WHERE NOT is_deleted ORDER BY sold_quantity DESC, id LIMIT $1",
            BOOK_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookRow>(&sql)
            .bind(limit.min(i64::MAX as usize) as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Book::from).collect())
    }

    async fn books_in_category(&self, category: &str) -> AppResult<Vec<Book>> {
        let sql = format!(
            "SELECT {} FROM books WHERE NOT is_deleted AND $1 = ANY(categories) ORDER BY id",
            BOOK_COLUMNS
        );
        self.fetch_books(&sql, category).await
    }

    async fn books_by_author(&self, author: &str) -> AppResult<Vec<Book>> {
        let sql = format!(
            "SELECT {} FROM books WHERE NOT is_deleted AND $1 = ANY(authors) ORDER BY id",
            BOOK_COLUMNS
        );
        self.fetch_books(&sql, author).await
    }
}
