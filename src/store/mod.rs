//! Persistence layer over SQLite
//!
//! Each store wraps the shared [`Database`] handle. Operations that touch
//! more than one row run inside a single transaction opened with
//! [`Database::begin_write`], then check the rows they change with [`lock_row`].

pub mod cart;
pub mod catalog;
pub mod coupons;
pub mod favorites;
pub mod orders;
pub mod payments;
pub mod products;
pub mod ratings;
pub mod reservations;
pub mod seed;
pub mod stock;
pub mod tables;
pub mod users;

use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::str::FromStr;

pub use cart::CartStore;
pub use catalog::CatalogStore;
pub use coupons::CouponStore;
pub use favorites::FavoriteStore;
pub use orders::OrderStore;
pub use payments::PaymentStore;
pub use products::ProductStore;
pub use ratings::RatingStore;
pub use reservations::ReservationStore;
pub use stock::StockStore;
pub use tables::TableStore;
pub use users::UserStore;

const SCHEMA: &str = include_str!("schema.sql");

/// Shared connection pool
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the pool. In-memory databases keep their connections alive forever,
    /// otherwise the data would vanish with the connection.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections.max(1));
        if url.contains(":memory:") {
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;
        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction that already holds the database write lock.
    ///
    /// A deferred transaction that reads before writing cannot be upgraded
    /// once another writer commits, and fails with `SQLITE_BUSY` without
    /// waiting. `BEGIN IMMEDIATE` queues on the busy timeout instead.
    pub async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Cheap liveness probe for the health endpoint
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// Touch a row inside a write transaction.
///
/// SQLite has no `SELECT ... FOR UPDATE`; together with
/// [`Database::begin_write`] this stands in for it. Returns `false` when the
/// row does not exist.
pub async fn lock_row(
    conn: &mut SqliteConnection,
    table: LockTable,
    id: i64,
) -> Result<bool, StoreError> {
    let sql = format!("UPDATE {} SET updated_at = ? WHERE id = ?", table.as_str());
    let result = sqlx::query(&sql)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Tables that can be row-locked
#[derive(Debug, Clone, Copy)]
pub enum LockTable {
    Products,
    DiningTables,
    Orders,
    Carts,
}

impl LockTable {
    fn as_str(self) -> &'static str {
        match self {
            LockTable::Products => "products",
            LockTable::DiningTables => "dining_tables",
            LockTable::Orders => "orders",
            LockTable::Carts => "carts",
        }
    }
}

/// Turn unique-constraint violations into a conflict with a readable message
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> StoreError {
    let unique = err
        .as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false);
    if unique {
        StoreError::Conflict(message.to_string())
    } else {
        StoreError::Database(err)
    }
}

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i64,
        available: i64,
    },

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Validation(String),

    #[error("Password hashing failed")]
    PasswordHash,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound(what.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }
}

#[cfg(test)]
pub(crate) async fn test_db() -> Database {
    let db = Database::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory database");
    db.migrate().await.expect("schema");
    db
}
