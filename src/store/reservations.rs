//! Stock reservations held by open table orders and shopping carts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

use super::{Database, StoreError};

/// Who holds a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ReservationHolder {
    /// Open order of a table (`holder_id` is the order id)
    Mesa,
    /// Shopping cart (`holder_id` is the cart id)
    Carrinho,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ReservationStatus {
    Ativa,
    Consumida,
    Liberada,
    Expirada,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StockReservation {
    pub id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub holder: ReservationHolder,
    pub holder_id: i64,
    pub user_id: Option<i64>,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub order_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The holder a reservation belongs to
#[derive(Debug, Clone, Copy)]
pub struct Holder {
    pub kind: ReservationHolder,
    pub id: i64,
    pub user_id: Option<i64>,
    pub order_id: Option<i64>,
}

impl Holder {
    pub fn table_order(order_id: i64, user_id: Option<i64>) -> Self {
        Self {
            kind: ReservationHolder::Mesa,
            id: order_id,
            user_id,
            order_id: Some(order_id),
        }
    }

    pub fn cart(cart_id: i64, user_id: Option<i64>) -> Self {
        Self {
            kind: ReservationHolder::Carrinho,
            id: cart_id,
            user_id,
            order_id: None,
        }
    }
}

/// Units of a product held by live reservations of anyone but `holder`
pub async fn reserved_by_others(
    conn: &mut SqliteConnection,
    product_id: i64,
    holder: &Holder,
    now: DateTime<Utc>,
) -> Result<i64, StoreError> {
    Ok(sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0) FROM stock_reservations
         WHERE product_id = ? AND status = 'ativa' AND expires_at > ?
           AND NOT (holder = ? AND holder_id = ?)",
    )
    .bind(product_id)
    .bind(now)
    .bind(holder.kind)
    .bind(holder.id)
    .fetch_one(&mut *conn)
    .await?)
}

/// Units currently reserved by `holder` for a product
pub async fn reserved_by(
    conn: &mut SqliteConnection,
    product_id: i64,
    holder: &Holder,
) -> Result<i64, StoreError> {
    Ok(sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0) FROM stock_reservations
         WHERE product_id = ? AND status = 'ativa' AND holder = ? AND holder_id = ?",
    )
    .bind(product_id)
    .bind(holder.kind)
    .bind(holder.id)
    .fetch_one(&mut *conn)
    .await?)
}

/// Fail with `InsufficientStock` unless `wanted` units can be held by `holder`
pub async fn ensure_available(
    conn: &mut SqliteConnection,
    product_id: i64,
    stock: i64,
    holder: &Holder,
    wanted: i64,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let available = stock - reserved_by_others(conn, product_id, holder, now).await?;
    if wanted > available {
        return Err(StoreError::InsufficientStock {
            product_id,
            requested: wanted,
            available: available.max(0),
        });
    }
    Ok(())
}

/// Set the holder's live reservation for a product to `quantity`.
/// Zero or less releases it.
pub async fn set_reserved(
    conn: &mut SqliteConnection,
    product_id: i64,
    holder: &Holder,
    quantity: i64,
    expires_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let now = Utc::now();
    if quantity <= 0 {
        sqlx::query(
            "UPDATE stock_reservations SET status = 'liberada', updated_at = ?
             WHERE product_id = ? AND holder = ? AND holder_id = ? AND status = 'ativa'",
        )
        .bind(now)
        .bind(product_id)
        .bind(holder.kind)
        .bind(holder.id)
        .execute(&mut *conn)
        .await?;
        return Ok(());
    }

    let updated = sqlx::query(
        "UPDATE stock_reservations SET quantity = ?, expires_at = ?, updated_at = ?
         WHERE product_id = ? AND holder = ? AND holder_id = ? AND status = 'ativa'",
    )
    .bind(quantity)
    .bind(expires_at)
    .bind(now)
    .bind(product_id)
    .bind(holder.kind)
    .bind(holder.id)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        sqlx::query(
            "INSERT INTO stock_reservations
                (product_id, quantity, holder, holder_id, user_id, status, expires_at, order_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'ativa', ?, ?, ?, ?)",
        )
        .bind(product_id)
        .bind(quantity)
        .bind(holder.kind)
        .bind(holder.id)
        .bind(holder.user_id)
        .bind(expires_at)
        .bind(holder.order_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Move every live reservation of `holder` to `status`
pub async fn close_all(
    conn: &mut SqliteConnection,
    holder: &Holder,
    status: ReservationStatus,
    order_id: Option<i64>,
) -> Result<u64, StoreError> {
    let result = sqlx::query(
        "UPDATE stock_reservations SET status = ?, order_id = COALESCE(?, order_id), updated_at = ?
         WHERE holder = ? AND holder_id = ? AND status = 'ativa'",
    )
    .bind(status)
    .bind(order_id)
    .bind(Utc::now())
    .bind(holder.kind)
    .bind(holder.id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Hand a cart's live reservations over to another cart, summing overlaps
pub async fn transfer_cart(
    conn: &mut SqliteConnection,
    from_cart: i64,
    to: &Holder,
    expires_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let from = Holder::cart(from_cart, None);
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT product_id, quantity FROM stock_reservations
         WHERE holder = ? AND holder_id = ? AND status = 'ativa'",
    )
    .bind(from.kind)
    .bind(from.id)
    .fetch_all(&mut *conn)
    .await?;

    close_all(conn, &from, ReservationStatus::Liberada, None).await?;
    for (product_id, quantity) in rows {
        let current = reserved_by(conn, product_id, to).await?;
        set_reserved(conn, product_id, to, current + quantity, expires_at).await?;
    }
    Ok(())
}

/// Reservation store operations
#[derive(Clone)]
pub struct ReservationStore {
    db: Database,
}

impl ReservationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Live reservations, optionally for a single product
    pub async fn list_active(
        &self,
        product_id: Option<i64>,
    ) -> Result<Vec<StockReservation>, StoreError> {
        Ok(sqlx::query_as(
            "SELECT * FROM stock_reservations
             WHERE status = 'ativa' AND expires_at > ?1 AND (?2 IS NULL OR product_id = ?2)
             ORDER BY id",
        )
        .bind(Utc::now())
        .bind(product_id)
        .fetch_all(self.db.pool())
        .await?)
    }

    /// Mark reservations past their deadline as expired
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE stock_reservations SET status = 'expirada', updated_at = ?
             WHERE status = 'ativa' AND expires_at <= ?",
        )
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected())
    }
}
