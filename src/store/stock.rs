//! Stock movements: every change to a product's stock goes through here

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use tracing::debug;

use super::{lock_row, Database, LockTable, StoreError};

/// Direction of a stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MovementKind {
    Entrada,
    Saida,
}

/// Why the stock moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MovementOrigin {
    ProdutoCadastro,
    Compra,
    Ajuste,
    VendaFisica,
    VendaOnline,
    CancelamentoVendaFisica,
    CancelamentoVendaOnline,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StockMovement {
    pub id: i64,
    pub product_id: i64,
    pub kind: MovementKind,
    pub origin: MovementOrigin,
    pub quantity: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub user_id: Option<i64>,
    pub notes: Option<String>,
    pub order_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A requested stock change
#[derive(Debug, Clone)]
pub struct MovementRequest {
    pub product_id: i64,
    pub kind: MovementKind,
    pub origin: MovementOrigin,
    pub quantity: i64,
    pub user_id: Option<i64>,
    pub notes: Option<String>,
    pub order_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<i64>,
    pub order_id: Option<i64>,
    pub limit: Option<i64>,
}

/// Stock level after applying a movement. Decrements clamp at zero;
/// `None` when an increment would overflow.
pub fn next_quantity(previous: i64, kind: MovementKind, quantity: i64) -> Option<i64> {
    match kind {
        MovementKind::Entrada => previous.checked_add(quantity),
        MovementKind::Saida => Some(previous.saturating_sub(quantity).max(0)),
    }
}

/// Apply a movement inside the caller's transaction.
///
/// Locks the product row first so the read-modify-write cannot interleave
/// with another writer.
pub async fn apply_movement(
    conn: &mut SqliteConnection,
    req: MovementRequest,
) -> Result<StockMovement, StoreError> {
    if req.quantity <= 0 {
        return Err(StoreError::validation("quantity must be greater than zero"));
    }
    if !lock_row(conn, LockTable::Products, req.product_id).await? {
        return Err(StoreError::not_found("product"));
    }

    let previous: i64 = sqlx::query_scalar("SELECT stock FROM products WHERE id = ?")
        .bind(req.product_id)
        .fetch_one(&mut *conn)
        .await?;
    let new = next_quantity(previous, req.kind, req.quantity)
        .ok_or_else(|| StoreError::validation("quantity is too large"))?;
    let now = Utc::now();

    sqlx::query("UPDATE products SET stock = ?, updated_at = ? WHERE id = ?")
        .bind(new)
        .bind(now)
        .bind(req.product_id)
        .execute(&mut *conn)
        .await?;

    let movement: StockMovement = sqlx::query_as(
        "INSERT INTO stock_movements
            (product_id, kind, origin, quantity, previous_quantity, new_quantity, user_id, notes, order_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(req.product_id)
    .bind(req.kind)
    .bind(req.origin)
    .bind(req.quantity)
    .bind(previous)
    .bind(new)
    .bind(req.user_id)
    .bind(&req.notes)
    .bind(req.order_id)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    debug!(
        product_id = req.product_id,
        kind = ?req.kind,
        origin = ?req.origin,
        previous,
        new,
        "Stock movement applied"
    );

    Ok(movement)
}

/// Quantities taken out of stock for an order, per product
pub async fn sold_quantities(
    conn: &mut SqliteConnection,
    order_id: i64,
) -> Result<Vec<(i64, i64)>, StoreError> {
    Ok(sqlx::query_as(
        "SELECT product_id, SUM(quantity) FROM stock_movements
         WHERE order_id = ? AND kind = 'saida' AND origin IN ('venda_online', 'venda_fisica')
         GROUP BY product_id",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?)
}

/// Stock store operations
#[derive(Clone)]
pub struct StockStore {
    db: Database,
}

impl StockStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Apply a single movement in its own transaction
    pub async fn record(&self, req: MovementRequest) -> Result<StockMovement, StoreError> {
        let mut tx = self.db.begin_write().await?;
        let movement = apply_movement(&mut tx, req).await?;
        tx.commit().await?;
        Ok(movement)
    }

    /// Movements, newest first
    pub async fn list(&self, filter: MovementFilter) -> Result<Vec<StockMovement>, StoreError> {
        let limit = filter.limit.unwrap_or(100).clamp(1, 1000);
        Ok(sqlx::query_as(
            "SELECT * FROM stock_movements
             WHERE (?1 IS NULL OR product_id = ?1) AND (?2 IS NULL OR order_id = ?2)
             ORDER BY id DESC LIMIT ?3",
        )
        .bind(filter.product_id)
        .bind(filter.order_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrements_clamp_at_zero() {
        assert_eq!(next_quantity(10, MovementKind::Entrada, 5), Some(15));
        assert_eq!(next_quantity(10, MovementKind::Saida, 4), Some(6));
        assert_eq!(next_quantity(3, MovementKind::Saida, 5), Some(0));
        assert_eq!(next_quantity(1, MovementKind::Entrada, i64::MAX), None);
    }

    #[test]
    fn origins_use_snake_case_on_the_wire() {
        let json = serde_json::to_string(&MovementOrigin::CancelamentoVendaOnline).unwrap();
        assert_eq!(json, "\"cancelamento_venda_online\"");
        let kind: MovementKind = serde_json::from_str("\"saida\"").unwrap();
        assert_eq!(kind, MovementKind::Saida);
    }
}
