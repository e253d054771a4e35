//! Orders, their line items and status lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use tracing::info;

use super::products::fetch_product;
use super::reservations::{close_all, Holder, ReservationStatus};
use super::stock::{apply_movement, sold_quantities, MovementKind, MovementOrigin, MovementRequest};
use super::tables::{free_table, TableStatus};
use super::{lock_row, Database, LockTable, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum OrderKind {
    Online,
    Fisica,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum OrderStatus {
    Pendente,
    Pago,
    #[serde(rename = "Em Preparo")]
    #[sqlx(rename = "Em Preparo")]
    EmPreparo,
    Pronto,
    Entregue,
    Cancelado,
}

impl OrderStatus {
    /// Delivered and cancelled orders never change again
    pub fn is_final(self) -> bool {
        matches!(self, OrderStatus::Entregue | OrderStatus::Cancelado)
    }

    /// Forward-only lifecycle. Cancellation has its own path.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pendente, Pago | EmPreparo | Pronto | Entregue)
                | (Pago, EmPreparo | Pronto | Entregue)
                | (EmPreparo, Pronto | Entregue)
                | (Pronto, Entregue)
        )
    }

    /// Table status mirroring an open order in this status
    pub fn table_status(self) -> Option<TableStatus> {
        match self {
            OrderStatus::Pendente | OrderStatus::Pago => Some(TableStatus::Ocupada),
            OrderStatus::EmPreparo => Some(TableStatus::Preparando),
            OrderStatus::Pronto => Some(TableStatus::Pronto),
            OrderStatus::Entregue => Some(TableStatus::Finalizado),
            OrderStatus::Cancelado => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub kind: OrderKind,
    pub user_id: Option<i64>,
    pub number: String,
    pub status: OrderStatus,
    pub payment_method: Option<String>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub table_id: Option<i64>,
    pub attendant_id: Option<i64>,
    pub customer_name: Option<String>,
    pub notes: Option<String>,
    pub coupon_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: Option<i64>,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
}

/// Order together with its lines
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Columns of a fresh order row
#[derive(Debug, Clone)]
pub struct OrderHeader {
    pub kind: OrderKind,
    pub user_id: Option<i64>,
    pub payment_method: Option<String>,
    pub table_id: Option<i64>,
    pub attendant_id: Option<i64>,
    pub customer_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price_cents: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub kind: OrderKind,
    pub user_id: Option<i64>,
    pub payment_method: Option<String>,
    pub customer_name: Option<String>,
    pub table_id: Option<i64>,
    pub notes: Option<String>,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub kind: Option<OrderKind>,
    pub status: Option<OrderStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Insert a `Pendente` order. The number is the next in sequence, computed
/// by the insert itself so concurrent inserts cannot collide.
pub async fn insert_order(
    conn: &mut SqliteConnection,
    header: &OrderHeader,
) -> Result<Order, StoreError> {
    let now = Utc::now();
    Ok(sqlx::query_as(
        "INSERT INTO orders
            (kind, user_id, number, status, payment_method, subtotal_cents, discount_cents, total_cents,
             table_id, attendant_id, customer_name, notes, created_at, updated_at)
         VALUES (?, ?,
            (SELECT printf('%02d', COALESCE(MAX(CAST(number AS INTEGER)), 0) + 1) FROM orders),
            'Pendente', ?, 0, 0, 0, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(header.kind)
    .bind(header.user_id)
    .bind(&header.payment_method)
    .bind(header.table_id)
    .bind(header.attendant_id)
    .bind(&header.customer_name)
    .bind(&header.notes)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?)
}

pub async fn insert_item(
    conn: &mut SqliteConnection,
    order_id: i64,
    product_id: i64,
    name: &str,
    quantity: i64,
    unit_price_cents: i64,
) -> Result<OrderItem, StoreError> {
    if quantity <= 0 {
        return Err(StoreError::validation("quantity must be greater than zero"));
    }
    if unit_price_cents < 0 {
        return Err(StoreError::validation("unit price cannot be negative"));
    }
    let subtotal = quantity
        .checked_mul(unit_price_cents)
        .ok_or_else(|| StoreError::validation("line total is too large"))?;
    Ok(sqlx::query_as(
        "INSERT INTO order_items (order_id, product_id, name, quantity, unit_price_cents, subtotal_cents)
         VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(order_id)
    .bind(product_id)
    .bind(name)
    .bind(quantity)
    .bind(unit_price_cents)
    .bind(subtotal)
    .fetch_one(&mut *conn)
    .await?)
}

/// Recompute subtotal from the lines; total is subtotal minus discount, never negative
pub async fn recalculate_totals(
    conn: &mut SqliteConnection,
    order_id: i64,
) -> Result<Order, StoreError> {
    sqlx::query_as(
        "UPDATE orders SET
            subtotal_cents = (SELECT COALESCE(SUM(subtotal_cents), 0) FROM order_items WHERE order_id = ?1),
            total_cents = MAX((SELECT COALESCE(SUM(subtotal_cents), 0) FROM order_items WHERE order_id = ?1) - discount_cents, 0),
            updated_at = ?2
         WHERE id = ?1 RETURNING *",
    )
    .bind(order_id)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StoreError::not_found("order"))
}

pub async fn fetch_order(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Order>, StoreError> {
    Ok(sqlx::query_as("SELECT * FROM orders WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?)
}

pub async fn fetch_items(
    conn: &mut SqliteConnection,
    order_id: i64,
) -> Result<Vec<OrderItem>, StoreError> {
    Ok(sqlx::query_as("SELECT * FROM order_items WHERE order_id = ? ORDER BY id")
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?)
}

pub async fn set_status(
    conn: &mut SqliteConnection,
    order_id: i64,
    status: OrderStatus,
) -> Result<Order, StoreError> {
    sqlx::query_as("UPDATE orders SET status = ?, updated_at = ? WHERE id = ? RETURNING *")
        .bind(status)
        .bind(Utc::now())
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::not_found("order"))
}

/// Cancel an order inside the caller's transaction.
///
/// Stock taken by a sale goes back with a `cancelamento_*` entry, table
/// reservations are released and an attached table is freed.
pub async fn cancel_in(
    conn: &mut SqliteConnection,
    order_id: i64,
    user_id: Option<i64>,
) -> Result<Order, StoreError> {
    if !lock_row(conn, LockTable::Orders, order_id).await? {
        return Err(StoreError::not_found("order"));
    }
    let order = fetch_order(conn, order_id)
        .await?
        .ok_or_else(|| StoreError::not_found("order"))?;
    if order.status.is_final() {
        return Err(StoreError::InvalidState(format!(
            "order {} is already {:?}",
            order.number, order.status
        )));
    }

    let origin = match order.kind {
        OrderKind::Online => MovementOrigin::CancelamentoVendaOnline,
        OrderKind::Fisica => MovementOrigin::CancelamentoVendaFisica,
    };
    for (product_id, quantity) in sold_quantities(conn, order_id).await? {
        if fetch_product(conn, product_id).await?.is_none() {
            continue;
        }
        apply_movement(
            conn,
            MovementRequest {
                product_id,
                kind: MovementKind::Entrada,
                origin,
                quantity,
                user_id,
                notes: Some(format!("Cancelamento do pedido {}", order.number)),
                order_id: Some(order_id),
            },
        )
        .await?;
    }

    close_all(
        conn,
        &Holder::table_order(order_id, None),
        ReservationStatus::Liberada,
        None,
    )
    .await?;

    if let Some(coupon_id) = order.coupon_id {
        sqlx::query("UPDATE coupons SET uses = MAX(uses - 1, 0) WHERE id = ?")
            .bind(coupon_id)
            .execute(&mut *conn)
            .await?;
    }

    if let Some(table_id) = order.table_id {
        free_table(conn, table_id).await?;
    }

    let cancelled = set_status(conn, order_id, OrderStatus::Cancelado).await?;
    info!(order_id, number = %cancelled.number, "Order cancelled");
    Ok(cancelled)
}

/// Order store operations
#[derive(Clone)]
pub struct OrderStore {
    db: Database,
}

impl OrderStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create an order from explicit lines. Prices default to the catalog price.
    /// Stock is not touched.
    pub async fn create(
        &self,
        new: NewOrder,
        attendant_id: Option<i64>,
    ) -> Result<OrderWithItems, StoreError> {
        if new.items.is_empty() {
            return Err(StoreError::validation("order must have at least one item"));
        }
        if new.items.iter().any(|i| i.quantity <= 0) {
            return Err(StoreError::validation("quantity must be greater than zero"));
        }

        let mut tx = self.db.begin_write().await?;
        if let Some(table_id) = new.table_id {
            let found: Option<i64> = sqlx::query_scalar("SELECT id FROM dining_tables WHERE id = ?")
                .bind(table_id)
                .fetch_optional(&mut *tx)
                .await?;
            if found.is_none() {
                return Err(StoreError::not_found("table"));
            }
        }

        let order = insert_order(
            &mut tx,
            &OrderHeader {
                kind: new.kind,
                user_id: new.user_id,
                payment_method: new.payment_method,
                table_id: new.table_id,
                attendant_id,
                customer_name: new.customer_name,
                notes: new.notes,
            },
        )
        .await?;

        for item in &new.items {
            let product = fetch_product(&mut tx, item.product_id)
                .await?
                .ok_or_else(|| StoreError::not_found(format!("product {}", item.product_id)))?;
            insert_item(
                &mut tx,
                order.id,
                product.id,
                &product.name,
                item.quantity,
                item.unit_price_cents.unwrap_or(product.price_cents),
            )
            .await?;
        }

        let order = recalculate_totals(&mut tx, order.id).await?;
        let items = fetch_items(&mut tx, order.id).await?;
        tx.commit().await?;

        info!(order_id = order.id, number = %order.number, total = order.total_cents, "Order created");
        Ok(OrderWithItems { order, items })
    }

    pub async fn get(&self, id: i64) -> Result<Option<OrderWithItems>, StoreError> {
        let mut conn = self.db.pool().acquire().await?;
        let Some(order) = fetch_order(&mut conn, id).await? else {
            return Ok(None);
        };
        let items = fetch_items(&mut conn, id).await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    /// Orders newest first
    pub async fn list(&self, filter: OrderFilter) -> Result<Vec<OrderWithItems>, StoreError> {
        let limit = filter.limit.unwrap_or(50).clamp(1, 500);
        let offset = filter.offset.unwrap_or(0).max(0);
        let mut conn = self.db.pool().acquire().await?;
        let orders: Vec<Order> = sqlx::query_as(
            "SELECT * FROM orders
             WHERE (?1 IS NULL OR kind = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY id DESC LIMIT ?3 OFFSET ?4",
        )
        .bind(filter.kind)
        .bind(filter.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;
        with_items(&mut conn, orders).await
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<OrderWithItems>, StoreError> {
        let mut conn = self.db.pool().acquire().await?;
        let orders: Vec<Order> =
            sqlx::query_as("SELECT * FROM orders WHERE user_id = ? ORDER BY id DESC")
                .bind(user_id)
                .fetch_all(&mut *conn)
                .await?;
        with_items(&mut conn, orders).await
    }

    /// Move an order forward; a table's status follows its open order
    pub async fn update_status(
        &self,
        id: i64,
        status: OrderStatus,
    ) -> Result<OrderWithItems, StoreError> {
        let mut tx = self.db.begin_write().await?;
        if !lock_row(&mut tx, LockTable::Orders, id).await? {
            return Err(StoreError::not_found("order"));
        }
        let current = fetch_order(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found("order"))?;
        if !current.status.can_transition_to(status) {
            return Err(StoreError::InvalidState(format!(
                "cannot move order from {:?} to {:?}",
                current.status, status
            )));
        }
        // Stock for a table only leaves when the table is paid
        if current.table_id.is_some()
            && current.kind == OrderKind::Fisica
            && matches!(status, OrderStatus::Pago | OrderStatus::Entregue)
        {
            return Err(StoreError::InvalidState(format!(
                "order {} belongs to a table and is settled through the table payment",
                current.number
            )));
        }

        let order = set_status(&mut tx, id, status).await?;
        if let (Some(table_id), Some(table_status)) = (order.table_id, status.table_status()) {
            sqlx::query("UPDATE dining_tables SET status = ?, updated_at = ? WHERE id = ?")
                .bind(table_status)
                .bind(Utc::now())
                .bind(table_id)
                .execute(&mut *tx)
                .await?;
        }
        let items = fetch_items(&mut tx, id).await?;
        tx.commit().await?;

        info!(order_id = id, status = ?status, "Order status updated");
        Ok(OrderWithItems { order, items })
    }

    /// Add a line to an open in-person order. Stock is not touched, like
    /// [`OrderStore::create`]; table orders take their items through the table.
    pub async fn add_item(
        &self,
        id: i64,
        item: NewOrderItem,
    ) -> Result<OrderWithItems, StoreError> {
        if item.quantity <= 0 {
            return Err(StoreError::validation("quantity must be greater than zero"));
        }

        let mut tx = self.db.begin_write().await?;
        if !lock_row(&mut tx, LockTable::Orders, id).await? {
            return Err(StoreError::not_found("order"));
        }
        let order = fetch_order(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found("order"))?;
        if order.status.is_final() {
            return Err(StoreError::InvalidState(format!(
                "order {} is already {:?}",
                order.number, order.status
            )));
        }
        if order.kind == OrderKind::Online {
            return Err(StoreError::InvalidState(
                "online orders cannot be changed after checkout".to_string(),
            ));
        }
        if let Some(table_id) = order.table_id {
            return Err(StoreError::InvalidState(format!(
                "order {} belongs to table {}; add items through the table",
                order.number, table_id
            )));
        }

        let product = fetch_product(&mut tx, item.product_id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("product {}", item.product_id)))?;
        insert_item(
            &mut tx,
            order.id,
            product.id,
            &product.name,
            item.quantity,
            item.unit_price_cents.unwrap_or(product.price_cents),
        )
        .await?;

        let order = recalculate_totals(&mut tx, order.id).await?;
        let items = fetch_items(&mut tx, order.id).await?;
        tx.commit().await?;

        info!(order_id = order.id, total = order.total_cents, "Order item added");
        Ok(OrderWithItems { order, items })
    }

    pub async fn cancel(
        &self,
        id: i64,
        user_id: Option<i64>,
    ) -> Result<OrderWithItems, StoreError> {
        let mut tx = self.db.begin_write().await?;
        let order = cancel_in(&mut tx, id, user_id).await?;
        let items = fetch_items(&mut tx, id).await?;
        tx.commit().await?;
        Ok(OrderWithItems { order, items })
    }
}

async fn with_items(
    conn: &mut SqliteConnection,
    orders: Vec<Order>,
) -> Result<Vec<OrderWithItems>, StoreError> {
    let mut out = Vec::with_capacity(orders.len());
    for order in orders {
        let items = fetch_items(conn, order.id).await?;
        out.push(OrderWithItems { order, items });
    }
    Ok(out)
}
