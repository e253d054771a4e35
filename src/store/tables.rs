//! Dining tables and their open orders

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use tracing::info;

use super::orders::{
    cancel_in, fetch_items, insert_item, insert_order, recalculate_totals, set_status, Order,
    OrderHeader, OrderItem, OrderKind, OrderStatus,
};
use super::payments::{insert_payment, settle, NewPayment, Payment, PaymentStatus};
use super::products::fetch_product;
use super::reservations::{close_all, ensure_available, set_reserved, Holder, ReservationStatus};
use super::stock::{apply_movement, MovementKind, MovementOrigin, MovementRequest};
use super::{conflict_on_unique, lock_row, Database, LockTable, StoreError};
use crate::util::slug::generate_slug;
use crate::util::time::minutes_from;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum TableStatus {
    Livre,
    Ocupada,
    Preparando,
    Pronto,
    Finalizado,
}

impl TableStatus {
    /// Order status implied by setting the table to this status
    pub fn order_status(self) -> Option<OrderStatus> {
        match self {
            TableStatus::Ocupada => Some(OrderStatus::Pendente),
            TableStatus::Preparando => Some(OrderStatus::EmPreparo),
            TableStatus::Pronto => Some(OrderStatus::Pronto),
            TableStatus::Livre | TableStatus::Finalizado => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DiningTable {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub status: TableStatus,
    pub responsible_user_id: Option<i64>,
    pub capacity: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Table with the open order, as shown on the floor screen.
/// `order_id` is 0 when the table has no open order.
#[derive(Debug, Clone, Serialize)]
pub struct TableView {
    #[serde(flatten)]
    pub table: DiningTable,
    pub order_id: i64,
    pub order_number: Option<String>,
    pub order_status: Option<OrderStatus>,
    pub total_cents: i64,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTable {
    pub name: String,
    pub capacity: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableUpdate {
    pub name: Option<String>,
    pub capacity: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddTableItem {
    pub product_id: i64,
    pub quantity: i64,
    /// Overrides the catalog price (happy hour, courtesy)
    pub unit_price_cents: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TablePayment {
    pub method: String,
    pub discount_cents: Option<i64>,
    pub received_cents: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TablePaymentReceipt {
    pub ok: bool,
    pub payment_id: i64,
    pub payment: Payment,
    pub table: TableView,
}

/// Back to `Livre` with nobody responsible
pub async fn free_table(conn: &mut SqliteConnection, table_id: i64) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE dining_tables SET status = 'Livre', responsible_user_id = NULL, updated_at = ? WHERE id = ?",
    )
    .bind(Utc::now())
    .bind(table_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_table(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<DiningTable>, StoreError> {
    Ok(sqlx::query_as("SELECT * FROM dining_tables WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?)
}

/// Newest in-person order on the table that is still being served
async fn open_order(
    conn: &mut SqliteConnection,
    table_id: i64,
) -> Result<Option<Order>, StoreError> {
    Ok(sqlx::query_as(
        "SELECT * FROM orders
         WHERE table_id = ? AND kind = 'fisica' AND status IN ('Pendente', 'Em Preparo', 'Pronto')
         ORDER BY id DESC LIMIT 1",
    )
    .bind(table_id)
    .fetch_optional(&mut *conn)
    .await?)
}

async fn view_of(conn: &mut SqliteConnection, table: DiningTable) -> Result<TableView, StoreError> {
    match open_order(conn, table.id).await? {
        Some(order) => {
            let items = fetch_items(conn, order.id).await?;
            Ok(TableView {
                table,
                order_id: order.id,
                order_number: Some(order.number),
                order_status: Some(order.status),
                total_cents: order.total_cents,
                items,
            })
        }
        None => Ok(TableView {
            table,
            order_id: 0,
            order_number: None,
            order_status: None,
            total_cents: 0,
            items: Vec::new(),
        }),
    }
}

async fn view_by_id(conn: &mut SqliteConnection, id: i64) -> Result<TableView, StoreError> {
    let table = fetch_table(conn, id)
        .await?
        .ok_or_else(|| StoreError::not_found("table"))?;
    view_of(conn, table).await
}

/// Lock a table and return its open order
async fn lock_with_open_order(
    conn: &mut SqliteConnection,
    table_id: i64,
) -> Result<Order, StoreError> {
    if !lock_row(conn, LockTable::DiningTables, table_id).await? {
        return Err(StoreError::not_found("table"));
    }
    open_order(conn, table_id)
        .await?
        .ok_or_else(|| StoreError::not_found("open order for table"))
}

async fn ordered_quantity(
    conn: &mut SqliteConnection,
    order_id: i64,
    product_id: i64,
) -> Result<i64, StoreError> {
    Ok(sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0) FROM order_items WHERE order_id = ? AND product_id = ?",
    )
    .bind(order_id)
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?)
}

/// Table store operations
#[derive(Clone)]
pub struct TableStore {
    db: Database,
    reservation_minutes: i64,
}

impl TableStore {
    pub fn new(db: Database, reservation_hours: i64) -> Self {
        Self {
            db,
            reservation_minutes: reservation_hours.saturating_mul(60),
        }
    }

    pub async fn create(&self, new: NewTable) -> Result<DiningTable, StoreError> {
        let slug = generate_slug(&new.name);
        if slug.is_empty() {
            return Err(StoreError::validation("table name is required"));
        }
        let capacity = new.capacity.unwrap_or(4);
        if capacity <= 0 {
            return Err(StoreError::validation("capacity must be positive"));
        }

        let now = Utc::now();
        sqlx::query_as(
            "INSERT INTO dining_tables (name, slug, status, capacity, notes, created_at, updated_at)
             VALUES (?, ?, 'Livre', ?, ?, ?, ?) RETURNING *",
        )
        .bind(new.name.trim())
        .bind(&slug)
        .bind(capacity)
        .bind(&new.notes)
        .bind(now)
        .bind(now)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| conflict_on_unique(e, "a table with this name already exists"))
    }

    pub async fn list(&self) -> Result<Vec<TableView>, StoreError> {
        let mut conn = self.db.pool().acquire().await?;
        let tables: Vec<DiningTable> = sqlx::query_as("SELECT * FROM dining_tables ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;
        let mut views = Vec::with_capacity(tables.len());
        for table in tables {
            views.push(view_of(&mut conn, table).await?);
        }
        Ok(views)
    }

    pub async fn get(&self, id: i64) -> Result<Option<TableView>, StoreError> {
        let mut conn = self.db.pool().acquire().await?;
        match fetch_table(&mut conn, id).await? {
            Some(table) => Ok(Some(view_of(&mut conn, table).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<TableView>, StoreError> {
        let mut conn = self.db.pool().acquire().await?;
        let table: Option<DiningTable> =
            sqlx::query_as("SELECT * FROM dining_tables WHERE slug = ?")
                .bind(slug)
                .fetch_optional(&mut *conn)
                .await?;
        match table {
            Some(table) => Ok(Some(view_of(&mut conn, table).await?)),
            None => Ok(None),
        }
    }

    pub async fn update(&self, id: i64, update: TableUpdate) -> Result<TableView, StoreError> {
        let slug = match update.name.as_deref() {
            Some(name) => {
                let slug = generate_slug(name);
                if slug.is_empty() {
                    return Err(StoreError::validation("table name is required"));
                }
                Some(slug)
            }
            None => None,
        };
        if matches!(update.capacity, Some(c) if c <= 0) {
            return Err(StoreError::validation("capacity must be positive"));
        }

        let mut tx = self.db.begin_write().await?;
        let updated = sqlx::query(
            "UPDATE dining_tables SET
                name = COALESCE(?, name),
                slug = COALESCE(?, slug),
                capacity = COALESCE(?, capacity),
                notes = COALESCE(?, notes),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(update.name.as_deref().map(str::trim))
        .bind(&slug)
        .bind(update.capacity)
        .bind(&update.notes)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "a table with this name already exists"))?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::not_found("table"));
        }
        let view = view_by_id(&mut tx, id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Tables with an open order cannot be removed
    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut tx = self.db.begin_write().await?;
        if !lock_row(&mut tx, LockTable::DiningTables, id).await? {
            return Ok(false);
        }
        if open_order(&mut tx, id).await?.is_some() {
            return Err(StoreError::InvalidState("table has an open order".to_string()));
        }
        sqlx::query("DELETE FROM dining_tables WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Set the table status; the open order follows where a mapping exists
    pub async fn set_status(&self, id: i64, status: TableStatus) -> Result<TableView, StoreError> {
        let mut tx = self.db.begin_write().await?;
        if !lock_row(&mut tx, LockTable::DiningTables, id).await? {
            return Err(StoreError::not_found("table"));
        }
        let open = open_order(&mut tx, id).await?;
        if status == TableStatus::Livre && open.is_some() {
            return Err(StoreError::InvalidState(
                "table has an open order; pay or cancel it first".to_string(),
            ));
        }

        sqlx::query("UPDATE dining_tables SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if status == TableStatus::Livre {
            free_table(&mut tx, id).await?;
        }
        if let (Some(order), Some(order_status)) = (open, status.order_status()) {
            if order.status != order_status {
                set_status(&mut tx, order.id, order_status).await?;
            }
        }

        let view = view_by_id(&mut tx, id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Add a line to the table's open order, opening one if needed.
    ///
    /// The quantity is reserved against stock; it is only taken out of stock
    /// when the table pays.
    pub async fn add_item(
        &self,
        table_id: i64,
        req: AddTableItem,
        user_id: i64,
    ) -> Result<TableView, StoreError> {
        if req.quantity <= 0 {
            return Err(StoreError::validation("quantity must be greater than zero"));
        }
        let now = Utc::now();
        let mut tx = self.db.begin_write().await?;

        if !lock_row(&mut tx, LockTable::DiningTables, table_id).await? {
            return Err(StoreError::not_found("table"));
        }
        let order = match open_order(&mut tx, table_id).await? {
            Some(order) => order,
            None => {
                let order = insert_order(
                    &mut tx,
                    &OrderHeader {
                        kind: OrderKind::Fisica,
                        user_id: None,
                        payment_method: None,
                        table_id: Some(table_id),
                        attendant_id: Some(user_id),
                        customer_name: None,
                        notes: None,
                    },
                )
                .await?;
                sqlx::query(
                    "UPDATE dining_tables SET status = 'Ocupada', responsible_user_id = ?, updated_at = ? WHERE id = ?",
                )
                .bind(user_id)
                .bind(now)
                .bind(table_id)
                .execute(&mut *tx)
                .await?;
                info!(table_id, order_id = order.id, number = %order.number, "Table order opened");
                order
            }
        };

        if !lock_row(&mut tx, LockTable::Products, req.product_id).await? {
            return Err(StoreError::not_found("product"));
        }
        let product = fetch_product(&mut tx, req.product_id)
            .await?
            .ok_or_else(|| StoreError::not_found("product"))?;
        if !product.available {
            return Err(StoreError::InvalidState(format!(
                "product {} is not available",
                product.name
            )));
        }

        let holder = Holder::table_order(order.id, Some(user_id));
        let wanted = ordered_quantity(&mut tx, order.id, product.id)
            .await?
            .checked_add(req.quantity)
            .ok_or_else(|| StoreError::validation("quantity is too large"))?;
        ensure_available(&mut tx, product.id, product.stock, &holder, wanted, now).await?;
        set_reserved(
            &mut tx,
            product.id,
            &holder,
            wanted,
            minutes_from(now, self.reservation_minutes),
        )
        .await?;

        insert_item(
            &mut tx,
            order.id,
            product.id,
            &product.name,
            req.quantity,
            req.unit_price_cents.unwrap_or(product.price_cents),
        )
        .await?;
        recalculate_totals(&mut tx, order.id).await?;

        let view = view_by_id(&mut tx, table_id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Remove a line from the table's open order and shrink its reservation
    pub async fn remove_item(&self, table_id: i64, item_id: i64) -> Result<TableView, StoreError> {
        let mut tx = self.db.begin_write().await?;
        let order = lock_with_open_order(&mut tx, table_id).await?;

        let item: OrderItem = sqlx::query_as("SELECT * FROM order_items WHERE id = ? AND order_id = ?")
            .bind(item_id)
            .bind(order.id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("order item"))?;

        sqlx::query("DELETE FROM order_items WHERE id = ?")
            .bind(item.id)
            .execute(&mut *tx)
            .await?;

        if let Some(product_id) = item.product_id {
            let remaining = ordered_quantity(&mut tx, order.id, product_id).await?;
            set_reserved(
                &mut tx,
                product_id,
                &Holder::table_order(order.id, None),
                remaining,
                minutes_from(Utc::now(), self.reservation_minutes),
            )
            .await?;
        }
        recalculate_totals(&mut tx, order.id).await?;

        let view = view_by_id(&mut tx, table_id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Cancel the open order: reservations are released and the table freed
    pub async fn cancel(&self, table_id: i64, user_id: i64) -> Result<TableView, StoreError> {
        let mut tx = self.db.begin_write().await?;
        let order = lock_with_open_order(&mut tx, table_id).await?;
        cancel_in(&mut tx, order.id, Some(user_id)).await?;
        free_table(&mut tx, table_id).await?;
        let view = view_by_id(&mut tx, table_id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Settle the open order: stock leaves with `venda_fisica` movements,
    /// the order is delivered and the table is free again.
    pub async fn pay(
        &self,
        table_id: i64,
        req: TablePayment,
        user_id: i64,
    ) -> Result<TablePaymentReceipt, StoreError> {
        let method = req.method.trim().to_lowercase();
        if method.is_empty() {
            return Err(StoreError::validation("payment method is required"));
        }
        let discount = req.discount_cents.unwrap_or(0);
        if discount < 0 {
            return Err(StoreError::validation("discount cannot be negative"));
        }

        let mut tx = self.db.begin_write().await?;
        let order = lock_with_open_order(&mut tx, table_id).await?;
        let items = fetch_items(&mut tx, order.id).await?;
        if items.is_empty() {
            return Err(StoreError::validation("order has no items"));
        }

        for item in &items {
            let Some(product_id) = item.product_id else {
                continue;
            };
            apply_movement(
                &mut tx,
                MovementRequest {
                    product_id,
                    kind: MovementKind::Saida,
                    origin: MovementOrigin::VendaFisica,
                    quantity: item.quantity,
                    user_id: Some(user_id),
                    notes: Some(format!("Pedido {}", order.number)),
                    order_id: Some(order.id),
                },
            )
            .await?;
        }
        close_all(
            &mut tx,
            &Holder::table_order(order.id, None),
            ReservationStatus::Consumida,
            Some(order.id),
        )
        .await?;

        let order = recalculate_totals(&mut tx, order.id).await?;
        let total = (order.subtotal_cents - discount).max(0);
        let (received, change) = settle(total, &method, req.received_cents)?;

        let payment = insert_payment(
            &mut tx,
            &NewPayment {
                order_id: order.id,
                method: method.clone(),
                amount_cents: total,
                received_cents: received,
                change_cents: change,
                discount_cents: discount,
                status: PaymentStatus::Confirmado,
                provider_reference: None,
                notes: req.notes.clone(),
            },
        )
        .await?;

        sqlx::query(
            "UPDATE orders SET status = 'Entregue', discount_cents = ?, total_cents = ?, payment_method = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(discount)
        .bind(total)
        .bind(&method)
        .bind(Utc::now())
        .bind(order.id)
        .execute(&mut *tx)
        .await?;
        free_table(&mut tx, table_id).await?;

        let table = view_by_id(&mut tx, table_id).await?;
        tx.commit().await?;

        info!(
            table_id,
            order_id = order.id,
            total,
            change,
            method = %method,
            "Table paid"
        );
        Ok(TablePaymentReceipt {
            ok: true,
            payment_id: payment.id,
            payment,
            table,
        })
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM dining_tables")
            .fetch_one(self.db.pool())
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_status_drives_order_status() {
        assert_eq!(TableStatus::Ocupada.order_status(), Some(OrderStatus::Pendente));
        assert_eq!(TableStatus::Preparando.order_status(), Some(OrderStatus::EmPreparo));
        assert_eq!(TableStatus::Livre.order_status(), None);
        assert_eq!(TableStatus::Finalizado.order_status(), None);
    }
}
