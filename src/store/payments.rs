//! Payments recorded against orders

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use tracing::{info, warn};

use super::orders::{cancel_in, fetch_order, set_status, OrderStatus};
use super::{conflict_on_unique, lock_row, Database, LockTable, StoreError};

/// Cash payments are the only ones that produce change
pub const CASH_METHOD: &str = "dinheiro";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum PaymentStatus {
    Pendente,
    Confirmado,
    Recusado,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub method: String,
    pub amount_cents: i64,
    pub received_cents: Option<i64>,
    pub change_cents: i64,
    pub discount_cents: i64,
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: i64,
    pub method: String,
    pub amount_cents: i64,
    pub received_cents: Option<i64>,
    pub change_cents: i64,
    pub discount_cents: i64,
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
    pub notes: Option<String>,
}

/// Amount received and change due for a settlement of `total`.
///
/// Cash must cover the total. Other methods are charged exactly the total.
pub fn settle(total: i64, method: &str, received: Option<i64>) -> Result<(Option<i64>, i64), StoreError> {
    if method == CASH_METHOD {
        let received = received.unwrap_or(total);
        if received < total {
            return Err(StoreError::validation(format!(
                "received amount {} is less than total {}",
                received, total
            )));
        }
        Ok((Some(received), received - total))
    } else {
        Ok((received, 0))
    }
}

pub async fn insert_payment(
    conn: &mut SqliteConnection,
    new: &NewPayment,
) -> Result<Payment, StoreError> {
    let now = Utc::now();
    sqlx::query_as(
        "INSERT INTO payments
            (order_id, method, amount_cents, received_cents, change_cents, discount_cents, status,
             provider_reference, notes, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(new.order_id)
    .bind(&new.method)
    .bind(new.amount_cents)
    .bind(new.received_cents)
    .bind(new.change_cents)
    .bind(new.discount_cents)
    .bind(new.status)
    .bind(&new.provider_reference)
    .bind(&new.notes)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| conflict_on_unique(e, "order already has a payment"))
}

async fn fetch_payment(
    conn: &mut SqliteConnection,
    order_id: i64,
) -> Result<Option<Payment>, StoreError> {
    Ok(sqlx::query_as("SELECT * FROM payments WHERE order_id = ?")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?)
}

async fn upsert_provider_payment(
    conn: &mut SqliteConnection,
    order_id: i64,
    amount_cents: i64,
    status: PaymentStatus,
    reference: &str,
) -> Result<(), StoreError> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO payments
            (order_id, method, amount_cents, change_cents, discount_cents, status, provider_reference, created_at, updated_at)
         VALUES (?, 'mercadopago', ?, 0, 0, ?, ?, ?, ?)
         ON CONFLICT(order_id) DO UPDATE SET
            status = excluded.status,
            amount_cents = excluded.amount_cents,
            provider_reference = excluded.provider_reference,
            updated_at = excluded.updated_at",
    )
    .bind(order_id)
    .bind(amount_cents)
    .bind(status)
    .bind(reference)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// What a provider notification did to the order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderOutcome {
    Confirmed,
    AlreadyConfirmed,
    Rejected,
    Ignored,
}

/// Payment store operations
#[derive(Clone)]
pub struct PaymentStore {
    db: Database,
}

impl PaymentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get_for_order(&self, order_id: i64) -> Result<Option<Payment>, StoreError> {
        let mut conn = self.db.pool().acquire().await?;
        fetch_payment(&mut conn, order_id).await
    }

    /// Record an approved provider payment. Safe to call repeatedly.
    pub async fn confirm_provider_payment(
        &self,
        order_id: i64,
        reference: &str,
        amount_cents: Option<i64>,
    ) -> Result<ProviderOutcome, StoreError> {
        let mut tx = self.db.begin_write().await?;
        if !lock_row(&mut tx, LockTable::Orders, order_id).await? {
            return Err(StoreError::not_found("order"));
        }
        let order = fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| StoreError::not_found("order"))?;

        if let Some(existing) = fetch_payment(&mut tx, order_id).await? {
            if existing.status == PaymentStatus::Confirmado {
                info!(order_id, "Payment already confirmed, skipping");
                return Ok(ProviderOutcome::AlreadyConfirmed);
            }
        }
        if order.status == OrderStatus::Cancelado {
            warn!(order_id, reference, "Approved payment for a cancelled order");
            return Ok(ProviderOutcome::Ignored);
        }

        upsert_provider_payment(
            &mut tx,
            order_id,
            amount_cents.unwrap_or(order.total_cents),
            PaymentStatus::Confirmado,
            reference,
        )
        .await?;
        if order.status == OrderStatus::Pendente {
            set_status(&mut tx, order_id, OrderStatus::Pago).await?;
        }
        tx.commit().await?;

        info!(order_id, reference, "Payment confirmed");
        Ok(ProviderOutcome::Confirmed)
    }

    /// Record a rejected provider payment and cancel the order, returning its stock
    pub async fn reject_provider_payment(
        &self,
        order_id: i64,
        reference: &str,
    ) -> Result<ProviderOutcome, StoreError> {
        let mut tx = self.db.begin_write().await?;
        if !lock_row(&mut tx, LockTable::Orders, order_id).await? {
            return Err(StoreError::not_found("order"));
        }
        let order = fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| StoreError::not_found("order"))?;

        if let Some(existing) = fetch_payment(&mut tx, order_id).await? {
            if existing.status == PaymentStatus::Confirmado {
                warn!(order_id, reference, "Rejection received after confirmation, ignoring");
                return Ok(ProviderOutcome::Ignored);
            }
        }

        upsert_provider_payment(
            &mut tx,
            order_id,
            order.total_cents,
            PaymentStatus::Recusado,
            reference,
        )
        .await?;
        if !order.status.is_final() {
            cancel_in(&mut tx, order_id, None).await?;
        }
        tx.commit().await?;

        info!(order_id, reference, "Payment rejected");
        Ok(ProviderOutcome::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cash_returns_change() {
        assert_eq!(settle(1000, "dinheiro", Some(1500)).unwrap(), (Some(1500), 500));
        assert_eq!(settle(1000, "dinheiro", None).unwrap(), (Some(1000), 0));
        assert!(matches!(
            settle(1000, "dinheiro", Some(999)),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn card_has_no_change() {
        assert_eq!(settle(1000, "cartao", Some(2000)).unwrap(), (Some(2000), 0));
        assert_eq!(settle(1000, "pix", None).unwrap(), (None, 0));
    }
}
