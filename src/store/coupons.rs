//! Discount coupons

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

use super::{conflict_on_unique, Database, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CouponKind {
    /// `value` is a percentage of the subtotal
    Percentual,
    /// `value` is an amount in cents
    ValorFixo,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub kind: CouponKind,
    pub value: i64,
    pub min_order_cents: i64,
    pub active: bool,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub max_uses: i64,
    pub uses: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    pub name: String,
    pub kind: CouponKind,
    pub value: i64,
    #[serde(default)]
    pub min_order_cents: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: DateTime<Utc>,
    #[serde(default = "default_max_uses")]
    pub max_uses: i64,
}

fn default_max_uses() -> i64 {
    1
}

/// Why a coupon cannot be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CouponRejection {
    #[error("coupon is inactive")]
    Inactive,
    #[error("coupon is not valid yet")]
    NotStarted,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit reached")]
    Exhausted,
    #[error("order subtotal is below the coupon minimum")]
    BelowMinimum,
}

impl Coupon {
    /// Discount for a subtotal, never more than the subtotal itself
    pub fn discount_for(&self, subtotal_cents: i64) -> i64 {
        let raw = match self.kind {
            CouponKind::Percentual => subtotal_cents * self.value / 100,
            CouponKind::ValorFixo => self.value,
        };
        raw.clamp(0, subtotal_cents.max(0))
    }

    /// Discount if the coupon applies to this subtotal at `now`
    pub fn apply(&self, subtotal_cents: i64, now: DateTime<Utc>) -> Result<i64, CouponRejection> {
        if !self.active {
            return Err(CouponRejection::Inactive);
        }
        if now < self.starts_at {
            return Err(CouponRejection::NotStarted);
        }
        if now > self.ends_at {
            return Err(CouponRejection::Expired);
        }
        if self.uses >= self.max_uses {
            return Err(CouponRejection::Exhausted);
        }
        if subtotal_cents < self.min_order_cents {
            return Err(CouponRejection::BelowMinimum);
        }
        Ok(self.discount_for(subtotal_cents))
    }
}

pub async fn fetch_by_code(
    conn: &mut SqliteConnection,
    code: &str,
) -> Result<Option<Coupon>, StoreError> {
    Ok(sqlx::query_as("SELECT * FROM coupons WHERE code = ?")
        .bind(code.trim().to_uppercase())
        .fetch_optional(&mut *conn)
        .await?)
}

pub async fn increment_uses(conn: &mut SqliteConnection, coupon_id: i64) -> Result<(), StoreError> {
    sqlx::query("UPDATE coupons SET uses = uses + 1 WHERE id = ?")
        .bind(coupon_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Coupon store operations
#[derive(Clone)]
pub struct CouponStore {
    db: Database,
}

impl CouponStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: NewCoupon) -> Result<Coupon, StoreError> {
        let code = new.code.trim().to_uppercase();
        if code.is_empty() || new.name.trim().is_empty() {
            return Err(StoreError::validation("code and name are required"));
        }
        match new.kind {
            CouponKind::Percentual if !(1..=100).contains(&new.value) => {
                return Err(StoreError::validation("percentage must be between 1 and 100"));
            }
            CouponKind::ValorFixo if new.value <= 0 => {
                return Err(StoreError::validation("fixed discount must be positive"));
            }
            _ => {}
        }
        let now = Utc::now();
        let starts_at = new.starts_at.unwrap_or(now);
        if new.ends_at <= starts_at {
            return Err(StoreError::validation("coupon must end after it starts"));
        }
        if new.max_uses < 1 || new.min_order_cents < 0 {
            return Err(StoreError::validation("invalid usage limit or minimum"));
        }

        sqlx::query_as(
            "INSERT INTO coupons
                (code, name, kind, value, min_order_cents, active, starts_at, ends_at, max_uses, uses, created_at)
             VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?, 0, ?) RETURNING *",
        )
        .bind(&code)
        .bind(new.name.trim())
        .bind(new.kind)
        .bind(new.value)
        .bind(new.min_order_cents)
        .bind(starts_at)
        .bind(new.ends_at)
        .bind(new.max_uses)
        .bind(now)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| conflict_on_unique(e, "coupon code already exists"))
    }

    pub async fn list(&self) -> Result<Vec<Coupon>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM coupons ORDER BY id DESC")
            .fetch_all(self.db.pool())
            .await?)
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        let mut conn = self.db.pool().acquire().await?;
        fetch_by_code(&mut conn, code).await
    }
}
