//! Product ratings; the product keeps the running average

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

use super::{Database, StoreError};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Rating {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatingInput {
    pub product_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
}

/// Average rounded to two decimals, zero without ratings
async fn refresh_product_rating(
    conn: &mut SqliteConnection,
    product_id: i64,
) -> Result<f64, StoreError> {
    let average: f64 = sqlx::query_scalar(
        "SELECT COALESCE(ROUND(AVG(rating), 2), 0.0) FROM ratings WHERE product_id = ?",
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;
    sqlx::query("UPDATE products SET rating = ?, updated_at = ? WHERE id = ?")
        .bind(average)
        .bind(Utc::now())
        .bind(product_id)
        .execute(&mut *conn)
        .await?;
    Ok(average)
}

/// Rating store operations
#[derive(Clone)]
pub struct RatingStore {
    db: Database,
}

impl RatingStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create or replace the user's rating for a product
    pub async fn upsert(&self, user_id: i64, input: RatingInput) -> Result<Rating, StoreError> {
        if !(1..=5).contains(&input.rating) {
            return Err(StoreError::validation("rating must be between 1 and 5"));
        }
        let mut tx = self.db.begin_write().await?;
        let product: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE id = ?")
            .bind(input.product_id)
            .fetch_optional(&mut *tx)
            .await?;
        if product.is_none() {
            return Err(StoreError::not_found("product"));
        }

        let now = Utc::now();
        let rating: Rating = sqlx::query_as(
            "INSERT INTO ratings (user_id, product_id, rating, comment, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, product_id) DO UPDATE SET
                rating = excluded.rating,
                comment = excluded.comment,
                updated_at = excluded.updated_at
             RETURNING *",
        )
        .bind(user_id)
        .bind(input.product_id)
        .bind(input.rating)
        .bind(&input.comment)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        refresh_product_rating(&mut tx, input.product_id).await?;
        tx.commit().await?;
        Ok(rating)
    }

    pub async fn delete(&self, user_id: i64, product_id: i64) -> Result<bool, StoreError> {
        let mut tx = self.db.begin_write().await?;
        let result = sqlx::query("DELETE FROM ratings WHERE user_id = ? AND product_id = ?")
            .bind(user_id)
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        refresh_product_rating(&mut tx, product_id).await?;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn list_for_product(&self, product_id: i64) -> Result<Vec<Rating>, StoreError> {
        Ok(sqlx::query_as(
            "SELECT * FROM ratings WHERE product_id = ? ORDER BY updated_at DESC, id DESC",
        )
        .bind(product_id)
        .fetch_all(self.db.pool())
        .await?)
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Rating>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM ratings WHERE user_id = ? ORDER BY updated_at DESC, id DESC")
            .bind(user_id)
            .fetch_all(self.db.pool())
            .await?)
    }
}
