//! Per-user favorite products

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::products::{Product, ProductView};
use super::{Database, StoreError};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Favorite {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Favorite joined with its product
#[derive(Debug, Clone, Serialize)]
pub struct FavoriteView {
    pub id: i64,
    pub product_id: i64,
    pub created_at: DateTime<Utc>,
    pub product: ProductView,
}

/// Favorite store operations
#[derive(Clone)]
pub struct FavoriteStore {
    db: Database,
}

impl FavoriteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Idempotent: adding twice returns the same row
    pub async fn add(&self, user_id: i64, product_id: i64) -> Result<Favorite, StoreError> {
        let mut tx = self.db.begin_write().await?;
        let product: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;
        if product.is_none() {
            return Err(StoreError::not_found("product"));
        }

        sqlx::query(
            "INSERT INTO favorites (user_id, product_id, created_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id, product_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let favorite = sqlx::query_as("SELECT * FROM favorites WHERE user_id = ? AND product_id = ?")
            .bind(user_id)
            .bind(product_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(favorite)
    }

    pub async fn list(&self, user_id: i64) -> Result<Vec<FavoriteView>, StoreError> {
        let mut conn = self.db.pool().acquire().await?;
        let favorites: Vec<Favorite> =
            sqlx::query_as("SELECT * FROM favorites WHERE user_id = ? ORDER BY created_at DESC, id DESC")
                .bind(user_id)
                .fetch_all(&mut *conn)
                .await?;

        let mut views = Vec::with_capacity(favorites.len());
        for favorite in favorites {
            let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id = ?")
                .bind(favorite.product_id)
                .fetch_optional(&mut *conn)
                .await?;
            if let Some(product) = product {
                views.push(FavoriteView {
                    id: favorite.id,
                    product_id: favorite.product_id,
                    created_at: favorite.created_at,
                    product: product.into(),
                });
            }
        }
        Ok(views)
    }

    pub async fn remove(&self, user_id: i64, product_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND product_id = ?")
            .bind(user_id)
            .bind(product_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
