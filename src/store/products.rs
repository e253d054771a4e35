//! Product catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

use super::stock::{apply_movement, MovementKind, MovementOrigin, MovementRequest};
use super::{conflict_on_unique, Database, StoreError};
use crate::util::slug::url_slug;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category_id: i64,
    pub company_id: Option<i64>,
    pub description: Option<String>,
    pub cost_cents: i64,
    pub price_cents: i64,
    pub code: String,
    pub stock: i64,
    pub available: bool,
    pub image: Option<String>,
    pub slug: String,
    pub style: Option<String>,
    pub abv: Option<f64>,
    pub ibu: Option<i64>,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn in_stock(&self) -> bool {
        self.available && self.stock > 0
    }
}

/// Product as returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub in_stock: bool,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        let in_stock = product.in_stock();
        Self { product, in_stock }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub category_id: i64,
    pub company_id: Option<i64>,
    pub description: Option<String>,
    #[serde(default)]
    pub cost_cents: i64,
    pub price_cents: i64,
    pub code: String,
    #[serde(default)]
    pub stock: i64,
    #[serde(default = "default_true")]
    pub available: bool,
    pub image: Option<String>,
    pub style: Option<String>,
    pub abv: Option<f64>,
    pub ibu: Option<i64>,
}

/// Partial update; stock only changes through movements
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub category_id: Option<i64>,
    pub company_id: Option<i64>,
    pub description: Option<String>,
    pub cost_cents: Option<i64>,
    pub price_cents: Option<i64>,
    pub code: Option<String>,
    pub available: Option<bool>,
    pub image: Option<String>,
    pub style: Option<String>,
    pub abv: Option<f64>,
    pub ibu: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub category_id: Option<i64>,
    pub available: Option<bool>,
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn default_true() -> bool {
    true
}

/// Load a product inside a transaction
pub async fn fetch_product(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Product>, StoreError> {
    Ok(sqlx::query_as("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?)
}

async fn exists(conn: &mut SqliteConnection, table: &str, id: i64) -> Result<bool, StoreError> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", table);
    let count: i64 = sqlx::query_scalar(&sql).bind(id).fetch_one(&mut *conn).await?;
    Ok(count > 0)
}

/// First free slug among `base`, `base-2`, `base-3`, ...
async fn unique_slug(conn: &mut SqliteConnection, base: &str) -> Result<String, StoreError> {
    let mut candidate = base.to_string();
    let mut suffix = 2;
    loop {
        let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE slug = ?")
            .bind(&candidate)
            .fetch_one(&mut *conn)
            .await?;
        if taken == 0 {
            return Ok(candidate);
        }
        candidate = format!("{}-{}", base, suffix);
        suffix += 1;
    }
}

/// Product store operations
#[derive(Clone)]
pub struct ProductStore {
    db: Database,
}

impl ProductStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a product. Initial stock is recorded as a `produto_cadastro` entry.
    pub async fn create(
        &self,
        new: NewProduct,
        user_id: Option<i64>,
    ) -> Result<Product, StoreError> {
        self.create_with_origin(new, user_id, MovementOrigin::ProdutoCadastro)
            .await
    }

    pub(crate) async fn create_with_origin(
        &self,
        new: NewProduct,
        user_id: Option<i64>,
        origin: MovementOrigin,
    ) -> Result<Product, StoreError> {
        let name = new.name.trim();
        if name.is_empty() || new.code.trim().is_empty() {
            return Err(StoreError::validation("name and code are required"));
        }
        if new.price_cents < 0 || new.cost_cents < 0 || new.stock < 0 {
            return Err(StoreError::validation("price, cost and stock cannot be negative"));
        }
        let base_slug = url_slug(name);
        if base_slug.is_empty() {
            return Err(StoreError::validation("product name produces an empty slug"));
        }

        let mut tx = self.db.begin_write().await?;

        if !exists(&mut tx, "categories", new.category_id).await? {
            return Err(StoreError::not_found("category"));
        }
        if let Some(company_id) = new.company_id {
            if !exists(&mut tx, "companies", company_id).await? {
                return Err(StoreError::not_found("company"));
            }
        }

        let slug = unique_slug(&mut tx, &base_slug).await?;
        let now = Utc::now();
        let product: Product = sqlx::query_as(
            "INSERT INTO products
                (name, category_id, company_id, description, cost_cents, price_cents, code, stock,
                 available, image, slug, style, abv, ibu, rating, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, 0, ?, ?) RETURNING *",
        )
        .bind(name)
        .bind(new.category_id)
        .bind(new.company_id)
        .bind(&new.description)
        .bind(new.cost_cents)
        .bind(new.price_cents)
        .bind(new.code.trim())
        .bind(new.available)
        .bind(&new.image)
        .bind(&slug)
        .bind(&new.style)
        .bind(new.abv)
        .bind(new.ibu)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "product code already registered"))?;

        let product = if new.stock > 0 {
            apply_movement(
                &mut tx,
                MovementRequest {
                    product_id: product.id,
                    kind: MovementKind::Entrada,
                    origin,
                    quantity: new.stock,
                    user_id,
                    notes: Some("Estoque inicial".to_string()),
                    order_id: None,
                },
            )
            .await?;
            fetch_product(&mut tx, product.id)
                .await?
                .ok_or_else(|| StoreError::not_found("product"))?
        } else {
            product
        };

        tx.commit().await?;
        Ok(product)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Product>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM products WHERE slug = ?")
            .bind(slug)
            .fetch_optional(self.db.pool())
            .await?)
    }

    pub async fn list(&self, filter: ProductFilter) -> Result<Vec<Product>, StoreError> {
        let limit = filter.limit.unwrap_or(100).clamp(1, 500);
        let offset = filter.offset.unwrap_or(0).max(0);
        let pattern = filter
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", q));

        Ok(sqlx::query_as(
            "SELECT * FROM products
             WHERE (?1 IS NULL OR category_id = ?1)
               AND (?2 IS NULL OR available = ?2)
               AND (?3 IS NULL OR name LIKE ?3)
             ORDER BY name LIMIT ?4 OFFSET ?5",
        )
        .bind(filter.category_id)
        .bind(filter.available)
        .bind(pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.db.pool())
        .await?)
    }

    pub async fn update(&self, id: i64, update: ProductUpdate) -> Result<Product, StoreError> {
        if matches!(update.price_cents, Some(p) if p < 0) || matches!(update.cost_cents, Some(c) if c < 0) {
            return Err(StoreError::validation("price and cost cannot be negative"));
        }
        if matches!(&update.name, Some(n) if n.trim().is_empty()) {
            return Err(StoreError::validation("name cannot be empty"));
        }

        let mut tx = self.db.begin_write().await?;
        if let Some(category_id) = update.category_id {
            if !exists(&mut tx, "categories", category_id).await? {
                return Err(StoreError::not_found("category"));
            }
        }
        if let Some(company_id) = update.company_id {
            if !exists(&mut tx, "companies", company_id).await? {
                return Err(StoreError::not_found("company"));
            }
        }

        let product: Product = sqlx::query_as(
            "UPDATE products SET
                name = COALESCE(?, name),
                category_id = COALESCE(?, category_id),
                company_id = COALESCE(?, company_id),
                description = COALESCE(?, description),
                cost_cents = COALESCE(?, cost_cents),
                price_cents = COALESCE(?, price_cents),
                code = COALESCE(?, code),
                available = COALESCE(?, available),
                image = COALESCE(?, image),
                style = COALESCE(?, style),
                abv = COALESCE(?, abv),
                ibu = COALESCE(?, ibu),
                updated_at = ?
             WHERE id = ? RETURNING *",
        )
        .bind(update.name.as_deref().map(str::trim))
        .bind(update.category_id)
        .bind(update.company_id)
        .bind(&update.description)
        .bind(update.cost_cents)
        .bind(update.price_cents)
        .bind(update.code.as_deref().map(str::trim))
        .bind(update.available)
        .bind(&update.image)
        .bind(&update.style)
        .bind(update.abv)
        .bind(update.ibu)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "product code already registered"))?
        .ok_or_else(|| StoreError::not_found("product"))?;

        tx.commit().await?;
        Ok(product)
    }

    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(self.db.pool())
            .await?)
    }
}
