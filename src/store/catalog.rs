//! Categories, companies and their invoices

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{conflict_on_unique, Database, StoreError};
use crate::util::slug::url_slug;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CompanyStatus {
    Ativa,
    Inativa,
    Suspensa,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub cnpj: String,
    pub slug: String,
    pub status: CompanyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCompany {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub cnpj: String,
    pub slug: Option<String>,
}

/// Nota fiscal issued by a company
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Invoice {
    pub id: i64,
    pub company_id: i64,
    pub series: String,
    pub number: String,
    pub description: Option<String>,
    pub issued_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInvoice {
    #[serde(default = "default_series")]
    pub series: String,
    pub number: String,
    pub description: Option<String>,
    pub issued_on: Option<NaiveDate>,
}

fn default_true() -> bool {
    true
}

fn default_series() -> String {
    "1".to_string()
}

/// Catalog store operations (categories, companies, invoices)
#[derive(Clone)]
pub struct CatalogStore {
    db: Database,
}

impl CatalogStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // ------------------------------------------------------------------
    // Categories
    // ------------------------------------------------------------------

    pub async fn create_category(&self, new: NewCategory) -> Result<Category, StoreError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(StoreError::validation("category name is required"));
        }
        let now = Utc::now();
        sqlx::query_as(
            "INSERT INTO categories (name, description, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(name)
        .bind(&new.description)
        .bind(new.active)
        .bind(now)
        .bind(now)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| conflict_on_unique(e, "category already exists"))
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM categories ORDER BY name")
            .fetch_all(self.db.pool())
            .await?)
    }

    pub async fn get_category(&self, id: i64) -> Result<Option<Category>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    pub async fn update_category(
        &self,
        id: i64,
        update: CategoryUpdate,
    ) -> Result<Category, StoreError> {
        if matches!(&update.name, Some(n) if n.trim().is_empty()) {
            return Err(StoreError::validation("category name is required"));
        }
        sqlx::query_as(
            "UPDATE categories SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                active = COALESCE(?, active),
                updated_at = ?
             WHERE id = ? RETURNING *",
        )
        .bind(update.name.as_deref().map(str::trim))
        .bind(&update.description)
        .bind(update.active)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| conflict_on_unique(e, "category already exists"))?
        .ok_or_else(|| StoreError::not_found("category"))
    }

    /// Categories still referenced by products cannot be removed
    pub async fn delete_category(&self, id: i64) -> Result<bool, StoreError> {
        let in_use: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE category_id = ?")
            .bind(id)
            .fetch_one(self.db.pool())
            .await?;
        if in_use > 0 {
            return Err(StoreError::InvalidState(
                "category still has products".to_string(),
            ));
        }
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Companies
    // ------------------------------------------------------------------

    pub async fn create_company(&self, new: NewCompany) -> Result<Company, StoreError> {
        if new.name.trim().is_empty() || new.cnpj.trim().is_empty() {
            return Err(StoreError::validation("name and cnpj are required"));
        }
        let slug = match new.slug.as_deref().map(url_slug) {
            Some(s) if !s.is_empty() => s,
            _ => url_slug(&new.name),
        };
        if slug.is_empty() {
            return Err(StoreError::validation("company name produces an empty slug"));
        }

        let now = Utc::now();
        sqlx::query_as(
            "INSERT INTO companies (name, address, phone, email, cnpj, slug, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 'ativa', ?, ?) RETURNING *",
        )
        .bind(new.name.trim())
        .bind(&new.address)
        .bind(&new.phone)
        .bind(&new.email)
        .bind(new.cnpj.trim())
        .bind(&slug)
        .bind(now)
        .bind(now)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| conflict_on_unique(e, "company cnpj or slug already registered"))
    }

    pub async fn list_companies(&self) -> Result<Vec<Company>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM companies ORDER BY name")
            .fetch_all(self.db.pool())
            .await?)
    }

    pub async fn get_company(&self, id: i64) -> Result<Option<Company>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM companies WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    pub async fn set_company_status(
        &self,
        id: i64,
        status: CompanyStatus,
    ) -> Result<Company, StoreError> {
        sqlx::query_as("UPDATE companies SET status = ?, updated_at = ? WHERE id = ? RETURNING *")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| StoreError::not_found("company"))
    }

    // ------------------------------------------------------------------
    // Invoices
    // ------------------------------------------------------------------

    pub async fn create_invoice(
        &self,
        company_id: i64,
        new: NewInvoice,
    ) -> Result<Invoice, StoreError> {
        if self.get_company(company_id).await?.is_none() {
            return Err(StoreError::not_found("company"));
        }
        if new.number.trim().is_empty() {
            return Err(StoreError::validation("invoice number is required"));
        }
        let series = if new.series.trim().is_empty() {
            default_series()
        } else {
            new.series.trim().to_string()
        };

        sqlx::query_as(
            "INSERT INTO invoices (company_id, series, number, description, issued_on, created_at)
             VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(company_id)
        .bind(&series)
        .bind(new.number.trim())
        .bind(&new.description)
        .bind(new.issued_on.unwrap_or_else(|| Utc::now().date_naive()))
        .bind(Utc::now())
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| conflict_on_unique(e, "invoice number already used for this series"))
    }

    pub async fn list_invoices(&self, company_id: i64) -> Result<Vec<Invoice>, StoreError> {
        Ok(sqlx::query_as(
            "SELECT * FROM invoices WHERE company_id = ? ORDER BY issued_on DESC, id DESC",
        )
        .bind(company_id)
        .fetch_all(self.db.pool())
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_db;

    fn company(name: &str, cnpj: &str) -> NewCompany {
        NewCompany {
            name: name.to_string(),
            address: None,
            phone: None,
            email: None,
            cnpj: cnpj.to_string(),
            slug: None,
        }
    }

    #[tokio::test]
    async fn company_slug_is_generated() {
        let store = CatalogStore::new(test_db().await);
        let c = store
            .create_company(company("Choperia do Zé", "12345678000100"))
            .await
            .unwrap();
        assert_eq!(c.slug, "choperia-do-ze");
        assert_eq!(c.status, CompanyStatus::Ativa);
    }

    #[tokio::test]
    async fn invoice_numbers_are_unique_per_series() {
        let store = CatalogStore::new(test_db().await);
        let c = store.create_company(company("Bar", "1")).await.unwrap();
        let invoice = |series: &str| NewInvoice {
            series: series.to_string(),
            number: "100".to_string(),
            description: None,
            issued_on: None,
        };
        store.create_invoice(c.id, invoice("1")).await.unwrap();
        store.create_invoice(c.id, invoice("2")).await.unwrap();
        let err = store.create_invoice(c.id, invoice("1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.list_invoices(c.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn category_names_are_unique() {
        let store = CatalogStore::new(test_db().await);
        let new = || NewCategory {
            name: "CERVEJA".to_string(),
            description: None,
            active: true,
        };
        store.create_category(new()).await.unwrap();
        assert!(matches!(
            store.create_category(new()).await.unwrap_err(),
            StoreError::Conflict(_)
        ));
    }
}
