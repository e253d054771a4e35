//! User accounts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{conflict_on_unique, Database, StoreError};
use crate::util::password::{hash_password, verify_password};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    /// Online shop customer
    Online,
    /// In-person staff (waiters, cashier)
    Fisica,
    Admin,
}

impl Role {
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Fisica | Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Online => "online",
            Role::Fisica => "fisica",
            Role::Admin => "admin",
        }
    }
}

/// Stored user
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// New user for insertion
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Derived from the email local part when absent
    pub username: Option<String>,
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
}

/// User store operations
#[derive(Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a user with a hashed password
    pub async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let email = new.email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(StoreError::validation("invalid email"));
        }
        if new.password.len() < 6 {
            return Err(StoreError::validation("password must have at least 6 characters"));
        }
        if new.name.trim().is_empty() {
            return Err(StoreError::validation("name is required"));
        }
        if self.get_by_email(&email).await?.is_some() {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }

        let username = match new.username {
            Some(u) if !u.trim().is_empty() => u.trim().to_string(),
            _ => self.available_username(username_from_email(&email)).await?,
        };

        let hash = hash_password(&new.password).map_err(|_| StoreError::PasswordHash)?;
        let now = Utc::now();

        sqlx::query_as::<_, User>(
            "INSERT INTO users (username, email, name, password_hash, role, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 1, ?, ?)
             RETURNING *",
        )
        .bind(&username)
        .bind(&email)
        .bind(new.name.trim())
        .bind(&hash)
        .bind(new.role)
        .bind(now)
        .bind(now)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| conflict_on_unique(e, "username or email already registered"))
    }

    /// First free username among `base`, `base-2`, `base-3`, ...
    async fn available_username(&self, base: String) -> Result<String, StoreError> {
        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.get_by_username(&candidate).await?.is_some() {
            candidate = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        Ok(candidate)
    }

    pub async fn get(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(self.db.pool())
            .await?)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.db.pool())
            .await?)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM users ORDER BY id LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(self.db.pool())
            .await?)
    }

    /// Delete by username, returns whether a row was removed
    pub async fn delete_by_username(&self, username: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE username = ?")
            .bind(username)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Check credentials. Inactive accounts never authenticate.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, StoreError> {
        let Some(user) = self.get_by_email(email).await? else {
            return Ok(None);
        };
        if !user.is_active || !verify_password(password, &user.password_hash) {
            return Ok(None);
        }

        let now = Utc::now();
        sqlx::query("UPDATE users SET last_login = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(user.id)
            .execute(self.db.pool())
            .await?;

        Ok(Some(User {
            last_login: Some(now),
            ..user
        }))
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.db.pool())
            .await?)
    }
}

/// Local part of an email, reduced to characters safe for a username
pub fn username_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let cleaned: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    if cleaned.is_empty() {
        "user".to_string()
    } else {
        cleaned
    }
}
