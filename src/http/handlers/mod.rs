//! Request handlers grouped by resource

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod coupons;
pub mod favorites;
pub mod orders;
pub mod payments;
pub mod products;
pub mod ratings;
pub mod stock;
pub mod tables;
pub mod users;

use serde::{Deserialize, Serialize};

use crate::http::middleware::AuthenticatedUser;
use crate::http::routes::AppError;

/// Waiters, cashiers and admins
pub fn require_staff(auth: &AuthenticatedUser) -> Result<(), AppError> {
    if auth.is_staff() {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

pub fn require_admin(auth: &AuthenticatedUser) -> Result<(), AppError> {
    if auth.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Body returned by delete endpoints
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

impl Deleted {
    pub fn yes() -> Self {
        Self { deleted: true }
    }
}
