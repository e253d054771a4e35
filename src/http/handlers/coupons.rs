//! Discount coupons

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::require_admin;
use crate::app::AppState;
use crate::http::middleware::AuthenticatedUser;
use crate::http::routes::AppError;
use crate::store::coupons::{Coupon, NewCoupon};

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    #[serde(default)]
    pub subtotal_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct CouponQuote {
    #[serde(flatten)]
    pub coupon: Coupon,
    pub discount_cents: i64,
    pub total_cents: i64,
}

pub async fn create_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<NewCoupon>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&auth)?;
    let coupon = state.coupons.create(req).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

pub async fn list_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<Coupon>>, AppError> {
    require_admin(&auth)?;
    Ok(Json(state.coupons.list().await?))
}

/// Check a code against a subtotal and quote the discount
pub async fn validate_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<ValidateQuery>,
) -> Result<Json<CouponQuote>, AppError> {
    let coupon = state
        .coupons
        .get_by_code(&code)
        .await?
        .ok_or_else(|| AppError::NotFound("coupon not found".to_string()))?;

    let subtotal = query.subtotal_cents.max(0);
    let discount = coupon
        .apply(subtotal, Utc::now())
        .map_err(|reason| AppError::BadRequest(reason.to_string()))?;

    Ok(Json(CouponQuote {
        coupon,
        discount_cents: discount,
        total_cents: subtotal - discount,
    }))
}
