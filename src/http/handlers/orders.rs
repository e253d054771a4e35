//! Order management

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::Deserialize;

use super::require_staff;
use crate::app::AppState;
use crate::http::middleware::AuthenticatedUser;
use crate::http::routes::AppError;
use crate::store::orders::{
    NewOrder, NewOrderItem, OrderFilter, OrderKind, OrderStatus, OrderWithItems,
};
use crate::store::payments::Payment;

#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub status: OrderStatus,
}

fn not_found() -> AppError {
    AppError::NotFound("order not found".to_string())
}

/// Load an order the caller may see: staff see every order, customers their own
async fn visible_order(
    state: &AppState,
    auth: &AuthenticatedUser,
    id: i64,
) -> Result<OrderWithItems, AppError> {
    let order = state.orders.get(id).await?.ok_or_else(not_found)?;
    if auth.is_staff() || order.order.user_id == Some(auth.user_id) {
        Ok(order)
    } else {
        Err(not_found())
    }
}

pub async fn create_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<NewOrder>,
) -> Result<impl IntoResponse, AppError> {
    require_staff(&auth)?;
    let order = state.orders.create(req, Some(auth.user_id)).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Vec<OrderWithItems>>, AppError> {
    require_staff(&auth)?;
    Ok(Json(state.orders.list(filter).await?))
}

pub async fn mine_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<OrderWithItems>>, AppError> {
    Ok(Json(state.orders.list_for_user(auth.user_id).await?))
}

pub async fn get_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<OrderWithItems>, AppError> {
    Ok(Json(visible_order(&state, &auth, id).await?))
}

pub async fn add_item_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(req): Json<NewOrderItem>,
) -> Result<impl IntoResponse, AppError> {
    require_staff(&auth)?;
    let order = state.orders.add_item(id, req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn update_status_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(req): Json<OrderStatusRequest>,
) -> Result<Json<OrderWithItems>, AppError> {
    require_staff(&auth)?;
    Ok(Json(state.orders.update_status(id, req.status).await?))
}

/// Staff may cancel any open order; customers only their own unpaid online orders
pub async fn cancel_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<OrderWithItems>, AppError> {
    let current = visible_order(&state, &auth, id).await?;
    if !auth.is_staff() {
        let own_pending_online = current.order.kind == OrderKind::Online
            && current.order.status == OrderStatus::Pendente;
        if !own_pending_online {
            return Err(AppError::forbidden());
        }
    }

    Ok(Json(state.orders.cancel(id, Some(auth.user_id)).await?))
}

pub async fn payment_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<Payment>, AppError> {
    visible_order(&state, &auth, id).await?;
    state
        .payments
        .get_for_order(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("payment not found".to_string()))
}
