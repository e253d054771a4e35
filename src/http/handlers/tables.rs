//! Dining tables and their open orders

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::Deserialize;
use tracing::info;

use super::{require_staff, Deleted};
use crate::app::AppState;
use crate::http::middleware::AuthenticatedUser;
use crate::http::routes::AppError;
use crate::store::tables::{
    AddTableItem, NewTable, TablePayment, TablePaymentReceipt, TableStatus, TableUpdate, TableView,
};

#[derive(Debug, Deserialize)]
pub struct TableStatusRequest {
    pub status: TableStatus,
}

fn not_found() -> AppError {
    AppError::NotFound("table not found".to_string())
}

pub async fn list_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<TableView>>, AppError> {
    require_staff(&auth)?;
    Ok(Json(state.tables.list().await?))
}

pub async fn get_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<TableView>, AppError> {
    require_staff(&auth)?;
    state.tables.get(id).await?.map(Json).ok_or_else(not_found)
}

pub async fn get_by_slug_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(slug): Path<String>,
) -> Result<Json<TableView>, AppError> {
    require_staff(&auth)?;
    state
        .tables
        .get_by_slug(&slug)
        .await?
        .map(Json)
        .ok_or_else(not_found)
}

pub async fn create_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<NewTable>,
) -> Result<impl IntoResponse, AppError> {
    require_staff(&auth)?;
    let table = state.tables.create(req).await?;
    Ok((StatusCode::CREATED, Json(table)))
}

pub async fn update_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(req): Json<TableUpdate>,
) -> Result<Json<TableView>, AppError> {
    require_staff(&auth)?;
    Ok(Json(state.tables.update(id, req).await?))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<Deleted>, AppError> {
    require_staff(&auth)?;
    if !state.tables.delete(id).await? {
        return Err(not_found());
    }
    Ok(Json(Deleted::yes()))
}

pub async fn set_status_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(req): Json<TableStatusRequest>,
) -> Result<Json<TableView>, AppError> {
    require_staff(&auth)?;
    Ok(Json(state.tables.set_status(id, req.status).await?))
}

pub async fn add_item_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(req): Json<AddTableItem>,
) -> Result<Json<TableView>, AppError> {
    require_staff(&auth)?;
    let view = state.tables.add_item(id, req, auth.user_id).await?;
    info!(table_id = id, order_id = view.order_id, "Item added to table");
    Ok(Json(view))
}

pub async fn remove_item_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path((id, item_id)): Path<(i64, i64)>,
) -> Result<Json<TableView>, AppError> {
    require_staff(&auth)?;
    Ok(Json(state.tables.remove_item(id, item_id).await?))
}

pub async fn cancel_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<TableView>, AppError> {
    require_staff(&auth)?;
    let view = state.tables.cancel(id, auth.user_id).await?;
    info!(table_id = id, cancelled_by = auth.user_id, "Table order cancelled");
    Ok(Json(view))
}

pub async fn pay_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(req): Json<TablePayment>,
) -> Result<Json<TablePaymentReceipt>, AppError> {
    require_staff(&auth)?;
    Ok(Json(state.tables.pay(id, req, auth.user_id).await?))
}
