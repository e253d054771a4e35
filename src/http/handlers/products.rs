//! Product catalog endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use tracing::info;

use super::{require_staff, Deleted};
use crate::app::AppState;
use crate::http::middleware::AuthenticatedUser;
use crate::http::routes::AppError;
use crate::store::products::{NewProduct, ProductFilter, ProductUpdate, ProductView};

fn not_found() -> AppError {
    AppError::NotFound("product not found".to_string())
}

pub async fn list_handler(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Vec<ProductView>>, AppError> {
    let products = state.products.list(filter).await?;
    Ok(Json(products.into_iter().map(ProductView::from).collect()))
}

pub async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ProductView>, AppError> {
    let product = state.products.get(id).await?.ok_or_else(not_found)?;
    Ok(Json(product.into()))
}

pub async fn get_by_slug_handler(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductView>, AppError> {
    let product = state
        .products
        .get_by_slug(&slug)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(product.into()))
}

pub async fn create_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<NewProduct>,
) -> Result<impl IntoResponse, AppError> {
    require_staff(&auth)?;

    let product = state.products.create(req, Some(auth.user_id)).await?;
    info!(product_id = product.id, stock = product.stock, "Product created");
    Ok((StatusCode::CREATED, Json(ProductView::from(product))))
}

pub async fn update_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(req): Json<ProductUpdate>,
) -> Result<Json<ProductView>, AppError> {
    require_staff(&auth)?;
    let product = state.products.update(id, req).await?;
    Ok(Json(product.into()))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<Deleted>, AppError> {
    require_staff(&auth)?;
    if !state.products.delete(id).await? {
        return Err(not_found());
    }
    info!(product_id = id, deleted_by = auth.user_id, "Product deleted");
    Ok(Json(Deleted::yes()))
}
