//! Categories, companies and their invoices

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::Deserialize;

use super::{require_admin, require_staff, Deleted};
use crate::app::AppState;
use crate::http::middleware::AuthenticatedUser;
use crate::http::routes::AppError;
use crate::store::catalog::{
    Category, CategoryUpdate, Company, CompanyStatus, Invoice, NewCategory, NewCompany, NewInvoice,
};

// ============================================================================
// Categories
// ============================================================================

pub async fn list_categories_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, AppError> {
    Ok(Json(state.catalog.list_categories().await?))
}

pub async fn get_category_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Category>, AppError> {
    state
        .catalog
        .get_category(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("category not found".to_string()))
}

pub async fn create_category_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<NewCategory>,
) -> Result<impl IntoResponse, AppError> {
    require_staff(&auth)?;
    let category = state.catalog.create_category(req).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(req): Json<CategoryUpdate>,
) -> Result<Json<Category>, AppError> {
    require_staff(&auth)?;
    Ok(Json(state.catalog.update_category(id, req).await?))
}

pub async fn delete_category_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<Deleted>, AppError> {
    require_staff(&auth)?;
    if !state.catalog.delete_category(id).await? {
        return Err(AppError::NotFound("category not found".to_string()));
    }
    Ok(Json(Deleted::yes()))
}

// ============================================================================
// Companies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CompanyStatusRequest {
    pub status: CompanyStatus,
}

pub async fn list_companies_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Company>>, AppError> {
    Ok(Json(state.catalog.list_companies().await?))
}

pub async fn get_company_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Company>, AppError> {
    state
        .catalog
        .get_company(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("company not found".to_string()))
}

pub async fn create_company_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<NewCompany>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&auth)?;
    let company = state.catalog.create_company(req).await?;
    Ok((StatusCode::CREATED, Json(company)))
}

pub async fn set_company_status_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(req): Json<CompanyStatusRequest>,
) -> Result<Json<Company>, AppError> {
    require_admin(&auth)?;
    Ok(Json(state.catalog.set_company_status(id, req.status).await?))
}

pub async fn list_invoices_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(company_id): Path<i64>,
) -> Result<Json<Vec<Invoice>>, AppError> {
    require_staff(&auth)?;
    Ok(Json(state.catalog.list_invoices(company_id).await?))
}

pub async fn create_invoice_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(company_id): Path<i64>,
    Json(req): Json<NewInvoice>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&auth)?;
    let invoice = state.catalog.create_invoice(company_id, req).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}
