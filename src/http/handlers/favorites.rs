//! Favorite products of the current user

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::Deserialize;

use super::Deleted;
use crate::app::AppState;
use crate::http::middleware::AuthenticatedUser;
use crate::http::routes::AppError;
use crate::store::favorites::FavoriteView;

#[derive(Debug, Deserialize)]
pub struct AddFavoriteRequest {
    pub product_id: i64,
}

pub async fn list_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<FavoriteView>>, AppError> {
    Ok(Json(state.favorites.list(auth.user_id).await?))
}

pub async fn add_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<AddFavoriteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let favorite = state.favorites.add(auth.user_id, req.product_id).await?;
    Ok((StatusCode::CREATED, Json(favorite)))
}

pub async fn remove_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(product_id): Path<i64>,
) -> Result<Json<Deleted>, AppError> {
    if !state.favorites.remove(auth.user_id, product_id).await? {
        return Err(AppError::NotFound("favorite not found".to_string()));
    }
    Ok(Json(Deleted::yes()))
}
