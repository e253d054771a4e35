//! Product ratings

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};

use super::Deleted;
use crate::app::AppState;
use crate::http::middleware::AuthenticatedUser;
use crate::http::routes::AppError;
use crate::store::ratings::{Rating, RatingInput};

pub async fn upsert_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<RatingInput>,
) -> Result<Json<Rating>, AppError> {
    Ok(Json(state.ratings.upsert(auth.user_id, req).await?))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(product_id): Path<i64>,
) -> Result<Json<Deleted>, AppError> {
    if !state.ratings.delete(auth.user_id, product_id).await? {
        return Err(AppError::NotFound("rating not found".to_string()));
    }
    Ok(Json(Deleted::yes()))
}

pub async fn list_for_product_handler(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> Result<Json<Vec<Rating>>, AppError> {
    Ok(Json(state.ratings.list_for_product(product_id).await?))
}

pub async fn list_mine_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<Rating>>, AppError> {
    Ok(Json(state.ratings.list_for_user(auth.user_id).await?))
}
