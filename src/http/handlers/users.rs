//! Account administration

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::Deserialize;
use tracing::info;

use super::{require_admin, Deleted, Pagination};
use crate::app::AppState;
use crate::http::middleware::AuthenticatedUser;
use crate::http::routes::AppError;
use crate::store::users::{NewUser, Role, User};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: Option<String>,
    pub email: String,
    pub name: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Online
}

pub async fn create_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&auth)?;

    let user = state
        .users
        .create(NewUser {
            username: req.username,
            email: req.email,
            name: req.name,
            password: req.password,
            role: req.role,
        })
        .await?;

    info!(user_id = user.id, created_by = auth.user_id, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<User>>, AppError> {
    require_admin(&auth)?;
    let limit = page.limit.unwrap_or(100).clamp(1, 500);
    let offset = page.offset.unwrap_or(0).max(0);
    Ok(Json(state.users.list(limit, offset).await?))
}

/// Users may read their own account, admins any account
pub async fn get_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(username): Path<String>,
) -> Result<Json<User>, AppError> {
    let user = state.users.get_by_username(&username).await?;

    match user {
        Some(user) if auth.is_admin() || user.id == auth.user_id => Ok(Json(user)),
        None if auth.is_admin() => Err(AppError::NotFound("user not found".to_string())),
        _ => Err(AppError::forbidden()),
    }
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(username): Path<String>,
) -> Result<Json<Deleted>, AppError> {
    require_admin(&auth)?;

    if !state.users.delete_by_username(&username).await? {
        return Err(AppError::NotFound("user not found".to_string()));
    }
    info!(username = %username, deleted_by = auth.user_id, "User deleted");
    Ok(Json(Deleted::yes()))
}
