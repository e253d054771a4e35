//! Registration, login and session endpoints

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;
use crate::http::middleware::{
    sign_jwt, AuthenticatedUser, JwtClaims, MaybeUser, ACCESS_TOKEN_COOKIE,
};
use crate::http::routes::{AppError, SESSION_HEADER};
use crate::store::users::{NewUser, Role, User};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// Sign a token for the user and put it in the session cookie
fn issue_session(
    state: &AppState,
    jar: CookieJar,
    user: User,
) -> Result<(CookieJar, AuthResponse), AppError> {
    let minutes = state.config.jwt_exp_minutes;
    let claims = JwtClaims::for_user(&user, minutes);
    let token = sign_jwt(&claims, &state.config.jwt_secret)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let cookie = Cookie::parse(format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        ACCESS_TOKEN_COOKIE,
        token,
        minutes * 60
    ))
    .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        jar.add(cookie),
        AuthResponse {
            user,
            token,
            token_type: "bearer",
            expires_in: minutes * 60,
        },
    ))
}

/// Fold the visitor's anonymous cart into the account. Failures only cost the cart.
async fn merge_session_cart(state: &AppState, headers: &HeaderMap, user_id: i64) {
    let Some(session_id) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return;
    };

    if let Err(e) = state.carts.merge_session_into_user(session_id, user_id).await {
        warn!(user_id, error = %e, "Failed to merge session cart");
    }
}

/// Create an account. Only admins may hand out roles other than `online`.
pub async fn register_handler(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = match (req.role, caller.as_ref()) {
        (Some(role), Some(admin)) if admin.is_admin() => role,
        _ => Role::Online,
    };

    let user = state
        .users
        .create(NewUser {
            username: None,
            email: req.email,
            name: req.name,
            password: req.password,
            role,
        })
        .await?;

    info!(user_id = user.id, role = user.role.as_str(), "User registered");
    merge_session_cart(&state, &headers, user.id).await;

    let (jar, body) = issue_session(&state, jar, user)?;
    Ok((StatusCode::CREATED, jar, Json(body)))
}

pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !state.login_limiter.check(&req.email) {
        warn!(email = %req.email, "Login rate limit exceeded");
        return Err(AppError::TooManyRequests);
    }

    let user = state
        .users
        .authenticate(&req.email, &req.password)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    info!(user_id = user.id, "User logged in");
    merge_session_cart(&state, &headers, user.id).await;

    let (jar, body) = issue_session(&state, jar, user)?;
    Ok((jar, Json(body)))
}

pub async fn logout_handler(jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/"));
    (jar, Json(serde_json::json!({ "ok": true })))
}

pub async fn me_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<User>, AppError> {
    let user = state
        .users
        .get(auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;
    Ok(Json(user))
}

/// Current user, or a hint of where to authenticate
pub async fn status_handler(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(auth) = caller {
        if let Some(user) = state.users.get(auth.user_id).await? {
            return Ok(Json(serde_json::json!({
                "authenticated": true,
                "user": user,
            })));
        }
    }

    Ok(Json(serde_json::json!({
        "authenticated": false,
        "endpoints": {
            "register": "/auth/register",
            "login": "/auth/login",
            "logout": "/auth/logout",
            "me": "/auth/me",
        }
    })))
}
