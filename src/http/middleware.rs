//! Authentication middleware, session tokens and role guards

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use axum_extra::extract::cookie::CookieJar;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::warn;

use crate::app::AppState;
use crate::store::users::{Role, User};
use crate::util::time::unix_secs;

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Session token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: i64,
    pub email: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl JwtClaims {
    pub fn for_user(user: &User, lifetime_minutes: i64) -> Self {
        let now = unix_secs();
        Self {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: now + lifetime_minutes * 60,
        }
    }
}

fn signature(message: &str, secret: &str) -> Result<Vec<u8>, AuthError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Sign claims as an HS256 JWT
pub fn sign_jwt(claims: &JwtClaims, secret: &str) -> Result<String, AuthError> {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload_json = serde_json::to_vec(claims).map_err(|_| AuthError::InvalidToken)?;
    let payload = URL_SAFE_NO_PAD.encode(payload_json);

    let message = format!("{}.{}", header, payload);
    let sig = URL_SAFE_NO_PAD.encode(signature(&message, secret)?);
    Ok(format!("{}.{}", message, sig))
}

/// Verify a JWT token and extract claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<JwtClaims, AuthError> {
    // Split token into parts
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::InvalidToken);
    }

    let header_b64 = parts[0];
    let payload_b64 = parts[1];
    let signature_b64 = parts[2];

    // Verify signature (HMAC-SHA256)
    let message = format!("{}.{}", header_b64, payload_b64);
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(message.as_bytes());

    let provided_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    mac.verify_slice(&provided_signature)
        .map_err(|_| AuthError::InvalidToken)?;

    // Decode payload
    let payload_json = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;

    let claims: JwtClaims =
        serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidToken)?;

    if claims.exp < unix_secs() {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

/// Extract JWT from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Session token from the cookie, falling back to the Authorization header
pub fn token_from_parts(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(ACCESS_TOKEN_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
        .map(str::to_string)
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("User not found or inactive")]
    UnknownUser,

    #[error("Authentication backend unavailable")]
    Backend,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::MissingToken => StatusCode::UNAUTHORIZED,
            AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
            AuthError::UnknownUser => StatusCode::UNAUTHORIZED,
            AuthError::Backend => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// The caller, resolved from a valid session token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Verify the token and load the user it names.
/// Deleted or deactivated accounts are rejected even with a valid token.
async fn resolve_user(state: &AppState, parts: &Parts) -> Result<AuthenticatedUser, AuthError> {
    let token = token_from_parts(parts).ok_or(AuthError::MissingToken)?;
    let claims = verify_jwt(&token, &state.config.jwt_secret)?;

    let user = state
        .users
        .get(claims.sub)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to load user for token");
            AuthError::Backend
        })?
        .filter(|u| u.is_active)
        .ok_or(AuthError::UnknownUser)?;

    Ok(AuthenticatedUser {
        user_id: user.id,
        email: user.email,
        role: user.role,
    })
}

/// Middleware to require authentication
pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let (mut parts, body) = request.into_parts();
    let auth_user = resolve_user(&state, &parts).await?;

    // Insert into request extensions for handlers to access
    parts.extensions.insert(auth_user);

    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Caller if a valid session is present, for routes open to visitors
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(MaybeUser(Some(user.clone())));
        }
        match resolve_user(state, parts).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AuthError::Backend) => Err(AuthError::Backend),
            Err(_) => Ok(MaybeUser(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp_offset: i64) -> JwtClaims {
        let now = unix_secs();
        JwtClaims {
            sub: 7,
            email: "ana@example.com".to_string(),
            role: Role::Fisica,
            iat: now,
            exp: now + exp_offset,
        }
    }

    #[test]
    fn sign_then_verify() {
        let token = sign_jwt(&claims(60), "secret").unwrap();
        let decoded = verify_jwt(&token, "secret").unwrap();
        assert_eq!(decoded.sub, 7);
        assert_eq!(decoded.role, Role::Fisica);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign_jwt(&claims(60), "secret").unwrap();
        assert!(matches!(verify_jwt(&token, "other"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let token = sign_jwt(&claims(60), "secret").unwrap();
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        let mut forged = claims(60);
        forged.role = Role::Admin;
        parts[1] = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        assert!(matches!(
            verify_jwt(&parts.join("."), "secret"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = sign_jwt(&claims(-10), "secret").unwrap();
        assert!(matches!(verify_jwt(&token, "secret"), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(verify_jwt("abc", "secret").is_err());
        assert!(verify_jwt("a.b.c", "secret").is_err());
        assert_eq!(extract_bearer_token("Bearer xyz"), Some("xyz"));
        assert_eq!(extract_bearer_token("Basic xyz"), None);
    }
}
