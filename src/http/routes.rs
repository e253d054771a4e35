//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{delete, get, patch, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::error;

use crate::app::AppState;
use crate::http::handlers::{
    auth, cart, catalog, coupons, favorites, orders, payments, products, ratings, stock, tables,
    users,
};
use crate::http::middleware::require_auth;
use crate::payments::webhook::mercado_pago_webhook_handler;
use crate::store::StoreError;
use crate::util::time::uptime_secs;

/// Header carrying the anonymous cart session
pub const SESSION_HEADER: &str = "x-session-id";

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(SESSION_HEADER),
        ])
        .allow_credentials(true);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .route("/auth", get(auth::status_handler))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/categories", get(catalog::list_categories_handler))
        .route("/categories/:id", get(catalog::get_category_handler))
        .route("/companies", get(catalog::list_companies_handler))
        .route("/companies/:id", get(catalog::get_company_handler))
        .route("/products", get(products::list_handler))
        .route("/products/:id", get(products::get_handler))
        .route("/products/slug/:slug", get(products::get_by_slug_handler))
        .route("/products/:id/ratings", get(ratings::list_for_product_handler))
        .route("/cart", get(cart::view_handler))
        .route("/cart/session", post(cart::new_session_handler))
        .route("/cart/items", post(cart::add_item_handler))
        .route(
            "/cart/items/:id",
            patch(cart::update_item_handler).delete(cart::remove_item_handler),
        )
        .route("/cart/clear", post(cart::clear_handler))
        .route("/webhooks/mercadopago", post(mercado_pago_webhook_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route("/users", get(users::list_handler).post(users::create_handler))
        .route(
            "/users/:username",
            get(users::get_handler).delete(users::delete_handler),
        )
        .route("/categories", post(catalog::create_category_handler))
        .route(
            "/categories/:id",
            axum::routing::put(catalog::update_category_handler)
                .delete(catalog::delete_category_handler),
        )
        .route("/companies", post(catalog::create_company_handler))
        .route("/companies/:id/status", patch(catalog::set_company_status_handler))
        .route(
            "/companies/:id/invoices",
            get(catalog::list_invoices_handler).post(catalog::create_invoice_handler),
        )
        .route("/products", post(products::create_handler))
        .route(
            "/products/:id",
            axum::routing::put(products::update_handler).delete(products::delete_handler),
        )
        .route("/tables", get(tables::list_handler).post(tables::create_handler))
        .route(
            "/tables/:id",
            get(tables::get_handler)
                .put(tables::update_handler)
                .delete(tables::delete_handler),
        )
        .route("/tables/slug/:slug", get(tables::get_by_slug_handler))
        .route("/tables/:id/status", patch(tables::set_status_handler))
        .route("/tables/:id/items", post(tables::add_item_handler))
        .route("/tables/:id/items/:item_id", delete(tables::remove_item_handler))
        .route("/tables/:id/cancel", post(tables::cancel_handler))
        .route("/tables/:id/payment", post(tables::pay_handler))
        .route("/orders", get(orders::list_handler).post(orders::create_handler))
        .route("/orders/mine", get(orders::mine_handler))
        .route("/orders/:id", get(orders::get_handler))
        .route("/orders/:id/items", post(orders::add_item_handler))
        .route("/orders/:id/status", patch(orders::update_status_handler))
        .route("/orders/:id/cancel", post(orders::cancel_handler))
        .route("/orders/:id/payment", get(orders::payment_handler))
        .route(
            "/stock/movements",
            get(stock::list_movements_handler).post(stock::create_movement_handler),
        )
        .route("/stock/reservations", get(stock::list_reservations_handler))
        .route("/cart/checkout", post(cart::checkout_handler))
        .route("/favorites", get(favorites::list_handler).post(favorites::add_handler))
        .route("/favorites/:product_id", delete(favorites::remove_handler))
        .route("/ratings", post(ratings::upsert_handler))
        .route("/ratings/mine", get(ratings::list_mine_handler))
        .route("/ratings/:product_id", delete(ratings::delete_handler))
        .route("/coupons", get(coupons::list_handler).post(coupons::create_handler))
        .route("/coupons/:code", get(coupons::validate_handler))
        .route(
            "/payments/mercadopago/preference",
            post(payments::create_preference_handler),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoints
// ============================================================================

async fn ping_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    database: &'static str,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = if state.db.ping().await { "ok" } else { "error" };

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        database,
    })
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn forbidden() -> Self {
        AppError::Forbidden("insufficient permissions".to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            StoreError::Conflict(msg) | StoreError::InvalidState(msg) => AppError::Conflict(msg),
            e @ StoreError::InsufficientStock { .. } => AppError::Conflict(e.to_string()),
            StoreError::Validation(msg) => AppError::BadRequest(msg),
            e @ (StoreError::PasswordHash | StoreError::Database(_)) => {
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many attempts, try again later".to_string(),
            ),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
