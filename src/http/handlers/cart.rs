//! Shopping cart for visitors and customers

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::app::AppState;
use crate::http::middleware::{AuthenticatedUser, MaybeUser};
use crate::http::routes::{AppError, SESSION_HEADER};
use crate::payments::CheckoutPreference;
use crate::store::cart::{CartOwner, CartView, Checkout};
use crate::store::orders::OrderWithItems;

/// Provider method that triggers a checkout preference
const MERCADO_PAGO_METHOD: &str = "mercadopago";

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: i64,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: OrderWithItems,
    pub checkout_url: Option<String>,
    pub preference: Option<CheckoutPreference>,
}

/// Logged-in customers use their own cart, visitors the session's
fn cart_owner(caller: &Option<AuthenticatedUser>, headers: &HeaderMap) -> Result<CartOwner, AppError> {
    if let Some(auth) = caller {
        return Ok(CartOwner::User(auth.user_id));
    }
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| CartOwner::Session(s.to_string()))
        .ok_or_else(|| {
            AppError::BadRequest("log in or send an X-Session-Id header".to_string())
        })
}

/// Hand out a fresh anonymous session id
pub async fn new_session_handler() -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "session_id": Uuid::new_v4().to_string() })),
    )
}

pub async fn view_handler(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    headers: HeaderMap,
) -> Result<Json<CartView>, AppError> {
    let owner = cart_owner(&caller, &headers)?;
    Ok(Json(state.carts.view(&owner).await?))
}

pub async fn add_item_handler(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    headers: HeaderMap,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartView>, AppError> {
    let owner = cart_owner(&caller, &headers)?;
    Ok(Json(
        state
            .carts
            .add_item(&owner, req.product_id, req.quantity)
            .await?,
    ))
}

pub async fn update_item_handler(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartView>, AppError> {
    let owner = cart_owner(&caller, &headers)?;
    Ok(Json(
        state
            .carts
            .update_item(&owner, item_id, req.quantity)
            .await?,
    ))
}

pub async fn remove_item_handler(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
) -> Result<Json<CartView>, AppError> {
    let owner = cart_owner(&caller, &headers)?;
    Ok(Json(state.carts.remove_item(&owner, item_id).await?))
}

pub async fn clear_handler(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let owner = cart_owner(&caller, &headers)?;
    state.carts.clear(&owner).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Turn the cart into an online order. Mercado Pago orders also get a
/// checkout link; if the provider fails the order stays `Pendente`.
pub async fn checkout_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<Checkout>,
) -> Result<impl IntoResponse, AppError> {
    let wants_provider = req.payment_method.trim().eq_ignore_ascii_case(MERCADO_PAGO_METHOD);
    let order = state.carts.checkout(auth.user_id, req).await?;

    let preference = match (&state.mercado_pago, wants_provider) {
        (Some(client), true) => match client.create_preference(&order).await {
            Ok(preference) => Some(preference),
            Err(e) => {
                warn!(order_id = order.order.id, error = %e, "Failed to create payment preference");
                None
            }
        },
        _ => None,
    };

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            checkout_url: preference.as_ref().map(|p| p.checkout_url.clone()),
            preference,
            order,
        }),
    ))
}
