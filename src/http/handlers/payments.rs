//! Mercado Pago checkout for existing orders

use axum::{extract::State, response::Json, Extension};
use serde::Deserialize;
use tracing::{error, info};

use crate::app::AppState;
use crate::http::middleware::AuthenticatedUser;
use crate::http::routes::AppError;
use crate::payments::CheckoutPreference;
use crate::store::orders::{OrderKind, OrderStatus};

#[derive(Debug, Deserialize)]
pub struct PreferenceRequest {
    pub order_id: i64,
}

/// Create a checkout preference for the caller's pending online order
pub async fn create_preference_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<PreferenceRequest>,
) -> Result<Json<CheckoutPreference>, AppError> {
    let client = state.mercado_pago.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("Mercado Pago is not configured".to_string())
    })?;

    let order = state
        .orders
        .get(req.order_id)
        .await?
        .filter(|o| o.order.user_id == Some(auth.user_id))
        .ok_or_else(|| AppError::NotFound("order not found".to_string()))?;

    if order.order.kind != OrderKind::Online || order.order.status != OrderStatus::Pendente {
        return Err(AppError::Conflict(
            "only pending online orders can be paid".to_string(),
        ));
    }

    let preference = client.create_preference(&order).await.map_err(|e| {
        error!(order_id = req.order_id, error = %e, "Failed to create payment preference");
        AppError::ServiceUnavailable("payment provider unavailable".to_string())
    })?;

    info!(order_id = req.order_id, preference_id = %preference.id, "Payment preference created");
    Ok(Json(preference))
}
