//! Stock movements and reservations

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::Deserialize;
use tracing::info;

use super::require_staff;
use crate::app::AppState;
use crate::http::middleware::AuthenticatedUser;
use crate::http::routes::AppError;
use crate::store::reservations::StockReservation;
use crate::store::stock::{
    MovementFilter, MovementKind, MovementOrigin, MovementRequest, StockMovement,
};

#[derive(Debug, Deserialize)]
pub struct MovementBody {
    pub product_id: i64,
    pub quantity: i64,
    pub kind: MovementKind,
    #[serde(default = "default_origin")]
    pub origin: MovementOrigin,
    pub notes: Option<String>,
}

fn default_origin() -> MovementOrigin {
    MovementOrigin::Ajuste
}

#[derive(Debug, Default, Deserialize)]
pub struct ReservationQuery {
    pub product_id: Option<i64>,
}

pub async fn create_movement_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<MovementBody>,
) -> Result<impl IntoResponse, AppError> {
    require_staff(&auth)?;

    let movement = state
        .stock
        .record(MovementRequest {
            product_id: req.product_id,
            kind: req.kind,
            origin: req.origin,
            quantity: req.quantity,
            user_id: Some(auth.user_id),
            notes: req.notes,
            order_id: None,
        })
        .await?;

    info!(
        product_id = movement.product_id,
        kind = ?movement.kind,
        quantity = movement.quantity,
        new_quantity = movement.new_quantity,
        "Stock movement recorded"
    );
    Ok((StatusCode::CREATED, Json(movement)))
}

pub async fn list_movements_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(filter): Query<MovementFilter>,
) -> Result<Json<Vec<StockMovement>>, AppError> {
    require_staff(&auth)?;
    Ok(Json(state.stock.list(filter).await?))
}

pub async fn list_reservations_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(query): Query<ReservationQuery>,
) -> Result<Json<Vec<StockReservation>>, AppError> {
    require_staff(&auth)?;
    Ok(Json(state.reservations.list_active(query.product_id).await?))
}
