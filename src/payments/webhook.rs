//! Mercado Pago webhook handler with signature verification

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::payments::mercadopago::MercadoPagoError;
use crate::store::payments::ProviderOutcome;
use crate::store::StoreError;

type HmacSha256 = Hmac<Sha256>;

/// Handle Mercado Pago notifications
pub async fn mercado_pago_webhook_handler(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookError> {
    let parsed: Result<Notification, serde_json::Error> = if body.is_empty() {
        Ok(Notification::default())
    } else {
        serde_json::from_slice(&body)
    };

    // Query parameters take precedence, they are what the signature covers
    let data_id = query
        .get("data.id")
        .cloned()
        .or_else(|| query.get("id").cloned())
        .or_else(|| parsed.as_ref().ok().and_then(Notification::data_id));

    if let Some(secret) = &state.config.mercado_pago_webhook_secret {
        let signature = headers
            .get("x-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or(WebhookError::MissingSignature)?;
        let request_id = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        verify_signature(
            signature,
            data_id.as_deref().unwrap_or_default(),
            request_id,
            secret,
        )?;
    }

    let notification = parsed.map_err(|e| {
        error!(error = %e, "Failed to parse Mercado Pago notification");
        WebhookError::InvalidPayload
    })?;
    let topic = query
        .get("type")
        .or_else(|| query.get("topic"))
        .cloned()
        .or_else(|| notification.topic());

    info!(
        topic = topic.as_deref().unwrap_or("unknown"),
        data_id = data_id.as_deref().unwrap_or(""),
        "Received Mercado Pago webhook"
    );

    match (topic.as_deref(), data_id) {
        (Some("payment"), Some(payment_id)) => handle_payment(&state, &payment_id).await?,
        _ => info!("Unhandled notification topic"),
    }

    Ok((StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))))
}

/// Signed manifest for a notification
fn manifest(data_id: &str, request_id: &str, ts: &str) -> String {
    // Alphanumeric ids are signed in lowercase
    format!(
        "id:{};request-id:{};ts:{};",
        data_id.to_lowercase(),
        request_id,
        ts
    )
}

/// Verify the `x-signature` header (`ts=...,v1=...`)
fn verify_signature(
    signature_header: &str,
    data_id: &str,
    request_id: &str,
    secret: &str,
) -> Result<(), WebhookError> {
    let mut timestamp: Option<&str> = None;
    let mut v1: Option<&str> = None;

    for part in signature_header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        if let (Some(key), Some(value)) = (kv.next(), kv.next()) {
            match key.trim() {
                "ts" => timestamp = Some(value.trim()),
                "v1" => v1 = Some(value.trim()),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::InvalidSignature)?;
    let v1 = v1.ok_or(WebhookError::InvalidSignature)?;
    let provided = hex::decode(v1).map_err(|_| WebhookError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(manifest(data_id, request_id, timestamp).as_bytes());
    mac.verify_slice(&provided)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// Fetch the payment and apply its status to the order
async fn handle_payment(state: &AppState, payment_id: &str) -> Result<(), WebhookError> {
    let client = state
        .mercado_pago
        .as_ref()
        .ok_or(WebhookError::NotConfigured)?;

    let payment = client.get_payment(payment_id).await?;
    let Some(order_id) = payment.order_id() else {
        warn!(payment_id, "Payment without an order reference");
        return Ok(());
    };
    let reference = payment.id.to_string();

    let result = match payment.status.as_str() {
        "approved" => {
            state
                .payments
                .confirm_provider_payment(order_id, &reference, payment.amount_cents())
                .await
        }
        "rejected" | "cancelled" => {
            state
                .payments
                .reject_provider_payment(order_id, &reference)
                .await
        }
        other => {
            info!(order_id, payment_id, status = other, "Payment status not actionable");
            Ok(ProviderOutcome::Ignored)
        }
    };

    match result {
        Ok(outcome) => {
            info!(order_id, payment_id, outcome = ?outcome, "Payment notification processed");
            Ok(())
        }
        Err(StoreError::NotFound(_)) => {
            warn!(order_id, payment_id, "Payment references an unknown order");
            Ok(())
        }
        Err(e) => Err(WebhookError::Store(e)),
    }
}

// ============================================================================
// Notification types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct Notification {
    #[serde(rename = "type")]
    kind: Option<String>,
    topic: Option<String>,
    data: Option<NotificationData>,
}

#[derive(Debug, Deserialize)]
struct NotificationData {
    id: serde_json::Value,
}

impl Notification {
    fn topic(&self) -> Option<String> {
        self.kind.clone().or_else(|| self.topic.clone())
    }

    /// Ids arrive either as strings or numbers
    fn data_id(&self) -> Option<String> {
        match &self.data.as_ref()?.id {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing x-signature header")]
    MissingSignature,

    #[error("Invalid request payload")]
    InvalidPayload,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Mercado Pago is not configured")]
    NotConfigured,

    #[error("Provider error: {0}")]
    Provider(#[from] MercadoPagoError),

    #[error("Database error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            WebhookError::MissingSignature => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidPayload => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            WebhookError::Provider(_) => StatusCode::BAD_GATEWAY,
            WebhookError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "Webhook processing failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(manifest: &str, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(manifest.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn manifest_format() {
        assert_eq!(
            manifest("ABC123", "req-1", "1700000000"),
            "id:abc123;request-id:req-1;ts:1700000000;"
        );
    }

    #[test]
    fn valid_signature_is_accepted() {
        let v1 = sign("id:991;request-id:req-1;ts:1700000000;", "whsec");
        let header = format!("ts=1700000000,v1={}", v1);
        assert!(verify_signature(&header, "991", "req-1", "whsec").is_ok());
    }

    #[test]
    fn signature_over_other_id_is_rejected() {
        let v1 = sign("id:991;request-id:req-1;ts:1700000000;", "whsec");
        let header = format!("ts=1700000000,v1={}", v1);
        assert!(matches!(
            verify_signature(&header, "992", "req-1", "whsec"),
            Err(WebhookError::InvalidSignature)
        ));
        assert!(matches!(
            verify_signature("v1=abcd", "991", "req-1", "whsec"),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn numeric_and_string_ids_are_read() {
        let n: Notification =
            serde_json::from_str(r#"{"type":"payment","data":{"id":123}}"#).unwrap();
        assert_eq!(n.data_id().as_deref(), Some("123"));
        assert_eq!(n.topic().as_deref(), Some("payment"));

        let s: Notification = serde_json::from_str(r#"{"topic":"merchant_order","data":{"id":"x9"}}"#).unwrap();
        assert_eq!(s.data_id().as_deref(), Some("x9"));
        assert_eq!(s.topic().as_deref(), Some("merchant_order"));
    }
}
