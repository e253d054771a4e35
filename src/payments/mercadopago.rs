//! Mercado Pago checkout preference creation and payment lookup

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::store::orders::OrderWithItems;

const API_BASE: &str = "https://api.mercadopago.com";

/// Mercado Pago API client
#[derive(Clone)]
pub struct MercadoPagoClient {
    client: Client,
    access_token: String,
    public_base_url: String,
    client_origin: String,
    force_sandbox: bool,
}

impl MercadoPagoClient {
    /// `None` when no access token is configured
    pub fn from_config(config: &Config) -> Option<Self> {
        let access_token = config.mercado_pago_access_token.clone()?;
        Some(Self {
            client: Client::new(),
            access_token,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            client_origin: config.client_origin.trim_end_matches('/').to_string(),
            force_sandbox: config.mercado_pago_force_sandbox,
        })
    }

    /// Build the preference body for an order
    pub fn preference_request(&self, order: &OrderWithItems) -> PreferenceRequest {
        let mut items: Vec<PreferenceItem> = order
            .items
            .iter()
            .map(|item| PreferenceItem {
                id: item.product_id.map(|id| id.to_string()),
                title: item.name.clone(),
                quantity: item.quantity,
                currency_id: "BRL",
                unit_price: cents_to_brl(item.unit_price_cents),
            })
            .collect();

        if order.order.discount_cents > 0 {
            items.push(PreferenceItem {
                id: None,
                title: "Desconto".to_string(),
                quantity: 1,
                currency_id: "BRL",
                unit_price: -cents_to_brl(order.order.discount_cents),
            });
        }

        let back = |outcome: &str| format!("{}/loja-online/pagamento/{}", self.client_origin, outcome);

        PreferenceRequest {
            items,
            back_urls: BackUrls {
                success: back("sucesso"),
                failure: back("falha"),
                pending: back("pendente"),
            },
            auto_return: "approved",
            external_reference: order.order.id.to_string(),
            notification_url: format!("{}/webhooks/mercadopago", self.public_base_url),
        }
    }

    /// Create a checkout preference for an order
    pub async fn create_preference(
        &self,
        order: &OrderWithItems,
    ) -> Result<CheckoutPreference, MercadoPagoError> {
        let body = self.preference_request(order);

        let response = self
            .client
            .post(format!("{}/checkout/preferences", API_BASE))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MercadoPagoError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let preference: PreferenceResponse = response.json().await?;
        let checkout_url = if self.force_sandbox {
            preference
                .sandbox_init_point
                .clone()
                .or_else(|| preference.init_point.clone())
        } else {
            preference.init_point.clone()
        }
        .ok_or(MercadoPagoError::NoCheckoutUrl)?;

        Ok(CheckoutPreference {
            id: preference.id,
            init_point: preference.init_point,
            sandbox_init_point: preference.sandbox_init_point,
            checkout_url,
        })
    }

    /// Fetch a payment by its provider id
    pub async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment, MercadoPagoError> {
        let response = self
            .client
            .get(format!("{}/v1/payments/{}", API_BASE, payment_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MercadoPagoError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

fn cents_to_brl(cents: i64) -> f64 {
    cents as f64 / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferenceRequest {
    pub items: Vec<PreferenceItem>,
    pub back_urls: BackUrls,
    pub auto_return: &'static str,
    pub external_reference: String,
    pub notification_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferenceItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub quantity: i64,
    pub currency_id: &'static str,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: Option<String>,
    sandbox_init_point: Option<String>,
}

/// Preference links returned to the client
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutPreference {
    pub id: String,
    pub init_point: Option<String>,
    pub sandbox_init_point: Option<String>,
    pub checkout_url: String,
}

/// The fields of a provider payment the webhook acts on
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderPayment {
    pub id: i64,
    pub status: String,
    pub external_reference: Option<String>,
    pub transaction_amount: Option<f64>,
}

impl ProviderPayment {
    /// Order id carried in `external_reference`
    pub fn order_id(&self) -> Option<i64> {
        self.external_reference.as_deref()?.trim().parse().ok()
    }

    pub fn amount_cents(&self) -> Option<i64> {
        self.transaction_amount.map(|a| (a * 100.0).round() as i64)
    }
}

/// Mercado Pago errors
#[derive(Debug, thiserror::Error)]
pub enum MercadoPagoError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Mercado Pago API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("No checkout URL returned")]
    NoCheckoutUrl,
}
