//! Online payments through Mercado Pago

pub mod mercadopago;
pub mod webhook;

pub use mercadopago::{CheckoutPreference, MercadoPagoClient, MercadoPagoError};
