//! Choperia server - point of sale and online ordering backend
//!
//! Serves the REST API used by the floor (tables, orders, stock) and by the
//! online shop (catalog, cart, checkout, Mercado Pago payments).

pub mod app;
pub mod config;
pub mod http;
pub mod payments;
pub mod store;
pub mod util;
