//! Application state shared across routes

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::payments::MercadoPagoClient;
use crate::store::{
    seed::seed, CartStore, CatalogStore, CouponStore, Database, FavoriteStore, OrderStore,
    PaymentStore, ProductStore, RatingStore, ReservationStore, StockStore, StoreError, TableStore,
    UserStore,
};
use crate::util::rate_limit::LoginRateLimiter;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub users: UserStore,
    pub catalog: CatalogStore,
    pub products: ProductStore,
    pub tables: TableStore,
    pub orders: OrderStore,
    pub stock: StockStore,
    pub reservations: ReservationStore,
    pub carts: CartStore,
    pub favorites: FavoriteStore,
    pub ratings: RatingStore,
    pub coupons: CouponStore,
    pub payments: PaymentStore,
    /// Absent when no access token is configured
    pub mercado_pago: Option<MercadoPagoClient>,
    pub login_limiter: LoginRateLimiter,
}

impl AppState {
    /// Connect, create the schema and seed an empty database when enabled
    pub async fn new(config: Config) -> Result<Self, StoreError> {
        let db = Database::connect(&config.database_url, config.database_max_connections).await?;
        db.migrate().await?;

        if config.seed_db {
            seed(&db).await?;
        }

        Ok(Self::with_database(config, db))
    }

    /// Build the state over an already migrated database
    pub fn with_database(config: Config, db: Database) -> Self {
        let config = Arc::new(config);

        let mercado_pago = MercadoPagoClient::from_config(&config);
        if mercado_pago.is_none() {
            info!("Mercado Pago not configured, online payments disabled");
        }

        Self {
            users: UserStore::new(db.clone()),
            catalog: CatalogStore::new(db.clone()),
            products: ProductStore::new(db.clone()),
            tables: TableStore::new(db.clone(), config.table_reservation_hours),
            orders: OrderStore::new(db.clone()),
            stock: StockStore::new(db.clone()),
            reservations: ReservationStore::new(db.clone()),
            carts: CartStore::new(db.clone(), config.cart_reservation_minutes),
            favorites: FavoriteStore::new(db.clone()),
            ratings: RatingStore::new(db.clone()),
            coupons: CouponStore::new(db.clone()),
            payments: PaymentStore::new(db.clone()),
            login_limiter: LoginRateLimiter::new(config.login_attempts_per_minute),
            mercado_pago,
            db,
            config,
        }
    }
}
