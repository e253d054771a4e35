//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// SQLite connection string
    pub database_url: String,
    pub database_max_connections: u32,

    /// HS256 secret for session tokens
    pub jwt_secret: String,
    /// Session token lifetime in minutes
    pub jwt_exp_minutes: i64,

    /// Allowed origins for CORS
    pub allowed_origins: Vec<String>,
    /// Public base URL for callbacks
    pub public_base_url: String,
    /// Frontend origin used for payment return URLs
    pub client_origin: String,

    /// Mercado Pago access token (payments disabled when absent)
    pub mercado_pago_access_token: Option<String>,
    /// Mercado Pago webhook signing secret
    pub mercado_pago_webhook_secret: Option<String>,
    /// Always hand out the sandbox checkout URL
    pub mercado_pago_force_sandbox: bool,

    /// Populate an empty database at startup
    pub seed_db: bool,

    pub cart_reservation_minutes: i64,
    pub table_reservation_hours: i64,
    pub login_attempts_per_minute: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR when both are set
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        };

        let allowed_origins: Vec<String> = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:8080,http://192.168.1.112:8080".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let client_origin = env::var("CLIENT_ORIGIN").unwrap_or_else(|_| {
            allowed_origins
                .first()
                .cloned()
                .unwrap_or_else(|| "http://localhost:8080".to_string())
        });

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.is_empty() {
            return Err(ConfigError::Invalid("JWT_SECRET"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::Invalid("SERVER_ADDR"))?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://choperia.db?mode=rwc".to_string()),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5)?,

            jwt_secret,
            jwt_exp_minutes: parse_or("JWT_EXP_MINUTES", 1440)?,

            allowed_origins,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            client_origin,

            mercado_pago_access_token: non_empty("MERCADO_PAGO_ACCESS_TOKEN")
                .or_else(|| non_empty("MP_ACCESS_TOKEN")),
            mercado_pago_webhook_secret: non_empty("MP_WEBHOOK_SECRET"),
            mercado_pago_force_sandbox: flag("MP_FORCE_SANDBOX", false),

            seed_db: flag("SEED_DB", true),

            cart_reservation_minutes: parse_or("CART_RESERVATION_MINUTES", 30)?,
            table_reservation_hours: parse_or("TABLE_RESERVATION_HOURS", 12)?,
            login_attempts_per_minute: parse_or("LOGIN_ATTEMPTS_PER_MINUTE", 10)?,
        })
    }

    /// Configuration for tests and local tooling: in-memory database, no payment provider
    pub fn for_tests() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_level: "debug".to_string(),
            database_url: "sqlite::memory:".to_string(),
            database_max_connections: 1,
            jwt_secret: "test-secret".to_string(),
            jwt_exp_minutes: 60,
            allowed_origins: vec!["http://localhost:8080".to_string()],
            public_base_url: "http://localhost:8000".to_string(),
            client_origin: "http://localhost:8080".to_string(),
            mercado_pago_access_token: None,
            mercado_pago_webhook_secret: None,
            mercado_pago_force_sandbox: false,
            seed_db: false,
            cart_reservation_minutes: 30,
            table_reservation_hours: 12,
            login_attempts_per_minute: 10,
        }
    }
}

fn non_empty(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn flag(key: &'static str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_accepts_common_truthy_values() {
        std::env::set_var("CHOPERIA_TEST_FLAG", "Yes");
        assert!(flag("CHOPERIA_TEST_FLAG", false));
        std::env::set_var("CHOPERIA_TEST_FLAG", "0");
        assert!(!flag("CHOPERIA_TEST_FLAG", true));
        std::env::remove_var("CHOPERIA_TEST_FLAG");
        assert!(flag("CHOPERIA_TEST_FLAG", true));
    }

    #[test]
    fn parse_or_rejects_garbage() {
        std::env::set_var("CHOPERIA_TEST_NUM", "abc");
        assert!(matches!(
            parse_or::<i64>("CHOPERIA_TEST_NUM", 3),
            Err(ConfigError::Invalid("CHOPERIA_TEST_NUM"))
        ));
        std::env::remove_var("CHOPERIA_TEST_NUM");
        assert_eq!(parse_or::<i64>("CHOPERIA_TEST_NUM", 3).unwrap(), 3);
    }
}
