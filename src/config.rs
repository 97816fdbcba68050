use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Clone, Debug)]
pub struct PaymentConfig {
    pub key_id: String,
    pub key_secret: String,
    pub api_base: String,
    pub currency: String,
    /// Minor currency units charged per credit.
    pub credit_unit_price: i64,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub bind_address: String,
    pub frontend_origin: String,
    pub store: StoreBackend,
    pub payment: PaymentConfig,
    pub stale_account_days: i64,
    pub sweep_interval: Duration,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = or_default(name, default);
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let store = match or_default("STORE", "mongo").as_str() {
            "mongo" => StoreBackend::Mongo,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORE",
                    value: other.to_string(),
                })
            }
        };
        let mongo_uri = match store {
            StoreBackend::Mongo => required("MONGO_URI")?,
            StoreBackend::Memory => or_default("MONGO_URI", ""),
        };

        Ok(Self {
            mongo_uri,
            database_name: or_default("DATABASE_NAME", "creator_market"),
            jwt_secret: required("JWT_SECRET")?,
            bind_address: or_default("BIND_ADDRESS", "0.0.0.0:8080"),
            frontend_origin: or_default("FRONTEND_ORIGIN", "http://localhost:3000"),
            store,
            payment: PaymentConfig {
                key_id: or_default("PAYMENT_KEY_ID", ""),
                key_secret: or_default("PAYMENT_KEY_SECRET", ""),
                api_base: or_default("PAYMENT_API_BASE", "https://api.razorpay.com/v1"),
                currency: or_default("PAYMENT_CURRENCY", "INR"),
                credit_unit_price: parsed("CREDIT_UNIT_PRICE", "100")?,
            },
            stale_account_days: parsed("STALE_ACCOUNT_DAYS", "7")?,
            sweep_interval: Duration::from_secs(parsed("SWEEP_INTERVAL_SECS", "86400")?),
        })
    }

    /// Configuration for tests and local runs against the in-memory store.
    pub fn for_memory(jwt_secret: &str) -> Self {
        Self {
            mongo_uri: String::new(),
            database_name: "creator_market".to_string(),
            jwt_secret: jwt_secret.to_string(),
            bind_address: "127.0.0.1:8080".to_string(),
            frontend_origin: "http://localhost:3000".to_string(),
            store: StoreBackend::Memory,
            payment: PaymentConfig {
                key_id: "key_test".to_string(),
                key_secret: "payment_secret".to_string(),
                api_base: "http://127.0.0.1:9/v1".to_string(),
                currency: "INR".to_string(),
                credit_unit_price: 100,
            },
            stale_account_days: 7,
            sweep_interval: Duration::from_secs(86_400),
        }
    }
}
