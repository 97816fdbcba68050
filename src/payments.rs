//! Card payment gateway used to buy credits.
//!
//! Orders are created over HTTP with basic auth. A completed checkout is
//! proven by an HMAC-SHA256 signature over `"{order_id}|{payment_id}"`,
//! keyed with the gateway secret and hex encoded.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::PaymentConfig;
use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, amount: i64, currency: &str, receipt: &str) -> AppResult<GatewayOrder>;

    /// Whether `signature` proves payment `payment_id` settled `order_id`.
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;
}

pub struct HttpPaymentGateway {
    http: reqwest::Client,
    config: PaymentConfig,
}

impl HttpPaymentGateway {
    pub fn new(config: PaymentConfig) -> Self {
        HttpPaymentGateway {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct OrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_order(&self, amount: i64, currency: &str, receipt: &str) -> AppResult<GatewayOrder> {
        let url = format!("{}/orders", self.config.api_base.trim_end_matches('/'));
        debug!("Creating gateway order {} for {} {}", receipt, amount, currency);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&OrderBody { amount, currency, receipt })
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Gateway rejected order {}: {} {}", receipt, status, body);
            return Err(AppError::ExternalService(format!(
                "payment gateway returned {}",
                status
            )));
        }
        Ok(response.json::<GatewayOrder>().await?)
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_signature(&self.config.key_secret, order_id, payment_id, signature)
    }
}

pub fn sign_payment(secret: &str, order_id: &str, payment_id: &str) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("invalid payment secret: {}", e)))?;
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(expected) = sign_payment(secret, order_id, payment_id) else {
        return false;
    };
    let (Ok(expected), Ok(given)) = (hex::decode(expected), hex::decode(signature.trim())) else {
        return false;
    };
    if expected.len() != given.len() {
        return false;
    }
    expected.ct_eq(given.as_slice()).into()
}
