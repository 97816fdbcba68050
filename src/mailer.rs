//! Outbound mail. Delivery itself is an external concern; the service only
//! needs something that accepts a verification token for an address.

use async_trait::async_trait;
use log::info;

use crate::error::AppResult;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification(&self, email: &str, token: &str) -> AppResult<()>;
}

/// Writes verification links to the log instead of sending mail.
pub struct LogMailer {
    pub frontend_origin: String,
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification(&self, email: &str, token: &str) -> AppResult<()> {
        info!(
            "Verification mail for {}: {}/verify?token={}",
            email, self.frontend_origin, token
        );
        Ok(())
    }
}
