//! Payment gateway seam.
//!
//! The ledger only needs two things from a provider: start a hosted checkout
//! for a reference, and tell whether a server-to-server notification is
//! authentic. Everything provider specific lives behind [`PaymentGateway`].

pub mod maya;
pub mod mock;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};

pub use maya::MayaGateway;
pub use mock::{MockBehaviour, MockGateway};

type HmacSha256 = Hmac<Sha256>;

/// where the gateway sends the donor's browser after checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectUrls {
    pub success: String,
    pub failure: String,
    pub cancel: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub amount: Money,
    /// ISO-4217
    pub currency: String,
    /// our donation reference, echoed back in notifications
    pub reference: String,
    pub redirect_urls: RedirectUrls,
}

/// hosted checkout created by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub checkout_url: String,
    pub provider_checkout_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// provider name for logs
    fn name(&self) -> &'static str;

    /// create a hosted checkout
    ///
    /// `Gateway` on a non-2xx or unparseable answer, `GatewayUnavailable`
    /// when the provider could not be reached in time.
    async fn initiate_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;

    /// authenticate a raw notification body against its signature header
    fn verify_notification(&self, raw: &[u8], signature: Option<&str>) -> bool;
}

/// hex HMAC-SHA256 of `raw` keyed with `secret`
pub fn sign_payload(secret: &str, raw: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| LedgerError::Config {
        message: "webhook secret cannot key HMAC-SHA256".to_string(),
    })?;
    mac.update(raw);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// constant-time check of a hex HMAC-SHA256 signature
pub fn verify_signature(secret: &str, raw: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };
    if secret.is_empty() {
        return false;
    }
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw);
    mac.verify_slice(&expected).is_ok()
}
