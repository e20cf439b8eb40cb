//! Ledger configuration: gateway credentials, redirect targets and currency.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, Result};

const SANDBOX_BASE_URL: &str = "https://pg-sandbox.paymaya.com";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// top-level ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// ISO-4217 code; the ledger is single-currency
    pub currency: String,
    pub gateway: GatewayConfig,
    pub redirects: RedirectConfig,
}

/// payment gateway credentials and limits
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub public_key: String,
    pub secret_key: String,
    /// shared secret used to sign server-to-server notifications
    pub webhook_secret: String,
    /// bound applied to every checkout initiation
    pub request_timeout: Duration,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("public_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("webhook_secret", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// where donors' browsers are sent after checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectConfig {
    /// public base of this service, used to build gateway callback urls
    pub callback_base_url: String,
    /// frontend the redirect endpoints bounce to
    pub frontend_url: String,
}

impl LedgerConfig {
    /// sandbox configuration with placeholder credentials
    pub fn sandbox(webhook_secret: impl Into<String>) -> Self {
        Self {
            currency: "PHP".to_string(),
            gateway: GatewayConfig {
                base_url: SANDBOX_BASE_URL.to_string(),
                public_key: "pk-sandbox".to_string(),
                secret_key: "sk-sandbox".to_string(),
                webhook_secret: webhook_secret.into(),
                request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            },
            redirects: RedirectConfig {
                callback_base_url: "http://localhost:3001".to_string(),
                frontend_url: "http://localhost:5173".to_string(),
            },
        }
    }

    /// load from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(LedgerConfig {
            currency: env_var("LEDGER_CURRENCY").unwrap_or_else(|_| "PHP".to_string()),
            gateway: GatewayConfig {
                base_url: env_var("MAYA_BASE_URL").unwrap_or_else(|_| SANDBOX_BASE_URL.to_string()),
                public_key: env_var("MAYA_PUBLIC_KEY")?,
                secret_key: env_var("MAYA_SECRET_KEY")?,
                webhook_secret: env_var("MAYA_WEBHOOK_SECRET")?,
                request_timeout: Duration::from_secs(
                    env_var("GATEWAY_TIMEOUT_SECS")
                        .unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string())
                        .parse()
                        .map_err(|_| LedgerError::Config {
                            message: "Invalid GATEWAY_TIMEOUT_SECS".to_string(),
                        })?,
                ),
            },
            redirects: RedirectConfig {
                callback_base_url: env_var("CALLBACK_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:3001".to_string()),
                frontend_url: env_var("FRONTEND_URL")?,
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(LedgerError::Config {
                message: format!("currency must be a 3-letter ISO code, got {:?}", self.currency),
            });
        }
        if self.gateway.request_timeout.is_zero() {
            return Err(LedgerError::Config {
                message: "gateway request timeout must be non-zero".to_string(),
            });
        }
        if self.gateway.webhook_secret.is_empty() {
            return Err(LedgerError::Config {
                message: "webhook secret must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| LedgerError::Config {
        message: format!("Missing env var: {key}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_is_valid() {
        let config = LedgerConfig::sandbox("whsec");
        assert!(config.validate().is_ok());
        assert_eq!(config.currency, "PHP");
    }

    #[test]
    fn test_validate_rejects_bad_currency_and_timeout() {
        let mut config = LedgerConfig::sandbox("whsec");
        config.currency = "peso".to_string();
        assert!(matches!(config.validate(), Err(LedgerError::Config { .. })));

        let mut config = LedgerConfig::sandbox("whsec");
        config.gateway.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let config = LedgerConfig::sandbox("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = LedgerConfig::sandbox("super-secret-value");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret-value"));
        assert!(!rendered.contains("sk-sandbox"));
        assert!(rendered.contains("<redacted>"));
    }
}
