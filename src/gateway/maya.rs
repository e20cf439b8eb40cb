//! Maya hosted checkout adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::errors::{LedgerError, Result};
use crate::gateway::{verify_signature, CheckoutRequest, CheckoutSession, PaymentGateway};

const CHECKOUT_PATH: &str = "/checkout/v1/checkouts";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutBody<'a> {
    total_amount: TotalAmount<'a>,
    request_reference_number: &'a str,
    redirect_url: RedirectBody<'a>,
}

#[derive(Debug, Serialize)]
struct TotalAmount<'a> {
    value: String,
    currency: &'a str,
}

#[derive(Debug, Serialize)]
struct RedirectBody<'a> {
    success: &'a str,
    failure: &'a str,
    cancel: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutResponse {
    checkout_id: String,
    redirect_url: String,
}

pub struct MayaGateway {
    client: Client,
    config: GatewayConfig,
}

impl MayaGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LedgerError::Config {
                message: format!("failed to build http client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    fn checkout_url(&self) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), CHECKOUT_PATH)
    }
}

fn checkout_body(request: &CheckoutRequest) -> CheckoutBody<'_> {
    CheckoutBody {
        total_amount: TotalAmount {
            value: request.amount.to_fixed_string(),
            currency: &request.currency,
        },
        request_reference_number: &request.reference,
        redirect_url: RedirectBody {
            success: &request.redirect_urls.success,
            failure: &request.redirect_urls.failure,
            cancel: &request.redirect_urls.cancel,
        },
    }
}

/// map a checkout response to a session or a gateway error
fn interpret_response(status: u16, body: &str) -> Result<CheckoutSession> {
    if !(200..300).contains(&status) {
        return Err(LedgerError::Gateway {
            message: format!("checkout returned status {status}"),
        });
    }
    let response: CheckoutResponse = serde_json::from_str(body).map_err(|e| LedgerError::Gateway {
        message: format!("malformed checkout response: {e}"),
    })?;
    if response.checkout_id.is_empty() || response.redirect_url.is_empty() {
        return Err(LedgerError::Gateway {
            message: "checkout response missing checkoutId or redirectUrl".to_string(),
        });
    }
    Ok(CheckoutSession {
        checkout_url: response.redirect_url,
        provider_checkout_id: response.checkout_id,
    })
}

fn transport_error(e: reqwest::Error) -> LedgerError {
    if e.is_timeout() || e.is_connect() {
        LedgerError::GatewayUnavailable {
            message: e.to_string(),
        }
    } else {
        LedgerError::Gateway {
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for MayaGateway {
    fn name(&self) -> &'static str {
        "maya"
    }

    async fn initiate_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        debug!(reference = %request.reference, amount = %request.amount, "creating maya checkout");

        let response = self
            .client
            .post(self.checkout_url())
            .basic_auth(&self.config.public_key, Some(""))
            .json(&checkout_body(request))
            .send()
            .await
            .map_err(|e| {
                warn!(reference = %request.reference, error = %e, "maya checkout request failed");
                transport_error(e)
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        interpret_response(status, &body).map_err(|e| {
            warn!(reference = %request.reference, status, error = %e, "maya checkout rejected");
            e
        })
    }

    fn verify_notification(&self, raw: &[u8], signature: Option<&str>) -> bool {
        verify_signature(&self.config.webhook_secret, raw, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::decimal::Money;
    use crate::gateway::{sign_payload, RedirectUrls};
    use std::time::Duration;

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            amount: Money::from_major(500),
            currency: "PHP".to_string(),
            reference: "DON-ABC".to_string(),
            redirect_urls: RedirectUrls {
                success: "http://localhost:3001/payments/success?id=DON-ABC".to_string(),
                failure: "http://localhost:3001/payments/failure?id=DON-ABC".to_string(),
                cancel: "http://localhost:3001/payments/cancel?id=DON-ABC".to_string(),
            },
        }
    }

    #[test]
    fn test_checkout_body_shape() {
        let request = request();
        let json = serde_json::to_value(checkout_body(&request)).unwrap();
        assert_eq!(json["totalAmount"]["value"], "500.00");
        assert_eq!(json["totalAmount"]["currency"], "PHP");
        assert_eq!(json["requestReferenceNumber"], "DON-ABC");
        assert_eq!(json["redirectUrl"]["cancel"], "http://localhost:3001/payments/cancel?id=DON-ABC");
    }

    #[test]
    fn test_interpret_response() {
        let ok = interpret_response(200, r#"{"checkoutId":"chk-1","redirectUrl":"https://pay/chk-1"}"#).unwrap();
        assert_eq!(ok.provider_checkout_id, "chk-1");
        assert_eq!(ok.checkout_url, "https://pay/chk-1");

        assert!(matches!(
            interpret_response(401, r#"{"error":"unauthorized"}"#),
            Err(LedgerError::Gateway { .. })
        ));
        assert!(matches!(interpret_response(200, "<html>"), Err(LedgerError::Gateway { .. })));
        assert!(matches!(
            interpret_response(201, r#"{"checkoutId":"","redirectUrl":"x"}"#),
            Err(LedgerError::Gateway { .. })
        ));
    }

    #[test]
    fn test_checkout_url_joins_base() {
        let mut config = LedgerConfig::sandbox("whsec").gateway;
        config.base_url = "https://pg-sandbox.paymaya.com/".to_string();
        let gateway = MayaGateway::new(config).unwrap();
        assert_eq!(gateway.checkout_url(), "https://pg-sandbox.paymaya.com/checkout/v1/checkouts");
    }

    #[test]
    fn test_verify_uses_webhook_secret() {
        let gateway = MayaGateway::new(LedgerConfig::sandbox("whsec").gateway).unwrap();
        let body = br#"{"status":"PAYMENT_FAILED","requestReferenceNumber":"DON-ABC"}"#;
        let signature = sign_payload("whsec", body).unwrap();
        assert!(gateway.verify_notification(body, Some(&signature)));
        assert!(!gateway.verify_notification(body, None));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_unavailable() {
        let mut config = LedgerConfig::sandbox("whsec").gateway;
        config.base_url = "http://127.0.0.1:1".to_string();
        config.request_timeout = Duration::from_secs(2);
        let gateway = MayaGateway::new(config).unwrap();

        let err = gateway.initiate_checkout(&request()).await.unwrap_err();
        assert!(matches!(err, LedgerError::GatewayUnavailable { .. }));
        assert!(err.is_retryable());
    }
}
