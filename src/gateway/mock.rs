//! In-process gateway for tests and demos.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use crate::errors::{LedgerError, Result};
use crate::gateway::{sign_payload, verify_signature, CheckoutRequest, CheckoutSession, PaymentGateway};

/// how the next checkout call behaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehaviour {
    Succeed,
    /// provider answered with an error
    Reject(String),
    /// provider could not be reached
    Unavailable,
    /// succeed after sleeping
    Delay(Duration),
}

pub struct MockGateway {
    webhook_secret: String,
    behaviour: Mutex<MockBehaviour>,
    requests: Mutex<Vec<CheckoutRequest>>,
}

impl MockGateway {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            behaviour: Mutex::new(MockBehaviour::Succeed),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behaviour(&self, behaviour: MockBehaviour) {
        *self.behaviour.lock() = behaviour;
    }

    /// checkout requests received so far
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().clone()
    }

    /// a notification body plus the signature header the real provider would send
    pub fn signed_notification(&self, reference: &str, status: &str) -> Result<(Vec<u8>, String)> {
        let body = json!({
            "status": status,
            "requestReferenceNumber": reference,
        })
        .to_string()
        .into_bytes();
        let signature = sign_payload(&self.webhook_secret, &body)?;
        Ok((body, signature))
    }

    fn session(request: &CheckoutRequest) -> CheckoutSession {
        let checkout_id = format!("mock-{}", request.reference.to_lowercase());
        CheckoutSession {
            checkout_url: format!("https://checkout.mock/{checkout_id}"),
            provider_checkout_id: checkout_id,
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn initiate_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        self.requests.lock().push(request.clone());
        let behaviour = self.behaviour.lock().clone();
        match behaviour {
            MockBehaviour::Succeed => Ok(Self::session(request)),
            MockBehaviour::Reject(message) => Err(LedgerError::Gateway { message }),
            MockBehaviour::Unavailable => Err(LedgerError::GatewayUnavailable {
                message: "connection refused".to_string(),
            }),
            MockBehaviour::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Self::session(request))
            }
        }
    }

    fn verify_notification(&self, raw: &[u8], signature: Option<&str>) -> bool {
        verify_signature(&self.webhook_secret, raw, signature)
    }
}
