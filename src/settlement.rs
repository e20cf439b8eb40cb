//! Settlement reconciliation.
//!
//! Turns authenticated gateway notifications into `DonationLedger::settle`
//! calls. Deliveries may repeat or arrive out of order; nothing here
//! deduplicates, the ledger's idempotent settle does. The donor redirect
//! helpers at the bottom never touch the ledger.

use std::sync::Arc;

use hourglass_rs::SafeTimeProvider;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RedirectConfig;
use crate::donation::DonationLedger;
use crate::errors::{LedgerError, Result};
use crate::gateway::{PaymentGateway, RedirectUrls};
use crate::types::{DonationStatus, SettlementOutcome};

/// server-to-server payment notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayNotification {
    pub status: String,
    pub request_reference_number: String,
}

/// map provider status vocabulary onto settlement outcomes
///
/// `None` for statuses that are not final yet.
pub fn normalize_status(status: &str) -> Option<SettlementOutcome> {
    match status.trim().to_ascii_uppercase().as_str() {
        "PAYMENT_SUCCESS" => Some(SettlementOutcome::Success),
        "PAYMENT_FAILED" | "AUTH_FAILED" => Some(SettlementOutcome::Failed),
        "PAYMENT_CANCELLED" => Some(SettlementOutcome::Cancelled),
        "PAYMENT_EXPIRED" => Some(SettlementOutcome::Expired),
        _ => None,
    }
}

/// what the webhook tells the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Acknowledgement {
    Settled {
        reference: String,
        status: DonationStatus,
    },
    AlreadySettled {
        reference: String,
        status: DonationStatus,
    },
    Ignored {
        reason: String,
    },
}

impl Acknowledgement {
    fn ignored(reason: impl Into<String>) -> Self {
        Acknowledgement::Ignored {
            reason: reason.into(),
        }
    }
}

pub struct SettlementReconciler {
    ledger: Arc<DonationLedger>,
    gateway: Arc<dyn PaymentGateway>,
}

impl SettlementReconciler {
    pub fn new(ledger: Arc<DonationLedger>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { ledger, gateway }
    }

    /// authenticate, parse and apply one raw notification
    ///
    /// Only an unverifiable signature is an error; every authenticated body
    /// yields an acknowledgement so the gateway stops redelivering.
    pub fn handle(&self, raw: &[u8], signature: Option<&str>, time: &SafeTimeProvider) -> Result<Acknowledgement> {
        if !self.gateway.verify_notification(raw, signature) {
            warn!(gateway = self.gateway.name(), has_signature = signature.is_some(), "notification signature rejected");
            return Err(LedgerError::InvalidSignature);
        }

        let notification: GatewayNotification = match serde_json::from_slice(raw) {
            Ok(notification) => notification,
            Err(e) => {
                let err = LedgerError::MalformedNotification {
                    message: e.to_string(),
                };
                warn!(gateway = self.gateway.name(), error = %err, "ignoring notification");
                return Ok(Acknowledgement::ignored("malformed payload"));
            }
        };
        self.handle_notification(&notification, time)
    }

    /// apply an already authenticated notification
    pub fn handle_notification(
        &self,
        notification: &GatewayNotification,
        time: &SafeTimeProvider,
    ) -> Result<Acknowledgement> {
        let reference = notification.request_reference_number.trim();
        if reference.is_empty() {
            warn!(status = %notification.status, "notification without reference");
            return Ok(Acknowledgement::ignored("missing reference"));
        }

        let Some(outcome) = normalize_status(&notification.status) else {
            debug!(reference, status = %notification.status, "non-terminal status ignored");
            return Ok(Acknowledgement::ignored(format!(
                "non-terminal status {}",
                notification.status
            )));
        };

        match self.ledger.settle(reference, outcome, time) {
            Ok(receipt) if receipt.applied => {
                info!(reference, status = %receipt.status, "notification settled donation");
                Ok(Acknowledgement::Settled {
                    reference: receipt.reference,
                    status: receipt.status,
                })
            }
            Ok(receipt) => {
                info!(reference, status = %receipt.status, "duplicate notification");
                Ok(Acknowledgement::AlreadySettled {
                    reference: receipt.reference,
                    status: receipt.status,
                })
            }
            // logged by the ledger; acknowledged so the gateway stops retrying
            Err(LedgerError::UnknownReference { .. }) => Ok(Acknowledgement::ignored("unknown reference")),
            Err(e) => Err(e),
        }
    }
}

/// donor-facing redirect endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectKind {
    Success,
    Failure,
    Cancel,
}

impl RedirectKind {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancel => "cancel",
        }
    }

    /// outcome segment of the frontend page
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failed",
            Self::Cancel => "cancelled",
        }
    }
}

fn url_with_reference(base: &str, key: &str, reference: &str) -> Result<String> {
    Url::parse_with_params(base, &[(key, reference)])
        .map(String::from)
        .map_err(|e| LedgerError::Config {
            message: format!("invalid redirect base {base:?}: {e}"),
        })
}

/// per-donation callback urls handed to the gateway
pub fn callback_urls(config: &RedirectConfig, reference: &str) -> Result<RedirectUrls> {
    let base = config.callback_base_url.trim_end_matches('/');
    let url = |kind: RedirectKind| url_with_reference(&format!("{base}/payments/{}", kind.path()), "id", reference);
    Ok(RedirectUrls {
        success: url(RedirectKind::Success)?,
        failure: url(RedirectKind::Failure)?,
        cancel: url(RedirectKind::Cancel)?,
    })
}

/// frontend page the donor's browser is bounced to
pub fn frontend_location(config: &RedirectConfig, kind: RedirectKind, reference: &str) -> Result<String> {
    let base = config.frontend_url.trim_end_matches('/');
    url_with_reference(&format!("{base}/donations/{}", kind.outcome()), "reference", reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{Campaign, CampaignDraft, CampaignStore};
    use crate::decimal::Money;
    use crate::donation::{DonationStore, DonorInfo};
    use crate::events::EventStore;
    use crate::gateway::MockGateway;
    use crate::types::{CampaignStatus, PaymentMethod};
    use chrono::{TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use parking_lot::Mutex;
    use uuid::Uuid;

    struct Fixture {
        reconciler: SettlementReconciler,
        ledger: Arc<DonationLedger>,
        campaigns: Arc<CampaignStore>,
        gateway: Arc<MockGateway>,
        campaign_id: Uuid,
    }

    fn time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()))
    }

    fn fixture(time: &SafeTimeProvider) -> Fixture {
        let events = Arc::new(Mutex::new(EventStore::new()));
        let campaigns = Arc::new(CampaignStore::new());
        let ledger = Arc::new(DonationLedger::new(
            Arc::clone(&campaigns),
            Arc::new(DonationStore::new()),
            events,
        ));
        let gateway = Arc::new(MockGateway::new("whsec"));
        let reconciler = SettlementReconciler::new(Arc::clone(&ledger), gateway.clone());

        let draft = CampaignDraft::general(Uuid::new_v4(), Uuid::new_v4(), "Science lab", Money::from_major(1_000));
        let mut campaign = Campaign::from_draft(draft, time.now());
        campaign.status = CampaignStatus::Active;
        let campaign_id = campaign.id;
        campaigns.insert(campaign);

        Fixture {
            reconciler,
            ledger,
            campaigns,
            gateway,
            campaign_id,
        }
    }

    fn open(fx: &Fixture, amount: i64, time: &SafeTimeProvider) -> String {
        fx.ledger
            .open(fx.campaign_id, DonorInfo::anonymous(), Money::from_major(amount), PaymentMethod::Checkout, time)
            .unwrap()
            .reference
    }

    #[test]
    fn test_normalize_status() {
        assert_eq!(normalize_status("PAYMENT_SUCCESS"), Some(SettlementOutcome::Success));
        assert_eq!(normalize_status("payment_success"), Some(SettlementOutcome::Success));
        assert_eq!(normalize_status("AUTH_FAILED"), Some(SettlementOutcome::Failed));
        assert_eq!(normalize_status("PAYMENT_FAILED"), Some(SettlementOutcome::Failed));
        assert_eq!(normalize_status("PAYMENT_CANCELLED"), Some(SettlementOutcome::Cancelled));
        assert_eq!(normalize_status(" PAYMENT_EXPIRED "), Some(SettlementOutcome::Expired));
        assert_eq!(normalize_status("PAYMENT_PROCESSING"), None);
        assert_eq!(normalize_status("AUTHORIZED"), None);
    }

    #[test]
    fn test_verified_success_credits_once() {
        let time = time();
        let fx = fixture(&time);
        let reference = open(&fx, 400, &time);
        let (body, signature) = fx.gateway.signed_notification(&reference, "PAYMENT_SUCCESS").unwrap();

        let first = fx.reconciler.handle(&body, Some(&signature), &time).unwrap();
        assert!(matches!(first, Acknowledgement::Settled { status: DonationStatus::Completed, .. }));

        let replay = fx.reconciler.handle(&body, Some(&signature), &time).unwrap();
        assert!(matches!(replay, Acknowledgement::AlreadySettled { .. }));

        assert_eq!(fx.campaigns.get(fx.campaign_id).unwrap().raised_amount(), Money::from_major(400));
    }

    #[test]
    fn test_bad_signature_mutates_nothing() {
        let time = time();
        let fx = fixture(&time);
        let reference = open(&fx, 400, &time);
        let (body, _) = fx.gateway.signed_notification(&reference, "PAYMENT_SUCCESS").unwrap();

        let forged = MockGateway::new("attacker").signed_notification(&reference, "PAYMENT_SUCCESS").unwrap().1;
        assert!(matches!(
            fx.reconciler.handle(&body, Some(&forged), &time),
            Err(LedgerError::InvalidSignature)
        ));
        assert!(matches!(fx.reconciler.handle(&body, None, &time), Err(LedgerError::InvalidSignature)));

        assert_eq!(fx.ledger.by_reference(&reference).unwrap().status(), DonationStatus::Pending);
        assert_eq!(fx.campaigns.get(fx.campaign_id).unwrap().raised_amount(), Money::ZERO);
    }

    #[test]
    fn test_authenticated_oddities_are_acknowledged() {
        let time = time();
        let fx = fixture(&time);
        let reference = open(&fx, 400, &time);

        let (body, signature) = fx.gateway.signed_notification("DON-UNKNOWN", "PAYMENT_SUCCESS").unwrap();
        assert!(matches!(
            fx.reconciler.handle(&body, Some(&signature), &time).unwrap(),
            Acknowledgement::Ignored { .. }
        ));

        let (body, signature) = fx.gateway.signed_notification(&reference, "PAYMENT_PROCESSING").unwrap();
        assert!(matches!(
            fx.reconciler.handle(&body, Some(&signature), &time).unwrap(),
            Acknowledgement::Ignored { .. }
        ));
        assert_eq!(fx.ledger.by_reference(&reference).unwrap().status(), DonationStatus::Pending);

        let garbage = b"not json".to_vec();
        let signature = crate::gateway::sign_payload("whsec", &garbage).unwrap();
        assert_eq!(
            fx.reconciler.handle(&garbage, Some(&signature), &time).unwrap(),
            Acknowledgement::Ignored { reason: "malformed payload".to_string() }
        );
    }

    #[test]
    fn test_out_of_order_delivery() {
        let time = time();
        let fx = fixture(&time);
        let reference = open(&fx, 400, &time);

        let failed = GatewayNotification {
            status: "PAYMENT_FAILED".to_string(),
            request_reference_number: reference.clone(),
        };
        let success = GatewayNotification {
            status: "PAYMENT_SUCCESS".to_string(),
            request_reference_number: reference.clone(),
        };

        // the first terminal outcome wins
        fx.reconciler.handle_notification(&failed, &time).unwrap();
        let late = fx.reconciler.handle_notification(&success, &time).unwrap();
        assert!(matches!(late, Acknowledgement::AlreadySettled { status: DonationStatus::Failed, .. }));
        assert_eq!(fx.campaigns.get(fx.campaign_id).unwrap().raised_amount(), Money::ZERO);
    }

    #[test]
    fn test_redirect_urls() {
        let config = RedirectConfig {
            callback_base_url: "https://api.example.edu/".to_string(),
            frontend_url: "https://give.example.edu".to_string(),
        };

        let urls = callback_urls(&config, "DON-ABC").unwrap();
        assert_eq!(urls.success, "https://api.example.edu/payments/success?id=DON-ABC");
        assert_eq!(urls.failure, "https://api.example.edu/payments/failure?id=DON-ABC");
        assert_eq!(urls.cancel, "https://api.example.edu/payments/cancel?id=DON-ABC");

        assert_eq!(
            frontend_location(&config, RedirectKind::Cancel, "DON-ABC").unwrap(),
            "https://give.example.edu/donations/cancelled?reference=DON-ABC"
        );
        assert_eq!(
            frontend_location(&config, RedirectKind::Success, "a b&c").unwrap(),
            "https://give.example.edu/donations/success?reference=a+b%26c"
        );

        let broken = RedirectConfig {
            callback_base_url: "not a url".to_string(),
            frontend_url: "also not".to_string(),
        };
        assert!(matches!(callback_urls(&broken, "DON-ABC"), Err(LedgerError::Config { .. })));
    }
}
