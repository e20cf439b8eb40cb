//! Checkout initiation.
//!
//! The pending donation is recorded before the gateway is called and removed
//! again if the call fails or runs past the configured timeout, so a failed
//! checkout never leaves a dangling pending row. No campaign lock is held
//! while waiting on the gateway.

use std::sync::Arc;

use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::donation::{Donation, DonationLedger, DonorInfo};
use crate::errors::{LedgerError, Result};
use crate::gateway::{CheckoutRequest, PaymentGateway};
use crate::settlement::callback_urls;
use crate::types::{CampaignId, PaymentMethod};

/// a started checkout: the pending donation and where to send the donor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutStarted {
    pub donation: Donation,
    pub checkout_url: String,
}

pub struct CheckoutService {
    ledger: Arc<DonationLedger>,
    gateway: Arc<dyn PaymentGateway>,
    config: LedgerConfig,
}

impl CheckoutService {
    pub fn new(ledger: Arc<DonationLedger>, gateway: Arc<dyn PaymentGateway>, config: LedgerConfig) -> Self {
        Self {
            ledger,
            gateway,
            config,
        }
    }

    pub async fn begin(
        &self,
        campaign_id: CampaignId,
        donor: DonorInfo,
        amount: Money,
        method: PaymentMethod,
        time: &SafeTimeProvider,
    ) -> Result<CheckoutStarted> {
        let donation = self.ledger.open(campaign_id, donor, amount, method, time)?;

        let redirect_urls = match callback_urls(&self.config.redirects, &donation.reference) {
            Ok(urls) => urls,
            Err(e) => {
                self.ledger.discard_pending(donation.id, "invalid callback url", time)?;
                return Err(e);
            }
        };
        let request = CheckoutRequest {
            amount,
            currency: self.config.currency.clone(),
            reference: donation.reference.clone(),
            redirect_urls,
        };

        let limit = self.config.gateway.request_timeout;
        let session = match tokio::time::timeout(limit, self.gateway.initiate_checkout(&request)).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!(gateway = self.gateway.name(), reference = %donation.reference, error = %e, "checkout failed");
                self.ledger.discard_pending(donation.id, &e.to_string(), time)?;
                return Err(e);
            }
            Err(_) => {
                warn!(gateway = self.gateway.name(), reference = %donation.reference, timeout = ?limit, "checkout timed out");
                self.ledger.discard_pending(donation.id, "gateway timeout", time)?;
                return Err(LedgerError::GatewayUnavailable {
                    message: format!("no response within {limit:?}"),
                });
            }
        };

        let donation = match self.ledger.attach_checkout(donation.id, &session.provider_checkout_id, time) {
            Ok(donation) => donation,
            // a notification raced ahead of us and settled the donation
            Err(LedgerError::InvalidState { .. }) => {
                debug!(reference = %donation.reference, "donation settled before checkout id was recorded");
                self.ledger.get(donation.id)?
            }
            Err(e) => return Err(e),
        };

        info!(
            gateway = self.gateway.name(),
            donation_id = %donation.id,
            reference = %donation.reference,
            checkout_id = %session.provider_checkout_id,
            "checkout started"
        );
        Ok(CheckoutStarted {
            donation,
            checkout_url: session.checkout_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{Campaign, CampaignDraft, CampaignStore};
    use crate::donation::DonationStore;
    use crate::events::{Event, EventStore};
    use crate::gateway::{MockBehaviour, MockGateway};
    use crate::types::{CampaignStatus, DonationStatus};
    use chrono::{TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use parking_lot::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    struct Fixture {
        service: CheckoutService,
        ledger: Arc<DonationLedger>,
        gateway: Arc<MockGateway>,
        events: Arc<Mutex<EventStore>>,
        campaign_id: CampaignId,
    }

    fn time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()))
    }

    fn fixture(status: CampaignStatus, time: &SafeTimeProvider) -> Fixture {
        let events = Arc::new(Mutex::new(EventStore::new()));
        let campaigns = Arc::new(CampaignStore::new());
        let ledger = Arc::new(DonationLedger::new(
            Arc::clone(&campaigns),
            Arc::new(DonationStore::new()),
            Arc::clone(&events),
        ));
        let gateway = Arc::new(MockGateway::new("whsec"));
        let mut config = LedgerConfig::sandbox("whsec");
        config.gateway.request_timeout = Duration::from_secs(5);
        let service = CheckoutService::new(Arc::clone(&ledger), gateway.clone(), config);

        let draft = CampaignDraft::general(Uuid::new_v4(), Uuid::new_v4(), "Chapel repairs", Money::from_major(50_000));
        let mut campaign = Campaign::from_draft(draft, time.now());
        campaign.status = status;
        let campaign_id = campaign.id;
        campaigns.insert(campaign);

        Fixture {
            service,
            ledger,
            gateway,
            events,
            campaign_id,
        }
    }

    async fn begin(fx: &Fixture, time: &SafeTimeProvider) -> Result<CheckoutStarted> {
        fx.service
            .begin(fx.campaign_id, DonorInfo::anonymous(), Money::from_major(750), PaymentMethod::Checkout, time)
            .await
    }

    #[tokio::test]
    async fn test_begin_records_checkout() {
        let time = time();
        let fx = fixture(CampaignStatus::Active, &time);

        let started = begin(&fx, &time).await.unwrap();
        assert_eq!(started.donation.status(), DonationStatus::Pending);
        assert!(started.checkout_url.starts_with("https://checkout.mock/"));

        let stored = fx.ledger.get(started.donation.id).unwrap();
        assert!(stored.provider_checkout_id.is_some());

        let requests = fx.gateway.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].reference, started.donation.reference);
        assert_eq!(requests[0].currency, "PHP");
        assert!(requests[0].redirect_urls.success.ends_with(&format!("/payments/success?id={}", started.donation.reference)));
    }

    #[tokio::test]
    async fn test_inactive_campaign_never_reaches_gateway() {
        let time = time();
        let fx = fixture(CampaignStatus::PendingReview, &time);

        let result = begin(&fx, &time).await;
        assert!(matches!(result, Err(LedgerError::CampaignNotAcceptingDonations { .. })));
        assert!(fx.gateway.requests().is_empty());
        assert!(fx.ledger.for_campaign(fx.campaign_id).is_empty());
    }

    #[tokio::test]
    async fn test_gateway_error_rolls_back() {
        let time = time();
        let fx = fixture(CampaignStatus::Active, &time);

        fx.gateway.set_behaviour(MockBehaviour::Reject("invalid amount".to_string()));
        assert!(matches!(begin(&fx, &time).await, Err(LedgerError::Gateway { .. })));

        fx.gateway.set_behaviour(MockBehaviour::Unavailable);
        let err = begin(&fx, &time).await.unwrap_err();
        assert!(err.is_retryable());

        assert!(fx.ledger.for_campaign(fx.campaign_id).is_empty());
        let rollbacks = fx
            .events
            .lock()
            .events()
            .iter()
            .filter(|e| matches!(e, Event::DonationRolledBack { .. }))
            .count();
        assert_eq!(rollbacks, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_gateway_times_out() {
        let time = time();
        let fx = fixture(CampaignStatus::Active, &time);

        fx.gateway.set_behaviour(MockBehaviour::Delay(Duration::from_secs(30)));
        let result = begin(&fx, &time).await;
        assert!(matches!(result, Err(LedgerError::GatewayUnavailable { .. })));
        assert!(fx.ledger.for_campaign(fx.campaign_id).is_empty());

        // within the limit the slow gateway still succeeds
        fx.gateway.set_behaviour(MockBehaviour::Delay(Duration::from_secs(2)));
        assert!(begin(&fx, &time).await.is_ok());
        assert_eq!(fx.ledger.for_campaign(fx.campaign_id).len(), 1);
    }
}
