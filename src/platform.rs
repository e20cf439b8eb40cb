//! Wiring of the stores and services that make up one ledger instance.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::bank_account::BankAccountRegistry;
use crate::campaign::{CampaignLifecycle, CampaignStore};
use crate::checkout::CheckoutService;
use crate::config::LedgerConfig;
use crate::donation::{DonationLedger, DonationStore};
use crate::errors::Result;
use crate::events::{Event, EventStore};
use crate::gateway::{MayaGateway, PaymentGateway};
use crate::settlement::SettlementReconciler;
use crate::types::CampaignId;
use crate::views::{CampaignSummary, DonationReceipt};

/// one tenant-agnostic ledger: stores, services and the shared event sink
pub struct FundingPlatform {
    config: LedgerConfig,
    events: Arc<Mutex<EventStore>>,
    lifecycle: CampaignLifecycle,
    accounts: Arc<BankAccountRegistry>,
    ledger: Arc<DonationLedger>,
    reconciler: SettlementReconciler,
    checkout: CheckoutService,
}

impl FundingPlatform {
    pub fn new(config: LedgerConfig, gateway: Arc<dyn PaymentGateway>) -> Self {
        let events = Arc::new(Mutex::new(EventStore::new()));
        let campaigns = Arc::new(CampaignStore::new());
        let accounts = Arc::new(BankAccountRegistry::new(Arc::clone(&events)));
        let ledger = Arc::new(DonationLedger::new(
            Arc::clone(&campaigns),
            Arc::new(DonationStore::new()),
            Arc::clone(&events),
        ));

        Self {
            lifecycle: CampaignLifecycle::new(campaigns, Arc::clone(&accounts), Arc::clone(&events)),
            reconciler: SettlementReconciler::new(Arc::clone(&ledger), Arc::clone(&gateway)),
            checkout: CheckoutService::new(Arc::clone(&ledger), gateway, config.clone()),
            config,
            events,
            accounts,
            ledger,
        }
    }

    /// validate the config and connect to Maya
    pub fn with_maya(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let gateway = Arc::new(MayaGateway::new(config.gateway.clone())?);
        Ok(Self::new(config, gateway))
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn campaigns(&self) -> &CampaignLifecycle {
        &self.lifecycle
    }

    pub fn bank_accounts(&self) -> &BankAccountRegistry {
        &self.accounts
    }

    pub fn donations(&self) -> &DonationLedger {
        &self.ledger
    }

    pub fn settlement(&self) -> &SettlementReconciler {
        &self.reconciler
    }

    pub fn checkout(&self) -> &CheckoutService {
        &self.checkout
    }

    pub fn campaign_summary(&self, campaign_id: CampaignId) -> Result<CampaignSummary> {
        let campaign = self.lifecycle.store().get(campaign_id)?;
        let donations = self.ledger.for_campaign(campaign_id);
        Ok(CampaignSummary::from_campaign(&campaign, &donations))
    }

    pub fn donation_receipt(&self, reference: &str) -> Result<DonationReceipt> {
        let donation = self.ledger.by_reference(reference)?;
        let campaign = self.lifecycle.store().get(donation.campaign_id)?;
        Ok(DonationReceipt::from_donation(&donation, &campaign))
    }

    /// drain the audit events collected so far
    pub fn take_events(&self) -> Vec<Event> {
        self.events.lock().take_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::CampaignDraft;
    use crate::decimal::Money;
    use crate::donation::DonorInfo;
    use crate::gateway::MockGateway;
    use crate::types::{CampaignStatus, DonationStatus, PaymentMethod};
    use chrono::{TimeZone, Utc};
    use hourglass_rs::{SafeTimeProvider, TimeSource};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_donation_flow_end_to_end() {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()));
        let gateway = Arc::new(MockGateway::new("whsec"));
        let platform = FundingPlatform::new(LedgerConfig::sandbox("whsec"), gateway.clone());

        let draft = CampaignDraft::general(Uuid::new_v4(), Uuid::new_v4(), "Band uniforms", Money::from_major(1_000));
        let campaign = platform.campaigns().submit(draft, &time).unwrap();
        platform.campaigns().approve(campaign.id, Uuid::new_v4(), None, &time).unwrap();

        let started = platform
            .checkout()
            .begin(campaign.id, DonorInfo::named("Ben", "ben@example.com"), Money::from_major(1_000), PaymentMethod::Checkout, &time)
            .await
            .unwrap();
        let reference = started.donation.reference.clone();

        let (body, signature) = gateway.signed_notification(&reference, "PAYMENT_SUCCESS").unwrap();
        platform.settlement().handle(&body, Some(&signature), &time).unwrap();

        let summary = platform.campaign_summary(campaign.id).unwrap();
        assert_eq!(summary.status, CampaignStatus::Completed);
        assert_eq!(summary.funding.raised_amount, Money::from_major(1_000));
        assert_eq!(summary.funding.completed_donations, 1);

        let receipt = platform.donation_receipt(&reference).unwrap();
        assert_eq!(receipt.status, DonationStatus::Completed);
        assert_eq!(receipt.donor_display_name, "Ben");

        assert!(platform.donations().audit_campaign(campaign.id).is_ok());
        assert!(!platform.take_events().is_empty());
        assert!(platform.take_events().is_empty());
    }
}
