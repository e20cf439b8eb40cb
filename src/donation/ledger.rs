//! Donation ledger.
//!
//! `settle` is the only writer of `Campaign::raised_amount`. It takes the
//! campaign row lock, then the donation lock, and only credits while the
//! donation is still pending, so repeated or concurrent deliveries of the
//! same notification credit the campaign once.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use hourglass_rs::SafeTimeProvider;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::campaign::{lifecycle, Campaign, CampaignStore};
use crate::decimal::Money;
use crate::donation::{generate_reference, Donation, DonationHandle, DonationStore, DonorInfo};
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::types::{
    CampaignId, CampaignStatus, DonationId, DonationStatus, PaymentMethod, SettlementOutcome,
    UserId,
};

/// result of one `settle` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub donation_id: DonationId,
    pub campaign_id: CampaignId,
    pub reference: String,
    /// donation status after the call
    pub status: DonationStatus,
    /// false when the donation was already terminal and nothing changed
    pub applied: bool,
    /// this call moved the campaign to completed
    pub campaign_completed: bool,
    pub raised_amount: Money,
}

pub struct DonationLedger {
    campaigns: Arc<CampaignStore>,
    donations: Arc<DonationStore>,
    events: Arc<Mutex<EventStore>>,
}

impl DonationLedger {
    pub fn new(
        campaigns: Arc<CampaignStore>,
        donations: Arc<DonationStore>,
        events: Arc<Mutex<EventStore>>,
    ) -> Self {
        Self {
            campaigns,
            donations,
            events,
        }
    }

    pub fn store(&self) -> &DonationStore {
        &self.donations
    }

    /// open a pending donation against an active campaign
    pub fn open(
        &self,
        campaign_id: CampaignId,
        donor: DonorInfo,
        amount: Money,
        method: PaymentMethod,
        time: &SafeTimeProvider,
    ) -> Result<Donation> {
        if !amount.is_positive() {
            return Err(LedgerError::validation("amount", "must be greater than zero"));
        }

        let handle = self.campaigns.handle(campaign_id)?;
        let campaign = handle.lock();
        if campaign.is_deleted() {
            return Err(LedgerError::not_found("campaign", campaign_id));
        }
        if !campaign.is_accepting_donations() {
            warn!(campaign_id = %campaign_id, status = %campaign.status(), "donation refused");
            return Err(LedgerError::CampaignNotAcceptingDonations {
                status: campaign.status(),
            });
        }

        let now = time.now();
        let donation = Donation {
            id: Uuid::new_v4(),
            campaign_id,
            donor_id: donor.donor_id,
            institution_id: Some(campaign.institution_id),
            amount,
            status: DonationStatus::Pending,
            payment_method: method,
            reference: generate_reference(),
            provider_checkout_id: None,
            is_anonymous: donor.is_anonymous,
            donor_name: donor.name,
            donor_email: donor.email,
            message: donor.message,
            created_at: now,
            updated_at: now,
            settled_at: None,
        };
        // inserted under the campaign lock so a concurrent close cannot slip in between
        self.donations.insert(donation.clone());
        drop(campaign);

        self.events.lock().emit(Event::DonationOpened {
            donation_id: donation.id,
            campaign_id,
            amount,
            reference: donation.reference.clone(),
            timestamp: now,
        });
        info!(
            donation_id = %donation.id,
            campaign_id = %campaign_id,
            amount = %amount,
            reference = %donation.reference,
            "donation opened"
        );
        Ok(donation)
    }

    /// record the gateway's checkout id on a pending donation
    pub fn attach_checkout(
        &self,
        donation_id: DonationId,
        provider_checkout_id: &str,
        time: &SafeTimeProvider,
    ) -> Result<Donation> {
        let handle = self.donations.handle(donation_id)?;
        let mut donation = handle.lock();
        if donation.status != DonationStatus::Pending {
            return Err(LedgerError::invalid_donation_state(donation.status, "pending"));
        }
        donation.provider_checkout_id = Some(provider_checkout_id.to_string());
        donation.updated_at = time.now();
        Ok(donation.clone())
    }

    /// drop a pending donation whose checkout never started
    ///
    /// Runs under the campaign lock, then the donation lock, like `settle`. The
    /// detached row is marked cancelled, so a settle that resolved it before
    /// the removal finds it terminal and credits nothing.
    pub fn discard_pending(&self, donation_id: DonationId, reason: &str, time: &SafeTimeProvider) -> Result<()> {
        let donation_handle = self.donations.handle(donation_id)?;
        let campaign_id = donation_handle.lock().campaign_id;

        let campaign_handle = self.campaigns.handle(campaign_id)?;
        let _campaign = campaign_handle.lock();
        let mut donation = donation_handle.lock();
        if donation.status != DonationStatus::Pending {
            return Err(LedgerError::invalid_donation_state(donation.status, "pending"));
        }

        let now = time.now();
        donation.status = DonationStatus::Cancelled;
        donation.updated_at = now;
        self.donations.unlink(&donation);

        self.events.lock().emit(Event::DonationRolledBack {
            donation_id,
            reference: donation.reference.clone(),
            reason: reason.to_string(),
            timestamp: now,
        });
        warn!(donation_id = %donation_id, reference = %donation.reference, reason, "pending donation rolled back");
        Ok(())
    }

    /// apply a gateway outcome; safe to call any number of times
    pub fn settle(
        &self,
        reference: &str,
        outcome: SettlementOutcome,
        time: &SafeTimeProvider,
    ) -> Result<SettlementReceipt> {
        let donation_handle = match self.donations.handle_by_reference(reference) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(reference, outcome = ?outcome, "settlement for unknown reference");
                return Err(e);
            }
        };
        self.settle_handle(&donation_handle, reference, outcome, time)
    }

    fn settle_handle(
        &self,
        donation_handle: &DonationHandle,
        reference: &str,
        outcome: SettlementOutcome,
        time: &SafeTimeProvider,
    ) -> Result<SettlementReceipt> {
        // campaign_id never changes, so reading it outside the row lock is fine
        let campaign_id = donation_handle.lock().campaign_id;

        let campaign_handle = self.campaigns.handle(campaign_id)?;
        let mut campaign = campaign_handle.lock();
        let mut donation = donation_handle.lock();

        if donation.status.is_terminal() {
            debug!(reference, status = %donation.status, "donation already settled");
            return Ok(SettlementReceipt {
                donation_id: donation.id,
                campaign_id,
                reference: reference.to_string(),
                status: donation.status,
                applied: false,
                campaign_completed: false,
                raised_amount: campaign.raised_amount(),
            });
        }

        let now = time.now();
        let new_status = outcome.target_status();
        let mut campaign_completed = false;

        if new_status == DonationStatus::Completed {
            let new_raised = campaign.raised_amount.checked_add(donation.amount).ok_or_else(|| {
                error!(campaign_id = %campaign_id, reference, "raised amount overflow");
                LedgerError::InvariantViolation {
                    message: format!("raised amount overflow on campaign {campaign_id}"),
                }
            })?;
            campaign.raised_amount = new_raised;
            campaign.updated_at = now;
            campaign_completed = lifecycle::try_auto_complete(&mut campaign, now);
        }

        donation.status = new_status;
        donation.settled_at = Some(now);
        donation.updated_at = now;

        let receipt = SettlementReceipt {
            donation_id: donation.id,
            campaign_id,
            reference: reference.to_string(),
            status: new_status,
            applied: true,
            campaign_completed,
            raised_amount: campaign.raised_amount(),
        };
        self.record_settlement(&campaign, &donation, &receipt, now);
        Ok(receipt)
    }

    fn record_settlement(
        &self,
        campaign: &Campaign,
        donation: &Donation,
        receipt: &SettlementReceipt,
        now: DateTime<Utc>,
    ) {
        let mut events = self.events.lock();
        events.emit(Event::DonationSettled {
            donation_id: donation.id,
            campaign_id: campaign.id,
            status: receipt.status,
            timestamp: now,
        });

        if receipt.status == DonationStatus::Completed {
            events.emit(Event::CampaignCredited {
                campaign_id: campaign.id,
                donation_id: donation.id,
                amount: donation.amount,
                new_raised: receipt.raised_amount,
                timestamp: now,
            });
            info!(
                campaign_id = %campaign.id,
                reference = %donation.reference,
                amount = %donation.amount,
                raised = %receipt.raised_amount,
                "campaign credited"
            );
        } else {
            info!(reference = %donation.reference, status = %receipt.status, "donation settled without credit");
        }

        if receipt.campaign_completed {
            events.emit(Event::CampaignStatusChanged {
                campaign_id: campaign.id,
                old_status: CampaignStatus::Active,
                new_status: CampaignStatus::Completed,
                actor: None,
                reason: "goal reached".to_string(),
                timestamp: now,
            });
            info!(campaign_id = %campaign.id, raised = %receipt.raised_amount, "campaign goal reached");
        }
    }

    pub fn get(&self, donation_id: DonationId) -> Result<Donation> {
        self.donations.get(donation_id)
    }

    pub fn by_reference(&self, reference: &str) -> Result<Donation> {
        self.donations.by_reference(reference)
    }

    pub fn for_campaign(&self, campaign_id: CampaignId) -> Vec<Donation> {
        self.donations.for_campaign(campaign_id)
    }

    pub fn completed_for_campaign(&self, campaign_id: CampaignId) -> Vec<Donation> {
        self.for_campaign(campaign_id)
            .into_iter()
            .filter(|d| d.status == DonationStatus::Completed)
            .collect()
    }

    pub fn for_donor(&self, donor_id: UserId) -> Vec<Donation> {
        let mut donations: Vec<Donation> = self
            .donations
            .all()
            .into_iter()
            .filter(|d| d.donor_id == Some(donor_id))
            .collect();
        donations.sort_by_key(|d| d.created_at);
        donations
    }

    /// pending donations older than `max_age`, for an external expiry sweep
    pub fn stale_pending(&self, max_age: Duration, time: &SafeTimeProvider) -> Vec<Donation> {
        let cutoff = time.now() - max_age;
        let mut stale: Vec<Donation> = self
            .donations
            .all()
            .into_iter()
            .filter(|d| d.status == DonationStatus::Pending && d.created_at <= cutoff)
            .collect();
        stale.sort_by_key(|d| d.created_at);
        stale
    }

    /// recompute the completed sum and compare with the campaign's raised amount
    pub fn audit_campaign(&self, campaign_id: CampaignId) -> Result<Money> {
        let handle = self.campaigns.handle(campaign_id)?;
        let campaign = handle.lock();
        // holding the campaign lock blocks settle for this campaign
        let completed: Money = self
            .donations
            .for_campaign(campaign_id)
            .iter()
            .filter(|d| d.status == DonationStatus::Completed)
            .map(|d| d.amount)
            .sum();

        if completed != campaign.raised_amount() {
            error!(
                campaign_id = %campaign_id,
                raised = %campaign.raised_amount(),
                completed = %completed,
                "raised amount does not match completed donations"
            );
            return Err(LedgerError::InvariantViolation {
                message: format!(
                    "campaign {campaign_id} raised {} but completed donations sum to {completed}",
                    campaign.raised_amount()
                ),
            });
        }
        Ok(completed)
    }
}
