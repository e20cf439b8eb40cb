pub mod ledger;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{CampaignId, DonationId, DonationStatus, InstitutionId, PaymentMethod, UserId};

pub use ledger::{DonationLedger, SettlementReceipt};

/// a single contribution toward a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: DonationId,
    pub campaign_id: CampaignId,
    pub donor_id: Option<UserId>,
    /// copied from the campaign for tenant-scoped queries
    pub institution_id: Option<InstitutionId>,

    pub amount: Money,
    pub(crate) status: DonationStatus,
    pub payment_method: PaymentMethod,
    /// unique reference sent to the gateway as `requestReferenceNumber`
    pub reference: String,
    pub provider_checkout_id: Option<String>,

    pub is_anonymous: bool,
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Donation {
    pub fn status(&self) -> DonationStatus {
        self.status
    }

    pub fn is_settled(&self) -> bool {
        self.status.is_terminal()
    }
}

/// gateway reference for a new donation
pub fn generate_reference() -> String {
    format!("DON-{}", Uuid::new_v4().simple()).to_uppercase()
}

/// who is giving, as captured at checkout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DonorInfo {
    pub donor_id: Option<UserId>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub is_anonymous: bool,
    pub message: Option<String>,
}

impl DonorInfo {
    pub fn anonymous() -> Self {
        Self {
            is_anonymous: true,
            ..Default::default()
        }
    }

    pub fn named(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: Some(email.into()),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, donor_id: UserId) -> Self {
        self.donor_id = Some(donor_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

pub type DonationHandle = Arc<Mutex<Donation>>;

/// in-memory donation table with reference and campaign indexes
#[derive(Debug, Default)]
pub struct DonationStore {
    donations: DashMap<DonationId, DonationHandle>,
    by_reference: DashMap<String, DonationId>,
    by_campaign: DashMap<CampaignId, Vec<DonationId>>,
}

impl DonationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, donation: Donation) {
        let (id, campaign_id, reference) = (donation.id, donation.campaign_id, donation.reference.clone());
        self.donations.insert(id, Arc::new(Mutex::new(donation)));
        self.by_reference.insert(reference, id);
        self.by_campaign.entry(campaign_id).or_default().push(id);
    }

    pub(crate) fn remove(&self, id: DonationId) -> Option<Donation> {
        let donation = self.handle(id).ok()?.lock().clone();
        self.unlink(&donation);
        Some(donation)
    }

    /// drop a row and its index entries; never locks the row, so callers may hold it
    pub(crate) fn unlink(&self, donation: &Donation) {
        self.donations.remove(&donation.id);
        self.by_reference.remove(&donation.reference);
        if let Some(mut ids) = self.by_campaign.get_mut(&donation.campaign_id) {
            ids.retain(|d| *d != donation.id);
        }
    }

    pub(crate) fn handle(&self, id: DonationId) -> Result<DonationHandle> {
        self.donations
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LedgerError::not_found("donation", id))
    }

    pub(crate) fn handle_by_reference(&self, reference: &str) -> Result<DonationHandle> {
        let id = self
            .by_reference
            .get(reference)
            .map(|entry| *entry.value())
            .ok_or_else(|| LedgerError::UnknownReference {
                reference: reference.to_string(),
            })?;
        self.handle(id).map_err(|_| LedgerError::UnknownReference {
            reference: reference.to_string(),
        })
    }

    pub fn get(&self, id: DonationId) -> Result<Donation> {
        Ok(self.handle(id)?.lock().clone())
    }

    pub fn by_reference(&self, reference: &str) -> Result<Donation> {
        Ok(self.handle_by_reference(reference)?.lock().clone())
    }

    /// every donation of a campaign, oldest first
    pub fn for_campaign(&self, campaign_id: CampaignId) -> Vec<Donation> {
        let ids: Vec<DonationId> = self
            .by_campaign
            .get(&campaign_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        let mut donations: Vec<Donation> = ids
            .into_iter()
            .filter_map(|id| self.handle(id).ok())
            .map(|handle| handle.lock().clone())
            .collect();
        donations.sort_by_key(|d| d.created_at);
        donations
    }

    pub fn all(&self) -> Vec<Donation> {
        let handles: Vec<DonationHandle> = self
            .donations
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        handles.iter().map(|handle| handle.lock().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn donation(campaign_id: CampaignId) -> Donation {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        Donation {
            id: Uuid::new_v4(),
            campaign_id,
            donor_id: None,
            institution_id: None,
            amount: Money::from_major(500),
            status: DonationStatus::Pending,
            payment_method: PaymentMethod::Checkout,
            reference: generate_reference(),
            provider_checkout_id: None,
            is_anonymous: false,
            donor_name: None,
            donor_email: None,
            message: None,
            created_at: now,
            updated_at: now,
            settled_at: None,
        }
    }

    #[test]
    fn test_references_are_unique() {
        let a = generate_reference();
        let b = generate_reference();
        assert_ne!(a, b);
        assert!(a.starts_with("DON-"));
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_store_indexes() {
        let store = DonationStore::new();
        let campaign_id = Uuid::new_v4();
        let d = donation(campaign_id);
        let (id, reference) = (d.id, d.reference.clone());
        store.insert(d);
        store.insert(donation(campaign_id));

        assert_eq!(store.by_reference(&reference).unwrap().id, id);
        assert_eq!(store.for_campaign(campaign_id).len(), 2);
        assert!(matches!(
            store.by_reference("DON-MISSING"),
            Err(LedgerError::UnknownReference { .. })
        ));

        let removed = store.remove(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(store.get(id).is_err());
        assert!(store.by_reference(&reference).is_err());
        assert_eq!(store.for_campaign(campaign_id).len(), 1);
    }

    #[test]
    fn test_donor_builders() {
        let donor = DonorInfo::named("Ana Cruz", "ana@example.com").with_message("Go Eagles");
        assert!(!donor.is_anonymous);
        assert_eq!(donor.message.as_deref(), Some("Go Eagles"));
        assert!(DonorInfo::anonymous().is_anonymous);
    }
}
