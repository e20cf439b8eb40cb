use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{
    BankAccountId, CampaignId, CampaignStatus, DonationId, DonationStatus, InstitutionId, UserId,
};

/// all events emitted by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // campaign lifecycle events
    CampaignSubmitted {
        campaign_id: CampaignId,
        institution_id: InstitutionId,
        goal_amount: Money,
        timestamp: DateTime<Utc>,
    },
    CampaignStatusChanged {
        campaign_id: CampaignId,
        old_status: CampaignStatus,
        new_status: CampaignStatus,
        actor: Option<UserId>,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    CampaignDetailsUpdated {
        campaign_id: CampaignId,
        timestamp: DateTime<Utc>,
    },
    PayoutAccountDesignated {
        campaign_id: CampaignId,
        account_id: BankAccountId,
        timestamp: DateTime<Utc>,
    },
    CampaignDeleted {
        campaign_id: CampaignId,
        actor: UserId,
        timestamp: DateTime<Utc>,
    },

    // donation events
    DonationOpened {
        donation_id: DonationId,
        campaign_id: CampaignId,
        amount: Money,
        reference: String,
        timestamp: DateTime<Utc>,
    },
    DonationSettled {
        donation_id: DonationId,
        campaign_id: CampaignId,
        status: DonationStatus,
        timestamp: DateTime<Utc>,
    },
    DonationRolledBack {
        donation_id: DonationId,
        reference: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    CampaignCredited {
        campaign_id: CampaignId,
        donation_id: DonationId,
        amount: Money,
        new_raised: Money,
        timestamp: DateTime<Utc>,
    },

    // bank account events
    BankAccountCreated {
        account_id: BankAccountId,
        institution_id: InstitutionId,
        timestamp: DateTime<Utc>,
    },
    BankAccountUpdated {
        account_id: BankAccountId,
        timestamp: DateTime<Utc>,
    },
    BankAccountDeleted {
        account_id: BankAccountId,
        timestamp: DateTime<Utc>,
    },
    PrimaryAccountChanged {
        institution_id: InstitutionId,
        previous: Option<BankAccountId>,
        current: Option<BankAccountId>,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// campaign the event concerns, if any
    pub fn campaign_id(&self) -> Option<CampaignId> {
        match self {
            Event::CampaignSubmitted { campaign_id, .. }
            | Event::CampaignStatusChanged { campaign_id, .. }
            | Event::CampaignDetailsUpdated { campaign_id, .. }
            | Event::PayoutAccountDesignated { campaign_id, .. }
            | Event::CampaignDeleted { campaign_id, .. }
            | Event::DonationOpened { campaign_id, .. }
            | Event::DonationSettled { campaign_id, .. }
            | Event::CampaignCredited { campaign_id, .. } => Some(*campaign_id),
            _ => None,
        }
    }
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_filter_by_campaign_and_clear() {
        let now = Utc::now();
        let (ours, theirs) = (Uuid::new_v4(), Uuid::new_v4());
        let mut store = EventStore::new();
        store.emit(Event::CampaignDetailsUpdated { campaign_id: ours, timestamp: now });
        store.emit(Event::CampaignDetailsUpdated { campaign_id: theirs, timestamp: now });
        store.emit(Event::DonationRolledBack {
            donation_id: Uuid::new_v4(),
            reference: "DON-X".to_string(),
            reason: "gateway timeout".to_string(),
            timestamp: now,
        });
        store.emit(Event::BankAccountDeleted { account_id: Uuid::new_v4(), timestamp: now });

        let mine = store.events().iter().filter(|e| e.campaign_id() == Some(ours)).count();
        assert_eq!(mine, 1);
        assert_eq!(store.events().iter().filter(|e| e.campaign_id().is_none()).count(), 2);

        store.clear();
        assert!(store.events().is_empty());
        assert!(store.take_events().is_empty());
    }
}
