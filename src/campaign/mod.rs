pub mod lifecycle;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::types::{
    ApprovalDecision, ApprovalId, BankAccountId, CampaignId, CampaignPriority, CampaignStatus,
    CampaignType, InstitutionId, UserId,
};

pub use lifecycle::CampaignLifecycle;

/// a fundraising campaign owned by an institution
///
/// `status` and `raised_amount` are only reachable through accessors; the
/// lifecycle transitions and donation settlement are their sole writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub institution_id: InstitutionId,
    pub creator_id: UserId,
    pub beneficiary_id: Option<UserId>,
    pub payout_account_id: Option<BankAccountId>,

    pub title: String,
    pub description: String,
    pub goal_amount: Money,
    pub(crate) raised_amount: Money,
    pub campaign_type: CampaignType,
    pub(crate) status: CampaignStatus,
    pub priority: CampaignPriority,
    pub end_date: Option<NaiveDate>,

    pub rejection_reason: Option<String>,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// create a fresh campaign in review with nothing raised
    pub(crate) fn from_draft(draft: CampaignDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            institution_id: draft.institution_id,
            creator_id: draft.creator_id,
            beneficiary_id: draft.beneficiary_id,
            payout_account_id: None,
            title: draft.title.trim().to_string(),
            description: draft.description,
            goal_amount: draft.goal_amount,
            raised_amount: Money::ZERO,
            campaign_type: draft.campaign_type,
            status: CampaignStatus::PendingReview,
            priority: draft.priority,
            end_date: draft.end_date,
            rejection_reason: None,
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            deleted_at: None,
        }
    }

    pub fn status(&self) -> CampaignStatus {
        self.status
    }

    pub fn raised_amount(&self) -> Money {
        self.raised_amount
    }

    /// amount still needed to reach the goal
    pub fn remaining(&self) -> Money {
        self.goal_amount.saturating_sub(self.raised_amount)
    }

    pub fn progress(&self) -> Rate {
        Rate::ratio(self.raised_amount, self.goal_amount)
    }

    pub fn goal_reached(&self) -> bool {
        self.raised_amount >= self.goal_amount
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// check if campaign can take new donations
    pub fn is_accepting_donations(&self) -> bool {
        !self.is_deleted() && self.status == CampaignStatus::Active
    }
}

/// submission input for a new campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignDraft {
    pub institution_id: InstitutionId,
    pub creator_id: UserId,
    pub beneficiary_id: Option<UserId>,
    pub title: String,
    pub description: String,
    pub goal_amount: Money,
    pub campaign_type: CampaignType,
    pub priority: CampaignPriority,
    pub end_date: Option<NaiveDate>,
}

impl CampaignDraft {
    /// general campaign with normal priority and no end date
    pub fn general(
        institution_id: InstitutionId,
        creator_id: UserId,
        title: impl Into<String>,
        goal_amount: Money,
    ) -> Self {
        Self {
            institution_id,
            creator_id,
            beneficiary_id: None,
            title: title.into(),
            description: String::new(),
            goal_amount,
            campaign_type: CampaignType::General,
            priority: CampaignPriority::Normal,
            end_date: None,
        }
    }

    pub fn validate(&self, today: NaiveDate) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(LedgerError::validation("title", "must not be empty"));
        }
        validate_goal(self.goal_amount)?;
        if let Some(end_date) = self.end_date {
            if end_date < today {
                return Err(LedgerError::validation("end_date", "must not be in the past"));
            }
        }
        if self.campaign_type == CampaignType::Individual && self.beneficiary_id.is_none() {
            return Err(LedgerError::validation(
                "beneficiary_id",
                "individual campaigns need a beneficiary",
            ));
        }
        Ok(())
    }
}

/// editable campaign details; status and raised amount are deliberately absent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub goal_amount: Option<Money>,
    pub priority: Option<CampaignPriority>,
    pub end_date: Option<Option<NaiveDate>>,
}

pub(crate) fn validate_goal(goal: Money) -> Result<()> {
    if !goal.is_positive() {
        return Err(LedgerError::validation("goal_amount", "must be greater than zero"));
    }
    Ok(())
}

/// append-only audit row for one committee decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignApproval {
    pub id: ApprovalId,
    pub campaign_id: CampaignId,
    pub actor: UserId,
    pub decision: ApprovalDecision,
    pub comments: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// shared handle to one campaign row; holding its lock is the row lock
pub type CampaignHandle = Arc<Mutex<Campaign>>;

/// in-memory campaign table plus the approval trail
#[derive(Debug, Default)]
pub struct CampaignStore {
    campaigns: DashMap<CampaignId, CampaignHandle>,
    approvals: Mutex<HashMap<CampaignId, Vec<CampaignApproval>>>,
}

impl CampaignStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, campaign: Campaign) {
        self.campaigns.insert(campaign.id, Arc::new(Mutex::new(campaign)));
    }

    /// row handle, soft-deleted rows included
    pub(crate) fn handle(&self, id: CampaignId) -> Result<CampaignHandle> {
        // clone the Arc out so no shard lock is held while the row is locked
        self.campaigns
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LedgerError::not_found("campaign", id))
    }

    pub(crate) fn append_approval(&self, approval: CampaignApproval) {
        self.approvals
            .lock()
            .entry(approval.campaign_id)
            .or_default()
            .push(approval);
    }

    /// snapshot of a live campaign
    pub fn get(&self, id: CampaignId) -> Result<Campaign> {
        let campaign = self.handle(id)?.lock().clone();
        if campaign.is_deleted() {
            return Err(LedgerError::not_found("campaign", id));
        }
        Ok(campaign)
    }

    /// approval history in decision order
    pub fn approvals(&self, campaign_id: CampaignId) -> Vec<CampaignApproval> {
        self.approvals
            .lock()
            .get(&campaign_id)
            .cloned()
            .unwrap_or_default()
    }

    fn live_snapshots(&self) -> Vec<Campaign> {
        let handles: Vec<CampaignHandle> = self
            .campaigns
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut campaigns: Vec<Campaign> = handles
            .iter()
            .map(|handle| handle.lock().clone())
            .filter(|campaign| !campaign.is_deleted())
            .collect();
        campaigns.sort_by_key(|c| c.created_at);
        campaigns
    }

    pub fn for_institution(&self, institution_id: InstitutionId) -> Vec<Campaign> {
        self.live_snapshots()
            .into_iter()
            .filter(|c| c.institution_id == institution_id)
            .collect()
    }

    pub fn with_status(&self, status: CampaignStatus) -> Vec<Campaign> {
        self.live_snapshots()
            .into_iter()
            .filter(|c| c.status == status)
            .collect()
    }

    /// campaigns waiting on the committee, urgent ones first
    pub fn review_queue(&self, institution_id: InstitutionId) -> Vec<Campaign> {
        let mut queue: Vec<Campaign> = self
            .for_institution(institution_id)
            .into_iter()
            .filter(|c| c.status == CampaignStatus::PendingReview)
            .collect();
        queue.sort_by_key(|c| (c.priority != CampaignPriority::Urgent, c.created_at));
        queue
    }
}
