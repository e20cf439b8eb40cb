//! Campaign approval lifecycle.
//!
//! ```text
//! pending_review ──► active ──► completed
//!       │               └──────► closed
//!       └──► rejected
//! ```
//!
//! `close` is accepted from every state except `closed`. The free functions
//! are the transitions themselves and run on a locked campaign row;
//! [`CampaignLifecycle`] takes the row lock, applies one, and appends to the
//! approval trail inside the same critical section.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bank_account::BankAccountRegistry;
use crate::campaign::{
    validate_goal, Campaign, CampaignApproval, CampaignChanges, CampaignDraft, CampaignStore,
};
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::types::{Actor, ApprovalDecision, BankAccountId, CampaignId, CampaignStatus};

fn require_text<'a>(field: &'static str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::validation(field, "is required"));
    }
    Ok(trimmed)
}

fn non_empty(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

fn record(campaign: &Campaign, actor: Actor, decision: ApprovalDecision, comments: Option<String>, now: DateTime<Utc>) -> CampaignApproval {
    CampaignApproval {
        id: Uuid::new_v4(),
        campaign_id: campaign.id,
        actor,
        decision,
        comments,
        decided_at: now,
    }
}

/// pending_review -> active
pub fn approve(
    campaign: &mut Campaign,
    actor: Actor,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CampaignApproval> {
    if campaign.status != CampaignStatus::PendingReview {
        return Err(LedgerError::invalid_campaign_state(campaign.status, "pending_review"));
    }

    campaign.status = CampaignStatus::Active;
    campaign.approved_by = Some(actor);
    campaign.approved_at = Some(now);
    campaign.updated_at = now;

    Ok(record(campaign, actor, ApprovalDecision::Approved, non_empty(notes), now))
}

/// pending_review -> rejected; `reason` is mandatory
pub fn reject(
    campaign: &mut Campaign,
    actor: Actor,
    reason: &str,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CampaignApproval> {
    let reason = require_text("reason", reason)?;
    if campaign.status != CampaignStatus::PendingReview {
        return Err(LedgerError::invalid_campaign_state(campaign.status, "pending_review"));
    }

    let comments = match non_empty(notes) {
        Some(notes) => format!("{reason}\n\nNotes: {notes}"),
        None => reason.to_string(),
    };

    campaign.status = CampaignStatus::Rejected;
    campaign.rejection_reason = Some(reason.to_string());
    campaign.updated_at = now;

    Ok(record(campaign, actor, ApprovalDecision::Rejected, Some(comments), now))
}

/// any state except closed -> closed; `reason` is mandatory
pub fn close(
    campaign: &mut Campaign,
    actor: Actor,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<CampaignApproval> {
    let reason = require_text("reason", reason)?;
    if campaign.status == CampaignStatus::Closed {
        return Err(LedgerError::invalid_campaign_state(campaign.status, "not closed"));
    }

    campaign.status = CampaignStatus::Closed;
    campaign.updated_at = now;

    Ok(record(
        campaign,
        actor,
        ApprovalDecision::Rejected,
        Some(format!("Closed: {reason}")),
        now,
    ))
}

/// active with goal met -> completed; returns whether a transition happened
pub fn try_auto_complete(campaign: &mut Campaign, now: DateTime<Utc>) -> bool {
    if campaign.status != CampaignStatus::Active || !campaign.goal_reached() {
        return false;
    }
    campaign.status = CampaignStatus::Completed;
    campaign.completed_at = Some(now);
    campaign.updated_at = now;
    true
}

/// explicit completion for when the notification path was bypassed
pub fn mark_completed(campaign: &mut Campaign, now: DateTime<Utc>) -> Result<()> {
    if campaign.status != CampaignStatus::Active {
        return Err(LedgerError::invalid_campaign_state(campaign.status, "active"));
    }
    if !campaign.goal_reached() {
        return Err(LedgerError::InvalidState {
            entity: "campaign",
            current: format!("active with {} of {} raised", campaign.raised_amount, campaign.goal_amount),
            expected: "active with goal reached".to_string(),
        });
    }
    try_auto_complete(campaign, now);
    Ok(())
}

/// committee-facing campaign operations
pub struct CampaignLifecycle {
    campaigns: Arc<CampaignStore>,
    accounts: Arc<BankAccountRegistry>,
    events: Arc<Mutex<EventStore>>,
}

impl CampaignLifecycle {
    pub fn new(
        campaigns: Arc<CampaignStore>,
        accounts: Arc<BankAccountRegistry>,
        events: Arc<Mutex<EventStore>>,
    ) -> Self {
        Self {
            campaigns,
            accounts,
            events,
        }
    }

    pub fn store(&self) -> &CampaignStore {
        &self.campaigns
    }

    /// create a campaign in pending_review with nothing raised
    pub fn submit(&self, draft: CampaignDraft, time: &SafeTimeProvider) -> Result<Campaign> {
        let now = time.now();
        draft.validate(now.date_naive())?;

        let campaign = Campaign::from_draft(draft, now);
        self.campaigns.insert(campaign.clone());

        self.events.lock().emit(Event::CampaignSubmitted {
            campaign_id: campaign.id,
            institution_id: campaign.institution_id,
            goal_amount: campaign.goal_amount,
            timestamp: now,
        });
        info!(campaign_id = %campaign.id, goal = %campaign.goal_amount, "campaign submitted for review");

        Ok(campaign)
    }

    pub fn approve(
        &self,
        campaign_id: CampaignId,
        actor: Actor,
        notes: Option<&str>,
        time: &SafeTimeProvider,
    ) -> Result<Campaign> {
        self.decide(campaign_id, actor, "approved", time, |campaign, now| {
            approve(campaign, actor, notes, now)
        })
    }

    pub fn reject(
        &self,
        campaign_id: CampaignId,
        actor: Actor,
        reason: &str,
        notes: Option<&str>,
        time: &SafeTimeProvider,
    ) -> Result<Campaign> {
        // validated before the row is touched
        require_text("reason", reason)?;
        self.decide(campaign_id, actor, reason, time, |campaign, now| {
            reject(campaign, actor, reason, notes, now)
        })
    }

    pub fn close(
        &self,
        campaign_id: CampaignId,
        actor: Actor,
        reason: &str,
        time: &SafeTimeProvider,
    ) -> Result<Campaign> {
        require_text("reason", reason)?;
        self.decide(campaign_id, actor, reason, time, |campaign, now| {
            close(campaign, actor, reason, now)
        })
    }

    /// idempotent goal check; no-op unless active with the goal met
    pub fn try_auto_complete(&self, campaign_id: CampaignId, time: &SafeTimeProvider) -> Result<bool> {
        let handle = self.campaigns.handle(campaign_id)?;
        let mut campaign = handle.lock();
        let now = time.now();
        let completed = try_auto_complete(&mut campaign, now);
        if completed {
            self.status_changed(&campaign, CampaignStatus::Active, None, "goal reached", now);
        }
        Ok(completed)
    }

    pub fn mark_completed_manually(
        &self,
        campaign_id: CampaignId,
        actor: Actor,
        time: &SafeTimeProvider,
    ) -> Result<Campaign> {
        let handle = self.campaigns.handle(campaign_id)?;
        let mut campaign = handle.lock();
        ensure_live(&campaign)?;
        let now = time.now();

        mark_completed(&mut campaign, now)?;
        self.status_changed(&campaign, CampaignStatus::Active, Some(actor), "completed manually", now);
        Ok(campaign.clone())
    }

    /// edit descriptive fields; never status or raised amount
    pub fn update_details(
        &self,
        campaign_id: CampaignId,
        changes: CampaignChanges,
        time: &SafeTimeProvider,
    ) -> Result<Campaign> {
        if let Some(title) = &changes.title {
            require_text("title", title)?;
        }
        if let Some(goal) = changes.goal_amount {
            validate_goal(goal)?;
        }

        let handle = self.campaigns.handle(campaign_id)?;
        let mut campaign = handle.lock();
        ensure_live(&campaign)?;
        if matches!(campaign.status, CampaignStatus::Closed | CampaignStatus::Rejected) {
            return Err(LedgerError::invalid_campaign_state(campaign.status, "pending_review, active or completed"));
        }
        // a completed campaign keeps the goal it completed against
        if changes.goal_amount.is_some() && campaign.status == CampaignStatus::Completed {
            return Err(LedgerError::invalid_campaign_state(campaign.status, "pending_review or active"));
        }

        let now = time.now();
        if let Some(title) = changes.title {
            campaign.title = title.trim().to_string();
        }
        if let Some(description) = changes.description {
            campaign.description = description;
        }
        if let Some(goal) = changes.goal_amount {
            campaign.goal_amount = goal;
        }
        if let Some(priority) = changes.priority {
            campaign.priority = priority;
        }
        if let Some(end_date) = changes.end_date {
            campaign.end_date = end_date;
        }
        campaign.updated_at = now;

        self.events.lock().emit(Event::CampaignDetailsUpdated {
            campaign_id,
            timestamp: now,
        });
        // a lowered goal may already be met
        if try_auto_complete(&mut campaign, now) {
            self.status_changed(&campaign, CampaignStatus::Active, None, "goal reached", now);
        }
        Ok(campaign.clone())
    }

    /// route payouts to an eligible account of the campaign's institution
    pub fn designate_payout_account(
        &self,
        campaign_id: CampaignId,
        account_id: BankAccountId,
        time: &SafeTimeProvider,
    ) -> Result<Campaign> {
        let handle = self.campaigns.handle(campaign_id)?;
        let mut campaign = handle.lock();
        ensure_live(&campaign)?;

        let now = time.now();
        let account = self.accounts.get(account_id)?;
        if account.institution_id != campaign.institution_id {
            return Err(LedgerError::PayoutAccountIneligible {
                reason: "account belongs to another institution".to_string(),
            });
        }
        if !account.is_usable_for_payout(now.date_naive()) {
            return Err(LedgerError::PayoutAccountIneligible {
                reason: "account is inactive or outside its effective window".to_string(),
            });
        }

        campaign.payout_account_id = Some(account_id);
        campaign.updated_at = now;
        self.events.lock().emit(Event::PayoutAccountDesignated {
            campaign_id,
            account_id,
            timestamp: now,
        });
        info!(campaign_id = %campaign_id, account_id = %account_id, "payout account designated");
        Ok(campaign.clone())
    }

    /// creator withdraws their own campaign while it is still in review
    pub fn withdraw(&self, campaign_id: CampaignId, actor: Actor, time: &SafeTimeProvider) -> Result<()> {
        let handle = self.campaigns.handle(campaign_id)?;
        let mut campaign = handle.lock();
        ensure_live(&campaign)?;

        if campaign.creator_id != actor {
            return Err(LedgerError::NotCampaignCreator);
        }
        if campaign.status != CampaignStatus::PendingReview {
            return Err(LedgerError::invalid_campaign_state(campaign.status, "pending_review"));
        }
        self.soft_delete(&mut campaign, actor, time.now());
        Ok(())
    }

    /// administrative removal, any state
    pub fn remove(&self, campaign_id: CampaignId, actor: Actor, time: &SafeTimeProvider) -> Result<()> {
        let handle = self.campaigns.handle(campaign_id)?;
        let mut campaign = handle.lock();
        ensure_live(&campaign)?;
        if campaign.raised_amount.is_positive() {
            warn!(campaign_id = %campaign_id, raised = %campaign.raised_amount, "removing campaign that holds settled funds");
        }
        self.soft_delete(&mut campaign, actor, time.now());
        Ok(())
    }

    fn soft_delete(&self, campaign: &mut Campaign, actor: Actor, now: DateTime<Utc>) {
        campaign.deleted_at = Some(now);
        campaign.updated_at = now;
        self.events.lock().emit(Event::CampaignDeleted {
            campaign_id: campaign.id,
            actor,
            timestamp: now,
        });
        info!(campaign_id = %campaign.id, actor = %actor, "campaign deleted");
    }

    /// lock the row, run one committee transition, append its approval row
    fn decide<F>(
        &self,
        campaign_id: CampaignId,
        actor: Actor,
        reason: &str,
        time: &SafeTimeProvider,
        transition: F,
    ) -> Result<Campaign>
    where
        F: FnOnce(&mut Campaign, DateTime<Utc>) -> Result<CampaignApproval>,
    {
        let handle = self.campaigns.handle(campaign_id)?;
        let mut campaign = handle.lock();
        ensure_live(&campaign)?;

        let now = time.now();
        let old_status = campaign.status;
        let approval = match transition(&mut campaign, now) {
            Ok(approval) => approval,
            Err(e) => {
                warn!(campaign_id = %campaign_id, status = %old_status, error = %e, "committee action refused");
                return Err(e);
            }
        };

        self.campaigns.append_approval(approval);
        self.status_changed(&campaign, old_status, Some(actor), reason, now);
        Ok(campaign.clone())
    }

    fn status_changed(
        &self,
        campaign: &Campaign,
        old_status: CampaignStatus,
        actor: Option<Actor>,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        self.events.lock().emit(Event::CampaignStatusChanged {
            campaign_id: campaign.id,
            old_status,
            new_status: campaign.status,
            actor,
            reason: reason.to_string(),
            timestamp: now,
        });
        info!(
            campaign_id = %campaign.id,
            from = %old_status,
            to = %campaign.status,
            "campaign status changed"
        );
    }
}

fn ensure_live(campaign: &Campaign) -> Result<()> {
    if campaign.is_deleted() {
        return Err(LedgerError::not_found("campaign", campaign.id));
    }
    Ok(())
}
