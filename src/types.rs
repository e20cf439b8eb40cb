use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// unique identifier for a campaign
pub type CampaignId = Uuid;
/// unique identifier for a donation
pub type DonationId = Uuid;
/// unique identifier for a payout bank account
pub type BankAccountId = Uuid;
/// tenant identifier
pub type InstitutionId = Uuid;
/// committee identifier (owned by an institution)
pub type CommitteeId = Uuid;
/// platform user identifier
pub type UserId = Uuid;
/// approval audit row identifier
pub type ApprovalId = Uuid;

/// an already-authorized caller; role checks happen before the core is reached
pub type Actor = UserId;

/// campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// submitted, waiting on committee review
    PendingReview,
    /// approved and accepting donations
    Active,
    /// goal reached
    Completed,
    /// closed by the committee
    Closed,
    /// rejected during review
    Rejected,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Closed => "closed",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignType {
    #[default]
    General,
    /// raised on behalf of a single beneficiary
    Individual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignPriority {
    #[default]
    Normal,
    Urgent,
}

/// committee decision recorded on the approval trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// donation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    /// checkout initiated, waiting on the gateway
    Pending,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl DonationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// normalized gateway outcome for a pending donation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Success,
    Failed,
    Cancelled,
    Expired,
}

impl SettlementOutcome {
    /// terminal donation status this outcome settles into
    pub fn target_status(&self) -> DonationStatus {
        match self {
            Self::Success => DonationStatus::Completed,
            Self::Failed => DonationStatus::Failed,
            Self::Cancelled => DonationStatus::Cancelled,
            Self::Expired => DonationStatus::Expired,
        }
    }
}

/// how the donor paid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// hosted checkout page (card or e-wallet chosen on the gateway)
    #[default]
    Checkout,
    Card,
    Wallet,
    BankTransfer,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BankAccountStatus {
    #[default]
    Active,
    Inactive,
}
