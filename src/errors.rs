use thiserror::Error;
use uuid::Uuid;

use crate::types::{CampaignStatus, DonationStatus};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("invalid state for {entity}: current {current}, expected {expected}")]
    InvalidState {
        entity: &'static str,
        current: String,
        expected: String,
    },

    #[error("campaign not accepting donations: current status is {status}")]
    CampaignNotAcceptingDonations {
        status: CampaignStatus,
    },

    #[error("bank account {account_id} is the primary payout account and cannot be deleted")]
    PrimaryAccountProtected {
        account_id: Uuid,
    },

    #[error("bank account not eligible for payout: {reason}")]
    PayoutAccountIneligible {
        reason: String,
    },

    #[error("only the campaign creator can withdraw a campaign")]
    NotCampaignCreator,

    #[error("unknown gateway reference: {reference}")]
    UnknownReference {
        reference: String,
    },

    #[error("notification signature could not be verified")]
    InvalidSignature,

    #[error("malformed notification: {message}")]
    MalformedNotification {
        message: String,
    },

    #[error("gateway error: {message}")]
    Gateway {
        message: String,
    },

    #[error("gateway unavailable: {message}")]
    GatewayUnavailable {
        message: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    #[error("ledger invariant violated: {message}")]
    InvariantViolation {
        message: String,
    },

    #[error("configuration error: {message}")]
    Config {
        message: String,
    },
}

/// coarse classification used at the caller boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    External,
    UnknownReference,
    NotFound,
    Invariant,
    Configuration,
}

impl LedgerError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn invalid_campaign_state(current: CampaignStatus, expected: &str) -> Self {
        LedgerError::InvalidState {
            entity: "campaign",
            current: current.to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn invalid_donation_state(current: DonationStatus, expected: &str) -> Self {
        LedgerError::InvalidState {
            entity: "donation",
            current: current.to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. }
            | Self::MalformedNotification { .. }
            | Self::InvalidSignature => ErrorKind::Validation,
            Self::InvalidState { .. }
            | Self::CampaignNotAcceptingDonations { .. }
            | Self::PrimaryAccountProtected { .. }
            | Self::PayoutAccountIneligible { .. }
            | Self::NotCampaignCreator => ErrorKind::StateConflict,
            Self::Gateway { .. } | Self::GatewayUnavailable { .. } => ErrorKind::External,
            Self::UnknownReference { .. } => ErrorKind::UnknownReference,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvariantViolation { .. } => ErrorKind::Invariant,
            Self::Config { .. } => ErrorKind::Configuration,
        }
    }

    /// whether retrying the same call can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable { .. })
    }

    /// message safe to show across the committee/donor boundary
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation { field, message } => format!("{field}: {message}"),
            Self::InvalidState { entity, current, expected } => {
                format!("this {entity} is {current}; the action requires it to be {expected}")
            }
            Self::CampaignNotAcceptingDonations { status } => {
                format!("this campaign is {status} and is not accepting donations")
            }
            Self::PrimaryAccountProtected { .. } => {
                "the primary payout account cannot be deleted; designate another primary first"
                    .to_string()
            }
            Self::PayoutAccountIneligible { reason } => format!("bank account cannot receive payouts: {reason}"),
            Self::NotCampaignCreator => "only the campaign creator can withdraw it".to_string(),
            Self::UnknownReference { .. } => "payment reference not recognised".to_string(),
            Self::InvalidSignature => "notification could not be verified".to_string(),
            Self::MalformedNotification { .. } => "notification payload is malformed".to_string(),
            Self::Gateway { .. } => "the payment provider rejected the checkout request".to_string(),
            Self::GatewayUnavailable { .. } => {
                "the payment provider is unavailable, please try again".to_string()
            }
            Self::NotFound { entity, .. } => format!("{entity} not found"),
            Self::InvariantViolation { .. } | Self::Config { .. } => "internal error".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
