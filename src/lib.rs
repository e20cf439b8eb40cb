pub mod bank_account;
pub mod campaign;
pub mod checkout;
pub mod config;
pub mod decimal;
pub mod donation;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod http;
pub mod platform;
pub mod settlement;
pub mod types;
pub mod views;

// re-export key types
pub use bank_account::{BankAccount, BankAccountChanges, BankAccountRegistry, NewBankAccount};
pub use campaign::{Campaign, CampaignApproval, CampaignChanges, CampaignDraft, CampaignLifecycle, CampaignStore};
pub use checkout::{CheckoutService, CheckoutStarted};
pub use config::{GatewayConfig, LedgerConfig, RedirectConfig};
pub use decimal::{Money, Rate};
pub use donation::{Donation, DonationLedger, DonationStore, DonorInfo, SettlementReceipt};
pub use errors::{ErrorKind, LedgerError, Result};
pub use events::{Event, EventStore};
pub use gateway::{CheckoutRequest, CheckoutSession, MayaGateway, MockBehaviour, MockGateway, PaymentGateway, RedirectUrls};
pub use platform::FundingPlatform;
pub use settlement::{Acknowledgement, GatewayNotification, RedirectKind, SettlementReconciler};
pub use types::{
    ApprovalDecision, BankAccountId, BankAccountStatus, CampaignId, CampaignPriority,
    CampaignStatus, CampaignType, DonationId, DonationStatus, InstitutionId, PaymentMethod,
    SettlementOutcome, UserId,
};
pub use views::{CampaignSummary, DonationReceipt};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
