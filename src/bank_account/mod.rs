pub mod registry;

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{LedgerError, Result};
use crate::types::{BankAccountId, BankAccountStatus, CommitteeId, InstitutionId};

pub use registry::BankAccountRegistry;

/// account number as stored: ciphertext produced by the caller's key service
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedAccountNumber(String);

impl EncryptedAccountNumber {
    pub fn new(ciphertext: impl Into<String>) -> Self {
        Self(ciphertext.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for EncryptedAccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptedAccountNumber(<redacted>)")
    }
}

/// institution payout account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: BankAccountId,
    pub institution_id: InstitutionId,
    pub committee_id: Option<CommitteeId>,

    pub bank_name: String,
    pub account_number: EncryptedAccountNumber,
    pub account_holder: String,
    pub swift_code: Option<String>,
    pub branch: Option<String>,

    /// only the registry flips this, under the institution lock
    pub(crate) is_primary: bool,
    pub status: BankAccountStatus,
    pub effective_from: NaiveDate,
    /// exclusive upper bound; `None` is open ended
    pub effective_until: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BankAccount {
    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    /// active and `today` inside `[effective_from, effective_until)`
    pub fn is_usable_for_payout(&self, today: NaiveDate) -> bool {
        self.status == BankAccountStatus::Active
            && today >= self.effective_from
            && self.effective_until.map_or(true, |until| today < until)
    }
}

fn validate_window(from: NaiveDate, until: Option<NaiveDate>) -> Result<()> {
    if let Some(until) = until {
        if until <= from {
            return Err(LedgerError::validation(
                "effective_until",
                "must be after effective_from",
            ));
        }
    }
    Ok(())
}

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::validation(field, "is required"));
    }
    Ok(())
}

/// input for registering a payout account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBankAccount {
    pub institution_id: InstitutionId,
    pub committee_id: Option<CommitteeId>,
    pub bank_name: String,
    pub account_number: EncryptedAccountNumber,
    pub account_holder: String,
    pub swift_code: Option<String>,
    pub branch: Option<String>,
    pub is_primary: bool,
    pub status: BankAccountStatus,
    pub effective_from: NaiveDate,
    pub effective_until: Option<NaiveDate>,
}

impl NewBankAccount {
    /// active, non-primary, open-ended account
    pub fn new(
        institution_id: InstitutionId,
        bank_name: impl Into<String>,
        account_number: impl Into<String>,
        account_holder: impl Into<String>,
        effective_from: NaiveDate,
    ) -> Self {
        Self {
            institution_id,
            committee_id: None,
            bank_name: bank_name.into(),
            account_number: EncryptedAccountNumber::new(account_number),
            account_holder: account_holder.into(),
            swift_code: None,
            branch: None,
            is_primary: false,
            status: BankAccountStatus::Active,
            effective_from,
            effective_until: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("bank_name", &self.bank_name)?;
        require("account_holder", &self.account_holder)?;
        if self.account_number.is_empty() {
            return Err(LedgerError::validation("account_number", "is required"));
        }
        validate_window(self.effective_from, self.effective_until)
    }

    pub(crate) fn into_account(self, now: DateTime<Utc>) -> BankAccount {
        BankAccount {
            id: Uuid::new_v4(),
            institution_id: self.institution_id,
            committee_id: self.committee_id,
            bank_name: self.bank_name.trim().to_string(),
            account_number: self.account_number,
            account_holder: self.account_holder.trim().to_string(),
            swift_code: self.swift_code,
            branch: self.branch,
            // primary is granted by the registry after the eligibility check
            is_primary: false,
            status: self.status,
            effective_from: self.effective_from,
            effective_until: self.effective_until,
            created_at: now,
            updated_at: now,
        }
    }
}

/// partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankAccountChanges {
    pub committee_id: Option<Option<CommitteeId>>,
    pub bank_name: Option<String>,
    pub account_number: Option<EncryptedAccountNumber>,
    pub account_holder: Option<String>,
    pub swift_code: Option<Option<String>>,
    pub branch: Option<Option<String>>,
    pub status: Option<BankAccountStatus>,
    pub effective_from: Option<NaiveDate>,
    pub effective_until: Option<Option<NaiveDate>>,
}

impl BankAccountChanges {
    /// validate the changes against the account they will be merged into
    pub(crate) fn validate_against(&self, account: &BankAccount) -> Result<()> {
        if let Some(name) = &self.bank_name {
            require("bank_name", name)?;
        }
        if let Some(holder) = &self.account_holder {
            require("account_holder", holder)?;
        }
        if let Some(number) = &self.account_number {
            if number.is_empty() {
                return Err(LedgerError::validation("account_number", "is required"));
            }
        }
        let from = self.effective_from.unwrap_or(account.effective_from);
        let until = self.effective_until.unwrap_or(account.effective_until);
        validate_window(from, until)
    }

    pub(crate) fn apply(self, account: &mut BankAccount, now: DateTime<Utc>) {
        if let Some(committee_id) = self.committee_id {
            account.committee_id = committee_id;
        }
        if let Some(name) = self.bank_name {
            account.bank_name = name.trim().to_string();
        }
        if let Some(number) = self.account_number {
            account.account_number = number;
        }
        if let Some(holder) = self.account_holder {
            account.account_holder = holder.trim().to_string();
        }
        if let Some(swift_code) = self.swift_code {
            account.swift_code = swift_code;
        }
        if let Some(branch) = self.branch {
            account.branch = branch;
        }
        if let Some(status) = self.status {
            account.status = status;
        }
        if let Some(from) = self.effective_from {
            account.effective_from = from;
        }
        if let Some(until) = self.effective_until {
            account.effective_until = until;
        }
        account.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn account() -> BankAccount {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        NewBankAccount::new(Uuid::new_v4(), "BPI", "enc:1234", "Alumni Assoc", date(2024, 1, 1)).into_account(now)
    }

    #[test]
    fn test_payout_window_is_half_open() {
        let mut account = account();
        account.effective_until = Some(date(2024, 6, 1));

        assert!(!account.is_usable_for_payout(date(2023, 12, 31)));
        assert!(account.is_usable_for_payout(date(2024, 1, 1)));
        assert!(account.is_usable_for_payout(date(2024, 5, 31)));
        assert!(!account.is_usable_for_payout(date(2024, 6, 1)));

        account.effective_until = None;
        assert!(account.is_usable_for_payout(date(2099, 1, 1)));

        account.status = BankAccountStatus::Inactive;
        assert!(!account.is_usable_for_payout(date(2024, 2, 1)));
    }

    #[test]
    fn test_window_must_be_strictly_increasing() {
        let mut new = NewBankAccount::new(Uuid::new_v4(), "BPI", "enc:1", "Holder", date(2024, 1, 1));
        assert!(new.validate().is_ok());

        new.effective_until = Some(date(2024, 1, 1));
        assert!(matches!(
            new.validate(),
            Err(LedgerError::Validation { field: "effective_until", .. })
        ));

        new.effective_until = Some(date(2024, 1, 2));
        assert!(new.validate().is_ok());

        let changes = BankAccountChanges {
            effective_from: Some(date(2030, 1, 1)),
            effective_until: Some(Some(date(2029, 1, 1))),
            ..Default::default()
        };
        assert!(changes.validate_against(&account()).is_err());
    }

    #[test]
    fn test_required_fields() {
        let new = NewBankAccount::new(Uuid::new_v4(), " ", "enc:1", "Holder", date(2024, 1, 1));
        assert!(matches!(new.validate(), Err(LedgerError::Validation { field: "bank_name", .. })));

        let new = NewBankAccount::new(Uuid::new_v4(), "BPI", "", "Holder", date(2024, 1, 1));
        assert!(matches!(new.validate(), Err(LedgerError::Validation { field: "account_number", .. })));
    }

    #[test]
    fn test_debug_never_prints_account_number() {
        let account = account();
        let rendered = format!("{:?}", account);
        assert!(!rendered.contains("enc:1234"));
        assert!(rendered.contains("<redacted>"));
    }
}
