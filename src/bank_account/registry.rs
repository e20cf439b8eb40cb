//! Payout account registry.
//!
//! Accounts are grouped per institution behind one mutex. Every write and
//! every read of an institution's accounts goes through that lock, so the
//! primary flag is flipped as a single step and no reader can observe two
//! primaries.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hourglass_rs::SafeTimeProvider;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::bank_account::{BankAccount, BankAccountChanges, NewBankAccount};
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::types::{BankAccountId, BankAccountStatus, CommitteeId, InstitutionId};

type AccountSet = Arc<Mutex<HashMap<BankAccountId, BankAccount>>>;

pub struct BankAccountRegistry {
    institutions: DashMap<InstitutionId, AccountSet>,
    owners: DashMap<BankAccountId, InstitutionId>,
    events: Arc<Mutex<EventStore>>,
}

impl BankAccountRegistry {
    pub fn new(events: Arc<Mutex<EventStore>>) -> Self {
        Self {
            institutions: DashMap::new(),
            owners: DashMap::new(),
            events,
        }
    }

    fn set_for(&self, institution_id: InstitutionId) -> AccountSet {
        Arc::clone(
            self.institutions
                .entry(institution_id)
                .or_insert_with(|| Arc::new(Mutex::new(HashMap::new())))
                .value(),
        )
    }

    fn existing_set(&self, institution_id: InstitutionId) -> Option<AccountSet> {
        self.institutions
            .get(&institution_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn owner_set(&self, account_id: BankAccountId) -> Result<AccountSet> {
        let institution_id = self
            .owners
            .get(&account_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| LedgerError::not_found("bank account", account_id))?;
        self.existing_set(institution_id)
            .ok_or_else(|| LedgerError::not_found("bank account", account_id))
    }

    /// register an account; `is_primary` goes through the same swap as `set_primary`
    pub fn create(&self, new: NewBankAccount, time: &SafeTimeProvider) -> Result<BankAccount> {
        new.validate()?;
        let now = time.now();
        let wants_primary = new.is_primary;
        let mut account = new.into_account(now);

        if wants_primary && !account.is_usable_for_payout(now.date_naive()) {
            return Err(LedgerError::PayoutAccountIneligible {
                reason: "a primary account must be active and within its effective window".to_string(),
            });
        }

        let set = self.set_for(account.institution_id);
        let mut accounts = set.lock();

        let previous = if wants_primary {
            let previous = clear_primary(&mut accounts, now);
            account.is_primary = true;
            Some(previous)
        } else {
            None
        };

        self.owners.insert(account.id, account.institution_id);
        accounts.insert(account.id, account.clone());

        let mut events = self.events.lock();
        events.emit(Event::BankAccountCreated {
            account_id: account.id,
            institution_id: account.institution_id,
            timestamp: now,
        });
        if let Some(previous) = previous {
            events.emit(Event::PrimaryAccountChanged {
                institution_id: account.institution_id,
                previous,
                current: Some(account.id),
                timestamp: now,
            });
        }
        info!(
            account_id = %account.id,
            institution_id = %account.institution_id,
            primary = account.is_primary,
            "bank account created"
        );
        Ok(account)
    }

    /// apply changes; a primary that stops being usable loses the flag
    pub fn update(
        &self,
        account_id: BankAccountId,
        changes: BankAccountChanges,
        time: &SafeTimeProvider,
    ) -> Result<BankAccount> {
        let set = self.owner_set(account_id)?;
        let mut accounts = set.lock();
        let account = accounts
            .get_mut(&account_id)
            .ok_or_else(|| LedgerError::not_found("bank account", account_id))?;

        changes.validate_against(account)?;
        let now = time.now();
        changes.apply(account, now);

        let demoted = account.is_primary && !account.is_usable_for_payout(now.date_naive());
        if demoted {
            account.is_primary = false;
        }
        let updated = account.clone();
        drop(accounts);

        let mut events = self.events.lock();
        events.emit(Event::BankAccountUpdated {
            account_id,
            timestamp: now,
        });
        if demoted {
            events.emit(Event::PrimaryAccountChanged {
                institution_id: updated.institution_id,
                previous: Some(account_id),
                current: None,
                timestamp: now,
            });
            warn!(account_id = %account_id, status = ?updated.status, "primary account no longer usable, flag cleared");
        }
        info!(account_id = %account_id, "bank account updated");
        Ok(updated)
    }

    /// make `account_id` the institution's only primary account
    pub fn set_primary(&self, account_id: BankAccountId, time: &SafeTimeProvider) -> Result<BankAccount> {
        let set = self.owner_set(account_id)?;
        let mut accounts = set.lock();
        let now = time.now();

        let target = accounts
            .get(&account_id)
            .ok_or_else(|| LedgerError::not_found("bank account", account_id))?;
        if target.is_primary {
            return Ok(target.clone());
        }
        if !target.is_usable_for_payout(now.date_naive()) {
            return Err(LedgerError::PayoutAccountIneligible {
                reason: "account is inactive or outside its effective window".to_string(),
            });
        }

        let previous = clear_primary(&mut accounts, now);
        let account = accounts
            .get_mut(&account_id)
            .ok_or_else(|| LedgerError::not_found("bank account", account_id))?;
        account.is_primary = true;
        account.updated_at = now;
        let account = account.clone();
        drop(accounts);

        self.events.lock().emit(Event::PrimaryAccountChanged {
            institution_id: account.institution_id,
            previous,
            current: Some(account_id),
            timestamp: now,
        });
        info!(
            institution_id = %account.institution_id,
            account_id = %account_id,
            previous = ?previous,
            "primary payout account changed"
        );
        Ok(account)
    }

    pub fn delete(&self, account_id: BankAccountId, time: &SafeTimeProvider) -> Result<()> {
        let set = self.owner_set(account_id)?;
        let mut accounts = set.lock();

        let account = accounts
            .get(&account_id)
            .ok_or_else(|| LedgerError::not_found("bank account", account_id))?;
        if account.is_primary {
            warn!(account_id = %account_id, "refusing to delete primary account");
            return Err(LedgerError::PrimaryAccountProtected { account_id });
        }

        accounts.remove(&account_id);
        self.owners.remove(&account_id);
        drop(accounts);

        self.events.lock().emit(Event::BankAccountDeleted {
            account_id,
            timestamp: time.now(),
        });
        info!(account_id = %account_id, "bank account deleted");
        Ok(())
    }

    pub fn get(&self, account_id: BankAccountId) -> Result<BankAccount> {
        let set = self.owner_set(account_id)?;
        let accounts = set.lock();
        accounts
            .get(&account_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("bank account", account_id))
    }

    /// all accounts for an institution, oldest first
    pub fn for_institution(&self, institution_id: InstitutionId) -> Vec<BankAccount> {
        let Some(set) = self.existing_set(institution_id) else {
            return Vec::new();
        };
        let mut accounts: Vec<BankAccount> = set.lock().values().cloned().collect();
        accounts.sort_by_key(|a| (a.created_at, a.id));
        accounts
    }

    pub fn for_committee(&self, institution_id: InstitutionId, committee_id: CommitteeId) -> Vec<BankAccount> {
        self.for_institution(institution_id)
            .into_iter()
            .filter(|a| a.committee_id == Some(committee_id))
            .collect()
    }

    pub fn active_for_institution(&self, institution_id: InstitutionId) -> Vec<BankAccount> {
        self.for_institution(institution_id)
            .into_iter()
            .filter(|a| a.status == BankAccountStatus::Active)
            .collect()
    }

    pub fn primary_for_institution(&self, institution_id: InstitutionId) -> Option<BankAccount> {
        self.for_institution(institution_id)
            .into_iter()
            .find(|a| a.is_primary)
    }

    /// confirm at most one primary account for the institution
    pub fn audit_institution(&self, institution_id: InstitutionId) -> Result<()> {
        let primaries: Vec<BankAccountId> = self
            .for_institution(institution_id)
            .into_iter()
            .filter(|a| a.is_primary)
            .map(|a| a.id)
            .collect();
        if primaries.len() > 1 {
            error!(institution_id = %institution_id, primaries = ?primaries, "multiple primary accounts");
            return Err(LedgerError::InvariantViolation {
                message: format!(
                    "institution {institution_id} has {} primary accounts",
                    primaries.len()
                ),
            });
        }
        Ok(())
    }
}

/// clear the flag on every account in the set; returns the previous primary
fn clear_primary(accounts: &mut HashMap<BankAccountId, BankAccount>, now: DateTime<Utc>) -> Option<BankAccountId> {
    let mut previous = None;
    for account in accounts.values_mut().filter(|a| a.is_primary) {
        account.is_primary = false;
        account.updated_at = now;
        previous = Some(account.id);
    }
    previous
}
