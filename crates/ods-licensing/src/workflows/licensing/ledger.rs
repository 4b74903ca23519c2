use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::counters::{CounterName, SequenceAllocator};
use super::domain::{ImporterAccount, ImporterId};
use super::error::LicensingError;
use super::repository::{LicensingStore, RepositoryError};

/// How a debit larger than the remaining balance is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuotaPolicy {
    /// Record the full consumption; the balance bottoms out at zero.
    #[default]
    FloorAtZero,
    /// Refuse the debit.
    RejectOverQuota,
}

/// Result of a single debit against an importer account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebitOutcome {
    pub importer_id: ImporterId,
    pub amount: f64,
    pub previous_cumulative: f64,
    pub cumulative_imports: f64,
    pub balance: f64,
    /// Consumption beyond the quota that the zero floor absorbed.
    pub overage: f64,
}

/// Apply a debit to an account snapshot without touching storage.
pub fn apply_debit(
    account: &ImporterAccount,
    amount: f64,
    policy: QuotaPolicy,
) -> Result<(ImporterAccount, DebitOutcome), LicensingError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(LicensingError::Validation(format!(
            "debit amount must be a non-negative number, got {amount}"
        )));
    }

    let remaining = account.balance();
    if policy == QuotaPolicy::RejectOverQuota && amount > remaining {
        return Err(LicensingError::Precondition(format!(
            "debit of {amount} exceeds remaining quota {remaining} for importer {}",
            account.importer_id
        )));
    }

    let mut updated = account.clone();
    updated.cumulative_imports = account.cumulative_imports + amount;
    let overage = (updated.cumulative_imports - updated.import_quota)
        .max(0.0)
        .min(amount);

    let outcome = DebitOutcome {
        importer_id: account.importer_id.clone(),
        amount,
        previous_cumulative: account.cumulative_imports,
        cumulative_imports: updated.cumulative_imports,
        balance: updated.balance(),
        overage,
    };
    Ok((updated, outcome))
}

/// Per-importer allowance bookkeeping backed by version-checked account writes.
pub struct QuotaLedger<S> {
    store: Arc<S>,
    counters: SequenceAllocator<S>,
    policy: QuotaPolicy,
    max_attempts: u32,
}

impl<S> QuotaLedger<S>
where
    S: LicensingStore,
{
    pub fn new(
        store: Arc<S>,
        counters: SequenceAllocator<S>,
        policy: QuotaPolicy,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            counters,
            policy,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn policy(&self) -> QuotaPolicy {
        self.policy
    }

    pub fn account(&self, importer_id: &ImporterId) -> Result<ImporterAccount, LicensingError> {
        self.store
            .fetch_account(importer_id)?
            .ok_or_else(|| LicensingError::not_found("importer account", importer_id))
    }

    pub fn debit(
        &self,
        importer_id: &ImporterId,
        amount: f64,
    ) -> Result<DebitOutcome, LicensingError> {
        for attempt in 1..=self.max_attempts {
            let account = self.account(importer_id)?;
            let (updated, outcome) = apply_debit(&account, amount, self.policy)?;

            match self.store.update_account(updated) {
                Ok(_) => {
                    if outcome.overage > 0.0 {
                        warn!(
                            importer = %importer_id,
                            overage = outcome.overage,
                            "debit exceeded quota; balance floored at zero"
                        );
                    }
                    info!(
                        importer = %importer_id,
                        amount,
                        cumulative = outcome.cumulative_imports,
                        balance = outcome.balance,
                        "quota debited"
                    );
                    return Ok(outcome);
                }
                Err(RepositoryError::Conflict) => {
                    debug!(importer = %importer_id, attempt, "account changed, retrying debit");
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(LicensingError::ConcurrencyConflict(format!(
            "debit for importer {importer_id} contended for {} attempts",
            self.max_attempts
        )))
    }

    /// Give the importer a number from the `importerNumber` counter. Repeated calls return the
    /// number already on the account. Numbers held by provisioned accounts are skipped.
    pub fn assign_importer_number(&self, importer_id: &ImporterId) -> Result<u64, LicensingError> {
        let mut allocated = None;
        for attempt in 1..=self.max_attempts {
            let mut account = self.account(importer_id)?;
            if let Some(existing) = account.importer_number {
                return Ok(existing);
            }

            let number = match allocated {
                Some(number) => number,
                None => {
                    let number = self.counters.next(CounterName::ImporterNumber)?;
                    allocated = Some(number);
                    number
                }
            };
            account.importer_number = Some(number);

            match self.store.update_account(account) {
                Ok(_) => {
                    info!(importer = %importer_id, importer_number = number, "importer number assigned");
                    return Ok(number);
                }
                Err(RepositoryError::Conflict) => {
                    debug!(importer = %importer_id, attempt, "account changed, retrying number assignment");
                }
                Err(RepositoryError::Constraint(reason)) => {
                    warn!(importer = %importer_id, importer_number = number, %reason, "importer number already held, drawing another");
                    allocated = None;
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(LicensingError::ConcurrencyConflict(format!(
            "importer number assignment for {importer_id} contended for {} attempts",
            self.max_attempts
        )))
    }
}
