//! In-memory store for tests and embedded use.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{
    Account, AccountHistory, CreateAccount, Transaction, TransactionStatus,
};
use crate::services::store::{CommitReceipt, LedgerCommit, LedgerStore};

/// Single-process [`LedgerStore`] holding everything behind one lock.
///
/// A commit is validated in full before any state is touched, so a rejected
/// commit leaves no trace.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    log: Vec<Transaction>,
    // (reference_id, direction) pairs already in the log: one reference
    // names at most one debit leg and one credit leg.
    reference_legs: HashSet<(String, String)>,
    // idempotency key -> reference_id of the operation that recorded it
    idempotency: HashMap<String, String>,
    last_stamp: HashMap<Uuid, DateTime<Utc>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, LedgerError> {
        self.inner
            .lock()
            .map_err(|_| LedgerError::StorageFailure(anyhow::anyhow!("store lock poisoned")))
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn create_account(&self, input: &CreateAccount) -> Result<Account, LedgerError> {
        let mut inner = self.lock()?;

        if inner
            .accounts
            .values()
            .any(|a| a.account_number == input.account_number)
        {
            return Err(LedgerError::StorageFailure(anyhow::anyhow!(
                "account number '{}' already in use",
                input.account_number
            )));
        }

        let account = Account {
            account_id: Uuid::new_v4(),
            owner_id: input.owner_id,
            account_number: input.account_number.clone(),
            balance: Decimal::ZERO,
            suspended: false,
            suspension_reason: None,
            metadata: input.metadata.clone(),
            created_utc: Utc::now(),
            closed_utc: None,
        };
        inner.accounts.insert(account.account_id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, LedgerError> {
        let inner = self.lock()?;
        Ok(inner.accounts.get(&account_id).cloned())
    }

    async fn set_suspension(
        &self,
        account_id: Uuid,
        suspended: bool,
        reason: Option<String>,
    ) -> Result<Account, LedgerError> {
        let mut inner = self.lock()?;
        let account = inner
            .accounts
            .get_mut(&account_id)
            .filter(|a| !a.is_closed())
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        account.suspended = suspended;
        account.suspension_reason = if suspended { reason } else { None };
        Ok(account.clone())
    }

    async fn close_account(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        let mut inner = self.lock()?;
        let account = inner
            .accounts
            .get_mut(&account_id)
            .filter(|a| !a.is_closed())
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        account.closed_utc = Some(Utc::now());
        Ok(account.clone())
    }

    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt, LedgerError> {
        let mut inner = self.lock()?;

        // Validate everything first; nothing mutates until the whole commit
        // is known to apply.
        let mut balances: HashMap<Uuid, Decimal> = HashMap::new();
        let mut fresh_legs: HashSet<(String, String)> = HashSet::new();
        let mut after = Vec::with_capacity(commit.records.len());

        for record in &commit.records {
            let account = inner
                .accounts
                .get(&record.account_id)
                .filter(|a| !a.is_closed())
                .ok_or(LedgerError::AccountNotFound(record.account_id))?;

            let leg = (
                record.reference_id.clone(),
                record.direction.as_str().to_string(),
            );
            if inner.reference_legs.contains(&leg) || !fresh_legs.insert(leg) {
                return Err(LedgerError::DuplicateReference);
            }
            if let Some(key) = &record.idempotency_key {
                if inner.idempotency.contains_key(key) {
                    return Err(LedgerError::DuplicateReference);
                }
            }

            let balance = balances.entry(record.account_id).or_insert(account.balance);
            let next = *balance + record.direction.signed(record.amount);
            if next < Decimal::ZERO {
                return Err(LedgerError::InsufficientFunds {
                    balance: *balance,
                    requested: record.amount,
                });
            }
            *balance = next;
            after.push(next);
        }

        // Apply. Timestamps are clamped to the last stamp seen per account
        // so history ordering is non-decreasing even if the clock steps.
        let now = Utc::now();
        let mut committed = Vec::with_capacity(commit.records.len());

        for (record, balance_after) in commit.records.iter().zip(after) {
            let stamp = inner
                .last_stamp
                .get(&record.account_id)
                .map_or(now, |last| now.max(*last));
            inner.last_stamp.insert(record.account_id, stamp);

            let transaction = Transaction {
                transaction_id: Uuid::new_v4(),
                reference_id: record.reference_id.clone(),
                account_id: record.account_id,
                counterpart_id: record.counterpart_id,
                kind: record.kind.as_str().to_string(),
                direction: record.direction.as_str().to_string(),
                amount: record.amount,
                description: record.description.clone(),
                status: TransactionStatus::Success.as_str().to_string(),
                balance_after,
                metadata: record.metadata.clone(),
                idempotency_key: record.idempotency_key.clone(),
                created_utc: stamp,
            };

            inner.reference_legs.insert((
                transaction.reference_id.clone(),
                transaction.direction.clone(),
            ));
            if let Some(key) = &record.idempotency_key {
                inner
                    .idempotency
                    .insert(key.clone(), record.reference_id.clone());
            }
            inner.log.push(transaction.clone());
            committed.push(transaction);
        }

        for (account_id, balance) in balances {
            if let Some(account) = inner.accounts.get_mut(&account_id) {
                account.balance = balance;
            }
        }

        Ok(CommitReceipt {
            transactions: committed,
        })
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Vec<Transaction>, LedgerError> {
        let inner = self.lock()?;
        let Some(reference_id) = inner.idempotency.get(key) else {
            return Ok(Vec::new());
        };
        Ok(inner
            .log
            .iter()
            .filter(|t| &t.reference_id == reference_id)
            .cloned()
            .collect())
    }

    async fn account_history(
        &self,
        account_id: Uuid,
    ) -> Result<Option<AccountHistory>, LedgerError> {
        let inner = self.lock()?;
        let Some(account) = inner.accounts.get(&account_id) else {
            return Ok(None);
        };

        // The log is chronological per account, so reverse iteration yields
        // newest first.
        let transactions = inner
            .log
            .iter()
            .rev()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();

        Ok(Some(AccountHistory {
            account: account.clone(),
            transactions,
        }))
    }
}
