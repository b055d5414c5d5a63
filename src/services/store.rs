//! Transactional store contract.
//!
//! The engine treats storage as a single transactional collaborator: a
//! commit applies every balance delta and appends every record as one
//! all-or-nothing unit. Either the whole commit persists or none of it
//! does; no partial state is ever observable.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{Account, AccountHistory, CreateAccount, NewTransaction, Transaction};

/// One atomic unit of ledger mutation.
///
/// Every record's signed amount is applied to its account's balance, and
/// the records themselves are appended to the transaction log.
#[derive(Debug, Clone)]
pub struct LedgerCommit {
    pub records: Vec<NewTransaction>,
}

/// Committed rows, in the order they were applied.
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub transactions: Vec<Transaction>,
}

/// Durable storage behind the ledger engine.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Create an account with a zero balance.
    async fn create_account(&self, input: &CreateAccount) -> Result<Account, LedgerError>;

    /// Fetch an account, including soft-closed ones.
    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, LedgerError>;

    /// Set or clear the suspension flag. The reason is stored only while
    /// suspended.
    async fn set_suspension(
        &self,
        account_id: Uuid,
        suspended: bool,
        reason: Option<String>,
    ) -> Result<Account, LedgerError>;

    /// Soft-delete an account.
    async fn close_account(&self, account_id: Uuid) -> Result<Account, LedgerError>;

    /// Apply a commit atomically.
    ///
    /// Rejects a duplicate `(reference_id, direction)` pair or a reused
    /// idempotency key with [`LedgerError::DuplicateReference`], and any
    /// commit that would drive a balance negative with
    /// [`LedgerError::InsufficientFunds`]. Stamps `created_utc` (monotonic
    /// non-decreasing per account) and `balance_after` on every record.
    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt, LedgerError>;

    /// Every leg of the operation that recorded `key`, or empty.
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Vec<Transaction>, LedgerError>;

    /// Consistent snapshot of an account and its transactions, newest
    /// first. Works for soft-closed accounts.
    async fn account_history(
        &self,
        account_id: Uuid,
    ) -> Result<Option<AccountHistory>, LedgerError>;
}
