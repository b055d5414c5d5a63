//! Ledger engine - orchestrates deposits, withdrawals, and transfers.
//!
//! Every mutating operation runs the same sequence: resolve the account(s),
//! enforce ownership, consult the suspension policy, check sufficiency for
//! outflows, draw a reference identifier, then apply the balance delta(s)
//! and append the record(s) as one atomic store commit - all while holding
//! the per-account lock(s), so concurrent operations on the same account
//! are strictly ordered.

pub mod events;
pub mod locks;
pub mod policy;
pub mod reference;
pub mod requests;

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::models::{
    Account, AccountHistory, CreateAccount, Direction, NewTransaction, Transaction,
    TransactionKind,
};
use crate::services::metrics;
use crate::services::store::{CommitReceipt, LedgerCommit, LedgerStore};
use events::{EventSink, LedgerEvent};
use locks::AccountLocks;
use policy::{Decision, OperationKind};
use requests::{DepositRequest, TransferRequest, WithdrawRequest};

/// Result of a single-account mutating operation.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub reference_id: String,
    pub new_balance: Decimal,
    pub transaction: Transaction,
}

/// Result of a transfer: two mirrored legs under one reference.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub reference_id: String,
    pub source_balance: Decimal,
    pub destination_balance: Decimal,
    pub debit_leg: Transaction,
    pub credit_leg: Transaction,
}

/// The ledger core, generic over the transactional store.
pub struct LedgerEngine<S> {
    store: Arc<S>,
    locks: AccountLocks,
    config: EngineConfig,
    sink: Option<Arc<dyn EventSink>>,
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            locks: AccountLocks::new(),
            config,
            sink: None,
        }
    }

    /// Attach the notification collaborator.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Open an account on behalf of the registration collaborator.
    #[instrument(skip(self, input), fields(owner_id = %input.owner_id))]
    pub async fn open_account(&self, input: CreateAccount) -> Result<Account, LedgerError> {
        let account = self.store.create_account(&input).await?;
        metrics::record_account_opened();
        info!(
            account_id = %account.account_id,
            account_number = %account.account_number,
            "Account opened"
        );
        Ok(account)
    }

    /// Credit `amount` to the caller's account.
    ///
    /// Permitted even while suspended - suspension blocks outflow, not
    /// inflow.
    #[instrument(skip(self, request), fields(account_id = %request.account_id, amount = %request.amount))]
    pub async fn deposit(
        &self,
        principal: Uuid,
        request: DepositRequest,
    ) -> Result<Receipt, LedgerError> {
        let timer = metrics::OPERATION_DURATION
            .with_label_values(&["deposit"])
            .start_timer();
        let result = self.credit(Some(principal), request, "Deposit").await;
        timer.observe_duration();
        metrics::record_operation("deposit", &result);
        result
    }

    /// Administrative credit: the deposit flow minus the ownership check,
    /// recorded as an ordinary credit transaction.
    #[instrument(skip(self, request), fields(account_id = %request.account_id, amount = %request.amount))]
    pub async fn admin_credit(&self, request: DepositRequest) -> Result<Receipt, LedgerError> {
        let timer = metrics::OPERATION_DURATION
            .with_label_values(&["admin_credit"])
            .start_timer();
        let result = self.credit(None, request, "Admin credit").await;
        timer.observe_duration();
        metrics::record_operation("admin_credit", &result);
        result
    }

    /// Debit `amount` from the caller's account.
    #[instrument(skip(self, request), fields(account_id = %request.account_id, amount = %request.amount))]
    pub async fn withdraw(
        &self,
        principal: Uuid,
        request: WithdrawRequest,
    ) -> Result<Receipt, LedgerError> {
        let timer = metrics::OPERATION_DURATION
            .with_label_values(&["withdraw"])
            .start_timer();
        let result = self.withdraw_inner(principal, request).await;
        timer.observe_duration();
        metrics::record_operation("withdraw", &result);
        result
    }

    /// Atomically move `amount` from the caller's source account to the
    /// destination.
    ///
    /// Produces two mirrored records under one reference identifier: a
    /// debit leg on the source and a credit leg on the destination.
    #[instrument(
        skip(self, request),
        fields(
            source = %request.source_account_id,
            destination = %request.destination_account_id,
            amount = %request.amount
        )
    )]
    pub async fn transfer(
        &self,
        principal: Uuid,
        request: TransferRequest,
    ) -> Result<TransferReceipt, LedgerError> {
        let timer = metrics::OPERATION_DURATION
            .with_label_values(&["transfer"])
            .start_timer();
        let result = self.transfer_inner(principal, request).await;
        timer.observe_duration();
        metrics::record_operation("transfer", &result);
        result
    }

    /// Account history, newest first. The caller must own the account.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn history(
        &self,
        principal: Uuid,
        account_id: Uuid,
    ) -> Result<AccountHistory, LedgerError> {
        let result = self.history_snapshot(account_id).await.and_then(|history| {
            if !history.account.is_owned_by(principal) {
                return Err(LedgerError::Unauthorized);
            }
            Ok(history)
        });
        metrics::record_operation("history", &result);
        result
    }

    /// Administrative history override: no ownership check.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn admin_history(&self, account_id: Uuid) -> Result<AccountHistory, LedgerError> {
        let result = self.history_snapshot(account_id).await;
        metrics::record_operation("admin_history", &result);
        result
    }

    /// Place an administrative hold. Outflow is blocked until the account
    /// is reinstated; a missing reason falls back to the default support
    /// message.
    #[instrument(skip(self, reason), fields(account_id = %account_id))]
    pub async fn suspend(
        &self,
        account_id: Uuid,
        reason: Option<String>,
    ) -> Result<Account, LedgerError> {
        let _guard = self
            .locks
            .acquire_one(account_id, self.config.lock_wait())
            .await?;
        let reason = reason.unwrap_or_else(|| policy::DEFAULT_SUSPENSION_REASON.to_string());
        let account = self
            .store
            .set_suspension(account_id, true, Some(reason))
            .await?;
        info!(account_id = %account.account_id, "Account suspended");
        Ok(account)
    }

    /// Lift an administrative hold.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn reinstate(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        let _guard = self
            .locks
            .acquire_one(account_id, self.config.lock_wait())
            .await?;
        let account = self.store.set_suspension(account_id, false, None).await?;
        info!(account_id = %account.account_id, "Account reinstated");
        Ok(account)
    }

    /// Soft-delete: the account stops accepting operations but its history
    /// stays readable.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn close_account(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        let _guard = self
            .locks
            .acquire_one(account_id, self.config.lock_wait())
            .await?;
        let account = self.store.close_account(account_id).await?;
        info!(account_id = %account.account_id, "Account closed");
        Ok(account)
    }

    // -------------------------------------------------------------------------
    // Operation internals
    // -------------------------------------------------------------------------

    async fn credit(
        &self,
        principal: Option<Uuid>,
        request: DepositRequest,
        default_description: &str,
    ) -> Result<Receipt, LedgerError> {
        let _guard = self
            .locks
            .acquire_one(request.account_id, self.config.lock_wait())
            .await?;

        if let Some(receipt) = self.replay_single(request.idempotency_key.as_deref()).await? {
            return Ok(receipt);
        }

        let account = self.resolve(request.account_id).await?;
        if let Some(principal) = principal {
            enforce_ownership(&account, principal)?;
        }
        enforce_policy(&account, OperationKind::Deposit)?;

        let description = request
            .description
            .clone()
            .unwrap_or_else(|| default_description.to_string());
        let receipt = self
            .commit_with_reference(request.idempotency_key.as_deref(), |reference_id| {
                LedgerCommit {
                    records: vec![NewTransaction {
                        reference_id,
                        account_id: request.account_id,
                        counterpart_id: None,
                        kind: TransactionKind::Credit,
                        direction: Direction::Credit,
                        amount: request.amount,
                        description: description.clone(),
                        metadata: request.metadata.clone(),
                        idempotency_key: request.idempotency_key.clone(),
                    }],
                }
            })
            .await?;
        let receipt = single_receipt(receipt)?;

        info!(
            reference_id = %receipt.reference_id,
            new_balance = %receipt.new_balance,
            "Credit committed"
        );
        self.emit(OperationKind::Deposit, &receipt.transaction);
        Ok(receipt)
    }

    async fn withdraw_inner(
        &self,
        principal: Uuid,
        request: WithdrawRequest,
    ) -> Result<Receipt, LedgerError> {
        let _guard = self
            .locks
            .acquire_one(request.account_id, self.config.lock_wait())
            .await?;

        if let Some(receipt) = self.replay_single(request.idempotency_key.as_deref()).await? {
            return Ok(receipt);
        }

        let account = self.resolve(request.account_id).await?;
        enforce_ownership(&account, principal)?;
        enforce_policy(&account, OperationKind::Withdrawal)?;
        enforce_sufficiency(&account, request.amount)?;

        let description = request
            .description
            .clone()
            .unwrap_or_else(|| "Withdrawal".to_string());
        let receipt = self
            .commit_with_reference(request.idempotency_key.as_deref(), |reference_id| {
                LedgerCommit {
                    records: vec![NewTransaction {
                        reference_id,
                        account_id: request.account_id,
                        counterpart_id: None,
                        kind: TransactionKind::Debit,
                        direction: Direction::Debit,
                        amount: request.amount,
                        description: description.clone(),
                        metadata: request.metadata.clone(),
                        idempotency_key: request.idempotency_key.clone(),
                    }],
                }
            })
            .await?;
        let receipt = single_receipt(receipt)?;

        info!(
            reference_id = %receipt.reference_id,
            new_balance = %receipt.new_balance,
            "Withdrawal committed"
        );
        self.emit(OperationKind::Withdrawal, &receipt.transaction);
        Ok(receipt)
    }

    async fn transfer_inner(
        &self,
        principal: Uuid,
        request: TransferRequest,
    ) -> Result<TransferReceipt, LedgerError> {
        let _guards = self
            .locks
            .acquire(
                &[request.source_account_id, request.destination_account_id],
                self.config.lock_wait(),
            )
            .await?;

        if let Some(receipt) = self
            .replay_transfer(request.idempotency_key.as_deref())
            .await?
        {
            return Ok(receipt);
        }

        // Both sides are resolved before any mutation; a missing destination
        // fails the whole operation with no partial debit.
        let source = self.resolve(request.source_account_id).await?;
        let destination = self.resolve(request.destination_account_id).await?;
        enforce_ownership(&source, principal)?;
        enforce_policy(&source, OperationKind::TransferOut)?;
        enforce_policy(&destination, OperationKind::TransferIn)?;
        enforce_sufficiency(&source, request.amount)?;

        let description = request
            .description
            .clone()
            .unwrap_or_else(|| "Transfer".to_string());
        let receipt = self
            .commit_with_reference(request.idempotency_key.as_deref(), |reference_id| {
                LedgerCommit {
                    records: vec![
                        NewTransaction {
                            reference_id: reference_id.clone(),
                            account_id: request.source_account_id,
                            counterpart_id: Some(request.destination_account_id),
                            kind: TransactionKind::Transfer,
                            direction: Direction::Debit,
                            amount: request.amount,
                            description: description.clone(),
                            metadata: request.metadata.clone(),
                            idempotency_key: request.idempotency_key.clone(),
                        },
                        NewTransaction {
                            reference_id,
                            account_id: request.destination_account_id,
                            counterpart_id: Some(request.source_account_id),
                            kind: TransactionKind::Transfer,
                            direction: Direction::Credit,
                            amount: request.amount,
                            description: description.clone(),
                            metadata: request.metadata.clone(),
                            idempotency_key: None,
                        },
                    ],
                }
            })
            .await?;
        let receipt = transfer_receipt(receipt)?;

        info!(
            reference_id = %receipt.reference_id,
            source_balance = %receipt.source_balance,
            destination_balance = %receipt.destination_balance,
            "Transfer committed"
        );
        self.emit(OperationKind::TransferOut, &receipt.debit_leg);
        self.emit(OperationKind::TransferIn, &receipt.credit_leg);
        Ok(receipt)
    }

    // -------------------------------------------------------------------------
    // Shared steps
    // -------------------------------------------------------------------------

    async fn history_snapshot(&self, account_id: Uuid) -> Result<AccountHistory, LedgerError> {
        self.store
            .account_history(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    /// Fetch an account for mutation. Soft-closed accounts are invisible
    /// here; their history stays readable through the snapshot path.
    async fn resolve(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        if account.is_closed() {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        Ok(account)
    }

    /// Commit with a freshly drawn reference, retrying on a storage-level
    /// collision. A collision caused by a raced idempotency key resolves to
    /// a replay of the winner's result instead.
    async fn commit_with_reference(
        &self,
        idempotency_key: Option<&str>,
        build: impl Fn(String) -> LedgerCommit,
    ) -> Result<CommitReceipt, LedgerError> {
        let mut attempt = 0u32;
        loop {
            let reference_id = reference::generate();
            match self.store.commit(build(reference_id)).await {
                Err(LedgerError::DuplicateReference) => {
                    if let Some(key) = idempotency_key {
                        let existing = self.store.find_by_idempotency_key(key).await?;
                        if !existing.is_empty() {
                            return Ok(CommitReceipt {
                                transactions: existing,
                            });
                        }
                    }
                    attempt += 1;
                    if attempt >= self.config.max_reference_attempts {
                        return Err(LedgerError::DuplicateReference);
                    }
                    warn!(attempt, "Reference collision, retrying with a fresh identifier");
                }
                other => return other,
            }
        }
    }

    async fn replay_single(&self, key: Option<&str>) -> Result<Option<Receipt>, LedgerError> {
        let Some(key) = key else { return Ok(None) };
        let existing = self.store.find_by_idempotency_key(key).await?;
        if existing.is_empty() {
            return Ok(None);
        }
        single_receipt(CommitReceipt {
            transactions: existing,
        })
        .map(Some)
    }

    async fn replay_transfer(
        &self,
        key: Option<&str>,
    ) -> Result<Option<TransferReceipt>, LedgerError> {
        let Some(key) = key else { return Ok(None) };
        let existing = self.store.find_by_idempotency_key(key).await?;
        if existing.is_empty() {
            return Ok(None);
        }
        transfer_receipt(CommitReceipt {
            transactions: existing,
        })
        .map(Some)
    }

    /// Fire-and-forget notification. A failed delivery never unwinds the
    /// committed operation.
    fn emit(&self, operation: OperationKind, transaction: &Transaction) {
        let Some(sink) = self.sink.clone() else { return };
        let event = LedgerEvent {
            operation,
            account_id: transaction.account_id,
            amount: transaction.amount,
            reference_id: transaction.reference_id.clone(),
            new_balance: transaction.balance_after,
        };
        tokio::spawn(async move {
            if let Err(error) = sink.deliver(event).await {
                warn!(error = %error, "Notification delivery failed");
            }
        });
    }
}

fn enforce_ownership(account: &Account, principal: Uuid) -> Result<(), LedgerError> {
    if !account.is_owned_by(principal) {
        return Err(LedgerError::Unauthorized);
    }
    Ok(())
}

fn enforce_policy(account: &Account, operation: OperationKind) -> Result<(), LedgerError> {
    match policy::decide(account, operation) {
        Decision::Allow => Ok(()),
        Decision::Deny { reason } => Err(LedgerError::AccountSuspended { reason }),
    }
}

fn enforce_sufficiency(account: &Account, requested: Decimal) -> Result<(), LedgerError> {
    if requested > account.balance {
        return Err(LedgerError::InsufficientFunds {
            balance: account.balance,
            requested,
        });
    }
    Ok(())
}

fn single_receipt(receipt: CommitReceipt) -> Result<Receipt, LedgerError> {
    let mut transactions = receipt.transactions;
    if transactions.len() != 1 {
        return Err(LedgerError::StorageFailure(anyhow::anyhow!(
            "Expected one committed record, found {}",
            transactions.len()
        )));
    }
    let transaction = transactions.remove(0);
    Ok(Receipt {
        reference_id: transaction.reference_id.clone(),
        new_balance: transaction.balance_after,
        transaction,
    })
}

fn transfer_receipt(receipt: CommitReceipt) -> Result<TransferReceipt, LedgerError> {
    let mut debit = None;
    let mut credit = None;
    for transaction in receipt.transactions {
        match transaction.parsed_direction() {
            Some(Direction::Debit) if debit.is_none() => debit = Some(transaction),
            Some(Direction::Credit) if credit.is_none() => credit = Some(transaction),
            _ => {
                return Err(LedgerError::StorageFailure(anyhow::anyhow!(
                    "Unexpected transfer leg shape"
                )))
            }
        }
    }
    let (Some(debit_leg), Some(credit_leg)) = (debit, credit) else {
        return Err(LedgerError::StorageFailure(anyhow::anyhow!(
            "Transfer commit missing a leg"
        )));
    };
    Ok(TransferReceipt {
        reference_id: debit_leg.reference_id.clone(),
        source_balance: debit_leg.balance_after,
        destination_balance: credit_leg.balance_after,
        debit_leg,
        credit_leg,
    })
}
