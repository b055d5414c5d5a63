//! PostgreSQL store for the ledger engine.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{Account, AccountHistory, CreateAccount, Transaction};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{CommitReceipt, LedgerCommit, LedgerStore};

const ACCOUNT_COLUMNS: &str = "account_id, owner_id, account_number, balance, suspended, \
     suspension_reason, metadata, created_utc, closed_utc";

const TRANSACTION_COLUMNS: &str = "transaction_id, reference_id, account_id, counterpart_id, \
     kind, direction, amount, description, status, balance_after, metadata, idempotency_key, \
     created_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "ledger-engine"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, LedgerError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| {
                LedgerError::StorageFailure(anyhow::anyhow!("Failed to connect: {}", e))
            })?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                LedgerError::StorageFailure(anyhow::anyhow!("Health check failed: {}", e))
            })?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), LedgerError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                LedgerError::StorageFailure(anyhow::anyhow!("Migration failed: {}", e))
            })?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for Database {
    #[instrument(skip(self, input), fields(owner_id = %input.owner_id))]
    async fn create_account(&self, input: &CreateAccount) -> Result<Account, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            "INSERT INTO accounts (account_id, owner_id, account_number, metadata) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(input.owner_id)
        .bind(&input.account_number)
        .bind(&input.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                LedgerError::StorageFailure(anyhow::anyhow!(
                    "Account number '{}' already in use",
                    input.account_number
                ))
            }
            _ => LedgerError::StorageFailure(anyhow::anyhow!("Failed to create account: {}", e)),
        })?;

        timer.observe_duration();

        info!(
            account_id = %account.account_id,
            account_number = %account.account_number,
            "Account created"
        );

        Ok(account)
    }

    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_id = $1"
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::StorageFailure(anyhow::anyhow!("Failed to get account: {}", e)))?;

        timer.observe_duration();

        Ok(account)
    }

    #[instrument(skip(self, reason), fields(account_id = %account_id, suspended = suspended))]
    async fn set_suspension(
        &self,
        account_id: Uuid,
        suspended: bool,
        reason: Option<String>,
    ) -> Result<Account, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_suspension"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            "UPDATE accounts SET suspended = $2, suspension_reason = $3 \
             WHERE account_id = $1 AND closed_utc IS NULL \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(account_id)
        .bind(suspended)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            LedgerError::StorageFailure(anyhow::anyhow!("Failed to set suspension: {}", e))
        })?
        .ok_or(LedgerError::AccountNotFound(account_id))?;

        timer.observe_duration();

        Ok(account)
    }

    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn close_account(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["close_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            "UPDATE accounts SET closed_utc = now() \
             WHERE account_id = $1 AND closed_utc IS NULL \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            LedgerError::StorageFailure(anyhow::anyhow!("Failed to close account: {}", e))
        })?
        .ok_or(LedgerError::AccountNotFound(account_id))?;

        timer.observe_duration();

        Ok(account)
    }

    #[instrument(skip(self, commit), fields(record_count = commit.records.len()))]
    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["commit"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            LedgerError::StorageFailure(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Row locks in ascending account id order - the same discipline the
        // engine's lock registry uses, so commits from other processes
        // cannot deadlock against this one.
        let mut ids: Vec<Uuid> = commit.records.iter().map(|r| r.account_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let mut balances: HashMap<Uuid, Decimal> = HashMap::with_capacity(ids.len());
        for account_id in &ids {
            let balance: Option<Decimal> = sqlx::query_scalar(
                "SELECT balance FROM accounts WHERE account_id = $1 AND closed_utc IS NULL \
                 FOR UPDATE",
            )
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                LedgerError::StorageFailure(anyhow::anyhow!("Failed to lock account: {}", e))
            })?;
            let balance = balance.ok_or(LedgerError::AccountNotFound(*account_id))?;
            balances.insert(*account_id, balance);
        }

        // Validate the running balances before writing anything.
        let mut after = Vec::with_capacity(commit.records.len());
        for record in &commit.records {
            let balance = balances.get_mut(&record.account_id).ok_or_else(|| {
                LedgerError::StorageFailure(anyhow::anyhow!(
                    "Commit references unlocked account {}",
                    record.account_id
                ))
            })?;
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

        let mut committed = Vec::with_capacity(commit.records.len());
        for (record, balance_after) in commit.records.iter().zip(after) {
            let row = sqlx::query_as::<_, Transaction>(&format!(
                "INSERT INTO transactions (transaction_id, reference_id, account_id, \
                 counterpart_id, kind, direction, amount, description, status, balance_after, \
                 metadata, idempotency_key) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'success', $9, $10, $11) \
                 RETURNING {TRANSACTION_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(&record.reference_id)
            .bind(record.account_id)
            .bind(record.counterpart_id)
            .bind(record.kind.as_str())
            .bind(record.direction.as_str())
            .bind(record.amount)
            .bind(&record.description)
            .bind(balance_after)
            .bind(&record.metadata)
            .bind(&record.idempotency_key)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    LedgerError::DuplicateReference
                }
                _ => LedgerError::StorageFailure(anyhow::anyhow!(
                    "Failed to append transaction: {}",
                    e
                )),
            })?;
            committed.push(row);
        }

        for (account_id, balance) in &balances {
            sqlx::query("UPDATE accounts SET balance = $2 WHERE account_id = $1")
                .bind(account_id)
                .bind(balance)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    LedgerError::StorageFailure(anyhow::anyhow!(
                        "Failed to update balance: {}",
                        e
                    ))
                })?;
        }

        tx.commit().await.map_err(|e| {
            LedgerError::StorageFailure(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(records = committed.len(), "Ledger commit applied");

        Ok(CommitReceipt {
            transactions: committed,
        })
    }

    #[instrument(skip(self, key))]
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Vec<Transaction>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_by_idempotency_key"])
            .start_timer();

        let reference: Option<String> = sqlx::query_scalar(
            "SELECT reference_id FROM transactions WHERE idempotency_key = $1 LIMIT 1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            LedgerError::StorageFailure(anyhow::anyhow!("Failed to check idempotency: {}", e))
        })?;

        let Some(reference_id) = reference else {
            timer.observe_duration();
            return Ok(Vec::new());
        };

        let rows = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE reference_id = $1 \
             ORDER BY created_utc, transaction_id"
        ))
        .bind(&reference_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            LedgerError::StorageFailure(anyhow::anyhow!("Failed to fetch legs: {}", e))
        })?;

        timer.observe_duration();

        Ok(rows)
    }

    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn account_history(
        &self,
        account_id: Uuid,
    ) -> Result<Option<AccountHistory>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["account_history"])
            .start_timer();

        // One repeatable-read transaction so the balance and the list come
        // from the same point in time.
        let mut tx = self.pool.begin().await.map_err(|e| {
            LedgerError::StorageFailure(anyhow::anyhow!("Failed to begin snapshot: {}", e))
        })?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                LedgerError::StorageFailure(anyhow::anyhow!("Failed to set isolation: {}", e))
            })?;

        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_id = $1"
        ))
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| LedgerError::StorageFailure(anyhow::anyhow!("Failed to get account: {}", e)))?;

        let Some(account) = account else {
            tx.rollback().await.ok();
            timer.observe_duration();
            return Ok(None);
        };

        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = $1 \
             ORDER BY created_utc DESC, transaction_id DESC"
        ))
        .bind(account_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            LedgerError::StorageFailure(anyhow::anyhow!("Failed to get history: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            LedgerError::StorageFailure(anyhow::anyhow!("Failed to close snapshot: {}", e))
        })?;

        timer.observe_duration();

        Ok(Some(AccountHistory {
            account,
            transactions,
        }))
    }
}
