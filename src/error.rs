//! Error types for ledger operations.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Every way a ledger operation can fail.
///
/// Validation failures are deterministic and checked before any mutation,
/// so re-issuing the identical request yields the identical error. `Busy`
/// and `DuplicateReference` are transient and safe to retry.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Account {0} not found")]
    AccountNotFound(Uuid),

    #[error("Not authorized for this account")]
    Unauthorized,

    #[error("Account suspended: {reason}")]
    AccountSuspended { reason: String },

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        balance: Decimal,
        requested: Decimal,
    },

    #[error("Operation timed out waiting for the account lock")]
    Busy,

    #[error("Duplicate transaction reference")]
    DuplicateReference,

    #[error("Storage failure: {0}")]
    StorageFailure(anyhow::Error),
}

impl LedgerError {
    /// Transient errors the caller (or the engine itself) may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::DuplicateReference)
    }

    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "invalid_amount",
            Self::AccountNotFound(_) => "account_not_found",
            Self::Unauthorized => "unauthorized",
            Self::AccountSuspended { .. } => "account_suspended",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::Busy => "busy",
            Self::DuplicateReference => "duplicate_reference",
            Self::StorageFailure(_) => "storage_failure",
        }
    }
}
