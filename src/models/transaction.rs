//! Transaction model - immutable ledger records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// What produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Credit,
    Debit,
    Transfer,
}

impl TransactionKind {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::Transfer => "transfer",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "credit" => Some(Self::Credit),
            "debit" => Some(Self::Debit),
            "transfer" => Some(Self::Transfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which way a record moves the owning account's balance.
///
/// Credits add, debits subtract. This is also what tells the two mirrored
/// legs of a transfer apart: the source leg is the debit, the destination
/// leg the credit, both under one reference identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "debit" => Some(Self::Debit),
            "credit" => Some(Self::Credit),
            _ => None,
        }
    }

    /// Amount with the sign this direction applies to a balance.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            Self::Credit => amount,
            Self::Debit => -amount,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal state of a committed record.
///
/// Operations that cannot complete are rejected before anything is written,
/// so only successful records ever persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
        }
    }
}

/// Immutable ledger record. The sole mutation path is creation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub reference_id: String,
    pub account_id: Uuid,
    pub counterpart_id: Option<Uuid>,
    pub kind: String,
    pub direction: String,
    pub amount: Decimal,
    pub description: String,
    pub status: String,
    pub balance_after: Decimal,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Transaction {
    /// Get parsed kind.
    pub fn parsed_kind(&self) -> Option<TransactionKind> {
        TransactionKind::from_str(&self.kind)
    }

    /// Get parsed direction.
    pub fn parsed_direction(&self) -> Option<Direction> {
        Direction::from_str(&self.direction)
    }

    /// Signed contribution to the owning account's balance.
    pub fn signed_amount(&self) -> Decimal {
        match self.parsed_direction() {
            Some(direction) => direction.signed(self.amount),
            None => Decimal::ZERO,
        }
    }
}

/// Input for appending one record within a commit.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub reference_id: String,
    pub account_id: Uuid,
    pub counterpart_id: Option<Uuid>,
    pub kind: TransactionKind,
    pub direction: Direction,
    pub amount: Decimal,
    pub description: String,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
}
