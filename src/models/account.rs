//! Account model.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::Transaction;

/// A customer account.
///
/// Created by the registration collaborator, mutated exclusively through
/// the ledger engine, soft-deleted only: a closed account stops accepting
/// operations but its transaction history stays readable.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub account_id: Uuid,
    pub owner_id: Uuid,
    pub account_number: String,
    pub balance: Decimal,
    pub suspended: bool,
    pub suspension_reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub closed_utc: Option<DateTime<Utc>>,
}

impl Account {
    /// Check if the account has been soft-deleted.
    pub fn is_closed(&self) -> bool {
        self.closed_utc.is_some()
    }

    /// Check ownership against an authenticated principal.
    pub fn is_owned_by(&self, principal: Uuid) -> bool {
        self.owner_id == principal
    }
}

/// Input for opening a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub owner_id: Uuid,
    pub account_number: String,
    pub metadata: Option<serde_json::Value>,
}

impl CreateAccount {
    /// Account input with a freshly generated 8-digit account number.
    pub fn new(owner_id: Uuid) -> Self {
        Self {
            owner_id,
            account_number: generate_account_number(),
            metadata: None,
        }
    }
}

/// 8-digit human-facing account number.
fn generate_account_number() -> String {
    rand::thread_rng()
        .gen_range(10_000_000u32..100_000_000)
        .to_string()
}

/// Consistent snapshot of an account and its transactions, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountHistory {
    pub account: Account,
    pub transactions: Vec<Transaction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_numbers_are_eight_digits() {
        for _ in 0..100 {
            let input = CreateAccount::new(Uuid::new_v4());
            assert_eq!(input.account_number.len(), 8);
            assert!(input.account_number.chars().all(|c| c.is_ascii_digit()));
            assert!(!input.account_number.starts_with('0'));
        }
    }
}
