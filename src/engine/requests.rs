//! Typed operation requests, validated at construction.
//!
//! A request that exists is a request with a positive amount; nothing
//! downstream re-checks it.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::LedgerError;

fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

/// Request to credit an account.
#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub account_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
}

impl DepositRequest {
    pub fn new(account_id: Uuid, amount: Decimal) -> Result<Self, LedgerError> {
        validate_amount(amount)?;
        Ok(Self {
            account_id,
            amount,
            description: None,
            metadata: None,
            idempotency_key: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Request to debit an account.
#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    pub account_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
}

impl WithdrawRequest {
    pub fn new(account_id: Uuid, amount: Decimal) -> Result<Self, LedgerError> {
        validate_amount(amount)?;
        Ok(Self {
            account_id,
            amount,
            description: None,
            metadata: None,
            idempotency_key: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Request to move funds between two accounts.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
}

impl TransferRequest {
    pub fn new(
        source_account_id: Uuid,
        destination_account_id: Uuid,
        amount: Decimal,
    ) -> Result<Self, LedgerError> {
        validate_amount(amount)?;
        Ok(Self {
            source_account_id,
            destination_account_id,
            amount,
            description: None,
            metadata: None,
            idempotency_key: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}
