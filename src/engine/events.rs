//! Post-commit notification events.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::engine::policy::OperationKind;

/// Emitted after a mutating operation commits.
///
/// Consumers send receipts or push notifications; delivery failure never
/// unwinds the committed operation.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEvent {
    pub operation: OperationKind,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub reference_id: String,
    pub new_balance: Decimal,
}

/// Downstream notification collaborator.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: LedgerEvent) -> anyhow::Result<()>;
}

/// Default sink: writes the event to the log.
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn deliver(&self, event: LedgerEvent) -> anyhow::Result<()> {
        tracing::info!(
            operation = event.operation.as_str(),
            account_id = %event.account_id,
            amount = %event.amount,
            reference_id = %event.reference_id,
            new_balance = %event.new_balance,
            "Ledger event"
        );
        Ok(())
    }
}
