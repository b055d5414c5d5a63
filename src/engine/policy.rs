//! Suspension policy.
//!
//! A suspended account blocks outflow only: deposits and incoming transfer
//! legs still land. This mirrors how administrative holds behave for
//! customers - money can always arrive, it cannot leave.

use serde::Serialize;

use crate::models::Account;

/// Message used when a suspended account has no recorded reason.
pub const DEFAULT_SUSPENSION_REASON: &str =
    "Your account has been suspended. Please contact support.";

/// Operation kinds the policy distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Deposit,
    Withdrawal,
    TransferOut,
    TransferIn,
}

impl OperationKind {
    pub fn is_outflow(self) -> bool {
        matches!(self, Self::Withdrawal | Self::TransferOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::TransferOut => "transfer_out",
            Self::TransferIn => "transfer_in",
        }
    }
}

/// Policy verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

/// Decide whether `operation` may proceed against `account`.
pub fn decide(account: &Account, operation: OperationKind) -> Decision {
    if !operation.is_outflow() {
        return Decision::Allow;
    }
    if account.suspended {
        return Decision::Deny {
            reason: account
                .suspension_reason
                .clone()
                .unwrap_or_else(|| DEFAULT_SUSPENSION_REASON.to_string()),
        };
    }
    Decision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn account(suspended: bool, reason: Option<&str>) -> Account {
        Account {
            account_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            account_number: "10000001".to_string(),
            balance: Decimal::ZERO,
            suspended,
            suspension_reason: reason.map(str::to_string),
            metadata: None,
            created_utc: Utc::now(),
            closed_utc: None,
        }
    }

    #[test]
    fn decision_table() {
        use OperationKind::*;

        let cases = [
            // (suspended, operation, allowed)
            (false, Deposit, true),
            (false, Withdrawal, true),
            (false, TransferOut, true),
            (false, TransferIn, true),
            (true, Deposit, true),
            (true, Withdrawal, false),
            (true, TransferOut, false),
            (true, TransferIn, true),
        ];

        for (suspended, operation, allowed) in cases {
            let decision = decide(&account(suspended, Some("hold")), operation);
            assert_eq!(
                matches!(decision, Decision::Allow),
                allowed,
                "suspended={suspended} operation={}",
                operation.as_str()
            );
        }
    }

    #[test]
    fn denial_carries_recorded_reason() {
        let decision = decide(
            &account(true, Some("Compliance review in progress")),
            OperationKind::Withdrawal,
        );
        assert_eq!(
            decision,
            Decision::Deny {
                reason: "Compliance review in progress".to_string()
            }
        );
    }

    #[test]
    fn denial_falls_back_to_default_reason() {
        let decision = decide(&account(true, None), OperationKind::TransferOut);
        assert_eq!(
            decision,
            Decision::Deny {
                reason: DEFAULT_SUSPENSION_REASON.to_string()
            }
        );
    }
}
