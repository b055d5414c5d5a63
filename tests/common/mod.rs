//! Common test utilities for ledger-engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use ledger_engine::config::EngineConfig;
use ledger_engine::engine::requests::DepositRequest;
use ledger_engine::engine::LedgerEngine;
use ledger_engine::models::{Account, AccountHistory, CreateAccount};
use ledger_engine::services::InMemoryStore;
use rust_decimal::Decimal;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,ledger_engine=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Engine over a fresh in-memory store with default settings.
pub fn spawn_engine() -> Arc<LedgerEngine<InMemoryStore>> {
    init_tracing();
    Arc::new(LedgerEngine::new(
        Arc::new(InMemoryStore::new()),
        EngineConfig::default(),
    ))
}

/// Parse a decimal literal.
pub fn dec(value: &str) -> Decimal {
    value.parse().expect("decimal literal")
}

/// Open an account owned by `owner`.
pub async fn open_account(engine: &LedgerEngine<InMemoryStore>, owner: Uuid) -> Account {
    engine
        .open_account(CreateAccount::new(owner))
        .await
        .expect("Failed to open account")
}

/// Open an account and seed it with a deposit.
pub async fn open_funded_account(
    engine: &LedgerEngine<InMemoryStore>,
    owner: Uuid,
    amount: &str,
) -> Account {
    let account = open_account(engine, owner).await;
    let request =
        DepositRequest::new(account.account_id, dec(amount)).expect("valid seed amount");
    engine
        .deposit(owner, request)
        .await
        .expect("Failed to seed account");
    account
}

/// Assert the balance equals the net sum of the recorded history.
pub fn assert_balanced(history: &AccountHistory) {
    let net: Decimal = history
        .transactions
        .iter()
        .map(|t| t.signed_amount())
        .sum();
    assert_eq!(
        history.account.balance, net,
        "balance must equal the net sum of the transaction history"
    );
}
