//! PostgreSQL store integration tests.
//!
//! These need a live database. Run with:
//!   TEST_DATABASE_URL=postgres://... cargo test -- --ignored

mod common;

use std::sync::Arc;

use common::{dec, init_tracing};
use ledger_engine::config::EngineConfig;
use ledger_engine::engine::requests::{DepositRequest, TransferRequest, WithdrawRequest};
use ledger_engine::engine::LedgerEngine;
use ledger_engine::error::LedgerError;
use ledger_engine::models::{CreateAccount, Direction, NewTransaction, TransactionKind};
use ledger_engine::services::{Database, LedgerCommit, LedgerStore};
use serial_test::serial;
use uuid::Uuid;

async fn spawn_database() -> Arc<Database> {
    init_tracing();
    let url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run database tests");
    let db = Database::new(&url, 2, 1).await.expect("Failed to connect");
    db.run_migrations().await.expect("Failed to migrate");
    Arc::new(db)
}

fn record(
    account_id: Uuid,
    reference_id: &str,
    direction: Direction,
    amount: &str,
) -> NewTransaction {
    NewTransaction {
        reference_id: reference_id.to_string(),
        account_id,
        counterpart_id: None,
        kind: match direction {
            Direction::Credit => TransactionKind::Credit,
            Direction::Debit => TransactionKind::Debit,
        },
        direction,
        amount: dec(amount),
        description: "test".to_string(),
        metadata: None,
        idempotency_key: None,
    }
}

#[tokio::test]
#[ignore]
#[serial]
async fn deposit_withdraw_round_trip_against_postgres() {
    let db = spawn_database().await;
    let engine = LedgerEngine::new(db, EngineConfig::default());

    let owner = Uuid::new_v4();
    let account = engine
        .open_account(CreateAccount::new(owner))
        .await
        .unwrap();

    let deposit = DepositRequest::new(account.account_id, dec("120.00")).unwrap();
    let receipt = engine.deposit(owner, deposit).await.unwrap();
    assert_eq!(receipt.new_balance, dec("120.00"));

    let withdraw = WithdrawRequest::new(account.account_id, dec("45.00")).unwrap();
    let receipt = engine.withdraw(owner, withdraw).await.unwrap();
    assert_eq!(receipt.new_balance, dec("75.00"));

    let history = engine.history(owner, account.account_id).await.unwrap();
    assert_eq!(history.transactions.len(), 2);
    assert_eq!(history.account.balance, dec("75.00"));
    common::assert_balanced(&history);
}

#[tokio::test]
#[ignore]
#[serial]
async fn duplicate_reference_leg_is_rejected_by_postgres() {
    let db = spawn_database().await;
    let account = db
        .create_account(&CreateAccount::new(Uuid::new_v4()))
        .await
        .unwrap();

    let reference = format!("TXN-{}", &Uuid::new_v4().simple().to_string()[..12]);
    db.commit(LedgerCommit {
        records: vec![record(account.account_id, &reference, Direction::Credit, "10.00")],
    })
    .await
    .unwrap();

    let result = db
        .commit(LedgerCommit {
            records: vec![record(account.account_id, &reference, Direction::Credit, "5.00")],
        })
        .await;
    assert!(matches!(result, Err(LedgerError::DuplicateReference)));
}

#[tokio::test]
#[ignore]
#[serial]
async fn failed_transfer_rolls_back_both_sides_in_postgres() {
    let db = spawn_database().await;
    let engine = LedgerEngine::new(db, EngineConfig::default());

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let source = engine.open_account(CreateAccount::new(alice)).await.unwrap();
    let destination = engine.open_account(CreateAccount::new(bob)).await.unwrap();

    let seed = DepositRequest::new(source.account_id, dec("50.00")).unwrap();
    engine.deposit(alice, seed).await.unwrap();

    let request =
        TransferRequest::new(source.account_id, destination.account_id, dec("50.01")).unwrap();
    let result = engine.transfer(alice, request).await;
    assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));

    let source_history = engine.history(alice, source.account_id).await.unwrap();
    assert_eq!(source_history.account.balance, dec("50.00"));
    let destination_history = engine.history(bob, destination.account_id).await.unwrap();
    assert!(destination_history.transactions.is_empty());
}

#[tokio::test]
#[ignore]
#[serial]
async fn transfer_legs_share_a_reference_in_postgres() {
    let db = spawn_database().await;
    let engine = LedgerEngine::new(db, EngineConfig::default());

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let source = engine.open_account(CreateAccount::new(alice)).await.unwrap();
    let destination = engine.open_account(CreateAccount::new(bob)).await.unwrap();

    let seed = DepositRequest::new(source.account_id, dec("100.00")).unwrap();
    engine.deposit(alice, seed).await.unwrap();

    let request =
        TransferRequest::new(source.account_id, destination.account_id, dec("60.00")).unwrap();
    let receipt = engine.transfer(alice, request).await.unwrap();

    assert_eq!(receipt.debit_leg.reference_id, receipt.credit_leg.reference_id);
    assert_eq!(receipt.source_balance, dec("40.00"));
    assert_eq!(receipt.destination_balance, dec("60.00"));
}
