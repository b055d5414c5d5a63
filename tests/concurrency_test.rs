//! Concurrency tests: racing operations against shared accounts must never
//! leave the ledger inconsistent.

mod common;

use common::{assert_balanced, dec, open_account, open_funded_account, spawn_engine};
use ledger_engine::engine::requests::{DepositRequest, TransferRequest, WithdrawRequest};
use ledger_engine::error::LedgerError;
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_withdrawals_never_overdraw() {
    let engine = spawn_engine();
    let owner = Uuid::new_v4();
    let account = open_funded_account(&engine, owner, "100.00").await;

    // Ten withdrawals of 30.00 against 100.00: exactly three can succeed.
    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        let account_id = account.account_id;
        handles.push(tokio::spawn(async move {
            let request = WithdrawRequest::new(account_id, dec("30.00")).unwrap();
            engine.withdraw(owner, request).await
        }));
    }

    let mut succeeded = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(LedgerError::InsufficientFunds { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(succeeded, 3);
    assert_eq!(insufficient, 7);

    let history = engine.history(owner, account.account_id).await.unwrap();
    assert_eq!(history.account.balance, dec("10.00"));
    assert!(history.account.balance >= Decimal::ZERO);
    assert_eq!(history.transactions.len(), 4, "seed plus three debits");
    assert_balanced(&history);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deposits_all_apply() {
    let engine = spawn_engine();
    let owner = Uuid::new_v4();
    let account = open_account(&engine, owner).await;

    let mut handles = Vec::new();
    for _ in 0..25 {
        let engine = engine.clone();
        let account_id = account.account_id;
        handles.push(tokio::spawn(async move {
            let request = DepositRequest::new(account_id, dec("4.00")).unwrap();
            engine.deposit(owner, request).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let history = engine.history(owner, account.account_id).await.unwrap();
    assert_eq!(history.account.balance, dec("100.00"));
    assert_eq!(history.transactions.len(), 25);
    assert_balanced(&history);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposing_transfers_conserve_total_and_finish() {
    let engine = spawn_engine();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let a = open_funded_account(&engine, alice, "500.00").await;
    let b = open_funded_account(&engine, bob, "500.00").await;

    // Interleaved a->b and b->a transfers; lock ordering must prevent
    // deadlock and every commit must stay atomic.
    let mut handles = Vec::new();
    for i in 0..20 {
        let engine = engine.clone();
        let (principal, source, destination) = if i % 2 == 0 {
            (alice, a.account_id, b.account_id)
        } else {
            (bob, b.account_id, a.account_id)
        };
        handles.push(tokio::spawn(async move {
            let request = TransferRequest::new(source, destination, dec("10.00")).unwrap();
            engine.transfer(principal, request).await
        }));
    }

    tokio::time::timeout(std::time::Duration::from_secs(10), async {
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    })
    .await
    .expect("opposing transfers must not deadlock");

    let a_history = engine.history(alice, a.account_id).await.unwrap();
    let b_history = engine.history(bob, b.account_id).await.unwrap();

    // Ten each way: both balances end where they started, and the total is
    // conserved.
    assert_eq!(a_history.account.balance, dec("500.00"));
    assert_eq!(b_history.account.balance, dec("500.00"));
    assert_eq!(
        a_history.account.balance + b_history.account.balance,
        dec("1000.00")
    );
    assert_eq!(a_history.transactions.len(), 21, "seed plus twenty legs");
    assert_balanced(&a_history);
    assert_balanced(&b_history);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_operation_storm_keeps_every_account_balanced() {
    let engine = spawn_engine();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let a = open_funded_account(&engine, alice, "300.00").await;
    let b = open_funded_account(&engine, bob, "300.00").await;

    let mut handles = Vec::new();
    for i in 0..40 {
        let engine = engine.clone();
        let a_id = a.account_id;
        let b_id = b.account_id;
        handles.push(tokio::spawn(async move {
            match i % 4 {
                0 => {
                    let request = DepositRequest::new(a_id, dec("7.00")).unwrap();
                    engine.deposit(alice, request).await.map(|_| ())
                }
                1 => {
                    let request = WithdrawRequest::new(b_id, dec("5.00")).unwrap();
                    engine.withdraw(bob, request).await.map(|_| ())
                }
                2 => {
                    let request = TransferRequest::new(a_id, b_id, dec("3.00")).unwrap();
                    engine.transfer(alice, request).await.map(|_| ())
                }
                _ => {
                    let request = TransferRequest::new(b_id, a_id, dec("2.00")).unwrap();
                    engine.transfer(bob, request).await.map(|_| ())
                }
            }
        }));
    }
    for handle in handles {
        // Individual operations may legitimately fail on funds; the ledger
        // must stay consistent either way.
        match handle.await.unwrap() {
            Ok(()) | Err(LedgerError::InsufficientFunds { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let a_history = engine.history(alice, a.account_id).await.unwrap();
    let b_history = engine.history(bob, b.account_id).await.unwrap();
    assert_balanced(&a_history);
    assert_balanced(&b_history);
    assert!(a_history.account.balance >= Decimal::ZERO);
    assert!(b_history.account.balance >= Decimal::ZERO);
}
