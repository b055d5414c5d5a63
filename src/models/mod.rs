//! Domain models for the ledger engine.

mod account;
mod transaction;

pub use account::{Account, AccountHistory, CreateAccount};
pub use transaction::{
    Direction, NewTransaction, Transaction, TransactionKind, TransactionStatus,
};
