//! Storage and observability services.

pub mod database;
pub mod memory;
pub mod metrics;
pub mod store;

pub use database::Database;
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics, record_account_opened, record_operation};
pub use store::{CommitReceipt, LedgerCommit, LedgerStore};
