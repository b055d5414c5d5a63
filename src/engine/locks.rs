//! Per-account lock registry serializing mutating operations.
//!
//! Operations on the same account are strictly ordered; operations on
//! different accounts proceed in parallel. Multi-account operations acquire
//! in ascending account id order, so two transfers referencing the same
//! pair in opposite directions cannot deadlock.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Default)]
pub struct AccountLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the lock for one account, waiting at most `wait`.
    pub async fn acquire_one(
        &self,
        account_id: Uuid,
        wait: Duration,
    ) -> Result<OwnedMutexGuard<()>, LedgerError> {
        let lock = self
            .locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        tokio::time::timeout(wait, lock.lock_owned())
            .await
            .map_err(|_| LedgerError::Busy)
    }

    /// Acquire locks for a set of accounts in ascending id order.
    ///
    /// Duplicate ids are collapsed to a single acquisition; each lock gets
    /// its own `wait` budget, so the total wait stays bounded.
    pub async fn acquire(
        &self,
        account_ids: &[Uuid],
        wait: Duration,
    ) -> Result<Vec<OwnedMutexGuard<()>>, LedgerError> {
        let mut ids = account_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.acquire_one(id, wait).await?);
        }
        Ok(guards)
    }
}
