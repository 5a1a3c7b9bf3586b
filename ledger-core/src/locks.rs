//! Per-account lock arena
//!
//! Mutations against one account run one at a time; different accounts
//! never contend. Lock waits are bounded so a stuck holder surfaces as a
//! retryable [`Error::LockTimeout`] instead of a hang.

use crate::{types::AccountId, Error, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{timeout, Duration};

/// Guard proving exclusive access to one account
#[derive(Debug)]
pub struct AccountGuard {
    account_id: AccountId,
    _guard: OwnedMutexGuard<()>,
}

impl AccountGuard {
    /// Account this guard protects
    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }
}

/// Arena of per-account mutexes
#[derive(Debug)]
pub struct AccountLocks {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
    acquire_timeout: Duration,
}

impl AccountLocks {
    /// Create arena with a bounded acquire timeout
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            acquire_timeout,
        }
    }

    /// Enter the critical section of `account_id`
    pub async fn acquire(&self, account_id: &AccountId) -> Result<AccountGuard> {
        let mutex = self
            .locks
            .entry(account_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = timeout(self.acquire_timeout, mutex.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(account = %account_id, "Account lock acquire timed out");
                Error::LockTimeout(account_id.clone())
            })?;

        Ok(AccountGuard {
            account_id: account_id.clone(),
            _guard: guard,
        })
    }

    /// Drop mutexes nobody holds or waits on
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before - self.locks.len()
    }

    /// Number of tracked accounts
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True if no account has been locked yet
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_account_is_exclusive() {
        let locks = AccountLocks::new(Duration::from_millis(50));
        let alice = AccountId::new("alice");

        let held = locks.acquire(&alice).await.unwrap();
        let second = locks.acquire(&alice).await;
        assert!(matches!(second, Err(Error::LockTimeout(_))));

        drop(held);
        assert!(locks.acquire(&alice).await.is_ok());
    }

    #[tokio::test]
    async fn test_different_accounts_do_not_contend() {
        let locks = AccountLocks::new(Duration::from_millis(50));

        let _alice = locks.acquire(&AccountId::new("alice")).await.unwrap();
        let bob = locks.acquire(&AccountId::new("bob")).await;
        assert!(bob.is_ok());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = AccountLocks::new(Duration::from_millis(50));

        let held = locks.acquire(&AccountId::new("alice")).await.unwrap();
        drop(locks.acquire(&AccountId::new("bob")).await.unwrap());

        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);
        assert_eq!(held.account_id().as_str(), "alice");
    }
}
