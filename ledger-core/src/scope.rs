//! Account transaction scope
//!
//! An [`AccountScope`] is the only way to mutate an account. It holds the
//! account's lock for its whole lifetime, stages entries and records in
//! memory, and writes everything in one atomic commit. Dropping a scope
//! without calling [`AccountScope::commit`] discards every staged change.
//!
//! ```text
//!   scope = ledger.scope(account)      // lock acquired, record loaded
//!   scope.apply(pool, delta, ...)      // staged, balances checked
//!   scope.apply(pool, delta, ...)      // staged
//!   scope.put_record(ns, key, value)   // staged
//!   scope.commit()                     // one WriteBatch, lock released
//! ```

use crate::{
    crypto::entry_hash,
    locks::AccountGuard,
    metrics::Metrics,
    storage::{CommitSet, Storage},
    types::{Account, Applied, Balances, EntryKind, LedgerEntry, Pool, MONEY_SCALE},
    Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Exclusive, buffered view of one account
#[derive(Debug)]
pub struct AccountScope<'a> {
    storage: &'a Storage,
    metrics: &'a Metrics,
    account: Account,
    account_dirty: bool,
    staged: Vec<LedgerEntry>,
    commit: CommitSet,
    _guard: AccountGuard,
}

impl<'a> AccountScope<'a> {
    pub(crate) fn new(
        storage: &'a Storage,
        metrics: &'a Metrics,
        account: Account,
        guard: AccountGuard,
    ) -> Self {
        Self {
            storage,
            metrics,
            account,
            account_dirty: false,
            staged: Vec::new(),
            commit: CommitSet::default(),
            _guard: guard,
        }
    }

    /// Account record including staged changes
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Balances including staged changes
    pub fn balances(&self) -> Balances {
        self.account.balances
    }

    /// Apply a signed delta to one pool.
    ///
    /// Idempotent per `(reference, kind)`: if that pair was already applied
    /// (committed earlier or staged in this scope) the original entry is
    /// returned as [`Applied::Replayed`] and nothing is staged.
    pub fn apply(
        &mut self,
        pool: Pool,
        delta: Decimal,
        kind: EntryKind,
        reference: &str,
    ) -> Result<Applied> {
        if delta.is_zero() || delta.normalize().scale() > MONEY_SCALE {
            return Err(Error::InvalidAmount(format!(
                "{} delta {} must be non-zero with at most {} decimal places",
                kind, delta, MONEY_SCALE
            )));
        }

        if let Some(existing) = self
            .staged
            .iter()
            .find(|e| e.kind == kind && e.reference == reference)
        {
            return Ok(Applied::Replayed(existing.clone()));
        }

        if let Some(existing) = self.storage.get_applied(kind, reference)? {
            if existing.account_id != self.account.account_id {
                return Err(Error::InvariantViolation(format!(
                    "{} reference {} already applied to account {}",
                    kind, reference, existing.account_id
                )));
            }
            self.metrics.replays_total.inc();
            tracing::debug!(
                account = %self.account.account_id,
                kind = %kind,
                reference = %reference,
                "Reference already applied, returning original entry"
            );
            return Ok(Applied::Replayed(existing));
        }

        let available = self.account.balances.get(pool);
        let lifetime_deposits = if kind == EntryKind::Deposit && delta.is_sign_positive() {
            self.account.lifetime_deposits.checked_add(delta)
        } else {
            Some(self.account.lifetime_deposits)
        };
        let (Some(lifetime_deposits), Some(_)) = (lifetime_deposits, available.checked_add(delta))
        else {
            return Err(Error::InvalidAmount(format!(
                "{} delta {} overflows {} of {}",
                kind, delta, pool, self.account.account_id
            )));
        };

        let balance_after = match self.account.balances.checked_apply(pool, delta) {
            Some(balance) => balance,
            None => {
                self.metrics.insufficient_funds_total.inc();
                return Err(Error::InsufficientFunds {
                    account: self.account.account_id.clone(),
                    pool,
                    available,
                    requested: delta.abs(),
                });
            }
        };

        self.account.lifetime_deposits = lifetime_deposits;

        let sequence = self.account.entry_count + 1;
        let mut entry = LedgerEntry {
            entry_id: Uuid::now_v7(),
            account_id: self.account.account_id.clone(),
            sequence,
            pool,
            delta,
            balance_after,
            kind,
            reference: reference.to_string(),
            recorded_at: Utc::now(),
            prev_hash: self.account.head_hash,
            hash: [0u8; 32],
        };
        entry.hash = entry_hash(&entry);

        self.account.entry_count = sequence;
        self.account.head_hash = entry.hash;
        self.account_dirty = true;
        self.staged.push(entry.clone());

        Ok(Applied::Fresh(entry))
    }

    /// Mark the account inactive
    pub fn deactivate(&mut self) {
        if self.account.active {
            self.account.active = false;
            self.account_dirty = true;
        }
    }

    /// Stage an upsert of a higher-layer record
    pub fn put_record<T: Serialize>(
        &mut self,
        namespace: &str,
        key: impl Into<String>,
        value: &T,
    ) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        self.commit
            .record_puts
            .push((namespace.to_string(), key.into(), bytes));
        Ok(())
    }

    /// Stage a record deletion
    pub fn delete_record(&mut self, namespace: &str, key: impl Into<String>) {
        self.commit
            .record_deletes
            .push((namespace.to_string(), key.into()));
    }

    /// Entries staged so far
    pub fn staged_entries(&self) -> &[LedgerEntry] {
        &self.staged
    }

    /// Write all staged changes atomically and release the lock.
    ///
    /// Returns the entries that were newly written.
    pub fn commit(mut self) -> Result<Vec<LedgerEntry>> {
        if self.account_dirty {
            self.commit.accounts.push(self.account.clone());
        }
        self.commit.entries = std::mem::take(&mut self.staged);

        let timer = self.metrics.commit_duration.start_timer();
        self.storage.commit(&self.commit)?;
        timer.observe_duration();

        let entries = std::mem::take(&mut self.commit.entries);
        self.metrics.entries_total.inc_by(entries.len() as u64);

        for entry in &entries {
            tracing::debug!(
                account = %entry.account_id,
                sequence = entry.sequence,
                pool = %entry.pool,
                kind = %entry.kind,
                delta = %entry.delta,
                balance_after = %entry.balance_after,
                reference = %entry.reference,
                "Ledger entry committed"
            );
        }

        Ok(entries)
    }
}
