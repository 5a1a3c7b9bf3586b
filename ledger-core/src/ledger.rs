//! Main ledger orchestration layer
//!
//! Ties storage, the per-account lock arena and transaction scopes into
//! the ledger store API: account registration, balance reads, atomic
//! idempotent entry application, paginated history and reconciliation.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{AccountId, Config, EntryKind, Ledger, Pool, Registration};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> ledger_core::Result<()> {
//!     let ledger = Ledger::open(Config::default())?;
//!
//!     let alice = AccountId::new("alice");
//!     ledger
//!         .register_account(Registration::new(alice.clone(), "ALICE", None))
//!         .await?;
//!
//!     ledger
//!         .apply_entry(&alice, Pool::Spendable, Decimal::from(100), EntryKind::Deposit, "dep-1")
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    crypto::{verify_chain, GENESIS_HASH},
    locks::AccountLocks,
    metrics::Metrics,
    scope::AccountScope,
    storage::{CommitSet, Storage},
    types::{
        Account, AccountId, Balances, EntryKind, LedgerEntry, Pool, ReconciliationReport,
        MAX_UPLINE_DEPTH,
    },
    Config, Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

/// Page size used when walking full histories
const SCAN_PAGE: usize = 1_000;

/// Input for [`Ledger::register_account`]
#[derive(Debug, Clone)]
pub struct Registration {
    /// Identity-provider account ID
    pub account_id: AccountId,
    /// Code this account hands out to invitees
    pub referral_code: String,
    /// Code of the inviting account, if any
    pub inviter_code: Option<String>,
}

impl Registration {
    /// Create a registration
    pub fn new(
        account_id: AccountId,
        referral_code: impl Into<String>,
        inviter_code: Option<String>,
    ) -> Self {
        Self {
            account_id,
            referral_code: referral_code.into(),
            inviter_code,
        }
    }
}

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    storage: Arc<Storage>,
    locks: AccountLocks,
    metrics: Metrics,
    registration: Mutex<()>,
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;
        let locks = AccountLocks::new(Duration::from_millis(config.locks.acquire_timeout_ms));

        Ok(Self {
            storage,
            locks,
            metrics,
            registration: Mutex::new(()),
            config,
        })
    }

    /// Configuration the ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Register a new account.
    ///
    /// The up-line is the inviter followed by the inviter's own up-line,
    /// truncated to [`MAX_UPLINE_DEPTH`]. Since an inviter must already
    /// exist, the chain can never contain the new account.
    pub async fn register_account(&self, registration: Registration) -> Result<Account> {
        let _serialized = self.registration.lock().await;

        if self.storage.get_account(&registration.account_id)?.is_some() {
            return Err(Error::AccountExists(registration.account_id));
        }
        if registration.referral_code.is_empty() {
            return Err(Error::InvalidRegistration(
                "referral code must not be empty".to_string(),
            ));
        }
        if self
            .storage
            .account_by_referral_code(&registration.referral_code)?
            .is_some()
        {
            return Err(Error::DuplicateReferralCode(registration.referral_code));
        }

        let upline = match &registration.inviter_code {
            Some(code) => {
                let inviter_id = self
                    .storage
                    .account_by_referral_code(code)?
                    .ok_or_else(|| Error::UnknownReferralCode(code.clone()))?;
                let inviter = self.get_account(&inviter_id)?;

                let mut upline = Vec::with_capacity(MAX_UPLINE_DEPTH);
                upline.push(inviter_id);
                upline.extend(inviter.upline.into_iter().take(MAX_UPLINE_DEPTH - 1));
                upline
            }
            None => Vec::new(),
        };

        let account = Account {
            account_id: registration.account_id.clone(),
            referral_code: registration.referral_code.clone(),
            upline,
            balances: Balances::default(),
            lifetime_deposits: Decimal::ZERO,
            entry_count: 0,
            head_hash: GENESIS_HASH,
            active: true,
            created_at: Utc::now(),
        };

        self.storage.commit(&CommitSet {
            accounts: vec![account.clone()],
            referral_codes: vec![(registration.referral_code, registration.account_id)],
            ..Default::default()
        })?;

        tracing::info!(
            account = %account.account_id,
            upline_depth = account.upline.len(),
            "Account registered"
        );

        Ok(account)
    }

    /// Get account record
    pub fn get_account(&self, account_id: &AccountId) -> Result<Account> {
        self.storage
            .get_account(account_id)?
            .ok_or_else(|| Error::AccountNotFound(account_id.clone()))
    }

    /// Current balances of all three pools
    pub fn get_balances(&self, account_id: &AccountId) -> Result<Balances> {
        Ok(self.get_account(account_id)?.balances)
    }

    /// All registered account IDs
    pub fn account_ids(&self) -> Result<Vec<AccountId>> {
        self.storage.account_ids()
    }

    /// Enter the account's critical section
    pub async fn scope(&self, account_id: &AccountId) -> Result<AccountScope<'_>> {
        let guard = self.locks.acquire(account_id).await?;
        let account = self.get_account(account_id)?;
        Ok(AccountScope::new(&self.storage, &self.metrics, account, guard))
    }

    /// Apply a single entry atomically.
    ///
    /// Rejects with [`Error::InsufficientFunds`] if the pool would go
    /// negative. Re-applying the same `(reference, kind)` returns the
    /// original entry without writing anything.
    pub async fn apply_entry(
        &self,
        account_id: &AccountId,
        pool: Pool,
        delta: Decimal,
        kind: EntryKind,
        reference: &str,
    ) -> Result<LedgerEntry> {
        let mut scope = self.scope(account_id).await?;
        let applied = scope.apply(pool, delta, kind, reference)?;
        scope.commit()?;
        Ok(applied.into_entry())
    }

    /// Entry previously written for `(kind, reference)`
    pub fn find_entry(&self, kind: EntryKind, reference: &str) -> Result<Option<LedgerEntry>> {
        self.storage.get_applied(kind, reference)
    }

    /// Page of an account's history, oldest first, starting after `after_sequence`
    pub fn history(
        &self,
        account_id: &AccountId,
        after_sequence: Option<u64>,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>> {
        self.get_account(account_id)?;
        self.storage
            .entries_after(account_id, after_sequence.unwrap_or(0), limit)
    }

    /// Mark an account inactive; history and balances are kept
    pub async fn deactivate_account(&self, account_id: &AccountId) -> Result<Account> {
        let mut scope = self.scope(account_id).await?;
        scope.deactivate();
        let account = scope.account().clone();
        scope.commit()?;

        tracing::info!(account = %account_id, "Account deactivated");
        Ok(account)
    }

    /// Recompute balances from entries and verify the hash chain
    pub async fn reconcile(&self, account_id: &AccountId) -> Result<ReconciliationReport> {
        let scope = self.scope(account_id).await?;
        let account = scope.account().clone();

        let mut derived = Balances::default();
        let mut entries = Vec::with_capacity(account.entry_count as usize);
        let mut after = 0u64;

        loop {
            let page = self.storage.entries_after(account_id, after, SCAN_PAGE)?;
            let Some(last) = page.last() else {
                break;
            };
            after = last.sequence;
            entries.extend(page);
        }
        drop(scope);

        for entry in &entries {
            derived.accumulate(entry.pool, entry.delta);
        }

        let chain_intact = entries.len() as u64 == account.entry_count
            && verify_chain(entries.iter())
            && entries.last().map(|e| e.hash).unwrap_or(GENESIS_HASH) == account.head_hash;

        let report = ReconciliationReport {
            account_id: account_id.clone(),
            recorded: account.balances,
            derived,
            entry_count: entries.len() as u64,
            chain_intact,
        };

        if !report.is_consistent() {
            tracing::error!(
                account = %account_id,
                recorded = ?report.recorded,
                derived = ?report.derived,
                chain_intact,
                "Reconciliation mismatch"
            );
        }

        Ok(report)
    }

    /// Read a higher-layer record
    pub fn get_record<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<Option<T>> {
        match self.storage.get_record(namespace, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Records in `namespace` whose key starts with `key_prefix`, in key order
    pub fn scan_records<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key_prefix: &str,
    ) -> Result<Vec<(String, T)>> {
        self.storage
            .scan_records(namespace, key_prefix)?
            .into_iter()
            .map(|(key, bytes)| Ok((key, bincode::deserialize(&bytes)?)))
            .collect()
    }

    /// Forget lock slots for idle accounts
    pub fn prune_locks(&self) -> usize {
        self.locks.prune()
    }
}
