//! Configuration store access
//!
//! Policy values (exchange rate, withdrawal fee, eligibility rules) come
//! from an external store. Every operation takes one point-in-time
//! snapshot before it locks any account and freezes the values it uses
//! into the record it writes.

use crate::{Error, Result};
use async_trait::async_trait;
use eligibility_engine::WithdrawalRules;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Point-in-time policy snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Monotonic configuration version
    pub version: u64,

    /// Spendable units credited per referral coin
    pub exchange_rate: Decimal,

    /// Fee charged on withdrawals, in percent of the amount
    pub withdrawal_fee_percent: Decimal,

    /// Smallest withdrawal accepted
    pub min_withdrawal: Decimal,

    /// Eligibility rules
    pub withdrawal_rules: WithdrawalRules,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            version: 1,
            exchange_rate: Decimal::ONE,
            withdrawal_fee_percent: Decimal::from(5),
            min_withdrawal: Decimal::ZERO,
            withdrawal_rules: WithdrawalRules::default(),
        }
    }
}

impl PolicySettings {
    /// Validate ranges
    pub fn validate(&self) -> Result<()> {
        if self.exchange_rate <= Decimal::ZERO {
            return Err(Error::Config(format!(
                "exchange rate must be positive, got {}",
                self.exchange_rate
            )));
        }
        if self.withdrawal_fee_percent < Decimal::ZERO
            || self.withdrawal_fee_percent >= Decimal::ONE_HUNDRED
        {
            return Err(Error::Config(format!(
                "withdrawal fee {}% outside 0..100",
                self.withdrawal_fee_percent
            )));
        }
        if self.min_withdrawal < Decimal::ZERO {
            return Err(Error::Config(format!(
                "minimum withdrawal must not be negative, got {}",
                self.min_withdrawal
            )));
        }
        self.withdrawal_rules.validate()?;
        Ok(())
    }
}

/// Source of policy snapshots
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Current policy
    async fn snapshot(&self) -> Result<PolicySettings>;
}

/// In-memory configuration store
#[derive(Debug)]
pub struct StaticConfigStore {
    current: RwLock<PolicySettings>,
}

impl StaticConfigStore {
    /// Create store holding `settings`
    pub fn new(settings: PolicySettings) -> Self {
        Self {
            current: RwLock::new(settings),
        }
    }

    /// Modify the policy; the version is bumped on every update
    pub fn update(&self, change: impl FnOnce(&mut PolicySettings)) -> u64 {
        let mut current = self.current.write();
        let version = current.version;
        change(&mut current);
        current.version = version + 1;

        tracing::info!(
            version = current.version,
            exchange_rate = %current.exchange_rate,
            withdrawal_fee_percent = %current.withdrawal_fee_percent,
            "Policy updated"
        );
        current.version
    }

    /// Current version
    pub fn version(&self) -> u64 {
        self.current.read().version
    }
}

#[async_trait]
impl ConfigStore for StaticConfigStore {
    async fn snapshot(&self) -> Result<PolicySettings> {
        Ok(self.current.read().clone())
    }
}

/// Bounded, validating reader over a [`ConfigStore`]
#[derive(Clone)]
pub struct PolicyReader {
    store: Arc<dyn ConfigStore>,
    timeout: Duration,
}

impl std::fmt::Debug for PolicyReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyReader")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PolicyReader {
    /// Wrap a store with a read timeout
    pub fn new(store: Arc<dyn ConfigStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Take a validated snapshot, failing with
    /// [`Error::DependencyUnavailable`] if the store does not answer in time
    pub async fn snapshot(&self) -> Result<PolicySettings> {
        let settings = match tokio::time::timeout(self.timeout, self.store.snapshot()).await {
            Ok(Ok(settings)) => settings,
            Ok(Err(Error::DependencyUnavailable(msg))) => {
                return Err(Error::DependencyUnavailable(msg))
            }
            Ok(Err(e)) => {
                return Err(Error::DependencyUnavailable(format!(
                    "configuration store: {}",
                    e
                )))
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Configuration store read timed out"
                );
                return Err(Error::DependencyUnavailable(format!(
                    "configuration store did not answer within {:?}",
                    self.timeout
                )));
            }
        };
        settings.validate()?;
        Ok(settings)
    }
}
