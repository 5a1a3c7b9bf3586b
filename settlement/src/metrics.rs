//! Settlement metrics
//!
//! - `wallet_deposits_total{outcome}` - Deposit decisions (approved, rejected)
//! - `wallet_withdrawals_total{outcome}` - Withdrawal lifecycle (requested, denied, approved, rejected)
//! - `wallet_exchanges_total` - Completed exchanges
//! - `wallet_commission_payouts_total` - Commission entries written
//! - `wallet_archived_deposits_total` - Deposit requests archived by the janitor

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

/// Metrics collector
#[derive(Clone)]
pub struct SettlementMetrics {
    /// Deposit decisions by outcome
    pub deposits: IntCounterVec,

    /// Withdrawal lifecycle by outcome
    pub withdrawals: IntCounterVec,

    /// Completed exchanges
    pub exchanges: IntCounter,

    /// Commission entries written
    pub commission_payouts: IntCounter,

    /// Archived deposit requests
    pub archived_deposits: IntCounter,

    registry: Registry,
}

impl std::fmt::Debug for SettlementMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementMetrics")
            .field("exchanges", &self.exchanges.get())
            .field("commission_payouts", &self.commission_payouts.get())
            .field("archived_deposits", &self.archived_deposits.get())
            .finish()
    }
}

impl SettlementMetrics {
    /// Create collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let deposits = IntCounterVec::new(
            Opts::new("wallet_deposits_total", "Deposit decisions"),
            &["outcome"],
        )?;
        registry.register(Box::new(deposits.clone()))?;

        let withdrawals = IntCounterVec::new(
            Opts::new("wallet_withdrawals_total", "Withdrawal lifecycle events"),
            &["outcome"],
        )?;
        registry.register(Box::new(withdrawals.clone()))?;

        let exchanges = IntCounter::new("wallet_exchanges_total", "Completed exchanges")?;
        registry.register(Box::new(exchanges.clone()))?;

        let commission_payouts = IntCounter::new(
            "wallet_commission_payouts_total",
            "Commission entries written",
        )?;
        registry.register(Box::new(commission_payouts.clone()))?;

        let archived_deposits = IntCounter::new(
            "wallet_archived_deposits_total",
            "Deposit requests archived",
        )?;
        registry.register(Box::new(archived_deposits.clone()))?;

        Ok(Self {
            deposits,
            withdrawals,
            exchanges,
            commission_payouts,
            archived_deposits,
            registry,
        })
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
