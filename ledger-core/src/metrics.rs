//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `wallet_ledger_entries_total` - Ledger entries written
//! - `wallet_ledger_replays_total` - Idempotent replays of already-applied references
//! - `wallet_ledger_insufficient_funds_total` - Debits refused for insufficient funds
//! - `wallet_ledger_commit_duration_seconds` - Histogram of commit latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Ledger entries written
    pub entries_total: IntCounter,

    /// Idempotent replays
    pub replays_total: IntCounter,

    /// Refused debits
    pub insufficient_funds_total: IntCounter,

    /// Commit duration histogram
    pub commit_duration: Histogram,

    registry: Registry,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("entries_total", &self.entries_total.get())
            .field("replays_total", &self.replays_total.get())
            .field("insufficient_funds_total", &self.insufficient_funds_total.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let entries_total =
            IntCounter::new("wallet_ledger_entries_total", "Ledger entries written")?;
        registry.register(Box::new(entries_total.clone()))?;

        let replays_total = IntCounter::new(
            "wallet_ledger_replays_total",
            "Idempotent replays of already-applied references",
        )?;
        registry.register(Box::new(replays_total.clone()))?;

        let insufficient_funds_total = IntCounter::new(
            "wallet_ledger_insufficient_funds_total",
            "Debits refused for insufficient funds",
        )?;
        registry.register(Box::new(insufficient_funds_total.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "wallet_ledger_commit_duration_seconds",
                "Histogram of commit latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        Ok(Self {
            entries_total,
            replays_total,
            insufficient_funds_total,
            commit_duration,
            registry,
        })
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
