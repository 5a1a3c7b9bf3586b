//! Commission distributor
//!
//! One table maps up-line level to payout percentage. Each ancestor is
//! credited under its own account lock, one at a time; a failure partway
//! leaves the earlier levels committed and is recovered by re-running the
//! same event, since every level carries its own idempotency key.

use crate::{
    metrics::SettlementMetrics,
    types::{percent_of, validate_amount, CommissionEvent},
    Result,
};
use ledger_core::{round_credit, EntryKind, Ledger, LedgerEntry, Pool, MAX_UPLINE_DEPTH};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Payout percentage per up-line level, level 1 first
pub const COMMISSION_SCHEDULE: [u32; MAX_UPLINE_DEPTH] = [10, 5, 3, 2];

/// Percentage paid at `level` (1-based)
pub fn level_percent(level: usize) -> Option<Decimal> {
    level
        .checked_sub(1)
        .and_then(|idx| COMMISSION_SCHEDULE.get(idx))
        .map(|percent| Decimal::from(*percent))
}

/// Amount paid at `level` for `base_amount`, rounded toward zero.
///
/// `None` past the last level; an out-of-range base is an error.
pub fn level_payout(base_amount: Decimal, level: usize) -> Result<Option<Decimal>> {
    level_percent(level)
        .map(|percent| percent_of(base_amount, percent, "commission").map(round_credit))
        .transpose()
}

/// Fans commission out over an account's up-line
#[derive(Debug)]
pub struct CommissionDistributor {
    ledger: Arc<Ledger>,
    metrics: SettlementMetrics,
}

impl CommissionDistributor {
    /// Create over a shared ledger
    pub fn new(ledger: Arc<Ledger>, metrics: SettlementMetrics) -> Self {
        Self { ledger, metrics }
    }

    /// Credit each ancestor's referral coins for `event`.
    ///
    /// Returns one entry per paying level, original entries included on a
    /// re-run. Levels whose payout rounds to zero are skipped.
    pub async fn distribute(&self, event: &CommissionEvent) -> Result<Vec<LedgerEntry>> {
        validate_amount(event.base_amount, "commission base")?;
        // The up-line is immutable after registration, no lock needed to read it
        let source = self.ledger.get_account(&event.source)?;

        // Every level is priced before any ancestor is credited
        let payouts = (1..=MAX_UPLINE_DEPTH)
            .map(|level| level_payout(event.base_amount, level))
            .collect::<Result<Vec<_>>>()?;

        let mut entries = Vec::with_capacity(MAX_UPLINE_DEPTH);
        for (idx, (ancestor, payout)) in source.upline.iter().zip(payouts).enumerate() {
            let level = idx + 1;
            if *ancestor == event.source {
                tracing::error!(
                    source = %event.source,
                    level,
                    "Up-line contains the source account, skipping"
                );
                continue;
            }
            let Some(amount) = payout else {
                break;
            };
            if amount.is_zero() {
                continue;
            }

            let reference = event.reference(level);
            let mut scope = self.ledger.scope(ancestor).await?;
            let applied = scope.apply(Pool::ReferralCoins, amount, EntryKind::Commission, &reference)?;
            scope.commit()?;

            if applied.is_replay() {
                tracing::debug!(reference = %reference, "Commission level already paid");
            } else {
                self.metrics.commission_payouts.inc();
            }
            entries.push(applied.into_entry());
        }

        tracing::info!(
            source = %event.source,
            kind = %event.kind,
            event = %event.event_ref,
            base_amount = %event.base_amount,
            levels = entries.len(),
            "Commission distributed"
        );
        Ok(entries)
    }
}
