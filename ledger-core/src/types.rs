//! Core types for the wallet ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money, 2 decimal places)
//! - Append-only history (entries are never modified)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of decimal places carried by every balance
pub const MONEY_SCALE: u32 = 2;

/// Maximum depth of an up-line chain
pub const MAX_UPLINE_DEPTH: usize = 4;

/// Account identifier, supplied by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the three independent balance buckets of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pool {
    /// Withdrawable balance
    Spendable = 1,
    /// Earnings credited by the task subsystem
    TaskEarnings = 2,
    /// Referral coins credited by commission fan-out
    ReferralCoins = 3,
}

impl Pool {
    /// All pools, in storage order
    pub const ALL: [Pool; 3] = [Pool::Spendable, Pool::TaskEarnings, Pool::ReferralCoins];

    /// Stable lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            Pool::Spendable => "spendable",
            Pool::TaskEarnings => "task-earnings",
            Pool::ReferralCoins => "referral-coins",
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Balance snapshot across the three pools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// Withdrawable balance
    pub spendable: Decimal,
    /// Task earnings pool
    pub task_earnings: Decimal,
    /// Referral coin pool
    pub referral_coins: Decimal,
}

impl Balances {
    /// Balance of a single pool
    pub fn get(&self, pool: Pool) -> Decimal {
        match pool {
            Pool::Spendable => self.spendable,
            Pool::TaskEarnings => self.task_earnings,
            Pool::ReferralCoins => self.referral_coins,
        }
    }

    fn slot(&mut self, pool: Pool) -> &mut Decimal {
        match pool {
            Pool::Spendable => &mut self.spendable,
            Pool::TaskEarnings => &mut self.task_earnings,
            Pool::ReferralCoins => &mut self.referral_coins,
        }
    }

    /// Add `delta` to `pool` without the non-negative check
    pub fn accumulate(&mut self, pool: Pool, delta: Decimal) {
        *self.slot(pool) += delta;
    }

    /// Add `delta` to `pool`, returning the new balance.
    ///
    /// Returns `None` (and leaves the balances untouched) when the result
    /// would be negative.
    pub fn checked_apply(&mut self, pool: Pool, delta: Decimal) -> Option<Decimal> {
        let next = self.get(pool).checked_add(delta)?;
        if next < Decimal::ZERO {
            return None;
        }
        *self.slot(pool) = next;
        Some(next)
    }
}

/// Per-account balance record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Account ID
    pub account_id: AccountId,

    /// Unique code other accounts register with
    pub referral_code: String,

    /// Ancestors from immediate referrer (level 1) outward, at most 4
    pub upline: Vec<AccountId>,

    /// Current balances
    pub balances: Balances,

    /// Sum of all deposit credits ever applied
    pub lifetime_deposits: Decimal,

    /// Number of ledger entries written for this account
    pub entry_count: u64,

    /// Hash of the latest ledger entry (zero before the first entry)
    pub head_hash: [u8; 32],

    /// Deactivated accounts keep their history but stop transacting
    pub active: bool,

    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Ancestor at `level` (1-based), if the chain is that deep
    pub fn ancestor(&self, level: usize) -> Option<&AccountId> {
        level.checked_sub(1).and_then(|idx| self.upline.get(idx))
    }
}

/// What produced a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryKind {
    /// Approved top-up
    Deposit = 1,
    /// Funds held for a payout request
    Withdrawal = 2,
    /// Compensating credit for a rejected payout request
    WithdrawalReversal = 3,
    /// Referral coins leaving in an exchange
    ExchangeDebit = 4,
    /// Spendable credit from an exchange
    ExchangeCredit = 5,
    /// Referral commission
    Commission = 6,
    /// Task subsystem reward
    TaskReward = 7,
}

impl EntryKind {
    /// Stable lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::Withdrawal => "withdrawal",
            EntryKind::WithdrawalReversal => "withdrawal-reversal",
            EntryKind::ExchangeDebit => "exchange-debit",
            EntryKind::ExchangeCredit => "exchange-credit",
            EntryKind::Commission => "commission",
            EntryKind::TaskReward => "task-reward",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable record of a single balance mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub entry_id: Uuid,

    /// Account whose pool changed
    pub account_id: AccountId,

    /// Per-account sequence number, starting at 1
    pub sequence: u64,

    /// Pool affected
    pub pool: Pool,

    /// Signed change
    pub delta: Decimal,

    /// Pool balance right after this entry
    pub balance_after: Decimal,

    /// Entry kind
    pub kind: EntryKind,

    /// Originating request; unique together with `kind`
    pub reference: String,

    /// When the entry was recorded
    pub recorded_at: DateTime<Utc>,

    /// Hash of the previous entry of this account
    pub prev_hash: [u8; 32],

    /// Hash of this entry, chained over `prev_hash`
    pub hash: [u8; 32],
}

/// Outcome of applying an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A new entry was written
    Fresh(LedgerEntry),
    /// The `(reference, kind)` pair was already applied; this is the original entry
    Replayed(LedgerEntry),
}

impl Applied {
    /// The entry, whether new or original
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            Applied::Fresh(entry) | Applied::Replayed(entry) => entry,
        }
    }

    /// Consume into the entry
    pub fn into_entry(self) -> LedgerEntry {
        match self {
            Applied::Fresh(entry) | Applied::Replayed(entry) => entry,
        }
    }

    /// True if the entry already existed
    pub fn is_replay(&self) -> bool {
        matches!(self, Applied::Replayed(_))
    }
}

/// Result of recomputing an account from its ledger entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Account checked
    pub account_id: AccountId,
    /// Balances stored on the account record
    pub recorded: Balances,
    /// Balances recomputed as the sum of entry deltas
    pub derived: Balances,
    /// Entries examined
    pub entry_count: u64,
    /// Every entry hash links to its predecessor and recomputes
    pub chain_intact: bool,
}

impl ReconciliationReport {
    /// Recorded balances match the entry sums and the chain is intact
    pub fn is_consistent(&self) -> bool {
        self.recorded == self.derived && self.chain_intact
    }
}

/// Round a credit toward zero at money scale
pub fn round_credit(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, rust_decimal::RoundingStrategy::ToZero)
}

/// Round a charge half away from zero at money scale
pub fn round_charge(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(
        MONEY_SCALE,
        rust_decimal::RoundingStrategy::MidpointAwayFromZero,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_apply_rejects_negative() {
        let mut balances = Balances::default();
        assert_eq!(
            balances.checked_apply(Pool::Spendable, Decimal::new(1000, 2)),
            Some(Decimal::new(1000, 2))
        );
        assert_eq!(balances.checked_apply(Pool::Spendable, Decimal::new(-1001, 2)), None);
        assert_eq!(balances.spendable, Decimal::new(1000, 2));
        assert_eq!(
            balances.checked_apply(Pool::Spendable, Decimal::new(-1000, 2)),
            Some(Decimal::ZERO)
        );
    }

    #[test]
    fn test_pools_are_independent() {
        let mut balances = Balances::default();
        balances.checked_apply(Pool::ReferralCoins, Decimal::from(5));
        assert_eq!(balances.get(Pool::ReferralCoins), Decimal::from(5));
        assert_eq!(balances.get(Pool::Spendable), Decimal::ZERO);
        assert_eq!(balances.get(Pool::TaskEarnings), Decimal::ZERO);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_credit(Decimal::new(299, 4)), Decimal::new(2, 2));
        assert_eq!(round_charge(Decimal::new(25, 3)), Decimal::new(3, 2));
        assert_eq!(round_credit(Decimal::new(19000, 2)), Decimal::from(190));
    }

    #[test]
    fn test_ancestor_levels() {
        let account = Account {
            account_id: AccountId::new("a"),
            referral_code: "A".to_string(),
            upline: vec![AccountId::new("p1"), AccountId::new("p2")],
            balances: Balances::default(),
            lifetime_deposits: Decimal::ZERO,
            entry_count: 0,
            head_hash: [0u8; 32],
            active: true,
            created_at: Utc::now(),
        };
        assert_eq!(account.ancestor(0), None);
        assert_eq!(account.ancestor(1), Some(&AccountId::new("p1")));
        assert_eq!(account.ancestor(2), Some(&AccountId::new("p2")));
        assert_eq!(account.ancestor(3), None);
    }
}
