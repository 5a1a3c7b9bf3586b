//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Reconciliation: balance(pool) == Σ(deltas) for every pool
//! - No negative balance under any sequence of credits and debits
//! - Idempotency: replaying references never changes balances
//! - Serialization: concurrent debits of one account never overdraw it

use ledger_core::{
    AccountId, Config, EntryKind, Error, Ledger, Pool, Registration,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use tempfile::TempDir;

/// Strategy for generating signed amounts in cents
fn delta_strategy() -> impl Strategy<Value = Decimal> {
    (-50_000i64..100_000i64)
        .prop_filter("non-zero", |cents| *cents != 0)
        .prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for generating pools
fn pool_strategy() -> impl Strategy<Value = Pool> {
    prop_oneof![
        Just(Pool::Spendable),
        Just(Pool::TaskEarnings),
        Just(Pool::ReferralCoins),
    ]
}

fn kind_for(pool: Pool, delta: Decimal) -> EntryKind {
    match (pool, delta.is_sign_positive()) {
        (Pool::Spendable, true) => EntryKind::Deposit,
        (Pool::Spendable, false) => EntryKind::Withdrawal,
        (Pool::TaskEarnings, _) => EntryKind::TaskReward,
        (Pool::ReferralCoins, true) => EntryKind::Commission,
        (Pool::ReferralCoins, false) => EntryKind::ExchangeDebit,
    }
}

/// Create test ledger with temp directory
async fn create_test_ledger() -> (Ledger, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    config.rocksdb.sync_writes = false;

    let ledger = Ledger::open(config).unwrap();
    ledger
        .register_account(Registration::new(AccountId::new("acct"), "ACCT", None))
        .await
        .unwrap();
    (ledger, temp_dir)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: recorded balances always equal the sum of entry deltas
    #[test]
    fn prop_balances_reconcile(ops in prop::collection::vec((pool_strategy(), delta_strategy()), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger().await;
            let account = AccountId::new("acct");

            for (i, (pool, delta)) in ops.iter().enumerate() {
                let result = ledger
                    .apply_entry(&account, *pool, *delta, kind_for(*pool, *delta), &format!("op-{}", i))
                    .await;
                match result {
                    Ok(_) | Err(Error::InsufficientFunds { .. }) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                }

                let balances = ledger.get_balances(&account).unwrap();
                prop_assert!(balances.spendable >= Decimal::ZERO);
                prop_assert!(balances.task_earnings >= Decimal::ZERO);
                prop_assert!(balances.referral_coins >= Decimal::ZERO);
            }

            let report = ledger.reconcile(&account).await.unwrap();
            prop_assert!(report.is_consistent());
            Ok(())
        })?;
    }

    /// Property: replaying every reference leaves balances untouched
    #[test]
    fn prop_replay_is_noop(deltas in prop::collection::vec(1i64..10_000i64, 1..20)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger().await;
            let account = AccountId::new("acct");

            for (i, cents) in deltas.iter().enumerate() {
                ledger
                    .apply_entry(&account, Pool::Spendable, Decimal::new(*cents, 2), EntryKind::Deposit, &format!("dep-{}", i))
                    .await
                    .unwrap();
            }
            let before = ledger.get_balances(&account).unwrap();

            for (i, cents) in deltas.iter().enumerate() {
                let replay = ledger
                    .apply_entry(&account, Pool::Spendable, Decimal::new(*cents, 2), EntryKind::Deposit, &format!("dep-{}", i))
                    .await
                    .unwrap();
                prop_assert_eq!(replay.sequence, (i + 1) as u64);
            }

            let after = ledger.get_balances(&account).unwrap();
            prop_assert_eq!(before, after);
            prop_assert_eq!(ledger.history(&account, None, 100).unwrap().len(), deltas.len());
            Ok(())
        })?;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_never_overdraw() {
    let (ledger, _temp) = create_test_ledger().await;
    let ledger = Arc::new(ledger);
    let account = AccountId::new("acct");

    ledger
        .apply_entry(&account, Pool::Spendable, Decimal::from(100), EntryKind::Deposit, "seed")
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..50 {
        let ledger = ledger.clone();
        let account = account.clone();
        tasks.push(tokio::spawn(async move {
            ledger
                .apply_entry(&account, Pool::Spendable, Decimal::from(-7), EntryKind::Withdrawal, &format!("w-{}", i))
                .await
        }));
    }

    let mut succeeded = 0i64;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(Error::InsufficientFunds { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    // 100 / 7 = 14 debits fit
    assert_eq!(succeeded, 14);
    let balances = ledger.get_balances(&account).unwrap();
    assert_eq!(balances.spendable, Decimal::from(100 - 7 * succeeded));
    assert!(ledger.reconcile(&account).await.unwrap().is_consistent());
}
