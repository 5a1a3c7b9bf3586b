//! End-to-end wallet scenarios
//!
//! Drives the engine through the operator, task-subsystem and query
//! surfaces:
//! - Deposit approval retried, including concurrent double clicks
//! - Eligibility cap, product rules lifted by invite recharge
//! - Exchange at a frozen rate
//! - Commission fan-out over full and short up-lines
//! - Dependency timeouts, archival, reconciliation

use async_trait::async_trait;
use eligibility_engine::{AllowBasis, ProductId, Verdict};
use ledger_core::{AccountId, EntryKind, Pool};
use rust_decimal::Decimal;
use settlement::{
    CommissionKind, Config, ConfigStore, Error, PayoutDestination, PolicySettings, RequestStatus,
    StaticConfigStore, WalletEngine,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(30);

struct TestEnvironment {
    engine: Arc<WalletEngine>,
    store: Arc<StaticConfigStore>,
    _temp: TempDir,
}

impl TestEnvironment {
    async fn new() -> Self {
        Self::with_policy(PolicySettings::default()).await
    }

    async fn with_policy(policy: PolicySettings) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(StaticConfigStore::new(policy));
        let engine = WalletEngine::open(test_config(&temp), store.clone())
            .await
            .unwrap();
        Self {
            engine: Arc::new(engine),
            store,
            _temp: temp,
        }
    }

    async fn register(&self, name: &str, inviter: Option<&str>) -> AccountId {
        let account_id = AccountId::new(name);
        self.engine
            .register_account(account_id.clone(), name, inviter)
            .await
            .unwrap();
        account_id
    }

    async fn fund(&self, account_id: &AccountId, amount: i64) {
        let proof = format!("proof-{}-{}", account_id, uuid::Uuid::now_v7());
        let request = self
            .engine
            .submit_deposit(account_id, Decimal::from(amount), &proof)
            .await
            .unwrap();
        self.engine.approve_deposit(request.request_id).await.unwrap();
    }
}

fn test_config(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.ledger.data_dir = temp.path().to_path_buf();
    config.ledger.rocksdb.sync_writes = false;
    config.janitor.archive_delay_secs = 0;
    config.janitor.sweep_interval_secs = 3_600;
    config.dependencies.config_read_timeout_ms = 200;
    config
}

fn policy(cap_percent: i64, fee_percent: i64, products: &[(&str, i64)]) -> PolicySettings {
    let mut policy = PolicySettings::default();
    policy.withdrawal_rules.global_cap_percent = Decimal::from(cap_percent);
    policy.withdrawal_fee_percent = Decimal::from(fee_percent);
    policy.withdrawal_rules.product_rules = products
        .iter()
        .map(|(id, threshold)| (ProductId::new(*id), Decimal::from(*threshold)))
        .collect();
    policy
}

fn bank() -> PayoutDestination {
    PayoutDestination::new("bank", "Account Holder", "9988776655")
}

#[tokio::test]
async fn test_deposit_approved_twice_credits_once() {
    let env = TestEnvironment::new().await;
    let alice = env.register("alice", None).await;

    let request = env
        .engine
        .submit_deposit(&alice, Decimal::from(1_000), "BANK-0001")
        .await
        .unwrap();

    let first = env.engine.approve_deposit(request.request_id).await.unwrap();
    let second = env.engine.approve_deposit(request.request_id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(env.engine.balances(&alice).unwrap().spendable, Decimal::from(1_000));
    assert_eq!(env.engine.history(&alice, None, 10).unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_credit_once() {
    let env = TestEnvironment::new().await;
    let alice = env.register("alice", None).await;
    let request = env
        .engine
        .submit_deposit(&alice, Decimal::from(1_000), "BANK-0002")
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let engine = env.engine.clone();
        let id = request.request_id;
        tasks.push(tokio::spawn(async move { engine.approve_deposit(id).await }));
    }

    let mut entries = Vec::new();
    for task in tasks {
        entries.push(timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap());
    }

    assert!(entries.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(env.engine.balances(&alice).unwrap().spendable, Decimal::from(1_000));
}

#[tokio::test]
async fn test_global_cap_allows_and_denies() {
    let env = TestEnvironment::with_policy(policy(50, 0, &[])).await;
    let alice = env.register("alice", None).await;
    env.fund(&alice, 10_000).await;

    let verdict = env
        .engine
        .check_withdrawal_eligibility(&alice, Decimal::from(4_000))
        .await
        .unwrap();
    assert_eq!(
        verdict,
        Verdict::Allow(AllowBasis::WithinGlobalCap {
            cap: Decimal::from(5_000)
        })
    );

    let err = env
        .engine
        .request_withdrawal(&alice, Decimal::from(6_000), bank())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotEligible(_)));
    assert_eq!(env.engine.balances(&alice).unwrap().spendable, Decimal::from(10_000));

    env.engine
        .request_withdrawal(&alice, Decimal::from(4_000), bank())
        .await
        .unwrap();
    assert_eq!(env.engine.balances(&alice).unwrap().spendable, Decimal::from(6_000));
}

#[tokio::test]
async fn test_invite_recharge_unlocks_product_rule() {
    let env = TestEnvironment::with_policy(policy(50, 0, &[("gold", 1_000)])).await;
    let alice = env.register("alice", None).await;
    let bob = env.register("bob", Some("alice")).await;
    env.fund(&alice, 2_000).await;
    env.engine
        .grant_product(&alice, &ProductId::new("gold"))
        .await
        .unwrap();

    // Cap is 1,000; gold needs 1,000 of invitee recharge
    assert!(matches!(
        env.engine
            .request_withdrawal(&alice, Decimal::from(1_500), bank())
            .await,
        Err(Error::NotEligible(_))
    ));

    env.fund(&bob, 600).await;
    env.fund(&bob, 400).await;
    assert_eq!(
        env.engine.account_standing(&alice).unwrap().invite_recharge,
        Decimal::from(1_000)
    );

    let request = env
        .engine
        .request_withdrawal(&alice, Decimal::from(1_500), bank())
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
}

#[tokio::test]
async fn test_most_permissive_product_rule_wins() {
    let env =
        TestEnvironment::with_policy(policy(10, 0, &[("platinum", 50_000), ("bronze", 100)])).await;
    let alice = env.register("alice", None).await;
    let bob = env.register("bob", Some("alice")).await;
    env.fund(&alice, 1_000).await;
    env.fund(&bob, 100).await;
    for product in ["platinum", "bronze"] {
        env.engine
            .grant_product(&alice, &ProductId::new(product))
            .await
            .unwrap();
    }

    let verdict = env
        .engine
        .check_withdrawal_eligibility(&alice, Decimal::from(900))
        .await
        .unwrap();
    assert_eq!(
        verdict,
        Verdict::Allow(AllowBasis::ProductRule {
            product: ProductId::new("bronze"),
            threshold: Decimal::from(100),
        })
    );
}

#[tokio::test]
async fn test_restricted_account_is_denied_with_reason() {
    let env = TestEnvironment::with_policy(policy(100, 0, &[])).await;
    let alice = env.register("alice", None).await;
    env.fund(&alice, 500).await;
    env.engine
        .restrict_account(&alice, "chargeback investigation")
        .await
        .unwrap();

    match env
        .engine
        .request_withdrawal(&alice, Decimal::from(10), bank())
        .await
    {
        Err(Error::NotEligible(reason)) => {
            assert_eq!(reason, "Account restricted: chargeback investigation")
        }
        other => panic!("expected denial, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_withdrawal_returns_funds_and_keeps_fee() {
    let env = TestEnvironment::with_policy(policy(100, 5, &[])).await;
    let alice = env.register("alice", None).await;
    env.fund(&alice, 1_000).await;

    let request = env
        .engine
        .request_withdrawal(&alice, Decimal::from(400), bank())
        .await
        .unwrap();
    assert_eq!(request.fee, Decimal::from(20));
    assert_eq!(request.net_payout, Decimal::from(380));

    // A later policy change does not touch the frozen fee
    env.store.update(|p| p.withdrawal_fee_percent = Decimal::from(50));

    let rejected = env
        .engine
        .reject_withdrawal(request.request_id, "name mismatch")
        .await
        .unwrap();
    assert_eq!(rejected.fee, Decimal::from(20));
    assert_eq!(rejected.net_payout, Decimal::from(380));
    assert_eq!(env.engine.balances(&alice).unwrap().spendable, Decimal::from(1_000));

    let err = env
        .engine
        .approve_withdrawal(request.request_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
    assert!(env.engine.pending_withdrawals().unwrap().is_empty());
}

#[tokio::test]
async fn test_exchange_at_frozen_rate() {
    let mut settings = PolicySettings::default();
    settings.exchange_rate = Decimal::new(95, 2);
    let env = TestEnvironment::with_policy(settings).await;
    let alice = env.register("alice", None).await;
    let bob = env.register("bob", Some("alice")).await;

    env.engine
        .distribute_commission(&bob, Decimal::from(3_000), CommissionKind::Task, "t-1")
        .await
        .unwrap();
    assert_eq!(
        env.engine.balances(&alice).unwrap().referral_coins,
        Decimal::from(300)
    );

    let tx = env.engine.exchange(&alice, Decimal::from(200)).await.unwrap();
    env.store.update(|p| p.exchange_rate = Decimal::ONE);

    let balances = env.engine.balances(&alice).unwrap();
    assert_eq!(balances.spendable, Decimal::new(19000, 2));
    assert_eq!(balances.referral_coins, Decimal::from(100));
    assert_eq!(
        env.engine.exchange_transaction(tx.exchange_id).unwrap().rate,
        Decimal::new(95, 2)
    );

    let history = env.engine.history(&alice, None, 10).unwrap();
    let kinds: Vec<EntryKind> = history.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EntryKind::Commission,
            EntryKind::ExchangeDebit,
            EntryKind::ExchangeCredit
        ]
    );
}

#[tokio::test]
async fn test_commission_over_four_levels() {
    let env = TestEnvironment::new().await;
    let l4 = env.register("l4", None).await;
    let l3 = env.register("l3", Some("l4")).await;
    let l2 = env.register("l2", Some("l3")).await;
    let l1 = env.register("l1", Some("l2")).await;
    let source = env.register("source", Some("l1")).await;

    let entries = env
        .engine
        .distribute_commission(&source, Decimal::from(1_000), CommissionKind::Recharge, "dep-9")
        .await
        .unwrap();

    let credited: Vec<(AccountId, Decimal)> = entries
        .iter()
        .map(|e| (e.account_id.clone(), e.delta))
        .collect();
    assert_eq!(
        credited,
        vec![
            (l1.clone(), Decimal::from(100)),
            (l2.clone(), Decimal::from(50)),
            (l3.clone(), Decimal::from(30)),
            (l4.clone(), Decimal::from(20)),
        ]
    );
    assert!(entries.iter().all(|e| e.pool == Pool::ReferralCoins));
    assert_eq!(env.engine.balances(&source).unwrap().referral_coins, Decimal::ZERO);
    assert_eq!(env.engine.balances(&l1).unwrap().spendable, Decimal::ZERO);
}

#[tokio::test]
async fn test_commission_stops_at_last_real_ancestor() {
    let env = TestEnvironment::new().await;
    env.register("root", None).await;
    env.register("mid", Some("root")).await;
    let source = env.register("source", Some("mid")).await;

    let entries = env
        .engine
        .distribute_commission(&source, Decimal::from(1_000), CommissionKind::Task, "t-1")
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn test_commission_reaches_four_hops_only() {
    let env = TestEnvironment::new().await;
    let mut inviter: Option<String> = None;
    let mut accounts = Vec::new();
    for i in 0..7 {
        let name = format!("n{}", i);
        accounts.push(env.register(&name, inviter.as_deref()).await);
        inviter = Some(name);
    }
    let source = accounts.last().unwrap().clone();

    let entries = env
        .engine
        .distribute_commission(&source, Decimal::from(100), CommissionKind::Task, "t-1")
        .await
        .unwrap();

    assert_eq!(entries.len(), 4);
    for far in &accounts[..2] {
        assert_eq!(env.engine.balances(far).unwrap().referral_coins, Decimal::ZERO);
    }
}

#[tokio::test]
async fn test_deactivated_account_keeps_earning_but_cannot_spend() {
    let env = TestEnvironment::new().await;
    let alice = env.register("alice", None).await;
    let bob = env.register("bob", Some("alice")).await;
    env.engine.deactivate_account(&alice).await.unwrap();

    env.engine
        .distribute_commission(&bob, Decimal::from(100), CommissionKind::Task, "t-1")
        .await
        .unwrap();
    assert_eq!(env.engine.balances(&alice).unwrap().referral_coins, Decimal::from(10));

    assert!(matches!(
        env.engine.exchange(&alice, Decimal::from(10)).await,
        Err(Error::Ledger(ledger_core::Error::AccountInactive(_)))
    ));
}

struct StalledStore;

#[async_trait]
impl ConfigStore for StalledStore {
    async fn snapshot(&self) -> settlement::Result<PolicySettings> {
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        Ok(PolicySettings::default())
    }
}

#[tokio::test]
async fn test_config_timeout_is_retryable_and_writes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let engine = WalletEngine::open(test_config(&temp), Arc::new(StalledStore))
        .await
        .unwrap();
    let alice = AccountId::new("alice");
    engine.register_account(alice.clone(), "alice", None).await.unwrap();
    engine
        .record_task_reward(&alice, Decimal::from(5), "task-1")
        .await
        .unwrap();

    let err = timeout(TEST_TIMEOUT, engine.exchange(&alice, Decimal::from(1)))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, Error::DependencyUnavailable(_)));
    assert!(err.is_retryable());

    let err = timeout(
        TEST_TIMEOUT,
        engine.request_withdrawal(&alice, Decimal::from(1), bank()),
    )
    .await
    .unwrap()
    .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(engine.history(&alice, None, 10).unwrap().len(), 1);

    // The account lock was never taken
    engine
        .record_task_reward(&alice, Decimal::from(5), "task-2")
        .await
        .unwrap();
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_archival_keeps_history_queryable() {
    let env = TestEnvironment::new().await;
    let alice = env.register("alice", None).await;

    let approved = env
        .engine
        .submit_deposit(&alice, Decimal::from(250), "BANK-A")
        .await
        .unwrap();
    let waiting = env
        .engine
        .submit_deposit(&alice, Decimal::from(75), "BANK-B")
        .await
        .unwrap();
    let entry = env.engine.approve_deposit(approved.request_id).await.unwrap();

    env.engine.sweep_archive().await.unwrap();

    let archived = env.engine.deposit_request(approved.request_id).unwrap();
    assert!(archived.archived_at.is_some());
    assert_eq!(archived.status, RequestStatus::Approved);

    let pending: Vec<_> = env
        .engine
        .pending_deposits()
        .unwrap()
        .into_iter()
        .map(|r| r.request_id)
        .collect();
    assert_eq!(pending, vec![waiting.request_id]);

    // Archival never credits; a retry after archival still finds the entry
    let again = env.engine.approve_deposit(approved.request_id).await.unwrap();
    assert_eq!(again, entry);
    assert_eq!(env.engine.balances(&alice).unwrap().spendable, Decimal::from(250));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_activity_reconciles() {
    let env = TestEnvironment::with_policy(policy(100, 3, &[])).await;
    let alice = env.register("alice", None).await;
    let bob = env.register("bob", Some("alice")).await;
    env.fund(&alice, 500).await;
    env.fund(&bob, 500).await;

    let mut tasks = Vec::new();
    for i in 0..20 {
        let engine = env.engine.clone();
        let alice = alice.clone();
        let bob = bob.clone();
        tasks.push(tokio::spawn(async move {
            let _ = engine
                .request_withdrawal(&alice, Decimal::from(45), bank())
                .await;
            let _ = engine
                .distribute_commission(&bob, Decimal::from(100), CommissionKind::Task, &format!("t-{}", i))
                .await;
            let _ = engine.exchange(&alice, Decimal::from(7)).await;
        }));
    }
    for task in tasks {
        timeout(TEST_TIMEOUT, task).await.unwrap().unwrap();
    }

    for pending in env.engine.pending_withdrawals().unwrap().into_iter().step_by(2) {
        env.engine
            .reject_withdrawal(pending.request_id, "batch review")
            .await
            .unwrap();
    }

    for account in [&alice, &bob] {
        let balances = env.engine.balances(account).unwrap();
        assert!(balances.spendable >= Decimal::ZERO);
        assert!(balances.referral_coins >= Decimal::ZERO);
        let report = env.engine.reconcile(account).await.unwrap();
        assert!(report.is_consistent(), "{:?}", report);
    }
}
