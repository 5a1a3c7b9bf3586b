//! Wallet engine
//!
//! Single entry point for the operator surface, the task subsystem and the
//! read-only query surface. Each operation delegates to the component that
//! owns it; all of them share one ledger and one policy reader.

use crate::{
    commission::CommissionDistributor,
    config::Config,
    deposit::DepositSettlement,
    exchange::ExchangeEngine,
    janitor::{spawn_janitor, JanitorHandle},
    metrics::SettlementMetrics,
    policy::{ConfigStore, PolicyReader},
    records::{stage_holding, AccountFacts, Restriction, NS_HOLDING, NS_RESTRICTION},
    types::*,
    withdrawal::WithdrawalSettlement,
    Error, Result,
};
use chrono::Utc;
use eligibility_engine::{AccountStanding, ProductId, Verdict};
use ledger_core::{
    Account, AccountId, Balances, EntryKind, Ledger, LedgerEntry, Pool, ReconciliationReport,
    Registration,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Wallet ledger and settlement engine
#[derive(Debug)]
pub struct WalletEngine {
    ledger: Arc<Ledger>,
    deposits: DepositSettlement,
    withdrawals: WithdrawalSettlement,
    exchange: ExchangeEngine,
    commissions: CommissionDistributor,
    janitor: JanitorHandle,
    janitor_task: Mutex<Option<JoinHandle<()>>>,
    metrics: SettlementMetrics,
    config: Config,
}

impl WalletEngine {
    /// Open the ledger and start the archival janitor
    pub async fn open(config: Config, store: Arc<dyn ConfigStore>) -> Result<Self> {
        let ledger = Arc::new(Ledger::open(config.ledger.clone())?);
        let metrics = SettlementMetrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;
        let policy = PolicyReader::new(
            store,
            Duration::from_millis(config.dependencies.config_read_timeout_ms),
        );

        let (janitor, janitor_task) =
            spawn_janitor(ledger.clone(), config.janitor.clone(), metrics.clone());

        tracing::info!(
            data_dir = %config.ledger.data_dir.display(),
            archive_delay_secs = config.janitor.archive_delay_secs,
            "Wallet engine opened"
        );

        Ok(Self {
            deposits: DepositSettlement::new(ledger.clone(), metrics.clone()),
            withdrawals: WithdrawalSettlement::new(ledger.clone(), policy.clone(), metrics.clone()),
            exchange: ExchangeEngine::new(ledger.clone(), policy, metrics.clone()),
            commissions: CommissionDistributor::new(ledger.clone(), metrics.clone()),
            ledger,
            janitor,
            janitor_task: Mutex::new(Some(janitor_task)),
            metrics,
            config,
        })
    }

    /// Underlying ledger
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Settlement metrics
    pub fn metrics(&self) -> &SettlementMetrics {
        &self.metrics
    }

    /// Configuration the engine was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    // Accounts

    /// Register an account, optionally under an inviter's referral code
    pub async fn register_account(
        &self,
        account_id: AccountId,
        referral_code: &str,
        inviter_code: Option<&str>,
    ) -> Result<Account> {
        Ok(self
            .ledger
            .register_account(Registration::new(
                account_id,
                referral_code,
                inviter_code.map(str::to_string),
            ))
            .await?)
    }

    /// Deactivate an account; it keeps its history and still earns commission
    pub async fn deactivate_account(&self, account_id: &AccountId) -> Result<Account> {
        Ok(self.ledger.deactivate_account(account_id).await?)
    }

    /// Record that an account holds `product`
    pub async fn grant_product(&self, account_id: &AccountId, product: &ProductId) -> Result<()> {
        let mut scope = self.ledger.scope(account_id).await?;
        stage_holding(&mut scope, product)?;
        scope.commit()?;

        tracing::info!(account = %account_id, product = %product, "Product granted");
        Ok(())
    }

    /// Remove a product holding
    pub async fn revoke_product(&self, account_id: &AccountId, product: &ProductId) -> Result<()> {
        let mut scope = self.ledger.scope(account_id).await?;
        scope.delete_record(NS_HOLDING, crate::records::holding_key(account_id, product));
        scope.commit()?;

        tracing::info!(account = %account_id, product = %product, "Product revoked");
        Ok(())
    }

    /// Block withdrawals with `reason` until lifted
    pub async fn restrict_account(&self, account_id: &AccountId, reason: &str) -> Result<()> {
        let mut scope = self.ledger.scope(account_id).await?;
        scope.put_record(
            NS_RESTRICTION,
            account_id.as_str(),
            &Restriction {
                reason: reason.to_string(),
                since: Utc::now(),
            },
        )?;
        scope.commit()?;

        tracing::warn!(account = %account_id, reason = %reason, "Account restricted");
        Ok(())
    }

    /// Clear an account restriction
    pub async fn lift_restriction(&self, account_id: &AccountId) -> Result<()> {
        let mut scope = self.ledger.scope(account_id).await?;
        scope.delete_record(NS_RESTRICTION, account_id.as_str());
        scope.commit()?;

        tracing::info!(account = %account_id, "Account restriction lifted");
        Ok(())
    }

    // Deposits

    /// Submit a deposit claim for review
    pub async fn submit_deposit(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        proof_token: &str,
    ) -> Result<DepositRequest> {
        self.deposits.submit(account_id, amount, proof_token).await
    }

    /// Approve a deposit; retries return the original entry.
    ///
    /// Archival is scheduled only after the credit is committed.
    pub async fn approve_deposit(&self, request_id: Uuid) -> Result<LedgerEntry> {
        let applied = self.deposits.approve(request_id).await?;
        self.janitor.schedule(request_id);
        Ok(applied.into_entry())
    }

    /// Reject a pending deposit
    pub async fn reject_deposit(&self, request_id: Uuid, reason: &str) -> Result<DepositRequest> {
        let request = self.deposits.reject(request_id, reason).await?;
        self.janitor.schedule(request_id);
        Ok(request)
    }

    // Withdrawals

    /// Evaluate withdrawal eligibility with the current policy
    pub async fn check_withdrawal_eligibility(
        &self,
        account_id: &AccountId,
        amount: Decimal,
    ) -> Result<Verdict> {
        self.withdrawals.check_eligibility(account_id, amount).await
    }

    /// Request a withdrawal, holding the funds
    pub async fn request_withdrawal(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        destination: PayoutDestination,
    ) -> Result<WithdrawalRequest> {
        self.withdrawals.request(account_id, amount, destination).await
    }

    /// Approve a pending withdrawal
    pub async fn approve_withdrawal(&self, request_id: Uuid) -> Result<WithdrawalRequest> {
        self.withdrawals.approve(request_id).await
    }

    /// Reject a pending withdrawal and return the funds
    pub async fn reject_withdrawal(
        &self,
        request_id: Uuid,
        reason: &str,
    ) -> Result<WithdrawalRequest> {
        self.withdrawals.reject(request_id, reason).await
    }

    // Exchange, commission, rewards

    /// Convert referral coins to spendable balance
    pub async fn exchange(
        &self,
        account_id: &AccountId,
        coin_amount: Decimal,
    ) -> Result<ExchangeTransaction> {
        self.exchange.exchange(account_id, coin_amount).await
    }

    /// Pay commission for a qualifying event up the source's up-line
    pub async fn distribute_commission(
        &self,
        source: &AccountId,
        base_amount: Decimal,
        kind: CommissionKind,
        event_ref: &str,
    ) -> Result<Vec<LedgerEntry>> {
        let event = CommissionEvent::new(source.clone(), base_amount, kind, event_ref);
        self.commissions.distribute(&event).await
    }

    /// Credit a task reward to the task-earnings pool, once per account and `task_ref`
    pub async fn record_task_reward(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        task_ref: &str,
    ) -> Result<LedgerEntry> {
        validate_amount(amount, "task reward")?;
        let mut scope = self.ledger.scope(account_id).await?;
        if !scope.account().active {
            return Err(ledger_core::Error::AccountInactive(account_id.clone()).into());
        }
        // Task ids are shared across accounts
        let reference = format!("{}:{}", account_id, task_ref);
        let applied = scope.apply(Pool::TaskEarnings, amount, EntryKind::TaskReward, &reference)?;
        scope.commit()?;

        if !applied.is_replay() {
            tracing::info!(
                account = %account_id,
                task = %task_ref,
                amount = %amount,
                "Task reward credited"
            );
        }
        Ok(applied.into_entry())
    }

    // Queries

    /// Current balances
    pub fn balances(&self, account_id: &AccountId) -> Result<Balances> {
        Ok(self.ledger.get_balances(account_id)?)
    }

    /// Account record
    pub fn account(&self, account_id: &AccountId) -> Result<Account> {
        Ok(self.ledger.get_account(account_id)?)
    }

    /// Page of ledger history, oldest first, after `after_sequence`
    pub fn history(
        &self,
        account_id: &AccountId,
        after_sequence: Option<u64>,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self.ledger.history(account_id, after_sequence, limit)?)
    }

    /// Facts the eligibility rules see for an account
    pub fn account_standing(&self, account_id: &AccountId) -> Result<AccountStanding> {
        let account = self.ledger.get_account(account_id)?;
        AccountFacts::new(&self.ledger).standing(&account)
    }

    /// Deposit request by id, archived or not
    pub fn deposit_request(&self, request_id: Uuid) -> Result<DepositRequest> {
        self.deposits.get(request_id)
    }

    /// Withdrawal request by id
    pub fn withdrawal_request(&self, request_id: Uuid) -> Result<WithdrawalRequest> {
        self.withdrawals.get(request_id)
    }

    /// Exchange transaction by id
    pub fn exchange_transaction(&self, exchange_id: Uuid) -> Result<ExchangeTransaction> {
        self.exchange.get(exchange_id)
    }

    /// Status of a deposit or withdrawal request
    pub fn request_status(&self, request_id: Uuid) -> Result<RequestStatus> {
        match self.deposits.get(request_id) {
            Ok(request) => Ok(request.status),
            Err(Error::RequestNotFound(_)) => Ok(self.withdrawals.get(request_id)?.status),
            Err(e) => Err(e),
        }
    }

    /// Deposits awaiting review, oldest first
    pub fn pending_deposits(&self) -> Result<Vec<DepositRequest>> {
        self.deposits.pending()
    }

    /// Withdrawals awaiting review, oldest first
    pub fn pending_withdrawals(&self) -> Result<Vec<WithdrawalRequest>> {
        self.withdrawals.pending()
    }

    /// Recompute an account from its entries and verify its hash chain
    pub async fn reconcile(&self, account_id: &AccountId) -> Result<ReconciliationReport> {
        Ok(self.ledger.reconcile(account_id).await?)
    }

    // Lifecycle

    /// Archive every settled deposit whose delay has passed
    pub async fn sweep_archive(&self) -> Result<usize> {
        self.janitor.sweep().await
    }

    /// Stop the janitor and wait for it
    pub async fn shutdown(&self) -> Result<()> {
        let task = self.janitor_task.lock().take();
        let Some(task) = task else {
            return Ok(());
        };
        self.janitor.shutdown().await?;
        task.await
            .map_err(|e| Error::Janitor(format!("janitor task failed: {}", e)))?;

        let pruned = self.ledger.prune_locks();
        tracing::info!(pruned_locks = pruned, "Wallet engine stopped");
        Ok(())
    }
}
