//! Exchange engine: referral coins to spendable balance

use crate::{
    metrics::SettlementMetrics,
    policy::PolicyReader,
    records::NS_EXCHANGE,
    types::{validate_amount, ExchangeTransaction},
    Error, Result,
};
use chrono::Utc;
use ledger_core::{round_credit, AccountId, EntryKind, Ledger, Pool};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Converts referral coins at the configured rate
#[derive(Debug)]
pub struct ExchangeEngine {
    ledger: Arc<Ledger>,
    policy: PolicyReader,
    metrics: SettlementMetrics,
}

impl ExchangeEngine {
    /// Create over a shared ledger and policy source
    pub fn new(ledger: Arc<Ledger>, policy: PolicyReader, metrics: SettlementMetrics) -> Self {
        Self {
            ledger,
            policy,
            metrics,
        }
    }

    /// Load a completed exchange
    pub fn get(&self, exchange_id: Uuid) -> Result<ExchangeTransaction> {
        self.ledger
            .get_record(NS_EXCHANGE, &exchange_id.to_string())?
            .ok_or(Error::RequestNotFound(exchange_id))
    }

    /// Debit `coin_amount` referral coins and credit `coin_amount × rate`
    /// spendable, both entries and the transaction record in one commit.
    pub async fn exchange(
        &self,
        account_id: &AccountId,
        coin_amount: Decimal,
    ) -> Result<ExchangeTransaction> {
        validate_amount(coin_amount, "exchange")?;
        let policy = self.policy.snapshot().await?;
        let rate = policy.exchange_rate;
        let credited = coin_amount
            .checked_mul(rate)
            .map(round_credit)
            .ok_or_else(|| {
                Error::InvalidAmount(format!(
                    "exchanging {} coins at rate {} is out of range",
                    coin_amount, rate
                ))
            })?;
        if credited <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "exchanging {} coins at rate {} credits nothing",
                coin_amount, rate
            )));
        }

        let mut scope = self.ledger.scope(account_id).await?;
        if !scope.account().active {
            return Err(ledger_core::Error::AccountInactive(account_id.clone()).into());
        }

        let transaction = ExchangeTransaction {
            exchange_id: Uuid::now_v7(),
            account_id: account_id.clone(),
            coin_amount,
            spendable_credited: credited,
            rate,
            policy_version: policy.version,
            executed_at: Utc::now(),
        };
        let reference = transaction.exchange_id.to_string();

        scope.apply(
            Pool::ReferralCoins,
            -coin_amount,
            EntryKind::ExchangeDebit,
            &reference,
        )?;
        scope.apply(Pool::Spendable, credited, EntryKind::ExchangeCredit, &reference)?;
        scope.put_record(NS_EXCHANGE, reference, &transaction)?;
        scope.commit()?;

        self.metrics.exchanges.inc();
        tracing::info!(
            exchange = %transaction.exchange_id,
            account = %account_id,
            coins = %coin_amount,
            credited = %credited,
            rate = %rate,
            policy_version = policy.version,
            "Exchange completed"
        );
        Ok(transaction)
    }
}
