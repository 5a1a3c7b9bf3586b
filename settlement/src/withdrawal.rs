//! Withdrawal settlement
//!
//! Funds are held at request time: the request debits `spendable` and
//! records the request in one commit. Approval only changes the status.
//! Rejection writes a compensating `withdrawal-reversal` entry keyed by
//! the request id, so it can run at most once.
//!
//! The policy snapshot is taken before the account lock; eligibility is
//! evaluated under the lock against the state the debit will see.

use crate::{
    metrics::SettlementMetrics,
    policy::PolicyReader,
    records::{AccountFacts, NS_WITHDRAWAL, NS_WITHDRAWAL_QUEUE},
    types::{percent_of, validate_amount, PayoutDestination, RequestStatus, WithdrawalRequest},
    Error, Result,
};
use chrono::Utc;
use eligibility_engine::{EligibilityChecker, Verdict};
use ledger_core::{round_charge, AccountId, EntryKind, Ledger, Pool};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Fee and net payout for `amount` at `fee_percent`
pub fn compute_fee(amount: Decimal, fee_percent: Decimal) -> Result<(Decimal, Decimal)> {
    let fee = round_charge(percent_of(amount, fee_percent, "withdrawal fee")?);
    Ok((fee, amount - fee))
}

/// Withdrawal request lifecycle
#[derive(Debug)]
pub struct WithdrawalSettlement {
    ledger: Arc<Ledger>,
    policy: PolicyReader,
    metrics: SettlementMetrics,
}

impl WithdrawalSettlement {
    /// Create over a shared ledger and policy source
    pub fn new(ledger: Arc<Ledger>, policy: PolicyReader, metrics: SettlementMetrics) -> Self {
        Self {
            ledger,
            policy,
            metrics,
        }
    }

    /// Load a request
    pub fn get(&self, request_id: Uuid) -> Result<WithdrawalRequest> {
        self.ledger
            .get_record(NS_WITHDRAWAL, &request_id.to_string())?
            .ok_or(Error::RequestNotFound(request_id))
    }

    /// Evaluate eligibility without side effects
    pub async fn check_eligibility(&self, account_id: &AccountId, amount: Decimal) -> Result<Verdict> {
        let policy = self.policy.snapshot().await?;
        let checker = EligibilityChecker::new(policy.withdrawal_rules)?;
        let account = self.ledger.get_account(account_id)?;
        let standing = AccountFacts::new(&self.ledger).standing(&account)?;
        Ok(checker.check(&standing, amount))
    }

    /// Create a pending request, holding `amount` from `spendable`
    pub async fn request(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        destination: PayoutDestination,
    ) -> Result<WithdrawalRequest> {
        validate_amount(amount, "withdrawal")?;
        let policy = self.policy.snapshot().await?;
        if amount < policy.min_withdrawal {
            return Err(Error::InvalidAmount(format!(
                "withdrawal {} is below the minimum {}",
                amount, policy.min_withdrawal
            )));
        }
        let (fee, net_payout) = compute_fee(amount, policy.withdrawal_fee_percent)?;
        let checker = EligibilityChecker::new(policy.withdrawal_rules.clone())?;

        let mut scope = self.ledger.scope(account_id).await?;
        if !scope.account().active {
            return Err(ledger_core::Error::AccountInactive(account_id.clone()).into());
        }

        let standing = AccountFacts::new(&self.ledger).standing(scope.account())?;
        if let Verdict::Deny(reason) = checker.check(&standing, amount) {
            self.metrics.withdrawals.with_label_values(&["denied"]).inc();
            tracing::warn!(
                account = %account_id,
                amount = %amount,
                reason = %reason,
                "Withdrawal denied"
            );
            return Err(Error::NotEligible(reason));
        }

        let request = WithdrawalRequest {
            request_id: Uuid::now_v7(),
            account_id: account_id.clone(),
            amount,
            fee_percent: policy.withdrawal_fee_percent,
            fee,
            net_payout,
            destination,
            status: RequestStatus::Pending,
            policy_version: policy.version,
            created_at: Utc::now(),
            decided_at: None,
            rejection_reason: None,
        };
        let reference = request.request_id.to_string();

        scope.apply(Pool::Spendable, -amount, EntryKind::Withdrawal, &reference)?;
        scope.put_record(NS_WITHDRAWAL, reference.clone(), &request)?;
        scope.put_record(NS_WITHDRAWAL_QUEUE, reference, &())?;
        scope.commit()?;

        self.metrics.withdrawals.with_label_values(&["requested"]).inc();
        tracing::info!(
            request = %request.request_id,
            account = %account_id,
            amount = %amount,
            fee = %request.fee,
            net_payout = %request.net_payout,
            policy_version = policy.version,
            "Withdrawal requested"
        );
        Ok(request)
    }

    /// Mark a pending request approved; funds were already held.
    ///
    /// Re-approving is a no-op; approving a rejected request fails.
    pub async fn approve(&self, request_id: Uuid) -> Result<WithdrawalRequest> {
        let account_id = self.get(request_id)?.account_id;

        let mut scope = self.ledger.scope(&account_id).await?;
        let mut request = self.get(request_id)?;

        match request.status {
            RequestStatus::Pending => {}
            RequestStatus::Approved => {
                tracing::debug!(request = %request_id, "Withdrawal already approved");
                return Ok(request);
            }
            RequestStatus::Rejected => {
                return Err(Error::InvalidState {
                    request: request_id,
                    status: request.status,
                    action: "approve",
                });
            }
        }

        request.status = RequestStatus::Approved;
        request.decided_at = Some(Utc::now());
        let key = request_id.to_string();
        scope.put_record(NS_WITHDRAWAL, key.clone(), &request)?;
        scope.delete_record(NS_WITHDRAWAL_QUEUE, key);
        scope.commit()?;

        self.metrics.withdrawals.with_label_values(&["approved"]).inc();
        tracing::info!(
            request = %request_id,
            account = %account_id,
            net_payout = %request.net_payout,
            "Withdrawal approved"
        );
        Ok(request)
    }

    /// Reject a pending request and return the held funds.
    ///
    /// The frozen fee and net payout stay on the record. Re-rejecting is a
    /// no-op; rejecting an approved request fails.
    pub async fn reject(&self, request_id: Uuid, reason: &str) -> Result<WithdrawalRequest> {
        let account_id = self.get(request_id)?.account_id;

        let mut scope = self.ledger.scope(&account_id).await?;
        let mut request = self.get(request_id)?;

        match request.status {
            RequestStatus::Pending => {}
            RequestStatus::Rejected => {
                tracing::debug!(request = %request_id, "Withdrawal already rejected");
                return Ok(request);
            }
            RequestStatus::Approved => {
                return Err(Error::InvalidState {
                    request: request_id,
                    status: request.status,
                    action: "reject",
                });
            }
        }

        let key = request_id.to_string();
        let reversal = scope.apply(
            Pool::Spendable,
            request.amount,
            EntryKind::WithdrawalReversal,
            &key,
        )?;

        request.status = RequestStatus::Rejected;
        request.decided_at = Some(Utc::now());
        request.rejection_reason = Some(reason.to_string());
        scope.put_record(NS_WITHDRAWAL, key.clone(), &request)?;
        scope.delete_record(NS_WITHDRAWAL_QUEUE, key);
        scope.commit()?;

        self.metrics.withdrawals.with_label_values(&["rejected"]).inc();
        tracing::info!(
            request = %request_id,
            account = %account_id,
            amount = %request.amount,
            balance_after = %reversal.entry().balance_after,
            reason = %reason,
            "Withdrawal rejected, funds returned"
        );
        Ok(request)
    }

    /// Pending requests, oldest first
    pub fn pending(&self) -> Result<Vec<WithdrawalRequest>> {
        let mut pending = Vec::new();
        for (key, ()) in self.ledger.scan_records::<()>(NS_WITHDRAWAL_QUEUE, "")? {
            if let Some(request) = self.ledger.get_record::<WithdrawalRequest>(NS_WITHDRAWAL, &key)? {
                pending.push(request);
            }
        }
        Ok(pending)
    }
}
