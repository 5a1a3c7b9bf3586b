//! Deposit settlement
//!
//! A deposit request is created by the account holder with a proof token
//! and decided exactly once by an operator. Approval credits `spendable`
//! with the request id as ledger reference, so a retried approval finds the
//! original entry instead of crediting again.

use crate::{
    metrics::SettlementMetrics,
    records::{
        invite_recharge_key, NS_DEPOSIT, NS_DEPOSIT_PROOF, NS_DEPOSIT_QUEUE, NS_INVITE_RECHARGE,
    },
    types::{validate_amount, DepositRequest, RequestStatus},
    Error, Result,
};
use chrono::Utc;
use ledger_core::{AccountId, Applied, EntryKind, Ledger, Pool};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Deposit request lifecycle
#[derive(Debug)]
pub struct DepositSettlement {
    ledger: Arc<Ledger>,
    metrics: SettlementMetrics,
    submissions: Mutex<()>,
}

impl DepositSettlement {
    /// Create over a shared ledger
    pub fn new(ledger: Arc<Ledger>, metrics: SettlementMetrics) -> Self {
        Self {
            ledger,
            metrics,
            submissions: Mutex::new(()),
        }
    }

    /// Load a request
    pub fn get(&self, request_id: Uuid) -> Result<DepositRequest> {
        self.ledger
            .get_record(NS_DEPOSIT, &request_id.to_string())?
            .ok_or(Error::RequestNotFound(request_id))
    }

    /// Create a pending request.
    ///
    /// A proof token belongs to at most one request, whatever its outcome.
    pub async fn submit(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        proof_token: &str,
    ) -> Result<DepositRequest> {
        validate_amount(amount, "deposit")?;
        let proof_token = proof_token.trim();
        if proof_token.is_empty() {
            return Err(Error::InvalidAmount(
                "deposit proof token must not be empty".to_string(),
            ));
        }

        // Proof tokens are global, so submissions are serialized across accounts
        let _serialized = self.submissions.lock().await;
        if let Some(existing) = self
            .ledger
            .get_record::<Uuid>(NS_DEPOSIT_PROOF, proof_token)?
        {
            tracing::warn!(
                account = %account_id,
                proof_token = %proof_token,
                existing_request = %existing,
                "Duplicate deposit proof rejected"
            );
            return Err(Error::DuplicateProof(proof_token.to_string()));
        }

        let mut scope = self.ledger.scope(account_id).await?;
        if !scope.account().active {
            return Err(ledger_core::Error::AccountInactive(account_id.clone()).into());
        }

        let request = DepositRequest {
            request_id: Uuid::now_v7(),
            account_id: account_id.clone(),
            amount,
            proof_token: proof_token.to_string(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
            rejection_reason: None,
            archived_at: None,
        };
        let key = request.request_id.to_string();
        scope.put_record(NS_DEPOSIT, key.clone(), &request)?;
        scope.put_record(NS_DEPOSIT_QUEUE, key, &())?;
        scope.put_record(NS_DEPOSIT_PROOF, proof_token, &request.request_id)?;
        scope.commit()?;

        tracing::info!(
            request = %request.request_id,
            account = %account_id,
            amount = %amount,
            "Deposit submitted"
        );
        Ok(request)
    }

    /// Approve a pending request and credit the account.
    ///
    /// Re-approving returns the original entry as [`Applied::Replayed`].
    /// The depositor's level-1 referrer is credited with the amount as
    /// invite recharge in the same commit.
    pub async fn approve(&self, request_id: Uuid) -> Result<Applied> {
        let account_id = self.get(request_id)?.account_id;
        let reference = request_id.to_string();

        let mut scope = self.ledger.scope(&account_id).await?;
        let mut request = self.get(request_id)?;

        match request.status {
            RequestStatus::Pending => {}
            RequestStatus::Approved => {
                let entry = self
                    .ledger
                    .find_entry(EntryKind::Deposit, &reference)?
                    .ok_or_else(|| {
                        ledger_core::Error::InvariantViolation(format!(
                            "approved deposit {} has no ledger entry",
                            request_id
                        ))
                    })?;
                tracing::debug!(request = %request_id, "Deposit already approved");
                return Ok(Applied::Replayed(entry));
            }
            RequestStatus::Rejected => {
                return Err(Error::InvalidState {
                    request: request_id,
                    status: request.status,
                    action: "approve",
                });
            }
        }

        let applied = scope.apply(Pool::Spendable, request.amount, EntryKind::Deposit, &reference)?;

        request.status = RequestStatus::Approved;
        request.decided_at = Some(Utc::now());
        scope.put_record(NS_DEPOSIT, reference.clone(), &request)?;

        if let Some(inviter) = scope.account().ancestor(1).cloned() {
            scope.put_record(
                NS_INVITE_RECHARGE,
                invite_recharge_key(&inviter, request_id),
                &request.amount,
            )?;
        }
        scope.commit()?;

        self.metrics.deposits.with_label_values(&["approved"]).inc();
        tracing::info!(
            request = %request_id,
            account = %account_id,
            amount = %request.amount,
            balance_after = %applied.entry().balance_after,
            "Deposit approved"
        );
        Ok(applied)
    }

    /// Reject a pending request; no ledger effect.
    ///
    /// Re-rejecting is a no-op; rejecting an approved request fails.
    pub async fn reject(&self, request_id: Uuid, reason: &str) -> Result<DepositRequest> {
        let account_id = self.get(request_id)?.account_id;

        let mut scope = self.ledger.scope(&account_id).await?;
        let mut request = self.get(request_id)?;

        match request.status {
            RequestStatus::Pending => {}
            RequestStatus::Rejected => return Ok(request),
            RequestStatus::Approved => {
                return Err(Error::InvalidState {
                    request: request_id,
                    status: request.status,
                    action: "reject",
                });
            }
        }

        request.status = RequestStatus::Rejected;
        request.decided_at = Some(Utc::now());
        request.rejection_reason = Some(reason.to_string());
        scope.put_record(NS_DEPOSIT, request_id.to_string(), &request)?;
        scope.commit()?;

        self.metrics.deposits.with_label_values(&["rejected"]).inc();
        tracing::info!(
            request = %request_id,
            account = %account_id,
            reason = %reason,
            "Deposit rejected"
        );
        Ok(request)
    }

    /// Pending requests, oldest first
    pub fn pending(&self) -> Result<Vec<DepositRequest>> {
        let mut pending = Vec::new();
        for (key, ()) in self.ledger.scan_records::<()>(NS_DEPOSIT_QUEUE, "")? {
            let Some(request) = self.ledger.get_record::<DepositRequest>(NS_DEPOSIT, &key)? else {
                continue;
            };
            if request.status == RequestStatus::Pending {
                pending.push(request);
            }
        }
        Ok(pending)
    }
}
