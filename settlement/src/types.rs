//! Core types for the settlement engine

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use ledger_core::{AccountId, MONEY_SCALE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reject amounts that are not positive or carry more than two decimals
pub(crate) fn validate_amount(amount: Decimal, what: &str) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount(format!(
            "{} must be positive, got {}",
            what, amount
        )));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(Error::InvalidAmount(format!(
            "{} {} has more than {} decimal places",
            what, amount, MONEY_SCALE
        )));
    }
    Ok(())
}

/// `percent`% of `amount`, unrounded; overflow is an invalid amount
pub(crate) fn percent_of(amount: Decimal, percent: Decimal, what: &str) -> Result<Decimal> {
    amount
        .checked_mul(percent)
        .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(|| {
            Error::InvalidAmount(format!(
                "{} of {} at {}% is out of range",
                what, amount, percent
            ))
        })
}

/// Review status shared by deposit and withdrawal requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Awaiting operator review
    Pending,
    /// Settled by an operator
    Approved,
    /// Declined by an operator
    Rejected,
}

impl RequestStatus {
    /// Stable lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    /// True once an operator has decided
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Account holder's claim of an external top-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequest {
    /// Request ID (UUIDv7, also the ledger reference)
    pub request_id: Uuid,

    /// Depositing account
    pub account_id: AccountId,

    /// Claimed amount
    pub amount: Decimal,

    /// External transaction reference submitted as proof
    pub proof_token: String,

    /// Review status
    pub status: RequestStatus,

    /// Submission time
    pub created_at: DateTime<Utc>,

    /// Approval or rejection time
    pub decided_at: Option<DateTime<Utc>>,

    /// Operator's reason for a rejection
    pub rejection_reason: Option<String>,

    /// When the request left the active queue
    pub archived_at: Option<DateTime<Utc>>,
}

/// Where a withdrawal is paid out to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutDestination {
    /// Payout channel (bank, e-wallet, ...)
    pub channel: String,

    /// Name on the destination account
    pub holder_name: String,

    /// Destination account number
    pub account_number: String,
}

impl PayoutDestination {
    /// Create destination descriptor
    pub fn new(
        channel: impl Into<String>,
        holder_name: impl Into<String>,
        account_number: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            holder_name: holder_name.into(),
            account_number: account_number.into(),
        }
    }
}

/// Payout request; funds are held from creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Request ID (UUIDv7, also the ledger reference)
    pub request_id: Uuid,

    /// Withdrawing account
    pub account_id: AccountId,

    /// Amount debited from spendable
    pub amount: Decimal,

    /// Fee percent in force at creation
    pub fee_percent: Decimal,

    /// Fee, frozen at creation
    pub fee: Decimal,

    /// Amount paid out, frozen at creation
    pub net_payout: Decimal,

    /// Payout destination
    pub destination: PayoutDestination,

    /// Review status
    pub status: RequestStatus,

    /// Policy version the fee was computed under
    pub policy_version: u64,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Approval or rejection time
    pub decided_at: Option<DateTime<Utc>>,

    /// Operator's reason for a rejection
    pub rejection_reason: Option<String>,
}

/// Completed referral-coin exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeTransaction {
    /// Exchange ID (ledger reference of both entries)
    pub exchange_id: Uuid,

    /// Account
    pub account_id: AccountId,

    /// Referral coins debited
    pub coin_amount: Decimal,

    /// Spendable credited
    pub spendable_credited: Decimal,

    /// Rate applied, frozen
    pub rate: Decimal,

    /// Policy version the rate came from
    pub policy_version: u64,

    /// Execution time
    pub executed_at: DateTime<Utc>,
}

/// Kind of event that pays commission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommissionKind {
    /// Completed task
    Task,
    /// Recharge (approved deposit)
    Recharge,
}

impl CommissionKind {
    /// Stable lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            CommissionKind::Task => "task",
            CommissionKind::Recharge => "recharge",
        }
    }
}

impl fmt::Display for CommissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A qualifying event reported by the task subsystem or a deposit approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionEvent {
    /// Account whose activity triggers the payout
    pub source: AccountId,

    /// Amount the percentages apply to
    pub base_amount: Decimal,

    /// Event kind
    pub kind: CommissionKind,

    /// Identifier of the triggering event, unique per source and kind
    pub event_ref: String,
}

impl CommissionEvent {
    /// Create event
    pub fn new(
        source: AccountId,
        base_amount: Decimal,
        kind: CommissionKind,
        event_ref: impl Into<String>,
    ) -> Self {
        Self {
            source,
            base_amount,
            kind,
            event_ref: event_ref.into(),
        }
    }

    /// Idempotency key of the payout at `level`
    pub fn reference(&self, level: usize) -> String {
        format!("{}:{}#{}:{}", self.source, self.kind, self.event_ref, level)
    }
}
