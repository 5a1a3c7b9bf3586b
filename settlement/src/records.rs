//! Record namespaces and account facts
//!
//! Settlement records live in the ledger's record column family so they
//! are written in the same batch as the entries they accompany.
//!
//! | Namespace | Key | Value |
//! |---|---|---|
//! | `deposit` | request id | [`DepositRequest`] |
//! | `deposit-queue` | request id | `()` (present until archived) |
//! | `deposit-proof` | proof token | request id |
//! | `withdrawal` | request id | [`WithdrawalRequest`] |
//! | `withdrawal-queue` | request id | `()` (present while pending) |
//! | `exchange` | exchange id | [`ExchangeTransaction`] |
//! | `holding` | `account \0 product` | [`Holding`] |
//! | `restriction` | account | [`Restriction`] |
//! | `invite-recharge` | `inviter \0 deposit id` | amount |
//!
//! Request ids are UUIDv7, so key order is creation order.
//!
//! [`DepositRequest`]: crate::types::DepositRequest
//! [`WithdrawalRequest`]: crate::types::WithdrawalRequest
//! [`ExchangeTransaction`]: crate::types::ExchangeTransaction

use crate::Result;
use chrono::{DateTime, Utc};
use eligibility_engine::{AccountStanding, ProductId};
use ledger_core::{Account, AccountId, AccountScope, Ledger};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub(crate) const NS_DEPOSIT: &str = "deposit";
pub(crate) const NS_DEPOSIT_QUEUE: &str = "deposit-queue";
pub(crate) const NS_DEPOSIT_PROOF: &str = "deposit-proof";
pub(crate) const NS_WITHDRAWAL: &str = "withdrawal";
pub(crate) const NS_WITHDRAWAL_QUEUE: &str = "withdrawal-queue";
pub(crate) const NS_EXCHANGE: &str = "exchange";
pub(crate) const NS_HOLDING: &str = "holding";
pub(crate) const NS_RESTRICTION: &str = "restriction";
pub(crate) const NS_INVITE_RECHARGE: &str = "invite-recharge";

const SEP: char = '\0';

fn account_prefix(account_id: &AccountId) -> String {
    format!("{}{}", account_id, SEP)
}

pub(crate) fn holding_key(account_id: &AccountId, product: &ProductId) -> String {
    format!("{}{}", account_prefix(account_id), product)
}

pub(crate) fn invite_recharge_key(inviter: &AccountId, deposit_id: Uuid) -> String {
    format!("{}{}", account_prefix(inviter), deposit_id)
}

/// A product held by an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    /// Product
    pub product: ProductId,
    /// When the product was granted
    pub granted_at: DateTime<Utc>,
}

/// Active account restriction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    /// Reason shown on denial
    pub reason: String,
    /// When the restriction was set
    pub since: DateTime<Utc>,
}

/// Read access to the facts the eligibility rules depend on
#[derive(Debug, Clone, Copy)]
pub struct AccountFacts<'a> {
    ledger: &'a Ledger,
}

impl<'a> AccountFacts<'a> {
    /// Facts backed by `ledger`
    pub fn new(ledger: &'a Ledger) -> Self {
        Self { ledger }
    }

    /// Active restriction, if any
    pub fn restriction(&self, account_id: &AccountId) -> Result<Option<Restriction>> {
        Ok(self.ledger.get_record(NS_RESTRICTION, account_id.as_str())?)
    }

    /// Products held, in product order
    pub fn holdings(&self, account_id: &AccountId) -> Result<Vec<Holding>> {
        Ok(self
            .ledger
            .scan_records::<Holding>(NS_HOLDING, &account_prefix(account_id))?
            .into_iter()
            .map(|(_, holding)| holding)
            .collect())
    }

    /// Cumulative approved deposits of accounts this account invited directly
    pub fn invite_recharge(&self, account_id: &AccountId) -> Result<Decimal> {
        Ok(self
            .ledger
            .scan_records::<Decimal>(NS_INVITE_RECHARGE, &account_prefix(account_id))?
            .into_iter()
            .map(|(_, amount)| amount)
            .fold(Decimal::ZERO, |total, amount| {
                total.checked_add(amount).unwrap_or(Decimal::MAX)
            }))
    }

    /// Everything the eligibility checker needs, for `account` as seen now
    pub fn standing(&self, account: &Account) -> Result<AccountStanding> {
        Ok(AccountStanding {
            restriction: self
                .restriction(&account.account_id)?
                .map(|restriction| restriction.reason),
            lifetime_own_deposits: account.lifetime_deposits,
            held_products: self
                .holdings(&account.account_id)?
                .into_iter()
                .map(|holding| holding.product)
                .collect(),
            invite_recharge: self.invite_recharge(&account.account_id)?,
        })
    }
}

/// Stage a product grant
pub(crate) fn stage_holding(scope: &mut AccountScope<'_>, product: &ProductId) -> Result<()> {
    let key = holding_key(&scope.account().account_id, product);
    scope.put_record(
        NS_HOLDING,
        key,
        &Holding {
            product: product.clone(),
            granted_at: Utc::now(),
        },
    )?;
    Ok(())
}
