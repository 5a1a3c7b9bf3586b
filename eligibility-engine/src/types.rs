//! Core types for the eligibility engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Purchasable product identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Create new product ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the rules need to know about one account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStanding {
    /// Active restriction reason, if the account is restricted
    pub restriction: Option<String>,

    /// Sum of the account's own approved deposits
    pub lifetime_own_deposits: Decimal,

    /// Products the account holds
    pub held_products: Vec<ProductId>,

    /// Cumulative recharge by accounts this account invited
    pub invite_recharge: Decimal,
}

/// Why a withdrawal was allowed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllowBasis {
    /// Amount fits under the global percentage cap
    WithinGlobalCap {
        /// Cap in money terms
        cap: Decimal,
    },
    /// A held product's invite-recharge threshold is met
    ProductRule {
        /// Product whose rule was satisfied
        product: ProductId,
        /// Threshold that was met
        threshold: Decimal,
    },
}

/// Eligibility verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Withdrawal permitted
    Allow(AllowBasis),
    /// Withdrawal refused, with a human-readable reason
    Deny(String),
}

impl Verdict {
    /// True if the withdrawal may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow(_))
    }

    /// Denial reason, if denied
    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            Verdict::Allow(_) => None,
            Verdict::Deny(reason) => Some(reason),
        }
    }
}
