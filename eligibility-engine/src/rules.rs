//! Withdrawal eligibility rules
//!
//! Evaluation order:
//!
//! 1. An active restriction denies with its stored reason.
//! 2. Amounts up to `global_cap_percent` of lifetime own deposits are allowed.
//! 3. Above the cap, any held product whose invite-recharge threshold is met
//!    allows the withdrawal. Products are tried lowest threshold first, so
//!    the most permissive satisfied rule is the one reported.
//!
//! The checker has no clock and no hidden state: the same rules and the
//! same standing always produce the same verdict.

use crate::{
    types::{AccountStanding, AllowBasis, ProductId, Verdict},
    Error, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Rule configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalRules {
    /// Percent of lifetime own deposits withdrawable without qualification
    pub global_cap_percent: Decimal,

    /// Product → invite-recharge threshold that lifts the cap
    pub product_rules: BTreeMap<ProductId, Decimal>,
}

impl Default for WithdrawalRules {
    fn default() -> Self {
        Self {
            global_cap_percent: Decimal::from(50),
            product_rules: BTreeMap::new(),
        }
    }
}

impl WithdrawalRules {
    /// Check ranges: cap within 0..=100, thresholds non-negative
    pub fn validate(&self) -> Result<()> {
        if self.global_cap_percent < Decimal::ZERO || self.global_cap_percent > HUNDRED {
            return Err(Error::InvalidRule(format!(
                "global cap {}% outside 0..=100",
                self.global_cap_percent
            )));
        }
        if let Some((product, threshold)) = self
            .product_rules
            .iter()
            .find(|(_, threshold)| **threshold < Decimal::ZERO)
        {
            return Err(Error::InvalidRule(format!(
                "product {} has negative threshold {}",
                product, threshold
            )));
        }
        Ok(())
    }

    /// Global cap in money terms for the given lifetime deposits.
    ///
    /// Near the top of the `Decimal` range the division happens first, and
    /// a cap that still does not fit saturates at `Decimal::MAX`.
    pub fn cap_for(&self, lifetime_own_deposits: Decimal) -> Decimal {
        match lifetime_own_deposits.checked_mul(self.global_cap_percent) {
            Some(scaled) => scaled / HUNDRED,
            None => (lifetime_own_deposits / HUNDRED)
                .checked_mul(self.global_cap_percent)
                .unwrap_or(Decimal::MAX),
        }
    }
}

/// Withdrawal eligibility checker
#[derive(Debug, Clone)]
pub struct EligibilityChecker {
    rules: WithdrawalRules,
}

impl EligibilityChecker {
    /// Create checker from validated rules
    pub fn new(rules: WithdrawalRules) -> Result<Self> {
        rules.validate()?;
        Ok(Self { rules })
    }

    /// Rules in force
    pub fn rules(&self) -> &WithdrawalRules {
        &self.rules
    }

    /// Evaluate a withdrawal of `requested` for an account in `standing`
    pub fn check(&self, standing: &AccountStanding, requested: Decimal) -> Verdict {
        if let Some(reason) = &standing.restriction {
            return Verdict::Deny(format!("Account restricted: {}", reason));
        }

        let cap = self.rules.cap_for(standing.lifetime_own_deposits);
        if requested <= cap {
            return Verdict::Allow(AllowBasis::WithinGlobalCap { cap });
        }

        let held: BTreeSet<&ProductId> = standing.held_products.iter().collect();
        let mut candidates: Vec<(&ProductId, Decimal)> = held
            .into_iter()
            .filter_map(|product| {
                self.rules
                    .product_rules
                    .get(product)
                    .map(|threshold| (product, *threshold))
            })
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        if let Some((product, threshold)) = candidates
            .iter()
            .find(|(_, threshold)| standing.invite_recharge >= *threshold)
        {
            tracing::debug!(
                product = %product,
                threshold = %threshold,
                invite_recharge = %standing.invite_recharge,
                "Product rule lifts withdrawal cap"
            );
            return Verdict::Allow(AllowBasis::ProductRule {
                product: (*product).clone(),
                threshold: *threshold,
            });
        }

        let over_cap = format!(
            "Withdrawal of {} exceeds {}% of lifetime deposits (limit {})",
            requested,
            self.rules.global_cap_percent,
            cap.round_dp(2)
        );

        match candidates.first() {
            Some((product, threshold)) => Verdict::Deny(format!(
                "{}; invited-member recharge {} is below the {} required by product {}",
                over_cap, standing.invite_recharge, threshold, product
            )),
            None => Verdict::Deny(format!(
                "{}; no held product qualifies for a higher limit",
                over_cap
            )),
        }
    }
}
