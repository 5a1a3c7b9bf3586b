//! Property-based tests for eligibility verdicts

use eligibility_engine::{AccountStanding, EligibilityChecker, ProductId, WithdrawalRules};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

fn money() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn rules_strategy() -> impl Strategy<Value = WithdrawalRules> {
    (
        0u32..=100u32,
        prop::collection::btree_map("[a-d]", 0i64..50_000i64, 0..4),
    )
        .prop_map(|(cap, products)| WithdrawalRules {
            global_cap_percent: Decimal::from(cap),
            product_rules: products
                .into_iter()
                .map(|(id, threshold)| (ProductId::new(id), Decimal::from(threshold)))
                .collect::<BTreeMap<_, _>>(),
        })
}

fn standing_strategy() -> impl Strategy<Value = AccountStanding> {
    (
        money(),
        prop::collection::vec("[a-f]", 0..4),
        money(),
        prop::option::of("[a-z ]{1,20}"),
    )
        .prop_map(|(deposits, products, invite_recharge, restriction)| AccountStanding {
            restriction,
            lifetime_own_deposits: deposits,
            held_products: products.into_iter().map(ProductId::new).collect(),
            invite_recharge,
        })
}

proptest! {
    /// Property: identical inputs always produce the identical verdict
    #[test]
    fn prop_verdict_is_deterministic(
        rules in rules_strategy(),
        standing in standing_strategy(),
        requested in money(),
    ) {
        let checker = EligibilityChecker::new(rules).unwrap();
        let first = checker.check(&standing, requested);
        for _ in 0..3 {
            prop_assert_eq!(&checker.check(&standing, requested), &first);
        }
    }

    /// Property: product order in the standing never changes the verdict
    #[test]
    fn prop_product_order_irrelevant(
        rules in rules_strategy(),
        standing in standing_strategy(),
        requested in money(),
    ) {
        let checker = EligibilityChecker::new(rules).unwrap();
        let mut reversed = standing.clone();
        reversed.held_products.reverse();
        prop_assert_eq!(checker.check(&standing, requested), checker.check(&reversed, requested));
    }

    /// Property: unrestricted amounts under the cap are always allowed
    #[test]
    fn prop_under_cap_allowed(rules in rules_strategy(), mut standing in standing_strategy()) {
        standing.restriction = None;
        let checker = EligibilityChecker::new(rules.clone()).unwrap();
        let cap = rules.cap_for(standing.lifetime_own_deposits);
        prop_assert!(checker.check(&standing, cap).is_allowed());
    }

    /// Property: restricted accounts are always denied
    #[test]
    fn prop_restricted_denied(rules in rules_strategy(), mut standing in standing_strategy(), requested in money()) {
        standing.restriction = Some("frozen".to_string());
        let checker = EligibilityChecker::new(rules).unwrap();
        prop_assert!(!checker.check(&standing, requested).is_allowed());
    }
}
