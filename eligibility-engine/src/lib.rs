//! Eligibility Engine
//!
//! Decides whether an account may withdraw a given amount. The global
//! percentage cap is the default ceiling; holding a product whose
//! invite-recharge threshold is met lifts it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod rules;
pub mod types;

pub use error::{Error, Result};
pub use rules::{EligibilityChecker, WithdrawalRules};
pub use types::*;
