//! Error types for the settlement engine

use crate::types::RequestStatus;
use ledger_core::{AccountId, Pool};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Debit would drive a pool below zero; nothing was written
    #[error("Insufficient funds in {pool} of {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Account debited
        account: AccountId,
        /// Pool debited
        pool: Pool,
        /// Balance at the time of the attempt
        available: Decimal,
        /// Absolute debit amount
        requested: Decimal,
    },

    /// Withdrawal refused by the eligibility rules
    #[error("Not eligible: {0}")]
    NotEligible(String),

    /// Status transition attempted from a terminal or wrong state
    #[error("Cannot {action} request {request}: status is {status}")]
    InvalidState {
        /// Request ID
        request: Uuid,
        /// Status found
        status: RequestStatus,
        /// Attempted transition
        action: &'static str,
    },

    /// Request does not exist
    #[error("Request not found: {0}")]
    RequestNotFound(Uuid),

    /// Deposit proof token already used by another request
    #[error("Proof token already submitted: {0}")]
    DuplicateProof(String),

    /// Configuration store read timed out or failed
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Zero, negative or out-of-scale amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Janitor mailbox unavailable
    #[error("Janitor error: {0}")]
    Janitor(String),

    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(ledger_core::Error),

    /// Rule configuration error
    #[error("Rule error: {0}")]
    Rules(#[from] eligibility_engine::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Transient failures the caller may retry unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::DependencyUnavailable(_) => true,
            Error::Ledger(inner) => inner.is_retryable(),
            _ => false,
        }
    }
}

impl From<ledger_core::Error> for Error {
    fn from(err: ledger_core::Error) -> Self {
        match err {
            ledger_core::Error::InsufficientFunds {
                account,
                pool,
                available,
                requested,
            } => Error::InsufficientFunds {
                account,
                pool,
                available,
                requested,
            },
            ledger_core::Error::InvalidAmount(msg) => Error::InvalidAmount(msg),
            other => Error::Ledger(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_is_lifted() {
        let err: Error = ledger_core::Error::InsufficientFunds {
            account: AccountId::new("a"),
            pool: Pool::Spendable,
            available: Decimal::from(5),
            requested: Decimal::from(10),
        }
        .into();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(Error::DependencyUnavailable("config".into()).is_retryable());
        assert!(Error::from(ledger_core::Error::LockTimeout(AccountId::new("a"))).is_retryable());
        assert!(!Error::NotEligible("no".into()).is_retryable());
    }
}
