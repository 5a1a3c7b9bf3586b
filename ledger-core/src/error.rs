//! Error types for the ledger

use crate::types::{AccountId, Pool};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Debit would drive a pool below zero
    #[error("Insufficient funds in {pool} of {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Account debited
        account: AccountId,
        /// Pool debited
        pool: Pool,
        /// Balance before the debit
        available: Decimal,
        /// Absolute debit amount
        requested: Decimal,
    },

    /// Zero or out-of-scale amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Account already registered
    #[error("Account already exists: {0}")]
    AccountExists(AccountId),

    /// Account is deactivated
    #[error("Account is inactive: {0}")]
    AccountInactive(AccountId),

    /// Registration input rejected
    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    /// Referral code already taken
    #[error("Referral code already in use: {0}")]
    DuplicateReferralCode(String),

    /// Inviter code does not resolve to an account
    #[error("Unknown referral code: {0}")]
    UnknownReferralCode(String),

    /// Per-account lock not acquired in time
    #[error("Timed out waiting for account lock: {0}")]
    LockTimeout(AccountId),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Invariant violation (reconciliation, reference reuse, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Transient failures the caller may retry unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LockTimeout(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
