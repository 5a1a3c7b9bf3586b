//! Wallet Ledger Core
//!
//! Durable per-account balance records (three pools) plus an append-only,
//! hash-chained ledger of every balance mutation.
//!
//! # Architecture
//!
//! - **Per-account critical sections**: mutations of one account run one at
//!   a time, different accounts run in parallel
//! - **Single commit point**: a multi-entry operation stages its entries in
//!   an [`AccountScope`] and writes them in one RocksDB `WriteBatch`
//! - **Idempotency index**: every entry is keyed by `(kind, reference)`;
//!   re-applying a key returns the original entry
//!
//! # Invariants
//!
//! - Balances never negative
//! - `balance(pool) == Σ(delta)` over the account's entries for that pool
//! - Every balance mutation has exactly one ledger entry
//! - Entries are never modified or deleted

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod metrics;
pub mod scope;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::{Ledger, Registration};
pub use scope::AccountScope;
pub use types::{
    round_charge, round_credit, Account, AccountId, Applied, Balances, EntryKind, LedgerEntry,
    Pool, ReconciliationReport, MAX_UPLINE_DEPTH, MONEY_SCALE,
};
