//! Wallet Settlement Engine
//!
//! Deposits, withdrawals, referral-coin exchange and multi-level commission
//! on top of [`ledger_core`].
//!
//! # Architecture
//!
//! - **Deposit settlement**: operator-approved top-ups credited exactly once
//! - **Withdrawal settlement**: eligibility check, frozen fee, funds held at
//!   request time, compensating reversal on rejection
//! - **Exchange engine**: referral coins to spendable in one commit
//! - **Commission distributor**: 10/5/3/2% up four up-line levels, one
//!   account lock at a time, idempotent per level
//! - **Janitor**: deferred archival of settled deposit requests, never on
//!   the credit path
//!
//! Every multi-step mutation of one account is staged in a single
//! [`ledger_core::AccountScope`] and committed as one batch.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::AccountId;
//! use rust_decimal::Decimal;
//! use settlement::{Config, PolicySettings, StaticConfigStore, WalletEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> settlement::Result<()> {
//!     let store = Arc::new(StaticConfigStore::new(PolicySettings::default()));
//!     let engine = WalletEngine::open(Config::default(), store).await?;
//!
//!     let alice = AccountId::new("alice");
//!     engine.register_account(alice.clone(), "ALICE", None).await?;
//!
//!     let request = engine.submit_deposit(&alice, Decimal::from(1_000), "BANK-REF-1").await?;
//!     let entry = engine.approve_deposit(request.request_id).await?;
//!     println!("balance after deposit: {}", entry.balance_after);
//!
//!     engine.shutdown().await
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod commission;
pub mod config;
pub mod deposit;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod janitor;
pub mod metrics;
pub mod policy;
pub mod records;
pub mod types;
pub mod withdrawal;

pub use commission::{CommissionDistributor, COMMISSION_SCHEDULE};
pub use config::Config;
pub use engine::WalletEngine;
pub use error::{Error, Result};
pub use policy::{ConfigStore, PolicyReader, PolicySettings, StaticConfigStore};
pub use types::*;
