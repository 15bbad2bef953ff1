//! House Ledger bank core
//!
//! In-memory double-entry bank with exact decimal money, a house account
//! with unlimited funds and RocksDB-backed persistence.
//!
//! # Architecture
//!
//! - **Exact money**: `rust_decimal` amounts quantized to each currency's minor units
//! - **Double entry**: every completed transaction sits in both participants' histories
//! - **Single lock**: verify and apply happen under one write guard
//! - **Single writer**: an optional Tokio actor serializes requests and flushes
//!
//! # Invariants
//!
//! - Money conservation: the sum of all balances, house included, is zero
//! - A balance always equals the fold of its history
//! - Transactions complete at most once
//! - Accounts failing reconciliation on load are quarantined, never half-loaded

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod account;
pub mod actor;
pub mod bank;
pub mod config;
pub mod error;
pub mod metrics;
pub mod storage;
pub mod transaction;
pub mod types;

// Re-exports
pub use account::{Account, HOUSE_ACCOUNT_NAME};
pub use actor::{spawn_bank_actor, BankHandle};
pub use bank::{AccountSummary, Bank, QuarantinedAccount};
pub use config::Config;
pub use error::{Error, Rejection, Result, Verdict};
pub use metrics::Metrics;
pub use storage::Storage;
pub use transaction::{Direction, Transaction, TransactionBuilder};
pub use types::{AccountId, Balance, Currency, CurrencyTable, Money};
