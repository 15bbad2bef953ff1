//! Teller
//!
//! Customer-facing sessions over a shared bank.
//!
//! A [`Teller`] holds a [`bank_core::BankHandle`] and the account that is
//! currently logged in. It turns requests such as "pay bob $20" into
//! transactions, hands them to the bank and reports the outcome.
//!
//! # Example
//!
//! ```no_run
//! use bank_core::{spawn_bank_actor, Bank, Config};
//! use std::sync::Arc;
//! use teller::Teller;
//!
//! #[tokio::main]
//! async fn main() -> teller::Result<()> {
//!     let config = Config::default();
//!     let bank = Arc::new(Bank::open(&config)?);
//!     let reference = bank.reference_currency();
//!     let handle = spawn_bank_actor(bank, &config.actor);
//!
//!     let mut teller = Teller::new(handle, reference, config.accounts.max_login_attempts);
//!     let opened = teller.open_account("alice").await?;
//!     println!("Account {} opened, PIN {}", opened.account_id, opened.pin);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod command;
pub mod error;
pub mod session;

// Re-exports
pub use command::Command;
pub use error::{Error, Result};
pub use session::{NewAccount, Report, Teller};
