//! Error types for the bank core
//!
//! Two families live here:
//!
//! - [`Error`]: structurally invalid input and infrastructure failures.
//!   Returned through [`Result`] and propagated with `?`.
//! - [`Rejection`]: expected business-rule outcomes (insufficient funds,
//!   unknown account, duplicate name). The bank hands these back as
//!   values so an interactive caller can show them and carry on.

use crate::types::AccountId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for bank operations
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a business-rule check
pub type Verdict = std::result::Result<(), Rejection>;

/// Bank errors
#[derive(Error, Debug)]
pub enum Error {
    /// Currency code is not in the currency table
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    /// Cross-currency comparison or arithmetic
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        /// Currency of the left operand
        left: String,
        /// Currency of the right operand
        right: String,
    },

    /// Amount is not usable (non-positive, unparsable)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Conversion rate must be positive
    #[error("Invalid conversion rate: {0}")]
    InvalidRate(Decimal),

    /// Non-USD transaction built without a USD rate
    #[error("Missing USD conversion rate for {0}")]
    MissingConversionRate(String),

    /// Transaction with neither sender nor receiver
    #[error("Transaction has no participants")]
    NoParticipants,

    /// Account name failed validation
    #[error("Invalid account name: {0}")]
    InvalidName(String),

    /// PIN must be 4 to 8 digits
    #[error("Invalid PIN: must be 4 to 8 digits")]
    InvalidPin,

    /// Transaction applied to an account it does not involve
    #[error("Account {account} is not a participant of transaction {transaction}")]
    NotAParticipant {
        /// Account the transaction was applied to
        account: AccountId,
        /// Offending transaction
        transaction: uuid::Uuid,
    },

    /// Transaction was already marked completed
    #[error("Transaction {0} already completed")]
    AlreadyCompleted(uuid::Uuid),

    /// Decimal overflow
    #[error("Arithmetic overflow")]
    Overflow,

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

/// Business-rule failure reported by the bank
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Name belongs to the house account
    #[error("{0} is not an allowed account name")]
    ReservedName(String),

    /// Another account already uses this name
    #[error("An account named {0} already exists")]
    DuplicateAccount(String),

    /// Name failed validation
    #[error("Invalid account name: {0}")]
    InvalidName(String),

    /// Account id is not registered
    #[error("Account {0} was not found in this bank")]
    UnknownAccount(AccountId),

    /// The house account cannot be deleted or renamed
    #[error("The house account cannot be modified")]
    HouseAccount,

    /// Transaction has no receiving account
    #[error("The transaction could not be completed. No receiving account was provided")]
    MissingReceiver,

    /// Receiving account is not registered
    #[error("The transaction could not be completed. Receiving account {0} was not found in this bank")]
    UnknownReceiver(AccountId),

    /// Sending account is not registered
    #[error("The transaction could not be completed. Sending account {0} was not found in this bank")]
    UnknownSender(AccountId),

    /// Sender and receiver are the same account
    #[error("The transaction could not be completed. Sender and receiver are the same account")]
    SameAccount,

    /// Sender cannot cover the amount
    #[error("The transaction could not be completed. Balance of account {name} ({balance}) is not sufficient for {requested}")]
    InsufficientFunds {
        /// Sending account name
        name: String,
        /// Balance at verification time
        balance: Decimal,
        /// Requested amount (USD)
        requested: Decimal,
    },

    /// Transaction was completed before
    #[error("The transaction could not be completed. It was already completed")]
    AlreadyCompleted,

    /// Balance arithmetic would overflow
    #[error("The transaction could not be completed. Amount is too large")]
    Overflow,

    /// PIN must be 4 to 8 digits
    #[error("Invalid PIN: must be 4 to 8 digits")]
    InvalidPin,

    /// PIN does not match
    #[error("Incorrect account number or PIN")]
    IncorrectPin,

    /// No free account id could be found
    #[error("Could not allocate an account number")]
    IdSpaceExhausted,
}
