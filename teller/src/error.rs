//! Error types for teller sessions

use bank_core::Rejection;
use thiserror::Error;

/// Result type for teller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Teller errors
#[derive(Error, Debug)]
pub enum Error {
    /// Bank error
    #[error("Bank error: {0}")]
    Bank(#[from] bank_core::Error),

    /// The bank refused the request
    #[error("{0}")]
    Rejected(#[from] Rejection),

    /// Operation needs a logged-in account
    #[error("No account is logged in")]
    NotLoggedIn,

    /// Too many failed logins in this session
    #[error("Too many failed login attempts, session locked")]
    LockedOut,

    /// Malformed command or argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
