//! Transactions: one-shot directional movements of money
//!
//! A transaction is created pending by a caller, validated by the bank and
//! marked completed exactly once. Direction is carried by which account is
//! sending and which is receiving; the amount is always positive.

use crate::types::{AccountId, Currency, Money, REFERENCE_CURRENCY};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use uuid::Uuid;

/// Movement of money between two accounts (or one account and the outside)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: Uuid,
    amount: Money,
    sending_account: Option<AccountId>,
    receiving_account: Option<AccountId>,
    timestamp: DateTime<Utc>,
    description: String,
    completed: bool,
    usd_equivalent: Money,
}

/// Effect of a transaction on one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Money flows in
    Credit,
    /// Money flows out
    Debit,
}

impl Transaction {
    /// Start building a pending transaction
    pub fn builder(amount: Money) -> TransactionBuilder {
        TransactionBuilder {
            amount,
            sending_account: None,
            receiving_account: None,
            timestamp: None,
            description: None,
            usd_rate: None,
        }
    }

    /// Rebuild a completed transaction from persisted parts
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: Uuid,
        amount: Money,
        usd_equivalent: Money,
        sending_account: Option<AccountId>,
        receiving_account: Option<AccountId>,
        timestamp: DateTime<Utc>,
        description: String,
        completed: bool,
    ) -> Result<Self> {
        if !amount.is_positive() || !usd_equivalent.is_positive() {
            return Err(Error::InvalidAmount(amount.to_string()));
        }
        if usd_equivalent.currency().code() != REFERENCE_CURRENCY {
            return Err(Error::CurrencyMismatch {
                left: REFERENCE_CURRENCY.to_string(),
                right: usd_equivalent.currency().code().to_string(),
            });
        }
        if sending_account.is_none() && receiving_account.is_none() {
            return Err(Error::NoParticipants);
        }

        Ok(Self {
            id,
            amount,
            sending_account,
            receiving_account,
            timestamp,
            description,
            completed,
            usd_equivalent,
        })
    }

    /// Unique id (UUIDv7, time ordered)
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Amount in the transaction currency
    pub fn amount(&self) -> &Money {
        &self.amount
    }

    /// Amount in USD at the rate given at construction
    pub fn usd_equivalent(&self) -> &Money {
        &self.usd_equivalent
    }

    /// Sending account (None = external world)
    pub fn sending_account(&self) -> Option<&AccountId> {
        self.sending_account.as_ref()
    }

    /// Receiving account (None = external world)
    pub fn receiving_account(&self) -> Option<&AccountId> {
        self.receiving_account.as_ref()
    }

    /// When the transaction was requested
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Free-form description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the bank has applied this transaction
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// True if `account` is sender or receiver
    pub fn involves(&self, account: &AccountId) -> bool {
        self.direction_for(account).is_some()
    }

    /// Credit or debit from the point of view of `account`
    pub fn direction_for(&self, account: &AccountId) -> Option<Direction> {
        if self.receiving_account.as_ref() == Some(account) {
            Some(Direction::Credit)
        } else if self.sending_account.as_ref() == Some(account) {
            Some(Direction::Debit)
        } else {
            None
        }
    }

    /// Signed USD effect on `account` (+ credit, - debit)
    pub fn signed_usd_for(&self, account: &AccountId) -> Option<Decimal> {
        self.direction_for(account).map(|direction| match direction {
            Direction::Credit => self.usd_equivalent.amount(),
            Direction::Debit => -self.usd_equivalent.amount(),
        })
    }

    /// The other side of the transaction for `account`
    pub fn counterparty_of(&self, account: &AccountId) -> Option<&AccountId> {
        match self.direction_for(account)? {
            Direction::Credit => self.sending_account.as_ref(),
            Direction::Debit => self.receiving_account.as_ref(),
        }
    }

    /// Fill in the sender for an external deposit
    pub(crate) fn with_sender(mut self, sender: AccountId) -> Self {
        self.sending_account = Some(sender);
        self
    }

    /// One-shot pending -> completed transition
    pub(crate) fn mark_completed(&mut self) -> Result<()> {
        if self.completed {
            return Err(Error::AlreadyCompleted(self.id));
        }
        self.completed = true;
        Ok(())
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |account: Option<&AccountId>| {
            account.map_or_else(|| "external".to_string(), |id| id.to_string())
        };

        write!(
            f,
            "{} {} from {} to {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.amount,
            side(self.sending_account.as_ref()),
            side(self.receiving_account.as_ref()),
        )?;
        if !self.description.is_empty() {
            write!(f, " ({})", self.description)?;
        }
        Ok(())
    }
}

/// Builder for pending transactions
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    amount: Money,
    sending_account: Option<AccountId>,
    receiving_account: Option<AccountId>,
    timestamp: Option<DateTime<Utc>>,
    description: Option<String>,
    usd_rate: Option<(Currency, Decimal)>,
}

impl TransactionBuilder {
    /// Sending account
    pub fn sender(mut self, account: AccountId) -> Self {
        self.sending_account = Some(account);
        self
    }

    /// Receiving account
    pub fn receiver(mut self, account: AccountId) -> Self {
        self.receiving_account = Some(account);
        self
    }

    /// Override the timestamp (defaults to now)
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Rate from the transaction currency to USD
    pub fn usd_rate(mut self, usd: Currency, rate: Decimal) -> Self {
        self.usd_rate = Some((usd, rate));
        self
    }

    /// Validate and create the pending transaction
    pub fn build(self) -> Result<Transaction> {
        if !self.amount.is_positive() {
            return Err(Error::InvalidAmount(format!(
                "{} must be greater than zero",
                self.amount
            )));
        }

        if self.sending_account.is_none() && self.receiving_account.is_none() {
            return Err(Error::NoParticipants);
        }

        let usd_equivalent = match self.usd_rate {
            Some((usd, rate)) => {
                if usd.code() != REFERENCE_CURRENCY {
                    return Err(Error::InvalidCurrency(usd.code().to_string()));
                }
                self.amount.convert(&usd, rate)?
            }
            None if self.amount.currency().code() == REFERENCE_CURRENCY => self.amount.clone(),
            None => {
                return Err(Error::MissingConversionRate(
                    self.amount.currency().code().to_string(),
                ))
            }
        };

        if !usd_equivalent.is_positive() {
            return Err(Error::InvalidAmount(format!(
                "{} rounds to {}",
                self.amount, usd_equivalent
            )));
        }

        Ok(Transaction {
            id: Uuid::now_v7(),
            amount: self.amount,
            sending_account: self.sending_account,
            receiving_account: self.receiving_account,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            description: self.description.unwrap_or_default(),
            completed: false,
            usd_equivalent,
        })
    }
}
