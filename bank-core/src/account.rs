//! Accounts and their append-only transaction history

use crate::transaction::Transaction;
use crate::types::{AccountId, Balance, Currency, Money};
use crate::{Error, Result};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Name of the house account
pub const HOUSE_ACCOUNT_NAME: &str = "Bank";

/// Minimum account name length (characters)
pub const MIN_NAME_LEN: usize = 3;

/// Maximum account name length (characters)
pub const MAX_NAME_LEN: usize = 64;

/// An account: identity, name and history
///
/// The balance is a running total of the signed USD effect of every applied
/// transaction; it always equals [`Account::recompute_total`].
#[derive(Debug, Clone)]
pub struct Account {
    id: AccountId,
    name: String,
    transactions: Vec<Arc<Transaction>>,
    running_total: Decimal,
    reference: Currency,
    pin_hash: Option<[u8; 32]>,
    house: bool,
}

impl Account {
    /// Create an empty account
    pub fn new(id: AccountId, name: &str, reference: Currency) -> Result<Self> {
        Ok(Self {
            id,
            name: validate_name(name)?,
            transactions: Vec::new(),
            running_total: Decimal::ZERO,
            reference,
            pin_hash: None,
            house: false,
        })
    }

    /// Create the house account
    pub fn house(reference: Currency) -> Self {
        Self {
            id: AccountId::house(),
            name: HOUSE_ACCOUNT_NAME.to_string(),
            transactions: Vec::new(),
            running_total: Decimal::ZERO,
            reference,
            pin_hash: None,
            house: true,
        }
    }

    /// Account number
    pub fn id(&self) -> &AccountId {
        &self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True for the house account
    pub fn is_house(&self) -> bool {
        self.house
    }

    /// History in completion order
    pub fn transactions(&self) -> &[Arc<Transaction>] {
        &self.transactions
    }

    /// Number of applied transactions
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// True if no transaction was applied yet
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Balance as reported to callers (unlimited for the house)
    pub fn balance(&self) -> Balance {
        if self.house {
            Balance::Unbounded
        } else {
            Balance::Finite(Money::new(self.running_total, self.reference.clone()))
        }
    }

    /// Signed running total in USD, also for the house account
    pub fn ledger_total(&self) -> Decimal {
        self.running_total
    }

    /// Fold over the full history
    pub fn recompute_total(&self) -> Result<Decimal> {
        self.transactions.iter().try_fold(Decimal::ZERO, |total, tx| {
            let signed = tx.signed_usd_for(&self.id).ok_or_else(|| Error::NotAParticipant {
                account: self.id.clone(),
                transaction: tx.id(),
            })?;
            total.checked_add(signed).ok_or(Error::Overflow)
        })
    }

    /// True if every transaction was in USD
    pub fn all_in_reference_currency(&self) -> bool {
        self.transactions
            .iter()
            .all(|tx| tx.amount().currency() == &self.reference)
    }

    /// Append a transaction to the history
    ///
    /// Performs no balance validation; that is the bank's job.
    pub fn apply(&mut self, transaction: Arc<Transaction>) -> Result<()> {
        let running_total = self.total_after(&transaction)?;
        self.commit(transaction, running_total);
        Ok(())
    }

    /// Running total once `transaction` is applied, without applying it
    pub(crate) fn total_after(&self, transaction: &Transaction) -> Result<Decimal> {
        let signed = transaction
            .signed_usd_for(&self.id)
            .ok_or_else(|| Error::NotAParticipant {
                account: self.id.clone(),
                transaction: transaction.id(),
            })?;

        self.running_total
            .checked_add(signed)
            .ok_or(Error::Overflow)
    }

    /// Infallible second half of [`Account::apply`]
    pub(crate) fn commit(&mut self, transaction: Arc<Transaction>, running_total: Decimal) {
        self.transactions.push(transaction);
        self.running_total = running_total;
    }

    /// Change the display name
    pub fn rename(&mut self, name: &str) -> Result<()> {
        self.name = validate_name(name)?;
        Ok(())
    }

    /// Set or replace the PIN
    pub fn set_pin(&mut self, pin: &str) -> Result<()> {
        if !(4..=8).contains(&pin.len()) || !pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidPin);
        }
        self.pin_hash = Some(hash_pin(&self.id, pin));
        Ok(())
    }

    /// Check a PIN; accounts without a PIN never match
    pub fn check_pin(&self, pin: &str) -> bool {
        self.pin_hash
            .map(|stored| stored == hash_pin(&self.id, pin))
            .unwrap_or(false)
    }

    pub(crate) fn pin_hash(&self) -> Option<[u8; 32]> {
        self.pin_hash
    }

    pub(crate) fn restore_pin_hash(&mut self, pin_hash: Option<[u8; 32]>) {
        self.pin_hash = pin_hash;
    }
}

/// Trim and validate an account name
pub fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let length = trimmed.chars().count();

    if length < MIN_NAME_LEN {
        return Err(Error::InvalidName(format!(
            "{:?} must be at least {} characters long",
            trimmed, MIN_NAME_LEN
        )));
    }
    if length > MAX_NAME_LEN {
        return Err(Error::InvalidName(format!(
            "name must be at most {} characters long",
            MAX_NAME_LEN
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(Error::InvalidName(format!(
            "{:?} contains control characters",
            trimmed
        )));
    }

    Ok(trimmed.to_string())
}

fn hash_pin(id: &AccountId, pin: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(id.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(pin.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CurrencyTable;
    use std::str::FromStr;

    fn usd() -> Currency {
        CurrencyTable::iso4217().reference()
    }

    fn transfer(from: u64, to: u64, amount: &str) -> Arc<Transaction> {
        let money = Money::new(Decimal::from_str(amount).unwrap(), usd());
        Arc::new(
            Transaction::builder(money)
                .sender(AccountId::from_number(from))
                .receiver(AccountId::from_number(to))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_name_validation() {
        assert!(Account::new(AccountId::from_number(1), "bob", usd()).is_ok());
        assert!(matches!(
            Account::new(AccountId::from_number(1), " al ", usd()),
            Err(Error::InvalidName(_))
        ));
        assert!(matches!(validate_name("bad\nname"), Err(Error::InvalidName(_))));
        assert_eq!(validate_name("  alice  ").unwrap(), "alice");
    }

    #[test]
    fn test_apply_updates_running_total() {
        let mut alice = Account::new(AccountId::from_number(1), "alice", usd()).unwrap();

        alice.apply(transfer(0, 1, "100.00")).unwrap();
        alice.apply(transfer(1, 2, "30.00")).unwrap();

        assert_eq!(alice.len(), 2);
        assert_eq!(alice.ledger_total(), Decimal::from_str("70.00").unwrap());
        assert_eq!(alice.recompute_total().unwrap(), alice.ledger_total());
        assert_eq!(
            alice.balance(),
            Balance::Finite(Money::new(Decimal::from(70), usd()))
        );
    }

    #[test]
    fn test_apply_rejects_non_participant() {
        let mut carol = Account::new(AccountId::from_number(3), "carol", usd()).unwrap();
        let result = carol.apply(transfer(1, 2, "5.00"));

        assert!(matches!(result, Err(Error::NotAParticipant { .. })));
        assert!(carol.is_empty());
        assert_eq!(carol.ledger_total(), Decimal::ZERO);
    }

    #[test]
    fn test_house_balance_is_unbounded() {
        let mut house = Account::house(usd());
        house.apply(transfer(0, 1, "100.00")).unwrap();

        assert!(house.balance().is_unbounded());
        assert_eq!(house.ledger_total(), Decimal::from_str("-100.00").unwrap());
    }

    #[test]
    fn test_pin() {
        let mut alice = Account::new(AccountId::from_number(1), "alice", usd()).unwrap();
        assert!(!alice.check_pin("1234"));
        assert!(matches!(alice.set_pin("12"), Err(Error::InvalidPin)));
        assert!(matches!(alice.set_pin("12ab"), Err(Error::InvalidPin)));

        alice.set_pin("4321").unwrap();
        assert!(alice.check_pin("4321"));
        assert!(!alice.check_pin("1234"));
    }
}
