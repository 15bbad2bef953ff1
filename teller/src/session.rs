//! Teller sessions

use crate::{Error, Result};
use bank_core::{AccountId, Balance, BankHandle, Currency, Money, Rejection, Transaction};
use rand::Rng;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

/// Outcome of a business operation, ready to show to a customer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Whether the operation went through
    pub success: bool,
    /// Human readable status
    pub message: String,
}

impl Report {
    /// Successful outcome
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Failed outcome
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl From<Rejection> for Report {
    fn from(rejection: Rejection) -> Self {
        Self::failure(rejection.to_string())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Credentials of a freshly opened account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    /// Account number
    pub account_id: AccountId,
    /// Four digit PIN
    pub pin: String,
}

/// One customer session
#[derive(Debug)]
pub struct Teller {
    bank: BankHandle,
    reference: Currency,
    active: Option<AccountId>,
    failed_logins: u32,
    max_login_attempts: u32,
}

impl Teller {
    /// New session, nobody logged in
    pub fn new(bank: BankHandle, reference: Currency, max_login_attempts: u32) -> Self {
        Self {
            bank,
            reference,
            active: None,
            failed_logins: 0,
            max_login_attempts: max_login_attempts.max(1),
        }
    }

    /// Logged-in account, if any
    pub fn active(&self) -> Option<&AccountId> {
        self.active.as_ref()
    }

    fn require_login(&self) -> Result<AccountId> {
        self.active.clone().ok_or(Error::NotLoggedIn)
    }

    /// Open an account, issue a PIN and log in to it
    pub async fn open_account(&mut self, name: &str) -> Result<NewAccount> {
        let account_id = self.bank.create_account(name).await??;

        let pin = format!("{:04}", rand::thread_rng().gen_range(0..10_000));
        self.bank.set_pin(account_id.clone(), pin.clone()).await??;

        tracing::info!(account_id = %account_id, "Account opened at teller");
        self.active = Some(account_id.clone());

        Ok(NewAccount { account_id, pin })
    }

    /// Log in with account number and PIN
    ///
    /// The session locks after the configured number of failures.
    pub async fn log_in(&mut self, account_id: AccountId, pin: &str) -> Result<Report> {
        if self.failed_logins >= self.max_login_attempts {
            return Err(Error::LockedOut);
        }

        if self.bank.check_pin(account_id.clone(), pin).await? {
            self.failed_logins = 0;
            self.active = Some(account_id.clone());
            return Ok(Report::success(format!("Logged in to account {}", account_id)));
        }

        self.failed_logins += 1;
        tracing::warn!(account_id = %account_id, attempts = self.failed_logins, "Failed login");

        let remaining = self.max_login_attempts - self.failed_logins;
        if remaining == 0 {
            return Err(Error::LockedOut);
        }
        Ok(Report::failure(format!(
            "{}, {} attempts left",
            Rejection::IncorrectPin,
            remaining
        )))
    }

    /// Log out
    pub fn log_out(&mut self) -> Report {
        match self.active.take() {
            Some(account_id) => Report::success(format!("Logged out of account {}", account_id)),
            None => Report::failure("No account is logged in"),
        }
    }

    /// Balance of the logged-in account
    pub async fn balance(&self) -> Result<Balance> {
        let account_id = self.require_login()?;
        self.bank
            .balance(account_id.clone())
            .await?
            .ok_or(Error::Rejected(Rejection::UnknownAccount(account_id)))
    }

    /// History of the logged-in account, oldest first
    pub async fn statement(&self) -> Result<Vec<Arc<Transaction>>> {
        let account_id = self.require_login()?;
        let account = self
            .bank
            .account(account_id.clone())
            .await?
            .ok_or(Error::Rejected(Rejection::UnknownAccount(account_id)))?;
        Ok(account.transactions().to_vec())
    }

    /// Pay from the logged-in account
    ///
    /// `to = None` pays the outside world, which the bank books against
    /// the house account. Foreign amounts need `usd_rate`.
    pub async fn pay(
        &self,
        to: Option<AccountId>,
        amount: Money,
        usd_rate: Option<Decimal>,
        description: &str,
    ) -> Result<Report> {
        let from = self.require_login()?;
        let builder = Transaction::builder(amount)
            .sender(from)
            .receiver(to.unwrap_or_else(AccountId::house))
            .description(description);

        self.submit(self.build(builder, usd_rate)?).await
    }

    /// Receive money from the outside world into the logged-in account
    pub async fn receive(
        &self,
        amount: Money,
        usd_rate: Option<Decimal>,
        description: &str,
    ) -> Result<Report> {
        let to = self.require_login()?;
        let builder = Transaction::builder(amount)
            .receiver(to)
            .description(description);

        self.submit(self.build(builder, usd_rate)?).await
    }

    /// Finish a transaction; bad amounts and rates are the caller's input
    fn build(
        &self,
        builder: bank_core::TransactionBuilder,
        usd_rate: Option<Decimal>,
    ) -> Result<Transaction> {
        let builder = match usd_rate {
            Some(rate) => builder.usd_rate(self.reference.clone(), rate),
            None => builder,
        };

        builder.build().map_err(|e| match e {
            bank_core::Error::InvalidAmount(_)
            | bank_core::Error::InvalidRate(_)
            | bank_core::Error::MissingConversionRate(_)
            | bank_core::Error::InvalidCurrency(_)
            | bank_core::Error::CurrencyMismatch { .. }
            | bank_core::Error::Overflow => Error::InvalidInput(e.to_string()),
            other => Error::Bank(other),
        })
    }

    async fn submit(&self, transaction: Transaction) -> Result<Report> {
        Ok(match self.bank.complete_transaction(transaction).await? {
            Ok(completed) => Report::success(format!(
                "The transaction completed successfully ({})",
                completed.usd_equivalent()
            )),
            Err(rejection) => rejection.into(),
        })
    }

    /// Rename the logged-in account
    pub async fn rename(&self, name: &str) -> Result<Report> {
        let account_id = self.require_login()?;
        Ok(match self.bank.rename_account(account_id, name).await? {
            Ok(()) => Report::success(format!("Account renamed to {}", name.trim())),
            Err(rejection) => rejection.into(),
        })
    }

    /// Replace the logged-in account's PIN
    pub async fn change_pin(&self, pin: &str) -> Result<Report> {
        let account_id = self.require_login()?;
        Ok(match self.bank.set_pin(account_id, pin).await? {
            Ok(()) => Report::success("PIN changed"),
            Err(rejection) => rejection.into(),
        })
    }

    /// Close the logged-in account
    ///
    /// A positive balance is paid out to the house in the same bank step
    /// that removes the account; the session is logged out afterwards.
    pub async fn delete_account(&mut self) -> Result<Report> {
        let account_id = self.require_login()?;

        match self.bank.settle_and_delete(account_id).await? {
            Ok((closed, payout)) => {
                self.active = None;
                Ok(Report::success(format!(
                    "Account {} closed, {} paid out",
                    closed.name(),
                    payout
                )))
            }
            Err(rejection) => Ok(rejection.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bank_core::config::ActorConfig;
    use bank_core::{spawn_bank_actor, Bank, CurrencyTable};

    fn teller() -> (Teller, BankHandle) {
        let table = CurrencyTable::iso4217();
        let reference = table.reference();
        let bank = Arc::new(Bank::in_memory(table).unwrap());
        let handle = spawn_bank_actor(bank, &ActorConfig::default());
        (Teller::new(handle.clone(), reference, 5), handle)
    }

    fn usd(dollars: i64) -> Money {
        CurrencyTable::iso4217()
            .money(Decimal::from(dollars), "USD")
            .unwrap()
    }

    fn amount(balance: Balance) -> Decimal {
        balance.as_money().unwrap().amount()
    }

    #[tokio::test]
    async fn test_open_account_logs_in() {
        let (mut teller, _handle) = teller();

        let opened = teller.open_account("alice").await.unwrap();
        assert_eq!(opened.pin.len(), 4);
        assert_eq!(teller.active(), Some(&opened.account_id));
        assert_eq!(amount(teller.balance().await.unwrap()), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_open_duplicate_is_rejected() {
        let (mut teller, _handle) = teller();
        teller.open_account("alice").await.unwrap();

        let result = teller.open_account("alice").await;
        assert!(matches!(
            result,
            Err(Error::Rejected(Rejection::DuplicateAccount(_)))
        ));
    }

    #[tokio::test]
    async fn test_requires_login() {
        let (teller, _handle) = teller();
        assert!(matches!(teller.balance().await, Err(Error::NotLoggedIn)));
        assert!(matches!(
            teller.pay(None, usd(1), None, "").await,
            Err(Error::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn test_receive_and_pay() {
        let (mut teller, handle) = teller();
        let bob = teller.open_account("bob").await.unwrap();
        let alice = teller.open_account("alice").await.unwrap();

        let report = teller.receive(usd(100), None, "salary").await.unwrap();
        assert!(report.success);

        let report = teller
            .pay(Some(bob.account_id.clone()), usd(30), None, "rent")
            .await
            .unwrap();
        assert!(report.success, "{}", report);

        let report = teller
            .pay(Some(bob.account_id.clone()), usd(500), None, "car")
            .await
            .unwrap();
        assert!(!report.success);
        assert!(report.message.contains("could not be completed"));

        assert_eq!(amount(teller.balance().await.unwrap()), Decimal::from(70));
        assert_eq!(teller.statement().await.unwrap().len(), 2);

        let bob_balance = handle.balance(bob.account_id).await.unwrap().unwrap();
        assert_eq!(amount(bob_balance), Decimal::from(30));
        assert_eq!(teller.active(), Some(&alice.account_id));
    }

    #[tokio::test]
    async fn test_login_lockout() {
        let (mut teller, _handle) = teller();
        let alice = teller.open_account("alice").await.unwrap();
        teller.log_out();

        let wrong = if alice.pin == "0000" { "1111" } else { "0000" };
        for _ in 0..4 {
            let report = teller.log_in(alice.account_id.clone(), wrong).await.unwrap();
            assert!(!report.success);
            assert!(report.message.starts_with(&Rejection::IncorrectPin.to_string()));
        }
        assert!(matches!(
            teller.log_in(alice.account_id.clone(), wrong).await,
            Err(Error::LockedOut)
        ));
        assert!(matches!(
            teller.log_in(alice.account_id.clone(), &alice.pin).await,
            Err(Error::LockedOut)
        ));
        assert!(teller.active().is_none());
    }

    #[tokio::test]
    async fn test_login_with_correct_pin() {
        let (mut teller, _handle) = teller();
        let alice = teller.open_account("alice").await.unwrap();
        teller.log_out();

        let report = teller
            .log_in(alice.account_id.clone(), &alice.pin)
            .await
            .unwrap();
        assert!(report.success);
        assert_eq!(teller.active(), Some(&alice.account_id));
    }

    #[tokio::test]
    async fn test_delete_account_pays_out_balance() {
        let (mut teller, handle) = teller();
        let alice = teller.open_account("alice").await.unwrap();
        teller.receive(usd(25), None, "").await.unwrap();

        let report = teller.delete_account().await.unwrap();
        assert!(report.success, "{}", report);
        assert!(teller.active().is_none());
        assert!(handle.account(alice.account_id).await.unwrap().is_none());

        let house = handle.account(AccountId::house()).await.unwrap().unwrap();
        assert_eq!(house.ledger_total(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_invalid_amounts_are_recoverable() {
        let (mut teller, handle) = teller();
        let bob = teller.open_account("bob").await.unwrap();
        teller.open_account("alice").await.unwrap();
        teller.receive(usd(10), None, "").await.unwrap();

        assert!(matches!(
            teller.receive(usd(0), None, "").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            teller.pay(None, usd(-5), None, "").await,
            Err(Error::InvalidInput(_))
        ));
        let tenth_of_cent = Money::new(Decimal::new(1, 3), teller.reference.clone());
        assert!(matches!(
            teller.pay(Some(bob.account_id), tenth_of_cent, None, "").await,
            Err(Error::InvalidInput(_))
        ));

        // Session and bank carry on
        assert!(teller.pay(None, usd(4), None, "").await.unwrap().success);
        assert_eq!(amount(teller.balance().await.unwrap()), Decimal::from(6));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_races_with_incoming_payment() {
        let (mut alice_teller, handle) = teller();
        let mut bob_teller = Teller::new(handle.clone(), alice_teller.reference.clone(), 5);

        let alice = alice_teller.open_account("alice").await.unwrap();
        alice_teller.receive(usd(25), None, "").await.unwrap();
        bob_teller.open_account("bob").await.unwrap();
        bob_teller.receive(usd(10), None, "").await.unwrap();

        let incoming = bob_teller.pay(Some(alice.account_id.clone()), usd(10), None, "gift");
        let (closed, paid) = tokio::join!(alice_teller.delete_account(), incoming);
        assert!(closed.unwrap().success);
        let paid = paid.unwrap();

        // Either the gift landed before the close and was paid out, or it
        // bounced off a missing account; no money disappears
        let house = handle.account(AccountId::house()).await.unwrap().unwrap();
        let bob_total = amount(bob_teller.balance().await.unwrap());
        assert_eq!(house.ledger_total() + bob_total, Decimal::ZERO);
        assert_eq!(bob_total, if paid.success { Decimal::ZERO } else { Decimal::from(10) });
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_rename_and_change_pin() {
        let (mut teller, handle) = teller();
        let alice = teller.open_account("alice").await.unwrap();

        assert!(teller.rename("Alicia").await.unwrap().success);
        assert!(!teller.change_pin("12").await.unwrap().success);
        assert!(teller.change_pin("98765").await.unwrap().success);
        assert!(handle
            .check_pin(alice.account_id.clone(), "98765")
            .await
            .unwrap());

        let account = handle.account(alice.account_id).await.unwrap().unwrap();
        assert_eq!(account.name(), "Alicia");
    }
}
