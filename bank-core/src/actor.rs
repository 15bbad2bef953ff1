//! Actor front-end for the bank
//!
//! One Tokio task owns the write path: every request is a message in a
//! bounded mailbox, answered through a oneshot channel. Changes are flushed
//! to storage on a timer while the bank is dirty, on request, and on
//! shutdown.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Teller sessions / CLI / tests                │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │                BankHandle (Clone)                     │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               BankActor (Single Task)                 │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │ dirty flag                                     │  │
//! │  │ Timer: flush_interval → Bank::flush()          │  │
//! │  └────────────────────────────────────────────────┘  │
//! │                       │                               │
//! │                       ▼                               │
//! │           Storage::commit(batch)                      │
//! │          (atomic write to RocksDB)                    │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::bank::{AccountSummary, Bank};
use crate::config::ActorConfig;
use crate::error::{Rejection, Verdict};
use crate::types::{AccountId, Balance, Money};
use crate::{Account, Error, Result, Transaction};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Message sent to the bank actor
#[derive(Debug)]
pub enum BankMessage {
    /// Open a new account
    CreateAccount {
        name: String,
        response: oneshot::Sender<std::result::Result<AccountId, Rejection>>,
    },

    /// Delete an account
    DeleteAccount {
        account_id: AccountId,
        response: oneshot::Sender<std::result::Result<Account, Rejection>>,
    },

    /// Pay out the balance to the house and delete the account
    SettleAndDelete {
        account_id: AccountId,
        response: oneshot::Sender<std::result::Result<(Account, Money), Rejection>>,
    },

    /// Rename an account
    RenameAccount {
        account_id: AccountId,
        name: String,
        response: oneshot::Sender<Verdict>,
    },

    /// Set an account's PIN
    SetPin {
        account_id: AccountId,
        pin: String,
        response: oneshot::Sender<Verdict>,
    },

    /// Check an account's PIN
    CheckPin {
        account_id: AccountId,
        pin: String,
        response: oneshot::Sender<bool>,
    },

    /// Verify without applying
    VerifyTransaction {
        transaction: Transaction,
        response: oneshot::Sender<Verdict>,
    },

    /// Verify and apply
    CompleteTransaction {
        transaction: Transaction,
        response: oneshot::Sender<std::result::Result<Arc<Transaction>, Rejection>>,
    },

    /// Get balance
    GetBalance {
        account_id: AccountId,
        response: oneshot::Sender<Option<Balance>>,
    },

    /// Get account snapshot
    GetAccount {
        account_id: AccountId,
        response: oneshot::Sender<Option<Account>>,
    },

    /// Find an account by name
    FindByName {
        name: String,
        response: oneshot::Sender<Option<AccountId>>,
    },

    /// List live accounts
    ListAccounts {
        response: oneshot::Sender<Vec<AccountSummary>>,
    },

    /// Last status message
    Status { response: oneshot::Sender<String> },

    /// Flush immediately
    Flush {
        response: oneshot::Sender<Result<usize>>,
    },

    /// Flush and stop the actor
    Shutdown {
        response: oneshot::Sender<Result<usize>>,
    },
}

/// Actor that serializes all access to one [`Bank`]
#[derive(Debug)]
pub struct BankActor {
    bank: Arc<Bank>,
    mailbox: mpsc::Receiver<BankMessage>,
    flush_interval: Option<Duration>,
    dirty: bool,
}

impl BankActor {
    /// Create new actor
    pub fn new(
        bank: Arc<Bank>,
        mailbox: mpsc::Receiver<BankMessage>,
        flush_interval: Option<Duration>,
    ) -> Self {
        Self {
            bank,
            mailbox,
            flush_interval,
            dirty: false,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let periodic = self.flush_interval.is_some();
        let mut flush_timer = interval(self.flush_interval.unwrap_or(Duration::from_secs(60)));
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_reply = None;

        loop {
            tokio::select! {
                Some(msg) = self.mailbox.recv() => {
                    match msg {
                        BankMessage::Shutdown { response } => {
                            shutdown_reply = Some((response, self.flush()));
                            break;
                        }
                        msg => self.handle_message(msg),
                    }
                }

                _ = flush_timer.tick(), if periodic && self.dirty => {
                    if let Err(e) = self.flush() {
                        tracing::error!("Error flushing bank on timer: {}", e);
                    }
                }

                // Every handle dropped
                else => {
                    if self.dirty {
                        if let Err(e) = self.flush() {
                            tracing::error!("Error flushing bank on close: {}", e);
                        }
                    }
                    break;
                }
            }
        }

        // Release the bank before answering so a caller may reopen the store
        let Self { bank, mailbox, .. } = self;
        drop(mailbox);
        drop(bank);
        tracing::info!("Bank actor stopped");

        if let Some((response, result)) = shutdown_reply {
            let _ = response.send(result);
        }
    }

    fn handle_message(&mut self, msg: BankMessage) {
        match msg {
            BankMessage::CreateAccount { name, response } => {
                let result = self.bank.create_account(&name);
                self.dirty |= result.is_ok();
                let _ = response.send(result);
            }

            BankMessage::DeleteAccount {
                account_id,
                response,
            } => {
                let result = self.bank.delete_account(&account_id);
                self.dirty |= result.is_ok();
                let _ = response.send(result);
            }

            BankMessage::SettleAndDelete {
                account_id,
                response,
            } => {
                let result = self.bank.settle_and_delete(&account_id);
                self.dirty |= result.is_ok();
                let _ = response.send(result);
            }

            BankMessage::RenameAccount {
                account_id,
                name,
                response,
            } => {
                let result = self.bank.rename_account(&account_id, &name);
                self.dirty |= result.is_ok();
                let _ = response.send(result);
            }

            BankMessage::SetPin {
                account_id,
                pin,
                response,
            } => {
                let result = self.bank.set_pin(&account_id, &pin);
                self.dirty |= result.is_ok();
                let _ = response.send(result);
            }

            BankMessage::CheckPin {
                account_id,
                pin,
                response,
            } => {
                let _ = response.send(self.bank.check_pin(&account_id, &pin));
            }

            BankMessage::VerifyTransaction {
                transaction,
                response,
            } => {
                let _ = response.send(self.bank.verify_transaction(&transaction));
            }

            BankMessage::CompleteTransaction {
                transaction,
                response,
            } => {
                let result = self.bank.complete_transaction(transaction);
                self.dirty |= result.is_ok();
                let _ = response.send(result);
            }

            BankMessage::GetBalance {
                account_id,
                response,
            } => {
                let _ = response.send(self.bank.balance(&account_id));
            }

            BankMessage::GetAccount {
                account_id,
                response,
            } => {
                let _ = response.send(self.bank.account(&account_id));
            }

            BankMessage::FindByName { name, response } => {
                let _ = response.send(self.bank.find_by_name(&name));
            }

            BankMessage::ListAccounts { response } => {
                let _ = response.send(self.bank.accounts());
            }

            BankMessage::Status { response } => {
                let _ = response.send(self.bank.status());
            }

            BankMessage::Flush { response } => {
                let _ = response.send(self.flush());
            }

            BankMessage::Shutdown { .. } => {
                // Handled in main loop
            }
        }
    }

    fn flush(&mut self) -> Result<usize> {
        let operations = self.bank.flush()?;
        self.dirty = false;
        Ok(operations)
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct BankHandle {
    sender: mpsc::Sender<BankMessage>,
}

impl BankHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<BankMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> BankMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Open a new account
    pub async fn create_account(
        &self,
        name: impl Into<String>,
    ) -> Result<std::result::Result<AccountId, Rejection>> {
        let name = name.into();
        self.request(|response| BankMessage::CreateAccount { name, response })
            .await
    }

    /// Delete an account
    pub async fn delete_account(
        &self,
        account_id: AccountId,
    ) -> Result<std::result::Result<Account, Rejection>> {
        self.request(|response| BankMessage::DeleteAccount {
            account_id,
            response,
        })
        .await
    }

    /// Pay out the balance to the house and delete the account, atomically
    pub async fn settle_and_delete(
        &self,
        account_id: AccountId,
    ) -> Result<std::result::Result<(Account, Money), Rejection>> {
        self.request(|response| BankMessage::SettleAndDelete {
            account_id,
            response,
        })
        .await
    }

    /// Rename an account
    pub async fn rename_account(
        &self,
        account_id: AccountId,
        name: impl Into<String>,
    ) -> Result<Verdict> {
        let name = name.into();
        self.request(|response| BankMessage::RenameAccount {
            account_id,
            name,
            response,
        })
        .await
    }

    /// Set an account's PIN
    pub async fn set_pin(&self, account_id: AccountId, pin: impl Into<String>) -> Result<Verdict> {
        let pin = pin.into();
        self.request(|response| BankMessage::SetPin {
            account_id,
            pin,
            response,
        })
        .await
    }

    /// Check an account's PIN
    pub async fn check_pin(&self, account_id: AccountId, pin: impl Into<String>) -> Result<bool> {
        let pin = pin.into();
        self.request(|response| BankMessage::CheckPin {
            account_id,
            pin,
            response,
        })
        .await
    }

    /// Verify a transaction without applying it
    pub async fn verify_transaction(&self, transaction: Transaction) -> Result<Verdict> {
        self.request(|response| BankMessage::VerifyTransaction {
            transaction,
            response,
        })
        .await
    }

    /// Verify and apply a transaction
    pub async fn complete_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<std::result::Result<Arc<Transaction>, Rejection>> {
        self.request(|response| BankMessage::CompleteTransaction {
            transaction,
            response,
        })
        .await
    }

    /// Get balance
    pub async fn balance(&self, account_id: AccountId) -> Result<Option<Balance>> {
        self.request(|response| BankMessage::GetBalance {
            account_id,
            response,
        })
        .await
    }

    /// Get account snapshot
    pub async fn account(&self, account_id: AccountId) -> Result<Option<Account>> {
        self.request(|response| BankMessage::GetAccount {
            account_id,
            response,
        })
        .await
    }

    /// Find an account by name
    pub async fn find_by_name(&self, name: impl Into<String>) -> Result<Option<AccountId>> {
        let name = name.into();
        self.request(|response| BankMessage::FindByName { name, response })
            .await
    }

    /// List live accounts
    pub async fn accounts(&self) -> Result<Vec<AccountSummary>> {
        self.request(|response| BankMessage::ListAccounts { response })
            .await
    }

    /// Last status message
    pub async fn status(&self) -> Result<String> {
        self.request(|response| BankMessage::Status { response })
            .await
    }

    /// Flush immediately
    pub async fn flush(&self) -> Result<usize> {
        self.request(|response| BankMessage::Flush { response })
            .await?
    }

    /// Flush and stop the actor
    pub async fn shutdown(&self) -> Result<usize> {
        self.request(|response| BankMessage::Shutdown { response })
            .await?
    }
}

/// Spawn the bank actor
pub fn spawn_bank_actor(bank: Arc<Bank>, config: &ActorConfig) -> BankHandle {
    let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1)); // Bounded channel for backpressure
    let flush_interval =
        (config.flush_interval_ms > 0).then(|| Duration::from_millis(config.flush_interval_ms));
    let actor = BankActor::new(bank, rx, flush_interval);

    tokio::spawn(async move {
        actor.run().await;
    });

    BankHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CurrencyTable;
    use crate::Config;
    use rust_decimal::Decimal;

    fn in_memory() -> BankHandle {
        let bank = Arc::new(Bank::in_memory(CurrencyTable::iso4217()).unwrap());
        spawn_bank_actor(bank, &ActorConfig::default())
    }

    fn deposit(to: &AccountId, dollars: i64) -> Transaction {
        let usd = CurrencyTable::iso4217()
            .money(Decimal::from(dollars), "USD")
            .unwrap();
        Transaction::builder(usd).receiver(to.clone()).build().unwrap()
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let handle = in_memory();
        assert_eq!(handle.shutdown().await.unwrap(), 0);

        // Mailbox is gone after shutdown
        assert!(matches!(
            handle.status().await,
            Err(Error::Concurrency(_))
        ));
    }

    #[tokio::test]
    async fn test_actor_account_lifecycle() {
        let handle = in_memory();

        let alice = handle.create_account("alice").await.unwrap().unwrap();
        assert_eq!(
            handle.create_account("alice").await.unwrap(),
            Err(Rejection::DuplicateAccount("alice".to_string()))
        );
        assert_eq!(handle.find_by_name("alice").await.unwrap(), Some(alice.clone()));

        handle
            .complete_transaction(deposit(&alice, 40))
            .await
            .unwrap()
            .unwrap();
        let balance = handle.balance(alice.clone()).await.unwrap().unwrap();
        assert_eq!(balance.as_money().unwrap().amount(), Decimal::from(40));

        handle.delete_account(alice.clone()).await.unwrap().unwrap();
        assert!(handle.account(alice).await.unwrap().is_none());
        assert_eq!(handle.accounts().await.unwrap().len(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_verify_does_not_apply() {
        let handle = in_memory();
        let alice = handle.create_account("alice").await.unwrap().unwrap();

        let verdict = handle.verify_transaction(deposit(&alice, 5)).await.unwrap();
        assert_eq!(verdict, Ok(()));
        assert!(handle.account(alice).await.unwrap().unwrap().is_empty());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_flushes_to_storage() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };

        let alice = {
            let bank = Arc::new(Bank::open(&config).unwrap());
            let handle = spawn_bank_actor(bank, &config.actor);
            let alice = handle.create_account("alice").await.unwrap().unwrap();
            handle
                .complete_transaction(deposit(&alice, 100))
                .await
                .unwrap()
                .unwrap();

            assert!(handle.shutdown().await.unwrap() > 0);
            alice
        };

        let reopened = Bank::open(&config).unwrap();
        let balance = reopened.balance(&alice).unwrap();
        assert_eq!(balance.as_money().unwrap().amount(), Decimal::from(100));
        assert!(reopened.quarantined().is_empty());
    }
}
