//! The bank: registry of accounts and the only place money moves
//!
//! All mutable state sits behind one `parking_lot::RwLock`. A transfer is
//! verified and applied to both participants under a single write guard, so
//! no reader ever observes a half-applied transaction.
//!
//! # Example
//!
//! ```no_run
//! use bank_core::{Bank, CurrencyTable, Money, Transaction};
//! use rust_decimal::Decimal;
//!
//! fn main() -> bank_core::Result<()> {
//!     let table = CurrencyTable::iso4217();
//!     let bank = Bank::in_memory(table.clone())?;
//!
//!     let alice = bank.create_account("alice").expect("fresh bank");
//!     let deposit = Transaction::builder(table.money(Decimal::from(100), "USD")?)
//!         .receiver(alice)
//!         .build()?;
//!     bank.complete_transaction(deposit).expect("house always covers");
//!
//!     Ok(())
//! }
//! ```

use crate::{
    account::{validate_name, Account, HOUSE_ACCOUNT_NAME},
    config::AccountsConfig,
    error::{Rejection, Verdict},
    storage::{IndexRecord, Storage, StoredTransaction},
    transaction::Transaction,
    types::{AccountId, Balance, Currency, CurrencyTable, Money, ACCOUNT_ID_SPACE},
    Config, Error, Metrics, Result,
};
use parking_lot::RwLock;
use rand::Rng;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// An account excluded from the live set because its stored data did not
/// reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantinedAccount {
    /// Account number
    pub account_id: AccountId,
    /// Display name from the index
    pub display_name: String,
    /// Why it failed
    pub reason: String,
}

/// Read-only view of one live account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    /// Account number
    pub account_id: AccountId,
    /// Display name
    pub name: String,
    /// Current balance
    pub balance: Balance,
    /// Number of applied transactions
    pub transaction_count: usize,
}

#[derive(Debug, Default)]
struct BankState {
    accounts: BTreeMap<AccountId, Account>,
    quarantined: BTreeMap<AccountId, QuarantinedAccount>,
    retired: BTreeSet<AccountId>,
    /// Deleted since the last flush
    pending_retire: BTreeSet<AccountId>,
    /// Stored history to be replaced wholesale on the next flush
    pending_rewrite: BTreeSet<AccountId>,
    /// History entries already on disk, per account
    persisted: HashMap<AccountId, usize>,
    last_status: String,
}

impl BankState {
    fn name_taken(&self, name: &str, except: Option<&AccountId>) -> bool {
        let live = self
            .accounts
            .values()
            .filter(|account| Some(account.id()) != except)
            .any(|account| account.name().eq_ignore_ascii_case(name));
        live || self
            .quarantined
            .values()
            .any(|account| account.display_name.eq_ignore_ascii_case(name))
    }

    fn id_available(&self, id: &AccountId) -> bool {
        *id != AccountId::house()
            && !self.accounts.contains_key(id)
            && !self.quarantined.contains_key(id)
            && !self.retired.contains(id)
    }
}

/// Registry of accounts
pub struct Bank {
    state: RwLock<BankState>,
    storage: Option<Storage>,
    table: CurrencyTable,
    policy: AccountsConfig,
    metrics: Metrics,
}

impl std::fmt::Debug for Bank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Bank")
            .field("accounts", &state.accounts.len())
            .field("quarantined", &state.quarantined.len())
            .field("storage", &self.storage)
            .finish()
    }
}

impl Bank {
    /// Bank with no persistence, holding only the house account
    pub fn in_memory(table: CurrencyTable) -> Result<Self> {
        let mut state = BankState::default();
        let house = Account::house(table.reference());
        state.accounts.insert(house.id().clone(), house);

        Self::assemble(state, None, table, AccountsConfig::default())
    }

    /// Open the bank's store and reconcile every persisted account
    pub fn open(config: &Config) -> Result<Self> {
        let table = config.load_currency_table()?;
        let storage = Storage::open(config)?;
        let state = Self::load(&storage, &table)?;

        tracing::info!(
            service = %config.service_name,
            accounts = state.accounts.len(),
            quarantined = state.quarantined.len(),
            "Bank opened"
        );

        Self::assemble(state, Some(storage), table, config.accounts.clone())
    }

    fn assemble(
        state: BankState,
        storage: Option<Storage>,
        table: CurrencyTable,
        policy: AccountsConfig,
    ) -> Result<Self> {
        let metrics = Metrics::new()?;
        metrics.update_accounts(state.accounts.len(), state.quarantined.len());

        Ok(Self {
            state: RwLock::new(state),
            storage,
            table,
            policy,
            metrics,
        })
    }

    // Loading

    fn load(storage: &Storage, table: &CurrencyTable) -> Result<BankState> {
        let mut state = BankState {
            retired: storage.load_retired()?.into_iter().collect(),
            ..BankState::default()
        };

        let scan = storage.load_index()?;
        let mut indexed: BTreeSet<AccountId> = scan
            .records
            .iter()
            .map(|record| record.account_id.clone())
            .collect();

        for unreadable in scan.unreadable {
            let Some(account_id) = AccountId::parse(&unreadable.key) else {
                tracing::error!(
                    key = %unreadable.key,
                    reason = %unreadable.reason,
                    "Unreadable index entry with malformed key, skipped"
                );
                continue;
            };
            tracing::error!(
                account_id = %account_id,
                reason = %unreadable.reason,
                "Unreadable index record, quarantined"
            );
            indexed.insert(account_id.clone());
            state.quarantined.insert(
                account_id.clone(),
                QuarantinedAccount {
                    account_id,
                    // Never a valid name, so it cannot collide
                    display_name: String::new(),
                    reason: format!("unreadable index record: {}", unreadable.reason),
                },
            );
        }

        let mut shared: HashMap<Uuid, Arc<Transaction>> = HashMap::new();

        for record in scan.records {
            let restored = match storage.load_history(&record.account_id) {
                Ok(history) => {
                    let persisted = history.len();
                    Self::restore_account(&record, history, &state, &indexed, &shared, table)
                        .map(|account| (account, persisted))
                }
                Err(Error::Serialization(e)) => Err(format!("unreadable history: {}", e)),
                Err(e) => return Err(e),
            };

            match restored {
                Ok((account, persisted)) => {
                    for tx in account.transactions() {
                        shared.entry(tx.id()).or_insert_with(|| tx.clone());
                    }
                    state.persisted.insert(account.id().clone(), persisted);
                    state.accounts.insert(account.id().clone(), account);
                }
                Err(reason) => {
                    tracing::error!(
                        account_id = %record.account_id,
                        name = %record.display_name,
                        reason = %reason,
                        "Account failed integrity check, quarantined"
                    );
                    state.quarantined.insert(
                        record.account_id.clone(),
                        QuarantinedAccount {
                            account_id: record.account_id,
                            display_name: record.display_name,
                            reason,
                        },
                    );
                }
            }
        }

        let house_id = AccountId::house();
        if !state.accounts.contains_key(&house_id) {
            let mut house = Account::house(table.reference());

            if state.quarantined.contains_key(&house_id) {
                // Rebuild from the counterparties that did load
                let mut mirrored: Vec<&Arc<Transaction>> = shared
                    .values()
                    .filter(|tx| tx.involves(&house_id))
                    .collect();
                mirrored.sort_by_key(|tx| (tx.timestamp(), tx.id()));
                for tx in mirrored {
                    house.apply(tx.clone())?;
                }
                state.pending_rewrite.insert(house_id.clone());

                tracing::warn!(
                    transactions = house.len(),
                    "House account rebuilt from counterparty histories"
                );
            }

            state.accounts.insert(house_id, house);
        }

        Ok(state)
    }

    fn restore_account(
        record: &IndexRecord,
        history: Vec<StoredTransaction>,
        state: &BankState,
        indexed: &BTreeSet<AccountId>,
        shared: &HashMap<Uuid, Arc<Transaction>>,
        table: &CurrencyTable,
    ) -> std::result::Result<Account, String> {
        let id = &record.account_id;
        if AccountId::parse(id.as_str()).as_ref() != Some(id) {
            return Err(format!("malformed account number {:?}", id.as_str()));
        }

        let mut account = if *id == AccountId::house() {
            Account::house(table.reference())
        } else {
            if record.display_name.trim().eq_ignore_ascii_case(HOUSE_ACCOUNT_NAME) {
                return Err("uses the reserved house name".to_string());
            }
            if state.name_taken(&record.display_name, None) {
                return Err(format!("duplicate name {:?}", record.display_name));
            }
            Account::new(id.clone(), &record.display_name, table.reference())
                .map_err(|e| e.to_string())?
        };
        account.restore_pin_hash(record.pin_hash);

        for stored in history {
            let tx = Self::restore_transaction(stored, table).map_err(|e| e.to_string())?;
            if !tx.is_completed() {
                return Err(format!("transaction {} was never completed", tx.id()));
            }

            if let Some(counterparty) = tx.counterparty_of(id) {
                let known = indexed.contains(counterparty)
                    || state.retired.contains(counterparty)
                    || *counterparty == AccountId::house();
                if !known {
                    return Err(format!(
                        "transaction {} references unknown account {}",
                        tx.id(),
                        counterparty
                    ));
                }
            }

            let tx = match shared.get(&tx.id()) {
                Some(existing) if **existing == tx => existing.clone(),
                Some(_) => return Err(format!("conflicting copies of transaction {}", tx.id())),
                None => Arc::new(tx),
            };
            account.apply(tx).map_err(|e| e.to_string())?;
        }

        if account.ledger_total() != record.last_known_balance {
            return Err(format!(
                "recorded balance {} but history sums to {}",
                record.last_known_balance,
                account.ledger_total()
            ));
        }

        Ok(account)
    }

    fn restore_transaction(stored: StoredTransaction, table: &CurrencyTable) -> Result<Transaction> {
        let amount = Money::new(stored.amount, table.get(&stored.currency)?);
        let usd_equivalent = Money::new(stored.usd_equivalent, table.reference());

        if amount.amount() != stored.amount || usd_equivalent.amount() != stored.usd_equivalent {
            return Err(Error::InvalidAmount(format!(
                "{} {} is not representable",
                stored.amount, stored.currency
            )));
        }

        Transaction::restore(
            stored.id,
            amount,
            usd_equivalent,
            stored.sender,
            stored.receiver,
            stored.timestamp,
            stored.description,
            stored.completed,
        )
    }

    // Accounts

    /// Open a new, empty account
    pub fn create_account(&self, name: &str) -> std::result::Result<AccountId, Rejection> {
        let mut state = self.state.write();
        let result = self.create_account_locked(&mut state, name);

        state.last_status = match &result {
            Ok(id) => {
                tracing::info!(account_id = %id, name = %name.trim(), "Account created");
                format!("Account {} created with number {}", name.trim(), id)
            }
            Err(rejection) => rejection.to_string(),
        };
        self.refresh_gauges(&state);

        result
    }

    fn create_account_locked(
        &self,
        state: &mut BankState,
        name: &str,
    ) -> std::result::Result<AccountId, Rejection> {
        let name = validate_name(name).map_err(name_rejection)?;

        if name.eq_ignore_ascii_case(HOUSE_ACCOUNT_NAME) {
            return Err(Rejection::ReservedName(name));
        }
        if state.name_taken(&name, None) {
            return Err(Rejection::DuplicateAccount(name));
        }

        let id = self.allocate_id(state, &name)?;
        let account = Account::new(id.clone(), &name, self.table.reference())
            .map_err(name_rejection)?;
        state.accounts.insert(id.clone(), account);

        Ok(id)
    }

    fn allocate_id(
        &self,
        state: &BankState,
        name: &str,
    ) -> std::result::Result<AccountId, Rejection> {
        let attempts = self.policy.max_deterministic_attempts.max(1);

        for attempt in 0..attempts {
            let candidate = derive_account_id(name, attempt);
            if state.id_available(&candidate) {
                return Ok(candidate);
            }
            tracing::debug!(account_id = %candidate, attempt, "Account number taken");
        }

        let mut rng = rand::thread_rng();
        for _ in 0..attempts {
            let candidate = AccountId::from_number(rng.gen_range(1..ACCOUNT_ID_SPACE));
            if state.id_available(&candidate) {
                return Ok(candidate);
            }
        }

        Err(Rejection::IdSpaceExhausted)
    }

    /// Remove an account from the live set
    ///
    /// Its persisted index entry and history are destroyed on the next
    /// [`Bank::flush`]. Counterparty histories are untouched.
    pub fn delete_account(&self, id: &AccountId) -> std::result::Result<Account, Rejection> {
        let mut state = self.state.write();
        let result = Self::delete_locked(&mut state, id);

        state.last_status = match &result {
            Ok(account) => {
                tracing::info!(account_id = %id, name = %account.name(), "Account deleted");
                format!("Account {} deleted", account.name())
            }
            Err(rejection) => rejection.to_string(),
        };
        self.refresh_gauges(&state);

        result
    }

    fn delete_locked(
        state: &mut BankState,
        id: &AccountId,
    ) -> std::result::Result<Account, Rejection> {
        if *id == AccountId::house() {
            return Err(Rejection::HouseAccount);
        }

        let account = state
            .accounts
            .remove(id)
            .ok_or_else(|| Rejection::UnknownAccount(id.clone()))?;
        state.retired.insert(id.clone());
        state.pending_retire.insert(id.clone());
        state.persisted.remove(id);
        Ok(account)
    }

    /// Pay a positive balance out to the house, then delete the account
    ///
    /// Both steps run under one write guard, so nothing can be credited to
    /// the account in between. Returns the removed account and the amount
    /// paid out.
    pub fn settle_and_delete(
        &self,
        id: &AccountId,
    ) -> std::result::Result<(Account, Money), Rejection> {
        let mut state = self.state.write();
        let result = self.settle_and_delete_locked(&mut state, id);

        state.last_status = match &result {
            Ok((account, payout)) => {
                tracing::info!(
                    account_id = %id,
                    name = %account.name(),
                    payout = %payout,
                    "Account settled and deleted"
                );
                format!("Account {} closed, {} paid out", account.name(), payout)
            }
            Err(rejection) => rejection.to_string(),
        };
        self.refresh_gauges(&state);

        result
    }

    fn settle_and_delete_locked(
        &self,
        state: &mut BankState,
        id: &AccountId,
    ) -> std::result::Result<(Account, Money), Rejection> {
        if *id == AccountId::house() {
            return Err(Rejection::HouseAccount);
        }
        let remaining = state
            .accounts
            .get(id)
            .ok_or_else(|| Rejection::UnknownAccount(id.clone()))?
            .ledger_total();
        let payout = Money::new(remaining.max(Decimal::ZERO), self.table.reference());

        if payout.is_positive() {
            // A quantized positive USD total always builds
            let transaction = Transaction::builder(payout.clone())
                .sender(id.clone())
                .receiver(AccountId::house())
                .description("Account closed")
                .build()
                .map_err(|_| Rejection::Overflow)?;
            Self::complete_locked(state, transaction)?;
            self.metrics.record_completed();
        }

        let account = Self::delete_locked(state, id)?;
        Ok((account, payout))
    }

    /// Change an account's display name
    pub fn rename_account(&self, id: &AccountId, name: &str) -> Verdict {
        let mut state = self.state.write();

        let result = (|| {
            if *id == AccountId::house() {
                return Err(Rejection::HouseAccount);
            }
            let name = validate_name(name).map_err(name_rejection)?;
            if name.eq_ignore_ascii_case(HOUSE_ACCOUNT_NAME) {
                return Err(Rejection::ReservedName(name));
            }
            if state.name_taken(&name, Some(id)) {
                return Err(Rejection::DuplicateAccount(name));
            }
            let account = state
                .accounts
                .get_mut(id)
                .ok_or_else(|| Rejection::UnknownAccount(id.clone()))?;
            account.rename(&name).map_err(name_rejection)
        })();

        state.last_status = match &result {
            Ok(()) => format!("Account {} renamed to {}", id, name.trim()),
            Err(rejection) => rejection.to_string(),
        };

        result
    }

    /// Set or replace an account's PIN
    pub fn set_pin(&self, id: &AccountId, pin: &str) -> Verdict {
        let mut state = self.state.write();
        if *id == AccountId::house() {
            return Err(Rejection::HouseAccount);
        }

        let account = state
            .accounts
            .get_mut(id)
            .ok_or_else(|| Rejection::UnknownAccount(id.clone()))?;
        account.set_pin(pin).map_err(|_| Rejection::InvalidPin)
    }

    /// True if the account exists and `pin` matches
    pub fn check_pin(&self, id: &AccountId, pin: &str) -> bool {
        self.state
            .read()
            .accounts
            .get(id)
            .map(|account| account.check_pin(pin))
            .unwrap_or(false)
    }

    // Transactions

    /// Check whether `transaction` could be completed right now
    ///
    /// Mutates nothing. The house account is exempt from the funds check.
    pub fn verify_transaction(&self, transaction: &Transaction) -> Verdict {
        let state = self.state.read();
        let verdict = Self::verify_locked(&state, transaction);

        if let Err(rejection) = &verdict {
            tracing::debug!(transaction_id = %transaction.id(), %rejection, "Verification failed");
        }

        verdict
    }

    fn verify_locked(state: &BankState, transaction: &Transaction) -> Verdict {
        if transaction.is_completed() {
            return Err(Rejection::AlreadyCompleted);
        }

        let receiver = transaction
            .receiving_account()
            .ok_or(Rejection::MissingReceiver)?;
        let house = AccountId::house();
        let sender = transaction.sending_account().unwrap_or(&house);

        if !state.accounts.contains_key(receiver) {
            return Err(Rejection::UnknownReceiver(receiver.clone()));
        }
        let sending = state
            .accounts
            .get(sender)
            .ok_or_else(|| Rejection::UnknownSender(sender.clone()))?;

        if sender == receiver {
            return Err(Rejection::SameAccount);
        }

        if !sending.balance().covers(transaction.usd_equivalent()) {
            return Err(Rejection::InsufficientFunds {
                name: sending.name().to_string(),
                balance: sending.ledger_total(),
                requested: transaction.usd_equivalent().amount(),
            });
        }

        Ok(())
    }

    /// Verify, complete and apply a transaction to both participants
    ///
    /// Either both accounts record the transaction or neither does. A
    /// missing sender means the house account.
    pub fn complete_transaction(
        &self,
        transaction: Transaction,
    ) -> std::result::Result<Arc<Transaction>, Rejection> {
        let mut state = self.state.write();
        let result = Self::complete_locked(&mut state, transaction);

        state.last_status = match &result {
            Ok(tx) => {
                self.metrics.record_completed();
                tracing::debug!(
                    transaction_id = %tx.id(),
                    amount = %tx.amount(),
                    usd = %tx.usd_equivalent(),
                    "Transaction completed"
                );
                "The transaction completed successfully".to_string()
            }
            Err(rejection) => {
                self.metrics.record_rejected();
                tracing::warn!(%rejection, "Transaction rejected");
                rejection.to_string()
            }
        };

        result
    }

    fn complete_locked(
        state: &mut BankState,
        transaction: Transaction,
    ) -> std::result::Result<Arc<Transaction>, Rejection> {
        Self::verify_locked(state, &transaction)?;

        let mut transaction = match transaction.sending_account() {
            Some(_) => transaction,
            None => transaction.with_sender(AccountId::house()),
        };
        let (Some(sender), Some(receiver)) = (
            transaction.sending_account().cloned(),
            transaction.receiving_account().cloned(),
        ) else {
            return Err(Rejection::MissingReceiver);
        };

        // Compute both new totals before touching either account
        let sender_total = Self::total_after(state, &sender, &transaction)?;
        let receiver_total = Self::total_after(state, &receiver, &transaction)?;

        transaction
            .mark_completed()
            .map_err(|_| Rejection::AlreadyCompleted)?;
        let transaction = Arc::new(transaction);

        if let Some(account) = state.accounts.get_mut(&sender) {
            account.commit(transaction.clone(), sender_total);
        }
        if let Some(account) = state.accounts.get_mut(&receiver) {
            account.commit(transaction.clone(), receiver_total);
        }

        Ok(transaction)
    }

    fn total_after(
        state: &BankState,
        id: &AccountId,
        transaction: &Transaction,
    ) -> std::result::Result<Decimal, Rejection> {
        let account = state
            .accounts
            .get(id)
            .ok_or_else(|| Rejection::UnknownAccount(id.clone()))?;
        account.total_after(transaction).map_err(|e| match e {
            Error::Overflow => Rejection::Overflow,
            _ => Rejection::UnknownAccount(id.clone()),
        })
    }

    // Queries

    /// Current balance (unlimited for the house)
    pub fn balance(&self, id: &AccountId) -> Option<Balance> {
        self.state.read().accounts.get(id).map(Account::balance)
    }

    /// Snapshot of one account
    pub fn account(&self, id: &AccountId) -> Option<Account> {
        self.state.read().accounts.get(id).cloned()
    }

    /// Transaction history of one account, oldest first
    pub fn history(&self, id: &AccountId) -> Option<Vec<Arc<Transaction>>> {
        self.state
            .read()
            .accounts
            .get(id)
            .map(|account| account.transactions().to_vec())
    }

    /// Look up a live account by name (case-insensitive)
    pub fn find_by_name(&self, name: &str) -> Option<AccountId> {
        let name = name.trim();
        self.state
            .read()
            .accounts
            .values()
            .find(|account| account.name().eq_ignore_ascii_case(name))
            .map(|account| account.id().clone())
    }

    /// All live accounts, ordered by number
    pub fn accounts(&self) -> Vec<AccountSummary> {
        self.state
            .read()
            .accounts
            .values()
            .map(|account| AccountSummary {
                account_id: account.id().clone(),
                name: account.name().to_string(),
                balance: account.balance(),
                transaction_count: account.len(),
            })
            .collect()
    }

    /// Accounts excluded at load time
    pub fn quarantined(&self) -> Vec<QuarantinedAccount> {
        self.state.read().quarantined.values().cloned().collect()
    }

    /// The house account's number
    pub fn house_id(&self) -> AccountId {
        AccountId::house()
    }

    /// Money held by customer accounts, i.e. minus the house total
    pub fn circulating_total(&self) -> Money {
        let total = self
            .state
            .read()
            .accounts
            .values()
            .filter(|account| !account.is_house())
            .map(Account::ledger_total)
            .sum();
        Money::new(total, self.table.reference())
    }

    /// Message describing the last mutating operation
    pub fn status(&self) -> String {
        self.state.read().last_status.clone()
    }

    /// Currency table in use
    pub fn currencies(&self) -> &CurrencyTable {
        &self.table
    }

    /// Currency balances are kept in
    pub fn reference_currency(&self) -> Currency {
        self.table.reference()
    }

    /// Metrics for this bank
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    // Persistence

    /// Persist all changes since the last flush in one atomic write
    ///
    /// Returns the number of storage operations written. A bank without
    /// storage always returns 0.
    pub fn flush(&self) -> Result<usize> {
        let Some(storage) = &self.storage else {
            return Ok(0);
        };

        let start = Instant::now();
        let mut guard = self.state.write();
        let state = &mut *guard;

        let mut batch = storage.batch();
        for id in &state.pending_retire {
            batch.retire(id)?;
        }
        for id in &state.pending_rewrite {
            batch.clear_history(id)?;
            state.persisted.remove(id);
        }

        let mut lengths = Vec::with_capacity(state.accounts.len());
        for (id, account) in &state.accounts {
            let already = state.persisted.get(id).copied().unwrap_or(0);
            for (sequence, tx) in account.transactions().iter().enumerate().skip(already) {
                batch.put_history(id, sequence as u64, &StoredTransaction::from(tx.as_ref()))?;
            }

            batch.put_index(&IndexRecord {
                account_id: id.clone(),
                display_name: account.name().to_string(),
                last_known_balance: account.ledger_total(),
                pin_hash: account.pin_hash(),
            })?;
            lengths.push((id.clone(), account.len()));
        }

        let operations = storage.commit(batch)?;

        state.pending_retire.clear();
        state.pending_rewrite.clear();
        state.persisted.extend(lengths);

        self.metrics
            .record_flush_duration(start.elapsed().as_secs_f64());
        tracing::info!(operations, "Bank flushed");

        Ok(operations)
    }

    /// Flush and release the store
    pub fn close(self) -> Result<()> {
        self.flush()?;
        if let Some(storage) = self.storage {
            storage.close()?;
        }
        Ok(())
    }

    fn refresh_gauges(&self, state: &BankState) {
        self.metrics
            .update_accounts(state.accounts.len(), state.quarantined.len());
    }
}

/// Candidate account number for `name` on the given attempt
pub fn derive_account_id(name: &str, attempt: u32) -> AccountId {
    let mut hasher = Sha256::new();
    hasher.update(name.to_lowercase().as_bytes());
    hasher.update(b":");
    hasher.update(attempt.to_be_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    AccountId::from_number(u64::from_be_bytes(prefix) % ACCOUNT_ID_SPACE)
}

fn name_rejection(error: Error) -> Rejection {
    match error {
        Error::InvalidName(reason) => Rejection::InvalidName(reason),
        other => Rejection::InvalidName(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn bank() -> Bank {
        Bank::in_memory(CurrencyTable::iso4217()).unwrap()
    }

    fn usd(bank: &Bank, amount: &str) -> Money {
        Money::new(Decimal::from_str(amount).unwrap(), bank.reference_currency())
    }

    fn deposit(bank: &Bank, to: &AccountId, amount: &str) -> Arc<Transaction> {
        let tx = Transaction::builder(usd(bank, amount))
            .receiver(to.clone())
            .build()
            .unwrap();
        bank.complete_transaction(tx).unwrap()
    }

    fn transfer(bank: &Bank, from: &AccountId, to: &AccountId, amount: &str) -> Transaction {
        Transaction::builder(usd(bank, amount))
            .sender(from.clone())
            .receiver(to.clone())
            .build()
            .unwrap()
    }

    fn finite(bank: &Bank, id: &AccountId) -> Decimal {
        bank.balance(id).unwrap().as_money().unwrap().amount()
    }

    #[test]
    fn test_house_account_exists() {
        let bank = bank();
        let house = bank.account(&bank.house_id()).unwrap();

        assert_eq!(house.name(), HOUSE_ACCOUNT_NAME);
        assert!(bank.balance(&bank.house_id()).unwrap().is_unbounded());
    }

    #[test]
    fn test_create_account_rules() {
        let bank = bank();

        let alice = bank.create_account("alice").unwrap();
        assert_eq!(alice.as_str().len(), 10);
        assert_eq!(bank.find_by_name("ALICE"), Some(alice));

        assert_eq!(
            bank.create_account("Alice"),
            Err(Rejection::DuplicateAccount("Alice".to_string()))
        );
        assert_eq!(
            bank.create_account("bank"),
            Err(Rejection::ReservedName("bank".to_string()))
        );
        assert!(matches!(bank.create_account("al"), Err(Rejection::InvalidName(_))));
        assert_eq!(bank.accounts().len(), 2);
    }

    #[test]
    fn test_account_ids_are_deterministic() {
        let first = bank();
        let second = bank();

        assert_eq!(
            first.create_account("carol").unwrap(),
            second.create_account("carol").unwrap()
        );
        assert_eq!(derive_account_id("carol", 0), derive_account_id("CAROL", 0));
        assert_ne!(derive_account_id("carol", 0), derive_account_id("carol", 1));
    }

    #[test]
    fn test_deposit_and_transfer() {
        let bank = bank();
        let alice = bank.create_account("alice").unwrap();
        let bob = bank.create_account("bob").unwrap();

        let tx = deposit(&bank, &alice, "100");
        assert!(tx.is_completed());
        assert_eq!(tx.sending_account(), Some(&bank.house_id()));

        bank.complete_transaction(transfer(&bank, &alice, &bob, "30"))
            .unwrap();

        assert_eq!(finite(&bank, &alice), Decimal::from_str("70.00").unwrap());
        assert_eq!(finite(&bank, &bob), Decimal::from_str("30.00").unwrap());
        assert_eq!(bank.history(&alice).unwrap().len(), 2);
        assert_eq!(bank.history(&bob).unwrap().len(), 1);
        assert_eq!(bank.circulating_total().amount(), Decimal::from(100));
        assert_eq!(bank.status(), "The transaction completed successfully");
    }

    #[test]
    fn test_insufficient_funds_changes_nothing() {
        let bank = bank();
        let alice = bank.create_account("alice").unwrap();
        let bob = bank.create_account("bob").unwrap();
        deposit(&bank, &alice, "50");

        let result = bank.complete_transaction(transfer(&bank, &alice, &bob, "100"));

        assert!(matches!(result, Err(Rejection::InsufficientFunds { .. })));
        assert_eq!(finite(&bank, &alice), Decimal::from(50));
        assert_eq!(finite(&bank, &bob), Decimal::ZERO);
        assert_eq!(bank.history(&alice).unwrap().len(), 1);
        assert!(bank.history(&bob).unwrap().is_empty());
        assert!(bank.status().contains("could not be completed"));
        assert_eq!(bank.metrics().transactions_rejected.get(), 1);
    }

    #[test]
    fn test_exact_balance_is_sufficient() {
        let bank = bank();
        let alice = bank.create_account("alice").unwrap();
        let bob = bank.create_account("bob").unwrap();
        deposit(&bank, &alice, "25");

        let tx = transfer(&bank, &alice, &bob, "25");
        assert_eq!(bank.verify_transaction(&tx), Ok(()));
        bank.complete_transaction(tx).unwrap();
        assert_eq!(finite(&bank, &alice), Decimal::ZERO);
    }

    #[test]
    fn test_verify_rejections() {
        let bank = bank();
        let alice = bank.create_account("alice").unwrap();
        let stranger = AccountId::from_number(42);

        assert_eq!(
            bank.verify_transaction(&transfer(&bank, &alice, &stranger, "1")),
            Err(Rejection::UnknownReceiver(stranger.clone()))
        );
        assert_eq!(
            bank.verify_transaction(&transfer(&bank, &stranger, &alice, "1")),
            Err(Rejection::UnknownSender(stranger.clone()))
        );
        assert_eq!(
            bank.verify_transaction(&transfer(&bank, &alice, &alice, "1")),
            Err(Rejection::SameAccount)
        );

        let withdrawal = Transaction::builder(usd(&bank, "1"))
            .sender(alice)
            .build()
            .unwrap();
        assert_eq!(
            bank.verify_transaction(&withdrawal),
            Err(Rejection::MissingReceiver)
        );
    }

    #[test]
    fn test_house_may_go_negative() {
        let bank = bank();
        let alice = bank.create_account("alice").unwrap();
        deposit(&bank, &alice, "1000000");

        let house = bank.account(&bank.house_id()).unwrap();
        assert_eq!(house.ledger_total(), Decimal::from(-1_000_000));
    }

    #[test]
    fn test_foreign_currency_moves_usd_equivalent() {
        let bank = bank();
        let alice = bank.create_account("alice").unwrap();
        let eur = bank
            .currencies()
            .money(Decimal::from(100), "EUR")
            .unwrap();

        let tx = Transaction::builder(eur)
            .receiver(alice.clone())
            .usd_rate(bank.reference_currency(), Decimal::from_str("1.25").unwrap())
            .build()
            .unwrap();
        bank.complete_transaction(tx).unwrap();

        assert_eq!(finite(&bank, &alice), Decimal::from(125));
        assert!(!bank.account(&alice).unwrap().all_in_reference_currency());
    }

    #[test]
    fn test_delete_account() {
        let bank = bank();
        let alice = bank.create_account("alice").unwrap();
        let bob = bank.create_account("bob").unwrap();
        deposit(&bank, &alice, "10");
        bank.complete_transaction(transfer(&bank, &alice, &bob, "10"))
            .unwrap();

        let removed = bank.delete_account(&alice).unwrap();
        assert_eq!(removed.name(), "alice");
        assert!(bank.balance(&alice).is_none());
        assert_eq!(bank.history(&bob).unwrap().len(), 1);

        assert!(matches!(
            bank.delete_account(&alice),
            Err(Rejection::UnknownAccount(id)) if id == alice
        ));
        assert!(matches!(
            bank.delete_account(&bank.house_id()),
            Err(Rejection::HouseAccount)
        ));

        // Name is free again, number is not reused
        let again = bank.create_account("alice").unwrap();
        assert_ne!(again, alice);
    }

    #[test]
    fn test_settle_and_delete_pays_out_everything() {
        let bank = bank();
        let alice = bank.create_account("alice").unwrap();
        let bob = bank.create_account("bob").unwrap();
        deposit(&bank, &alice, "25");
        deposit(&bank, &bob, "5");

        let (closed, payout) = bank.settle_and_delete(&alice).unwrap();
        assert_eq!(closed.name(), "alice");
        assert_eq!(closed.ledger_total(), Decimal::ZERO);
        assert_eq!(payout.amount(), Decimal::from(25));
        assert!(bank.balance(&alice).is_none());

        // House plus remaining accounts still sum to zero
        let house = bank.account(&bank.house_id()).unwrap();
        assert_eq!(house.ledger_total() + finite(&bank, &bob), Decimal::ZERO);
        assert_eq!(bank.circulating_total().amount(), Decimal::from(5));

        assert!(matches!(
            bank.settle_and_delete(&alice),
            Err(Rejection::UnknownAccount(id)) if id == alice
        ));
        assert!(matches!(
            bank.settle_and_delete(&bank.house_id()),
            Err(Rejection::HouseAccount)
        ));
    }

    #[test]
    fn test_settle_and_delete_empty_account() {
        let bank = bank();
        let alice = bank.create_account("alice").unwrap();

        let (_, payout) = bank.settle_and_delete(&alice).unwrap();
        assert!(payout.amount().is_zero());
        assert!(bank.account(&bank.house_id()).unwrap().transactions().is_empty());
    }

    #[test]
    fn test_rename_and_pin() {
        let bank = bank();
        let alice = bank.create_account("alice").unwrap();
        bank.create_account("bob").unwrap();

        assert_eq!(
            bank.rename_account(&alice, "bob"),
            Err(Rejection::DuplicateAccount("bob".to_string()))
        );
        bank.rename_account(&alice, "Alice").unwrap();
        assert_eq!(bank.account(&alice).unwrap().name(), "Alice");

        assert!(!bank.check_pin(&alice, "1234"));
        assert_eq!(bank.set_pin(&alice, "12"), Err(Rejection::InvalidPin));
        bank.set_pin(&alice, "1234").unwrap();
        assert!(bank.check_pin(&alice, "1234"));
        assert!(!bank.check_pin(&alice, "4321"));
    }

    #[test]
    fn test_in_memory_flush_is_noop() {
        let bank = bank();
        bank.create_account("alice").unwrap();
        assert_eq!(bank.flush().unwrap(), 0);
    }
}
