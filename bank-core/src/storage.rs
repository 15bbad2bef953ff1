//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `index` - One record per live account (key: account_id)
//! - `history` - Append-only per-account history (key: account_id || '|' || seq)
//! - `retired` - Tombstones for deleted accounts (key: account_id)
//!
//! Every change is staged in a [`StorageBatch`] and committed as a single
//! RocksDB `WriteBatch`, so a flush is all-or-nothing.

use crate::{
    error::{Error, Result},
    transaction::Transaction,
    types::AccountId,
    Config,
};
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Column family names
const CF_INDEX: &str = "index";
const CF_HISTORY: &str = "history";
const CF_RETIRED: &str = "retired";

/// Separator between account id and sequence number in history keys
const KEY_SEPARATOR: u8 = b'|';

/// Index entry for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Account number
    pub account_id: AccountId,
    /// Display name
    pub display_name: String,
    /// Running USD total at the time of the last flush
    pub last_known_balance: Decimal,
    /// SHA-256 PIN hash, if a PIN was set
    pub pin_hash: Option<[u8; 32]>,
}

/// Persisted form of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransaction {
    /// Transaction id
    pub id: Uuid,
    /// Amount in `currency`
    pub amount: Decimal,
    /// ISO 4217 code
    pub currency: String,
    /// USD equivalent
    pub usd_equivalent: Decimal,
    /// Sender (None = external)
    pub sender: Option<AccountId>,
    /// Receiver (None = external)
    pub receiver: Option<AccountId>,
    /// Request timestamp
    pub timestamp: DateTime<Utc>,
    /// Description
    pub description: String,
    /// Completion flag
    pub completed: bool,
}

impl From<&Transaction> for StoredTransaction {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id(),
            amount: tx.amount().amount(),
            currency: tx.amount().currency().code().to_string(),
            usd_equivalent: tx.usd_equivalent().amount(),
            sender: tx.sending_account().cloned(),
            receiver: tx.receiving_account().cloned(),
            timestamp: tx.timestamp(),
            description: tx.description().to_string(),
            completed: tx.is_completed(),
        }
    }
}

/// Result of reading the `index` column family
#[derive(Debug, Default)]
pub struct IndexScan {
    /// Decoded records
    pub records: Vec<IndexRecord>,
    /// Entries whose value could not be decoded
    pub unreadable: Vec<UnreadableRecord>,
}

/// Index entry that failed to decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableRecord {
    /// Raw key, normally the account number
    pub key: String,
    /// Decoder error
    pub reason: String,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_INDEX, Self::cf_options_index()),
            ColumnFamilyDescriptor::new(CF_HISTORY, Self::cf_options_history()),
            ColumnFamilyDescriptor::new(CF_RETIRED, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB");

        Ok(Self {
            db,
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    // Column family options

    fn cf_options_index() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_history() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Reads

    /// All index records
    ///
    /// Values that fail to decode are returned separately, keyed by their
    /// raw key, so one bad record does not hide the others.
    pub fn load_index(&self) -> Result<IndexScan> {
        let cf = self.cf_handle(CF_INDEX)?;

        let mut scan = IndexScan::default();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            match bincode::deserialize(&value) {
                Ok(record) => scan.records.push(record),
                Err(e) => scan.unreadable.push(UnreadableRecord {
                    key: String::from_utf8_lossy(&key).into_owned(),
                    reason: e.to_string(),
                }),
            }
        }

        Ok(scan)
    }

    /// Full history of one account, in sequence order
    pub fn load_history(&self, account: &AccountId) -> Result<Vec<StoredTransaction>> {
        let cf = self.cf_handle(CF_HISTORY)?;
        let prefix = Self::history_prefix(account);

        let mut history = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix.as_slice(), Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            history.push(bincode::deserialize(&value)?);
        }

        Ok(history)
    }

    /// Ids of deleted accounts
    ///
    /// Malformed tombstone keys are logged and skipped.
    pub fn load_retired(&self) -> Result<Vec<AccountId>> {
        let cf = self.cf_handle(CF_RETIRED)?;

        let mut retired = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            match std::str::from_utf8(&key).ok().and_then(AccountId::parse) {
                Some(id) => retired.push(id),
                None => tracing::error!(
                    key = %String::from_utf8_lossy(&key),
                    "Malformed retired account key, skipped"
                ),
            }
        }

        Ok(retired)
    }

    /// Overwrite one index entry with raw bytes (unbatched)
    pub fn put_index_raw(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf_handle(CF_INDEX)?;
        self.db.put_cf(cf, key, value)?;
        Ok(())
    }

    /// Overwrite one history entry with raw bytes (unbatched)
    pub fn put_history_raw(&self, account: &AccountId, sequence: u64, value: &[u8]) -> Result<()> {
        let cf = self.cf_handle(CF_HISTORY)?;
        self.db.put_cf(cf, Self::history_key(account, sequence), value)?;
        Ok(())
    }

    /// Write one tombstone key as-is (unbatched)
    pub fn put_retired_raw(&self, key: &[u8]) -> Result<()> {
        let cf = self.cf_handle(CF_RETIRED)?;
        self.db.put_cf(cf, key, b"")?;
        Ok(())
    }

    // Writes

    /// Overwrite one index record (unbatched)
    pub fn put_index(&self, record: &IndexRecord) -> Result<()> {
        let cf = self.cf_handle(CF_INDEX)?;
        let value = bincode::serialize(record)?;

        self.db.put_cf(cf, record.account_id.as_str().as_bytes(), value)?;

        tracing::debug!(account_id = %record.account_id, "Index record written");

        Ok(())
    }

    /// Start a batch of changes
    pub fn batch(&self) -> StorageBatch<'_> {
        StorageBatch {
            storage: self,
            batch: WriteBatch::default(),
            operations: 0,
        }
    }

    /// Commit a batch atomically
    pub fn commit(&self, batch: StorageBatch<'_>) -> Result<usize> {
        let operations = batch.operations;
        if operations == 0 {
            return Ok(0);
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch.batch, &write_opts)?;

        tracing::debug!(operations, "Storage batch committed");

        Ok(operations)
    }

    // Key helpers

    fn history_prefix(account: &AccountId) -> Vec<u8> {
        let mut key = account.as_str().as_bytes().to_vec();
        key.push(KEY_SEPARATOR);
        key
    }

    fn history_key(account: &AccountId, sequence: u64) -> Vec<u8> {
        let mut key = Self::history_prefix(account);
        key.extend_from_slice(&sequence.to_be_bytes());
        key
    }

    fn history_keys(&self, account: &AccountId) -> Result<Vec<Box<[u8]>>> {
        let cf = self.cf_handle(CF_HISTORY)?;
        let prefix = Self::history_prefix(account);

        let mut keys = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix.as_slice(), Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            keys.push(key);
        }

        Ok(keys)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        self.db.flush()?;
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

/// Staged changes, committed with [`Storage::commit`]
pub struct StorageBatch<'a> {
    storage: &'a Storage,
    batch: WriteBatch,
    operations: usize,
}

impl std::fmt::Debug for StorageBatch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageBatch")
            .field("operations", &self.operations)
            .finish()
    }
}

impl StorageBatch<'_> {
    /// Write an index record
    pub fn put_index(&mut self, record: &IndexRecord) -> Result<()> {
        let cf = self.storage.cf_handle(CF_INDEX)?;
        let value = bincode::serialize(record)?;
        self.batch
            .put_cf(cf, record.account_id.as_str().as_bytes(), value);
        self.operations += 1;
        Ok(())
    }

    /// Append one history entry at `sequence`
    pub fn put_history(
        &mut self,
        account: &AccountId,
        sequence: u64,
        transaction: &StoredTransaction,
    ) -> Result<()> {
        let cf = self.storage.cf_handle(CF_HISTORY)?;
        let value = bincode::serialize(transaction)?;
        self.batch
            .put_cf(cf, Storage::history_key(account, sequence), value);
        self.operations += 1;
        Ok(())
    }

    /// Destroy an account's index and history, leaving a tombstone
    pub fn retire(&mut self, account: &AccountId) -> Result<()> {
        let cf_index = self.storage.cf_handle(CF_INDEX)?;
        let cf_retired = self.storage.cf_handle(CF_RETIRED)?;

        self.batch.delete_cf(cf_index, account.as_str().as_bytes());
        self.clear_history(account)?;
        self.batch.put_cf(cf_retired, account.as_str().as_bytes(), b"");
        Ok(())
    }

    /// Drop an account's stored history so it can be written afresh
    ///
    /// Entries put later in the same batch win over these deletes.
    pub fn clear_history(&mut self, account: &AccountId) -> Result<()> {
        let cf_history = self.storage.cf_handle(CF_HISTORY)?;
        for key in self.storage.history_keys(account)? {
            self.batch.delete_cf(cf_history, key);
        }
        self.operations += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        (config, temp_dir)
    }

    fn test_record(number: u64, balance: i64) -> IndexRecord {
        IndexRecord {
            account_id: AccountId::from_number(number),
            display_name: format!("account-{}", number),
            last_known_balance: Decimal::new(balance, 2),
            pin_hash: None,
        }
    }

    fn test_transaction(sender: u64, receiver: u64, cents: i64) -> StoredTransaction {
        StoredTransaction {
            id: Uuid::now_v7(),
            amount: Decimal::new(cents, 2),
            currency: "USD".to_string(),
            usd_equivalent: Decimal::new(cents, 2),
            sender: Some(AccountId::from_number(sender)),
            receiver: Some(AccountId::from_number(receiver)),
            timestamp: Utc::now(),
            description: String::new(),
            completed: true,
        }
    }

    #[test]
    fn test_storage_open_empty() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        assert!(storage.load_index().unwrap().records.is_empty());
        assert!(storage.load_retired().unwrap().is_empty());
    }

    #[test]
    fn test_batch_commit_and_reload() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let record = test_record(7, 1500);
        let mut batch = storage.batch();
        batch.put_index(&record).unwrap();
        batch
            .put_history(&record.account_id, 0, &test_transaction(0, 7, 2000))
            .unwrap();
        batch
            .put_history(&record.account_id, 1, &test_transaction(7, 8, 500))
            .unwrap();
        assert_eq!(storage.commit(batch).unwrap(), 3);

        assert_eq!(storage.load_index().unwrap().records, vec![record.clone()]);

        let history = storage.load_history(&record.account_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, Decimal::new(2000, 2));
        assert_eq!(history[1].amount, Decimal::new(500, 2));
    }

    #[test]
    fn test_history_is_scoped_to_account() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let mut batch = storage.batch();
        batch
            .put_history(&AccountId::from_number(1), 0, &test_transaction(0, 1, 100))
            .unwrap();
        batch
            .put_history(&AccountId::from_number(2), 0, &test_transaction(0, 2, 200))
            .unwrap();
        storage.commit(batch).unwrap();

        assert_eq!(storage.load_history(&AccountId::from_number(1)).unwrap().len(), 1);
        assert_eq!(storage.load_history(&AccountId::from_number(3)).unwrap().len(), 0);
    }

    #[test]
    fn test_retire_destroys_account() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let record = test_record(9, 0);

        let mut batch = storage.batch();
        batch.put_index(&record).unwrap();
        batch
            .put_history(&record.account_id, 0, &test_transaction(0, 9, 100))
            .unwrap();
        storage.commit(batch).unwrap();

        let mut batch = storage.batch();
        batch.retire(&record.account_id).unwrap();
        storage.commit(batch).unwrap();

        assert!(storage.load_index().unwrap().records.is_empty());
        assert!(storage.load_history(&record.account_id).unwrap().is_empty());
        assert_eq!(storage.load_retired().unwrap(), vec![record.account_id]);
    }

    #[test]
    fn test_clear_history_leaves_no_tombstone() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let record = test_record(0, 0);

        let mut batch = storage.batch();
        batch.put_index(&record).unwrap();
        batch
            .put_history(&record.account_id, 0, &test_transaction(0, 5, 100))
            .unwrap();
        batch
            .put_history(&record.account_id, 1, &test_transaction(0, 6, 100))
            .unwrap();
        storage.commit(batch).unwrap();

        let rewritten = test_transaction(0, 7, 300);
        let mut batch = storage.batch();
        batch.clear_history(&record.account_id).unwrap();
        batch.put_history(&record.account_id, 0, &rewritten).unwrap();
        storage.commit(batch).unwrap();

        assert_eq!(storage.load_history(&record.account_id).unwrap(), vec![rewritten]);
        assert_eq!(storage.load_index().unwrap().records, vec![record]);
        assert!(storage.load_retired().unwrap().is_empty());
    }

    #[test]
    fn test_undecodable_entries_are_isolated() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        storage.put_index(&test_record(3, 42)).unwrap();
        storage.put_index_raw(b"0000000004", b"\xff").unwrap();
        storage.put_retired_raw(b"not-an-id").unwrap();
        storage.put_retired_raw(b"0000000005").unwrap();

        let scan = storage.load_index().unwrap();
        assert_eq!(scan.records, vec![test_record(3, 42)]);
        assert_eq!(scan.unreadable.len(), 1);
        assert_eq!(scan.unreadable[0].key, "0000000004");

        assert_eq!(storage.load_retired().unwrap(), vec![AccountId::from_number(5)]);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let (config, _temp) = test_config();
        {
            let storage = Storage::open(&config).unwrap();
            storage.put_index(&test_record(3, 42)).unwrap();
            storage.close().unwrap();
        }

        let storage = Storage::open(&config).unwrap();
        assert_eq!(storage.load_index().unwrap().records, vec![test_record(3, 42)]);
    }
}
