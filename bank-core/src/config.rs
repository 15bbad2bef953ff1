//! Configuration for the bank

use crate::types::CurrencyTable;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bank configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Optional TOML currency table (`CODE = minor_units`); built-in ISO 4217 otherwise
    pub currency_table: Option<PathBuf>,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Actor configuration
    pub actor: ActorConfig,

    /// Account policy
    pub accounts: AccountsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/bank"),
            service_name: "bank-core".to_string(),
            currency_table: None,
            rocksdb: RocksDBConfig::default(),
            actor: ActorConfig::default(),
            accounts: AccountsConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Sync the WAL on every flush
    pub sync_writes: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 16,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            sync_writes: true,
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox capacity
    pub mailbox_capacity: usize,

    /// Flush pending changes this often (ms); 0 disables periodic flushing
    pub flush_interval_ms: u64,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
            flush_interval_ms: 1000,
        }
    }
}

/// Account policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// Name-derived id attempts before falling back to random ids
    pub max_deterministic_attempts: u32,

    /// Failed PIN attempts allowed per teller session
    pub max_login_attempts: u32,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            max_deterministic_attempts: 16,
            max_login_attempts: 5,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("BANK_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(table) = std::env::var("BANK_CURRENCY_TABLE") {
            config.currency_table = Some(PathBuf::from(table));
        }

        if let Ok(capacity) = std::env::var("BANK_MAILBOX_CAPACITY") {
            config.actor.mailbox_capacity = capacity.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid BANK_MAILBOX_CAPACITY: {}", e))
            })?;
        }

        Ok(config)
    }

    /// Currency table named by the config, or the built-in one
    pub fn load_currency_table(&self) -> crate::Result<CurrencyTable> {
        match &self.currency_table {
            Some(path) => CurrencyTable::from_file(path),
            None => Ok(CurrencyTable::iso4217()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "bank-core");
        assert_eq!(config.actor.mailbox_capacity, 1000);
        assert_eq!(config.actor.flush_interval_ms, 1000);
        assert_eq!(config.accounts.max_login_attempts, 5);
        assert!(config.currency_table.is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            data_dir = "/tmp/bank"

            [accounts]
            max_login_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/bank"));
        assert_eq!(config.accounts.max_login_attempts, 3);
        assert_eq!(config.accounts.max_deterministic_attempts, 16);
        assert!(config.rocksdb.sync_writes);
    }

    #[test]
    fn test_load_currency_table_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("currencies.toml");
        std::fs::write(&path, "USD = 2\nJPY = 0\n").unwrap();

        let config = Config {
            currency_table: Some(path),
            ..Config::default()
        };
        let table = config.load_currency_table().unwrap();
        assert_eq!(table.len(), 2);
    }
}
