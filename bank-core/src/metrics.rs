//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the bank.
//! Every [`Metrics`] owns its own registry so several banks can live in
//! one process.
//!
//! # Metrics
//!
//! - `bank_transactions_completed_total` - Transfers applied to both accounts
//! - `bank_transactions_rejected_total` - Transfers refused by verification
//! - `bank_accounts_live` - Accounts in the live set
//! - `bank_accounts_quarantined` - Accounts excluded by integrity checks on load
//! - `bank_flush_duration_seconds` - Histogram of flush latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Completed transfers
    pub transactions_completed: IntCounter,

    /// Rejected transfers
    pub transactions_rejected: IntCounter,

    /// Live accounts
    pub accounts_live: IntGauge,

    /// Quarantined accounts
    pub accounts_quarantined: IntGauge,

    /// Flush duration histogram
    pub flush_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("transactions_completed", &self.transactions_completed.get())
            .field("transactions_rejected", &self.transactions_rejected.get())
            .field("accounts_live", &self.accounts_live.get())
            .field("accounts_quarantined", &self.accounts_quarantined.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_completed = IntCounter::new(
            "bank_transactions_completed_total",
            "Transfers applied to both accounts",
        )?;
        registry.register(Box::new(transactions_completed.clone()))?;

        let transactions_rejected = IntCounter::new(
            "bank_transactions_rejected_total",
            "Transfers refused by verification",
        )?;
        registry.register(Box::new(transactions_rejected.clone()))?;

        let accounts_live = IntGauge::new("bank_accounts_live", "Accounts in the live set")?;
        registry.register(Box::new(accounts_live.clone()))?;

        let accounts_quarantined = IntGauge::new(
            "bank_accounts_quarantined",
            "Accounts excluded by integrity checks on load",
        )?;
        registry.register(Box::new(accounts_quarantined.clone()))?;

        let flush_duration = Histogram::with_opts(
            HistogramOpts::new("bank_flush_duration_seconds", "Histogram of flush latencies")
                .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(flush_duration.clone()))?;

        Ok(Self {
            transactions_completed,
            transactions_rejected,
            accounts_live,
            accounts_quarantined,
            flush_duration,
            registry,
        })
    }

    /// Record a completed transfer
    pub fn record_completed(&self) {
        self.transactions_completed.inc();
    }

    /// Record a rejected transfer
    pub fn record_rejected(&self) {
        self.transactions_rejected.inc();
    }

    /// Update account gauges
    pub fn update_accounts(&self, live: usize, quarantined: usize) {
        self.accounts_live.set(live as i64);
        self.accounts_quarantined.set(quarantined as i64);
    }

    /// Record flush duration
    pub fn record_flush_duration(&self, duration_seconds: f64) {
        self.flush_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
