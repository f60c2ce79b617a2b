//! Metrics collection for observability
//!
//! Every wallet session owns its own Prometheus registry.
//!
//! # Metrics
//!
//! - `wallet_events_applied_total` - Inbound log events applied
//! - `wallet_events_dropped_total` - Inbound log events dropped as malformed
//! - `wallet_events_duplicate_total` - Inbound log events already seen
//! - `wallet_publish_total{status}` - Per-relay publish outcomes
//! - `wallet_balance` - Balance after the last change

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Applied inbound events
    pub events_applied: IntCounter,

    /// Dropped inbound events
    pub events_dropped: IntCounter,

    /// Duplicate inbound events
    pub events_duplicate: IntCounter,

    /// Publish outcomes by status
    pub publish_total: IntCounterVec,

    /// Current balance
    pub balance: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let events_applied = IntCounter::new(
            "wallet_events_applied_total",
            "Inbound log events applied to the ledger",
        )?;
        registry.register(Box::new(events_applied.clone()))?;

        let events_dropped = IntCounter::new(
            "wallet_events_dropped_total",
            "Inbound log events dropped as malformed",
        )?;
        registry.register(Box::new(events_dropped.clone()))?;

        let events_duplicate = IntCounter::new(
            "wallet_events_duplicate_total",
            "Inbound log events already applied",
        )?;
        registry.register(Box::new(events_duplicate.clone()))?;

        let publish_total = IntCounterVec::new(
            Opts::new("wallet_publish_total", "Per-relay publish outcomes"),
            &["status"],
        )?;
        registry.register(Box::new(publish_total.clone()))?;

        let balance = IntGauge::new("wallet_balance", "Wallet balance")?;
        registry.register(Box::new(balance.clone()))?;

        Ok(Self {
            events_applied,
            events_dropped,
            events_duplicate,
            publish_total,
            balance,
            registry,
        })
    }

    /// Record an applied event
    pub fn record_applied(&self) {
        self.events_applied.inc();
    }

    /// Record a dropped event
    pub fn record_dropped(&self) {
        self.events_dropped.inc();
    }

    /// Record a duplicate event
    pub fn record_duplicate(&self) {
        self.events_duplicate.inc();
    }

    /// Record one relay publish outcome
    pub fn record_publish(&self, success: bool) {
        let status = if success { "ok" } else { "failed" };
        self.publish_total.with_label_values(&[status]).inc();
    }

    /// Update balance gauge
    pub fn update_balance(&self, balance: u64) {
        self.balance.set(i64::try_from(balance).unwrap_or(i64::MAX));
    }

    /// Collect all metric families
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("events_applied", &self.events_applied.get())
            .field("balance", &self.balance.get())
            .finish()
    }
}
