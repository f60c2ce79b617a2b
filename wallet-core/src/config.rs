//! Configuration for the wallet

use relay_bus::{PublisherConfig, RelayUrl, SubscriberConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wallet configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relays holding the owner's wallet log
    pub relays: Vec<RelayUrl>,

    /// Sync configuration
    pub sync: SyncConfig,

    /// Publish configuration
    pub publish: PublishConfig,

    /// Discovery configuration
    pub discovery: DiscoveryConfig,
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on waiting for relays before declaring the ledger stable (milliseconds)
    pub stable_timeout_ms: u64,

    /// Capacity of the inbound event channel
    pub mailbox_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stable_timeout_ms: 7_000,
            mailbox_capacity: 1_000,
        }
    }
}

/// Publish configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Per-relay publish timeout (milliseconds)
    pub timeout_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

/// Discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// How many outbox relays to ask for a recipient's nutzap info
    pub outbox_relay_count: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            outbox_relay_count: 3,
        }
    }
}

impl Config {
    /// Configuration for the given relays with default tuning
    pub fn with_relays<I, R>(relays: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RelayUrl>,
    {
        Self {
            relays: relays.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(relays) = std::env::var("WALLET_RELAYS") {
            config.relays = relays
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(RelayUrl::new)
                .collect();
        }

        if let Ok(ms) = std::env::var("WALLET_STABLE_TIMEOUT_MS") {
            config.sync.stable_timeout_ms = parse_ms("WALLET_STABLE_TIMEOUT_MS", &ms)?;
        }

        if let Ok(ms) = std::env::var("WALLET_PUBLISH_TIMEOUT_MS") {
            config.publish.timeout_ms = parse_ms("WALLET_PUBLISH_TIMEOUT_MS", &ms)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject unusable settings
    pub fn validate(&self) -> crate::Result<()> {
        if self.sync.stable_timeout_ms == 0 {
            return Err(crate::Error::Config("sync.stable_timeout_ms must be positive".to_string()));
        }
        if self.sync.mailbox_capacity == 0 {
            return Err(crate::Error::Config("sync.mailbox_capacity must be positive".to_string()));
        }
        if self.publish.timeout_ms == 0 {
            return Err(crate::Error::Config("publish.timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// Stable wait bound
    pub fn stable_timeout(&self) -> Duration {
        Duration::from_millis(self.sync.stable_timeout_ms)
    }

    /// Relay publisher settings
    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            publish_timeout: Duration::from_millis(self.publish.timeout_ms),
        }
    }

    /// Relay subscriber settings
    pub fn subscriber_config(&self) -> SubscriberConfig {
        SubscriberConfig {
            channel_capacity: self.sync.mailbox_capacity,
        }
    }
}

fn parse_ms(name: &str, value: &str) -> crate::Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| crate::Error::Config(format!("{} is not a number: {}", name, e)))
}
