//! Profile and relay discovery

use crate::Result;
use async_trait::async_trait;
use relay_bus::RelayUrl;

/// Resolved recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Public key (hex)
    pub pubkey: String,

    /// Display name, when the profile has one
    pub display_name: Option<String>,
}

impl Profile {
    /// Name for logs
    pub fn short_name(&self) -> &str {
        match &self.display_name {
            Some(name) if !name.is_empty() => name,
            _ => self.pubkey.get(..8).unwrap_or(&self.pubkey),
        }
    }
}

/// Looks up profiles and where they read and write
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Resolve a recipient reference (public key or other identifier)
    async fn resolve_profile(&self, query: &str) -> Result<Profile>;

    /// Relays the user writes to, at most `limit`
    async fn outbox_relays(&self, pubkey: &str, limit: usize) -> Result<Vec<RelayUrl>>;

    /// Relays the user reads from
    async fn inbox_relays(&self, pubkey: &str) -> Result<Vec<RelayUrl>>;
}
