//! Type definitions for the relay bus

use crate::event::SignedEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event kinds used by the wallet
pub mod kind {
    /// Event deletion
    pub const DELETION: u16 = 5;
    /// Unspent token
    pub const TOKEN: u16 = 7375;
    /// Spending history entry
    pub const HISTORY: u16 = 7376;
    /// Nutzap
    pub const NUTZAP: u16 = 9321;
    /// Nutzap receiving info
    pub const NUTZAP_INFO: u16 = 10019;
    /// Wallet configuration (mints, private key)
    pub const WALLET: u16 = 17375;

    /// Human readable label for logs
    pub fn label(kind: u16) -> &'static str {
        match kind {
            DELETION => "deletion",
            TOKEN => "token",
            HISTORY => "history",
            NUTZAP => "nutzap",
            NUTZAP_INFO => "nutzap-info",
            WALLET => "wallet",
            _ => "unknown",
        }
    }
}

/// Normalized relay endpoint URL
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RelayUrl(String);

impl RelayUrl {
    /// Normalize a relay address
    ///
    /// Lowercases, strips the trailing slash and defaults the scheme to `wss://`.
    pub fn new(url: impl AsRef<str>) -> Self {
        let trimmed = url.as_ref().trim().trim_end_matches('/').to_lowercase();
        if trimmed.contains("://") {
            Self(trimmed)
        } else {
            Self(format!("wss://{}", trimmed))
        }
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address without the scheme, for display
    pub fn short(&self) -> &str {
        self.0.split_once("://").map_or(self.0.as_str(), |(_, rest)| rest)
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RelayUrl {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for RelayUrl {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl From<RelayUrl> for String {
    fn from(url: RelayUrl) -> Self {
        url.0
    }
}

/// Item yielded by a relay subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// Stored or live event
    Event(SignedEvent),
    /// The relay finished sending stored events
    EndOfStoredEvents,
    /// The relay closed the subscription
    Closed(String),
}

/// Result of publishing one event to one relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Destination relay
    pub relay: RelayUrl,

    /// Error detail on failure
    pub error: Option<String>,
}

impl PublishOutcome {
    /// Successful publish
    pub fn ok(relay: RelayUrl) -> Self {
        Self { relay, error: None }
    }

    /// Failed publish
    pub fn failed(relay: RelayUrl, error: impl Into<String>) -> Self {
        Self {
            relay,
            error: Some(error.into()),
        }
    }

    /// Whether the relay accepted the event
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated outcomes of one fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Per-relay outcomes in completion order
    pub outcomes: Vec<PublishOutcome>,
}

impl PublishReport {
    /// Record an outcome
    pub fn push(&mut self, outcome: PublishOutcome) {
        self.outcomes.push(outcome);
    }

    /// Number of relays that accepted the event
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of relays that failed
    pub fn failures(&self) -> usize {
        self.outcomes.len() - self.successes()
    }

    /// Whether at least one relay accepted the event
    pub fn any_success(&self) -> bool {
        self.successes() > 0
    }
}

impl Extend<PublishOutcome> for PublishReport {
    fn extend<T: IntoIterator<Item = PublishOutcome>>(&mut self, iter: T) {
        self.outcomes.extend(iter);
    }
}
