//! Signed event envelope and subscription filters
//!
//! Events follow the relay (NIP-01) shape: the id is the hex SHA-256 of the
//! canonical JSON array `[0, pubkey, created_at, kind, tags, content]`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Event before the signer has produced an id and signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvent {
    /// Author public key (hex)
    pub pubkey: String,

    /// Unix timestamp (seconds)
    pub created_at: i64,

    /// Event kind
    pub kind: u16,

    /// Tags
    pub tags: Vec<Vec<String>>,

    /// Content (ciphertext for private wallet events)
    pub content: String,
}

impl UnsignedEvent {
    /// Create new event stamped with the current time
    pub fn new(
        pubkey: impl Into<String>,
        kind: u16,
        tags: Vec<Vec<String>>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            pubkey: pubkey.into(),
            created_at: Utc::now().timestamp(),
            kind,
            tags,
            content: content.into(),
        }
    }

    /// Override the timestamp
    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    /// Add a tag
    pub fn with_tag<I, S>(mut self, tag: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.push(tag.into_iter().map(Into::into).collect());
        self
    }

    /// Compute the content-addressed event id
    pub fn compute_id(&self) -> String {
        let canonical = serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content
        ]);

        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Attach a signature produced over the computed id
    pub fn into_signed(self, sig: impl Into<String>) -> SignedEvent {
        let id = self.compute_id();
        SignedEvent {
            id,
            pubkey: self.pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig: sig.into(),
        }
    }
}

/// Event as stored and forwarded by relays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEvent {
    /// Event id (hex SHA-256)
    pub id: String,

    /// Author public key (hex)
    pub pubkey: String,

    /// Unix timestamp (seconds)
    pub created_at: i64,

    /// Event kind
    pub kind: u16,

    /// Tags
    pub tags: Vec<Vec<String>>,

    /// Content
    pub content: String,

    /// Signature over the id
    pub sig: String,
}

impl SignedEvent {
    /// Values (second element) of every tag with the given name
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags.iter().filter_map(move |tag| match tag.as_slice() {
            [key, value, ..] if key == name => Some(value.as_str()),
            _ => None,
        })
    }

    /// First value of the named tag
    pub fn first_tag(&self, name: &str) -> Option<&str> {
        self.tags.iter().find_map(|tag| match tag.as_slice() {
            [key, value, ..] if key == name => Some(value.as_str()),
            _ => None,
        })
    }

    /// Check the id matches the content
    pub fn verify_id(&self) -> bool {
        let unsigned = UnsignedEvent {
            pubkey: self.pubkey.clone(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags.clone(),
            content: self.content.clone(),
        };
        unsigned.compute_id() == self.id
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Subscription / query filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Accepted kinds (empty = any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u16>,

    /// Accepted authors (empty = any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,

    /// Only events at or after this timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,

    /// Maximum number of stored events to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    /// Empty filter (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to kinds
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u16>) -> Self {
        self.kinds.extend(kinds);
        self
    }

    /// Restrict to an author
    pub fn author(mut self, pubkey: impl Into<String>) -> Self {
        self.authors.push(pubkey.into());
        self
    }

    /// Set `since`
    pub fn since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }

    /// Set `limit`
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether the event passes this filter
    pub fn matches(&self, event: &SignedEvent) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&event.kind))
            && (self.authors.is_empty() || self.authors.iter().any(|a| a == &event.pubkey))
            && self.since.map_or(true, |since| event.created_at >= since)
    }
}
