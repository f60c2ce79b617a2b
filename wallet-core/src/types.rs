//! Core types for the wallet
//!
//! Proofs and tokens are immutable value types. A token groups proofs issued
//! by one mint and is identified by a hash of its proof secrets, so the same
//! set of proofs always maps to the same identifier regardless of order.

use relay_bus::RelayUrl;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Normalized mint URL
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct MintUrl(String);

impl MintUrl {
    /// Normalize a mint address (trailing slash removed, `https://` default)
    pub fn new(url: impl AsRef<str>) -> Self {
        let trimmed = url.as_ref().trim().trim_end_matches('/');
        if trimmed.contains("://") {
            Self(trimmed.to_string())
        } else {
            Self(format!("https://{}", trimmed))
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

impl fmt::Display for MintUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MintUrl {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl From<&str> for MintUrl {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<MintUrl> for String {
    fn from(url: MintUrl) -> Self {
        url.0
    }
}

/// Single bearer proof issued by a mint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Denomination
    pub amount: u64,

    /// Keyset id
    pub id: String,

    /// Secret (unique per proof)
    pub secret: String,

    /// Unblinded signature
    #[serde(rename = "C")]
    pub c: String,

    /// Spending witness (P2PK signatures)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness: Option<String>,

    /// DLEQ proof, kept opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dleq: Option<serde_json::Value>,
}

impl Proof {
    /// Create a plain proof
    pub fn new(
        amount: u64,
        id: impl Into<String>,
        secret: impl Into<String>,
        c: impl Into<String>,
    ) -> Self {
        Self {
            amount,
            id: id.into(),
            secret: secret.into(),
            c: c.into(),
            witness: None,
            dleq: None,
        }
    }
}

/// Sum of proof denominations, saturating at `u64::MAX`
pub fn proofs_amount(proofs: &[Proof]) -> u64 {
    proofs.iter().fold(0u64, |total, p| total.saturating_add(p.amount))
}

/// Sum of proof denominations, `None` on overflow
pub fn checked_proofs_amount(proofs: &[Proof]) -> Option<u64> {
    proofs.iter().try_fold(0u64, |total, p| total.checked_add(p.amount))
}

/// Canonical power-of-two denominations for `amount`, smallest first
pub fn split_amount(amount: u64) -> Vec<u64> {
    (0..u64::BITS)
        .map(|bit| 1u64 << bit)
        .filter(|denomination| amount & denomination != 0)
        .collect()
}

/// Content-addressed token identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    /// Hash of the sorted proof secrets
    pub fn from_proofs(proofs: &[Proof]) -> Self {
        let mut secrets: Vec<&str> = proofs.iter().map(|p| p.secret.as_str()).collect();
        secrets.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(secrets.join("\n").as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an already computed identifier
    pub fn from_hex(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proofs from one mint, the wallet's unit of storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Issuing mint
    pub mint: MintUrl,

    /// Proofs
    pub proofs: Vec<Proof>,
}

impl Token {
    /// Create new token
    pub fn new(mint: MintUrl, proofs: Vec<Proof>) -> Self {
        Self { mint, proofs }
    }

    /// Stable identifier
    pub fn id(&self) -> TokenId {
        TokenId::from_proofs(&self.proofs)
    }

    /// Total value
    pub fn amount(&self) -> u64 {
        proofs_amount(&self.proofs)
    }

    /// Whether the token carries no value
    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }
}

/// Why a token event was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenOrigin {
    /// Value came in from outside the wallet
    Received,
    /// Remainder of a spend
    Change,
}

/// Direction of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Value received
    In,
    /// Value spent
    Out,
}

/// Spending history record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Direction
    pub direction: Direction,

    /// Amount moved
    pub amount: u64,

    /// Mint involved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mint: Option<MintUrl>,

    /// Tokens created by the movement
    #[serde(default)]
    pub created: Vec<TokenId>,

    /// Tokens destroyed by the movement
    #[serde(default)]
    pub destroyed: Vec<TokenId>,
}

/// Where and how the owner accepts nutzaps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutzapInfo {
    /// Relays to send nutzaps to
    pub relays: Vec<RelayUrl>,

    /// Accepted mints
    pub mints: Vec<MintUrl>,

    /// Public key proofs must be locked to
    pub pubkey: Option<String>,
}
