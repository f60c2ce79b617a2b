//! Mint collaborator
//!
//! The wallet never talks to a mint directly. Implementations map transport
//! failures to [`Error::MintUnavailable`](crate::Error::MintUnavailable).

use crate::types::{MintUrl, Proof};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Proofs reissued by a swap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapOutput {
    /// Proofs summing to the requested amount
    pub send: Vec<Proof>,

    /// Remainder returned to the wallet
    pub keep: Vec<Proof>,
}

/// Quote for paying a Lightning invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltQuote {
    /// Mint-side quote id
    pub quote_id: String,

    /// Invoice amount
    pub amount: u64,

    /// Maximum routing fee the mint may keep
    pub fee_reserve: u64,
}

impl MeltQuote {
    /// Value the wallet must put up
    pub fn total(&self) -> u64 {
        self.amount.saturating_add(self.fee_reserve)
    }
}

/// Completed melt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeltResult {
    /// Payment preimage (hex)
    pub preimage: String,

    /// Unused fee reserve returned as new proofs
    pub change: Vec<Proof>,
}

/// Mint operations the wallet depends on
#[async_trait]
pub trait MintClient: Send + Sync {
    /// Reissue `proofs` into a part worth exactly `amount` and a remainder
    ///
    /// With `lock_to` the sent part is locked to that public key.
    async fn swap(
        &self,
        mint: &MintUrl,
        proofs: Vec<Proof>,
        amount: u64,
        lock_to: Option<&str>,
    ) -> Result<SwapOutput>;

    /// Move value from one mint to another (melt on `from`, mint on `to`)
    async fn transfer(&self, from: &MintUrl, to: &MintUrl, proofs: Vec<Proof>) -> Result<Vec<Proof>>;

    /// Quote a Lightning payment
    async fn melt_quote(&self, mint: &MintUrl, invoice: &str) -> Result<MeltQuote>;

    /// Pay a quoted invoice with `proofs`
    async fn melt(&self, mint: &MintUrl, quote: &MeltQuote, proofs: Vec<Proof>) -> Result<MeltResult>;
}
